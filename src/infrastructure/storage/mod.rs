pub mod in_memory;
pub mod local_file;
