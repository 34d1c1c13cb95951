use poem_openapi::{Multipart, Object, types::multipart::Upload};

#[derive(Object, Debug)]
pub struct CreateShipmentRequestDto {
    pub reference_number: String,
    pub sender: String,
    pub recipient: String,
}

#[derive(Multipart)]
pub struct UploadDocumentForm {
    pub file: Upload,
}
