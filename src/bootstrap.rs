use std::sync::Arc;

use anyhow::Context;
use poem::{EndpointExt, Route, http::HeaderName};
use poem_openapi::OpenApiService;
use sqlx::postgres::PgPoolOptions;
use tokio::{sync::watch, task::JoinHandle};
use tracing::info;

use crate::{
    application::{
        handlers::{
            document_processor::DocumentProcessingHandler, outbox_dispatcher::OutboxDispatcher,
        },
        services::{content_store::ContentStore, outbox_writer::OutboxWriter, transport::Transport},
        usecases::{
            create_shipment::CreateShipmentUseCase, get_shipment::GetShipmentUseCase,
            list_outbox_events::ListOutboxEventsUseCase, list_shipments::ListShipmentsUseCase,
            release_outbox_event::ReleaseOutboxEventUseCase,
            upload_document::UploadDocumentUseCase,
        },
    },
    config::{Config, TransportKind},
    domain::repositories::{OutboxRepository, ShipmentRepository, UnitOfWorkFactory},
    infrastructure::{
        messaging::{in_process::InProcessTransport, jetstream::JetstreamTransport},
        repositories::{
            in_memory::InMemoryStore,
            postgres::{
                PostgresOutboxRepository, PostgresShipmentRepository, PostgresUnitOfWorkFactory,
            },
        },
        storage::{in_memory::InMemoryContentStore, local_file::LocalFileContentStore},
    },
    presentation::http::{
        correlation::Correlation,
        endpoints::{
            outbox::OutboxEndpoints,
            root::{ApiState, Endpoints},
            shipments::ShipmentsEndpoints,
        },
    },
};

/// Storage seams shared by the HTTP side, the dispatcher and the consumer.
#[derive(Clone)]
pub struct Persistence {
    pub shipments: Arc<dyn ShipmentRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
    pub units: Arc<dyn UnitOfWorkFactory>,
}

impl Persistence {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            shipments: store.clone(),
            outbox: store.clone(),
            units: store,
        }
    }

    pub async fn postgres(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        Ok(Self {
            shipments: PostgresShipmentRepository::new(pool.clone()),
            outbox: PostgresOutboxRepository::new(pool.clone()),
            units: PostgresUnitOfWorkFactory::new(pool),
        })
    }
}

pub struct Runtime {
    pub state: Arc<ApiState>,
    pub workers: Vec<JoinHandle<()>>,
}

pub fn api_state(
    persistence: &Persistence,
    content: Arc<dyn ContentStore>,
    writer: Arc<OutboxWriter>,
) -> Arc<ApiState> {
    Arc::new(ApiState {
        create_shipment_usecase: Arc::new(CreateShipmentUseCase::new(
            persistence.shipments.clone(),
        )),
        get_shipment_usecase: Arc::new(GetShipmentUseCase::new(persistence.shipments.clone())),
        list_shipments_usecase: Arc::new(ListShipmentsUseCase::new(
            persistence.shipments.clone(),
        )),
        upload_document_usecase: Arc::new(UploadDocumentUseCase::new(
            persistence.shipments.clone(),
            persistence.units.clone(),
            content,
            writer,
        )),
        list_outbox_events_usecase: Arc::new(ListOutboxEventsUseCase::new(
            persistence.outbox.clone(),
        )),
        release_outbox_event_usecase: Arc::new(ReleaseOutboxEventUseCase::new(
            persistence.outbox.clone(),
        )),
    })
}

/// Builds the storage, transport and background workers described by
/// `config`. Workers stop when `shutdown` flips to `true`.
pub async fn bootstrap(config: &Config, shutdown: watch::Receiver<bool>) -> anyhow::Result<Runtime> {
    let persistence = match &config.database_url {
        Some(url) => {
            info!("using Postgres storage");
            Persistence::postgres(url, config.database_max_connections).await?
        }
        None => {
            info!("DATABASE_URL not set, using in-memory storage");
            Persistence::in_memory()
        }
    };

    let content: Arc<dyn ContentStore> = match &config.content_root {
        Some(root) => {
            info!(root = %root.display(), "using local file content store");
            Arc::new(LocalFileContentStore::new(root.clone()).await?)
        }
        None => {
            info!("CONTENT_ROOT not set, using in-memory content store");
            Arc::new(InMemoryContentStore::new())
        }
    };

    let handler = Arc::new(DocumentProcessingHandler::new(
        persistence.shipments.clone(),
        content.clone(),
        config.processing.clone(),
    ));

    let mut workers = Vec::new();
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::InProcess => {
            let (transport, consumer) = InProcessTransport::new(config.in_process.clone());
            workers.push(consumer.spawn(handler, shutdown.clone()));
            transport
        }
        TransportKind::Jetstream => {
            let jetstream = config
                .jetstream
                .as_ref()
                .context("jetstream transport selected without NATS settings")?;
            let (transport, worker) = JetstreamTransport::new(jetstream).await?;
            workers.push(worker.spawn(handler, shutdown.clone()));
            transport
        }
    };

    let dispatcher = OutboxDispatcher::new(
        persistence.outbox.clone(),
        transport,
        config.outbox.clone(),
    );
    info!(instance_id = %dispatcher.instance_id(), "outbox dispatcher configured");
    workers.push(dispatcher.spawn(shutdown));

    let state = api_state(&persistence, content, Arc::new(OutboxWriter::new()));
    Ok(Runtime { state, workers })
}

/// `/api` with the OpenAPI endpoints, Swagger UI at `/`, correlation
/// middleware around everything.
pub fn build_app(
    state: Arc<ApiState>,
    server_url: &str,
    correlation_header: &str,
) -> anyhow::Result<impl poem::Endpoint + use<>> {
    let header = HeaderName::from_bytes(correlation_header.as_bytes())
        .context("invalid correlation header name")?;
    let api_service = OpenApiService::new(
        (
            Endpoints::new(state.clone()),
            ShipmentsEndpoints::new(state.clone()),
            OutboxEndpoints::new(state),
        ),
        "Shipments API",
        "0.1.0",
    )
    .server(format!("{server_url}/api"));
    let ui = api_service.swagger_ui();
    Ok(Route::new()
        .nest("/api", api_service)
        .nest("/", ui)
        .with(Correlation::new(header)))
}
