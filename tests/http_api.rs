use std::sync::Arc;

use poem::{
    Endpoint,
    http::StatusCode,
    test::{TestClient, TestForm, TestFormField},
};
use serde_json::json;
use shipments::{
    application::services::outbox_writer::OutboxWriter,
    bootstrap::{Persistence, api_state, build_app},
    infrastructure::storage::in_memory::InMemoryContentStore,
};

const CORRELATION_HEADER: &str = "X-Correlation-Id";

fn client() -> TestClient<impl Endpoint + 'static> {
    let persistence = Persistence::in_memory();
    let state = api_state(
        &persistence,
        Arc::new(InMemoryContentStore::new()),
        Arc::new(OutboxWriter::new()),
    );
    // Short-lived settings, as when they come from a parsed `Config`.
    let server_url = format!("http://localhost:{}", 3000);
    let header = CORRELATION_HEADER.to_string();
    let app = build_app(state, &server_url, &header).unwrap();
    drop((server_url, header));
    TestClient::new(app)
}

async fn create(cli: &TestClient<impl Endpoint>, reference: &str) -> String {
    let resp = cli
        .post("/api/shipments")
        .body_json(&json!({
            "reference_number": reference,
            "sender": "ACME",
            "recipient": "Globex",
        }))
        .send()
        .await;
    resp.assert_status(StatusCode::CREATED);
    let location = resp
        .0
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap();
    let body = resp.json().await;
    let id = body.value().object().get("id").string().to_string();
    assert_eq!(location, format!("/api/shipments/{id}"));
    id
}

#[tokio::test]
async fn health_reports_ok() {
    let cli = client();
    let resp = cli.get("/api/health").send().await;
    resp.assert_status_is_ok();
    resp.assert_text("OK").await;
}

#[tokio::test]
async fn correlation_id_is_echoed_or_generated() {
    let cli = client();

    let resp = cli
        .get("/api/health")
        .header(CORRELATION_HEADER, "corr-from-client")
        .send()
        .await;
    resp.assert_header(CORRELATION_HEADER, "corr-from-client");

    let resp = cli.get("/api/health").send().await;
    let generated = resp.0.headers().get(CORRELATION_HEADER).unwrap();
    assert_eq!(generated.len(), 32);
}

#[tokio::test]
async fn duplicate_reference_is_a_conflict_problem() {
    let cli = client();
    create(&cli, "REF-100").await;

    let resp = cli
        .post("/api/shipments")
        .header(CORRELATION_HEADER, "corr-dup")
        .body_json(&json!({
            "reference_number": "REF-100",
            "sender": "ACME",
            "recipient": "Globex",
        }))
        .send()
        .await;

    resp.assert_status(StatusCode::CONFLICT);
    resp.assert_content_type("application/problem+json");
    resp.assert_header(CORRELATION_HEADER, "corr-dup");
    let body = resp.json().await;
    body.value().object().get("title").assert_string("conflict");
    body.value().object().get("status").assert_i64(409);
}

#[tokio::test]
async fn blank_reference_is_rejected() {
    let cli = client();
    let resp = cli
        .post("/api/shipments")
        .body_json(&json!({
            "reference_number": "   ",
            "sender": "ACME",
            "recipient": "Globex",
        }))
        .send()
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    resp.json()
        .await
        .value()
        .object()
        .get("title")
        .assert_string("validation");
}

#[tokio::test]
async fn unknown_shipment_is_not_found() {
    let cli = client();
    let resp = cli
        .get(format!("/api/shipments/{}", uuid::Uuid::new_v4()))
        .send()
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    resp.assert_content_type("application/problem+json");
}

#[tokio::test]
async fn upload_moves_shipment_and_queues_event() {
    let cli = client();
    let id = create(&cli, "REF-200").await;

    let form = TestForm::new().field(
        TestFormField::bytes(b"%PDF-1.7 invoice".to_vec())
            .name("file")
            .filename("invoice.pdf")
            .content_type("application/pdf"),
    );
    let resp = cli
        .post(format!("/api/shipments/{id}/documents"))
        .header(CORRELATION_HEADER, "corr-upload")
        .multipart(form)
        .send()
        .await;
    resp.assert_status_is_ok();
    let body = resp.json().await;
    let handle = body.value().object().get("content_handle").string().to_string();
    assert!(handle.starts_with(&format!("{id}/")));
    assert!(handle.ends_with("-invoice.pdf"));

    let resp = cli.get(format!("/api/shipments/{id}")).send().await;
    resp.assert_status_is_ok();
    let body = resp.json().await;
    let shipment = body.value().object();
    shipment.get("status").assert_string("document_uploaded");
    shipment.get("documents").array().assert_len(1);

    let resp = cli.get("/api/outbox").query("state", &"pending").send().await;
    resp.assert_status_is_ok();
    let body = resp.json().await;
    let rows = body.value().array();
    rows.assert_len(1);
    let row = rows.get(0).object();
    row.get("event_type").assert_string("DocumentUploaded");
    row.get("correlation_id").assert_string("corr-upload");
    let row_id = row.get("id").string().to_string();

    let resp = cli.post(format!("/api/outbox/{row_id}/release")).send().await;
    resp.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn releasing_unknown_row_is_not_found() {
    let cli = client();
    let resp = cli
        .post(format!("/api/outbox/{}/release", uuid::Uuid::new_v4()))
        .send()
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shipments_are_paged() {
    let cli = client();
    create(&cli, "REF-301").await;
    create(&cli, "REF-302").await;

    let resp = cli
        .get("/api/shipments")
        .query("page", &1)
        .query("page_size", &1)
        .send()
        .await;
    resp.assert_status_is_ok();
    let body = resp.json().await;
    let page = body.value().object();
    page.get("page").assert_i64(1);
    page.get("page_size").assert_i64(1);
    page.get("items").array().assert_len(1);
    page.get("items")
        .array()
        .get(0)
        .object()
        .get("reference_number")
        .assert_string("REF-302");
}
