//! HubSpot client against a local mock of the CRM v3 endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use serde_json::{Value, json};

use dealboard::board::{BoardController, MoveOutcome, MoveRequest};
use dealboard::config::HubSpotSection;
use dealboard::errors::BoardError;
use dealboard::remote::PipelineService;
use dealboard::remote::hubspot::HubSpotClient;
use dealboard::session::ApiKeySession;
use dealboard_common::NewDeal;

const TOKEN: &str = "pat-test-token";

#[derive(Default)]
struct MockCrm {
    deal_requests: AtomicUsize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "error",
            "message": "Authentication credentials not found.",
            "correlationId": "auth-1",
            "category": "INVALID_AUTHENTICATION"
        })),
    )
        .into_response()
}

fn record(id: &str, name: &str, amount: &str, stage: &str) -> Value {
    json!({
        "id": id,
        "properties": {
            "dealname": name,
            "amount": amount,
            "dealstage": stage,
            "pipeline": "default",
            "hs_lastmodifieddate": "2024-03-01T12:00:00Z"
        }
    })
}

async fn list_deals(
    State(crm): State<Arc<MockCrm>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    crm.deal_requests.fetch_add(1, Ordering::SeqCst);
    assert!(params.get("properties").is_some_and(|p| p.contains("dealstage")));
    match params.get("after").map(String::as_str) {
        None => Json(json!({
            "results": [record("1", "Acme", "1500.75", "appointmentscheduled")],
            "paging": {"next": {"after": "page-2", "link": "ignored"}}
        }))
        .into_response(),
        Some("page-2") => Json(json!({
            "results": [record("2", "Globex", "not-a-number", "qualifiedtobuy")]
        }))
        .into_response(),
        Some(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn list_pipelines(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "results": [{
            "id": "default",
            "label": "Sales Pipeline",
            "displayOrder": 0,
            "stages": [
                {"id": "appointmentscheduled", "label": "Appointment Scheduled", "displayOrder": 0,
                 "metadata": {"isClosed": "false", "probability": "0.2"}},
                {"id": "qualifiedtobuy", "label": "Qualified To Buy", "displayOrder": 1,
                 "metadata": {"isClosed": "false", "probability": "0.4"}},
                {"id": "closedwon", "label": "Closed Won", "displayOrder": 2,
                 "metadata": {"isClosed": "true", "probability": "1.0"}}
            ]
        }]
    }))
    .into_response()
}

async fn create_deal(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let props = &body["properties"];
    (
        StatusCode::CREATED,
        Json(json!({
            "id": "9001",
            "properties": {
                "dealname": props["dealname"],
                "amount": props["amount"],
                "dealstage": props["dealstage"],
                "pipeline": props["pipeline"]
            }
        })),
    )
        .into_response()
}

async fn update_deal(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let stage = body["properties"]["dealstage"].as_str().unwrap_or_default();
    match id.as_str() {
        "404" => StatusCode::NOT_FOUND.into_response(),
        "locked" => (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "error",
                "message": "Deal is locked",
                "correlationId": "corr-42",
                "category": "CONFLICT"
            })),
        )
            .into_response(),
        _ => Json(record(&id, "Updated", "10", stage)).into_response(),
    }
}

async fn spawn_mock() -> (SocketAddr, Arc<MockCrm>) {
    let crm = Arc::new(MockCrm::default());
    let app = Router::new()
        .route("/crm/v3/objects/deals", get(list_deals).post(create_deal))
        .route("/crm/v3/objects/deals/{id}", patch(update_deal))
        .route("/crm/v3/pipelines/deals", get(list_pipelines))
        .with_state(crm.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, crm)
}

fn client(addr: SocketAddr, api_key: Option<&str>) -> HubSpotClient {
    HubSpotClient::new(&HubSpotSection {
        base_url: format!("http://{addr}/"),
        api_key: api_key.map(str::to_string),
        timeout_secs: 5,
        ..HubSpotSection::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_list_deals_follows_paging() {
    let (addr, crm) = spawn_mock().await;
    let deals = client(addr, Some(TOKEN)).list_deals().await.unwrap();

    assert_eq!(crm.deal_requests.load(Ordering::SeqCst), 2);
    assert_eq!(deals.len(), 2);
    assert_eq!(deals[0].name, "Acme");
    assert_eq!(deals[0].amount, Some(1500));
    assert_eq!(deals[0].stage_id, "appointmentscheduled");
    assert!(deals[0].stage_name.is_empty());
    assert!(deals[0].last_updated.is_some());
    assert_eq!(deals[0].metadata.as_ref().unwrap()["id"], "1");
    assert_eq!(deals[1].amount, None);
}

#[tokio::test]
async fn test_list_pipelines_maps_stage_metadata() {
    let (addr, _) = spawn_mock().await;
    let catalog = client(addr, Some(TOKEN)).list_pipelines().await.unwrap();

    assert_eq!(catalog.pipelines.len(), 1);
    assert_eq!(catalog.pipelines[0].name, "Sales Pipeline");
    assert_eq!(catalog.stages.len(), 3);
    assert_eq!(catalog.stages[1].probability, "0.4");
    assert!(!catalog.stages[1].is_closed);
    assert!(catalog.stages[2].is_closed);
    assert!(catalog.stages.iter().all(|s| s.pipeline_id == "default"));
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    let (addr, _) = spawn_mock().await;
    let err = client(addr, Some("wrong")).list_deals().await.unwrap_err();
    assert_eq!(
        err,
        BoardError::Unauthorized("Authentication credentials not found.".into())
    );
}

#[tokio::test]
async fn test_set_deal_stage_outcomes() {
    let (addr, _) = spawn_mock().await;
    let hubspot = client(addr, Some(TOKEN));

    let deal = hubspot.set_deal_stage("7", "closedwon").await.unwrap().unwrap();
    assert_eq!(deal.id, "7");
    assert_eq!(deal.stage_id, "closedwon");

    assert!(hubspot.set_deal_stage("404", "closedwon").await.unwrap().is_none());

    let err = hubspot.set_deal_stage("locked", "closedwon").await.unwrap_err();
    assert_eq!(
        err,
        BoardError::ServiceRejected {
            status: 409,
            message: "Deal is locked".into(),
            correlation_id: Some("corr-42".into()),
        }
    );
}

#[tokio::test]
async fn test_create_deal_sends_properties() {
    let (addr, _) = spawn_mock().await;
    let deal = client(addr, Some(TOKEN))
        .create_deal(&NewDeal {
            name: "Hooli".into(),
            amount: Some(2500),
            pipeline_id: "default".into(),
            stage_id: "qualifiedtobuy".into(),
        })
        .await
        .unwrap();
    assert_eq!(deal.id, "9001");
    assert_eq!(deal.name, "Hooli");
    assert_eq!(deal.amount, Some(2500));
    assert_eq!(deal.stage_id, "qualifiedtobuy");
}

#[tokio::test]
async fn test_board_over_hubspot() {
    let (addr, _) = spawn_mock().await;
    let controller = BoardController::new(
        Arc::new(client(addr, Some(TOKEN))),
        Arc::new(ApiKeySession::new(Some(TOKEN))),
    );

    let report = controller.refresh().await.unwrap();
    assert_eq!(report.deal_count, 2);
    assert_eq!(report.stage_count, 3);

    let outcome = controller
        .move_deal(MoveRequest::new("1", "appointmentscheduled", "closedwon"))
        .await;
    let MoveOutcome::Confirmed { deal } = outcome else {
        panic!("expected Confirmed, got {outcome:?}");
    };
    assert_eq!(deal.stage_name, "Closed Won");
    assert_eq!(deal.probability, "1.0");
    assert_eq!(deal.pipeline_name, "Sales Pipeline");
}
