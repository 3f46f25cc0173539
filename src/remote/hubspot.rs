use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use dealboard_common::{DEFAULT_PROBABILITY, Deal, NewDeal, Pipeline, Stage};

use super::{PipelineCatalog, PipelineService};
use crate::config::HubSpotSection;
use crate::errors::BoardError;

const DEALS_PATH: &str = "/crm/v3/objects/deals";
const PIPELINES_PATH: &str = "/crm/v3/pipelines/deals";

/// Deal properties requested on every listing.
const DEAL_PROPERTIES: &str = "dealname,amount,pipeline,dealstage,hubspot_owner_id,closedate,hs_lastmodifieddate,company,contact";

/// Upper bound on deal pages followed in one listing.
const MAX_PAGES: usize = 50;

/// Cursor for the page after `page_number`, or `None` when the listing is
/// done. Stops at [`MAX_PAGES`] even if HubSpot has more.
fn next_cursor(page_number: usize, next: Option<NextPage>) -> Option<String> {
    let next = next?;
    if page_number >= MAX_PAGES {
        warn!(
            pages = page_number,
            cursor = %next.after,
            "Deal listing truncated at page cap; remaining deals not loaded"
        );
        return None;
    }
    Some(next.after)
}

// ── Wire types ───────────────────────────────────────────────────────

/// One page of `GET /crm/v3/objects/deals`. Records stay raw so they can be
/// passed through as deal metadata.
#[derive(Debug, Deserialize)]
struct DealsPage {
    results: Vec<serde_json::Value>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

/// A HubSpot deal record (subset of fields we care about).
#[derive(Debug, Deserialize)]
struct HubSpotDeal {
    id: String,
    #[serde(default)]
    properties: HubSpotDealProperties,
}

#[derive(Debug, Default, Deserialize)]
struct HubSpotDealProperties {
    dealname: Option<String>,
    amount: Option<String>,
    pipeline: Option<String>,
    dealstage: Option<String>,
    hs_lastmodifieddate: Option<String>,
    company: Option<String>,
    contact: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PipelinesResponse {
    results: Vec<HubSpotPipeline>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubSpotPipeline {
    id: String,
    label: String,
    #[serde(default)]
    display_order: i32,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    stages: Vec<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubSpotStage {
    id: String,
    label: String,
    #[serde(default)]
    display_order: i32,
    #[serde(default)]
    metadata: HubSpotStageMetadata,
}

/// HubSpot encodes both fields as strings, but older portals send numbers
/// and booleans, so both are read loosely.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubSpotStageMetadata {
    is_closed: Option<serde_json::Value>,
    probability: Option<serde_json::Value>,
}

/// Error body returned by HubSpot on non-success statuses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubSpotErrorBody {
    message: Option<String>,
    correlation_id: Option<String>,
    category: Option<String>,
}

// ── Mapping ──────────────────────────────────────────────────────────

/// Parse a HubSpot amount the way the board has always read it: leading
/// integer part, fractions truncated, anything else treated as absent.
fn parse_amount(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn loose_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn deal_from_record(raw: serde_json::Value) -> Result<Deal, BoardError> {
    let record: HubSpotDeal = serde_json::from_value(raw.clone())
        .map_err(|e| BoardError::Transport(format!("Malformed deal record from HubSpot: {}", e)))?;
    let props = record.properties;
    Ok(Deal {
        id: record.id,
        name: props.dealname.unwrap_or_default(),
        amount: props.amount.as_deref().and_then(parse_amount),
        stage_id: props.dealstage.unwrap_or_default(),
        stage_name: String::new(),
        pipeline_id: props.pipeline.unwrap_or_default(),
        pipeline_name: String::new(),
        probability: String::new(),
        company: props.company,
        contact: props.contact,
        last_updated: props.hs_lastmodifieddate.as_deref().and_then(parse_timestamp),
        metadata: Some(raw),
    })
}

fn stage_from_record(pipeline_id: &str, raw: serde_json::Value) -> Result<Stage, BoardError> {
    let record: HubSpotStage = serde_json::from_value(raw.clone())
        .map_err(|e| BoardError::Transport(format!("Malformed stage record from HubSpot: {}", e)))?;
    let probability = record
        .metadata
        .probability
        .as_ref()
        .and_then(loose_string)
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROBABILITY.to_string());
    let is_closed = record
        .metadata
        .is_closed
        .as_ref()
        .and_then(loose_string)
        .is_some_and(|c| c == "true");
    Ok(Stage {
        id: record.id,
        pipeline_id: pipeline_id.to_string(),
        label: record.label,
        display_order: record.display_order,
        probability,
        is_closed,
        metadata: Some(raw),
    })
}

fn catalog_from_response(response: PipelinesResponse) -> Result<PipelineCatalog, BoardError> {
    let mut catalog = PipelineCatalog::default();
    for pipeline in response.results {
        for raw in pipeline.stages {
            catalog.stages.push(stage_from_record(&pipeline.id, raw)?);
        }
        catalog.pipelines.push(Pipeline {
            id: pipeline.id,
            name: pipeline.label,
            display_order: pipeline.display_order,
            active: pipeline.active,
        });
    }
    Ok(catalog)
}

/// Normalize a non-success HubSpot response into a [`BoardError`].
fn normalize_rejection(status: u16, body: &str) -> BoardError {
    let parsed: HubSpotErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "HubSpot API error".to_string());
    if status == 401 {
        return BoardError::Unauthorized(message);
    }
    if let Some(category) = parsed.category {
        debug!(status, %category, "HubSpot rejected request");
    }
    BoardError::ServiceRejected {
        status,
        message,
        correlation_id: parsed.correlation_id,
    }
}

fn transport_error(err: reqwest::Error) -> BoardError {
    if err.is_timeout() {
        BoardError::Transport(format!("Request to HubSpot timed out: {}", err))
    } else {
        BoardError::Transport(err.to_string())
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// HubSpot CRM v3 client.
pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    page_limit: u32,
}

impl HubSpotClient {
    pub fn new(config: &HubSpotSection) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("dealboard")
            .build()
            .context("Failed to build HubSpot HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_limit: config.page_limit.clamp(1, 100),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach credentials and send. Non-success statuses other than those
    /// listed in `passthrough` are normalized into errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        passthrough: &[u16],
    ) -> Result<reqwest::Response, BoardError> {
        let token = self
            .api_key
            .as_deref()
            .ok_or_else(|| BoardError::Unauthorized("HUBSPOT_API_KEY is not configured".into()))?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status().as_u16();
        if resp.status().is_success() || passthrough.contains(&status) {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = normalize_rejection(status, &body);
        warn!(status, error = %err, "HubSpot request failed");
        Err(err)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, BoardError> {
        resp.json::<T>()
            .await
            .map_err(|e| BoardError::Transport(format!("Failed to parse HubSpot response: {}", e)))
    }
}

#[async_trait]
impl PipelineService for HubSpotClient {
    async fn list_deals(&self) -> Result<Vec<Deal>, BoardError> {
        let limit = self.page_limit.to_string();
        let mut deals = Vec::new();
        let mut after: Option<String> = None;

        for page_number in 1..=MAX_PAGES {
            let mut request = self
                .http
                .get(self.url(DEALS_PATH))
                .query(&[("properties", DEAL_PROPERTIES), ("limit", limit.as_str())]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor.as_str())]);
            }
            let page: DealsPage = Self::read_json(self.send(request, &[]).await?).await?;
            for raw in page.results {
                deals.push(deal_from_record(raw)?);
            }
            after = next_cursor(page_number, page.paging.and_then(|p| p.next));
            if after.is_none() {
                break;
            }
        }

        debug!(count = deals.len(), "Fetched deals from HubSpot");
        Ok(deals)
    }

    async fn list_pipelines(&self) -> Result<PipelineCatalog, BoardError> {
        let request = self.http.get(self.url(PIPELINES_PATH));
        let response: PipelinesResponse = Self::read_json(self.send(request, &[]).await?).await?;
        let catalog = catalog_from_response(response)?;
        debug!(
            pipelines = catalog.pipelines.len(),
            stages = catalog.stages.len(),
            "Fetched pipelines from HubSpot"
        );
        Ok(catalog)
    }

    async fn create_deal(&self, new_deal: &NewDeal) -> Result<Deal, BoardError> {
        let mut properties = serde_json::json!({
            "dealname": new_deal.name,
            "pipeline": new_deal.pipeline_id,
            "dealstage": new_deal.stage_id,
        });
        if let Some(amount) = new_deal.amount {
            properties["amount"] = serde_json::Value::String(amount.to_string());
        }
        let request = self
            .http
            .post(self.url(DEALS_PATH))
            .json(&serde_json::json!({ "properties": properties }));
        let raw: serde_json::Value = Self::read_json(self.send(request, &[]).await?).await?;
        deal_from_record(raw)
    }

    async fn set_deal_stage(
        &self,
        deal_id: &str,
        stage_id: &str,
    ) -> Result<Option<Deal>, BoardError> {
        let request = self
            .http
            .patch(self.url(&format!("{}/{}", DEALS_PATH, deal_id)))
            .json(&serde_json::json!({ "properties": { "dealstage": stage_id } }));
        let resp = self.send(request, &[404]).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: serde_json::Value = Self::read_json(resp).await?;
        deal_from_record(raw).map(Some)
    }
}
