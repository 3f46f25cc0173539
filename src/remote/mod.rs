//! Remote pipeline service, the authoritative source of deals, pipelines
//! and stages.
//!
//! | Implementation          | Used for                                   |
//! |-------------------------|--------------------------------------------|
//! | `hubspot::HubSpotClient`| HubSpot CRM v3 over HTTPS (`reqwest`)      |
//! | `memory::InMemoryPipelineService` | tests and `--demo` mode          |
//!
//! Every implementation normalizes its failures into [`BoardError`] before
//! returning, so callers only ever see `Transport`, `ServiceRejected`,
//! `Unauthorized` or `NotFound`.

pub mod hubspot;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dealboard_common::{Deal, NewDeal, Pipeline, Stage};

use crate::errors::BoardError;

/// Pipelines together with the flattened stage list of all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineCatalog {
    pub pipelines: Vec<Pipeline>,
    pub stages: Vec<Stage>,
}

#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Full deal set. Denormalized stage/pipeline names come back blank.
    async fn list_deals(&self) -> Result<Vec<Deal>, BoardError>;

    /// All pipelines, each stage carrying probability and closed metadata.
    async fn list_pipelines(&self) -> Result<PipelineCatalog, BoardError>;

    async fn create_deal(&self, new_deal: &NewDeal) -> Result<Deal, BoardError>;

    /// Move a deal to another stage. `Ok(None)` when the deal does not exist.
    async fn set_deal_stage(&self, deal_id: &str, stage_id: &str)
    -> Result<Option<Deal>, BoardError>;
}
