//! Shared schema for Dealboard: deals, pipelines and stages as mirrored from
//! the CRM, plus the input shape for creating a deal.
//!
//! All types serialize with camelCase field names so the JSON exchanged with
//! browser clients matches what the board front-end expects (`stageId`,
//! `pipelineName`, `lastUpdated`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage name used when a deal references a stage absent from the mirror.
pub const UNKNOWN_STAGE: &str = "Unknown Stage";

/// Pipeline name used when a deal references a pipeline absent from the mirror.
pub const UNKNOWN_PIPELINE: &str = "Unknown Pipeline";

/// Probability used when a deal's stage is unknown or carries none.
pub const DEFAULT_PROBABILITY: &str = "0";

/// A sales opportunity as mirrored from the CRM.
///
/// `stage_name`, `pipeline_name` and `probability` are denormalized copies of
/// the referenced stage and pipeline. The CRM returns them blank; they are
/// filled in once pipelines are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub amount: Option<i64>,
    pub stage_id: String,
    #[serde(default)]
    pub stage_name: String,
    pub pipeline_id: String,
    #[serde(default)]
    pub pipeline_name: String,
    #[serde(default)]
    pub probability: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Raw CRM record, passed through untouched.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// A CRM probability string (`"0.4"`) as a whole percentage, `0` when blank
/// or unparsable.
pub fn probability_percent(probability: &str) -> u8 {
    probability
        .trim()
        .parse::<f64>()
        .map(|p| (p * 100.0).round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

impl Deal {
    pub fn probability_percent(&self) -> u8 {
        probability_percent(&self.probability)
    }
}

/// A named sales process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A step within a pipeline. `display_order` defines the left-to-right
/// column order; it need not be contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    pub pipeline_id: String,
    pub label: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_probability")]
    pub probability: String,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_probability() -> String {
    DEFAULT_PROBABILITY.to_string()
}

/// Input for creating a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    pub name: String,
    #[serde(default)]
    pub amount: Option<i64>,
    pub pipeline_id: String,
    pub stage_id: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Deal name is required")]
    MissingName,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Amount must not be negative (got {0})")]
    NegativeAmount(i64),
}

impl NewDeal {
    /// Check the fields the CRM requires before anything is sent.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::MissingName);
        }
        if self.pipeline_id.trim().is_empty() {
            return Err(SchemaError::MissingField("pipelineId"));
        }
        if self.stage_id.trim().is_empty() {
            return Err(SchemaError::MissingField("stageId"));
        }
        match self.amount {
            Some(amount) if amount < 0 => Err(SchemaError::NegativeAmount(amount)),
            _ => Ok(()),
        }
    }
}
