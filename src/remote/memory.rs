//! In-process pipeline service.
//!
//! Holds deals, pipelines and stages in memory and behaves like the CRM:
//! listed deals carry blank denormalized names, writes stamp `last_updated`.
//! Failures can be injected per operation, which is how tests exercise the
//! reconciliation paths, and `demo()` seeds the board used by `--demo`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use dealboard_common::{Deal, NewDeal, Pipeline, Stage};

use super::{PipelineCatalog, PipelineService};
use crate::errors::BoardError;

#[derive(Default)]
struct MemoryState {
    deals: Vec<Deal>,
    pipelines: Vec<Pipeline>,
    stages: Vec<Stage>,
    fail_next_list_deals: Option<BoardError>,
    fail_next_list_pipelines: Option<BoardError>,
    fail_next_write: Option<BoardError>,
}

#[derive(Default)]
pub struct InMemoryPipelineService {
    state: Mutex<MemoryState>,
    next_id: AtomicUsize,
    write_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryPipelineService {
    pub fn new(pipelines: Vec<Pipeline>, stages: Vec<Stage>, deals: Vec<Deal>) -> Self {
        let service = Self::default();
        {
            let mut state = service.lock();
            state.pipelines = pipelines;
            state.stages = stages;
            state.deals = deals.into_iter().map(strip_denormalized).collect();
        }
        service.next_id.store(1000, Ordering::SeqCst);
        service
    }

    /// A small two-pipeline board for demos and smoke tests.
    pub fn demo() -> Self {
        let pipelines = vec![
            Pipeline {
                id: "sales".into(),
                name: "Sales Pipeline".into(),
                display_order: 0,
                active: true,
            },
            Pipeline {
                id: "renewals".into(),
                name: "Renewals".into(),
                display_order: 1,
                active: true,
            },
        ];
        let stage = |id: &str, pipeline: &str, label: &str, order: i32, prob: &str, closed| Stage {
            id: id.into(),
            pipeline_id: pipeline.into(),
            label: label.into(),
            display_order: order,
            probability: prob.into(),
            is_closed: closed,
            metadata: None,
        };
        let stages = vec![
            stage("appointmentscheduled", "sales", "Appointment Scheduled", 0, "0.2", false),
            stage("qualifiedtobuy", "sales", "Qualified To Buy", 1, "0.4", false),
            stage("contractsent", "sales", "Contract Sent", 2, "0.9", false),
            stage("closedwon", "sales", "Closed Won", 3, "1.0", true),
            stage("renewal-due", "renewals", "Renewal Due", 0, "0.5", false),
            stage("renewed", "renewals", "Renewed", 1, "1.0", true),
        ];
        let deal = |id: &str, name: &str, amount, stage: &str, pipeline: &str, company: &str| Deal {
            id: id.into(),
            name: name.into(),
            amount: Some(amount),
            stage_id: stage.into(),
            stage_name: String::new(),
            pipeline_id: pipeline.into(),
            pipeline_name: String::new(),
            probability: String::new(),
            company: Some(company.into()),
            contact: None,
            last_updated: Some(Utc::now()),
            metadata: None,
        };
        let deals = vec![
            deal("1", "Acme Corp - Platform", 48000, "appointmentscheduled", "sales", "Acme Corp"),
            deal("2", "Globex onboarding", 12500, "qualifiedtobuy", "sales", "Globex"),
            deal("3", "Initech seats", 7200, "contractsent", "sales", "Initech"),
            deal("4", "Umbrella renewal", 30000, "renewal-due", "renewals", "Umbrella"),
        ];
        Self::new(pipelines, stages, deals)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next `list_deals` call fails with `err`.
    pub fn fail_next_list_deals(&self, err: BoardError) {
        self.lock().fail_next_list_deals = Some(err);
    }

    /// The next `list_pipelines` call fails with `err`.
    pub fn fail_next_list_pipelines(&self, err: BoardError) {
        self.lock().fail_next_list_pipelines = Some(err);
    }

    /// The next write (create or stage change) fails with `err` and is not applied.
    pub fn fail_next_write(&self, err: BoardError) {
        self.lock().fail_next_write = Some(err);
    }

    /// Number of write operations attempted, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of list operations attempted.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// The authoritative stage of a deal, as the remote sees it.
    pub fn stage_of(&self, deal_id: &str) -> Option<String> {
        self.lock()
            .deals
            .iter()
            .find(|d| d.id == deal_id)
            .map(|d| d.stage_id.clone())
    }

    /// Change a deal behind the board's back, as another CRM user would.
    pub fn set_stage_remotely(&self, deal_id: &str, stage_id: &str) {
        if let Some(deal) = self.lock().deals.iter_mut().find(|d| d.id == deal_id) {
            deal.stage_id = stage_id.to_string();
        }
    }
}

/// The CRM does not return denormalized names.
fn strip_denormalized(mut deal: Deal) -> Deal {
    deal.stage_name.clear();
    deal.pipeline_name.clear();
    deal.probability.clear();
    deal
}

#[async_trait]
impl PipelineService for InMemoryPipelineService {
    async fn list_deals(&self) -> Result<Vec<Deal>, BoardError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = state.fail_next_list_deals.take() {
            return Err(err);
        }
        Ok(state.deals.clone())
    }

    async fn list_pipelines(&self) -> Result<PipelineCatalog, BoardError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = state.fail_next_list_pipelines.take() {
            return Err(err);
        }
        Ok(PipelineCatalog {
            pipelines: state.pipelines.clone(),
            stages: state.stages.clone(),
        })
    }

    async fn create_deal(&self, new_deal: &NewDeal) -> Result<Deal, BoardError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = state.fail_next_write.take() {
            return Err(err);
        }
        if !state.stages.iter().any(|s| s.id == new_deal.stage_id) {
            return Err(BoardError::ServiceRejected {
                status: 400,
                message: format!("Stage {} does not exist", new_deal.stage_id),
                correlation_id: None,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let deal = Deal {
            id,
            name: new_deal.name.trim().to_string(),
            amount: new_deal.amount,
            stage_id: new_deal.stage_id.clone(),
            stage_name: String::new(),
            pipeline_id: new_deal.pipeline_id.clone(),
            pipeline_name: String::new(),
            probability: String::new(),
            company: None,
            contact: None,
            last_updated: Some(Utc::now()),
            metadata: None,
        };
        state.deals.push(deal.clone());
        Ok(deal)
    }

    async fn set_deal_stage(
        &self,
        deal_id: &str,
        stage_id: &str,
    ) -> Result<Option<Deal>, BoardError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(err) = state.fail_next_write.take() {
            return Err(err);
        }
        match state.deals.iter_mut().find(|d| d.id == deal_id) {
            Some(deal) => {
                deal.stage_id = stage_id.to_string();
                deal.last_updated = Some(Utc::now());
                Ok(Some(deal.clone()))
            }
            None => Ok(None),
        }
    }
}
