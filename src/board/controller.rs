//! Optimistic mutation controller.
//!
//! Owns the mirror and the projector behind one mutex and coordinates them
//! with the remote service. A stage move is shown immediately, written
//! remotely afterwards, and on failure the board is rebuilt from a fresh
//! fetch rather than rolled back by hand.
//!
//! The mutex is never held across an `.await`: each read-modify-write of
//! board state is atomic relative to other operations, while remote calls
//! from different operations overlap freely.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use dealboard_common::{Deal, NewDeal, Pipeline, Stage};

use super::mirror::MirrorStore;
use super::notify::{Notification, Notifier};
use super::projector::{BoardFilters, BoardProjection, Projector, StageColumn};
use crate::errors::BoardError;
use crate::remote::{PipelineCatalog, PipelineService};
use crate::session::SessionGate;

/// A request to move a deal between (or within) stage columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub deal_id: String,
    pub source_stage_id: String,
    pub target_stage_id: String,
    #[serde(default)]
    pub target_index: Option<usize>,
}

impl MoveRequest {
    pub fn new(
        deal_id: impl Into<String>,
        source_stage_id: impl Into<String>,
        target_stage_id: impl Into<String>,
    ) -> Self {
        Self {
            deal_id: deal_id.into(),
            source_stage_id: source_stage_id.into(),
            target_stage_id: target_stage_id.into(),
            target_index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.target_index = Some(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum MoveOutcome {
    /// Same stage, no index: nothing happened.
    Unchanged,
    /// Reordered within a stage. Local only.
    Reordered,
    /// The remote service accepted the new stage.
    Confirmed { deal: Deal },
    /// The remote write failed and the board was rebuilt from the remote.
    Reverted { error: String },
    /// The deal or target stage is not in the mirror. Nothing was sent.
    NotFound { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub refreshed_at: DateTime<Utc>,
    pub deal_count: usize,
    pub pipeline_count: usize,
    pub stage_count: usize,
}

/// Everything a client needs to render the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub columns: Vec<StageColumn>,
    pub deals: Vec<Deal>,
    pub pipelines: Vec<Pipeline>,
    pub stages: Vec<Stage>,
    pub filters: BoardFilters,
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// Result of the local half of a move.
enum Applied {
    Unchanged,
    Reordered,
    Moved { deal: Deal, from_stage_id: String },
}

#[derive(Debug, Default)]
struct BoardState {
    mirror: MirrorStore,
    projector: Projector,
    last_refreshed: Option<DateTime<Utc>>,
}

impl BoardState {
    fn recompute(&mut self) {
        self.projector.project(&self.mirror);
    }

    fn clear(&mut self) {
        self.mirror.clear();
        self.projector.clear();
        self.last_refreshed = None;
    }

    fn report(&self, refreshed_at: DateTime<Utc>) -> RefreshReport {
        RefreshReport {
            refreshed_at,
            deal_count: self.mirror.deal_count(),
            pipeline_count: self.mirror.list_pipelines().len(),
            stage_count: self.mirror.list_stages().len(),
        }
    }

    fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            columns: self.projector.projection().columns.clone(),
            deals: self.mirror.list_deals().to_vec(),
            pipelines: self.mirror.list_pipelines().into_iter().cloned().collect(),
            stages: self.mirror.list_stages().into_iter().cloned().collect(),
            filters: self.projector.filters().clone(),
            last_refreshed: self.last_refreshed,
        }
    }

    /// Apply a move to mirror and projection without touching the remote.
    ///
    /// A deal already shown in the target column is only repositioned. This
    /// covers deals whose stage is unknown and sit in the fallback column.
    /// Deals hidden by the filters fall back to their mirror stage.
    fn apply_move(
        &mut self,
        deal_id: &str,
        source_stage_id: &str,
        target_stage_id: &str,
        index: Option<usize>,
    ) -> Result<Applied, BoardError> {
        let current_stage = self
            .mirror
            .get_deal(deal_id)
            .map(|d| d.stage_id.clone())
            .ok_or_else(|| BoardError::deal_not_found(deal_id))?;
        if self.mirror.get_stage(target_stage_id).is_none() {
            return Err(BoardError::stage_not_found(target_stage_id));
        }

        let projection = self.projector.projection();
        let shown_in = projection
            .locate(deal_id)
            .and_then(|(ci, _)| projection.columns.get(ci))
            .map(|column| column.stage_id.clone());
        let in_target = match &shown_in {
            Some(stage) => stage == target_stage_id,
            None => current_stage == target_stage_id,
        };

        if source_stage_id == target_stage_id && !in_target {
            // Stale same-stage request for a deal that is elsewhere.
            return Ok(Applied::Unchanged);
        }
        if in_target {
            let Some(deal) = self.projector.take_deal(deal_id, target_stage_id) else {
                // Hidden by the filters; there is nothing visible to reorder.
                return Ok(Applied::Unchanged);
            };
            if !self.projector.place_deal(target_stage_id, deal, index) {
                self.recompute();
                return Ok(Applied::Unchanged);
            }
            self.projector.record_order(target_stage_id);
            return Ok(Applied::Reordered);
        }

        let deal = self
            .mirror
            .apply_stage_reassignment(deal_id, target_stage_id)?;
        let taken = self.projector.take_deal(deal_id, source_stage_id).is_some();
        if taken && self.projector.place_deal(target_stage_id, deal.clone(), index) {
            self.projector.record_order(shown_in.as_deref().unwrap_or(&current_stage));
            self.projector.record_order(target_stage_id);
        } else {
            // Target column out of scope or deal filtered out.
            self.recompute();
        }
        Ok(Applied::Moved {
            deal,
            from_stage_id: current_stage,
        })
    }
}

pub struct BoardController {
    remote: Arc<dyn PipelineService>,
    session: Arc<dyn SessionGate>,
    state: Mutex<BoardState>,
    notifier: Notifier,
}

impl BoardController {
    pub fn new(remote: Arc<dyn PipelineService>, session: Arc<dyn SessionGate>) -> Self {
        Self {
            remote,
            session,
            state: Mutex::new(BoardState::default()),
            notifier: Notifier::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn board(&self) -> BoardSnapshot {
        self.state().snapshot()
    }

    pub fn projection(&self) -> BoardProjection {
        self.state().projector.projection().clone()
    }

    pub fn get_deal(&self, deal_id: &str) -> Option<Deal> {
        self.state().mirror.get_deal(deal_id).cloned()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state().last_refreshed
    }

    fn ensure_session(&self) -> Result<(), BoardError> {
        if self.session.is_active() {
            Ok(())
        } else {
            Err(BoardError::Unauthorized("No active session".into()))
        }
    }

    /// Unauthorized anywhere ends the session: drop local state and ask for
    /// login.
    fn note_failure(&self, err: &BoardError) {
        if err.is_unauthorized() {
            tracing::warn!(error = %err, "session rejected, login required");
            self.session.invalidate();
            self.state().clear();
            self.notifier.send(Notification::LoginRequired {
                message: err.to_string(),
            });
        }
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Fetch deals and pipelines, install them and rebuild the projection.
    ///
    /// The two fetches run concurrently and each successful one is installed
    /// even if the other fails. Explicit column ordering is discarded.
    pub async fn refresh(&self) -> Result<RefreshReport, BoardError> {
        let span = tracing::info_span!("refresh", refresh_id = %Uuid::new_v4());
        async {
            let result = self.refresh_inner().await;
            match &result {
                Ok(report) => {
                    tracing::info!(
                        deals = report.deal_count,
                        pipelines = report.pipeline_count,
                        stages = report.stage_count,
                        "board refreshed"
                    );
                    self.notifier.send(Notification::Refreshed {
                        report: report.clone(),
                    });
                }
                Err(err) => {
                    self.note_failure(err);
                    self.notifier.send(Notification::RefreshFailed {
                        message: err.to_string(),
                    });
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn refresh_inner(&self) -> Result<RefreshReport, BoardError> {
        self.ensure_session()?;
        let (deals, catalog) = tokio::join!(self.remote.list_deals(), self.remote.list_pipelines());

        let mut state = self.state();
        let mut failure = None;
        match deals {
            Ok(deals) => state.mirror.replace_deals(deals),
            Err(err) => failure = Some(err),
        }
        match catalog {
            Ok(catalog) => {
                state.mirror.replace_pipelines(catalog.pipelines);
                state.mirror.replace_stages(catalog.stages);
            }
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
        state.mirror.denormalize_deals();
        state.projector.clear_order();
        state.recompute();

        match failure {
            Some(err) => Err(err),
            None => {
                let now = Utc::now();
                state.last_refreshed = Some(now);
                Ok(state.report(now))
            }
        }
    }

    /// Fetch only the deal list into the mirror.
    pub async fn load_deals(&self) -> Result<Vec<Deal>, BoardError> {
        let result = async {
            self.ensure_session()?;
            self.remote.list_deals().await
        }
        .await;
        match result {
            Ok(deals) => {
                let mut state = self.state();
                state.mirror.replace_deals(deals);
                state.mirror.denormalize_deals();
                state.recompute();
                Ok(state.mirror.list_deals().to_vec())
            }
            Err(err) => {
                self.note_failure(&err);
                Err(err)
            }
        }
    }

    /// Fetch only pipelines and stages into the mirror. Deals already
    /// mirrored get their names refreshed.
    pub async fn load_pipelines(&self) -> Result<PipelineCatalog, BoardError> {
        let result = async {
            self.ensure_session()?;
            self.remote.list_pipelines().await
        }
        .await;
        match result {
            Ok(catalog) => {
                let mut state = self.state();
                state.mirror.replace_pipelines(catalog.pipelines.clone());
                state.mirror.replace_stages(catalog.stages.clone());
                state.mirror.denormalize_deals();
                state.recompute();
                Ok(catalog)
            }
            Err(err) => {
                self.note_failure(&err);
                Err(err)
            }
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Move a deal to a stage, optimistically.
    ///
    /// The projection changes before the remote write is issued. Same-stage
    /// moves with an index only reorder the column and never reach the
    /// remote. A failed write triggers a full refresh.
    pub async fn move_deal(&self, request: MoveRequest) -> MoveOutcome {
        let span = tracing::info_span!(
            "move_deal",
            move_id = %Uuid::new_v4(),
            deal_id = %request.deal_id,
            from = %request.source_stage_id,
            to = %request.target_stage_id
        );
        self.move_deal_inner(request).instrument(span).await
    }

    async fn move_deal_inner(&self, request: MoveRequest) -> MoveOutcome {
        let MoveRequest {
            deal_id,
            source_stage_id,
            target_stage_id,
            target_index,
        } = request;

        if source_stage_id == target_stage_id && target_index.is_none() {
            tracing::debug!("same stage, nothing to do");
            return MoveOutcome::Unchanged;
        }
        if let Err(err) = self.ensure_session() {
            self.note_failure(&err);
            return MoveOutcome::Reverted {
                error: err.to_string(),
            };
        }

        let applied = self.state().apply_move(
            &deal_id,
            &source_stage_id,
            &target_stage_id,
            target_index,
        );
        let (deal, from_stage_id) = match applied {
            Ok(Applied::Unchanged) => return MoveOutcome::Unchanged,
            Ok(Applied::Reordered) => {
                tracing::debug!(index = ?target_index, "reordered within stage");
                return MoveOutcome::Reordered;
            }
            Ok(Applied::Moved {
                deal,
                from_stage_id,
            }) => (deal, from_stage_id),
            Err(err) => {
                tracing::warn!(error = %err, "move rejected locally");
                return MoveOutcome::NotFound {
                    message: err.to_string(),
                };
            }
        };

        match self.remote.set_deal_stage(&deal_id, &target_stage_id).await {
            Ok(Some(_)) => {
                tracing::info!(stage = %deal.stage_name, "move confirmed");
                self.notifier.send(Notification::DealMoved {
                    deal: deal.clone(),
                    from_stage_id,
                    to_stage_id: target_stage_id,
                });
                MoveOutcome::Confirmed { deal }
            }
            Ok(None) => {
                self.reconcile_failed_move(&deal_id, BoardError::deal_not_found(&deal_id))
                    .await
            }
            Err(err) => self.reconcile_failed_move(&deal_id, err).await,
        }
    }

    async fn reconcile_failed_move(&self, deal_id: &str, err: BoardError) -> MoveOutcome {
        let message = err.to_string();
        tracing::warn!(error = %message, "remote rejected move, reconciling");
        if err.is_unauthorized() {
            self.note_failure(&err);
        } else if let Err(refresh_err) = self.refresh().await {
            tracing::warn!(error = %refresh_err, "reconciling refresh failed");
        }
        self.notifier.send(Notification::MoveFailed {
            deal_id: deal_id.to_string(),
            message: message.clone(),
        });
        MoveOutcome::Reverted { error: message }
    }

    /// Write a stage change through to the remote, then mirror it.
    ///
    /// Unlike [`move_deal`](Self::move_deal) nothing changes locally until
    /// the remote has accepted the write.
    pub async fn assign_stage(&self, deal_id: &str, stage_id: &str) -> Result<Deal, BoardError> {
        let result = async {
            self.ensure_session()?;
            self.remote.set_deal_stage(deal_id, stage_id).await
        }
        .await;
        let remote_deal = match result {
            Ok(Some(deal)) => deal,
            Ok(None) => return Err(BoardError::deal_not_found(deal_id)),
            Err(err) => {
                self.note_failure(&err);
                return Err(err);
            }
        };

        let deal = {
            let mut state = self.state();
            let from_stage_id = state
                .mirror
                .get_deal(deal_id)
                .map(|d| d.stage_id.clone())
                .unwrap_or_default();
            let deal = match state.mirror.apply_stage_reassignment(deal_id, stage_id) {
                Ok(deal) => deal,
                Err(_) => {
                    state.mirror.insert_deal(remote_deal.clone());
                    state.mirror.denormalize_deals();
                    state
                        .mirror
                        .get_deal(deal_id)
                        .cloned()
                        .unwrap_or(remote_deal)
                }
            };
            state.recompute();
            (deal, from_stage_id)
        };
        let (deal, from_stage_id) = deal;
        self.notifier.send(Notification::DealMoved {
            deal: deal.clone(),
            from_stage_id,
            to_stage_id: stage_id.to_string(),
        });
        Ok(deal)
    }

    /// Validate, create remotely, then add the new deal to the board.
    pub async fn create_deal(&self, new_deal: NewDeal) -> Result<Deal, BoardError> {
        let result = self.create_deal_inner(&new_deal).await;
        match &result {
            Ok(deal) => {
                tracing::info!(deal_id = %deal.id, name = %deal.name, "deal created");
                self.notifier
                    .send(Notification::DealCreated { deal: deal.clone() });
            }
            Err(err) => {
                self.note_failure(err);
                self.notifier.send(Notification::CreateFailed {
                    message: err.to_string(),
                });
            }
        }
        result
    }

    async fn create_deal_inner(&self, new_deal: &NewDeal) -> Result<Deal, BoardError> {
        new_deal.validate()?;
        self.ensure_session()?;
        let created = self.remote.create_deal(new_deal).await?;

        let mut state = self.state();
        state.mirror.insert_deal(created.clone());
        state.mirror.denormalize_deals();
        state.recompute();
        Ok(state.mirror.get_deal(&created.id).cloned().unwrap_or(created))
    }

    // ── Filters ──────────────────────────────────────────────────────

    pub fn set_search_text(&self, text: &str) -> BoardProjection {
        let mut state = self.state();
        state.projector.set_search_text(text);
        state.recompute();
        state.projector.projection().clone()
    }

    pub fn set_selected_pipeline(&self, pipeline_id: Option<String>) -> BoardProjection {
        let mut state = self.state();
        state.projector.set_selected_pipeline(pipeline_id);
        state.recompute();
        state.projector.projection().clone()
    }

    /// Replace both filters at once.
    pub fn set_filters(&self, filters: BoardFilters) -> BoardProjection {
        let mut state = self.state();
        state.projector.set_search_text(&filters.search);
        state.projector.set_selected_pipeline(filters.pipeline_id);
        state.recompute();
        state.projector.projection().clone()
    }

    /// Tear down local state (logout or shutdown).
    pub fn shutdown(&self) {
        self.state().clear();
        tracing::info!("board state cleared");
    }
}
