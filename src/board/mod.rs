//! Board core: the local mirror of CRM data, the stage-grouped projection
//! rendered as kanban columns, and the controller that applies moves
//! optimistically and reconciles them with the remote service.
//!
//! ```text
//!   PipelineService ──fetch──▶ MirrorStore ──project──▶ Projector ──▶ columns
//!          ▲                        ▲                       ▲
//!          └──── write ──── BoardController ── optimistic ──┘
//!                                  │
//!                                  └──▶ Notifier (broadcast)
//! ```

pub mod controller;
pub mod mirror;
pub mod notify;
pub mod projector;

pub use controller::{BoardController, BoardSnapshot, MoveOutcome, MoveRequest, RefreshReport};
pub use mirror::MirrorStore;
pub use notify::{Notification, Notifier};
pub use projector::{BoardFilters, BoardProjection, Projector, StageColumn};

#[cfg(test)]
pub(crate) mod testing {
    use dealboard_common::{Deal, Pipeline, Stage};

    pub fn pipeline(id: &str, name: &str, order: i32) -> Pipeline {
        Pipeline {
            id: id.into(),
            name: name.into(),
            display_order: order,
            active: true,
        }
    }

    pub fn stage(id: &str, pipeline_id: &str, label: &str, order: i32, probability: &str) -> Stage {
        Stage {
            id: id.into(),
            pipeline_id: pipeline_id.into(),
            label: label.into(),
            display_order: order,
            probability: probability.into(),
            is_closed: false,
            metadata: None,
        }
    }

    pub fn deal(id: &str, name: &str, stage_id: &str, pipeline_id: &str) -> Deal {
        Deal {
            id: id.into(),
            name: name.into(),
            amount: None,
            stage_id: stage_id.into(),
            stage_name: String::new(),
            pipeline_id: pipeline_id.into(),
            pipeline_name: String::new(),
            probability: String::new(),
            company: None,
            contact: None,
            last_updated: None,
            metadata: None,
        }
    }
}
