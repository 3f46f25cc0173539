//! CLI command implementations.
//!
//! | Module   | Commands handled            |
//! |----------|-----------------------------|
//! | `serve`  | `Serve`                     |
//! | `board`  | `Board`                     |
//! | `deal`   | `Move`, `Create`            |
//! | `config` | `Config`                    |

pub mod board;
pub mod config;
pub mod deal;
pub mod serve;

pub use board::cmd_board;
pub use config::cmd_config;
pub use deal::{cmd_create, cmd_move};
pub use serve::cmd_serve;

use std::sync::Arc;

use anyhow::{Context, Result};

use dealboard::board::BoardController;
use dealboard::config::DealboardConfig;
use dealboard::remote::PipelineService;
use dealboard::remote::hubspot::HubSpotClient;
use dealboard::remote::memory::InMemoryPipelineService;
use dealboard::session::ApiKeySession;

/// Wire a controller to HubSpot, or to the demo board with `--demo`.
pub fn build_controller(config: &DealboardConfig, demo: bool) -> Result<Arc<BoardController>> {
    let (remote, session): (Arc<dyn PipelineService>, ApiKeySession) = if demo {
        tracing::info!("using in-memory demo pipeline");
        (
            Arc::new(InMemoryPipelineService::demo()),
            ApiKeySession::new(Some("demo")),
        )
    } else {
        let client =
            HubSpotClient::new(&config.hubspot).context("Failed to build HubSpot client")?;
        (
            Arc::new(client),
            ApiKeySession::new(config.hubspot.api_key.as_deref()),
        )
    };
    Ok(Arc::new(BoardController::new(remote, Arc::new(session))))
}

/// Initial fetch for the one-shot commands.
pub async fn load_board(controller: &BoardController) -> Result<()> {
    controller.refresh().await.context(
        "Failed to load the board. Set HUBSPOT_API_KEY (or [hubspot] api_key) or pass --demo",
    )?;
    Ok(())
}
