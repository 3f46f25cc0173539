//! Proxy server command: `dealboard serve`.

use anyhow::Result;
use console::style;

use dealboard::config::DealboardConfig;
use dealboard::server;

pub async fn cmd_serve(config: &DealboardConfig, demo: bool) -> Result<()> {
    if !demo {
        for warning in config.validate() {
            println!("{} {}", style("warning:").yellow().bold(), warning);
        }
    }

    let controller = super::build_controller(config, demo)?;
    let listener = server::bind(&config.server).await?;
    let url = format!("http://{}", listener.local_addr()?);
    println!("{} {}", style("Dealboard running at").bold(), style(&url).cyan());

    // No browser in dev mode; the front-end dev server has its own URL.
    if config.server.open_browser && !config.server.dev_mode {
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "failed to open browser");
            }
        });
    }

    server::serve(listener, controller, config.server.dev_mode).await?;
    println!("Server shut down gracefully.");
    Ok(())
}
