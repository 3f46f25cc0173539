//! Deal mutations: `dealboard move` and `dealboard create`.

use anyhow::{Result, bail};
use console::style;

use dealboard::board::{BoardController, MoveOutcome, MoveRequest};
use dealboard_common::NewDeal;

use super::board::format_amount;

pub async fn cmd_move(
    controller: &BoardController,
    deal_id: &str,
    from_stage: &str,
    to_stage: &str,
    index: Option<usize>,
) -> Result<()> {
    super::load_board(controller).await?;

    let mut request = MoveRequest::new(deal_id, from_stage, to_stage);
    request.target_index = index;

    match controller.move_deal(request).await {
        MoveOutcome::Unchanged => {
            println!("{}", style("Nothing to do: deal is already in that stage.").dim());
        }
        MoveOutcome::Reordered => {
            println!("Reordered {} within {}", deal_id, to_stage);
        }
        MoveOutcome::Confirmed { deal } => {
            println!(
                "{} \"{}\" is now in {} ({}%)",
                style("Moved").green().bold(),
                deal.name,
                style(&deal.stage_name).bold(),
                deal.probability_percent()
            );
        }
        MoveOutcome::Reverted { error } => {
            bail!("Move failed and was reverted: {}", error);
        }
        MoveOutcome::NotFound { message } => {
            bail!("{}", message);
        }
    }
    Ok(())
}

pub async fn cmd_create(
    controller: &BoardController,
    name: &str,
    pipeline: &str,
    stage: &str,
    amount: Option<i64>,
) -> Result<()> {
    let new_deal = NewDeal {
        name: name.to_string(),
        amount,
        pipeline_id: pipeline.to_string(),
        stage_id: stage.to_string(),
    };
    // Fail on bad input before any network traffic.
    new_deal.validate()?;
    super::load_board(controller).await?;

    let deal = controller.create_deal(new_deal).await?;
    println!(
        "{} \"{}\" [{}] in {} / {}  {}",
        style("Created").green().bold(),
        deal.name,
        deal.id,
        deal.pipeline_name,
        deal.stage_name,
        format_amount(deal.amount)
    );
    Ok(())
}
