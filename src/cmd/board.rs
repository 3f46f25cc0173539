//! Text board: `dealboard board`.

use anyhow::Result;
use console::style;

use dealboard::board::{BoardController, BoardSnapshot, StageColumn};
use dealboard_common::{Deal, probability_percent};

pub async fn cmd_board(
    controller: &BoardController,
    pipeline: Option<String>,
    search: Option<&str>,
) -> Result<()> {
    super::load_board(controller).await?;
    if let Some(id) = &pipeline {
        if controller.board().pipelines.iter().all(|p| &p.id != id) {
            anyhow::bail!("Unknown pipeline '{}'", id);
        }
    }
    controller.set_selected_pipeline(pipeline);
    if let Some(text) = search {
        controller.set_search_text(text);
    }
    print!("{}", render_board(&controller.board()));
    Ok(())
}

/// Render the board as one block per column.
pub fn render_board(board: &BoardSnapshot) -> String {
    let mut out = String::new();
    let title = match &board.filters.pipeline_id {
        Some(id) => board
            .pipelines
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.clone()),
        None => "All pipelines".to_string(),
    };
    out.push_str(&format!("\n{}\n", style(title).bold().cyan()));
    if !board.filters.search.is_empty() {
        out.push_str(&format!(
            "{}\n",
            style(format!("Filtered by \"{}\"", board.filters.search)).dim()
        ));
    }
    if let Some(at) = board.last_refreshed {
        out.push_str(&format!(
            "{}\n",
            style(format!("Updated {}", at.format("%b %-d, %Y %-I:%M %p"))).dim()
        ));
    }
    if board.columns.is_empty() {
        out.push_str("\nNo stages to show.\n");
        return out;
    }
    for column in &board.columns {
        out.push('\n');
        out.push_str(&render_column(column));
    }
    out
}

fn render_column(column: &StageColumn) -> String {
    let closed = if column.is_closed { " closed" } else { "" };
    let mut out = format!(
        "{} {}\n",
        style(&column.label).bold(),
        style(format!(
            "({} deals, {}, {}%{})",
            column.deals.len(),
            format_amount(Some(column.total_amount())),
            probability_percent(&column.probability),
            closed
        ))
        .dim()
    );
    if column.deals.is_empty() {
        out.push_str(&format!("  {}\n", style("-").dim()));
    }
    for deal in &column.deals {
        out.push_str(&render_deal(deal));
    }
    out
}

fn render_deal(deal: &Deal) -> String {
    let mut line = format!("  {} {}", style(&deal.id).dim(), deal.name);
    line.push_str(&format!("  {}", style(format_amount(deal.amount)).green()));
    if let Some(company) = &deal.company {
        line.push_str(&format!("  {}", company));
    }
    if let Some(contact) = &deal.contact {
        line.push_str(&format!("  {}", style(contact).dim()));
    }
    line.push('\n');
    line
}

/// `$12,500`, or `-` when unknown.
pub fn format_amount(amount: Option<i64>) -> String {
    let Some(amount) = amount else {
        return "-".to_string();
    };
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}${grouped}")
}
