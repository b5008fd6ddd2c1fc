use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use cilens_sync::models::PipelineStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn status_cell(status: PipelineStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        PipelineStatus::Success => cell.fg(TableColor::Green),
        PipelineStatus::Failed | PipelineStatus::Timeout => cell.fg(TableColor::Red),
        PipelineStatus::Running | PipelineStatus::Pending => cell.fg(TableColor::Yellow),
        PipelineStatus::Cancelled | PipelineStatus::Skipped | PipelineStatus::Unknown => {
            cell.fg(TableColor::DarkGrey)
        }
    }
}

pub fn health_cell(healthy: bool) -> Cell {
    if healthy {
        Cell::new("healthy").fg(TableColor::Green)
    } else {
        Cell::new("unhealthy").fg(TableColor::Red)
    }
}

pub fn success_rate_cell(rate: f64) -> Cell {
    let text = format!("{rate:.1}%");
    if rate > 80.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if rate >= 50.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

/// Milliseconds rendered as minutes, or "-" when unknown.
#[allow(clippy::cast_precision_loss)]
pub fn duration_cell(duration_ms: Option<i64>) -> Cell {
    match duration_ms {
        Some(ms) => Cell::new(format!("{:.1}min", ms as f64 / 60_000.0)),
        None => Cell::new("-"),
    }
}
