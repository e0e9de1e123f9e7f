//! Terminal tables for planned and executed runs

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use humantime_serde::re::humantime::format_duration;
use libbenchrig_core::TestRun;
use libbenchrig_runner::{BatchReport, RunStatus};

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let joined: Vec<&str> = names.collect();
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined.join(", ")
    }
}

/// Runs a batch would execute, in execution order
pub fn plan_table(runs: &[TestRun]) -> Table {
    let mut table = table(&[
        "#",
        "Test",
        "Tool",
        "Duration",
        "Infrastructure",
        "Collectors",
        "Output",
    ]);
    for (index, run) in runs.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&run.name),
            Cell::new(&run.tool),
            Cell::new(format_duration(run.duration)),
            Cell::new(names(run.infrastructure.iter().map(|s| s.name.as_str()))),
            Cell::new(names(run.metrics.iter().map(|m| m.name.as_str()))),
            Cell::new(run.out_path.display()),
        ]);
    }
    table
}

fn status_cell(status: RunStatus) -> Cell {
    let color = match status {
        RunStatus::Passed => Color::Green,
        RunStatus::Failed => Color::Red,
        RunStatus::Cancelled => Color::Yellow,
    };
    Cell::new(status.as_str()).fg(color)
}

/// Outcome of every executed run
pub fn report_table(report: &BatchReport) -> Table {
    let mut table = table(&["#", "Test", "Tool", "Status", "Elapsed", "Output"]);
    for (index, run) in report.runs.iter().enumerate() {
        let detail = match &run.error {
            Some(error) => error.clone(),
            None => run.out_path.display().to_string(),
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&run.test),
            Cell::new(&run.tool),
            status_cell(run.status),
            Cell::new(format_duration(Duration::from_millis(
                run.elapsed.as_millis() as u64,
            ))),
            Cell::new(detail),
        ]);
    }
    table
}
