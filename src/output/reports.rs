use std::fmt::Write;

use cilens_sync::models::PipelineRecord;
use cilens_sync::registry::{InstanceHealth, ProviderDescriptor};
use comfy_table::{Cell, Color as TableColor};

use super::styling::{bright, bright_green, bright_red, bright_yellow, dim};
use super::tables::{
    create_table, cyan_header, duration_cell, health_cell, status_cell, success_rate_cell,
};

pub fn print_providers(descriptors: &[ProviderDescriptor]) {
    println!("{}", render_providers(descriptors));
}

pub fn print_health(report: &[InstanceHealth]) {
    println!("{}", render_health(report));
}

pub fn print_pipelines(repository: &str, pipelines: &[PipelineRecord]) {
    println!("{}", render_pipelines(repository, pipelines));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_providers(descriptors: &[ProviderDescriptor]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🧩", "Registered Providers");

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Type",
        "Name",
        "Required",
        "Optional",
        "Features",
        "Env",
    ]));

    for descriptor in descriptors {
        table.add_row(vec![
            Cell::new(&descriptor.provider_type),
            Cell::new(&descriptor.display_name),
            Cell::new(descriptor.required_fields.join("\n")),
            Cell::new(descriptor.optional_fields.join("\n")).fg(TableColor::DarkGrey),
            Cell::new(descriptor.supported_features.join("\n")),
            Cell::new(if descriptor.env_config { "yes" } else { "no" }),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_health(report: &[InstanceHealth]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🩺", "Provider Health");

    if report.is_empty() {
        let _ = writeln!(
            output,
            "{}\n  {}",
            bright_yellow("No provider instances configured."),
            dim("Set GITHUB_TOKEN, GITLAB_TOKEN or JENKINS_API_KEY, or add a config file.")
        );
        return output;
    }

    let healthy = report.iter().filter(|h| h.healthy).count();
    let summary = if healthy == report.len() {
        bright_green(format!("{healthy}/{} healthy", report.len()))
    } else {
        bright_red(format!("{healthy}/{} healthy", report.len()))
    };
    let _ = writeln!(output, "  {} {summary}\n", dim("Instances:"));

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Instance",
        "Provider",
        "Status",
        "API Calls",
        "Success",
        "Avg Response",
        "Error",
    ]));

    for health in report {
        let (calls, rate, latency) = match &health.metrics {
            Some(metrics) => (
                Cell::new(metrics.api_calls_count),
                success_rate_cell(metrics.api_calls_success_rate),
                Cell::new(format!("{:.0}ms", metrics.average_response_time)),
            ),
            None => (Cell::new("-"), Cell::new("-"), Cell::new("-")),
        };

        table.add_row(vec![
            Cell::new(&health.instance_id),
            Cell::new(&health.provider_type),
            health_cell(health.healthy),
            calls,
            rate,
            latency,
            Cell::new(health.error.as_deref().unwrap_or("")).fg(TableColor::Red),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_pipelines(repository: &str, pipelines: &[PipelineRecord]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📋", "Pipelines");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n",
        dim("Repository:"),
        bright(repository),
        dim("Fetched:"),
        bright_yellow(pipelines.len())
    );

    if pipelines.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No pipelines matched the filter."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "ID", "Name", "Branch", "Status", "Started", "Duration", "Jobs", "Trigger",
    ]));

    for pipeline in pipelines {
        table.add_row(vec![
            Cell::new(&pipeline.id),
            Cell::new(&pipeline.name),
            Cell::new(pipeline.branch.as_deref().unwrap_or("-")),
            status_cell(pipeline.status),
            Cell::new(
                pipeline
                    .started_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string()),
            ),
            duration_cell(pipeline.duration_ms),
            Cell::new(pipeline.jobs.len()),
            Cell::new(format!("{} ({})", pipeline.trigger.event, pipeline.trigger.actor)),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}
