// src/utils/log.rs

//! Console report helpers with server-style framing.
//!
//! Everything is routed through the `log` facade, so the CLI's env_logger
//! and the Lambda's JSON subscriber both pick it up.

use crate::models::{AnalyticsReport, RunSummary};

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Rows of a run summary, in display order.
pub fn run_summary_items(summary: &RunSummary) -> Vec<(&'static str, String)> {
    vec![
        ("Run", summary.run_id.to_string()),
        ("Directories explored", summary.directories_explored.to_string()),
        ("Directory failures", summary.directory_failures.to_string()),
        ("Files discovered", summary.files_discovered.to_string()),
        ("Uploaded", summary.uploaded.to_string()),
        ("Skipped", summary.skipped.to_string()),
        ("Failed", summary.failed.to_string()),
        ("Deferred", summary.deferred.to_string()),
        ("Full-fetch comparisons", summary.full_fetch_comparisons.to_string()),
        ("Population updated", summary.population_updated.to_string()),
        ("Budget exceeded", summary.budget_exceeded.to_string()),
        ("Elapsed", format!("{:.1}s", summary.elapsed_ms as f64 / 1000.0)),
    ]
}

pub fn run_summary(summary: &RunSummary) {
    self::summary("Sync run", &run_summary_items(summary));
}

/// Print the three analytics results.
pub fn analytics_report(report: &AnalyticsReport, limit: usize) {
    let stats = &report.population_stats;
    header("Analytics report");

    step(1, 3, "Population statistics");
    sub_item(&format!(
        "{}-{} ({} years): mean {:.2}, std dev {}",
        stats.min_year,
        stats.max_year,
        stats.count,
        stats.mean,
        stats
            .std_dev
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "n/a".into())
    ));

    step(2, 3, "Best year per series");
    let mut ranked: Vec<_> = report.best_years.iter().collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    for best in ranked.iter().take(limit) {
        sub_item(&format!("{} {} {:.3}", best.series_id, best.year, best.value));
    }
    if report.best_years.len() > limit {
        sub_item(&format!("... {} more series", report.best_years.len() - limit));
    }

    step(3, 3, "Series joined with population");
    for row in report.joined.iter().take(limit) {
        sub_item(&format!(
            "{} {} {} {} {:.0}",
            row.series_id, row.year, row.period, row.value, row.population
        ));
    }
    if report.joined.is_empty() {
        sub_item("no overlapping years");
    }
}
