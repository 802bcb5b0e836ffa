use std::path::Path;

use sqlshift_db::{MigrationEvent, RunReport, VersionStatus};

/// Print a boxed summary of a finished run.
pub fn print_run_summary(report: &RunReport, db_path: &Path, status: &VersionStatus) {
    let version = env!("CARGO_PKG_VERSION");

    let applied = if report.applied.is_empty() {
        "none".to_string()
    } else {
        report
            .applied
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let db_display = match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => db_path.to_string_lossy().replace(&home, "~"),
        _ => db_path.to_string_lossy().to_string(),
    };

    let width: usize = 64;
    let label_w = 12;
    let value_w = width - label_w - 5;

    let title = format!("sqlshift v{version} · {}", report.direction);
    let title_dashes = width.saturating_sub(2 + title.chars().count() + 5);
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));

    let row = |l: &str, r: &str| format!("│ {:<label_w$}{:<value_w$.value_w$}  │", l, r);

    println!("{top}");
    println!("{}", row("Database", &db_display));
    println!("{}", row("Applied", &applied));
    println!("{}", row("Skipped", &report.skipped().to_string()));
    println!("{}", row("Now at", &status.to_string()));
    println!("{bottom}");

    for event in &report.events {
        if let Some(line) = describe(event) {
            println!("  {line}");
        }
    }
}

fn describe(event: &MigrationEvent) -> Option<String> {
    match event {
        MigrationEvent::SkippedApplied { .. } => None,
        MigrationEvent::SkippedDialect { version, name, .. } => {
            Some(format!("- {version} {name}: other dialect"))
        }
        MigrationEvent::SkippedProfile { version, name, .. } => {
            Some(format!("- {version} {name}: excluded by profile"))
        }
        MigrationEvent::Applied {
            version,
            name,
            statements,
            ..
        } => Some(format!(
            "+ {version} {name} ({statements} statement{})",
            if *statements == 1 { "" } else { "s" }
        )),
        MigrationEvent::Failed {
            version,
            name,
            statement,
            ..
        } => Some(format!("! {version} {name}: failed at statement {statement}")),
    }
}
