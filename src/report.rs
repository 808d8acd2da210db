// src/report.rs

use crate::{constants::APP_NAME, reconciler::{RunMode, RunReport}};

const REBOOT_NOTICE: &str = "Reboot recommended.";

fn mode_title(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Apply => "APPLY",
        RunMode::Restore => "RESTORE",
        RunMode::Audit => "AUDIT",
    }
}

fn push_section(lines: &mut Vec<String>, heading: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    lines.push(heading.to_string());
    for entry in entries {
        lines.push(format!("  - {}", entry));
    }
    lines.push(String::new());
}

/// Renders the five buckets in fixed order plus the closing reboot notice.
/// Formatting only; empty buckets are omitted.
pub fn build_summary(mode: RunMode, report: &RunReport) -> String {
    let mut lines = vec![format!("{} - {} result", APP_NAME, mode_title(mode)), String::new()];

    push_section(&mut lines, "Applied (changed this run):", &report.applied);
    push_section(&mut lines, "Restored (changed this run):", &report.restored);
    push_section(
        &mut lines,
        "Already compliant / no change needed:",
        &report.already,
    );
    push_section(&mut lines, "Would change (audit mode):", &report.audit);
    push_section(&mut lines, "Failed:", &report.failed);

    lines.push(REBOOT_NOTICE.to_string());
    lines.join("\n")
}
