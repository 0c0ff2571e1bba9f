//! Startup summary of a built flow

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use metricflow_interfaces::ModuleCategory;

use crate::flow::{Flow, InstanceInfo};

const DISABLED: &str = "[>disabled!<]";

fn check(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// `[SRC]name`, `[TR<index>]name` or `[SNK]name`
pub fn short_id(info: &InstanceInfo) -> String {
    match info.category {
        ModuleCategory::Transform => format!("[TR{}]{}", info.index, info.name),
        category => format!("[{}]{}", category.tag(), info.name),
    }
}

/// Time until `next` as `HH:MM:SS`, whole seconds
fn remaining(now: DateTime<Utc>, next: DateTime<Utc>) -> String {
    let seconds = (next - now).num_seconds().max(0);
    let (hours, rest) = (seconds / 3600, seconds % 3600);
    format!("{:02}:{:02}:{:02}", hours, rest / 60, rest % 60)
}

/// One line per task: time until the next run, name and chain of modules
pub fn task_lines(flow: &Flow, now: DateTime<Utc>) -> Vec<String> {
    let mut tasks: Vec<_> = flow.tasks().iter().collect();
    tasks.sort_by(|a, b| a.name.cmp(&b.name));

    let rows: Vec<(String, &str, String)> = tasks
        .into_iter()
        .map(|task| {
            let delta = match (task.enabled, task.next_run(now)) {
                (true, Some(next)) => format!("[in {}]", remaining(now, next)),
                (true, None) => "[never]".to_string(),
                (false, _) => DISABLED.to_string(),
            };
            let chain = flow
                .chain(task, true)
                .into_iter()
                .map(short_id)
                .collect::<Vec<_>>()
                .join(" -> ");
            (delta, task.name.as_str(), chain)
        })
        .collect();

    let time_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
    let name_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(delta, name, chain)| {
            format!("  {delta:>time_width$} {name:<name_width$} : {chain}")
        })
        .collect()
}

/// Banner printed before the dispatcher starts
pub fn startup_summary(flow: &Flow, version: &str, now: DateTime<Utc>) -> String {
    let settings = flow.settings();
    let path = flow
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "\n-< Welcome to metricflow! >-\n");
    let _ = writeln!(out, "Version:\t{version}");
    let _ = writeln!(out, "Configuration:\t{path}");
    let _ = writeln!(out, "Settings:");
    let _ = writeln!(out, "  Log Level       : {}", settings.log_level.as_str());
    let _ = writeln!(out, "  Allow Exec      : {}", check(settings.allow_exec));
    let _ = writeln!(out, "  Outputs         : {}", check(!settings.disable_outputs));
    let _ = writeln!(out, "  Print Traceback : {}", check(settings.print_traceback));
    let _ = writeln!(out, "  Attr Separator  : {}", settings.nested_attr_separator);
    let _ = writeln!(out, "  Run Once        : {}", check(settings.run_once));

    let _ = writeln!(out, "\nConfigured Tasks:");
    for line in task_lines(flow, now) {
        let _ = writeln!(out, "{line}");
    }

    if !flow.skipped_modules().is_empty() {
        let _ = writeln!(out, "\nSkipped Modules:");
        for info in flow.skipped_modules() {
            let _ = writeln!(out, "  {} ({})", short_id(info), info.type_name);
        }
    }
    out
}
