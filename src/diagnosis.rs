//! Diagnosis entry point: render a trace as a fixed-structure report, or list
//! recent traces when no id is given.

use crate::ledger::{is_trace_id, Ledger, Level, ModuleState, TraceRecord, TraceSummary};
use crate::run_log::RunHistory;

pub const MAX_ERRORS_SHOWN: usize = 5;
pub const MAX_LOG_LINES: usize = 10;
const RULE: &str = "============================================================";

pub fn not_found_report(trace_id: &str) -> String {
    format!("Trace not found: {trace_id}")
}

fn line(out: &mut String, text: impl AsRef<str>) {
    out.push_str(text.as_ref());
    out.push('\n');
}

/// Distinct run ids recorded in the trace's log data, first-seen order.
fn run_ids(r: &TraceRecord) -> Vec<&str> {
    let mut ids: Vec<&str> = Vec::new();
    for id in r.logs.iter().filter_map(|l| l.data.get("run_id")?.as_str()) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

pub fn render_report(r: &TraceRecord) -> String {
    let mut out = String::new();
    line(&mut out, RULE);
    line(&mut out, format!("Diagnosis report: {}", r.trace_id));
    line(&mut out, RULE);
    line(&mut out, "");

    line(&mut out, "Basic info:");
    line(&mut out, format!("  Name:     {}", r.name));
    line(&mut out, format!("  Source:   {}", r.source));
    line(&mut out, format!("  Created:  {}", r.created_at.to_rfc3339()));
    line(&mut out, format!("  Status:   {}", r.status.as_str()));
    let runs = run_ids(r);
    if !runs.is_empty() {
        line(&mut out, format!("  Runs:     {}", runs.join(", ")));
    }
    line(&mut out, "");

    line(&mut out, format!("Modules ({}):", r.modules.len()));
    for (name, m) in &r.modules {
        let (mark, state) = match m.status {
            ModuleState::Success => ("[ok]", "success"),
            ModuleState::Error => ("[error]", "error"),
            ModuleState::Running => ("[running]", "running"),
        };
        line(&mut out, format!("  {mark} {name}: {state} ({} log entries)", m.log_count));
    }
    line(&mut out, "");

    if !r.errors.is_empty() {
        line(&mut out, format!("Errors ({}):", r.errors.len()));
        for e in r.errors.iter().rev().take(MAX_ERRORS_SHOWN) {
            line(&mut out, format!("  [{}] {}", e.module, e.message));
            if !e.data.is_null() {
                let data: String = e.data.to_string().chars().take(100).collect();
                line(&mut out, format!("    data: {data}"));
            }
        }
        line(&mut out, "");
    }

    line(&mut out, "Key log lines:");
    let key: Vec<_> = r
        .logs
        .iter()
        .filter(|l| matches!(l.level, Level::Info | Level::Error))
        .collect();
    let skip = key.len().saturating_sub(MAX_LOG_LINES);
    for l in key.into_iter().skip(skip) {
        let mark = if l.level == Level::Error { "ERR" } else { "INF" };
        let msg: String = l.message.chars().take(80).collect();
        line(
            &mut out,
            format!("  {mark} [{}] {}: {msg}", l.timestamp.format("%H:%M:%S"), l.module),
        );
    }
    line(&mut out, "");

    line(&mut out, format!("Source link: {}", r.url));
    line(&mut out, "");
    out.push_str(RULE);
    out
}

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosisOutput {
    Report(String),
    Recent(Vec<TraceSummary>),
    /// The id does not have the minted shape.
    InvalidId(String),
}

/// Report for a well-formed id, else the `limit` most recent summaries.
pub fn diagnose(ledger: &Ledger, trace_id: Option<&str>, limit: usize) -> DiagnosisOutput {
    match trace_id.map(str::trim) {
        Some(id) if !is_trace_id(id) => DiagnosisOutput::InvalidId(id.to_string()),
        Some(id) => DiagnosisOutput::Report(ledger.diagnose(id)),
        None => DiagnosisOutput::Recent(ledger.list_recent(limit)),
    }
}

pub fn format_recent(rows: &[TraceSummary]) -> String {
    if rows.is_empty() {
        return "No traces recorded.".to_string();
    }
    rows.iter()
        .map(|t| {
            format!(
                "{}  {:<9}  {:<16}  {}  {}",
                t.trace_id,
                t.status.as_str(),
                t.source,
                t.created_at.format("%Y-%m-%d %H:%M:%S"),
                t.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Statistics header plus one line per run, as given (most recent first).
pub fn format_runs(history: &RunHistory) -> String {
    let st = &history.statistics;
    let mut out = String::new();
    line(
        &mut out,
        format!(
            "runs: {}  success: {}  fallback: {}  pass rate: {:.0}%  avg iterations to pass: {:.1}",
            st.total_runs,
            st.successful_runs,
            st.fallback_runs,
            st.pass_rate * 100.0,
            st.avg_iterations_to_pass
        ),
    );
    if history.runs.is_empty() {
        out.push_str("No runs recorded.");
        return out;
    }
    let rows: Vec<String> = history
        .runs
        .iter()
        .map(|r| {
            let delivered = r.published.iter().filter(|p| p.success).count();
            format!(
                "{}  {:<13}  iterations {}  published {}/{}  {}",
                r.run_id,
                r.outcome.label(),
                r.iterations.len(),
                delivered,
                r.published.len(),
                r.finished_at.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect();
    out.push_str(&rows.join("\n"));
    out
}
