//! Operator CLI: `diagnose <TRACE_ID>`, `diagnose --recent [N]` or
//! `diagnose --runs [N]` (run history with pass-rate statistics).
//!
//! Reads the trace directory from the pipeline config (`$TREND_GATE_CONFIG`,
//! `config/pipeline.toml`, ...). Exit code 2 on usage errors.

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use trend_gate::config::PipelineConfig;
use trend_gate::diagnosis::{self, DiagnosisOutput};
use trend_gate::ledger::Ledger;
use trend_gate::run_log::RunLog;

const DEFAULT_RECENT: usize = 10;

fn usage() -> ExitCode {
    eprintln!("usage: diagnose <TRACE_ID> | diagnose --recent [N] | diagnose --runs [N]");
    ExitCode::from(2)
}

fn parse_count(n: &str) -> Result<usize> {
    n.parse::<usize>().with_context(|| format!("invalid count {n:?}"))
}

fn run(args: &[String]) -> Result<Option<String>> {
    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let ledger = Ledger::file(cfg.storage.trace_dir.clone(), cfg.storage.trace_prefix.clone());
    tracing::debug!(dir = %cfg.storage.trace_dir.display(), "trace store");

    if args.first().is_some_and(|a| a == "--runs") {
        let limit = match args {
            [_] => DEFAULT_RECENT,
            [_, n] => parse_count(n)?,
            _ => return Ok(None),
        };
        let runs = RunLog::json_file(cfg.storage.runs_path());
        return Ok(Some(diagnosis::format_runs(&runs.recent(limit))));
    }

    let (id, limit) = match args {
        [] => (None, DEFAULT_RECENT),
        [flag] if flag == "--recent" => (None, DEFAULT_RECENT),
        [flag, n] if flag == "--recent" => (None, parse_count(n)?),
        [id] => (Some(id.as_str()), DEFAULT_RECENT),
        _ => return Ok(None),
    };

    let out = match diagnosis::diagnose(&ledger, id, limit) {
        DiagnosisOutput::Report(text) => text,
        DiagnosisOutput::Recent(rows) => diagnosis::format_recent(&rows),
        DiagnosisOutput::InvalidId(id) => {
            anyhow::bail!("malformed trace id {id:?} (expected PREFIX-YYYYMMDD-XXXXXX-XXXX)")
        }
    };
    Ok(Some(out))
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return usage();
    }
    match run(&args) {
        Ok(Some(text)) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Ok(None) => usage(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
