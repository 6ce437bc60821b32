use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ReportArgs;
use crate::engine::{MethodComparison, compare_by_method};
use crate::model::RunRecord;
use crate::ranking::{CaseWinner, WeightedScore, determine_winners, weighted_scores};
use crate::store;
use crate::util::{ensure_directory, now_utc_string};

const DEFAULT_REPORT_FILE: &str = "agent_mode_report.md";

pub fn run(args: ReportArgs) -> Result<()> {
    let Some(connection) = store::open_existing(&args.db_path)? else {
        warn!(path = %args.db_path.display(), "database file missing; nothing to report");
        return Ok(());
    };

    let rows = store::load_ranking_rows(&connection)?;
    let scores = weighted_scores(&rows);
    let winners = determine_winners(&scores);
    let latest = store::latest_executed_runs(&connection, 1)?.into_iter().next();
    let comparison = match &latest {
        Some(run) => compare_by_method(&store::load_run_results(&connection, &run.run_id)?),
        None => Vec::new(),
    };

    let markdown = render_report(latest.as_ref(), &scores, &winners, &comparison, &now_utc_string());

    let output_path = args.output.clone().unwrap_or_else(|| {
        args.db_path
            .parent()
            .map(|parent| parent.join(DEFAULT_REPORT_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_FILE))
    });
    if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    fs::write(&output_path, markdown)
        .with_context(|| format!("failed to write report: {}", output_path.display()))?;

    info!(
        path = %output_path.display(),
        scores = scores.len(),
        winners = winners.len(),
        "report written"
    );
    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.4}"))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn render_report(
    latest: Option<&RunRecord>,
    scores: &[WeightedScore],
    winners: &[CaseWinner],
    comparison: &[MethodComparison],
    generated_at: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Agent-Mode Benchmark Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "- generated_at: {generated_at}");
    match latest {
        Some(run) => {
            let _ = writeln!(out, "- latest_executed_run: {}", run.run_id);
            let _ = writeln!(out, "- model: {}", run.model_key);
        }
        None => {
            let _ = writeln!(out, "- latest_executed_run: none");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Weighted Scores");
    let _ = writeln!(out);
    if scores.is_empty() {
        let _ = writeln!(out, "No executed runs yet.");
    } else {
        let _ = writeln!(
            out,
            "| case | method | run | tokens | accuracy | change_tracking | retention | case_metric | token_efficiency | weighted_score |"
        );
        let _ = writeln!(out, "|---|---|---|---:|---:|---:|---:|---:|---:|---:|");
        for score in scores {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {:.4} | {:.4} | {} | {:.4} | {} | {:.4} |",
                score.case_id,
                score.method,
                score.run_id,
                score.total_tokens,
                score.avg_accuracy,
                score.avg_change_tracking,
                format_optional(score.retention_score),
                score.case_metric,
                format_optional(score.token_efficiency),
                score.weighted_score
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Winners");
    let _ = writeln!(out);
    if winners.is_empty() {
        let _ = writeln!(out, "No winners determined.");
    } else {
        let _ = writeln!(out, "| case | winner | winner_score | second_score | delta |");
        let _ = writeln!(out, "|---|---|---:|---:|---:|");
        for winner in winners {
            let _ = writeln!(
                out,
                "| {} | {} | {:.4} | {:.4} | {:.4} |",
                winner.case_id,
                winner.winner.as_str(),
                winner.winner_score,
                winner.second_score,
                winner.score_delta
            );
        }
    }

    if !comparison.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Latest Run by Method");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "| method | cases | tokens | accuracy | change_tracking | retention |"
        );
        let _ = writeln!(out, "|---|---:|---:|---:|---:|---:|");
        for row in comparison {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {:.4} | {:.4} | {:.4} |",
                row.method,
                row.cases,
                row.total_tokens,
                row.avg_accuracy,
                row.avg_change_tracking,
                row.avg_retention
            );
        }
    }

    out
}
