use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::BenchConfig;
use crate::engine::{MethodRun, PhaseExecutor};
use crate::external::Collaborators;
use crate::model::{Method, RunManifest, RunManifestUnit, RunRecord, RunStatus};
use crate::phases::build_phase_catalog;
use crate::profiles::{CaseProfile, get_case_profile};
use crate::staging::DiskStaging;
use crate::store;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    PlanOnly,
    Execute,
}

pub fn resolve_run_mode(plan_only: bool, execute: bool) -> Result<RunMode> {
    match (plan_only, execute) {
        (true, true) => bail!("use either --plan-only or --execute, not both"),
        (_, true) => Ok(RunMode::Execute),
        _ => Ok(RunMode::PlanOnly),
    }
}

/// Case ids in first-seen order, validated against the profile registry.
pub fn resolve_profiles(case_ids: &[String]) -> Result<Vec<CaseProfile>> {
    let mut profiles: Vec<CaseProfile> = Vec::new();
    for case_id in case_ids {
        let profile = get_case_profile(case_id)?;
        if !profiles.iter().any(|seen| seen.case_id == profile.case_id) {
            profiles.push(profile);
        }
    }
    if profiles.is_empty() {
        bail!("at least one --case-id is required");
    }
    Ok(profiles)
}

pub fn config_from_args(args: &RunArgs) -> BenchConfig {
    let baseline_command = Some(args.baseline_command.trim())
        .filter(|command| !command.is_empty())
        .map(ToOwned::to_owned);

    BenchConfig {
        model_key: args.model.trim().to_string(),
        noise_token: args.noise_token.clone(),
        max_context_chars: args.max_context_chars,
        max_output_chars: args.max_output_chars,
        project_root: args.project_root.clone(),
        artifacts_root: args.artifacts_root.clone(),
        query_endpoint: args.query_endpoint.clone(),
        query_timeout_ms: args.query_timeout_ms,
        baseline_command,
        baseline_timeout_ms: args.baseline_timeout_ms,
        ..BenchConfig::default()
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let mode = resolve_run_mode(args.plan_only, args.execute)?;
    let profiles = resolve_profiles(&args.case_ids)?;
    let config = config_from_args(&args);
    config.validate()?;

    let started_ts = Utc::now();
    let run = RunRecord {
        run_id: format!("run-{}", utc_compact_string(started_ts)),
        generated_at: now_utc_string(),
        model_key: config.model_key.clone(),
        status: RunStatus::Planned,
        notes: args.notes.clone(),
    };
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| config.artifacts_root.join(&run.run_id).join("run_manifest.json"));

    info!(
        run_id = %run.run_id,
        cases = profiles.len(),
        mode = ?mode,
        db_path = %args.db_path.display(),
        "starting agent benchmark"
    );

    let mut connection = store::open_database(&args.db_path)?;
    let phases = build_phase_catalog();
    let planned_steps = store::insert_planned_run(&mut connection, &run, &profiles, &phases)?;
    info!(run_id = %run.run_id, planned_steps, phases_per_method = phases.len(), "run planned");

    let mut warnings = Vec::new();
    let (status, units) = match mode {
        RunMode::PlanOnly => {
            info!(run_id = %run.run_id, "plan-only run; phases not executed");
            (RunStatus::Planned, Vec::new())
        }
        RunMode::Execute => {
            let collaborators = Collaborators::from_config(&config);
            let units = execute_run(
                &mut connection,
                &config,
                &collaborators,
                &run,
                &profiles,
                args.parallel_methods,
            )?;
            for unit in &units {
                if unit.degraded_phases > 0 {
                    warnings.push(format!(
                        "{}/{}: {} degraded phase(s)",
                        unit.case_id, unit.method, unit.degraded_phases
                    ));
                }
            }
            (RunStatus::Executed, units)
        }
    };

    if warnings.is_empty() {
        info!(run_id = %run.run_id, status = status.as_str(), "agent benchmark finished");
    } else {
        warn!(
            run_id = %run.run_id,
            status = status.as_str(),
            warnings = warnings.len(),
            "agent benchmark finished with degraded phases"
        );
    }

    let manifest = RunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run.run_id.clone(),
        generated_at: run.generated_at.clone(),
        updated_at: now_utc_string(),
        status: status.as_str().to_string(),
        model_key: run.model_key.clone(),
        cases: profiles.iter().map(|profile| profile.case_id.to_string()).collect(),
        methods: Method::ALL.iter().map(|method| method.to_string()).collect(),
        phases_per_method: phases.len(),
        db_path: args.db_path.display().to_string(),
        artifacts_root: config.artifacts_root.join(&run.run_id).display().to_string(),
        units,
        warnings,
        notes: vec![run.notes.clone()],
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "run manifest written");

    Ok(())
}

/// Executes every (case, method) unit of a planned run, persisting each unit as it finishes.
pub fn execute_run(
    connection: &mut Connection,
    config: &BenchConfig,
    collaborators: &Collaborators,
    run: &RunRecord,
    profiles: &[CaseProfile],
    parallel_methods: bool,
) -> Result<Vec<RunManifestUnit>> {
    let executor = PhaseExecutor::new(config, collaborators);
    let run_root = config.artifacts_root.join(&run.run_id);
    let mut units = Vec::new();

    for profile in profiles {
        info!(
            run_id = %run.run_id,
            case_id = profile.case_id,
            case_name = profile.name,
            "executing case"
        );
        let method_runs = if parallel_methods {
            run_methods_parallel(&executor, &run_root, &run.run_id, profile)?
        } else {
            Method::ALL
                .iter()
                .map(|method| run_method(&executor, &run_root, &run.run_id, profile, *method))
                .collect::<Result<Vec<_>>>()?
        };

        for method_run in method_runs {
            store::persist_method_run(connection, &method_run, executor.phases())?;
            units.push(RunManifestUnit {
                case_id: method_run.result.case_id.clone(),
                method: method_run.result.method.to_string(),
                total_tokens: method_run.result.total_tokens,
                completed_phases: method_run.result.completed_phases,
                degraded_phases: method_run.degraded_phases(),
                stress: method_run.stress,
            });
        }
    }

    store::mark_run_executed(connection, &run.run_id)?;
    store::refresh_ranking_tables(connection)?;
    Ok(units)
}

fn staging_root(run_root: &Path, case_id: &str, method: Method) -> PathBuf {
    run_root.join(case_id).join(method.as_str())
}

fn run_method(
    executor: &PhaseExecutor<'_>,
    run_root: &Path,
    run_id: &str,
    profile: &CaseProfile,
    method: Method,
) -> Result<MethodRun> {
    let root = staging_root(run_root, profile.case_id, method);
    let mut staging = DiskStaging::new(root.clone(), root);
    executor.execute_method(run_id, profile, method, &mut staging)
}

fn run_methods_parallel(
    executor: &PhaseExecutor<'_>,
    run_root: &Path,
    run_id: &str,
    profile: &CaseProfile,
) -> Result<Vec<MethodRun>> {
    thread::scope(|scope| {
        let handles = Method::ALL
            .iter()
            .map(|method| {
                let method = *method;
                scope.spawn(move || run_method(executor, run_root, run_id, profile, method))
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("method worker panicked"))?
            })
            .collect()
    })
}
