//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::RunArgs;
use crate::ScheduleArgs;
use anyhow::{Context, bail};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use sweeplab_core::config::{load_config, load_config_file, workspace_config_path};
use sweeplab_core::reference::ReferenceFactory;
use sweeplab_core::training::metrics::FinalizedTable;
use sweeplab_core::training::schedule::{WarmupInverseSqrt, rate};
use sweeplab_core::training::store::RunManifest;
use sweeplab_core::{EpochDriver, ExperimentRunner, RunStore, SweepConfig, SweepError};

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, workspace, config_path).map(|_| ()),
        Commands::Schedule(args) => {
            print!("{}", render_schedule(&args)?);
            Ok(())
        }
        Commands::Runs { json } => handle_runs(json, workspace, config_path),
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<SweepConfig> {
    let config = match config_path {
        Some(path) => load_config_file(path),
        None => load_config(Some(workspace), None),
    };
    config.map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

impl RunArgs {
    fn apply(self, config: &mut SweepConfig) {
        let e = &mut config.experiment;
        if let Some(axis) = self.axis {
            e.axis = axis;
        }
        if let Some(values) = self.values {
            e.values = values;
        }
        if let Some(repetitions) = self.repetitions {
            e.repetitions = repetitions;
        }
        if let Some(model_size) = self.model_size {
            e.model_size = model_size;
        }
        if let Some(base_rate) = self.base_rate {
            e.base_rate = base_rate;
        }
        if let Some(batch_size) = self.batch_size {
            e.batch_size = batch_size;
        }
        if let Some(log_interval) = self.log_interval {
            e.log_interval = log_interval;
        }
        if let Some(epochs) = self.epochs {
            e.epochs = epochs;
        }
        if self.schedule {
            config.schedule.enabled = true;
        }
        if self.preview {
            config.data.preview = true;
        }
        if self.drop_last {
            config.data.drop_last = true;
        }
        if let Some(out) = self.out {
            config.output.dir = out;
        }
    }
}

fn output_dir(config: &SweepConfig, workspace: &Path) -> PathBuf {
    if config.output.dir.is_absolute() {
        config.output.dir.clone()
    } else {
        workspace.join(&config.output.dir)
    }
}

fn handle_run(
    args: RunArgs,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<RunManifest> {
    let mut config = load(workspace, config_path)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let plan = config.plan();
    let driver = EpochDriver::new(config.driver_settings())?;
    let runner = ExperimentRunner::new(plan.clone(), driver);
    let mut factory = ReferenceFactory::new(config.clone())?;
    let store = RunStore::new(output_dir(&config, workspace))
        .with_formats(config.output.write_csv, config.output.write_json);

    tracing::info!(
        id = %plan.id,
        axis = %plan.axis,
        values = ?plan.values,
        repetitions = plan.repetitions,
        "Starting sweep"
    );
    let started_at = chrono::Utc::now();

    match runner.run(&mut factory) {
        Ok(outcome) => {
            for skipped in &outcome.skipped {
                eprintln!(
                    "Skipped repetition {}: {}",
                    skipped.repetition, skipped.reason
                );
            }
            let manifest = store
                .save(&plan, &outcome, &config, started_at)
                .context("Failed to store sweep")?;
            print!("{}", render_summary(&outcome.table));
            println!(
                "Stored {} rows in {}",
                manifest.rows,
                store.run_dir(&manifest.id).display()
            );
            Ok(manifest)
        }
        Err(SweepError::TrialFailed {
            repetition,
            trial,
            value,
            partial,
            source,
        }) => {
            // Keep what was recorded before the failure.
            let outcome = partial.finalize(config.experiment.batch_size);
            let manifest = store
                .save(&plan, &outcome, &config, started_at)
                .context("Failed to store partial sweep")?;
            bail!(
                "Trial {} of repetition {} (value {}) failed: {}. {} partial rows from {} finished trials stored in {}",
                trial,
                repetition,
                value,
                source,
                manifest.rows,
                outcome.trials.len(),
                store.run_dir(&manifest.id).display()
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// One line per model-size group: its final row and best evaluation loss.
fn render_summary(table: &FinalizedTable) -> String {
    let mut out = String::new();
    if table.is_empty() {
        out.push_str("No observations recorded.\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{:>10}  {:>14}  {:>10}  {:>10}  {:>10}  {:>14}",
        "model_size", "hyperparameter", "step", "train", "best_eval", "compute"
    );
    for row in table.group_summaries() {
        let _ = writeln!(
            out,
            "{:>10}  {:>14.6}  {:>10}  {:>10.4}  {:>10.4}  {:>14.3e}",
            row.model_size, row.hyperparameter, row.step, row.train_loss, row.eval_min, row.compute
        );
    }
    out
}

fn render_schedule(args: &ScheduleArgs) -> anyhow::Result<String> {
    if args.every == 0 {
        bail!("--every must be at least 1");
    }
    let curve = WarmupInverseSqrt::new(args.d_model, args.factor, args.warmup);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "d_model={} factor={} warmup={} peak_step={:.1}",
        args.d_model,
        args.factor,
        args.warmup,
        curve.peak_step()
    );
    let _ = writeln!(out, "{:>10}  {:>14}", "step", "multiplier");
    for step in (0..=args.steps).step_by(args.every as usize) {
        let _ = writeln!(
            out,
            "{:>10}  {:>14.6e}",
            step,
            rate(step, args.d_model, args.factor, args.warmup)
        );
    }
    Ok(out)
}

fn handle_runs(json: bool, workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load(workspace, config_path)?;
    let store = RunStore::new(output_dir(&config, workspace));
    let manifests = store.list().context("Failed to list stored sweeps")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(());
    }
    if manifests.is_empty() {
        println!("No stored sweeps in {}", store.base_dir().display());
        return Ok(());
    }
    println!("Stored sweeps ({}):", manifests.len());
    for m in &manifests {
        println!(
            "  {}  {}  axis={} values={:?} rows={} skipped={}",
            m.id,
            m.started_at.format("%Y-%m-%d %H:%M:%S"),
            m.plan.axis,
            m.plan.values,
            m.rows,
            m.skipped.len()
        );
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }

            let default_config = SweepConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
