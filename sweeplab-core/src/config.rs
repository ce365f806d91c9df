//! Configuration for sweeplab.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. The user file
//! lives in the platform config directory (`sweeplab/config.toml`), the
//! workspace file at `.sweeplab/config.toml`.

use crate::error::SweepError;
use crate::reference::data::MAX_NOISE;
use crate::training::driver::DriverSettings;
use crate::training::sweep::SweepPlan;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// What to sweep and how each trial trains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Sweep axis selector: `"s"` (model size) or `"lr"` (learning rate).
    #[serde(default = "default_axis")]
    pub axis: String,
    #[serde(default = "default_values")]
    pub values: Vec<f64>,
    #[serde(default = "default_one")]
    pub repetitions: usize,
    /// Model size held fixed during learning-rate sweeps.
    #[serde(default = "default_model_size")]
    pub model_size: f64,
    /// Base learning rate held fixed during model-size sweeps.
    #[serde(default = "default_base_rate")]
    pub base_rate: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_size")]
    pub eval_batch_size: usize,
    /// How many times the training set is repeated per epoch.
    #[serde(default = "default_one")]
    pub data_augment: usize,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    #[serde(default = "default_one")]
    pub epochs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            axis: default_axis(),
            values: default_values(),
            repetitions: 1,
            model_size: default_model_size(),
            base_rate: default_base_rate(),
            batch_size: default_batch_size(),
            eval_batch_size: default_batch_size(),
            data_augment: 1,
            log_interval: default_log_interval(),
            epochs: 1,
            seed: default_seed(),
        }
    }
}

fn default_axis() -> String {
    "s".to_string()
}

fn default_values() -> Vec<f64> {
    vec![1.0, 2.0, 4.0, 8.0]
}

fn default_one() -> usize {
    1
}

fn default_model_size() -> f64 {
    8.0
}

fn default_base_rate() -> f64 {
    0.01
}

fn default_batch_size() -> usize {
    128
}

fn default_log_interval() -> usize {
    50
}

fn default_seed() -> u64 {
    42
}

/// Warmup/inverse-square-root schedule applied per optimizer step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_warmup")]
    pub warmup: u64,
    /// Width the curve is normalised by; the trial's model size when unset.
    #[serde(default)]
    pub d_model: Option<f64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: default_factor(),
            warmup: default_warmup(),
            d_model: None,
        }
    }
}

fn default_factor() -> f64 {
    1.0
}

fn default_warmup() -> u64 {
    400
}

/// Shape of the built-in synthetic classification data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_train_samples")]
    pub train_samples: usize,
    #[serde(default = "default_eval_samples")]
    pub eval_samples: usize,
    #[serde(default = "default_features")]
    pub features: usize,
    #[serde(default = "default_classes")]
    pub classes: usize,
    /// Half-width of the uniform noise added around each class prototype.
    #[serde(default = "default_noise")]
    pub noise: f64,
    #[serde(default)]
    pub label_smoothing: f64,
    /// Log predicted and target labels for the first evaluation batch.
    #[serde(default)]
    pub preview: bool,
    /// Skip the trailing training batch when it is smaller than `batch_size`.
    #[serde(default)]
    pub drop_last: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_samples: default_train_samples(),
            eval_samples: default_eval_samples(),
            features: default_features(),
            classes: default_classes(),
            noise: default_noise(),
            label_smoothing: 0.0,
            preview: false,
            drop_last: false,
        }
    }
}

fn default_train_samples() -> usize {
    12_800
}

fn default_eval_samples() -> usize {
    1_280
}

fn default_features() -> usize {
    64
}

fn default_classes() -> usize {
    10
}

fn default_noise() -> f64 {
    0.8
}

/// Where finished sweeps are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub write_csv: bool,
    #[serde(default = "default_true")]
    pub write_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_csv: true,
            write_json: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".sweeplab/runs")
}

fn default_true() -> bool {
    true
}

impl SweepConfig {
    /// Reject values no sweep can run with.
    pub fn validate(&self) -> Result<(), SweepError> {
        let e = &self.experiment;
        self.driver_settings().validate()?;
        if e.values.is_empty() {
            return Err(SweepError::config("experiment.values must not be empty"));
        }
        if e.eval_batch_size == 0 {
            return Err(SweepError::config("eval_batch_size must be at least 1"));
        }
        if e.data_augment == 0 {
            return Err(SweepError::config("data_augment must be at least 1"));
        }
        if !(e.model_size > 0.0) {
            return Err(SweepError::config("model_size must be positive"));
        }
        if !(e.base_rate > 0.0) {
            return Err(SweepError::config("base_rate must be positive"));
        }
        if e.values.iter().any(|v| !(*v > 0.0)) {
            return Err(SweepError::config("sweep values must be positive"));
        }
        let d = &self.data;
        if d.train_samples == 0 || d.eval_samples == 0 {
            return Err(SweepError::config("data sample counts must be positive"));
        }
        if d.features == 0 || d.classes < 2 {
            return Err(SweepError::config(
                "data needs at least one feature and two classes",
            ));
        }
        if !(0.0..=MAX_NOISE).contains(&d.noise) {
            return Err(SweepError::config(format!(
                "data.noise must lie in [0, {MAX_NOISE}]"
            )));
        }
        if !(0.0..=1.0).contains(&d.label_smoothing) {
            return Err(SweepError::config("label_smoothing must lie in [0, 1]"));
        }
        if let Some(d_model) = self.schedule.d_model
            && !(d_model > 0.0)
        {
            return Err(SweepError::config("schedule.d_model must be positive"));
        }
        Ok(())
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            log_interval: self.experiment.log_interval,
            batch_size: self.experiment.batch_size,
            epochs: self.experiment.epochs,
        }
    }

    /// A new plan (with a fresh id) for the configured sweep.
    pub fn plan(&self) -> SweepPlan {
        let e = &self.experiment;
        SweepPlan::new(e.axis.clone(), e.values.clone())
            .with_repetitions(e.repetitions)
            .with_model_size(e.model_size)
            .with_base_rate(e.base_rate)
            .with_seed(e.seed)
    }
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".sweeplab").join("config.toml")
}

/// Path of the user-level config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "sweeplab", "sweeplab")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration from all layers.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SweepConfig>,
) -> Result<SweepConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SweepConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (SWEEPLAB_EXPERIMENT__BATCH_SIZE, SWEEPLAB_SCHEDULE__ENABLED, ...)
    figment = figment.merge(Env::prefixed("SWEEPLAB_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from a single explicit file on top of the defaults.
///
/// Unlike the layered files of [`load_config`], this file must exist.
pub fn load_config_file(path: &Path) -> Result<SweepConfig, Box<figment::Error>> {
    if !path.is_file() {
        return Err(Box::new(figment::Error::from(format!(
            "config file not found: {}",
            path.display()
        ))));
    }
    Figment::from(Serialized::defaults(SweepConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SWEEPLAB_").split("__"))
        .extract()
        .map_err(Box::new)
}
