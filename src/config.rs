/// Assessment configuration loader - parses the skill TOML file
///
/// Keeps study period, models, criteria grid and optimisation settings out
/// of the code so a new assessment only needs a new file. Every field has a
/// default declared here; `validate` rejects out-of-range values before any
/// data is read.
///
/// # File Location
/// Given on the command line, or through `FLOOD_SKILL_CONFIG` (a `.env`
/// file in the working directory is honoured).

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::flood_events::Alignment;
use crate::analysis::groupings::AreaScale;
use crate::criteria::cross_validation::{CrossValidation, default_train_size};
use crate::criteria::optimize::{Objective, OptimizationStep};
use crate::criteria::persistence::LeadtimeSelection;
use crate::error::{Result, SkillError};
use crate::model::{Dim, ModelSpec, Persistence, ReturnPeriod, default_models};
use crate::scoring::buffer::BufferWindow;
use crate::scoring::hits::{HitsOptions, PredictedCount};
use crate::scoring::skill::{Metric, validate_betas};
use crate::series::parse_datetime;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FLOOD_SKILL_CONFIG";

fn de_datetime<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<NaiveDateTime>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_datetime(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid datetime '{}'", s))))
        .transpose()
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillConfig {
    #[serde(default)]
    pub study_period: StudyPeriod,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub discharge: DischargeConfig,
    #[serde(default = "default_models")]
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub criteria: CriteriaConfig,
    #[serde(default)]
    pub skill: SkillSection,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyPeriod {
    #[serde(default, deserialize_with = "de_datetime")]
    pub start: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "de_datetime")]
    pub end: Option<NaiveDateTime>,
}

/// Input and output locations. Command-line flags take precedence.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub discharge: Option<PathBuf>,
    pub thresholds: Option<PathBuf>,
    /// Root of the `<MODEL>/…/YYYYMMDDHH.json` tree.
    pub forecasts: Option<PathBuf>,
    /// `station_id,area` table; enables area filtering and grouping.
    pub station_areas: Option<PathBuf>,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_output() -> PathBuf {
    PathBuf::from("results")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            discharge: None,
            thresholds: None,
            forecasts: None,
            station_areas: None,
            output: default_output(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DischargeConfig {
    /// Return period (years) of the flood threshold.
    #[serde(default = "default_return_period")]
    pub return_period: f64,
    /// Lower hysteresis threshold as a fraction of the upper one.
    pub reducing_factor: Option<f64>,
    #[serde(default)]
    pub alignment: Alignment,
}

fn default_return_period() -> f64 {
    5.0
}

impl Default for DischargeConfig {
    fn default() -> Self {
        Self {
            return_period: default_return_period(),
            reducing_factor: None,
            alignment: Alignment::default(),
        }
    }
}

/// The operational criteria, scored next to the optimised selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurrentCriteria {
    pub probability: f64,
    pub persistence: Persistence,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CriteriaConfig {
    #[serde(default = "default_probabilities")]
    pub probabilities: Vec<f64>,
    #[serde(default = "default_persistence")]
    pub persistence: Vec<Persistence>,
    #[serde(default)]
    pub leadtime: LeadtimeSelection,
    /// Tolerance window in timesteps.
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_true")]
    pub center: bool,
    #[serde(default)]
    pub predicted_count: PredictedCount,
    #[serde(default)]
    pub seasonality: bool,
    /// Drop valid times without a complete set of leadtime groups.
    #[serde(default = "default_true")]
    pub trim: bool,
    pub current_criteria: Option<CurrentCriteria>,
}

/// 0.05, 0.10, …, 0.95
fn default_probabilities() -> Vec<f64> {
    (1..=19).map(|i| (i * 5) as f64 / 100.0).collect()
}

fn default_persistence() -> Vec<Persistence> {
    [(1, 1), (2, 2), (2, 3)]
        .into_iter()
        .filter_map(|pair| Persistence::try_from(pair).ok())
        .collect()
}

fn default_window() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            probabilities: default_probabilities(),
            persistence: default_persistence(),
            leadtime: LeadtimeSelection::default(),
            window: default_window(),
            center: true,
            predicted_count: PredictedCount::default(),
            seasonality: false,
            trim: true,
            current_criteria: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaRangeConfig {
    pub min: u64,
    pub max: u64,
    #[serde(default)]
    pub scale: AreaScale,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillSection {
    #[serde(default = "default_betas")]
    pub betas: Vec<f64>,
    #[serde(default = "default_metric")]
    pub metric: Metric,
    /// Leadtime bucket the optimisation is run on; all buckets when absent.
    pub leadtime: Option<u32>,
    pub area_ranges: Option<AreaRangeConfig>,
}

fn default_betas() -> Vec<f64> {
    vec![1.0]
}

fn default_metric() -> Metric {
    Metric::FBeta(1.0)
}

impl Default for SkillSection {
    fn default() -> Self {
        Self {
            betas: default_betas(),
            metric: default_metric(),
            leadtime: None,
            area_ranges: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizationConfig {
    #[serde(default = "default_steps")]
    pub steps: Vec<OptimizationStep>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Number of folds; no cross-validation when absent.
    pub kfold: Option<usize>,
    #[serde(default = "default_train_size")]
    pub train_size: f64,
    #[serde(default)]
    pub stratify: bool,
    #[serde(default)]
    pub seed: u64,
}

fn default_steps() -> Vec<OptimizationStep> {
    vec![
        OptimizationStep::new(Dim::Probability, true),
        OptimizationStep::new(Dim::Persistence, true),
    ]
}

fn default_tolerance() -> f64 {
    1e-2
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            tolerance: default_tolerance(),
            kfold: None,
            train_size: default_train_size(),
            stratify: false,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    /// Minimum catchment area (km²) of stations entering the optimisation.
    #[serde(default = "default_area")]
    pub area: f64,
    /// Minimum correlation between reanalysis and observations.
    pub rho: Option<f64>,
}

fn default_area() -> f64 {
    500.0
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            area: default_area(),
            rho: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Scoring threads; available parallelism when absent.
    pub workers: Option<usize>,
}

impl RuntimeConfig {
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            study_period: StudyPeriod::default(),
            paths: PathsConfig::default(),
            discharge: DischargeConfig::default(),
            models: default_models(),
            criteria: CriteriaConfig::default(),
            skill: SkillSection::default(),
            optimization: OptimizationConfig::default(),
            selection: SelectionConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl SkillConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SkillConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| SkillError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            SkillError::Toml(t) => SkillError::Parse {
                path: path.display().to_string(),
                reason: t.to_string(),
            },
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.study_period.start, self.study_period.end) {
            if start >= end {
                return Err(SkillError::config("study_period", "start must be before end"));
            }
        }

        if !(self.discharge.return_period > 0.0) {
            return Err(SkillError::config("discharge.return_period", "must be positive"));
        }
        if let Some(f) = self.discharge.reducing_factor {
            if !(f > 0.0 && f < 1.0) {
                return Err(SkillError::config(
                    "discharge.reducing_factor",
                    format!("{} must lie strictly between 0 and 1", f),
                ));
            }
        }

        if self.models.is_empty() {
            return Err(SkillError::config("models", "at least one model is required"));
        }
        for model in &self.models {
            model.validate()?;
        }

        self.hits_options()?.validate()?;
        if let Some(current) = &self.criteria.current_criteria {
            if !(0.0..=1.0).contains(&current.probability) {
                return Err(SkillError::config(
                    "criteria.current_criteria.probability",
                    format!("{} is outside [0, 1]", current.probability),
                ));
            }
        }

        validate_betas(&self.skill.betas)?;
        if let Metric::FBeta(beta) = self.skill.metric {
            if !self.skill.betas.iter().any(|b| (b - beta).abs() < 1e-9) {
                return Err(SkillError::config(
                    "skill.metric",
                    format!("{} needs beta {} in skill.betas", self.skill.metric, beta),
                ));
            }
        }
        if let Some(ranges) = &self.skill.area_ranges {
            if ranges.min == 0 || ranges.max <= ranges.min {
                return Err(SkillError::config("skill.area_ranges", "need 0 < min < max"));
            }
        }

        self.objective().validate()?;
        if let Some(cv) = self.cross_validation() {
            cv.validate()?;
        }

        if !(self.selection.area >= 0.0) {
            return Err(SkillError::config("selection.area", "must not be negative"));
        }
        if let Some(rho) = self.selection.rho {
            if !(-1.0..=1.0).contains(&rho) {
                return Err(SkillError::config("selection.rho", format!("{} is outside [-1, 1]", rho)));
            }
        }

        if self.runtime.workers == Some(0) {
            return Err(SkillError::config("runtime.workers", "must be at least 1"));
        }
        Ok(())
    }

    pub fn return_period(&self) -> ReturnPeriod {
        ReturnPeriod(self.discharge.return_period)
    }

    pub fn hits_options(&self) -> Result<HitsOptions> {
        Ok(HitsOptions {
            probabilities: self.criteria.probabilities.clone(),
            persistences: self.criteria.persistence.clone(),
            leadtime: self.criteria.leadtime.clone(),
            buffer: BufferWindow::new(self.criteria.window, self.criteria.center)?,
            predicted_count: self.criteria.predicted_count,
            seasonal: self.criteria.seasonality,
            workers: self.runtime.workers(),
        })
    }

    pub fn objective(&self) -> Objective {
        Objective {
            steps: self.optimization.steps.clone(),
            metric: self.skill.metric,
            tolerance: self.optimization.tolerance,
        }
    }

    pub fn cross_validation(&self) -> Option<CrossValidation> {
        self.optimization.kfold.map(|kfold| CrossValidation {
            kfold,
            train_size: self.optimization.train_size,
            stratify: self.optimization.stratify,
            seed: self.optimization.seed,
        })
    }
}

/// Configuration file from the command line, else from `FLOOD_SKILL_CONFIG`.
pub fn resolve_config_path(cli: Option<PathBuf>) -> Option<PathBuf> {
    cli.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
}
