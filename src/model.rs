/// Shared data types used across the skill assessment pipeline.
///
/// - `Dim` / `Coord` label the axes of hits and skill tables
/// - `Persistence` is the (a, b) notification criterion
/// - `ReturnPeriod` names a discharge threshold column (`rl5`, `rl1.5`, …)
/// - `ModelSpec` describes one forecasting model (members, horizon, step)

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SkillError};

// ---------------------------------------------------------------------------
// Table dimensions
// ---------------------------------------------------------------------------

/// Named axis of a hits or skill table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dim {
    Station,
    Model,
    Probability,
    Persistence,
    Leadtime,
    Area,
    Season,
    Fold,
}

impl Dim {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dim::Station => "station",
            Dim::Model => "model",
            Dim::Probability => "probability",
            Dim::Persistence => "persistence",
            Dim::Leadtime => "leadtime",
            Dim::Area => "area",
            Dim::Season => "season",
            Dim::Fold => "fold",
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dim {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "station" | "id" => Ok(Dim::Station),
            "model" => Ok(Dim::Model),
            "probability" => Ok(Dim::Probability),
            "persistence" => Ok(Dim::Persistence),
            "leadtime" => Ok(Dim::Leadtime),
            "area" => Ok(Dim::Area),
            "season" => Ok(Dim::Season),
            "fold" | "kfold" => Ok(Dim::Fold),
            other => Err(SkillError::config("dimension", format!("unknown dimension '{}'", other))),
        }
    }
}

/// A coordinate value along one `Dim`.
///
/// Ordering is total (floats compare with `total_cmp`) so coordinates can
/// key a `BTreeMap` and candidate lists sort deterministically.
#[derive(Debug, Clone)]
pub enum Coord {
    Label(String),
    Int(i64),
    Value(f64),
    Persistence(Persistence),
}

impl Coord {
    fn rank(&self) -> u8 {
        match self {
            Coord::Label(_) => 0,
            Coord::Int(_) => 1,
            Coord::Value(_) => 2,
            Coord::Persistence(_) => 3,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Coord::Label(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Coord::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl Ord for Coord {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Coord::Label(a), Coord::Label(b)) => a.cmp(b),
            (Coord::Int(a), Coord::Int(b)) => a.cmp(b),
            (Coord::Value(a), Coord::Value(b)) => a.total_cmp(b),
            (Coord::Persistence(a), Coord::Persistence(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Coord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Coord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Coord {}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Label(s) => f.write_str(s),
            Coord::Int(v) => write!(f, "{}", v),
            Coord::Value(v) => write!(f, "{}", v),
            Coord::Persistence(p) => write!(f, "{}", p),
        }
    }
}

impl Serialize for Coord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Coord::Label(s) => serializer.serialize_str(s),
            Coord::Int(v) => serializer.serialize_i64(*v),
            Coord::Value(v) => serializer.serialize_f64(*v),
            Coord::Persistence(p) => serializer.collect_str(p),
        }
    }
}

impl From<&str> for Coord {
    fn from(s: &str) -> Self {
        Coord::Label(s.to_string())
    }
}

impl From<String> for Coord {
    fn from(s: String) -> Self {
        Coord::Label(s)
    }
}

impl From<f64> for Coord {
    fn from(v: f64) -> Self {
        Coord::Value(v)
    }
}

impl From<i64> for Coord {
    fn from(v: i64) -> Self {
        Coord::Int(v)
    }
}

impl From<u32> for Coord {
    fn from(v: u32) -> Self {
        Coord::Int(v as i64)
    }
}

impl From<Persistence> for Coord {
    fn from(p: Persistence) -> Self {
        Coord::Persistence(p)
    }
}

// ---------------------------------------------------------------------------
// Persistence criterion
// ---------------------------------------------------------------------------

/// "`positives` exceedances among the most recent `window` forecasts".
///
/// Invariant: 1 <= positives <= window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "(usize, usize)")]
pub struct Persistence {
    positives: usize,
    window: usize,
}

impl Persistence {
    pub fn new(positives: usize, window: usize) -> Result<Self> {
        if positives == 0 {
            return Err(SkillError::config(
                "persistence",
                format!("({}, {}): at least one positive forecast is required", positives, window),
            ));
        }
        if positives > window {
            return Err(SkillError::config(
                "persistence",
                format!("({}, {}): positives must not exceed the window", positives, window),
            ));
        }
        Ok(Self { positives, window })
    }

    /// The (1, 1) criterion: every positive forecast counts.
    pub fn single() -> Self {
        Self {
            positives: 1,
            window: 1,
        }
    }

    pub fn positives(&self) -> usize {
        self.positives
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for Persistence {
    fn default() -> Self {
        Self::single()
    }
}

impl TryFrom<(usize, usize)> for Persistence {
    type Error = SkillError;

    fn try_from((a, b): (usize, usize)) -> Result<Self> {
        Persistence::new(a, b)
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.positives, self.window)
    }
}

impl FromStr for Persistence {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self> {
        let (a, b) = s
            .split_once('/')
            .ok_or_else(|| SkillError::config("persistence", format!("'{}' is not of the form a/b", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|e| SkillError::config("persistence", format!("'{}': {}", s, e)))
        };
        Persistence::new(parse(a)?, parse(b)?)
    }
}

// ---------------------------------------------------------------------------
// Return periods
// ---------------------------------------------------------------------------

/// Return period in years; labels a threshold column (`rl5`, `rl1.5`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPeriod(pub f64);

impl ReturnPeriod {
    pub fn label(&self) -> String {
        format!("rl{}", self.0)
    }
}

impl fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for ReturnPeriod {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches("rl");
        let years: f64 = digits
            .parse()
            .map_err(|_| SkillError::UnknownReturnPeriod(s.to_string()))?;
        if !(years > 0.0) {
            return Err(SkillError::UnknownReturnPeriod(s.to_string()));
        }
        Ok(ReturnPeriod(years))
    }
}

// ---------------------------------------------------------------------------
// Forecasting models
// ---------------------------------------------------------------------------

/// Static description of a forecasting model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Short model code, e.g. "EUE".
    pub name: String,
    /// Number of ensemble members (1 for deterministic models).
    #[serde(default = "default_members")]
    pub members: usize,
    /// Maximum number of leadtime steps kept from each forecast.
    pub leadtimes: usize,
    /// Temporal resolution of the forecast steps, in hours.
    #[serde(default = "default_resolution_hours")]
    pub resolution_hours: u32,
}

fn default_members() -> usize {
    1
}

fn default_resolution_hours() -> u32 {
    6
}

impl ModelSpec {
    pub fn new(name: &str, members: usize, leadtimes: usize, resolution_hours: u32) -> Self {
        Self {
            name: name.to_string(),
            members,
            leadtimes,
            resolution_hours,
        }
    }

    /// Leadtime axis of this model in hours: resolution, 2·resolution, …
    pub fn leadtime_hours(&self) -> Vec<u32> {
        (1..=self.leadtimes as u32)
            .map(|i| i * self.resolution_hours)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SkillError::config("models.name", "must not be empty"));
        }
        if self.members == 0 {
            return Err(SkillError::config("models.members", format!("{}: must be at least 1", self.name)));
        }
        if self.leadtimes == 0 {
            return Err(SkillError::config("models.leadtimes", format!("{}: must be at least 1", self.name)));
        }
        if self.resolution_hours == 0 {
            return Err(SkillError::config(
                "models.resolution_hours",
                format!("{}: must be at least 1", self.name),
            ));
        }
        Ok(())
    }
}

/// The four models of the operational forecasting chain.
pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("COS", 20, 22, 6),
        ModelSpec::new("DWD", 1, 28, 6),
        ModelSpec::new("EUD", 1, 40, 6),
        ModelSpec::new("EUE", 51, 40, 6),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_persistence_rejects_more_positives_than_window() {
        assert!(Persistence::new(3, 2).is_err());
        assert!(Persistence::new(0, 2).is_err());
        assert!(Persistence::new(2, 3).is_ok());
    }

    #[test]
    fn test_persistence_parses_and_displays() {
        let p: Persistence = "2/3".parse().unwrap();
        assert_eq!(p.positives(), 2);
        assert_eq!(p.window(), 3);
        assert_eq!(p.to_string(), "2/3");
        assert!("4/3".parse::<Persistence>().is_err());
        assert!("23".parse::<Persistence>().is_err());
    }

    #[test]
    fn test_coord_ordering_is_total_for_floats() {
        let coords: BTreeSet<Coord> = [0.5, 0.3, f64::NAN, 0.3]
            .into_iter()
            .map(Coord::from)
            .collect();
        let values: Vec<String> = coords.iter().map(|c| c.to_string()).collect();
        assert_eq!(values, vec!["0.3", "0.5", "NaN"]);
    }

    #[test]
    fn test_return_period_labels() {
        assert_eq!(ReturnPeriod(5.0).label(), "rl5");
        assert_eq!(ReturnPeriod(1.5).label(), "rl1.5");
        let rp: ReturnPeriod = "rl1.5".parse().unwrap();
        assert_eq!(rp, ReturnPeriod(1.5));
        assert!("rlx".parse::<ReturnPeriod>().is_err());
    }

    #[test]
    fn test_model_leadtime_axis() {
        let spec = ModelSpec::new("DWD", 1, 4, 6);
        assert_eq!(spec.leadtime_hours(), vec![6, 12, 18, 24]);
        assert!(ModelSpec::new("X", 0, 4, 6).validate().is_err());
    }

    #[test]
    fn test_dim_round_trips_through_str() {
        for dim in [Dim::Station, Dim::Probability, Dim::Persistence, Dim::Fold] {
            assert_eq!(dim.as_str().parse::<Dim>().unwrap(), dim);
        }
        assert!("colour".parse::<Dim>().is_err());
    }
}
