/// Error type shared by every stage of the skill assessment.
///
/// Degenerate score ratios are not errors; they stay `NaN` inside `Skill`.
/// Everything here is bad configuration, misaligned inputs or I/O.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkillError>;

#[derive(Debug, Error)]
pub enum SkillError {
    /// A configuration value failed its precondition.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// Station identifiers of two inputs do not line up.
    #[error(
        "station mismatch between {left} and {right}: missing from {right}: [{}], extra in {right}: [{}]",
        .missing.join(", "),
        .extra.join(", ")
    )]
    StationMismatch {
        left: &'static str,
        right: &'static str,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Timestamps are not strictly increasing.
    #[error("time index of {what} is not strictly increasing at position {position}")]
    UnorderedTimeIndex { what: String, position: usize },

    /// An axis that must be regularly spaced is not.
    #[error("axis '{axis}' is not regularly spaced: {detail}")]
    IrregularAxis { axis: &'static str, detail: String },

    /// Array shapes do not agree.
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("leadtime {0} h is not on the leadtime axis")]
    UnknownLeadtime(u32),

    #[error("return period {0} is not available in the threshold table")]
    UnknownReturnPeriod(String),

    /// The tolerance band of the optimiser is empty (e.g. all-NaN metric).
    #[error("no candidate values for dimension '{dim}' in group [{group}]")]
    NoCandidates { dim: String, group: String },

    /// The requested dimension is not present in a labelled table.
    #[error("dimension '{0}' not found in table")]
    MissingDimension(String),

    /// A forecast or reanalysis file could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl SkillError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        SkillError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
