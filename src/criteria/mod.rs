/// Notification criteria: prediction and selection.
///
/// - `persistence` — exceedance probability → predicted events
/// - `optimize` — tolerance-band criterion selection on skill tables
/// - `cross_validation` — station folds and cross-validated selection

pub mod cross_validation;
pub mod optimize;
pub mod persistence;
