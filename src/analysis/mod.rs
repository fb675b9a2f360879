/// Observation-side analysis.
///
/// Submodules:
/// - `flood_events` — event onsets from reanalysis discharge and thresholds.
/// - `groupings` — catchment-area ladders and seasonal grouping.

pub mod flood_events;
pub mod groupings;
