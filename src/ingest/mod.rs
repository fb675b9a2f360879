/// Input loaders.
///
/// - `reanalysis` — discharge, threshold and station-area CSV tables
/// - `forecast` — per-run forecast JSON files and directory discovery
/// - `fixtures` (test only) — representative input payloads

pub mod forecast;
pub mod reanalysis;

#[cfg(test)]
pub(crate) mod fixtures;
