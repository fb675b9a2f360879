/// flood_skill: skill assessment of flood early-warning criteria.
///
/// Compares ensemble and deterministic discharge forecasts against flood
/// events detected in reanalysis discharge, scores every combination of
/// notification criteria and selects the most skilful one.
///
/// # Module structure
///
/// ```text
/// flood_skill
/// ├── model       — shared types (Dim, Coord, Persistence, ReturnPeriod, ModelSpec)
/// ├── error       — SkillError, the crate-wide error type
/// ├── config      — assessment configuration loader (TOML)
/// ├── series      — station time series and threshold tables
/// ├── table       — labelled tables keyed by dimension coordinates
/// ├── ingest
/// │   ├── reanalysis — discharge, threshold and catchment-area CSV files
/// │   ├── forecast   — forecast JSON files and their discovery on disk
/// │   └── fixtures (test only) — representative input payloads
/// ├── analysis
/// │   ├── flood_events — observed onsets with optional hysteresis
/// │   └── groupings    — seasons and catchment-area classes
/// ├── exceedance
/// │   └── grid    — station × model × time × leadtime grids, valid-time reindexing
/// ├── criteria
/// │   ├── persistence      — probability + persistence → predicted events
/// │   ├── optimize         — chained criteria selection
/// │   └── cross_validation — station folds and validation skill
/// ├── scoring
/// │   ├── buffer  — rolling tolerance window and event counting
/// │   ├── hits    — contingency counts over the criteria grid
/// │   └── skill   — recall, precision and F-scores
/// ├── pipeline    — end-to-end assessment
/// └── report      — CSV and JSON result files
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod criteria;
pub mod error;
pub mod exceedance;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod series;
pub mod table;

pub use error::{Result, SkillError};
