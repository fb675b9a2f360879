/// Test fixtures: small reanalysis tables, threshold tables, forecast files
/// and configuration, shaped like the real inputs but cut down to a few
/// stations and timesteps.
///
/// Discharge CSV: `datetime` column, then one column per station id.
/// Empty cells are missing values.
///
/// Threshold CSV: `station_id` column, then one `rl<T>` column per return
/// period in years.
///
/// Forecast JSON: one file per model run, named `YYYYMMDDHH.json`:
///   stations[]                 — station ids
///   discharge[station][member][step] — m³/s, `null` for missing;
///                                step 0 is the analysis

use chrono::{NaiveDate, NaiveDateTime};

use crate::exceedance::{ForecastArray, ForecastSource, InMemoryForecast, ModelRun};
use crate::model::ModelSpec;
use crate::series::StationThreshold;

#[cfg(test)]
pub(crate) fn fixture_issue_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 7, 13)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// Threshold 8 m³/s at A, B and Z. Z never appears in a forecast.
#[cfg(test)]
pub(crate) fn fixture_thresholds() -> StationThreshold {
    StationThreshold::new(
        vec!["A".to_string(), "B".to_string(), "Z".to_string()],
        vec![8.0, 8.0, 8.0],
    )
    .unwrap()
}

/// One 4-member forecast with 4 steps (analysis + 3) for stations A and B.
///
/// A at step 1: members [1, 5, 9, 12] → 2 of 4 above 8.
/// B at step 2: every member missing.
#[cfg(test)]
pub(crate) fn fixture_forecast_array() -> ForecastArray {
    let nan = f64::NAN;
    #[rustfmt::skip]
    let values = vec![
        // A
        0.0, 1.0, 1.0, 1.0,
        0.0, 5.0, 9.0, 9.0,
        0.0, 9.0, 9.0, 9.0,
        0.0, 12.0, 12.0, 12.0,
        // B
        0.0, 10.0, nan, 10.0,
        0.0, 10.0, nan, 10.0,
        0.0, 10.0, nan, 10.0,
        0.0, 10.0, nan, 10.0,
    ];
    ForecastArray::new(vec!["A".to_string(), "B".to_string()], 4, 4, values).unwrap()
}

/// The 4-member model keeping 2 leadtimes of 6 h, with the fixture forecast.
#[cfg(test)]
pub(crate) fn fixture_model_run() -> ModelRun {
    let source = InMemoryForecast {
        issue_time: fixture_issue_time(),
        array: fixture_forecast_array(),
    };
    ModelRun::new(
        ModelSpec::new("EUE", 4, 2, 6),
        vec![Box::new(source) as Box<dyn ForecastSource + Send>],
    )
}

/// Two stations, six 6-hourly steps; station 0512 has one missing value.
#[cfg(test)]
pub(crate) fn fixture_discharge_csv() -> &'static str {
    "datetime,0512,2041\n\
     2021-07-13 00:00,3.0,40.0\n\
     2021-07-13 06:00,6.0,41.5\n\
     2021-07-13 12:00,6.0,\n\
     2021-07-13 18:00,6.0,55.0\n\
     2021-07-14 00:00,2.0,61.0\n\
     2021-07-14 06:00,6.0,48.0\n"
}

#[cfg(test)]
pub(crate) fn fixture_thresholds_csv() -> &'static str {
    "station_id,rl1.5,rl2,rl5,rl20\n\
     0512,3.5,4.2,5.0,7.9\n\
     2041,38.0,44.0,52.0,70.5\n"
}

/// Two stations, 2 members, 3 steps; one missing value.
#[cfg(test)]
pub(crate) fn fixture_forecast_json() -> &'static str {
    r#"{
      "stations": ["0512", "2041"],
      "discharge": [
        [[3.1, 5.5, 6.2], [3.1, 4.8, 5.1]],
        [[40.0, 53.0, null], [40.0, 50.5, 57.0]]
      ]
    }"#
}

/// Minimal configuration exercising every section.
#[cfg(test)]
pub(crate) fn fixture_config_toml() -> &'static str {
    r#"
[study_period]
start = "2020-10-14 12:00"
end = "2022-10-13 00:00"

[discharge]
return_period = 5
reducing_factor = 0.7

[[models]]
name = "EUE"
members = 51
leadtimes = 40

[[models]]
name = "DWD"
leadtimes = 28

[criteria]
probabilities = [0.2, 0.4, 0.6]
persistence = [[1, 1], [2, 3]]
leadtime = 60
window = 3
center = true

[skill]
betas = [1.0, 0.5]
metric = "f0.5"

[optimization]
steps = [{ dim = "probability", min_spread = true }, { dim = "persistence", min_spread = false }]
tolerance = 0.02
kfold = 5
seed = 7

[selection]
area = 2000
rho = 0.8

[runtime]
workers = 2
"#
}
