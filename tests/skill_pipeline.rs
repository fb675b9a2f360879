/// Integration tests for the file-based assessment pipeline
///
/// These tests verify:
/// 1. Reanalysis and threshold CSV files load and yield observed events
/// 2. Forecast JSON files are discovered under the model directory
/// 3. Full pipeline: files → events → exceedance → hits → skill → selection
/// 4. Result tables are written and readable
///
/// Scenario: two stations, twelve 6-hourly steps. Station A floods at step 4
/// and the deterministic model forecasts it perfectly; station B floods at
/// step 6 and the model never sees it.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::json;
use std::fs;
use std::path::Path;

use flood_skill::config::SkillConfig;
use flood_skill::ingest::reanalysis::{load_discharge, load_thresholds};
use flood_skill::model::{Coord, Dim, Persistence};
use flood_skill::pipeline::{Assessor, write_assessment};
use flood_skill::scoring::hits::Hits;
use flood_skill::table::Coords;

const FLOW_A: [f64; 12] = [1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
const FLOW_B: [f64; 12] = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 1.0, 1.0, 1.0, 1.0];

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 7, 13).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

fn at(step: usize) -> NaiveDateTime {
    t0() + Duration::hours(6 * step as i64)
}

/// Writes discharge, thresholds and nine DWD forecasts under `root`.
fn write_inputs(root: &Path) {
    let mut csv = String::from("datetime,A,B\n");
    for i in 0..FLOW_A.len() {
        csv.push_str(&format!("{},{},{}\n", at(i).format("%Y-%m-%d %H:%M"), FLOW_A[i], FLOW_B[i]));
    }
    fs::write(root.join("discharge.csv"), csv).unwrap();
    fs::write(root.join("thresholds.csv"), "station_id,rl2,rl5\nA,3.0,5.0\nB,3.0,5.0\n").unwrap();

    let dir = root.join("forecasts").join("DWD").join("2021").join("07");
    fs::create_dir_all(&dir).unwrap();
    for i in 0..9 {
        let a: Vec<f64> = (0..3).map(|k| FLOW_A[i + k]).collect();
        let file = json!({
            "stations": ["A", "B"],
            "discharge": [[a], [[1.0, 1.0, 1.0]]],
        });
        let name = format!("{}.json", at(i).format("%Y%m%d%H"));
        fs::write(dir.join(name), file.to_string()).unwrap();
    }
}

fn config(root: &Path, extra: &str) -> SkillConfig {
    let toml = format!(
        r#"
[paths]
discharge = "{root}/discharge.csv"
thresholds = "{root}/thresholds.csv"
forecasts = "{root}/forecasts"
output = "{root}/results"

[[models]]
name = "DWD"
leadtimes = 2

[criteria]
probabilities = [0.5]
persistence = [[1, 1]]

[runtime]
workers = 2
{extra}
"#,
        root = root.display(),
        extra = extra
    );
    SkillConfig::from_toml_str(&toml).expect("test configuration should be valid")
}

fn group(leadtime: u32) -> Coords {
    let mut c = Coords::new();
    c.insert(Dim::Model, Coord::from("DWD"));
    c.insert(Dim::Probability, Coord::from(0.5));
    c.insert(Dim::Persistence, Coord::from(Persistence::single()));
    c.insert(Dim::Leadtime, Coord::from(leadtime));
    c
}

#[test]
fn test_full_pipeline_from_files() {
    let root = tempfile::tempdir().expect("temp dir");
    write_inputs(root.path());
    let config = config(root.path(), "");
    let paths = config.paths.clone();

    let discharge = load_discharge(paths.discharge.as_deref().unwrap()).expect("discharge loads");
    let thresholds = load_thresholds(paths.thresholds.as_deref().unwrap()).expect("thresholds load");
    let assessor = Assessor::new(config);

    // --- Observed events ---
    let events = assessor.observed_events(&discharge, &thresholds).expect("events detected");
    let counts = events.event_counts();
    assert_eq!(counts["A"], 1);
    assert_eq!(counts["B"], 1);

    // --- Forecasts ---
    let runs = assessor.model_runs(paths.forecasts.as_deref().unwrap()).expect("forecasts listed");
    assert_eq!(runs.len(), 1, "only DWD is configured");
    assert_eq!(runs[0].sources.len(), 9);

    // --- Scoring ---
    let upper = assessor.upper_threshold(&thresholds).expect("rl5 present");
    let assessment = assessor.assess(&events, &upper, &runs, None).expect("assessment runs");

    for leadtime in [6, 12] {
        let pooled = assessment.hits.select(&group(leadtime)).expect("pooled row present");
        assert_eq!(*pooled, Hits::new(1, 1, 0), "leadtime {}", leadtime);

        let skill = assessment.skill.select(&group(leadtime)).expect("skill row present");
        assert_eq!(skill.recall, 0.5);
        assert_eq!(skill.precision, 1.0);
    }

    let mut a = group(6);
    a.insert(Dim::Station, Coord::from("A"));
    assert_eq!(assessment.station_hits.select(&a), Some(&Hits::new(1, 0, 0)));

    // --- Output ---
    write_assessment(&assessment, &events, &paths.output).expect("results written");
    let hits_csv = fs::read_to_string(paths.output.join("hits.csv")).expect("hits table");
    assert!(hits_csv.starts_with("model,probability,persistence,leadtime,TP,FN,FP\n"));
    assert!(hits_csv.contains("DWD,0.5,1/1,6,1,1,0"));
    assert!(paths.output.join("best_criteria.json").exists());
    assert!(!paths.output.join("cv_folds.json").exists());
}

#[test]
fn test_cross_validated_pipeline() {
    let root = tempfile::tempdir().expect("temp dir");
    write_inputs(root.path());
    let config = config(root.path(), "\n[optimization]\nkfold = 2\nseed = 3\n");
    let paths = config.paths.clone();

    let discharge = load_discharge(paths.discharge.as_deref().unwrap()).expect("discharge loads");
    let thresholds = load_thresholds(paths.thresholds.as_deref().unwrap()).expect("thresholds load");
    let assessor = Assessor::new(config);
    let events = assessor.observed_events(&discharge, &thresholds).expect("events detected");
    let runs = assessor.model_runs(paths.forecasts.as_deref().unwrap()).expect("forecasts listed");
    let upper = assessor.upper_threshold(&thresholds).expect("rl5 present");

    let assessment = assessor.assess(&events, &upper, &runs, None).expect("assessment runs");
    let cv = assessment.cross_validation.as_ref().expect("kfold configured");
    assert_eq!(cv.folds.len(), 2);
    for fold in &cv.folds {
        assert_eq!(fold.train.len(), 1);
        assert_eq!(fold.validation.len(), 1);
        assert_ne!(fold.train, fold.validation);
    }
    // one validation row per fold and leadtime group
    assert_eq!(cv.validation.len(), 4);

    write_assessment(&assessment, &events, &paths.output).expect("results written");
    assert!(paths.output.join("cv_folds.json").exists());
    assert!(paths.output.join("cv_validation.csv").exists());
}

#[test]
fn test_area_classes_from_station_areas() {
    let root = tempfile::tempdir().expect("temp dir");
    write_inputs(root.path());
    let config = config(root.path(), "\n[skill.area_ranges]\nmin = 1000\nmax = 5000\n\n[selection]\narea = 0\n");
    let paths = config.paths.clone();

    let discharge = load_discharge(paths.discharge.as_deref().unwrap()).expect("discharge loads");
    let thresholds = load_thresholds(paths.thresholds.as_deref().unwrap()).expect("thresholds load");
    let assessor = Assessor::new(config);
    let events = assessor.observed_events(&discharge, &thresholds).expect("events detected");
    let runs = assessor.model_runs(paths.forecasts.as_deref().unwrap()).expect("forecasts listed");
    let upper = assessor.upper_threshold(&thresholds).expect("rl5 present");

    let areas = [("A".to_string(), 1200.0), ("B".to_string(), 8000.0)].into_iter().collect();
    let assessment = assessor.assess(&events, &upper, &runs, Some(&areas)).expect("assessment runs");

    // area ≥ 1000: both stations; area ≥ 7000: B only
    let mut both = group(6);
    both.insert(Dim::Area, Coord::Int(1000));
    assert_eq!(assessment.hits.select(&both), Some(&Hits::new(1, 1, 0)));
    let mut large = group(6);
    large.insert(Dim::Area, Coord::Int(7000));
    assert_eq!(assessment.hits.select(&large), Some(&Hits::new(0, 1, 0)));

    let first = &assessment.area_summary[0];
    assert_eq!((first.area, first.n_stations, first.n_events_obs), (1000, 2, 2));
}
