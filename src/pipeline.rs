/// End-to-end skill assessment
///
/// Drives one assessment from loaded inputs to result tables:
/// 1. Detects observed flood onsets in the reanalysis discharge
/// 2. Builds the exceedance grid of every model and moves it to valid time
/// 3. Scores each criteria combination station by station
/// 4. Pools the hits (over stations, or per catchment-area class)
/// 5. Selects the best criteria, optionally cross-validated
/// 6. Scores the operational criteria next to the selection

use chrono::NaiveDateTime;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::Path;

use crate::analysis::flood_events::detect_events;
use crate::analysis::groupings::{AreaSummary, define_area_ranges, hits_by_area, summarize_by_area};
use crate::config::SkillConfig;
use crate::criteria::cross_validation::{CvOutcome, find_best_criteria_cv};
use crate::criteria::optimize::{CriteriaSelection, defined_rows, find_best_criteria};
use crate::error::{Result, SkillError};
use crate::exceedance::{ForecastSource, ModelRun, build_exceedance};
use crate::ingest::forecast::list_model_files;
use crate::model::{Coord, Dim};
use crate::report;
use crate::scoring::hits::{Hits, compute_hits};
use crate::scoring::skill::{Skill, skill_table};
use crate::series::{DischargeTable, EventTable, StationThreshold, Thresholds};
use crate::table::{Coords, LabeledTable};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Everything one assessment produces.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Hits per station and criteria combination.
    pub station_hits: LabeledTable<Hits>,
    /// Hits pooled over stations (per area class when configured).
    pub hits: LabeledTable<Hits>,
    pub skill: LabeledTable<Skill>,
    pub best: LabeledTable<CriteriaSelection>,
    /// Skill of the operational criteria, in the groups of `best`.
    pub current: Option<LabeledTable<CriteriaSelection>>,
    pub cross_validation: Option<CvOutcome>,
    pub area_summary: Vec<AreaSummary>,
}

// ---------------------------------------------------------------------------
// Assessor
// ---------------------------------------------------------------------------

pub struct Assessor {
    config: SkillConfig,
}

impl Assessor {
    pub fn new(config: SkillConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SkillConfig {
        &self.config
    }

    fn period(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (self.config.study_period.start, self.config.study_period.end)
    }

    /// Flood threshold at the configured return period.
    pub fn upper_threshold(&self, thresholds: &Thresholds) -> Result<StationThreshold> {
        thresholds.level(self.config.return_period())
    }

    /// Observed onsets within the study period.
    pub fn observed_events(&self, discharge: &DischargeTable, thresholds: &Thresholds) -> Result<EventTable> {
        let (start, end) = self.period();
        let discharge = discharge.slice_period(start, end);
        if discharge.is_empty() {
            return Err(SkillError::config("study_period", "no discharge inside the study period"));
        }
        let upper = self.upper_threshold(thresholds)?;
        let lower = self.config.discharge.reducing_factor.map(|f| upper.scaled(f));
        detect_events(&discharge, &upper, lower.as_ref(), self.config.discharge.alignment)
    }

    /// Forecast files of every configured model under `root`. Models without
    /// files are left out.
    pub fn model_runs(&self, root: &Path) -> Result<Vec<ModelRun>> {
        let (start, end) = self.period();
        let mut runs = Vec::with_capacity(self.config.models.len());
        for spec in &self.config.models {
            let files = list_model_files(root, &spec.name, start, end)?;
            if files.is_empty() {
                warn!("{}: no forecasts in the study period, skipping model", spec.name);
                continue;
            }
            info!("{}: {} forecasts", spec.name, files.len());
            let sources = files
                .into_iter()
                .map(|f| Box::new(f) as Box<dyn ForecastSource + Send>)
                .collect();
            runs.push(ModelRun::new(spec.clone(), sources));
        }
        if runs.is_empty() {
            return Err(SkillError::config("paths.forecasts", format!("no forecast files under {}", root.display())));
        }
        Ok(runs)
    }

    /// Runs scoring and selection. `station_areas` enables the minimum-area
    /// filter and the area classes.
    pub fn assess(
        &self,
        events: &EventTable,
        upper: &StationThreshold,
        runs: &[ModelRun],
        station_areas: Option<&BTreeMap<String, f64>>,
    ) -> Result<Assessment> {
        let config = &self.config;

        let exceedance = build_exceedance(runs, upper)?.to_valid_time(config.criteria.trim)?;
        info!(
            "Exceedance on valid time: {} stations × {} models × {} times × {} leadtimes",
            exceedance.stations().len(),
            exceedance.models().len(),
            exceedance.times().len(),
            exceedance.leadtimes().len()
        );

        let mut station_hits = compute_hits(events, &exceedance, &config.hits_options()?)?;
        if let Some(areas) = station_areas {
            station_hits = filter_min_area(&station_hits, areas, config.selection.area);
        }
        if let Some(lt) = config.skill.leadtime {
            station_hits = station_hits.sel(Dim::Leadtime, &Coord::from(lt))?;
            if station_hits.is_empty() {
                return Err(SkillError::UnknownLeadtime(lt));
            }
        }
        if station_hits.is_empty() {
            return Err(SkillError::config("stations", "no station left to score"));
        }

        let station_events = observed_counts(events, &station_hits);
        let (hits, area_summary) = match (station_areas, &config.skill.area_ranges) {
            (Some(areas), Some(ranges)) => {
                let ladder = define_area_ranges(ranges.min, ranges.max, ranges.scale)?;
                let scored: BTreeMap<String, f64> = areas
                    .iter()
                    .filter(|(s, _)| station_events.contains_key(*s))
                    .map(|(s, a)| (s.clone(), *a))
                    .collect();
                (
                    hits_by_area(&station_hits, &scored, &ladder)?,
                    summarize_by_area(&scored, &station_events, &ladder),
                )
            }
            (None, Some(_)) => {
                warn!("Area classes configured but no station areas given; pooling all stations");
                (station_hits.sum_over(&[Dim::Station])?, Vec::new())
            }
            _ => (station_hits.sum_over(&[Dim::Station])?, Vec::new()),
        };

        let betas = &config.skill.betas;
        let skill = skill_table(&hits, betas)?;
        let objective = config.objective();
        let best = find_best_criteria(&defined_rows(&skill, &objective), &objective)?;
        info!("Selected criteria for {} groups", best.len());

        let current = config
            .criteria
            .current_criteria
            .as_ref()
            .map(|c| {
                let mut criteria = BTreeMap::new();
                criteria.insert(Dim::Probability, Coord::from(c.probability));
                criteria.insert(Dim::Persistence, Coord::from(c.persistence));
                lookup_criteria(&skill, &best, &criteria)
            });

        let cross_validation = match config.cross_validation() {
            Some(cv) => Some(find_best_criteria_cv(&station_hits, &station_events, &objective, betas, &cv)?),
            None => None,
        };

        Ok(Assessment {
            station_hits,
            hits,
            skill,
            best,
            current,
            cross_validation,
            area_summary,
        })
    }
}

fn station_of(coords: &Coords) -> Option<&str> {
    coords.get(&Dim::Station).and_then(Coord::as_label)
}

/// Keeps stations with a known catchment area of at least `min_area`.
fn filter_min_area(hits: &LabeledTable<Hits>, areas: &BTreeMap<String, f64>, min_area: f64) -> LabeledTable<Hits> {
    let kept = hits.filter(|coords| {
        station_of(coords)
            .and_then(|s| areas.get(s))
            .is_some_and(|a| *a >= min_area)
    });
    info!(
        "Area filter ≥ {} km²: {} of {} rows kept",
        min_area,
        kept.len(),
        hits.len()
    );
    kept
}

/// Observed event counts of the stations present in `hits`.
fn observed_counts(events: &EventTable, hits: &LabeledTable<Hits>) -> BTreeMap<String, u64> {
    let scored: Vec<String> = hits
        .coords_of(Dim::Station)
        .iter()
        .filter_map(|c| c.as_label().map(str::to_string))
        .collect();
    events
        .event_counts()
        .into_iter()
        .filter(|(s, _)| scored.contains(s))
        .collect()
}

/// Skill at fixed `criteria` for every group of `best`. Groups where the
/// criteria were not evaluated are skipped.
fn lookup_criteria(
    skill: &LabeledTable<Skill>,
    best: &LabeledTable<CriteriaSelection>,
    criteria: &BTreeMap<Dim, Coord>,
) -> LabeledTable<CriteriaSelection> {
    let mut out = LabeledTable::new();
    for row in best.rows() {
        let mut key = row.coords.clone();
        key.extend(criteria.iter().map(|(d, c)| (*d, c.clone())));
        match skill.select(&key) {
            Some(s) => out.push(
                row.coords.clone(),
                CriteriaSelection {
                    criteria: criteria.clone(),
                    skill: s.clone(),
                },
            ),
            None => warn!("current criteria not among the evaluated ones for {:?}", row.coords),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Writes every table of `assessment` under `dir`.
pub fn write_assessment(assessment: &Assessment, events: &EventTable, dir: &Path) -> Result<()> {
    report::save_events(events, &dir.join("observed_events.csv"))?;
    report::save_table(&assessment.station_hits, &dir.join("hits_station.csv"))?;
    report::save_table(&assessment.hits, &dir.join("hits.csv"))?;
    report::save_table(&assessment.skill, &dir.join("skill.csv"))?;
    report::save_table(&assessment.best, &dir.join("best_criteria.csv"))?;
    report::save_json(&selection_records(&assessment.best), &dir.join("best_criteria.json"))?;
    if let Some(current) = &assessment.current {
        report::save_table(current, &dir.join("current_criteria.csv"))?;
    }
    if let Some(cv) = &assessment.cross_validation {
        report::save_json(&cv.folds, &dir.join("cv_folds.json"))?;
        report::save_table(&cv.fold_skill, &dir.join("cv_fold_skill.csv"))?;
        report::save_table(&cv.best, &dir.join("cv_best_criteria.csv"))?;
        report::save_table(&cv.validation, &dir.join("cv_validation.csv"))?;
    }
    if !assessment.area_summary.is_empty() {
        report::save_area_summary(&assessment.area_summary, &dir.join("area_summary.csv"))?;
    }
    Ok(())
}

/// Group coordinates merged into each selection, for JSON output.
fn selection_records(best: &LabeledTable<CriteriaSelection>) -> Vec<serde_json::Value> {
    best.rows()
        .iter()
        .filter_map(|row| {
            let mut value = serde_json::to_value(&row.value).ok()?;
            let object = value.as_object_mut()?;
            for (dim, coord) in &row.coords {
                object.insert(dim.to_string(), serde_json::to_value(coord).ok()?);
            }
            Some(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceedance::{ForecastArray, InMemoryForecast};
    use crate::model::{ModelSpec, ReturnPeriod};
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, 13).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    /// One station, 12 six-hourly steps, a single flood at step 4.
    fn discharge() -> DischargeTable {
        let values = vec![1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let times = (0..values.len() as i64).map(|i| t0() + Duration::hours(6 * i)).collect();
        DischargeTable::new(times, vec!["A".to_string()], vec![values]).expect("valid table")
    }

    fn thresholds() -> Thresholds {
        Thresholds::new(vec![ReturnPeriod(5.0)], vec!["A".to_string()], vec![vec![5.0]]).expect("valid thresholds")
    }

    /// Deterministic forecasts every 6 h that always predict the flood
    /// correctly at both leadtimes.
    fn runs() -> Vec<ModelRun> {
        let flow = discharge().column("A").unwrap().to_vec();
        let sources = (0..9)
            .map(|i| {
                let values: Vec<f64> = (0..3).map(|k| flow[i + k]).collect();
                Box::new(InMemoryForecast {
                    issue_time: t0() + Duration::hours(6 * i as i64),
                    array: ForecastArray::new(vec!["A".to_string()], 1, 3, values).unwrap(),
                }) as Box<dyn ForecastSource + Send>
            })
            .collect();
        vec![ModelRun::new(ModelSpec::new("DWD", 1, 2, 6), sources)]
    }

    fn config() -> SkillConfig {
        SkillConfig::from_toml_str(
            "[criteria]\nprobabilities = [0.5]\npersistence = [[1, 1]]\n\
             current_criteria = { probability = 0.5, persistence = [1, 1] }\n\
             [runtime]\nworkers = 1\n",
        )
        .expect("valid config")
    }

    #[test]
    fn test_perfect_forecast_scores_full_recall() {
        let assessor = Assessor::new(config());
        let events = assessor.observed_events(&discharge(), &thresholds()).expect("events");
        assert_eq!(events.event_counts()["A"], 1);

        let upper = assessor.upper_threshold(&thresholds()).expect("rl5 present");
        let assessment = assessor.assess(&events, &upper, &runs(), None).expect("assessment runs");

        assert!(!assessment.hits.dims().contains(&Dim::Station));
        for row in assessment.hits.rows() {
            assert_eq!(row.value.hits, 1, "at {:?}", row.coords);
            assert_eq!(row.value.misses, 0);
        }
        for row in assessment.best.rows() {
            assert_eq!(row.value.criteria[&Dim::Probability], Coord::from(0.5));
            assert_eq!(row.value.skill.recall, 1.0);
        }
        let current = assessment.current.expect("current criteria configured");
        assert_eq!(current.len(), assessment.best.len());
    }

    #[test]
    fn test_area_filter_without_eligible_station_fails() {
        let assessor = Assessor::new(config());
        let events = assessor.observed_events(&discharge(), &thresholds()).expect("events");
        let upper = assessor.upper_threshold(&thresholds()).expect("rl5 present");
        let areas: BTreeMap<String, f64> = [("A".to_string(), 100.0)].into_iter().collect();
        assert!(assessor.assess(&events, &upper, &runs(), Some(&areas)).is_err());
    }

    #[test]
    fn test_area_summary_counts_only_scored_stations() {
        let config = SkillConfig::from_toml_str(
            "[criteria]\nprobabilities = [0.5]\npersistence = [[1, 1]]\n\
             [skill.area_ranges]\nmin = 100\nmax = 1000\n\
             [runtime]\nworkers = 1\n",
        )
        .expect("valid config");
        let assessor = Assessor::new(config);
        let events = assessor.observed_events(&discharge(), &thresholds()).expect("events");
        let upper = assessor.upper_threshold(&thresholds()).expect("rl5 present");
        // Z and Y have areas but neither thresholds nor forecasts
        let areas: BTreeMap<String, f64> = [("A", 600.0), ("Z", 5000.0), ("Y", 5000.0)]
            .into_iter()
            .map(|(s, a)| (s.to_string(), a))
            .collect();
        let assessment = assessor.assess(&events, &upper, &runs(), Some(&areas)).expect("assessment runs");

        let first = &assessment.area_summary[0];
        assert_eq!((first.area, first.n_stations, first.n_events_obs), (100, 1, 1));
        for row in &assessment.area_summary {
            let expected = usize::from(row.area <= 600);
            assert_eq!(row.n_stations, expected, "area {}", row.area);
        }
        assert_eq!(assessment.hits.coords_of(Dim::Area).last(), Some(&Coord::Int(500)));
    }

    #[test]
    fn test_write_assessment_creates_tables() {
        let assessor = Assessor::new(config());
        let events = assessor.observed_events(&discharge(), &thresholds()).expect("events");
        let upper = assessor.upper_threshold(&thresholds()).expect("rl5 present");
        let assessment = assessor.assess(&events, &upper, &runs(), None).expect("assessment runs");

        let dir = tempfile::tempdir().expect("temp dir");
        write_assessment(&assessment, &events, dir.path()).expect("outputs written");
        for name in ["observed_events.csv", "hits.csv", "skill.csv", "best_criteria.csv", "best_criteria.json"] {
            assert!(dir.path().join(name).exists(), "{} missing", name);
        }
        let json = std::fs::read_to_string(dir.path().join("best_criteria.json")).expect("read back");
        assert!(json.contains("\"model\": \"DWD\""));
    }

    #[test]
    fn test_missing_forecast_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let assessor = Assessor::new(config());
        assert!(assessor.model_runs(dir.path()).is_err());
    }
}
