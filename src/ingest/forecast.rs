/// Forecast files: JSON parsing and directory discovery.
///
/// Each model keeps its runs under `<root>/<MODEL>/`, in any subdirectory
/// layout (year/month folders are common), one file per run named
/// `YYYYMMDDHH.json` after its issue time. Files are listed up front and
/// only parsed when the exceedance builder asks for them.

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, SkillError};
use crate::exceedance::{ForecastArray, ForecastSource};

#[derive(Debug, Deserialize)]
struct ForecastFile {
    stations: Vec<String>,
    /// `[station][member][step]`
    discharge: Vec<Vec<Vec<Option<f64>>>>,
}

/// Parses one forecast run. Every station must carry the same number of
/// members and steps.
pub fn parse_forecast_json(json: &str) -> Result<ForecastArray> {
    let file: ForecastFile = serde_json::from_str(json)?;
    if file.discharge.len() != file.stations.len() {
        return Err(SkillError::ShapeMismatch {
            what: "forecast stations".to_string(),
            expected: file.stations.len(),
            found: file.discharge.len(),
        });
    }
    let members = file.discharge.first().map_or(0, Vec::len);
    let steps = file
        .discharge
        .first()
        .and_then(|m| m.first())
        .map_or(0, Vec::len);

    let mut values = Vec::with_capacity(file.stations.len() * members * steps);
    for (station, by_member) in file.stations.iter().zip(&file.discharge) {
        if by_member.len() != members {
            return Err(SkillError::ShapeMismatch {
                what: format!("members of station {}", station),
                expected: members,
                found: by_member.len(),
            });
        }
        for series in by_member {
            if series.len() != steps {
                return Err(SkillError::ShapeMismatch {
                    what: format!("steps of station {}", station),
                    expected: steps,
                    found: series.len(),
                });
            }
            values.extend(series.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
    }
    ForecastArray::new(file.stations, members, steps, values)
}

/// Issue time encoded in a file stem, `YYYYMMDDHH`.
pub fn issue_time_from_path(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    if stem.len() != 10 {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{}00", stem), "%Y%m%d%H%M").ok()
}

/// One forecast file on disk.
#[derive(Debug, Clone)]
pub struct ForecastFileSource {
    path: PathBuf,
    issue_time: NaiveDateTime,
}

impl ForecastFileSource {
    pub fn new(path: PathBuf) -> Result<Self> {
        let issue_time = issue_time_from_path(&path).ok_or_else(|| SkillError::Parse {
            path: path.display().to_string(),
            reason: "file name is not an issue time (YYYYMMDDHH)".to_string(),
        })?;
        Ok(Self { path, issue_time })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ForecastSource for ForecastFileSource {
    fn issue_time(&self) -> NaiveDateTime {
        self.issue_time
    }

    fn load(&self) -> Result<ForecastArray> {
        let json = fs::read_to_string(&self.path)?;
        parse_forecast_json(&json).map_err(|e| SkillError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Lists the forecast files of `model` under `root` issued within
/// `[start, end]`, sorted by issue time. A missing model directory gives an
/// empty list.
pub fn list_model_files(
    root: &Path,
    model: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<ForecastFileSource>> {
    let dir = root.join(model);
    if !dir.is_dir() {
        warn!("{}: no forecast directory at {}", model, dir.display());
        return Ok(Vec::new());
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(issued) = issue_time_from_path(path) else {
            debug!("{}: ignoring {}", model, path.display());
            continue;
        };
        if start.is_some_and(|s| issued < s) || end.is_some_and(|e| issued > e) {
            continue;
        }
        sources.push(ForecastFileSource {
            path: path.to_path_buf(),
            issue_time: issued,
        });
    }
    sources.sort_by_key(|s| s.issue_time);
    debug!("{}: {} forecast files in {}", model, sources.len(), dir.display());
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::fixture_forecast_json;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_forecast_json_shape_and_missing_values() {
        let array = parse_forecast_json(fixture_forecast_json()).expect("fixture should parse");
        assert_eq!(array.stations(), &["0512".to_string(), "2041".to_string()]);
        assert_eq!(array.members(), 2);
        assert_eq!(array.steps(), 3);
        assert_eq!(array.get(0, 1, 1), 4.8);
        assert!(array.get(1, 0, 2).is_nan(), "null should become NaN");
    }

    #[test]
    fn test_parse_forecast_json_rejects_ragged_members() {
        let json = r#"{"stations": ["A", "B"], "discharge": [[[1, 2]], [[1, 2], [3, 4]]]}"#;
        assert!(matches!(
            parse_forecast_json(json),
            Err(SkillError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_issue_time_from_path() {
        assert_eq!(
            issue_time_from_path(Path::new("/data/EUE/2021/07/2021071312.json")),
            Some(at(13, 12))
        );
        assert_eq!(issue_time_from_path(Path::new("readme.json")), None);
    }

    #[test]
    fn test_list_model_files_filters_period_and_sorts() {
        let root = tempfile::tempdir().expect("temp dir");
        let month = root.path().join("EUE").join("2021").join("07");
        fs::create_dir_all(&month).expect("create dirs");
        for name in ["2021071400.json", "2021071312.json", "2021071000.json", "notes.txt"] {
            fs::write(month.join(name), fixture_forecast_json()).expect("write file");
        }

        let files = list_model_files(root.path(), "EUE", Some(at(13, 0)), None).expect("listing works");
        let issued: Vec<NaiveDateTime> = files.iter().map(|f| f.issue_time()).collect();
        assert_eq!(issued, vec![at(13, 12), at(14, 0)]);

        let array = files[0].load().expect("file loads");
        assert_eq!(array.members(), 2);

        let none = list_model_files(root.path(), "COS", None, None).expect("missing model is not an error");
        assert!(none.is_empty());
    }
}
