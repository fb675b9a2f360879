/// Reanalysis discharge, return-period thresholds and catchment areas.
///
/// All three are plain CSV. Discharge has a `datetime` column followed by
/// one column per station; thresholds and areas have one row per station
/// keyed by `station_id`. Empty cells are missing values (`NaN`).

use log::info;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, SkillError};
use crate::model::ReturnPeriod;
use crate::series::{DischargeTable, StationTable, Thresholds, parse_datetime};

fn parse_value(cell: &str, what: &str) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|e| SkillError::Parse {
        path: what.to_string(),
        reason: format!("'{}': {}", cell, e),
    })
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| SkillError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Parses a discharge table. Rows must be in chronological order.
pub fn read_discharge_csv<R: Read>(reader: R) -> Result<DischargeTable> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some("datetime") {
        return Err(SkillError::Parse {
            path: "discharge".to_string(),
            reason: "first column must be 'datetime'".to_string(),
        });
    }
    let stations: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut times = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); stations.len()];
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let stamp = record.get(0).unwrap_or_default();
        let time = parse_datetime(stamp).ok_or_else(|| SkillError::Parse {
            path: "discharge".to_string(),
            reason: format!("row {}: invalid datetime '{}'", line + 1, stamp),
        })?;
        times.push(time);
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(parse_value(record.get(i + 1).unwrap_or_default(), "discharge")?);
        }
    }
    StationTable::new(times, stations, columns)
}

/// Parses a threshold table with one `rl<T>` column per return period.
pub fn read_thresholds_csv<R: Read>(reader: R) -> Result<Thresholds> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some("station_id") {
        return Err(SkillError::Parse {
            path: "thresholds".to_string(),
            reason: "first column must be 'station_id'".to_string(),
        });
    }
    let return_periods = headers
        .iter()
        .skip(1)
        .map(str::parse::<ReturnPeriod>)
        .collect::<Result<Vec<_>>>()?;

    let mut stations = Vec::new();
    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record?;
        stations.push(record.get(0).unwrap_or_default().to_string());
        let row = (1..=return_periods.len())
            .map(|i| parse_value(record.get(i).unwrap_or_default(), "thresholds"))
            .collect::<Result<Vec<_>>>()?;
        values.push(row);
    }
    Thresholds::new(return_periods, stations, values)
}

/// Parses `station_id,area` rows (km²).
pub fn read_station_areas_csv<R: Read>(reader: R) -> Result<BTreeMap<String, f64>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut areas = BTreeMap::new();
    for record in rdr.records() {
        let record = record?;
        let station = record.get(0).unwrap_or_default().to_string();
        let area = parse_value(record.get(1).unwrap_or_default(), "station areas")?;
        if !area.is_nan() {
            areas.insert(station, area);
        }
    }
    Ok(areas)
}

pub fn load_discharge(path: &Path) -> Result<DischargeTable> {
    let table = read_discharge_csv(open(path)?)?;
    info!(
        "Loaded discharge for {} stations × {} timesteps from {}",
        table.stations().len(),
        table.len(),
        path.display()
    );
    Ok(table)
}

pub fn load_thresholds(path: &Path) -> Result<Thresholds> {
    let thresholds = read_thresholds_csv(open(path)?)?;
    info!(
        "Loaded thresholds for {} stations ({} return periods) from {}",
        thresholds.stations().len(),
        thresholds.return_periods().len(),
        path.display()
    );
    Ok(thresholds)
}

pub fn load_station_areas(path: &Path) -> Result<BTreeMap<String, f64>> {
    read_station_areas_csv(open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::{fixture_discharge_csv, fixture_thresholds_csv};
    use std::io::Write;

    #[test]
    fn test_read_discharge_csv_parses_columns_and_gaps() {
        let table = read_discharge_csv(fixture_discharge_csv().as_bytes()).expect("fixture should parse");
        assert_eq!(table.stations(), &["0512".to_string(), "2041".to_string()]);
        assert_eq!(table.len(), 6);
        let col = table.column("2041").expect("2041 present");
        assert_eq!(col[1], 41.5);
        assert!(col[2].is_nan(), "empty cell should be missing");
    }

    #[test]
    fn test_read_discharge_csv_rejects_unordered_rows() {
        let csv = "datetime,A\n2021-07-13 06:00,1.0\n2021-07-13 00:00,2.0\n";
        assert!(matches!(
            read_discharge_csv(csv.as_bytes()),
            Err(SkillError::UnorderedTimeIndex { .. })
        ));
    }

    #[test]
    fn test_read_discharge_csv_rejects_bad_timestamp() {
        let csv = "datetime,A\nyesterday,1.0\n";
        assert!(matches!(read_discharge_csv(csv.as_bytes()), Err(SkillError::Parse { .. })));
    }

    #[test]
    fn test_read_thresholds_csv_by_return_period() {
        let thresholds = read_thresholds_csv(fixture_thresholds_csv().as_bytes()).expect("fixture should parse");
        assert_eq!(thresholds.return_periods().len(), 4);
        let rl5 = thresholds.level(ReturnPeriod(5.0)).expect("rl5 column");
        assert_eq!(rl5.get("2041"), Some(52.0));
        let rl15 = thresholds.level(ReturnPeriod(1.5)).expect("rl1.5 column");
        assert_eq!(rl15.get("0512"), Some(3.5));
    }

    #[test]
    fn test_read_station_areas_skips_unknown() {
        let csv = "station_id,area\nA,1200\nB,\n";
        let areas = read_station_areas_csv(csv.as_bytes()).expect("should parse");
        assert_eq!(areas.len(), 1);
        assert_eq!(areas["A"], 1200.0);
    }

    #[test]
    fn test_load_discharge_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(fixture_discharge_csv().as_bytes()).expect("write fixture");
        let table = load_discharge(file.path()).expect("file should load");
        assert_eq!(table.stations().len(), 2);
        assert!(load_discharge(Path::new("/nonexistent/discharge.csv")).is_err());
    }
}
