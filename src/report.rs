/// Result files: labelled tables as long-format CSV, selections as JSON.
///
/// Every labelled table is written one row per coordinate combination, the
/// dimension columns first (in `Dim` order) followed by the value columns.
/// Undefined scores are left empty.

use csv::Writer;
use log::info;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::analysis::groupings::AreaSummary;
use crate::criteria::optimize::CriteriaSelection;
use crate::error::Result;
use crate::model::Dim;
use crate::scoring::hits::Hits;
use crate::scoring::skill::Skill;
use crate::series::EventTable;
use crate::table::LabeledTable;

/// Value columns of one table cell.
pub trait TableRecord {
    fn columns(&self) -> Vec<String>;
    fn values(&self) -> Vec<String>;
}

fn number(value: f64) -> String {
    if value.is_finite() { value.to_string() } else { String::new() }
}

impl TableRecord for Hits {
    fn columns(&self) -> Vec<String> {
        vec!["TP".to_string(), "FN".to_string(), "FP".to_string()]
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.hits.to_string(),
            self.misses.to_string(),
            self.false_alarms.to_string(),
        ]
    }
}

impl TableRecord for Skill {
    fn columns(&self) -> Vec<String> {
        self.metrics().into_iter().map(|(name, _)| name).collect()
    }

    fn values(&self) -> Vec<String> {
        self.metrics().into_iter().map(|(_, v)| number(v)).collect()
    }
}

impl TableRecord for CriteriaSelection {
    fn columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.criteria.keys().map(|d| d.to_string()).collect();
        cols.extend(self.skill.columns());
        cols
    }

    fn values(&self) -> Vec<String> {
        let mut vals: Vec<String> = self.criteria.values().map(|c| c.to_string()).collect();
        vals.extend(self.skill.values());
        vals
    }
}

/// Writes `table` as CSV. The header comes from the first row; an empty
/// table produces an empty document.
pub fn write_table<V: TableRecord, W: Write>(table: &LabeledTable<V>, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    let Some(first) = table.rows().first() else {
        wtr.flush()?;
        return Ok(());
    };
    let dims: Vec<Dim> = table.dims().into_iter().collect();

    let mut header: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    header.extend(first.value.columns());
    wtr.write_record(&header)?;

    for row in table.rows() {
        let mut record: Vec<String> = dims
            .iter()
            .map(|d| row.coords.get(d).map(|c| c.to_string()).unwrap_or_default())
            .collect();
        record.extend(row.value.values());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

pub fn save_table<V: TableRecord>(table: &LabeledTable<V>, path: &Path) -> Result<()> {
    write_table(table, create(path)?)?;
    info!("💾 Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Observed onsets as a wide 0/1 table, one column per station.
pub fn write_events<W: Write>(events: &EventTable, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    let mut header = vec!["datetime".to_string()];
    header.extend(events.stations().iter().cloned());
    wtr.write_record(&header)?;

    let columns: Vec<&[bool]> = events.iter().map(|(_, col)| col).collect();
    for (t, time) in events.times().iter().enumerate() {
        let mut record = vec![time.format("%Y-%m-%d %H:%M:%S").to_string()];
        record.extend(columns.iter().map(|col| u8::from(col[t]).to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_events(events: &EventTable, path: &Path) -> Result<()> {
    write_events(events, create(path)?)?;
    info!("💾 Saved events of {} stations to {}", events.stations().len(), path.display());
    Ok(())
}

pub fn save_area_summary(summary: &[AreaSummary], path: &Path) -> Result<()> {
    let mut wtr = Writer::from_writer(create(path)?);
    for row in summary {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = create(path)?;
    file.write_all(json.as_bytes())?;
    info!("💾 Saved {}", path.display());
    Ok(())
}
