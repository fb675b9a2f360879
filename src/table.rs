/// Labelled tables of hits and skill.
///
/// A `LabeledTable<V>` is a flat list of rows, each carrying a coordinate
/// map (`Dim` → `Coord`) and a value. Reductions group rows by the
/// coordinates that remain after dropping some dimensions, which is how
/// station sums, area sums and per-group criterion selection are expressed.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, SkillError};
use crate::model::{Coord, Dim};
use crate::scoring::hits::Hits;

pub type Coords = BTreeMap<Dim, Coord>;

#[derive(Debug, Clone, PartialEq)]
pub struct Row<V> {
    pub coords: Coords,
    pub value: V,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable<V> {
    rows: Vec<Row<V>>,
}

impl<V> Default for LabeledTable<V> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<V> FromIterator<Row<V>> for LabeledTable<V> {
    fn from_iter<I: IntoIterator<Item = Row<V>>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Coordinates of `coords` with the `dims` removed.
pub fn without(coords: &Coords, dims: &[Dim]) -> Coords {
    coords
        .iter()
        .filter(|(d, _)| !dims.contains(d))
        .map(|(d, c)| (*d, c.clone()))
        .collect()
}

/// True when every pair in `subset` appears in `coords`.
pub fn matches(coords: &Coords, subset: &Coords) -> bool {
    subset.iter().all(|(d, c)| coords.get(d) == Some(c))
}

impl<V> LabeledTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, coords: Coords, value: V) {
        self.rows.push(Row { coords, value });
    }

    pub fn rows(&self) -> &[Row<V>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row<V>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of the dimensions used by any row.
    pub fn dims(&self) -> BTreeSet<Dim> {
        self.rows
            .iter()
            .flat_map(|r| r.coords.keys().copied())
            .collect()
    }

    /// Sorted distinct coordinates along `dim`.
    pub fn coords_of(&self, dim: Dim) -> Vec<Coord> {
        let set: BTreeSet<Coord> = self
            .rows
            .iter()
            .filter_map(|r| r.coords.get(&dim).cloned())
            .collect();
        set.into_iter().collect()
    }

    /// Value of the first row whose coordinates contain `subset`.
    pub fn select(&self, subset: &Coords) -> Option<&V> {
        self.rows
            .iter()
            .find(|r| matches(&r.coords, subset))
            .map(|r| &r.value)
    }

    /// Groups rows by their coordinates without `dims`.
    pub fn group_without(&self, dims: &[Dim]) -> BTreeMap<Coords, Vec<&Row<V>>> {
        let mut groups: BTreeMap<Coords, Vec<&Row<V>>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(without(&row.coords, dims)).or_default().push(row);
        }
        groups
    }

    pub fn map<U>(&self, mut f: impl FnMut(&V) -> U) -> LabeledTable<U> {
        self.rows
            .iter()
            .map(|r| Row {
                coords: r.coords.clone(),
                value: f(&r.value),
            })
            .collect()
    }

    /// Sorts rows by coordinates.
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| a.coords.cmp(&b.coords));
    }

    fn require(&self, dim: Dim) -> Result<()> {
        if self.rows.iter().any(|r| !r.coords.contains_key(&dim)) || self.rows.is_empty() {
            return Err(SkillError::MissingDimension(dim.to_string()));
        }
        Ok(())
    }
}

impl<V: Clone> LabeledTable<V> {
    pub fn filter(&self, mut keep: impl FnMut(&Coords) -> bool) -> Self {
        self.rows
            .iter()
            .filter(|r| keep(&r.coords))
            .cloned()
            .collect()
    }

    /// Rows at `coord` along `dim`, with that dimension dropped.
    pub fn sel(&self, dim: Dim, coord: &Coord) -> Result<Self> {
        self.require(dim)?;
        Ok(self
            .rows
            .iter()
            .filter(|r| r.coords.get(&dim) == Some(coord))
            .map(|r| Row {
                coords: without(&r.coords, &[dim]),
                value: r.value.clone(),
            })
            .collect())
    }

    /// Concatenates per-key tables along a new dimension.
    pub fn stack(dim: Dim, parts: impl IntoIterator<Item = (Coord, LabeledTable<V>)>) -> Self {
        let mut out = LabeledTable::new();
        for (coord, table) in parts {
            for row in table.rows {
                let mut coords = row.coords;
                coords.insert(dim, coord.clone());
                out.push(coords, row.value);
            }
        }
        out.sort();
        out
    }
}

impl LabeledTable<Hits> {
    /// Sums hits over `dims` (ratio of sums downstream). Rows without data
    /// are simply absent, so they never contribute zeros.
    pub fn sum_over(&self, dims: &[Dim]) -> Result<Self> {
        for dim in dims {
            self.require(*dim)?;
        }
        Ok(self
            .group_without(dims)
            .into_iter()
            .map(|(coords, rows)| Row {
                coords,
                value: rows.iter().map(|r| r.value).sum(),
            })
            .collect())
    }
}
