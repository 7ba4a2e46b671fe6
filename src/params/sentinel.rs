//! Hyperparameter domains that accept a `-1` sentinel in their JSON form.
//!
//! Each sentinel becomes an explicit enum variant so that "all columns" or
//! "outlier analysis" can never be confused with a real index or size.

use crate::error::{EngineError, EngineResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Which input columns an operator uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnSelection {
    /// Every column except the time column (`-1` in JSON).
    All,
    /// Explicit column indices (a JSON array of non-negative integers).
    Indices(BTreeSet<usize>),
}

impl ColumnSelection {
    /// Select explicit columns.
    pub fn indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        ColumnSelection::Indices(indices.into_iter().collect())
    }

    /// Whether the selection names a column explicitly.
    pub fn contains(&self, index: usize) -> bool {
        match self {
            ColumnSelection::All => false,
            ColumnSelection::Indices(set) => set.contains(&index),
        }
    }

    /// Check the selection is usable before any data is seen.
    pub fn check(&self) -> Result<(), String> {
        match self {
            ColumnSelection::Indices(set) if set.is_empty() => {
                Err("column list must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Resolve to concrete indices for an input of `width` columns.
    pub fn resolve(&self, width: usize, time_column: TimeColumn) -> EngineResult<Vec<usize>> {
        match self {
            ColumnSelection::All => Ok((0..width)
                .filter(|&i| time_column.index() != Some(i))
                .collect()),
            ColumnSelection::Indices(set) => {
                if let Some(&bad) = set.iter().find(|&&i| i >= width) {
                    return Err(EngineError::ColumnOutOfRange { index: bad, width });
                }
                Ok(set.iter().copied().collect())
            }
        }
    }
}

impl Default for ColumnSelection {
    fn default() -> Self {
        ColumnSelection::indices([0])
    }
}

impl fmt::Display for ColumnSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelection::All => write!(f, "-1"),
            ColumnSelection::Indices(set) => {
                let items: Vec<String> = set.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumns {
    Sentinel(i64),
    List(Vec<i64>),
}

impl Serialize for ColumnSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ColumnSelection::All => serializer.serialize_i64(-1),
            ColumnSelection::Indices(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawColumns::deserialize(deserializer)? {
            RawColumns::Sentinel(-1) => Ok(ColumnSelection::All),
            RawColumns::Sentinel(other) => Err(D::Error::custom(format!(
                "expected -1 or an array of column indices, got {other}"
            ))),
            RawColumns::List(items) => items
                .into_iter()
                .map(|i| {
                    usize::try_from(i).map_err(|_| {
                        D::Error::custom(format!("column index must be non-negative, got {i}"))
                    })
                })
                .collect::<Result<BTreeSet<usize>, D::Error>>()
                .map(ColumnSelection::Indices),
        }
    }
}

/// Index of the column holding timestamps, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeColumn {
    /// No timestamp column (`-1` or `null` in JSON).
    #[default]
    Absent,
    /// Column index of the timestamps.
    Index(usize),
}

impl TimeColumn {
    pub fn index(&self) -> Option<usize> {
        match self {
            TimeColumn::Absent => None,
            TimeColumn::Index(i) => Some(*i),
        }
    }
}

impl Serialize for TimeColumn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeColumn::Absent => serializer.serialize_i64(-1),
            TimeColumn::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

impl<'de> Deserialize<'de> for TimeColumn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<i64>::deserialize(deserializer)? {
            None | Some(-1) => Ok(TimeColumn::Absent),
            Some(i) if i >= 0 => Ok(TimeColumn::Index(i as usize)),
            Some(i) => Err(D::Error::custom(format!(
                "expected -1 or a non-negative column index, got {i}"
            ))),
        }
    }
}

/// Window used by the Gaussian graphical model when scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlidingWindow {
    /// Score each sample on its own (`-1` in JSON).
    OutlierAnalysis,
    /// Re-estimate the model over this many trailing samples.
    Size(usize),
}

impl Default for SlidingWindow {
    fn default() -> Self {
        SlidingWindow::Size(50)
    }
}

impl Serialize for SlidingWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SlidingWindow::OutlierAnalysis => serializer.serialize_i64(-1),
            SlidingWindow::Size(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for SlidingWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            -1 => Ok(SlidingWindow::OutlierAnalysis),
            n if n >= 0 => Ok(SlidingWindow::Size(n as usize)),
            n => Err(D::Error::custom(format!(
                "expected -1 or a non-negative window size, got {n}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_minus_one_means_all_columns() {
        let sel: ColumnSelection = serde_json::from_str("-1").unwrap();
        assert_eq!(sel, ColumnSelection::All);
        assert_eq!(serde_json::to_string(&sel).unwrap(), "-1");
    }

    #[test]
    fn index_lists_are_sets() {
        let sel: ColumnSelection = serde_json::from_str("[2, 0, 2]").unwrap();
        assert_eq!(sel, ColumnSelection::indices([0, 2]));
        assert_eq!(serde_json::to_string(&sel).unwrap(), "[0,2]");
        assert_eq!(sel.to_string(), "[0, 2]");
    }

    #[test]
    fn negative_indices_and_other_sentinels_fail() {
        assert!(serde_json::from_str::<ColumnSelection>("[-2]").is_err());
        assert!(serde_json::from_str::<ColumnSelection>("-3").is_err());
        assert!(serde_json::from_str::<ColumnSelection>("\"all\"").is_err());
    }

    #[test]
    fn empty_list_fails_check() {
        let sel: ColumnSelection = serde_json::from_str("[]").unwrap();
        assert!(sel.check().is_err());
        assert!(ColumnSelection::All.check().is_ok());
    }

    #[test]
    fn resolve_skips_time_column() {
        let cols = ColumnSelection::All.resolve(4, TimeColumn::Index(1)).unwrap();
        assert_eq!(cols, vec![0, 2, 3]);

        let err = ColumnSelection::indices([5]).resolve(4, TimeColumn::Absent).unwrap_err();
        assert_eq!(err, EngineError::ColumnOutOfRange { index: 5, width: 4 });
    }

    #[test]
    fn time_column_accepts_null_and_sentinel() {
        assert_eq!(serde_json::from_str::<TimeColumn>("null").unwrap(), TimeColumn::Absent);
        assert_eq!(serde_json::from_str::<TimeColumn>("-1").unwrap(), TimeColumn::Absent);
        assert_eq!(serde_json::from_str::<TimeColumn>("3").unwrap(), TimeColumn::Index(3));
        assert!(serde_json::from_str::<TimeColumn>("-4").is_err());
        assert_eq!(serde_json::to_string(&TimeColumn::Absent).unwrap(), "-1");
    }

    #[test]
    fn sliding_window_sentinel() {
        assert_eq!(
            serde_json::from_str::<SlidingWindow>("-1").unwrap(),
            SlidingWindow::OutlierAnalysis
        );
        assert_eq!(serde_json::from_str::<SlidingWindow>("20").unwrap(), SlidingWindow::Size(20));
        assert!(serde_json::from_str::<SlidingWindow>("-7").is_err());
        assert_eq!(SlidingWindow::default(), SlidingWindow::Size(50));
    }
}
