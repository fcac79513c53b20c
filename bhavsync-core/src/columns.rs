//! Column normalization: rename four source columns and select them in a
//! fixed order.

use crate::table::{BhavcopyRecord, BhavcopyTable, RawTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output header for the security identifier.
pub const ISIN: &str = "ISIN";
/// Output header for the trade date.
pub const TRADE_DATE: &str = "TradDt";
/// Output header for the ticker symbol.
pub const SYMBOL: &str = "TckrSymb";
/// Output header for the closing price.
pub const CLOSE: &str = "ClsPric";

/// Rename of one source column to its output name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub source: String,
    pub target: String,
}

impl ColumnRename {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The four renames, in output order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub isin: ColumnRename,
    pub trade_date: ColumnRename,
    pub symbol: ColumnRename,
    pub close: ColumnRename,
}

impl ColumnMap {
    /// Map source columns onto the default output headers.
    pub fn from_sources(isin: &str, trade_date: &str, symbol: &str, close: &str) -> Self {
        Self {
            isin: ColumnRename::new(isin, ISIN),
            trade_date: ColumnRename::new(trade_date, TRADE_DATE),
            symbol: ColumnRename::new(symbol, SYMBOL),
            close: ColumnRename::new(close, CLOSE),
        }
    }

    /// Source and output names already agree.
    pub fn identity() -> Self {
        Self::from_sources(ISIN, TRADE_DATE, SYMBOL, CLOSE)
    }

    pub fn renames(&self) -> [&ColumnRename; 4] {
        [&self.isin, &self.trade_date, &self.symbol, &self.close]
    }

    pub fn targets(&self) -> [String; 4] {
        [
            self.isin.target.clone(),
            self.trade_date.target.clone(),
            self.symbol.target.clone(),
            self.close.target.clone(),
        ]
    }

    /// Apply normalization to a raw table.
    ///
    /// Each source column is looked up by name; when it is absent, a column
    /// already carrying the output name is used instead. Output columns are
    /// the four targets in order, one row per input row with values
    /// unchanged. Rows with an empty required value are dropped and counted.
    pub fn normalize(&self, raw: &RawTable) -> Result<BhavcopyTable, ColumnError> {
        let mut indices = [0usize; 4];
        let mut missing = Vec::new();

        for (slot, rename) in indices.iter_mut().zip(self.renames()) {
            match raw
                .column_index(&rename.source)
                .or_else(|| raw.column_index(&rename.target))
            {
                Some(idx) => *slot = idx,
                None => missing.push(rename.source.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(ColumnError::Missing {
                missing,
                found: raw.headers.clone(),
            });
        }

        let cell = |row: &[String], idx: usize| row.get(idx).cloned().unwrap_or_default();

        let mut records = Vec::with_capacity(raw.rows.len());
        let mut dropped_rows = 0;
        for row in &raw.rows {
            let row = row.as_slice();
            let record = BhavcopyRecord {
                isin: cell(row, indices[0]),
                trade_date: cell(row, indices[1]),
                symbol: cell(row, indices[2]),
                close: cell(row, indices[3]),
            };
            if record.is_complete() {
                records.push(record);
            } else {
                dropped_rows += 1;
            }
        }

        Ok(BhavcopyTable {
            headers: self.targets(),
            records,
            dropped_rows,
        })
    }
}

/// Partial override of a `ColumnMap`'s source names, as written in job files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnOverrides {
    pub isin: Option<String>,
    pub trade_date: Option<String>,
    pub symbol: Option<String>,
    pub close: Option<String>,
}

impl ColumnOverrides {
    pub fn is_empty(&self) -> bool {
        self.isin.is_none()
            && self.trade_date.is_none()
            && self.symbol.is_none()
            && self.close.is_none()
    }

    pub fn apply(&self, mut base: ColumnMap) -> ColumnMap {
        if let Some(s) = &self.isin {
            base.isin.source = s.clone();
        }
        if let Some(s) = &self.trade_date {
            base.trade_date.source = s.clone();
        }
        if let Some(s) = &self.symbol {
            base.symbol.source = s.clone();
        }
        if let Some(s) = &self.close {
            base.close.source = s.clone();
        }
        base
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ColumnError {
    #[error("missing columns [{}] (found [{}])", .missing.join(", "), .found.join(", "))]
    Missing {
        missing: Vec<String>,
        found: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn bse_map() -> ColumnMap {
        ColumnMap::from_sources("ISIN_CODE", "TRADE_DATE", "SC_NAME", "CLOSE")
    }

    #[test]
    fn renames_and_reorders() {
        let t = raw(
            &["SC_NAME", "OPEN", "CLOSE", "ISIN_CODE", "TRADE_DATE"],
            &[&["RELIANCE", "2890", "2901.65", "INE002A01018", "14-Mar-2024"]],
        );
        let out = bse_map().normalize(&t).unwrap();
        assert_eq!(out.headers, ["ISIN", "TradDt", "TckrSymb", "ClsPric"]);
        assert_eq!(
            out.rows(),
            vec![vec!["INE002A01018", "14-Mar-2024", "RELIANCE", "2901.65"]]
        );
    }

    #[test]
    fn falls_back_to_target_name() {
        // Newer BSE files already use the UDiFF names.
        let t = raw(
            &["TradDt", "ISIN", "TckrSymb", "ClsPric"],
            &[&["2024-03-14", "INE002A01018", "RELIANCE", "2901.65"]],
        );
        let out = bse_map().normalize(&t).unwrap();
        assert_eq!(out.records[0].symbol, "RELIANCE");
        assert_eq!(out.records[0].trade_date, "2024-03-14");
    }

    #[test]
    fn reports_every_missing_column() {
        let t = raw(&["ISIN_CODE", "SC_NAME"], &[]);
        let err = bse_map().normalize(&t).unwrap_err();
        assert_eq!(
            err,
            ColumnError::Missing {
                missing: vec!["TRADE_DATE".into(), "CLOSE".into()],
                found: vec!["ISIN_CODE".into(), "SC_NAME".into()],
            }
        );
    }

    #[test]
    fn drops_rows_with_empty_values() {
        let t = raw(
            &["ISIN", "TradDt", "TckrSymb", "ClsPric"],
            &[
                &["INE1", "2024-03-14", "AAA", "1.0"],
                &["INE2", "2024-03-14", "", "2.0"],
                &["INE3", "2024-03-14", "CCC"],
            ],
        );
        let out = ColumnMap::identity().normalize(&t).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.dropped_rows, 2);
    }

    #[test]
    fn duplicates_pass_through() {
        let row: &[&str] = &["INE1", "2024-03-14", "AAA", "1.0"];
        let t = raw(&["ISIN", "TradDt", "TckrSymb", "ClsPric"], &[row, row]);
        let out = ColumnMap::identity().normalize(&t).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn overrides_replace_sources_only() {
        let o = ColumnOverrides {
            close: Some("LAST".into()),
            ..Default::default()
        };
        let m = o.apply(bse_map());
        assert_eq!(m.close, ColumnRename::new("LAST", CLOSE));
        assert_eq!(m.isin.source, "ISIN_CODE");
        assert!(ColumnOverrides::default().is_empty());
    }
}
