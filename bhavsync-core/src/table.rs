//! Tabular data: the raw CSV inside a bhavcopy and the normalized output.

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

/// Header row and data rows of a bhavcopy CSV, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parse comma-delimited bytes with a header row.
    ///
    /// Header names are trimmed and a leading UTF-8 BOM is dropped. Rows may
    /// have more or fewer fields than the header (some exchange files carry
    /// trailing commas); missing trailing fields read as empty.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, csv::Error> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(bytes);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(|f| f.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Index of the first header equal to `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// One row of normalized bhavcopy output. Values are the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BhavcopyRecord {
    pub isin: String,
    pub trade_date: String,
    pub symbol: String,
    pub close: String,
}

impl BhavcopyRecord {
    /// Fields in output column order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.isin.clone(),
            self.trade_date.clone(),
            self.symbol.clone(),
            self.close.clone(),
        ]
    }

    pub fn is_complete(&self) -> bool {
        !self.isin.trim().is_empty()
            && !self.trade_date.trim().is_empty()
            && !self.symbol.trim().is_empty()
            && !self.close.trim().is_empty()
    }
}

/// Normalized bhavcopy: four named columns and their rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BhavcopyTable {
    /// Output column names, in order: identifier, trade date, symbol, close.
    pub headers: [String; 4],
    pub records: Vec<BhavcopyRecord>,
    /// Source rows dropped because a required value was empty.
    pub dropped_rows: usize,
}

impl BhavcopyTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn header_row(&self) -> Vec<String> {
        self.headers.to_vec()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.records.iter().map(BhavcopyRecord::to_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let t = RawTable::from_csv(b"A,B\n1,2\n3,4\n").unwrap();
        assert_eq!(t.headers, vec!["A", "B"]);
        assert_eq!(t.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn trims_headers_and_strips_bom() {
        let t = RawTable::from_csv(b"\xEF\xBB\xBF ISIN , TradDt\nINE1,2024-03-14\n").unwrap();
        assert_eq!(t.headers, vec!["ISIN", "TradDt"]);
        assert_eq!(t.column_index("TradDt"), Some(1));
    }

    #[test]
    fn tolerates_trailing_commas_and_blank_rows() {
        let t = RawTable::from_csv(b"A,B,\n1,2,\n,,\n3,4\n").unwrap();
        assert_eq!(t.headers, vec!["A", "B", ""]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1], vec!["3", "4"]);
    }

    #[test]
    fn values_are_not_trimmed() {
        let t = RawTable::from_csv(b"A\n  x  \n").unwrap();
        assert_eq!(t.rows[0][0], "  x  ");
    }

    #[test]
    fn record_completeness() {
        let mut r = BhavcopyRecord {
            isin: "INE002A01018".into(),
            trade_date: "2024-03-14".into(),
            symbol: "RELIANCE".into(),
            close: "2901.65".into(),
        };
        assert!(r.is_complete());
        r.close = " ".into();
        assert!(!r.is_complete());
    }
}
