// 📈 Series Selection
// Which price columns the time chart plots, over which date window

use crate::error::PipelineError;
use crate::normalizer::{PriceRow, PriceTable};
use crate::record::PriceColumn;
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

// ============================================================================
// COLUMN SELECTION
// ============================================================================

/// Price columns present in the table's schema, canonical order
pub fn available_columns(table: &PriceTable) -> Vec<PriceColumn> {
    PriceColumn::ALL
        .into_iter()
        .filter(|c| table.has_column(*c))
        .collect()
}

/// Close if available, otherwise the first available column
pub fn default_selection(available: &[PriceColumn]) -> Vec<PriceColumn> {
    if available.contains(&PriceColumn::Close) {
        vec![PriceColumn::Close]
    } else {
        available.first().copied().into_iter().collect()
    }
}

/// Parse a comma separated list like "close, open".
///
/// Unknown names are an error. Duplicates are collapsed, order kept.
pub fn parse_selection(text: &str) -> Result<Vec<PriceColumn>, PipelineError> {
    let mut selection = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let column: PriceColumn = part.parse()?;
        if !selection.contains(&column) {
            selection.push(column);
        }
    }
    Ok(selection)
}

/// Resolve a requested selection against the table.
///
/// None, or a request that keeps nothing, falls back to `default_selection`.
pub fn resolve_selection(table: &PriceTable, requested: Option<&[PriceColumn]>) -> Vec<PriceColumn> {
    let available = available_columns(table);

    let Some(requested) = requested else {
        return default_selection(&available);
    };

    let mut kept = Vec::new();
    for column in requested {
        if available.contains(column) {
            kept.push(*column);
        } else {
            warn!(column = %column, "requested series not in data, ignoring");
        }
    }

    if kept.is_empty() {
        default_selection(&available)
    } else {
        kept
    }
}

// ============================================================================
// LONG FORM
// ============================================================================

/// SeriesPoint - one (timestamp, series, value) triple for a multi-line chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub price_type: PriceColumn,
    pub value: f64,
}

/// Reshape rows into long form: row order, then selection order.
/// Cells without a numeric value produce no point.
pub fn melt(rows: &[PriceRow], selected: &[PriceColumn]) -> Vec<SeriesPoint> {
    rows.iter()
        .flat_map(|row| {
            selected.iter().filter_map(move |column| {
                row.price(*column).map(|value| SeriesPoint {
                    timestamp: row.timestamp,
                    price_type: *column,
                    value,
                })
            })
        })
        .collect()
}

/// Per-series figures shown next to the chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub price_type: PriceColumn,
    pub points: usize,
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesSummary {
    /// Relative change first -> last, None when first is zero
    pub fn change_pct(&self) -> Option<f64> {
        if self.first == 0.0 {
            None
        } else {
            Some((self.last - self.first) / self.first * 100.0)
        }
    }
}

/// One summary per selected column that has at least one point
pub fn summarize(points: &[SeriesPoint], selected: &[PriceColumn]) -> Vec<SeriesSummary> {
    selected
        .iter()
        .filter_map(|column| {
            let values: Vec<f64> = points
                .iter()
                .filter(|p| p.price_type == *column)
                .map(|p| p.value)
                .collect();

            let first = *values.first()?;
            let last = *values.last()?;
            Some(SeriesSummary {
                price_type: *column,
                points: values.len(),
                first,
                last,
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        })
        .collect()
}

// ============================================================================
// DATE RANGE PRESETS
// ============================================================================

/// RangePreset - chart windows anchored at the latest row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangePreset {
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "ytd", alias = "YTD")]
    YearToDate,
    #[serde(rename = "1y")]
    OneYear,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl RangePreset {
    pub const ALL: [RangePreset; 5] = [
        RangePreset::OneMonth,
        RangePreset::SixMonths,
        RangePreset::YearToDate,
        RangePreset::OneYear,
        RangePreset::All,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RangePreset::OneMonth => "1m",
            RangePreset::SixMonths => "6m",
            RangePreset::YearToDate => "YTD",
            RangePreset::OneYear => "1y",
            RangePreset::All => "all",
        }
    }

    /// Cycle order used by the terminal dashboard
    pub fn next(&self) -> Self {
        match self {
            RangePreset::OneMonth => RangePreset::SixMonths,
            RangePreset::SixMonths => RangePreset::YearToDate,
            RangePreset::YearToDate => RangePreset::OneYear,
            RangePreset::OneYear => RangePreset::All,
            RangePreset::All => RangePreset::OneMonth,
        }
    }

    /// Inclusive start of the window ending at `last`; None = unbounded
    pub fn start(&self, last: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            RangePreset::OneMonth => last.checked_sub_months(Months::new(1)),
            RangePreset::SixMonths => last.checked_sub_months(Months::new(6)),
            RangePreset::OneYear => last.checked_sub_months(Months::new(12)),
            RangePreset::YearToDate => {
                NaiveDate::from_ymd_opt(last.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            RangePreset::All => None,
        }
    }

    /// Rows of `table` inside the window
    pub fn window<'a>(&self, table: &'a PriceTable) -> &'a [PriceRow] {
        let Some(last) = table.last_timestamp() else {
            return &table.rows;
        };
        match self.start(last) {
            // rows are sorted, so the window is a suffix
            Some(start) => {
                let from = table.rows.partition_point(|r| r.timestamp < start);
                &table.rows[from..]
            }
            None => &table.rows,
        }
    }
}

impl fmt::Display for RangePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RangePreset {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(RangePreset::OneMonth),
            "6m" => Ok(RangePreset::SixMonths),
            "ytd" => Ok(RangePreset::YearToDate),
            "1y" => Ok(RangePreset::OneYear),
            "all" => Ok(RangePreset::All),
            _ => Err(PipelineError::InvalidRange(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::parse_and_sort;
    use crate::record::Record;

    fn table(rows: &[(&str, Option<&str>, Option<&str>)]) -> PriceTable {
        let records: Vec<Record> = rows
            .iter()
            .map(|(date, open, close)| {
                let mut r = Record::new().with("Date", *date);
                if let Some(o) = open {
                    r.insert("Open", *o);
                }
                if let Some(c) = close {
                    r.insert("Close", *c);
                }
                r
            })
            .collect();
        parse_and_sort(&records).unwrap()
    }

    #[test]
    fn test_default_selection_prefers_close() {
        assert_eq!(
            default_selection(&[PriceColumn::Open, PriceColumn::Close]),
            vec![PriceColumn::Close]
        );
        assert_eq!(
            default_selection(&[PriceColumn::High, PriceColumn::Low]),
            vec![PriceColumn::High]
        );
        assert!(default_selection(&[]).is_empty());
    }

    #[test]
    fn test_available_columns_follow_schema() {
        let t = table(&[("01/01/2023 09:00:00", Some("1"), None)]);
        assert_eq!(available_columns(&t), vec![PriceColumn::Open]);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection("close, open,CLOSE").unwrap(),
            vec![PriceColumn::Close, PriceColumn::Open]
        );
        assert!(parse_selection("").unwrap().is_empty());
        assert_eq!(
            parse_selection("close,volume").unwrap_err(),
            PipelineError::UnknownColumn("volume".to_string())
        );
    }

    #[test]
    fn test_resolve_selection_drops_absent_columns() {
        let t = table(&[("01/01/2023 09:00:00", Some("1"), Some("2"))]);
        let chosen = resolve_selection(&t, Some(&[PriceColumn::High, PriceColumn::Open][..]));
        assert_eq!(chosen, vec![PriceColumn::Open]);

        let fallback = resolve_selection(&t, Some(&[PriceColumn::Low][..]));
        assert_eq!(fallback, vec![PriceColumn::Close]);

        assert_eq!(resolve_selection(&t, None), vec![PriceColumn::Close]);
    }

    #[test]
    fn test_melt_row_then_selection_order() {
        let t = table(&[
            ("02/01/2023 09:00:00", Some("1.5"), Some("2.5")),
            ("01/01/2023 09:00:00", Some("1.0"), Some("x")),
        ]);
        let points = melt(&t.rows, &[PriceColumn::Close, PriceColumn::Open]);

        let flat: Vec<(u32, PriceColumn, f64)> = points
            .iter()
            .map(|p| (p.timestamp.day(), p.price_type, p.value))
            .collect();
        assert_eq!(
            flat,
            vec![
                (1, PriceColumn::Open, 1.0),
                (2, PriceColumn::Close, 2.5),
                (2, PriceColumn::Open, 1.5),
            ]
        );
    }

    #[test]
    fn test_summarize() {
        let t = table(&[
            ("01/01/2023 09:00:00", None, Some("10")),
            ("02/01/2023 09:00:00", None, Some("8")),
            ("03/01/2023 09:00:00", None, Some("12")),
        ]);
        let points = melt(&t.rows, &[PriceColumn::Close]);
        let summary = summarize(&points, &[PriceColumn::Close, PriceColumn::Open]);

        assert_eq!(summary.len(), 1);
        let s = &summary[0];
        assert_eq!((s.points, s.first, s.last, s.min, s.max), (3, 10.0, 12.0, 8.0, 12.0));
        assert!((s.change_pct().unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_range_parsing() {
        assert_eq!("6M".parse::<RangePreset>().unwrap(), RangePreset::SixMonths);
        assert_eq!("YTD".parse::<RangePreset>().unwrap(), RangePreset::YearToDate);
        assert_eq!("all".parse::<RangePreset>().unwrap(), RangePreset::All);
        assert!("2w".parse::<RangePreset>().is_err());
        assert_eq!(
            "".parse::<RangePreset>().unwrap_err(),
            PipelineError::InvalidRange(String::new())
        );
        assert!("  ".parse::<RangePreset>().is_err());

        for preset in RangePreset::ALL {
            assert_eq!(preset.label().parse::<RangePreset>().unwrap(), preset);
        }
    }

    #[test]
    fn test_range_windows() {
        let t = table(&[
            ("15/03/2022 09:00:00", None, Some("1")),
            ("20/12/2022 09:00:00", None, Some("2")),
            ("10/01/2023 09:00:00", None, Some("3")),
            ("20/05/2023 09:00:00", None, Some("4")),
            ("20/06/2023 09:00:00", None, Some("5")),
        ]);
        let closes = |rows: &[PriceRow]| -> Vec<f64> {
            rows.iter().filter_map(|r| r.price(PriceColumn::Close)).collect()
        };

        assert_eq!(closes(RangePreset::OneMonth.window(&t)), vec![4.0, 5.0]);
        assert_eq!(closes(RangePreset::SixMonths.window(&t)), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(closes(RangePreset::YearToDate.window(&t)), vec![3.0, 4.0, 5.0]);
        assert_eq!(closes(RangePreset::OneYear.window(&t)), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(closes(RangePreset::All.window(&t)).len(), 5);
    }

    #[test]
    fn test_range_cycle_visits_all() {
        let mut preset = RangePreset::All;
        for _ in 0..RangePreset::ALL.len() {
            preset = preset.next();
        }
        assert_eq!(preset, RangePreset::All);
    }
}
