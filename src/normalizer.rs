// 🧹 Normalizer
// Raw records -> date-sorted PriceTable -> year x month HeatmapTable
//
// Both stages are pure: no I/O, no state between runs.
// Row-level problems drop the row; schema-level problems are errors.

use crate::error::PipelineError;
use crate::record::{CellValue, PriceColumn, Record, DATE_COLUMN};
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Fixed timestamp pattern: day/month/year hour:minute:second, 24-hour
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Same pattern, as shown to people fixing their sheet
pub const DATE_FORMAT_HINT: &str = "DD/MM/YYYY HH:MM:SS";

/// Heatmap columns, always in this order
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ============================================================================
// PRICE TABLE
// ============================================================================

/// PriceRow - one successfully parsed row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub timestamp: NaiveDateTime,

    /// Indexed by `PriceColumn::index()`. None = absent, blank or non-numeric.
    pub prices: [Option<f64>; 4],

    /// Every other column, kept raw for the data preview
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, CellValue>,
}

impl PriceRow {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        PriceRow {
            timestamp,
            prices: [None; 4],
            extras: BTreeMap::new(),
        }
    }

    /// Builder pattern: set a price
    pub fn with_price(mut self, column: PriceColumn, value: f64) -> Self {
        self.prices[column.index()] = Some(value);
        self
    }

    pub fn price(&self, column: PriceColumn) -> Option<f64> {
        self.prices[column.index()]
    }
}

/// PriceTable - rows sorted ascending by timestamp
///
/// `columns` lists the price columns present in the input schema
/// (canonical order), even if every cell in one of them is blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub columns: Vec<PriceColumn>,
    pub rows: Vec<PriceRow>,
}

impl PriceTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: PriceColumn) -> bool {
        self.columns.contains(&column)
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.last().map(|r| r.timestamp)
    }

    /// Names of the extra (non-price) columns seen in any row
    pub fn extra_columns(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.rows.iter().flat_map(|r| r.extras.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Render rows back into raw records using the same date pattern.
    /// Feeding the result to `parse_and_sort` reproduces a non-empty table.
    /// An empty table yields no records, so its schema is lost; use
    /// `reparse` to run a table through the normalizer again.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::new().with(
                    DATE_COLUMN,
                    row.timestamp.format(DATE_FORMAT).to_string(),
                );
                for column in &self.columns {
                    let cell = match row.price(*column) {
                        Some(v) => CellValue::Number(v),
                        None => CellValue::Empty,
                    };
                    record.insert(column.name(), cell);
                }
                for (name, cell) in &row.extras {
                    record.insert(name, cell.clone());
                }
                record
            })
            .collect()
    }

    /// Normalize this table's own output again.
    ///
    /// An empty table has no rows to carry the `Date` column, so it comes
    /// back unchanged instead of failing with `MissingColumn`.
    pub fn reparse(&self) -> Result<PriceTable, PipelineError> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        parse_and_sort(&self.to_records())
    }
}

// ============================================================================
// NORMALIZATION REPORT
// ============================================================================

/// DroppedRow - a record excluded because its Date did not parse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRow {
    /// Position in the input sequence (0-based)
    pub index: usize,
    pub column: String,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub dropped: Vec<DroppedRow>,
}

impl NormalizationReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows in, {} kept, {} dropped (Date not {})",
            self.input_rows,
            self.kept_rows,
            self.dropped.len(),
            DATE_FORMAT_HINT
        )
    }
}

// ============================================================================
// STAGE 1: PARSE AND SORT
// ============================================================================

/// Parse every record's Date, drop the ones that fail, sort the rest.
///
/// # Errors
/// `MissingColumn("Date")` when the input is empty or no record has a
/// Date key. A present Date column whose cells all fail to parse is NOT an
/// error: it yields an empty table.
pub fn parse_and_sort(records: &[Record]) -> Result<PriceTable, PipelineError> {
    normalize(records).map(|(table, _)| table)
}

/// `parse_and_sort` plus a report of every dropped row
pub fn normalize(records: &[Record]) -> Result<(PriceTable, NormalizationReport), PipelineError> {
    let schema: BTreeSet<&str> = records.iter().flat_map(|r| r.columns()).collect();

    if records.is_empty() || !schema.contains(DATE_COLUMN) {
        return Err(PipelineError::missing_column(
            DATE_COLUMN,
            format!(
                "every row needs a '{}' cell formatted {}",
                DATE_COLUMN, DATE_FORMAT_HINT
            ),
        ));
    }

    let columns: Vec<PriceColumn> = PriceColumn::ALL
        .into_iter()
        .filter(|c| schema.contains(c.name()))
        .collect();

    let mut rows = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match parse_row(record, &columns) {
            Ok(row) => rows.push(row),
            Err((raw, reason)) => {
                debug!(index, raw = %raw, reason = %reason, "dropping row");
                dropped.push(DroppedRow {
                    index,
                    column: DATE_COLUMN.to_string(),
                    raw,
                    reason,
                });
            }
        }
    }

    // sort_by_key is stable: equal timestamps keep input order
    rows.sort_by_key(|r| r.timestamp);

    let report = NormalizationReport {
        input_rows: records.len(),
        kept_rows: rows.len(),
        dropped,
    };
    debug!(
        input = report.input_rows,
        kept = report.kept_rows,
        columns = columns.len(),
        "parsed price table"
    );

    Ok((PriceTable { columns, rows }, report))
}

/// Parse one record; Err carries (raw date text, reason)
fn parse_row(record: &Record, columns: &[PriceColumn]) -> Result<PriceRow, (String, String)> {
    let cell = record
        .get(DATE_COLUMN)
        .ok_or_else(|| (String::new(), "no Date cell".to_string()))?;

    let text = cell
        .as_text()
        .ok_or_else(|| (cell.to_string(), "Date is not text".to_string()))?;

    let timestamp = parse_timestamp(text)
        .ok_or_else(|| (text.to_string(), format!("does not match {}", DATE_FORMAT_HINT)))?;

    let mut row = PriceRow::new(timestamp);
    for column in columns {
        row.prices[column.index()] = record.get(column.name()).and_then(CellValue::as_number);
    }

    for (name, value) in record.iter() {
        if name != DATE_COLUMN && !columns.iter().any(|c| c.name() == name) {
            row.extras.insert(name.to_string(), value.clone());
        }
    }

    Ok(row)
}

/// Strict parse with `DATE_FORMAT`; no repair attempted.
///
/// chrono skips leading whitespace and takes a signed year, so both are
/// rejected here before parsing.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if text.trim() != text || !has_plain_year(text) {
        return None;
    }
    NaiveDateTime::parse_from_str(text, DATE_FORMAT).ok()
}

/// The field between the second '/' and the first space is ASCII digits only
fn has_plain_year(text: &str) -> bool {
    text.splitn(3, '/')
        .nth(2)
        .and_then(|rest| rest.split(' ').next())
        .map_or(false, |year| !year.is_empty() && year.bytes().all(|b| b.is_ascii_digit()))
}

// ============================================================================
// STAGE 2: MONTHLY AGGREGATION
// ============================================================================

/// HeatmapRow - one year, twelve month cells (None = no data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow {
    pub year: i32,
    pub cells: [Option<f64>; 12],
}

impl HeatmapRow {
    pub fn label(&self) -> String {
        self.year.to_string()
    }
}

/// HeatmapTable - years descending, months Jan..Dec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapTable {
    pub rows: Vec<HeatmapRow>,

    /// PriceTable rows left out because Close did not coerce
    pub excluded_rows: usize,
}

impl HeatmapTable {
    pub fn months(&self) -> &'static [&'static str; 12] {
        &MONTH_LABELS
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    /// Average close for (year, month 1..=12)
    pub fn get(&self, year: i32, month: u32) -> Option<f64> {
        if !(1..=12).contains(&month) {
            return None;
        }
        self.rows
            .iter()
            .find(|r| r.year == year)
            .and_then(|r| r.cells[(month - 1) as usize])
    }

    /// Smallest and largest filled cell, for colour scales
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter().flatten())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Average Close per (year, month).
///
/// # Errors
/// `MissingColumn("Close")` when the table's schema has no Close column.
pub fn aggregate_monthly(table: &PriceTable) -> Result<HeatmapTable, PipelineError> {
    if !table.has_column(PriceColumn::Close) {
        return Err(PipelineError::missing_column(
            PriceColumn::Close.name(),
            "the heatmap averages the Close price per month",
        ));
    }

    let mut groups: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    let mut excluded_rows = 0;

    for row in &table.rows {
        match row.price(PriceColumn::Close) {
            Some(close) => {
                let key = (row.timestamp.year(), row.timestamp.month0());
                let entry = groups.entry(key).or_insert((0.0, 0));
                entry.0 += close;
                entry.1 += 1;
            }
            None => excluded_rows += 1,
        }
    }

    let mut years: BTreeMap<i32, [Option<f64>; 12]> = BTreeMap::new();
    for ((year, month0), (sum, count)) in groups {
        years.entry(year).or_insert([None; 12])[month0 as usize] = Some(sum / count as f64);
    }

    let rows: Vec<HeatmapRow> = years
        .into_iter()
        .rev()
        .map(|(year, cells)| HeatmapRow { year, cells })
        .collect();

    debug!(years = rows.len(), excluded_rows, "aggregated monthly heatmap");

    Ok(HeatmapTable { rows, excluded_rows })
}
