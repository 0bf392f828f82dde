//! Time series data handling for forecasting

use crate::error::{ForecastError, Result};
use crate::utils::date_parser;
use chrono::{DateTime, Duration, TimeZone, Utc};
use polars::prelude::*;
use series_math::{present, sanitize};
use std::fs::File;
use std::path::Path;

/// Values of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Numeric values, `None` marks a missing cell
    Numeric(Vec<Option<f64>>),
    /// Free text values, carried through untouched
    Text(Vec<Option<String>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => {
                ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named column of a [`TimeSeriesFrame`]
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    /// Numeric column with possibly missing values
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Fully defined numeric column
    pub fn from_values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::numeric(name, values.into_iter().map(Some).collect())
    }

    /// Text column
    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column values
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the column has no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the column holds numbers
    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }

    /// Numeric values, if this is a numeric column
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }
}

/// Row index of a frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameIndex {
    /// Strictly increasing timestamps
    Timestamps(Vec<DateTime<Utc>>),
    /// Plain row positions, no date semantics
    Ordinal(usize),
}

impl FrameIndex {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            FrameIndex::Timestamps(t) => t.len(),
            FrameIndex::Ordinal(n) => *n,
        }
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered table of observations with one index and named columns
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    index: FrameIndex,
    columns: Vec<Column>,
}

impl TimeSeriesFrame {
    /// Create a frame, checking column lengths, unique names and index order
    pub fn new(index: FrameIndex, columns: Vec<Column>) -> Result<Self> {
        let rows = index.len();

        for (i, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ForecastError::DataError(format!(
                    "Column '{}' has {} values, index has {}",
                    column.name,
                    column.len(),
                    rows
                )));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ForecastError::DataError(format!(
                    "Duplicate column '{}'",
                    column.name
                )));
            }
        }

        if let FrameIndex::Timestamps(stamps) = &index {
            if stamps.windows(2).any(|w| w[1] <= w[0]) {
                return Err(ForecastError::DataError(
                    "Timestamps must be strictly increasing".to_string(),
                ));
            }
        }

        Ok(Self { index, columns })
    }

    /// Create a single-column frame from dates and values
    pub fn from_series(
        dates: Vec<DateTime<Utc>>,
        column: &str,
        values: Vec<f64>,
    ) -> Result<Self> {
        Self::new(
            FrameIndex::Timestamps(dates),
            vec![Column::from_values(column, values)],
        )
    }

    /// Create a frame without date semantics
    pub fn without_index(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        Self::new(FrameIndex::Ordinal(rows), columns)
    }

    /// Create a frame from rows whose timestamps may be unsorted or missing.
    ///
    /// Rows without a timestamp are dropped, the rest are sorted by time and
    /// duplicated timestamps keep the last occurrence.
    pub fn from_unsorted(stamps: Vec<Option<DateTime<Utc>>>, columns: Vec<Column>) -> Result<Self> {
        let mut order: Vec<(usize, DateTime<Utc>)> = stamps
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s)))
            .collect();
        // Stable sort keeps file order among equal timestamps
        order.sort_by_key(|(_, s)| *s);

        let mut rows: Vec<usize> = Vec::with_capacity(order.len());
        let mut index: Vec<DateTime<Utc>> = Vec::with_capacity(order.len());
        for (row, stamp) in order {
            if index.last() == Some(&stamp) {
                if let Some(slot) = rows.last_mut() {
                    *slot = row;
                }
                continue;
            }
            rows.push(row);
            index.push(stamp);
        }

        let columns = columns
            .into_iter()
            .map(|c| Column {
                data: c.data.select(&rows),
                name: c.name,
            })
            .collect();

        Self::new(FrameIndex::Timestamps(index), columns)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the frame has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The row index
    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    /// Whether rows carry timestamps
    pub fn is_datetime_indexed(&self) -> bool {
        matches!(self.index, FrameIndex::Timestamps(_))
    }

    /// Timestamps, when the index is date-typed
    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        match &self.index {
            FrameIndex::Timestamps(t) => Some(t),
            FrameIndex::Ordinal(_) => None,
        }
    }

    /// Timestamp of the most recent row
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps().and_then(|t| t.last().copied())
    }

    /// All columns in order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Numeric values of a column
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        self.column(name).and_then(Column::as_numeric)
    }

    /// Most recent numeric value of a column (missing cells read as `None`)
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.numeric(name)
            .and_then(|v| v.last().copied())
            .and_then(present)
    }

    /// Values of the target column, failing when it is absent or not numeric
    pub fn target_values(&self, target: &str) -> Result<&[Option<f64>]> {
        let column = self.column(target).ok_or_else(|| {
            ForecastError::DataError(format!(
                "Target column '{}' not found. Available columns: {:?}",
                target,
                self.column_names()
            ))
        })?;
        column.as_numeric().ok_or_else(|| {
            ForecastError::DataError(format!("Target column '{}' is not numeric", target))
        })
    }

    /// Convert a text column to numbers; cells that do not parse become missing
    pub fn coerce_numeric(&mut self, name: &str) -> Result<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ForecastError::DataError(format!("Column '{}' not found", name)))?;

        if let ColumnData::Text(values) = &column.data {
            let parsed = values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                .collect();
            column.data = ColumnData::Numeric(parsed);
        }
        Ok(())
    }

    /// Last `n` rows
    pub fn tail(&self, n: usize) -> Self {
        self.slice(self.len().saturating_sub(n), self.len())
    }

    /// First `n` rows (or all of them)
    pub fn head(&self, n: usize) -> Self {
        self.slice(0, n.min(self.len()))
    }

    /// Drop trailing rows whose `name` value is missing.
    ///
    /// Returns `None` when the column is absent or has no present value.
    pub fn trim_to_last_present(&self, name: &str) -> Option<Self> {
        let last = self.numeric(name)?.iter().rposition(|v| present(*v).is_some())?;
        Some(self.head(last + 1))
    }

    fn slice(&self, start: usize, end: usize) -> Self {
        let rows: Vec<usize> = (start..end).collect();
        let index = match &self.index {
            FrameIndex::Timestamps(t) => FrameIndex::Timestamps(t[start..end].to_vec()),
            FrameIndex::Ordinal(_) => FrameIndex::Ordinal(rows.len()),
        };
        Self {
            index,
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.select(&rows),
                })
                .collect(),
        }
    }

    /// Give an ordinal frame synthetic daily timestamps ending one day before now
    pub fn ensure_datetime_index(self) -> Self {
        self.ensure_datetime_index_at(Utc::now())
    }

    /// Give an ordinal frame synthetic daily timestamps anchored at `now - len` days
    pub fn ensure_datetime_index_at(self, now: DateTime<Utc>) -> Self {
        match self.index {
            FrameIndex::Timestamps(_) => self,
            FrameIndex::Ordinal(n) => {
                let start = now - Duration::days(n as i64);
                let stamps = (0..n).map(|i| start + Duration::days(i as i64)).collect();
                Self {
                    index: FrameIndex::Timestamps(stamps),
                    columns: self.columns,
                }
            }
        }
    }

    /// Append a row that sets `target` to `value` and carries every other
    /// column forward from the most recent row.
    ///
    /// Carried numbers that are missing, NaN or infinite become `0.0`; text
    /// cells are copied unchanged. Ordinal frames ignore `timestamp`.
    pub fn append_carried_row(
        &mut self,
        timestamp: DateTime<Utc>,
        target: &str,
        value: f64,
    ) -> Result<()> {
        if !self.has_column(target) {
            return Err(ForecastError::DataError(format!(
                "Target column '{}' not found",
                target
            )));
        }

        match &mut self.index {
            FrameIndex::Timestamps(stamps) => {
                if let Some(last) = stamps.last() {
                    if timestamp <= *last {
                        return Err(ForecastError::DataError(format!(
                            "New timestamp {} does not follow {}",
                            timestamp, last
                        )));
                    }
                }
                stamps.push(timestamp);
            }
            FrameIndex::Ordinal(n) => *n += 1,
        }

        for column in &mut self.columns {
            let is_target = column.name == target;
            match &mut column.data {
                ColumnData::Numeric(values) => {
                    let cell = if is_target {
                        value
                    } else {
                        sanitize(values.last().copied().flatten().unwrap_or(0.0))
                    };
                    values.push(Some(cell));
                }
                ColumnData::Text(values) => {
                    let carried = values.last().cloned().flatten();
                    values.push(carried);
                }
            }
        }

        Ok(())
    }
}

/// Pick the column to forecast.
///
/// Exact match first, then a case-insensitive containment match in either
/// direction, then the first column that looks like a price.
pub fn resolve_target_column(frame: &TimeSeriesFrame, requested: &str) -> Result<String> {
    if frame.has_column(requested) {
        return Ok(requested.to_string());
    }

    let wanted = requested.trim().to_lowercase();
    let names = frame.column_names();

    if !wanted.is_empty() {
        if let Some(name) = names.iter().find(|name| {
            let lower = name.to_lowercase();
            lower.contains(&wanted) || wanted.contains(&lower)
        }) {
            return Ok(name.to_string());
        }
    }

    for hint in ["close", "price", "value"] {
        if let Some(name) = names.iter().find(|n| n.to_lowercase().contains(hint)) {
            return Ok(name.to_string());
        }
    }

    Err(ForecastError::DataError(format!(
        "Target column '{}' does not exist. Available columns: {:?}",
        requested, names
    )))
}

/// Data loader for tabular time series
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a frame from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<TimeSeriesFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Convert a polars DataFrame into a frame
    pub fn from_dataframe(df: &DataFrame) -> Result<TimeSeriesFrame> {
        if df.height() == 0 || df.width() == 0 {
            return Err(ForecastError::DataError("The data file is empty".to_string()));
        }

        let time_column = Self::detect_time_column(df);

        let mut columns = Vec::with_capacity(df.width());
        for series in df.get_columns() {
            if Some(series.name()) == time_column.as_deref() {
                continue;
            }
            columns.push(Self::series_to_column(series)?);
        }

        match time_column {
            Some(name) => {
                let stamps = Self::series_to_timestamps(df.column(&name)?)?;
                let frame = TimeSeriesFrame::from_unsorted(stamps, columns)?;
                if frame.is_empty() {
                    return Err(ForecastError::DataError(format!(
                        "No parseable dates in column '{}'",
                        name
                    )));
                }
                Ok(frame)
            }
            None => TimeSeriesFrame::new(FrameIndex::Ordinal(df.height()), columns),
        }
    }

    /// Detect the time column in a DataFrame
    fn detect_time_column(df: &DataFrame) -> Option<String> {
        // Look for common time column names
        for name in df.get_column_names() {
            let lower_name = name.to_lowercase();
            if lower_name.contains("time")
                || lower_name.contains("date")
                || lower_name.contains("timestamp")
            {
                return Some(name.to_string());
            }
        }

        // Otherwise any column with a temporal dtype
        df.get_columns()
            .iter()
            .find(|s| s.dtype().is_temporal())
            .map(|s| s.name().to_string())
    }

    fn series_to_column(series: &Series) -> Result<Column> {
        let name = series.name().trim().to_string();

        match series.dtype() {
            DataType::Utf8 => {
                let values = series
                    .utf8()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect();
                Ok(Column::text(name, values))
            }
            dtype if dtype.is_numeric() || matches!(dtype, DataType::Boolean) => {
                let casted = series.cast(&DataType::Float64)?;
                let values = casted.f64()?.into_iter().collect();
                Ok(Column::numeric(name, values))
            }
            _ => {
                let casted = series.cast(&DataType::Utf8)?;
                let values = casted
                    .utf8()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect();
                Ok(Column::text(name, values))
            }
        }
    }

    fn series_to_timestamps(series: &Series) -> Result<Vec<Option<DateTime<Utc>>>> {
        match series.dtype() {
            DataType::Date => {
                let days = series.cast(&DataType::Int32)?;
                Ok(days
                    .i32()?
                    .into_iter()
                    .map(|d| {
                        d.and_then(|d| Utc.timestamp_opt(i64::from(d) * 86_400, 0).single())
                    })
                    .collect())
            }
            DataType::Datetime(unit, _) => {
                let unit = *unit;
                let raw = series.cast(&DataType::Int64)?;
                Ok(raw
                    .i64()?
                    .into_iter()
                    .map(|v| {
                        v.and_then(|v| match unit {
                            TimeUnit::Nanoseconds => Some(Utc.timestamp_nanos(v)),
                            TimeUnit::Microseconds => Utc
                                .timestamp_opt(v.div_euclid(1_000_000), (v.rem_euclid(1_000_000) * 1_000) as u32)
                                .single(),
                            TimeUnit::Milliseconds => Utc.timestamp_millis_opt(v).single(),
                        })
                    })
                    .collect())
            }
            DataType::Utf8 => Ok(series
                .utf8()?
                .into_iter()
                .map(|v| v.and_then(|s| date_parser::parse_date(s).ok()))
                .collect()),
            dtype => Err(ForecastError::DataError(format!(
                "Column '{}' of type {} cannot be read as dates",
                series.name(),
                dtype
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_unsorted_timestamps() {
        let result = TimeSeriesFrame::from_series(vec![day(2), day(1)], "Close", vec![1.0, 2.0]);
        assert!(matches!(result, Err(ForecastError::DataError(_))));
    }

    #[test]
    fn test_from_unsorted_sorts_and_dedupes() {
        let frame = TimeSeriesFrame::from_unsorted(
            vec![Some(day(3)), None, Some(day(1)), Some(day(3))],
            vec![Column::from_values("Close", vec![30.0, 99.0, 10.0, 31.0])],
        )
        .unwrap();

        assert_eq!(frame.timestamps().unwrap(), &[day(1), day(3)]);
        assert_eq!(frame.numeric("Close").unwrap(), &[Some(10.0), Some(31.0)]);
    }

    #[test]
    fn test_trim_to_last_present() {
        let frame = TimeSeriesFrame::new(
            FrameIndex::Timestamps(vec![day(1), day(2), day(3), day(4)]),
            vec![
                Column::numeric("Close", vec![Some(1.0), Some(2.0), Some(f64::NAN), None]),
                Column::from_values("Volume", vec![5.0, 6.0, 7.0, 8.0]),
            ],
        )
        .unwrap();

        let trimmed = frame.trim_to_last_present("Close").unwrap();
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.last_timestamp(), Some(day(2)));
        assert_eq!(trimmed.last_value("Volume"), Some(6.0));
        assert_eq!(frame.trim_to_last_present("Volume").unwrap().len(), 4);
        assert!(frame.trim_to_last_present("Open").is_none());
    }

    #[test]
    fn test_append_carried_row() {
        let mut frame = TimeSeriesFrame::new(
            FrameIndex::Timestamps(vec![day(1), day(2)]),
            vec![
                Column::from_values("Close", vec![1.0, 2.0]),
                Column::numeric("Volume", vec![Some(10.0), Some(f64::INFINITY)]),
                Column::text("Ticker", vec![Some("ABC".into()), Some("ABC".into())]),
            ],
        )
        .unwrap();

        frame.append_carried_row(day(3), "Close", 2.5).unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.last_value("Close"), Some(2.5));
        assert_eq!(frame.last_value("Volume"), Some(0.0));
        match frame.column("Ticker").unwrap().data() {
            ColumnData::Text(v) => assert_eq!(v[2].as_deref(), Some("ABC")),
            ColumnData::Numeric(_) => panic!("text column became numeric"),
        }

        assert!(frame.append_carried_row(day(3), "Close", 1.0).is_err());
    }

    #[test]
    fn test_ensure_datetime_index_anchors_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let frame = TimeSeriesFrame::without_index(vec![Column::from_values("v", vec![1.0; 3])])
            .unwrap()
            .ensure_datetime_index_at(now);

        let stamps = frame.timestamps().unwrap();
        assert_eq!(stamps[0], now - Duration::days(3));
        assert_eq!(stamps[2], now - Duration::days(1));
    }
}
