pub mod google;

use super::Result;
use crate::nutrition::{Amount, NutritionRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// The fixed header of the destination worksheet.
pub const HEADER: [&str; 7] = ["Date", "Calories", "Carbs", "Fat", "Protein", "Sodium", "Sugar"];

/// Cell value written for a field the provider did not report.
pub const EMPTY_MARKER: &str = "";

/// One worksheet row in `HEADER` column order.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow(Vec<Value>);

impl SheetRow {
    /// The cell values of the row.
    pub fn cells(&self) -> &[Value] {
        &self.0
    }

    /// The date cell of the row.
    pub fn date(&self) -> &str {
        self.0.first().and_then(Value::as_str).unwrap_or(EMPTY_MARKER)
    }
}

impl From<&NutritionRecord> for SheetRow {
    fn from(record: &NutritionRecord) -> Self {
        let mut cells = Vec::with_capacity(HEADER.len());
        cells.push(Value::String(date_key(record.date)));
        cells.extend(record.fields().into_iter().map(cell));
        SheetRow(cells)
    }
}

fn cell(amount: Option<&Amount>) -> Value {
    match amount {
        Some(Amount::Number(number)) => Value::Number(number.clone()),
        Some(Amount::Text(text)) => Value::String(text.clone()),
        None => Value::String(EMPTY_MARKER.to_owned()),
    }
}

/// The canonical ISO-8601 form dates are stored and compared as.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Snapshot of the date column below the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateColumn {
    dates: Vec<String>,
}

impl DateColumn {
    /// Creates a snapshot from the data cells of the column, i.e. without the header cell.
    pub fn new<I>(iter: I) -> DateColumn
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        DateColumn {
            dates: iter.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a snapshot from the full column as read from the sheet, header cell included.
    pub fn from_sheet_column(column: Vec<String>) -> DateColumn {
        DateColumn::new(column.into_iter().skip(1))
    }

    /// Returns the 1-indexed sheet row holding `date`. With duplicate dates this is the first
    /// of them.
    pub fn row_of(&self, date: &str) -> Option<usize> {
        self.dates
            .iter()
            .position(|cell| cell == date)
            .map(|index| index + 2)
    }

    /// Returns every date that occurs more than once, mapped to the sheet rows it occurs in.
    pub fn duplicates(&self) -> IndexMap<&str, Vec<usize>> {
        let mut rows: IndexMap<&str, Vec<usize>> = IndexMap::new();

        for (index, date) in self.dates.iter().enumerate() {
            if !date.is_empty() {
                rows.entry(date.as_str()).or_default().push(index + 2);
            }
        }

        rows.retain(|_, rows| rows.len() > 1);
        rows
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Trait that needs to be implemented by a row store backing the destination worksheet. Row
/// numbers are 1-indexed, row 1 holds the header.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Reads the cells of the header row.
    async fn read_header(&self) -> Result<Vec<String>>;

    /// Overwrites the header row.
    async fn write_header(&self, header: &[&str]) -> Result<()>;

    /// Reads the whole date column, header cell included.
    async fn read_date_column(&self) -> Result<Vec<String>>;

    /// Overwrites the row with the given number.
    async fn update_row(&self, row: usize, values: &SheetRow) -> Result<()>;

    /// Appends a row after the last non-empty row.
    async fn append_row(&self, values: &SheetRow) -> Result<()>;
}

#[async_trait]
impl<T> RowStore for Box<T>
where
    T: RowStore + ?Sized,
{
    async fn read_header(&self) -> Result<Vec<String>> {
        (**self).read_header().await
    }

    async fn write_header(&self, header: &[&str]) -> Result<()> {
        (**self).write_header(header).await
    }

    async fn read_date_column(&self) -> Result<Vec<String>> {
        (**self).read_date_column().await
    }

    async fn update_row(&self, row: usize, values: &SheetRow) -> Result<()> {
        (**self).update_row(row, values).await
    }

    async fn append_row(&self, values: &SheetRow) -> Result<()> {
        (**self).append_row(values).await
    }
}

#[async_trait]
impl<T> RowStore for Arc<T>
where
    T: RowStore + ?Sized,
{
    async fn read_header(&self) -> Result<Vec<String>> {
        (**self).read_header().await
    }

    async fn write_header(&self, header: &[&str]) -> Result<()> {
        (**self).write_header(header).await
    }

    async fn read_date_column(&self) -> Result<Vec<String>> {
        (**self).read_date_column().await
    }

    async fn update_row(&self, row: usize, values: &SheetRow) -> Result<()> {
        (**self).update_row(row, values).await
    }

    async fn append_row(&self, values: &SheetRow) -> Result<()> {
        (**self).append_row(values).await
    }
}

/// A `RowStore` keeping the worksheet in memory, with a log of every successful write and of
/// every attempted one.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryRowStore {
    pub rows: tokio::sync::Mutex<Vec<Vec<Value>>>,
    pub writes: tokio::sync::Mutex<Vec<String>>,
    pub attempts: std::sync::atomic::AtomicUsize,
    /// 1-indexed write attempt that is rejected.
    fail_on: Option<usize>,
}

#[cfg(test)]
impl MemoryRowStore {
    pub fn with_rows(rows: Vec<Vec<Value>>) -> MemoryRowStore {
        MemoryRowStore {
            rows: tokio::sync::Mutex::new(rows),
            ..Default::default()
        }
    }

    /// Rejects the `attempt`-th write with a Sheets API error.
    pub fn failing_on(mut self, attempt: usize) -> MemoryRowStore {
        self.fail_on = Some(attempt);
        self
    }

    fn attempt(&self) -> Result<()> {
        let attempt = self
            .attempts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;

        if self.fail_on == Some(attempt) {
            return Err(google::SheetError::Api {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                message: format!("write {attempt} rejected"),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl RowStore for MemoryRowStore {
    async fn read_header(&self) -> Result<Vec<String>> {
        let rows = self.rows.lock().await;
        let header = rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_str().unwrap_or_default().to_owned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(header)
    }

    async fn write_header(&self, header: &[&str]) -> Result<()> {
        self.attempt()?;
        let header = header.iter().map(|cell| Value::from(*cell)).collect();
        let mut rows = self.rows.lock().await;
        match rows.first_mut() {
            Some(row) => *row = header,
            None => rows.push(header),
        }
        self.writes.lock().await.push("header".into());
        Ok(())
    }

    async fn read_date_column(&self) -> Result<Vec<String>> {
        let rows = self.rows.lock().await;
        let column = rows
            .iter()
            .map(|row| {
                row.first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned()
            })
            .collect();
        Ok(column)
    }

    async fn update_row(&self, row: usize, values: &SheetRow) -> Result<()> {
        self.attempt()?;
        let mut rows = self.rows.lock().await;
        if rows.len() < row {
            rows.resize(row, Vec::new());
        }
        rows[row - 1] = values.cells().to_vec();
        self.writes.lock().await.push(format!("update {row}"));
        Ok(())
    }

    async fn append_row(&self, values: &SheetRow) -> Result<()> {
        self.attempt()?;
        self.rows.lock().await.push(values.cells().to_vec());
        self.writes.lock().await.push("append".into());
        Ok(())
    }
}
