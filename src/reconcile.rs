//! Decides, per date, whether fetched totals overwrite an existing worksheet row or become a new
//! one.
//!
//! Presence is checked against a single snapshot of the date column taken before the batch.
//! Appending a date does not add it to the snapshot, so every absent date in a batch is appended
//! exactly once. Actions are applied in order as independent writes; a failure leaves the
//! earlier writes in place.

use super::Result;
use crate::nutrition::NutritionSource;
use crate::sheet::{date_key, DateColumn, RowStore, SheetRow};
use chrono::NaiveDate;
use std::fmt;

/// A single write against the row store.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Overwrite the row with the given 1-indexed number.
    Update(usize, SheetRow),
    /// Append a new row.
    Append(SheetRow),
}

impl Action {
    /// The row the action writes.
    pub fn row(&self) -> &SheetRow {
        match self {
            Action::Update(_, row) | Action::Append(row) => row,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Update(row, values) => write!(f, "update row {} ({})", row, values.date()),
            Action::Append(values) => write!(f, "append row ({})", values.date()),
        }
    }
}

/// Fetches the record of every date in `dates`, in order, and plans one action per date against
/// the `column` snapshot.
pub async fn reconcile<S>(
    dates: &[NaiveDate],
    source: &S,
    column: &DateColumn,
) -> Result<Vec<Action>>
where
    S: NutritionSource + ?Sized,
{
    let mut actions = Vec::with_capacity(dates.len());

    for date in dates {
        let record = source.fetch(*date).await?;
        if record.is_empty() {
            log::info!("no nutrition data logged for {date}");
        }

        let row = SheetRow::from(&record);
        let action = match column.row_of(&date_key(*date)) {
            Some(index) => Action::Update(index, row),
            None => Action::Append(row),
        };

        actions.push(action);
    }

    Ok(actions)
}

/// Applies `actions` to `store` in order.
pub async fn apply<R>(actions: &[Action], store: &R) -> Result<()>
where
    R: RowStore + ?Sized,
{
    for action in actions {
        log::info!("{action}");

        match action {
            Action::Update(index, row) => store.update_row(*index, row).await?,
            Action::Append(row) => store.append_row(row).await?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{NutritionRecord, StaticNutritionSource};
    use crate::sheet::MemoryRowStore;
    use crate::ProviderError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;

    macro_rules! date {
        ($y:expr, $m:expr, $d:expr) => {
            NaiveDate::from_ymd_opt($y, $m, $d).unwrap()
        };
    }

    fn cells(row: Value) -> Vec<Value> {
        row.as_array().cloned().unwrap_or_default()
    }

    fn totals(date: NaiveDate) -> NutritionRecord {
        NutritionRecord {
            date,
            calories: Some(2000_i64.into()),
            carbs: Some(250_i64.into()),
            fat: Some(70_i64.into()),
            protein: Some(120_i64.into()),
            sodium: Some(2300_i64.into()),
            sugar: Some(40_i64.into()),
        }
    }

    #[tokio::test]
    async fn update_targets_matching_row() {
        let source = StaticNutritionSource::new([totals(date!(2024, 1, 2))]);
        let column = DateColumn::new(["2024-01-01", "2024-01-02", "2024-01-03"]);

        let actions = reconcile(&[date!(2024, 1, 2)], &source, &column)
            .await
            .unwrap();

        assert_eq!(
            actions,
            vec![Action::Update(3, SheetRow::from(&totals(date!(2024, 1, 2))))]
        );
    }

    #[tokio::test]
    async fn absent_dates_are_all_appended() {
        let source = StaticNutritionSource::new([
            totals(date!(2024, 6, 1)),
            totals(date!(2024, 6, 2)),
        ]);

        let actions = reconcile(
            &[date!(2024, 6, 1), date!(2024, 6, 2)],
            &source,
            &DateColumn::default(),
        )
        .await
        .unwrap();

        let rows: Vec<_> = actions
            .iter()
            .map(|action| action.row().cells().to_vec())
            .collect();

        assert!(matches!(actions[..], [Action::Append(_), Action::Append(_)]));
        assert_eq!(
            rows,
            vec![
                cells(json!(["2024-06-01", 2000, 250, 70, 120, 2300, 40])),
                cells(json!(["2024-06-02", 2000, 250, 70, 120, 2300, 40])),
            ]
        );
    }

    #[tokio::test]
    async fn mixed_batch_keeps_date_order() {
        let source = StaticNutritionSource::new(Vec::<NutritionRecord>::new());
        let column = DateColumn::new(["2024-06-02"]);

        let actions = reconcile(&[date!(2024, 6, 1), date!(2024, 6, 2)], &source, &column)
            .await
            .unwrap();

        assert_eq!(
            actions,
            vec![
                Action::Append(SheetRow::from(&NutritionRecord::empty(date!(2024, 6, 1)))),
                Action::Update(2, SheetRow::from(&NutritionRecord::empty(date!(2024, 6, 2)))),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_dates_update_first_row() {
        let source = StaticNutritionSource::new([totals(date!(2024, 1, 1))]);
        let column = DateColumn::new(["2024-01-01", "2024-01-02", "2024-01-01"]);

        let actions = reconcile(&[date!(2024, 1, 1)], &source, &column)
            .await
            .unwrap();

        assert!(matches!(actions[..], [Action::Update(2, _)]));
    }

    #[tokio::test]
    async fn provider_errors_abort_the_batch() {
        struct Failing;

        #[async_trait]
        impl NutritionSource for Failing {
            async fn fetch(&self, _date: NaiveDate) -> Result<NutritionRecord> {
                Err(ProviderError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    url: "https://mfp.test/report".into(),
                }
                .into())
            }
        }

        let result = reconcile(&[date!(2024, 1, 1)], &Failing, &DateColumn::default()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn apply_writes_in_order() {
        let store = MemoryRowStore::with_rows(vec![
            cells(json!(["Date"])),
            cells(json!(["2024-06-02", 1])),
        ]);

        let actions = vec![
            Action::Append(SheetRow::from(&totals(date!(2024, 6, 1)))),
            Action::Update(2, SheetRow::from(&totals(date!(2024, 6, 2)))),
        ];

        apply(&actions, &store).await.unwrap();

        assert_eq!(*store.writes.lock().await, vec!["append", "update 2"]);

        let rows = store.rows.lock().await;
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[1],
            cells(json!(["2024-06-02", 2000, 250, 70, 120, 2300, 40]))
        );
        assert_eq!(rows[2][0], json!("2024-06-01"));
    }

    #[tokio::test]
    async fn failed_write_stops_the_batch() {
        let store = MemoryRowStore::with_rows(vec![
            cells(json!(["Date"])),
            cells(json!(["2024-06-02", 1])),
        ])
        .failing_on(2);

        let actions = vec![
            Action::Append(SheetRow::from(&totals(date!(2024, 6, 1)))),
            Action::Update(2, SheetRow::from(&totals(date!(2024, 6, 2)))),
            Action::Append(SheetRow::from(&totals(date!(2024, 6, 3)))),
        ];

        let result = apply(&actions, &store).await;

        assert!(matches!(result, Err(crate::Error::Sheet(_))));
        assert_eq!(*store.writes.lock().await, vec!["append"]);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);

        let rows = store.rows.lock().await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], cells(json!(["2024-06-02", 1])));
        assert_eq!(rows[2][0], json!("2024-06-01"));
    }
}
