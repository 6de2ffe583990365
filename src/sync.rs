use super::Result;
use crate::nutrition::{self, NutritionSource};
use crate::reconcile::{self, Action};
use crate::sheet::google::GoogleSheetsClient;
use crate::sheet::{DateColumn, RowStore, HEADER};
use crate::{AppConfig, Error};
use chrono::{Days, Local, NaiveDate, Utc};
use indexmap::IndexSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// The dates a sync covers.
#[derive(Debug, Clone)]
pub enum DateWindow {
    /// The last `days` days up to and including today, oldest first.
    Trailing {
        days: u32,
        timezone: Option<chrono_tz::Tz>,
    },
    /// An explicit list of dates, synced in the given order. Repeated dates are synced once.
    Fixed(Vec<NaiveDate>),
}

impl DateWindow {
    /// Resolves the window to distinct dates. "Today" is determined once per call.
    pub fn dates(&self) -> Vec<NaiveDate> {
        match self {
            DateWindow::Trailing { days, timezone } => trailing_dates(today(*timezone), *days),
            // The column snapshot is not refreshed within a run, a repeated absent date would
            // be appended twice.
            DateWindow::Fixed(dates) => dates
                .iter()
                .copied()
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect(),
        }
    }
}

fn today(timezone: Option<chrono_tz::Tz>) -> NaiveDate {
    match timezone {
        Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
        None => Local::now().date_naive(),
    }
}

fn trailing_dates(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..u64::from(days))
        .rev()
        .filter_map(|n| today.checked_sub_days(Days::new(n)))
        .collect()
}

/// Options for a sync.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub window: DateWindow,
    /// Plan and log actions without writing to the sheet.
    pub dry_run: bool,
}

/// Summary of a single sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub appended: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} rows updated, {} rows appended",
            self.updated, self.appended
        )
    }
}

/// Syncs daily nutrition totals from a source into a row store.
#[derive(Clone)]
pub struct NutritionSync {
    source: Arc<dyn NutritionSource>,
    store: Arc<dyn RowStore>,
    options: SyncOptions,
}

impl NutritionSync {
    /// Creates a new `NutritionSync` from a source and a row store.
    pub fn new<S, R>(source: S, store: R, options: SyncOptions) -> NutritionSync
    where
        S: NutritionSource + 'static,
        R: RowStore + 'static,
    {
        NutritionSync {
            source: Arc::new(source),
            store: Arc::new(store),
            options,
        }
    }

    /// Creates a new `NutritionSync` from configuration. The configuration is expected to be
    /// validated.
    pub async fn from_config(config: &AppConfig, options: SyncOptions) -> Result<NutritionSync> {
        let spreadsheet_id = config
            .sheet
            .spreadsheet_id
            .clone()
            .ok_or(Error::MissingConfig("sheet.spreadsheet_id"))?;
        let worksheet = config
            .sheet
            .worksheet
            .clone()
            .ok_or(Error::MissingConfig("sheet.worksheet"))?;

        let source = nutrition::from_config(&config.provider).await?;
        let store = GoogleSheetsClient::new(spreadsheet_id, worksheet).await?;

        Ok(NutritionSync::new(source, store, options))
    }

    /// Synchronize the dates of the window into the row store once.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let dates = self.options.window.dates();

        log::info!(
            "synchronizing nutrition totals for {}",
            dates
                .iter()
                .map(NaiveDate::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.ensure_header().await?;

        let column = DateColumn::from_sheet_column(self.store.read_date_column().await?);
        for (date, rows) in column.duplicates() {
            log::warn!("date {date} occurs in rows {rows:?}, only row {} is updated", rows[0]);
        }

        let actions = reconcile::reconcile(&dates, &*self.source, &column).await?;

        if self.options.dry_run {
            for action in &actions {
                log::info!("dry run, skipping {action}");
            }
        } else {
            reconcile::apply(&actions, &*self.store).await?;
        }

        Ok(report(&actions))
    }

    /// Rewrites the header row if it differs from `HEADER`. In dry-run mode the mismatch is only
    /// logged.
    async fn ensure_header(&self) -> Result<()> {
        let header = self.store.read_header().await?;

        if header.iter().map(String::as_str).eq(HEADER) {
            return Ok(());
        }

        if self.options.dry_run {
            log::info!("dry run, skipping header rewrite of {header:?}");
            return Ok(());
        }

        log::warn!("rewriting header row {header:?}");
        self.store.write_header(&HEADER).await
    }

    /// Starts to periodically sync every `interval` until a message is received via `stop`.
    async fn start_sync(&self, period: Duration, mut stop: Receiver<()>) {
        log::info!("synchronizing nutrition totals every {:?}", period);
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sync_once().await {
                        Ok(report) => log::info!("sync finished: {report}"),
                        Err(err) => log::error!("failed to sync nutrition totals: {err}"),
                    }
                }
                _ = &mut stop => {
                    log::info!("stopping nutrition sync");
                    return;
                }
            }
        }
    }

    /// Starts a background task to sync periodically. Returns a `SyncTaskHandle` to stop the
    /// sync.
    pub async fn spawn_sync_task(&self, period: Duration) -> SyncTaskHandle {
        let sync = self.clone();
        let (stop_tx, stop_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            sync.start_sync(period, stop_rx).await;
        });

        SyncTaskHandle {
            join_handle,
            stop_tx,
        }
    }
}

fn report(actions: &[Action]) -> SyncReport {
    actions
        .iter()
        .fold(SyncReport::default(), |mut report, action| {
            match action {
                Action::Update(..) => report.updated += 1,
                Action::Append(_) => report.appended += 1,
            }
            report
        })
}

/// A handle for stopping a sync task.
pub struct SyncTaskHandle {
    join_handle: JoinHandle<()>,
    stop_tx: Sender<()>,
}

impl SyncTaskHandle {
    /// Stops the sync task. Blocks until the background task is finished.
    pub async fn stop(self) -> Result<()> {
        if self.stop_tx.send(()).is_ok() {
            self.join_handle.await?;
        }

        Ok(())
    }
}
