use chrono::NaiveDate;
use clap::Parser;
use dotenv::dotenv;
use nutrisync::sync::{DateWindow, NutritionSync, SyncOptions};
use nutrisync::AppConfig;
use std::time::Duration;

/// Literal line printed on stdout after a successful one-shot sync.
const SUCCESS_MARKER: &str = "Sync complete";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sync exactly this date instead of the trailing window, can be repeated
    #[arg(long = "date", value_name = "YYYY-MM-DD")]
    dates: Vec<NaiveDate>,

    /// Number of days to sync, ending with today
    #[arg(long, value_name = "N")]
    days: Option<u32>,

    /// Fetch and plan, but do not write to the sheet
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Keep running and sync every given number of seconds
    #[arg(
        long,
        value_name = "SECONDS",
        env = "SYNC_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(days) = cli.days {
        config.sync.days = days;
    }
    config.validate()?;

    let window = if cli.dates.is_empty() {
        DateWindow::Trailing {
            days: config.sync.days,
            timezone: config.sync.timezone,
        }
    } else {
        DateWindow::Fixed(cli.dates.clone())
    };

    if cli.dry_run {
        log::info!("dry run is enabled; the sheet will not be modified");
    }

    let options = SyncOptions {
        window,
        dry_run: cli.dry_run,
    };
    let sync = NutritionSync::from_config(&config, options).await?;

    match cli.interval {
        None => {
            let report = sync.sync_once().await?;
            log::info!("sync finished: {report}");
            println!("{SUCCESS_MARKER}");
        }
        Some(seconds) => {
            let handle = sync.spawn_sync_task(Duration::from_secs(seconds)).await;
            tokio::signal::ctrl_c().await?;
            handle.stop().await?;
        }
    }

    Ok(())
}
