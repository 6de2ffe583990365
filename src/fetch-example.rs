extern crate dotenv;

use dotenv::dotenv;
use std::error::Error;

use nutrisync::nutrition::{self, NutritionSource};
use nutrisync::sync::DateWindow;
use nutrisync::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv().ok();

    let config = AppConfig::load()?;
    let source = nutrition::from_config(&config.provider).await?;

    let window = DateWindow::Trailing {
        days: config.sync.days,
        timezone: config.sync.timezone,
    };

    for date in window.dates() {
        let record = source.fetch(date).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    Ok(())
}
