use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

pub mod nutrition;
pub mod reconcile;
pub mod sheet;
pub mod sync;

pub use nutrition::mfp::ProviderError;
pub use sheet::google::SheetError;

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations within this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("missing required configuration value `{0}`")]
    MissingConfig(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("nutrition provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("spreadsheet error: {0}")]
    Sheet(#[from] SheetError),
    #[error("sync task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Sync window configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SyncConfig {
    /// Number of days to sync, ending with today. The default of 2 covers yesterday and today.
    #[serde(default = "default_days")]
    pub days: u32,
    /// Time zone used to determine "today". Falls back to the local time zone of the process.
    pub timezone: Option<chrono_tz::Tz>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            days: default_days(),
            timezone: None,
        }
    }
}

fn default_days() -> u32 {
    2
}

/// Nutrition provider configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProviderConfig {
    /// Source for nutrition records.
    pub kind: nutrition::NutritionSourceKind,
    /// URL of the daily report. `{date}` is replaced by the ISO date.
    #[serde(default = "default_report_url")]
    pub report_url: String,
    /// Form login endpoint, used when authenticating with username and password.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Domain that session cookies are scoped to.
    #[serde(default = "default_cookie_domain")]
    pub cookie_domain: String,
    /// Raw cookie blob, one `name=value` pair per line.
    pub cookies: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Records served by the static provider.
    #[serde(default)]
    pub records: Vec<nutrition::NutritionRecord>,
}

fn default_report_url() -> String {
    "https://www.myfitnesspal.com/api/services/diary/report/{date}".into()
}

fn default_login_url() -> String {
    "https://www.myfitnesspal.com/account/login".into()
}

fn default_cookie_domain() -> String {
    ".myfitnesspal.com".into()
}

/// Destination spreadsheet configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SheetConfig {
    /// The spreadsheet identifier as it appears in the sheet URL.
    pub spreadsheet_id: Option<String>,
    /// Name of the worksheet (tab) rows are written to.
    pub worksheet: Option<String>,
}

/// Global application configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AppConfig {
    /// Sync window section.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Nutrition provider section.
    pub provider: ProviderConfig,
    /// Spreadsheet section.
    pub sheet: SheetConfig,
}

impl AppConfig {
    /// Loads the application configuration from files in the `config/` directory and environment
    /// variables.
    pub fn load() -> Result<AppConfig> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        log::info!("loading configuration using {} environment", app_env);

        let config: AppConfig = Config::builder()
            // Configuration defaults from `config/default.toml`.
            .add_source(File::with_name("config/default").required(false))
            // Optional environment specific config overrides, e.g. `config/production.toml`.
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            // Optional local config overrides from `config/local.toml` (on .gitignore).
            .add_source(File::with_name("config/local").required(false))
            // Config from environment variables.
            .add_source(Environment::default().separator("__"))
            // Config from environment variables prefixed with `NUTRISYNC_`.
            .add_source(
                Environment::with_prefix("NUTRISYNC")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        // Don't use `{:?}` here, the provider section carries secrets.
        log::debug!(
            "loaded configuration: provider={:?}, days={}, worksheet={:?}",
            config.provider.kind,
            config.sync.days,
            config.sheet.worksheet
        );

        Ok(config)
    }

    /// Checks that every value required for a run is present.
    pub fn validate(&self) -> Result<()> {
        if self.sync.days == 0 {
            return Err(Error::InvalidConfig("`sync.days` must be at least 1".into()));
        }

        require(&self.sheet.spreadsheet_id, "sheet.spreadsheet_id")?;
        require(&self.sheet.worksheet, "sheet.worksheet")?;

        if let nutrition::NutritionSourceKind::MyFitnessPal = self.provider.kind {
            if !self.provider.report_url.contains("{date}") {
                return Err(Error::InvalidConfig(
                    "`provider.report_url` must contain a `{date}` placeholder".into(),
                ));
            }

            let has_cookies = self
                .provider
                .cookies
                .as_deref()
                .is_some_and(|cookies| !cookies.trim().is_empty());
            let has_login = self.provider.username.is_some() && self.provider.password.is_some();

            if !has_cookies && !has_login {
                return Err(Error::MissingConfig(
                    "provider.cookies or provider.username and provider.password",
                ));
            }
        }

        if env::var_os("GOOGLE_APPLICATION_CREDENTIALS").is_none()
            && env::var_os("GOOGLE_APPLICATION_CREDENTIALS_JSON").is_none()
        {
            return Err(Error::MissingConfig(
                "GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_APPLICATION_CREDENTIALS_JSON",
            ));
        }

        Ok(())
    }
}

fn require(value: &Option<String>, key: &'static str) -> Result<()> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(Error::MissingConfig(key)),
    }
}
