pub mod models;

use super::cookies;
use crate::ProviderConfig;
use chrono::NaiveDate;
use reqwest::cookie::Jar;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("unexpected response status {status} from {url}")]
    Status { status: StatusCode, url: String },

    /// Error while parsing a JSON response.
    #[error("failed to parse response as JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A configured URL could not be parsed.
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// Neither cookies nor a username and password were configured.
    #[error("no session cookies or login credentials configured")]
    MissingCredentials,
}

/// MyFitnessPal client that reads daily nutrition totals with an authenticated session.
#[derive(Debug)]
pub struct MyFitnessPalClient {
    client: reqwest::Client,
    report_url: String,
}

impl MyFitnessPalClient {
    /// Creates a new client. The session is taken from the cookie blob in the configuration if
    /// present, otherwise the client logs in with the configured username and password and keeps
    /// the session cookies the login response sets.
    pub async fn new(config: &ProviderConfig) -> Result<MyFitnessPalClient, ProviderError> {
        let jar = Arc::new(Jar::default());

        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(format!("nutrisync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        let cookies = config
            .cookies
            .as_deref()
            .map(cookies::parse)
            .unwrap_or_default();

        if !cookies.is_empty() {
            let url = parse_url(&config.report_url)?;
            cookies::add_to_jar(&jar, &cookies, &config.cookie_domain, &url);
            log::debug!("using {} session cookies", cookies.len());
        } else if let (Some(username), Some(password)) = (&config.username, &config.password) {
            login(&client, &config.login_url, username, password).await?;
        } else {
            return Err(ProviderError::MissingCredentials);
        }

        Ok(MyFitnessPalClient {
            client,
            report_url: config.report_url.clone(),
        })
    }

    /// Fetches the daily totals for `date`. A day without diary entries yields totals where
    /// every field is `None`.
    pub async fn get_totals(&self, date: NaiveDate) -> Result<models::Totals, ProviderError> {
        let url = report_url(&self.report_url, date);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status { status, url });
        }

        let body = response.text().await?;
        let report: models::Report = serde_json::from_str(&body)?;

        log::debug!("fetched nutrition report for {date}");

        Ok(report.totals.unwrap_or_default())
    }
}

async fn login(
    client: &reqwest::Client,
    login_url: &str,
    username: &str,
    password: &str,
) -> Result<(), ProviderError> {
    log::info!("logging in to {login_url}");

    let response = client
        .post(login_url)
        .form(&[("username", username), ("password", password)])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            status,
            url: login_url.to_owned(),
        });
    }

    Ok(())
}

fn parse_url(url: &str) -> Result<Url, ProviderError> {
    url.parse().map_err(|source| ProviderError::InvalidUrl {
        url: url.to_owned(),
        source,
    })
}

/// Fills the ISO date into the `{date}` placeholder of the report URL template.
fn report_url(template: &str, date: NaiveDate) -> String {
    template.replace("{date}", &date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{Amount, NutritionRecord};

    #[test]
    fn report_url_contains_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert_eq!(
            report_url("https://mfp.test/report/{date}?format=json", date),
            "https://mfp.test/report/2024-06-01?format=json"
        );
    }

    #[test]
    fn totals_from_report() {
        let report: models::Report = serde_json::from_str(
            r#"{
                "date": "2024-06-01",
                "totals": {
                    "calories": 2000,
                    "carbohydrates": 250,
                    "fat": 70.5,
                    "protein": "120",
                    "sodium": null,
                    "fiber": 30
                }
            }"#,
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let record = NutritionRecord::from((date, report.totals.unwrap()));

        assert_eq!(record.calories, Some(Amount::from(2000_i64)));
        assert_eq!(record.carbs, Some(Amount::from(250_i64)));
        assert_eq!(record.fat.unwrap().to_string(), "70.5");
        assert_eq!(record.protein, Some(Amount::from("120")));
        assert_eq!(record.sodium, None);
        assert_eq!(record.sugar, None);
    }

    #[test]
    fn report_without_totals_is_empty() {
        let report: models::Report = serde_json::from_str(r#"{"date": "2024-06-01"}"#).unwrap();
        assert_eq!(report.totals.unwrap_or_default(), models::Totals::default());

        let report: models::Report = serde_json::from_str(r#"{"totals": null}"#).unwrap();
        assert_eq!(report.totals.unwrap_or_default(), models::Totals::default());
    }

    #[test]
    fn malformed_totals_are_rejected() {
        let result = serde_json::from_str::<models::Report>(r#"{"totals": {"calories": true}}"#);
        assert!(result.is_err());

        let result = serde_json::from_str::<models::Report>(r#"{"totals": "none"}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn new_without_credentials_fails() {
        let config: ProviderConfig = serde_json::from_str(r#"{"kind": "myfitnesspal"}"#).unwrap();

        assert!(matches!(
            MyFitnessPalClient::new(&config).await,
            Err(ProviderError::MissingCredentials)
        ));
    }
}
