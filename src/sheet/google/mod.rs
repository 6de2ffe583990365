pub mod models;

use super::{RowStore, SheetRow};
use async_trait::async_trait;
use google_cloud_auth::token::DefaultTokenSourceProvider;
use google_cloud_token::{TokenSource, TokenSourceProvider};
use http::Extensions;
use indexmap::IndexMap;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    /// Error while authenticating with google.
    #[error("failed to authenticate: {0}")]
    GCloudAuth(#[from] google_cloud_auth::error::Error),

    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// Error while executing some middleware code.
    #[error("request middleware failed with: {0}")]
    RequestMiddleware(#[from] reqwest_middleware::Error),

    /// Error while building http headers.
    #[error("encountered invalid HTTP header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// The Sheets API rejected a request.
    #[error("sheets API responded with {status}: {message}")]
    Api { status: StatusCode, message: String },

    /// A range could not be turned into a request URL.
    #[error("invalid range `{0}`")]
    InvalidRange(String),

    /// Error while obtaining an authentication token.
    #[error("failed to obtain authentication token: {0}")]
    Token(String),
}

impl From<SheetError> for reqwest_middleware::Error {
    fn from(err: SheetError) -> Self {
        reqwest_middleware::Error::Middleware(anyhow::Error::new(err))
    }
}

struct AuthMiddleware {
    token_source: Arc<dyn TokenSource>,
}

impl AuthMiddleware {
    fn new(token_source: Arc<dyn TokenSource>) -> AuthMiddleware {
        AuthMiddleware { token_source }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self
            .token_source
            .token()
            .await
            .map_err(|err| SheetError::Token(err.to_string()))?;

        let mut header = HeaderValue::try_from(token).map_err(SheetError::from)?;
        header.set_sensitive(true);
        req.headers_mut().insert(AUTHORIZATION, header);
        next.run(req, extensions).await
    }
}

/// The kind of `values` request, which decides the query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValuesRequest {
    Get,
    Update,
    Append,
}

/// Google Sheets client reading and writing the cells of a single worksheet.
#[derive(Debug)]
pub struct GoogleSheetsClient {
    client: ClientWithMiddleware,
    spreadsheet_id: String,
    worksheet: String,
}

impl GoogleSheetsClient {
    /// Create a new google sheets client. It will fetch the service account credentials from the
    /// environment either via the GOOGLE_APPLICATION_CREDENTIALS variable pointing to the json
    /// key file generated in the google cloud console or via the
    /// GOOGLE_APPLICATION_CREDENTIALS_JSON variable containing the content of said json file.
    /// The service account needs edit access to the spreadsheet.
    pub async fn new(
        spreadsheet_id: String,
        worksheet: String,
    ) -> Result<GoogleSheetsClient, SheetError> {
        let scopes = ["https://www.googleapis.com/auth/spreadsheets"];
        let config = google_cloud_auth::project::Config::default().with_scopes(&scopes);

        let token_source = DefaultTokenSourceProvider::new(config)
            .await?
            .token_source();

        let client = ClientBuilder::new(
            reqwest::Client::builder()
                .user_agent(format!("nutrisync/{}", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(10))
                .build()?,
        )
        .with(AuthMiddleware::new(token_source))
        .build();

        Ok(GoogleSheetsClient {
            client,
            spreadsheet_id,
            worksheet,
        })
    }

    /// Reads the values of `cells` (A1 notation without sheet name) row by row.
    pub async fn get_values(&self, cells: &str) -> Result<Vec<Vec<Value>>, SheetError> {
        let range = a1_range(&self.worksheet, cells);
        let url = self.values_url(&range, None)?;

        let response = self
            .client
            .get(url)
            .query(&build_query_parameters(ValuesRequest::Get))
            .send()
            .await?;

        let values = check_status(response)
            .await?
            .json::<models::ValueRange>()
            .await?;

        log::debug!("read {} rows from {}", values.values.len(), range);

        Ok(values.values)
    }

    /// Overwrites the cells of `cells` (A1 notation without sheet name) with `values`.
    pub async fn update_values(
        &self,
        cells: &str,
        values: Vec<Vec<Value>>,
    ) -> Result<models::UpdateValuesResponse, SheetError> {
        let range = a1_range(&self.worksheet, cells);
        let url = self.values_url(&range, None)?;

        let body = models::ValueRange {
            range: Some(range.clone()),
            major_dimension: Some("ROWS".into()),
            values,
        };

        let response = self
            .client
            .put(url)
            .query(&build_query_parameters(ValuesRequest::Update))
            .json(&body)
            .send()
            .await?;

        let updated = check_status(response)
            .await?
            .json::<models::UpdateValuesResponse>()
            .await?;

        log::debug!("updated range {:?}", updated.updated_range);

        Ok(updated)
    }

    /// Appends `values` as new rows after the table found in `cells`.
    pub async fn append_values(
        &self,
        cells: &str,
        values: Vec<Vec<Value>>,
    ) -> Result<models::AppendValuesResponse, SheetError> {
        let range = a1_range(&self.worksheet, cells);
        let url = self.values_url(&range, Some("append"))?;

        let body = models::ValueRange {
            range: Some(range.clone()),
            major_dimension: Some("ROWS".into()),
            values,
        };

        let response = self
            .client
            .post(url)
            .query(&build_query_parameters(ValuesRequest::Append))
            .json(&body)
            .send()
            .await?;

        let appended = check_status(response)
            .await?
            .json::<models::AppendValuesResponse>()
            .await?;

        log::debug!("appended range {:?}", appended.updates.updated_range);

        Ok(appended)
    }

    fn values_url(&self, range: &str, method: Option<&str>) -> Result<Url, SheetError> {
        let last = match method {
            Some(method) => format!("{range}:{method}"),
            None => range.to_owned(),
        };

        let mut url = Url::parse(SHEETS_API).map_err(|_| SheetError::InvalidRange(range.into()))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::InvalidRange(range.into()))?
            .extend([self.spreadsheet_id.as_str(), "values", last.as_str()]);

        Ok(url)
    }
}

#[async_trait]
impl RowStore for GoogleSheetsClient {
    async fn read_header(&self) -> crate::Result<Vec<String>> {
        let rows = self.get_values("A1:G1").await?;

        let header = rows
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(cell_to_string)
            .collect();

        Ok(header)
    }

    async fn write_header(&self, header: &[&str]) -> crate::Result<()> {
        let row = header.iter().map(|cell| Value::from(*cell)).collect();
        self.update_values("A1:G1", vec![row]).await?;
        Ok(())
    }

    async fn read_date_column(&self) -> crate::Result<Vec<String>> {
        let rows = self.get_values("A:A").await?;

        let column = rows
            .into_iter()
            .map(|row| row.into_iter().next().map(cell_to_string).unwrap_or_default())
            .collect();

        Ok(column)
    }

    async fn update_row(&self, row: usize, values: &SheetRow) -> crate::Result<()> {
        self.update_values(&format!("A{row}:G{row}"), vec![values.cells().to_vec()])
            .await?;
        Ok(())
    }

    async fn append_row(&self, values: &SheetRow) -> crate::Result<()> {
        self.append_values("A:G", vec![values.cells().to_vec()])
            .await?;
        Ok(())
    }
}

/// Turns a non-success response into `SheetError::Api`, using the message of the error body if
/// there is one.
async fn check_status(response: Response) -> Result<Response, SheetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await?;
    let message = match serde_json::from_str::<models::ErrorResponse>(&body) {
        Ok(error) => error.error.message,
        Err(_) => body,
    };

    Err(SheetError::Api { status, message })
}

/// Builds an A1 range on `worksheet`. The sheet name is always quoted so names with spaces or
/// punctuation work.
fn a1_range(worksheet: &str, cells: &str) -> String {
    format!("'{}'!{}", worksheet.replace('\'', "''"), cells)
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn build_query_parameters(request: ValuesRequest) -> IndexMap<&'static str, String> {
    // see: https://developers.google.com/sheets/api/reference/rest/v4/spreadsheets.values
    let mut query_parameters: IndexMap<&'static str, String> = IndexMap::new();

    match request {
        ValuesRequest::Get => {
            query_parameters.insert("majorDimension", "ROWS".to_owned());
        }
        ValuesRequest::Update | ValuesRequest::Append => {
            // store values as given, otherwise dates would be parsed into serial numbers
            query_parameters.insert("valueInputOption", "RAW".to_owned());
        }
    }

    if request == ValuesRequest::Append {
        // never overwrite rows below the table
        query_parameters.insert("insertDataOption", "INSERT_ROWS".to_owned());
    }

    query_parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_query_parameters_for_get() {
        let query_parameters = build_query_parameters(ValuesRequest::Get);

        let expected_parameters = IndexMap::from([("majorDimension", "ROWS")]);

        assert_eq!(expected_parameters, query_parameters);
    }

    #[test]
    fn build_query_parameters_for_update() {
        let query_parameters = build_query_parameters(ValuesRequest::Update);

        let expected_parameters = IndexMap::from([("valueInputOption", "RAW")]);

        assert_eq!(expected_parameters, query_parameters);
    }

    #[test]
    fn build_query_parameters_for_append() {
        let query_parameters = build_query_parameters(ValuesRequest::Append);

        let expected_parameters = IndexMap::from([
            ("valueInputOption", "RAW"),
            ("insertDataOption", "INSERT_ROWS"),
        ]);

        assert_eq!(expected_parameters, query_parameters);
    }

    #[test]
    fn a1_range_quotes_sheet_name() {
        assert_eq!(a1_range("Nutrition", "A:A"), "'Nutrition'!A:A");
        assert_eq!(a1_range("Bob's log", "A2:G2"), "'Bob''s log'!A2:G2");
    }

    #[test]
    fn cells_to_strings() {
        assert_eq!(cell_to_string(json!("2024-01-01")), "2024-01-01");
        assert_eq!(cell_to_string(json!(45000)), "45000");
        assert_eq!(cell_to_string(Value::Null), "");
    }

    #[test]
    fn value_range_without_values() {
        let range: models::ValueRange =
            serde_json::from_str(r#"{"range": "'Nutrition'!A1:G1", "majorDimension": "ROWS"}"#)
                .unwrap();

        assert!(range.values.is_empty());
    }

    #[test]
    fn value_range_body() {
        let body = models::ValueRange {
            range: Some("'Nutrition'!A3:G3".into()),
            major_dimension: Some("ROWS".into()),
            values: vec![vec![json!("2024-01-02"), json!(2000), json!("")]],
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "range": "'Nutrition'!A3:G3",
                "majorDimension": "ROWS",
                "values": [["2024-01-02", 2000, ""]]
            })
        );
    }

    #[test]
    fn error_response_message() {
        let error: models::ErrorResponse = serde_json::from_str(
            r#"{"error": {"code": 400, "message": "Unable to parse range: 'Missing'!A:A", "status": "INVALID_ARGUMENT"}}"#,
        )
        .unwrap();

        assert_eq!(error.error.code, 400);
        assert_eq!(error.error.message, "Unable to parse range: 'Missing'!A:A");
    }
}
