use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A range of values, used both as request body and response of the `values` endpoints.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    /// Trailing empty rows and cells are omitted by the API, and the field is missing entirely
    /// for an empty range.
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct UpdateValuesResponse {
    pub spreadsheet_id: String,
    pub updated_range: Option<String>,
    pub updated_rows: Option<u32>,
    pub updated_cells: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct AppendValuesResponse {
    pub spreadsheet_id: String,
    pub table_range: Option<String>,
    pub updates: UpdateValuesResponse,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
pub struct ErrorStatus {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
}
