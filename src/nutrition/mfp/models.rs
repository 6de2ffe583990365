use crate::nutrition::Amount;
use serde::Deserialize;

/// The daily report returned by the diary endpoint. Only the totals are of interest, everything
/// else in the payload is ignored.
#[derive(Debug, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub totals: Option<Totals>,
}

/// Named daily totals. Keys missing from the payload, or set to `null`, stay `None`.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Totals {
    #[serde(default)]
    pub calories: Option<Amount>,
    #[serde(default)]
    pub carbohydrates: Option<Amount>,
    #[serde(default)]
    pub fat: Option<Amount>,
    #[serde(default)]
    pub protein: Option<Amount>,
    #[serde(default)]
    pub sodium: Option<Amount>,
    #[serde(default)]
    pub sugar: Option<Amount>,
}
