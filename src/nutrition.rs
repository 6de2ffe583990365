pub mod cookies;
pub mod mfp;

use super::Result;
use crate::ProviderConfig;
use async_trait::async_trait;
use chrono::NaiveDate;
use mfp::MyFitnessPalClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A single nutrient amount as reported by the upstream service.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Amount {
    /// A numeric amount. The original representation is kept, so `2000` does not turn into
    /// `2000.0`.
    Number(serde_json::Number),
    /// A textual amount, e.g. when the provider reports a formatted value.
    Text(String),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Amount::Number(number) => write!(f, "{number}"),
            Amount::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount::Number(value.into())
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Amount::Text(value.to_owned())
    }
}

/// Daily nutrition totals for one date. Fields the provider did not report are `None`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NutritionRecord {
    /// The calendar date the totals belong to.
    pub date: NaiveDate,
    #[serde(default)]
    pub calories: Option<Amount>,
    #[serde(default)]
    pub carbs: Option<Amount>,
    #[serde(default)]
    pub fat: Option<Amount>,
    #[serde(default)]
    pub protein: Option<Amount>,
    #[serde(default)]
    pub sodium: Option<Amount>,
    #[serde(default)]
    pub sugar: Option<Amount>,
}

impl NutritionRecord {
    /// Creates a record for `date` with every field absent.
    pub fn empty(date: NaiveDate) -> NutritionRecord {
        NutritionRecord {
            date,
            calories: None,
            carbs: None,
            fat: None,
            protein: None,
            sodium: None,
            sugar: None,
        }
    }

    /// Returns the six nutrient fields in sheet column order.
    pub fn fields(&self) -> [Option<&Amount>; 6] {
        [
            self.calories.as_ref(),
            self.carbs.as_ref(),
            self.fat.as_ref(),
            self.protein.as_ref(),
            self.sodium.as_ref(),
            self.sugar.as_ref(),
        ]
    }

    /// Returns `true` if the provider reported none of the fields.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(Option::is_none)
    }
}

/// Represents sources of nutrition records.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum NutritionSourceKind {
    /// Use static records from the application configuration.
    Static,
    /// Load records from MyFitnessPal.
    #[serde(rename = "myfitnesspal")]
    MyFitnessPal,
}

/// Trait that needs to be implemented by a source of nutrition records.
#[async_trait]
pub trait NutritionSource: Send + Sync {
    /// Fetches the totals for `date`. A date without logged data yields an empty record, not an
    /// error.
    async fn fetch(&self, date: NaiveDate) -> Result<NutritionRecord>;
}

/// A `NutritionSource` that returns records from a static list.
pub struct StaticNutritionSource {
    records: Vec<NutritionRecord>,
}

impl StaticNutritionSource {
    /// Creates a new `StaticNutritionSource` from an iterator.
    pub fn new<I>(iter: I) -> StaticNutritionSource
    where
        I: IntoIterator,
        I::Item: Into<NutritionRecord>,
    {
        StaticNutritionSource {
            records: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl NutritionSource for StaticNutritionSource {
    async fn fetch(&self, date: NaiveDate) -> Result<NutritionRecord> {
        let record = self
            .records
            .iter()
            .find(|record| record.date == date)
            .cloned()
            .unwrap_or_else(|| NutritionRecord::empty(date));

        Ok(record)
    }
}

/// A `NutritionSource` backed by the MyFitnessPal daily report.
#[derive(Debug)]
pub struct MyFitnessPalSource {
    client: MyFitnessPalClient,
}

impl MyFitnessPalSource {
    pub async fn new(config: &ProviderConfig) -> Result<MyFitnessPalSource> {
        Ok(MyFitnessPalSource {
            client: MyFitnessPalClient::new(config).await?,
        })
    }
}

impl From<(NaiveDate, mfp::models::Totals)> for NutritionRecord {
    fn from((date, totals): (NaiveDate, mfp::models::Totals)) -> Self {
        Self {
            date,
            calories: totals.calories,
            carbs: totals.carbohydrates,
            fat: totals.fat,
            protein: totals.protein,
            sodium: totals.sodium,
            sugar: totals.sugar,
        }
    }
}

#[async_trait]
impl NutritionSource for MyFitnessPalSource {
    async fn fetch(&self, date: NaiveDate) -> Result<NutritionRecord> {
        let totals = self.client.get_totals(date).await?;
        Ok((date, totals).into())
    }
}

#[async_trait]
impl<T> NutritionSource for Box<T>
where
    T: NutritionSource + ?Sized,
{
    async fn fetch(&self, date: NaiveDate) -> Result<NutritionRecord> {
        (**self).fetch(date).await
    }
}

#[async_trait]
impl<T> NutritionSource for Arc<T>
where
    T: NutritionSource + ?Sized,
{
    async fn fetch(&self, date: NaiveDate) -> Result<NutritionRecord> {
        (**self).fetch(date).await
    }
}

/// Creates the nutrition source selected in the configuration.
pub async fn from_config(config: &ProviderConfig) -> Result<Box<dyn NutritionSource>> {
    let source: Box<dyn NutritionSource> = match config.kind {
        NutritionSourceKind::Static => Box::new(StaticNutritionSource::new(config.records.clone())),
        NutritionSourceKind::MyFitnessPal => Box::new(MyFitnessPalSource::new(config).await?),
    };

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_matching_record() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let record = NutritionRecord {
            calories: Some(2000_i64.into()),
            ..NutritionRecord::empty(date)
        };
        let source = StaticNutritionSource::new([record.clone()]);

        assert_eq!(source.fetch(date).await.unwrap(), record);
    }

    #[tokio::test]
    async fn static_source_returns_empty_record_for_unknown_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let source = StaticNutritionSource::new(Vec::<NutritionRecord>::new());

        let record = source.fetch(date).await.unwrap();

        assert_eq!(record, NutritionRecord::empty(date));
        assert!(record.is_empty());
    }

    #[test]
    fn record_from_config_keeps_absent_fields() {
        let record: NutritionRecord = serde_json::from_str(
            r#"{"date": "2024-06-01", "calories": 2000, "fat": "70", "sodium": null}"#,
        )
        .unwrap();

        assert_eq!(record.calories, Some(Amount::from(2000_i64)));
        assert_eq!(record.fat, Some(Amount::from("70")));
        assert_eq!(record.sodium, None);
        assert_eq!(record.carbs, None);
        assert!(!record.is_empty());
    }

    #[test]
    fn amount_display_keeps_number_representation() {
        let amount: Amount = serde_json::from_str("2000").unwrap();
        assert_eq!(amount.to_string(), "2000");

        let amount: Amount = serde_json::from_str("12.5").unwrap();
        assert_eq!(amount.to_string(), "12.5");
    }
}
