use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A product page the user asked to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

impl TrackedItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            name: None,
            added_at: OffsetDateTime::now_utc(),
        }
    }

    /// Label used in notifications and listings.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("article #{}", self.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Checking,
    Available,
    Unavailable,
    Error,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Checking => "checking",
            CheckStatus::Available => "available",
            CheckStatus::Unavailable => "unavailable",
            CheckStatus::Error => "error",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent check of a tracked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(default)]
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_stock_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_stock_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price_changed: bool,
    #[serde(default)]
    pub b_stock_price_changed: bool,
}

impl CheckResult {
    pub fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
            price: None,
            b_stock_price: None,
            b_stock_url: None,
            image_url: None,
            price_changed: false,
            b_stock_price_changed: false,
        }
    }

    /// Placeholder written while a poll is in flight. Previously observed
    /// metadata is carried over so a crash mid-poll loses nothing.
    pub fn checking(previous: Option<&CheckResult>, message: impl Into<String>) -> Self {
        let mut result = Self::new(CheckStatus::Checking, message);
        if let Some(previous) = previous {
            result.price = previous.price.clone();
            result.b_stock_price = previous.b_stock_price.clone();
            result.b_stock_url = previous.b_stock_url.clone();
            result.image_url = previous.image_url.clone();
        }
        result
    }

    pub fn is_available(&self) -> bool {
        self.status == CheckStatus::Available
    }

    /// Equality ignoring the timestamp.
    pub fn same_outcome(&self, other: &CheckResult) -> bool {
        Self {
            timestamp: other.timestamp,
            ..self.clone()
        } == *other
    }
}

pub type ResultMap = HashMap<String, CheckResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
    De,
}

impl Language {
    pub fn all() -> &'static [Language] {
        &[Language::En, Language::Fr, Language::De]
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::De => "de",
        }
    }

    /// Accepts `fr`, `FR`, `fr-CA`, `de_DE.UTF-8` and the like.
    pub fn from_str_loose(value: &str) -> Option<Self> {
        let base = value
            .trim()
            .split(|c| c == '-' || c == '_' || c == '.')
            .next()?
            .to_ascii_lowercase();
        match base.as_str() {
            "en" => Some(Language::En),
            "fr" => Some(Language::Fr),
            "de" => Some(Language::De),
            _ => None,
        }
    }

    /// Language of the host environment, `en` when unknown.
    pub fn from_env() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find_map(|value| Self::from_str_loose(&value))
            .unwrap_or_default()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub const DEFAULT_CHECK_INTERVAL_MINUTES: u32 = 30;
pub const MIN_CHECK_INTERVAL_MINUTES: u32 = 1;

/// User-adjustable settings persisted alongside the tracked items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_check_enabled: bool,
    #[serde(rename = "checkInterval")]
    pub check_interval_minutes: u32,
    pub notifications_enabled: bool,
    pub language: Language,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_check_enabled: false,
            check_interval_minutes: DEFAULT_CHECK_INTERVAL_MINUTES,
            notifications_enabled: true,
            language: Language::from_env(),
        }
    }
}

/// Everything the store persists, as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub items: Vec<TrackedItem>,
    pub results: ResultMap,
    pub settings: Settings,
}

/// On-disk envelope around a persisted value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry<T> {
    pub value: T,
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_result_uses_camel_case_keys() {
        let mut result = CheckResult::new(CheckStatus::Available, "Stock B is available");
        result.b_stock_price = Some("149.00".to_string());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "available");
        assert_eq!(value["bStockPrice"], "149.00");
        assert_eq!(value["bStockPriceChanged"], false);
        assert!(value.get("price").is_none());
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"autoCheckEnabled": true, "checkInterval": 5}"#).unwrap();
        assert!(settings.auto_check_enabled);
        assert_eq!(settings.check_interval_minutes, 5);
        assert!(settings.notifications_enabled);
    }

    #[test]
    fn language_parses_locale_strings() {
        assert_eq!(Language::from_str_loose("fr-CA"), Some(Language::Fr));
        assert_eq!(Language::from_str_loose("de_DE.UTF-8"), Some(Language::De));
        assert_eq!(Language::from_str_loose("C"), None);
    }

    #[test]
    fn checking_placeholder_keeps_known_metadata() {
        let mut previous = CheckResult::new(CheckStatus::Unavailable, "Stock B is not available");
        previous.price = Some("199.00".to_string());
        previous.image_url = Some("https://example.com/a.jpg".to_string());

        let placeholder = CheckResult::checking(Some(&previous), "Checking...");
        assert_eq!(placeholder.status, CheckStatus::Checking);
        assert_eq!(placeholder.price.as_deref(), Some("199.00"));
        assert_eq!(placeholder.image_url, previous.image_url);
    }
}
