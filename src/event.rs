//! Market event records as fetched from the event store.
//!
//! Rows arrive with loosely-typed numeric fields (numbers, numeric strings,
//! `null`, or garbage). Deserialization never fails on those fields; they
//! degrade to neutral values instead.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::view::Language;

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const DEFAULT_YES_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_ko: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_slug: Option<String>,
    #[serde(default)]
    pub end_date: String,
    #[serde(default, deserialize_with = "de_volume")]
    pub volume: f64,
    #[serde(default, deserialize_with = "de_volume")]
    pub volume_24hr: f64,
    #[serde(default, deserialize_with = "de_probs")]
    pub probs: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "de_bool")]
    pub closed: bool,
    #[serde(default, deserialize_with = "de_bool")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
}

impl MarketEvent {
    pub fn new(id: impl Into<String>, title: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            end_date: end_date.into(),
            ..Self::default()
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = coerce_volume(volume);
        self
    }

    pub fn with_yes_probability(mut self, probability: f64) -> Self {
        self.probs = vec![Some(probability), Some(1.0 - probability)];
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Primary "yes" probability, `0.5` when missing or unparsable.
    pub fn yes_probability(&self) -> f64 {
        self.probs
            .first()
            .copied()
            .flatten()
            .filter(|p| p.is_finite())
            .unwrap_or(DEFAULT_YES_PROBABILITY)
    }

    pub fn category_label(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => UNCATEGORIZED,
        }
    }

    /// Image URL used as a grouping key input; blank values count as absent.
    pub fn image_key(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn display_title(&self, language: Language) -> &str {
        match (language, self.title_ko.as_deref()) {
            (Language::Ko, Some(translated)) if !translated.trim().is_empty() => translated,
            _ => &self.title,
        }
    }

    /// Volume used for ranking on the calendar: the group total when present.
    pub fn display_volume(&self) -> f64 {
        self.aggregate_volume.unwrap_or(self.volume)
    }

    pub fn is_grouped(&self) -> bool {
        self.group_size.is_some_and(|size| size > 1)
    }

    /// Copy with aggregate fields removed.
    pub fn without_aggregates(&self) -> Self {
        Self {
            aggregate_volume: None,
            group_size: None,
            ..self.clone()
        }
    }
}

pub fn coerce_volume(raw: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}

pub fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn de_volume<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(coerce_f64)
        .map(coerce_volume)
        .unwrap_or(0.0))
}

fn de_probs<'de, D>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(probs_from_value).unwrap_or_default())
}

fn probs_from_value(value: Value) -> Vec<Option<f64>> {
    match value {
        Value::Array(entries) => entries.iter().map(coerce_f64).collect(),
        // Some rows carry the list as a stringified JSON array.
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(entries)) => entries.iter().map(coerce_f64).collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn de_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}

fn de_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(tag) if !tag.trim().is_empty() => Some(tag),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}
