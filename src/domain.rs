use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CatalogError;

/// Marker stored in `build_date` when the server value cannot be read as a date.
pub const INVALID_DATE: &str = "Invalid date";

pub const FALLBACK_COLOR: &str = "#501cbe";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiIdentifier(String);

impl ApiIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApiIdentifier {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let name = trimmed
            .strip_suffix("/.*")
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(trimmed);
        let is_valid = !name.is_empty()
            && !name.contains('/')
            && !name.chars().any(|ch| ch.is_whitespace() || ch.is_control());
        if !is_valid {
            return Err(CatalogError::InvalidApiIdentifier(value.to_string()));
        }
        Ok(Self(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biothing_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            biothing_type: None,
            build_date: None,
            extra: Map::new(),
        }
    }

    pub fn with_biothing_type(mut self, biothing_type: impl Into<String>) -> Self {
        self.biothing_type = Some(biothing_type.into());
        self
    }

    pub fn from_raw(id: &ApiIdentifier, raw: Value) -> Result<Self, CatalogError> {
        let Value::Object(mut fields) = raw else {
            return Err(CatalogError::Decode {
                url: format!("/{id}/metadata"),
                message: "metadata payload is not a JSON object".to_string(),
            });
        };

        fields.remove("name");
        let build_date = match fields.remove("build_date") {
            None | Some(Value::Null) => None,
            Some(value) => Some(normalize_build_date(&value)),
        };
        let biothing_type = match fields.remove("biothing_type") {
            Some(Value::String(value)) => Some(value),
            Some(Value::Null) | None => None,
            Some(other) => {
                fields.insert("biothing_type".to_string(), other);
                None
            }
        };

        Ok(Self {
            name: id.as_str().to_string(),
            biothing_type,
            build_date,
            extra: fields,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTag {
    pub name: String,
    pub active: bool,
    pub color: String,
}

impl TypeTag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            active: false,
            color: color_for(name).to_string(),
        }
    }
}

pub fn color_for(name: &str) -> &'static str {
    match name {
        "gene" => "#669BE8",
        "variant" => "#84D958",
        "chemical" => "#FF8F39",
        "disease" => "#9356bf",
        "association" => "#e91e62",
        _ => FALLBACK_COLOR,
    }
}

/// `M-D-YYYY`, or [`INVALID_DATE`]. Numbers are epoch milliseconds; offsets
/// are kept as sent.
pub fn normalize_build_date(value: &Value) -> String {
    let date = match value {
        Value::String(text) => parse_date(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|ts| ts.date_naive()),
        _ => None,
    };
    match date {
        Some(date) => format!("{}-{}-{:04}", date.month(), date.day(), date.year()),
        None => INVALID_DATE.to_string(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.date_naive());
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.date());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}
