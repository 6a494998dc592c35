//! The typed record model shared by the crawl pipeline and the storage sinks.
//!
//! [`RawProfile`] is what the extraction stage parses off a profile page:
//! every field is optional text, exactly as found. [`normalize`] turns it
//! into a validated [`BusinessRecord`]. Only the business name is required —
//! a profile missing any optional field still yields a valid record, with
//! the unparseable raw text preserved under `raw_attributes`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("profile {external_id} has no business name")]
    MissingName { external_id: String },
    #[error("profile reference has an empty external id")]
    EmptyExternalId,
}

/// Field values as parsed from a profile page, before validation.
///
/// Parsing failures at the field level never surface here — a field that
/// could not be located is simply `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProfile {
    pub name: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    /// Raw services string, e.g. `"Services: Drain cleaning, Repairs"`.
    pub services: Option<String>,
    /// Raw address block; lines are split into `BusinessRecord::addresses`.
    pub address: Option<String>,
    /// Raw rating text, e.g. `"4.8"`.
    pub rating: Option<String>,
    /// Raw review-count text, e.g. `"(213)"`.
    pub review_count: Option<String>,
    /// Fields the parser recognized but the model does not yet represent.
    pub extra: BTreeMap<String, String>,
}

/// A validated business listing, keyed by the target-side `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessRecord {
    pub external_id: String,
    pub name: String,
    pub addresses: Vec<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub services: BTreeSet<String>,
    /// Star rating in `[0, 5]`. Out-of-range source values are dropped to
    /// `None` with the raw text kept in `raw_attributes`.
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    /// Unmodeled source fields, preserved for forward compatibility with
    /// target-side schema changes.
    pub raw_attributes: BTreeMap<String, String>,
}

/// Prefix the target prepends to the services line on profile pages.
const SERVICES_PREFIX: &str = "Services:";

/// Validates and normalizes a [`RawProfile`] into a [`BusinessRecord`].
///
/// # Errors
///
/// - [`ValidationError::EmptyExternalId`] if `external_id` is blank.
/// - [`ValidationError::MissingName`] if the profile has no usable name.
pub fn normalize(raw: RawProfile, external_id: &str) -> Result<BusinessRecord, ValidationError> {
    let external_id = external_id.trim();
    if external_id.is_empty() {
        return Err(ValidationError::EmptyExternalId);
    }

    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ValidationError::MissingName {
            external_id: external_id.to_string(),
        })?
        .to_string();

    let mut raw_attributes = raw.extra;

    let rating = match raw.rating.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => match text.parse::<f64>() {
            Ok(value) if (0.0..=5.0).contains(&value) => Some(value),
            // Unparseable or out-of-range ratings indicate a layout change;
            // keep the raw text rather than emit a bogus number.
            _ => {
                raw_attributes.insert("rating_raw".to_string(), text.to_string());
                None
            }
        },
    };

    let review_count = match raw.review_count.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => match parse_leading_count(text) {
            Some(count) => Some(count),
            None => {
                raw_attributes.insert("review_count_raw".to_string(), text.to_string());
                None
            }
        },
    };

    Ok(BusinessRecord {
        external_id: external_id.to_string(),
        name,
        addresses: split_address(raw.address.as_deref()),
        website: clean_optional(raw.website),
        phone: clean_optional(raw.phone),
        services: split_services(raw.services.as_deref()),
        rating,
        review_count,
        raw_attributes,
    })
}

/// Trims an optional field, mapping whitespace-only values to `None`.
fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Splits a raw address block into ordered, non-empty lines.
fn split_address(raw: Option<&str>) -> Vec<String> {
    raw.map(|block| {
        block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Splits the services line into a set, stripping the `Services:` prefix.
fn split_services(raw: Option<&str>) -> BTreeSet<String> {
    let Some(raw) = raw else {
        return BTreeSet::new();
    };
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix(SERVICES_PREFIX)
        .unwrap_or(trimmed)
        .trim();
    body.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts the first run of ASCII digits as a count, e.g. `"(1,234)"` → 1234.
///
/// Commas inside the run are treated as thousands separators. Returns `None`
/// when no digits are present or the value overflows `u32`.
fn parse_leading_count(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok()
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
