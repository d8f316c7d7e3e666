//! Field-level request validation.
//!
//! Handlers collect every problem with a request into [`FieldErrors`] before
//! touching the database, so a client gets the full list in one response.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use email_address::EmailAddress;
use serde::Serialize;

use crate::error::{AppError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(self.0))
        }
    }

    /// Like [`FieldErrors::into_result`], but keyed by field name. The first
    /// message recorded for a field wins.
    pub fn into_map_result(self) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let mut errors = BTreeMap::new();
        for FieldError { field, message } in self.0 {
            errors.entry(field).or_insert(message);
        }
        Err(AppError::ValidationMap {
            message: "Validation failed".to_string(),
            errors,
        })
    }

    /// Trimmed string whose character count lies in `min..=max`.
    pub fn text(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: usize,
        max: usize,
        message: &str,
    ) -> Option<String> {
        let trimmed = value.map(str::trim).unwrap_or_default();
        let len = trimmed.chars().count();
        if len < min || len > max {
            self.add(field, message);
            return None;
        }
        Some(trimmed.to_string())
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        match value.and_then(normalize_email) {
            Some(email) => Some(email),
            None => {
                self.add(field, "Please provide a valid email");
                None
            }
        }
    }

    pub fn date(&mut self, field: &str, label: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => {
                self.add(field, format!("{label} is required"));
                None
            }
            Some(raw) => match parse_date(raw) {
                Some(date) => Some(date),
                None => {
                    self.add(field, format!("Please provide a valid {}", label.to_lowercase()));
                    None
                }
            },
        }
    }
}

/// Lower-cases and trims an address, rejecting anything that is not a plain
/// `local@domain.tld` mailbox.
pub fn normalize_email(value: &str) -> Option<String> {
    let email = value.trim().to_lowercase();
    let (_, domain) = email.split_once('@')?;
    if !domain.contains('.') || domain.ends_with('.') || !EmailAddress::is_valid(&email) {
        return None;
    }
    Some(email)
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM[:SS]` local-less
/// timestamps and bare `YYYY-MM-DD` dates, all read as UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}
