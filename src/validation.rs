//! Field validation shared by every record.
//!
//! Failures are collected rather than returned on first error so the UI can
//! highlight every invalid input at once.

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{parse_date, parse_time};

pub const NAME_MAX: usize = 50;
pub const TITLE_MAX: usize = 120;
pub const TEXT_MAX: usize = 2000;
pub const PHONE_MAX: usize = 30;
pub const EMAIL_MAX: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{} field(s) failed validation", .fields.len())]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn first_message(&self) -> String {
        self.fields
            .first()
            .map(|f| format!("{} {}", f.field, f.message))
            .unwrap_or_else(|| "validation failed".to_string())
    }
}

/// Failure of a domain operation: bad input, or a record in the wrong state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("{0}")]
    InvalidState(String),
}

impl RuleError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        RuleError::Validation(ValidationErrors::single(field, message))
    }

    pub fn state(message: impl Into<String>) -> Self {
        RuleError::InvalidState(message.into())
    }
}

/// Limits that come from configuration rather than the record itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub max_students: u32,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self { max_students: 15 }
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors {
                fields: self.errors,
            })
        }
    }

    pub fn required(&mut self, field: &str, value: &str, max: usize) {
        let t = value.trim();
        if t.is_empty() {
            self.push(field, "is required");
        } else if t.chars().count() > max {
            self.push(field, format!("must be at most {} characters", max));
        }
    }

    pub fn optional(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.trim().chars().count() > max {
                self.push(field, format!("must be at most {} characters", max));
            }
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        let t = value.trim();
        if t.is_empty() {
            self.push(field, "is required");
            return;
        }
        if t.len() > EMAIL_MAX || !is_email(t) {
            self.push(field, "must be a valid email address");
        }
    }

    pub fn optional_email(&mut self, field: &str, value: Option<&str>) {
        match value.map(str::trim) {
            None | Some("") => {}
            Some(v) => self.email(field, v),
        }
    }

    pub fn date(&mut self, field: &str, value: &str) -> Option<NaiveDate> {
        if value.trim().is_empty() {
            self.push(field, "is required");
            return None;
        }
        let parsed = parse_date(value);
        if parsed.is_none() {
            self.push(field, "must be a date in YYYY-MM-DD format");
        }
        parsed
    }

    pub fn optional_date(&mut self, field: &str, value: Option<&str>) -> Option<NaiveDate> {
        match value.map(str::trim) {
            None | Some("") => None,
            Some(v) => self.date(field, v),
        }
    }

    pub fn time(&mut self, field: &str, value: &str) -> Option<u32> {
        let parsed = parse_time(value);
        if parsed.is_none() {
            self.push(field, "must be a time in HH:MM format");
        }
        parsed
    }

    /// `later` must not precede `earlier`; silently skipped when either side
    /// already failed to parse.
    pub fn date_order(
        &mut self,
        later_field: &str,
        later: Option<NaiveDate>,
        earlier_field: &str,
        earlier: Option<NaiveDate>,
    ) {
        if let (Some(l), Some(e)) = (later, earlier) {
            if l < e {
                self.push(later_field, format!("must be on or after {}", earlier_field));
            }
        }
    }

    pub fn time_order(&mut self, end_field: &str, end: Option<u32>, start_field: &str, start: Option<u32>) {
        if let (Some(e), Some(s)) = (end, start) {
            if e <= s {
                self.push(end_field, format!("must be later than {}", start_field));
            }
        }
    }

    pub fn range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !value.is_finite() || value < min || value > max {
            self.push(field, format!("must be between {} and {}", min, max));
        }
    }

    pub fn non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.push(field, "must not be negative");
        }
    }

    pub fn positive(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value <= 0.0 {
            self.push(field, "must be greater than 0");
        }
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty()
}
