use crate::errors::ValidationError;
use chrono::{DateTime, NaiveDateTime, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

// Common regex patterns
fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

fn hex_colour_regex() -> &'static Regex {
    static COLOUR_REGEX: OnceLock<Regex> = OnceLock::new();
    COLOUR_REGEX.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap())
}

/// Struct for configuring validations in a fluent style
#[derive(Default)]
pub struct ValidationBuilder<T> {
    field_name: String,
    value: Option<T>,
    errors: Vec<ValidationError>,
}

/// Collects errors from several builders so that a caller can report all of
/// them at once instead of stopping at the first.
#[derive(Debug, Default)]
pub struct NestedValidator {
    errors: Vec<ValidationError>,
}

impl NestedValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Merge everything a builder collected.
    pub fn check<T>(&mut self, builder: ValidationBuilder<T>) {
        self.errors.extend(builder.into_errors());
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

/// Generic validation implementations
impl<T> ValidationBuilder<T> {
    pub fn new(field_name: &str, value: Option<T>) -> Self {
        Self {
            field_name: field_name.to_string(),
            value,
            errors: Vec::new(),
        }
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

/// String-specific validations
impl ValidationBuilder<String> {
    pub fn min_length(mut self, min: usize) -> Self {
        if let Some(value) = &self.value {
            if value.chars().count() < min {
                self.errors.push(ValidationError::min_length(&self.field_name, min));
            }
        }
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let Some(value) = &self.value {
            if value.chars().count() > max {
                self.errors.push(ValidationError::max_length(&self.field_name, max));
            }
        }
        self
    }

    pub fn matches_pattern(mut self, pattern: &Regex, message: &str) -> Self {
        if let Some(value) = &self.value {
            if !pattern.is_match(value) {
                self.errors.push(ValidationError::format(&self.field_name, message));
            }
        }
        self
    }

    pub fn email(self) -> Self {
        self.matches_pattern(email_regex(), "Invalid email format")
    }

    pub fn hex_colour(self) -> Self {
        self.matches_pattern(hex_colour_regex(), "must be a #RRGGBB colour")
    }

    /// Accepts only absolute http:// or https:// URLs.
    pub fn http_url(mut self) -> Self {
        if let Some(value) = &self.value {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                self.errors.push(ValidationError::format(
                    &self.field_name,
                    "must start with http:// or https://",
                ));
            }
        }
        self
    }

    /// The message names the offending value so a user can find it.
    pub fn iso8601(mut self) -> Self {
        if let Some(value) = &self.value {
            if parse_iso8601(value).is_none() {
                self.errors.push(ValidationError::format(
                    &self.field_name,
                    &format!("Invalid datetime format: {}. Expected ISO 8601 format.", value),
                ));
            }
        }
        self
    }

    pub fn one_of(mut self, allowed_values: &[&str], message: Option<&str>) -> Self {
        if let Some(value) = &self.value {
            if !allowed_values.contains(&value.as_str()) {
                let reason = message.unwrap_or("must be one of the allowed values");
                self.errors.push(ValidationError::invalid_value(&self.field_name, reason));
            }
        }
        self
    }
}

/// Parses the ISO-8601 shapes exports are known to contain: RFC 3339 with an
/// offset or `Z`, a naive date-time, or a bare date.
pub fn parse_iso8601(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
