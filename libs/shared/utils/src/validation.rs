use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use shared_models::error::AppError;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("email pattern is a valid regex")
    })
}

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| {
        Regex::new(r"^\+?[0-9][0-9 .\-]{5,19}$")
            .expect("phone pattern is a valid regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_pattern().is_match(phone.trim())
}

/// Lower-cased, trimmed form used for uniqueness checks and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

pub fn require_email(email: &str) -> Result<String, AppError> {
    if !is_valid_email(email) {
        return Err(AppError::ValidationError(format!("Invalid email address: {}", email)));
    }
    Ok(normalize_email(email))
}

pub fn require_phone(phone: &str) -> Result<String, AppError> {
    if !is_valid_phone(phone) {
        return Err(AppError::ValidationError(format!("Invalid phone number: {}", phone)));
    }
    Ok(phone.trim().to_string())
}

pub fn require_past_date(field: &str, date: NaiveDate, today: NaiveDate) -> Result<(), AppError> {
    if date > today {
        return Err(AppError::ValidationError(format!("{} cannot be in the future", field)));
    }
    Ok(())
}
