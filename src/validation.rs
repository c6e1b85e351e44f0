//! Client-side form validation.
//!
//! Single-field checks return `Result<(), String>`; the `validate_*_form`
//! functions run every check for a form and collect the failures per field.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationErrors;
use crate::models::{NewUser, ReservationStatus, ToolForm, ToolStatus, ToolUpdate};
use crate::session::Credentials;

lazy_static! {
    /// Pragmatic email shape: local part, `@`, dotted domain.
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$"
    ).unwrap();
}

pub const MIN_NAME_LEN: usize = 4;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MAX_RATING: i64 = 5;

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email".to_string());
    }
    Ok(())
}

pub fn validate_required(value: &str, label: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    Ok(())
}

pub fn validate_min_len(value: &str, label: &str, min: usize) -> Result<(), String> {
    validate_required(value, label)?;
    if value.trim().chars().count() < min {
        return Err(format!("{} must be at least {} characters", label, min));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

pub fn validate_coordinate(value: Option<&str>, label: &str, limit: f64) -> Result<(), String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    let Some(value) = value else {
        return Err(format!("{} is required", label));
    };
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= limit => Ok(()),
        Ok(_) => Err(format!("{} must be between -{} and {}", label, limit, limit)),
        Err(_) => Err(format!("{} must be a number", label)),
    }
}

/// Prices must be finite and not negative.
pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() {
        return Err("Price must be a number".to_string());
    }
    if price < 0.0 {
        return Err("Price cannot be negative".to_string());
    }
    Ok(())
}

pub fn validate_positive_price(price: f64) -> Result<(), String> {
    validate_price(price)?;
    if price == 0.0 {
        return Err("Price must be greater than zero".to_string());
    }
    Ok(())
}

pub fn validate_tool_status(status: ToolStatus) -> Result<(), String> {
    if ToolStatus::SELECTABLE.contains(&status) {
        Ok(())
    } else {
        Err("Status must be one of: disponível, alugada, em manutenção".to_string())
    }
}

/// A rental period must end strictly after it starts.
pub fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), String> {
    if end <= start {
        return Err("End date must be after the start date".to_string());
    }
    Ok(())
}

pub fn validate_rating(rating: i64) -> Result<(), String> {
    if !(0..=MAX_RATING).contains(&rating) {
        return Err(format!("Rating must be between 0 and {}", MAX_RATING));
    }
    Ok(())
}

pub fn validate_login_form(credentials: &Credentials) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.check("email", validate_email(&credentials.email));
    errors.check("password", validate_required(&credentials.password, "Password"));
    errors.finish()
}

pub fn validate_register_form(user: &NewUser) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors
        .check("name", validate_min_len(&user.name, "Name", MIN_NAME_LEN))
        .check("email", validate_email(&user.email))
        .check("password", validate_password(&user.password))
        .check("phone", validate_required(&user.phone, "Phone"))
        .check("cpf", validate_required(&user.cpf, "CPF"))
        .check("address", validate_required(&user.address, "Address"))
        .check(
            "latitude",
            validate_coordinate(user.latitude.as_deref(), "Latitude", 90.0),
        )
        .check(
            "longitude",
            validate_coordinate(user.longitude.as_deref(), "Longitude", 180.0),
        )
        .check("image", validate_required(&user.image, "Image"));
    errors.finish()
}

pub fn validate_tool_form(form: &ToolForm) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors
        .check("name", validate_required(&form.name, "Name"))
        .check(
            "description",
            validate_min_len(&form.description, "Description", MIN_DESCRIPTION_LEN),
        )
        .check("price", validate_price(form.price))
        .check("category", validate_required(&form.category, "Category"))
        .check("status", validate_tool_status(form.status));
    errors.finish()
}

pub fn validate_tool_update_form(update: &ToolUpdate) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors
        .check("name", validate_required(&update.name, "Name"))
        .check("description", validate_required(&update.description, "Description"))
        .check("price", validate_positive_price(update.price))
        .check("category", validate_required(&update.category, "Category"));
    errors.finish()
}

pub fn validate_reservation_form(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.check("end_date", validate_period(start, end));
    errors.finish()
}

/// Ratings are only accepted for finished rentals.
pub fn validate_rating_form(rating: i64, status: ReservationStatus) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.check("rating", validate_rating(rating));
    if status != ReservationStatus::Finalizada {
        errors.add("status", "Only finished rentals can be rated");
    }
    errors.finish()
}
