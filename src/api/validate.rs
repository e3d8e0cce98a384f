//! Input validation run before anything reaches the store.

use crate::config::LimitsConfig;
use crate::error::{ApiError, ApiResult};

/// Non-blank text of at most `max` characters.
pub fn require_text<'a>(field: &str, value: &'a str, max: usize) -> ApiResult<&'a str> {
    if value.trim().is_empty() {
        return Err(ApiError::missing_field(field));
    }
    if value.chars().count() > max {
        return Err(ApiError::invalid_value(
            field,
            format!("{} must be at most {} characters", field, max),
        ));
    }
    Ok(value)
}

pub fn task_title<'a>(title: &'a str, limits: &LimitsConfig) -> ApiResult<&'a str> {
    require_text("title", title, limits.max_title_len)
}

pub fn list_name<'a>(name: &'a str, limits: &LimitsConfig) -> ApiResult<&'a str> {
    require_text("name", name, limits.max_list_name_len)
}

pub fn username<'a>(username: &'a str, limits: &LimitsConfig) -> ApiResult<&'a str> {
    let len = username.chars().count();
    if len < limits.min_username_len {
        return Err(ApiError::invalid_value(
            "username",
            format!(
                "Username must be at least {} characters",
                limits.min_username_len
            ),
        ));
    }
    if len > limits.max_username_len {
        return Err(ApiError::invalid_value(
            "username",
            format!(
                "Username must be at most {} characters",
                limits.max_username_len
            ),
        ));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ApiError::invalid_value(
            "username",
            "Username must not contain whitespace",
        ));
    }
    Ok(username)
}

/// Structural check only: `local@domain.tld` without whitespace.
pub fn email(email: &str) -> ApiResult<&str> {
    let invalid = || ApiError::invalid_value("email", "Invalid email");
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(email),
        _ => Err(invalid()),
    }
}

pub fn password<'a>(password: &'a str, limits: &LimitsConfig) -> ApiResult<&'a str> {
    if password.chars().count() < limits.min_password_len {
        return Err(ApiError::invalid_value(
            "password",
            format!(
                "Password must be at least {} characters",
                limits.min_password_len
            ),
        ));
    }
    Ok(password)
}
