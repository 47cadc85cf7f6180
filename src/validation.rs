//! Input validation shared by the HTTP handlers and the client board.
//!
//! Validation runs before any remote call. A failure short-circuits the
//! operation and surfaces as field-scoped messages.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedError;

/// Maximum accepted todo title length, in characters.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Message for an empty todo title.
pub const EMPTY_TITLE_MESSAGE: &str = "Todo title cannot be empty";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|error| unreachable!("email pattern is a valid regex: {error}"))
});

// =============================================================================
// Field Errors
// =============================================================================

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the field that failed validation.
    pub field: String,
    /// Error message for this field.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A set of field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    /// Field-level errors.
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }

    /// Returns true if there are no validation errors.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the messages for one field.
    pub fn messages_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.errors
            .iter()
            .filter(move |error| error.field == field)
            .map(|error| error.message.as_str())
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&format_validation_errors(&self.errors))
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ClassifiedError {
    fn from(error: ValidationError) -> Self {
        let fields: Vec<serde_json::Value> = error
            .errors
            .iter()
            .map(|field_error| field_error.field.clone().into())
            .collect();
        Self::validation(format_validation_errors(&error.errors)).with_context("fields", fields)
    }
}

/// Renders field errors as one user-facing message.
///
/// One error gives its message as-is; several become a bulleted list.
#[must_use]
pub fn format_validation_errors(errors: &[FieldError]) -> String {
    match errors {
        [] => String::new(),
        [only] => only.message.clone(),
        many => {
            let lines: Vec<String> = many
                .iter()
                .map(|error| format!("- {}", error.message))
                .collect();
            format!("Please fix the following errors:\n{}", lines.join("\n"))
        }
    }
}

// =============================================================================
// Todo Title
// =============================================================================

/// Validates a todo title, returning it trimmed.
///
/// # Errors
///
/// Returns a `title` field error if the title is blank or longer than
/// [`MAX_TITLE_LENGTH`] characters.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::single("title", EMPTY_TITLE_MESSAGE));
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::single(
            "title",
            format!("Todo title must not exceed {MAX_TITLE_LENGTH} characters"),
        ));
    }

    Ok(title.to_string())
}

// =============================================================================
// Credentials
// =============================================================================

/// Returns `true` if `email` looks like a deliverable address.
#[must_use]
pub fn validate_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Coarse password strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

/// Outcome of checking a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCheck {
    /// No rule was violated.
    pub valid: bool,
    /// Strength estimate.
    pub strength: PasswordStrength,
    /// Violated rules, as user-facing messages.
    pub errors: Vec<String>,
}

/// Checks a password against the length and character-class rules.
#[must_use]
pub fn validate_password(password: &str) -> PasswordCheck {
    let length = password.chars().count();
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());

    let mut errors = Vec::new();
    if length < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if !has_upper {
        errors.push("Password should contain at least one uppercase letter".to_string());
    }
    if !has_digit {
        errors.push("Password should contain at least one number".to_string());
    }
    if !has_special {
        errors.push("Password should contain at least one special character".to_string());
    }

    let score = [has_upper, has_digit, has_special]
        .into_iter()
        .filter(|present| *present)
        .count();
    let strength = if length < MIN_PASSWORD_LENGTH {
        PasswordStrength::Weak
    } else if score == 3 && length >= 10 {
        PasswordStrength::Strong
    } else if score >= 2 {
        PasswordStrength::Medium
    } else {
        PasswordStrength::Weak
    };

    PasswordCheck {
        valid: errors.is_empty(),
        strength,
        errors,
    }
}

/// Fields of a sign-up or sign-in form.
///
/// `None` means the form did not carry the field at all; `Some("")` means it
/// was submitted empty.
#[derive(Debug, Clone, Default)]
pub struct AuthForm<'a> {
    pub email: Option<&'a str>,
    pub password: Option<&'a str>,
    pub confirm_password: Option<&'a str>,
}

/// Validates an authentication form.
///
/// # Errors
///
/// Returns every field error found: malformed or empty email, password rule
/// violations, and a confirmation mismatch.
pub fn validate_auth_form(form: &AuthForm<'_>) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    match form.email {
        Some("") => errors.push(FieldError::new("email", "Email is required")),
        Some(email) if !validate_email(email.trim()) => {
            errors.push(FieldError::new("email", "Please enter a valid email address"));
        }
        _ => {}
    }

    match form.password {
        Some("") => errors.push(FieldError::new("password", "Password is required")),
        Some(password) => {
            let check = validate_password(password);
            errors.extend(
                check
                    .errors
                    .into_iter()
                    .map(|message| FieldError::new("password", message)),
            );
        }
        None => {}
    }

    if let Some(confirm) = form.confirm_password
        && !confirm.is_empty()
        && form.password != Some(confirm)
    {
        errors.push(FieldError::new("confirmPassword", "Passwords do not match"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Classification, ErrorCategory};
    use rstest::rstest;

    #[rstest]
    fn test_validate_title_trims() {
        assert_eq!(validate_title("  Buy milk  ").unwrap(), "Buy milk");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    fn test_validate_title_rejects_blank(#[case] title: &str) {
        let error = validate_title(title).unwrap_err();
        assert_eq!(
            error.messages_for("title").collect::<Vec<_>>(),
            vec![EMPTY_TITLE_MESSAGE]
        );
    }

    #[rstest]
    fn test_validate_title_length_limit() {
        assert!(validate_title(&"a".repeat(MAX_TITLE_LENGTH)).is_ok());
        assert!(validate_title(&"a".repeat(MAX_TITLE_LENGTH + 1)).is_err());
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case("first.last+tag@sub.example.org", true)]
    #[case("no-at-sign.example.com", false)]
    #[case("user@", false)]
    #[case("user@-bad.com", false)]
    fn test_validate_email(#[case] email: &str, #[case] expected: bool) {
        assert_eq!(validate_email(email), expected);
    }

    #[rstest]
    #[case("short", PasswordStrength::Weak, false)]
    #[case("alllowercase", PasswordStrength::Weak, false)]
    #[case("Uppercase1", PasswordStrength::Medium, false)]
    #[case("Upper1!x", PasswordStrength::Medium, true)]
    #[case("Upper1!xyz", PasswordStrength::Strong, true)]
    fn test_validate_password(
        #[case] password: &str,
        #[case] strength: PasswordStrength,
        #[case] valid: bool,
    ) {
        let check = validate_password(password);
        assert_eq!(check.strength, strength);
        assert_eq!(check.valid, valid);
    }

    #[rstest]
    fn test_validate_auth_form_collects_all_errors() {
        let form = AuthForm {
            email: Some("not-an-email"),
            password: Some("weak"),
            confirm_password: Some("different"),
        };
        let error = validate_auth_form(&form).unwrap_err();

        assert_eq!(error.messages_for("email").count(), 1);
        assert!(error.messages_for("password").count() >= 3);
        assert_eq!(
            error.messages_for("confirmPassword").collect::<Vec<_>>(),
            vec!["Passwords do not match"]
        );
    }

    #[rstest]
    fn test_validate_auth_form_required_fields() {
        let form = AuthForm {
            email: Some(""),
            password: Some(""),
            confirm_password: None,
        };
        let error = validate_auth_form(&form).unwrap_err();
        assert_eq!(error.errors.len(), 2);
    }

    #[rstest]
    fn test_validate_auth_form_accepts_good_input() {
        let form = AuthForm {
            email: Some("user@example.com"),
            password: Some("Secret#2024"),
            confirm_password: Some("Secret#2024"),
        };
        assert!(validate_auth_form(&form).is_ok());
    }

    #[rstest]
    fn test_format_validation_errors() {
        assert_eq!(format_validation_errors(&[]), "");
        assert_eq!(
            format_validation_errors(&[FieldError::new("title", "Only one")]),
            "Only one"
        );
        assert_eq!(
            format_validation_errors(&[
                FieldError::new("email", "Bad email"),
                FieldError::new("password", "Bad password"),
            ]),
            "Please fix the following errors:\n- Bad email\n- Bad password"
        );
    }

    #[rstest]
    fn test_validation_error_keeps_message_through_classification() {
        let classified: ClassifiedError = validate_title("").unwrap_err().into();
        let classification = Classification::of(&classified);
        assert_eq!(classification.category, ErrorCategory::Validation);
        assert_eq!(classification.user_message, EMPTY_TITLE_MESSAGE);
    }
}
