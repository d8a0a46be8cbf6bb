//! Form validation and error routing
//!
//! Forms are checked locally with `validator` before anything is sent.
//! Server rejections are routed to a form field by their structured
//! [`ErrorCode`], or shown as a [`Notice`] when no field owns them.

use crate::transport::FilePart;
use instafram_common::{ApiError, ErrorCode, NewComment, Registration, Visibility};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

// Hardcoded patterns, always valid
static ALIAS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.]{3,30}$")
        .expect("hardcoded alias regex is invalid - fix source code")
});

static OTP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6}$").expect("hardcoded otp regex is invalid - fix source code"));

/// Image picked for upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    fn into_part(self, field: &str) -> FilePart {
        FilePart {
            field: field.to_string(),
            file_name: self.file_name,
            mime: self.mime,
            bytes: self.bytes,
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct SignUpForm {
    #[validate(length(min = 2, max = 50, message = "Name must be 2 to 50 characters"))]
    pub name: String,
    #[validate(regex(
        path = *ALIAS_REGEX,
        message = "Alias may use letters, digits, '_' and '.', 3 to 30 characters"
    ))]
    pub alias: String,
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

impl SignUpForm {
    pub fn registration(&self) -> Registration {
        Registration {
            name: self.name.trim().to_string(),
            alias: self.alias.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct SignInForm {
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Enter your password"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct OtpForm {
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(regex(path = *OTP_REGEX, message = "The code has 6 digits"))]
    pub otp: String,
}

/// Comment draft as checked before sending; content and post are trimmed
#[derive(Debug, Clone, Default, Validate)]
pub struct CommentForm {
    #[validate(length(min = 1, message = "Comment needs a post"))]
    pub post_id: String,
    #[validate(length(min = 1, max = 500, message = "Comment must be 1 to 500 characters"))]
    pub content: String,
}

impl From<&NewComment> for CommentForm {
    fn from(draft: &NewComment) -> Self {
        Self {
            post_id: draft.post_id.trim().to_string(),
            content: draft.content.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct PostForm {
    #[validate(length(max = 2200, message = "Caption is too long"))]
    pub content: String,
    #[validate(length(max = 100, message = "Location is too long"))]
    pub location: Option<String>,
    /// Comma-separated
    #[validate(length(max = 300, message = "Too many tags"))]
    pub tags: String,
    pub visibility: Visibility,
    pub image: Option<ImageUpload>,
}

impl PostForm {
    /// Normalized tag list: trimmed, no empties
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn to_multipart(&self) -> (Vec<(String, String)>, Vec<FilePart>) {
        let mut fields = vec![
            ("content".to_string(), self.content.trim().to_string()),
            ("visibility".to_string(), self.visibility.to_string()),
            ("tags".to_string(), self.tag_list().join(",")),
        ];
        if let Some(location) = self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            fields.push(("location".to_string(), location.to_string()));
        }
        let files = self.image.clone().map(|i| i.into_part("image")).into_iter().collect();
        (fields, files)
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct ProfileForm {
    #[validate(length(min = 2, max = 50, message = "Name must be 2 to 50 characters"))]
    pub name: String,
    #[validate(regex(
        path = *ALIAS_REGEX,
        message = "Alias may use letters, digits, '_' and '.', 3 to 30 characters"
    ))]
    pub alias: String,
    #[validate(length(max = 150, message = "Bio is too long"))]
    pub bio: Option<String>,
    pub avatar: Option<ImageUpload>,
}

impl ProfileForm {
    pub(crate) fn to_multipart(&self) -> (Vec<(String, String)>, Vec<FilePart>) {
        let mut fields = vec![
            ("name".to_string(), self.name.trim().to_string()),
            ("alias".to_string(), self.alias.trim().to_string()),
        ];
        if let Some(bio) = &self.bio {
            fields.push(("bio".to_string(), bio.trim().to_string()));
        }
        let files = self.avatar.clone().map(|a| a.into_part("avatar")).into_iter().collect();
        (fields, files)
    }
}

/// Messages per form field
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// One line per field, for logs and terminal output
    pub fn summary(&self) -> String {
        self.0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl From<&ValidationErrors> for FieldErrors {
    fn from(errors: &ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, list) in errors.field_errors() {
            for error in list.iter() {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                out.add(field.to_string(), message);
            }
        }
        out
    }
}

/// Run local validation, flattening failures into `ApiError::Validation`
pub fn check<T: Validate>(form: &T) -> Result<(), ApiError> {
    form.validate()
        .map_err(|e| ApiError::Validation(FieldErrors::from(&e).summary()))
}

/// Validate locally, keeping per-field detail
pub fn validate_form<T: Validate>(form: &T) -> Result<(), FieldErrors> {
    form.validate().map_err(|e| FieldErrors::from(&e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient message for errors no form field owns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Whether a "try again" action makes sense
    pub retryable: bool,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        let retryable = err.is_transient();
        let message = match err {
            ApiError::Network(_) => "Can't reach InstaFram. Check your connection.".to_string(),
            ApiError::Timeout(_) => "InstaFram is taking too long to respond.".to_string(),
            ApiError::Unauthenticated => "Sign in to continue.".to_string(),
            ApiError::Decode(_) => "Received an unexpected response.".to_string(),
            ApiError::Storage(_) => "Couldn't access the saved session.".to_string(),
            ApiError::Rejected {
                code: ErrorCode::RateLimited,
                ..
            } => "Slow down a little and try again.".to_string(),
            ApiError::Validation(message) | ApiError::Rejected { message, .. } => message.clone(),
        };
        Self {
            level: if retryable {
                NoticeLevel::Warning
            } else {
                NoticeLevel::Error
            },
            message,
            retryable,
        }
    }
}

/// Decide where a failed submission is shown: on a field when the error code
/// names one, otherwise as a notice
pub fn route_error(err: &ApiError) -> Result<FieldErrors, Notice> {
    match err {
        ApiError::Rejected { code, message, .. } => match code.field() {
            Some(field) => {
                let mut errors = FieldErrors::new();
                errors.add(field, message.clone());
                Ok(errors)
            }
            None => Err(Notice::from_error(err)),
        },
        _ => Err(Notice::from_error(err)),
    }
}
