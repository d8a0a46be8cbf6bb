//! InstaFram Common Library
//!
//! Shared types for the InstaFram client crates: the response envelope,
//! backend entities, pagination constants and the structured error taxonomy.

pub mod error;
pub mod models;

pub use error::{ApiError, ErrorCode, Result};

pub use models::{
    AuthPayload, Comment, Credentials, EmailAvailability, EmailCheck, EmailVerification,
    Envelope, Identified, NewComment, Post, Ref, Registration, Save, Tokens, User,
    Visibility, PAGE_SIZE,
};
