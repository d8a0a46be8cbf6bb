//! Authentication endpoints

use super::{acknowledge, fetch};
use crate::forms::{self, OtpForm, SignInForm, SignUpForm};
use crate::transport::{ApiRequest, Transport};
use instafram_common::{
    ApiError, AuthPayload, Credentials, EmailAvailability, EmailCheck, EmailVerification, User,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn login(&self, form: &SignInForm) -> Result<AuthPayload, ApiError> {
        forms::check(form)?;
        let body = Credentials {
            email: form.email.trim().to_string(),
            password: form.password.clone(),
        };
        fetch(&*self.transport, ApiRequest::post("/auth/login").json(&body)?).await
    }

    pub async fn register(&self, form: &SignUpForm) -> Result<AuthPayload, ApiError> {
        forms::check(form)?;
        let request = ApiRequest::post("/auth/register").json(&form.registration())?;
        fetch(&*self.transport, request).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        acknowledge(&*self.transport, ApiRequest::post("/auth/logout")).await
    }

    /// Profile of whoever the session tokens belong to
    pub async fn me(&self) -> Result<User, ApiError> {
        fetch(&*self.transport, ApiRequest::post("/auth/me")).await
    }

    pub async fn check_email(&self, email: &str) -> Result<EmailAvailability, ApiError> {
        let body = EmailCheck {
            email: email.trim().to_string(),
        };
        fetch(&*self.transport, ApiRequest::post("/auth/checkEmail").json(&body)?).await
    }

    pub async fn verify_email(&self, form: &OtpForm) -> Result<(), ApiError> {
        forms::check(form)?;
        let body = EmailVerification {
            email: form.email.trim().to_string(),
            otp: form.otp.trim().to_string(),
        };
        acknowledge(&*self.transport, ApiRequest::post("/auth/verifyEmail").json(&body)?).await
    }
}
