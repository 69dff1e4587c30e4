//! Request authentication.
//!
//! The console runs behind Identity-Aware Proxy. Every request carries a signed assertion in the
//! `x-goog-iap-jwt-assertion` header which [`iap::IapValidator`] verifies against Google's
//! published keys. For local development a static user can be configured instead; every request
//! is then attributed to that user.
//!
//! Handlers obtain the caller through the [`CurrentUser`] extractor (see [`current_user`]).

pub mod current_user;
pub mod iap;

use axum::http::HeaderMap;
use tracing::debug;

use crate::{
    config::AuthConfig,
    errors::{Error, Result},
};

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub email: String,
}

pub enum Authenticator {
    Static(CurrentUser),
    Iap(iap::IapValidator),
}

impl Authenticator {
    pub fn from_config(config: &AuthConfig, timeout: std::time::Duration) -> anyhow::Result<Self> {
        if let Some(email) = &config.static_user {
            return Ok(Authenticator::Static(CurrentUser { email: email.clone() }));
        }
        let audience = config
            .iap_audience
            .clone()
            .ok_or_else(|| anyhow::anyhow!("auth.iap_audience is required when no static user is configured"))?;
        Ok(Authenticator::Iap(iap::IapValidator::new(
            audience,
            config.iap_jwks_url.clone(),
            config.iap_keys_ttl,
            timeout,
        )?))
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<CurrentUser> {
        match self {
            Authenticator::Static(user) => Ok(user.clone()),
            Authenticator::Iap(validator) => {
                let assertion = headers
                    .get(iap::IAP_ASSERTION_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| {
                        debug!("Request without IAP assertion");
                        Error::Unauthenticated { message: None }
                    })?;
                validator.validate(assertion).await
            }
        }
    }
}
