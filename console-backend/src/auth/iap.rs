//! Validation of the signed assertion Identity-Aware Proxy attaches to every request.

use std::{sync::Arc, time::Duration};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::CurrentUser;
use crate::{
    cache::TtlCache,
    clients::{error_for_status, http_client},
    errors::{Error, Result},
    metrics,
};

pub const IAP_ASSERTION_HEADER: &str = "x-goog-iap-jwt-assertion";
pub const IAP_ISSUER: &str = "https://cloud.google.com/iap";

#[derive(Debug, Deserialize)]
struct IapClaims {
    email: String,
}

pub struct IapValidator {
    audience: String,
    jwks_url: Url,
    client: Client,
    keys: TtlCache<(), Arc<JwkSet>>,
}

impl IapValidator {
    pub fn new(audience: impl Into<String>, jwks_url: Url, keys_ttl: Duration, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            audience: audience.into(),
            jwks_url,
            client: http_client(timeout)?,
            keys: TtlCache::new("iap_keys", keys_ttl),
        })
    }

    /// Verify `assertion` and return the user it was issued for.
    #[instrument(skip_all)]
    pub async fn validate(&self, assertion: &str) -> Result<CurrentUser> {
        let header = decode_header(assertion).map_err(unauthenticated)?;
        let kid = header.kid.ok_or_else(|| Error::Unauthenticated {
            message: Some("IAP assertion has no key id".to_string()),
        })?;

        let keys = self.keys().await?;
        let Some(jwk) = keys.find(&kid) else {
            // Keys rotate; fetch them again on the next request
            self.keys.invalidate(&()).await;
            debug!(kid, "Unknown IAP signing key");
            return Err(Error::Unauthenticated { message: None });
        };
        let key = DecodingKey::from_jwk(jwk).map_err(|e| Error::unavailable("iap", e))?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[IAP_ISSUER]);

        let token = decode::<IapClaims>(assertion, &key, &validation).map_err(unauthenticated)?;
        Ok(CurrentUser {
            email: token.claims.email,
        })
    }

    async fn keys(&self) -> Result<Arc<JwkSet>> {
        self.keys
            .get_or_refresh((), || metrics::instrument("iap", "keys", self.fetch_keys()))
            .await
            .map_err(|e| Error::unavailable("iap", e))
    }

    async fn fetch_keys(&self) -> anyhow::Result<Arc<JwkSet>> {
        let response = self.client.get(self.jwks_url.clone()).send().await?;
        let keys = error_for_status(response).await?.json::<JwkSet>().await?;
        Ok(Arc::new(keys))
    }
}

fn unauthenticated(e: jsonwebtoken::errors::Error) -> Error {
    debug!("Rejected IAP assertion: {e}");
    Error::Unauthenticated { message: None }
}
