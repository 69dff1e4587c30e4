use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

use super::CurrentUser;
use crate::{
    AppState,
    errors::{Error, Result},
};

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user = state.authenticator.authenticate(&parts.headers).await?;
        trace!(email = %user.email, "Authenticated request");
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Fakes, TEST_USER};

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut request = axum::http::Request::builder().uri("http://localhost/query");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let (parts, _body) = request.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn static_user_is_always_authenticated() {
        let state = Fakes::default().state();
        let mut parts = parts(&[]);

        let user = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.email, TEST_USER);
        assert!(parts.extensions.get::<CurrentUser>().is_some());
    }

    #[tokio::test]
    async fn iap_requires_assertion_header() {
        let authenticator = crate::auth::Authenticator::Iap(
            crate::auth::iap::IapValidator::new(
                "aud",
                url::Url::parse("http://127.0.0.1:9/jwk").unwrap(),
                std::time::Duration::from_secs(60),
                std::time::Duration::from_secs(1),
            )
            .unwrap(),
        );
        let state = Fakes::default().state_with_authenticator(authenticator);
        let mut parts = parts(&[]);

        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));
    }
}
