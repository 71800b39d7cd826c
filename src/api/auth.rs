//! HTTP Basic authentication
//!
//! The username doubles as the storage key after normalization; the
//! password is forwarded to the source site when a crawl is requested.
//! There is no account database: the credential pair is simply carried
//! through to the collaborators that need it.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::db::quizzes::normalize_username;
use crate::error::ApiError;

/// The authenticated caller of a protected endpoint
#[derive(Clone)]
pub struct BasicUser {
    /// Trimmed, lowercased username keying the per-user store
    pub storage_key: String,
    /// The username exactly as supplied, used for the site login and the
    /// transcript name filter
    pub name: String,
    pub password: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for BasicUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let encoded = header_value
            .strip_prefix("Basic ")
            .ok_or(ApiError::Unauthorized)?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| ApiError::Unauthorized)?;
        let decoded = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

        let (name, password) = decoded.split_once(':').ok_or(ApiError::Unauthorized)?;
        if name.trim().is_empty() {
            return Err(ApiError::Unauthorized);
        }

        Ok(BasicUser {
            storage_key: normalize_username(name),
            name: name.to_string(),
            password: password.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    async fn extract(header_value: Option<&str>) -> Result<BasicUser, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let request = builder.body(Body::empty()).unwrap();
        let (mut parts, _) = request.into_parts();
        BasicUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn valid_credentials_normalize_the_storage_key() {
        let encoded = STANDARD.encode(" Alice :hunter2");
        let user = extract(Some(&format!("Basic {}", encoded))).await.unwrap();
        assert_eq!(user.storage_key, "alice");
        assert_eq!(user.name, " Alice ");
        assert_eq!(user.password, "hunter2");
    }

    #[tokio::test]
    async fn missing_or_mangled_headers_are_unauthorized() {
        assert!(extract(None).await.is_err());
        assert!(extract(Some("Bearer token")).await.is_err());
        assert!(extract(Some("Basic not-base64!!")).await.is_err());
        let no_colon = STANDARD.encode("justauser");
        assert!(extract(Some(&format!("Basic {}", no_colon))).await.is_err());
        let empty_name = STANDARD.encode(":password");
        assert!(extract(Some(&format!("Basic {}", empty_name))).await.is_err());
    }
}
