//! Body extractor accepting either JSON or form-encoded input.
//!
//! Every mutating operation has one typed input struct with optional fields;
//! this extractor normalizes both wire formats into it before validation.
//! Requests without a recognized content type (e.g. a bare POST) decode to
//! the struct's default, and the handler's field validation takes it from
//! there.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::de::DeserializeOwned;

use super::ApiError;

pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            Ok(Self(value))
        } else if content_type.contains("form") {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            Ok(Self(value))
        } else {
            Ok(Self(T::default()))
        }
    }
}
