//! Error types for admission control.
use http::{HeaderName, HeaderValue, Response, StatusCode};
use std::time::Duration;

use crate::admission::RETRY_AFTER_HEADER;
use crate::rate_limit::whole_seconds_ceil;

/// Terminal, request-scoped rejection produced before business logic runs.
///
/// Neither variant is retried by this crate; `QuotaExceeded` carries the delay the
/// caller should honour before trying again.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The request carried no API key (header absent or empty). No bucket was touched.
    #[error("Missing Header: {header}")]
    MissingCredential { header: HeaderName },
    /// The key's bucket has no token left.
    #[error("You have exhausted your API Request Quota")]
    QuotaExceeded { retry_after: Duration },
}

impl AdmissionError {
    /// Check if this error is due to a missing API key
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, Self::MissingCredential { .. })
    }

    /// Check if this error is due to an exhausted bucket
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Whole seconds until the next refill, rounded up, for quota rejections.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::QuotaExceeded { retry_after } => Some(whole_seconds_ceil(*retry_after)),
            Self::MissingCredential { .. } => None,
        }
    }

    /// HTTP status this rejection maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential { .. } => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Render as an HTTP response with a plain-text message body.
    ///
    /// Quota rejections carry `X-Rate-Limit-Retry-After-Seconds`; missing-credential
    /// rejections carry no rate-limit headers.
    pub fn into_response<B>(self) -> Response<B>
    where
        B: From<String>,
    {
        let mut response = Response::new(B::from(self.to_string()));
        *response.status_mut() = self.status();
        if let Some(secs) = self.retry_after_secs() {
            response.headers_mut().insert(RETRY_AFTER_HEADER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing() -> AdmissionError {
        AdmissionError::MissingCredential { header: HeaderName::from_static("x-api-key") }
    }

    #[test]
    fn missing_credential_display_names_header() {
        let msg = missing().to_string();
        assert_eq!(msg, "Missing Header: x-api-key");
    }

    #[test]
    fn predicates_cover_all_variants() {
        let quota = AdmissionError::QuotaExceeded { retry_after: Duration::from_secs(3) };
        assert!(quota.is_quota_exceeded());
        assert!(!quota.is_missing_credential());
        assert!(missing().is_missing_credential());
        assert!(!missing().is_quota_exceeded());
    }

    #[test]
    fn retry_after_only_for_quota() {
        let quota = AdmissionError::QuotaExceeded { retry_after: Duration::from_millis(1500) };
        assert_eq!(quota.retry_after_secs(), Some(2));
        assert_eq!(missing().retry_after_secs(), None);
    }

    #[test]
    fn responses_carry_status_and_headers() {
        let quota = AdmissionError::QuotaExceeded { retry_after: Duration::from_secs(60) };
        let response: Response<String> = quota.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER_HEADER], "60");
        assert!(response.body().contains("Quota"));

        let response: Response<String> = missing().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().is_empty());
        assert!(response.body().contains("x-api-key"));
    }
}
