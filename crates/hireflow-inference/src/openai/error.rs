//! Classification of rejected OpenAI-compatible calls.
//!
//! The job retry policy only looks at [`Error::is_transient`], so the whole
//! point of this module is picking the right side of that line: bad
//! credentials or an unknown model will fail the same way on every attempt,
//! while throttling and upstream outages clear up on their own.

use hireflow_core::Error;

/// Why the provider refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    /// 401/403: key missing, revoked or lacking access.
    Credentials,
    /// 429.
    Throttled,
    /// Configured model is not served by this endpoint.
    UnknownModel,
    /// Prompt plus resume excerpt exceeded the model window.
    PromptTooLong,
    /// 5xx.
    Upstream,
    Other,
}

impl ProviderFailure {
    /// Classify from the HTTP status and the `error.type` field of the body.
    pub fn classify(status: u16, error_type: &str) -> Self {
        if error_type == "model_not_found" {
            return Self::UnknownModel;
        }
        match status {
            401 | 403 => Self::Credentials,
            429 => Self::Throttled,
            404 => Self::UnknownModel,
            400 if error_type.contains("context_length") => Self::PromptTooLong,
            500..=599 => Self::Upstream,
            _ => Self::Other,
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Throttled | Self::Upstream)
    }

    /// Map onto the crate error, keeping the endpoint family for transient
    /// failures so embedding and scoring errors stay distinguishable.
    pub fn into_error(self, surface: ApiSurface, detail: &str) -> Error {
        let label = match self {
            Self::Credentials => return Error::Config(format!("provider rejected credentials: {detail}")),
            Self::UnknownModel => return Error::Config(format!("model unavailable: {detail}")),
            Self::Throttled => "throttled",
            Self::PromptTooLong => "prompt exceeds model window",
            Self::Upstream => "provider outage",
            Self::Other => "request rejected",
        };
        let text = format!("{label}: {detail}");
        match surface {
            ApiSurface::Embedding => Error::Embedding(text),
            ApiSurface::Generation => Error::Inference(text),
        }
    }
}

/// Which endpoint family a failed call belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiSurface {
    Embedding,
    Generation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_and_type() {
        let cases = [
            (401, "invalid_api_key", ProviderFailure::Credentials),
            (403, "", ProviderFailure::Credentials),
            (429, "rate_limit_exceeded", ProviderFailure::Throttled),
            (404, "", ProviderFailure::UnknownModel),
            (400, "model_not_found", ProviderFailure::UnknownModel),
            (400, "context_length_exceeded", ProviderFailure::PromptTooLong),
            (400, "invalid_request_error", ProviderFailure::Other),
            (503, "", ProviderFailure::Upstream),
            (418, "teapot", ProviderFailure::Other),
        ];
        for (status, kind, expected) in cases {
            assert_eq!(ProviderFailure::classify(status, kind), expected, "{status} {kind}");
        }
    }

    #[test]
    fn test_only_throttling_and_outages_retry() {
        assert!(ProviderFailure::Throttled.is_retryable());
        assert!(ProviderFailure::Upstream.is_retryable());
        assert!(!ProviderFailure::Credentials.is_retryable());
        assert!(!ProviderFailure::PromptTooLong.is_retryable());
    }

    #[test]
    fn test_credentials_and_model_errors_are_permanent() {
        for failure in [ProviderFailure::Credentials, ProviderFailure::UnknownModel] {
            let err = failure.into_error(ApiSurface::Generation, "nope");
            assert!(matches!(err, Error::Config(_)));
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_transient_errors_keep_surface() {
        let scoring = ProviderFailure::Throttled.into_error(ApiSurface::Generation, "slow down");
        assert!(matches!(scoring, Error::Inference(ref m) if m.contains("throttled")));
        assert!(scoring.is_transient());

        let embedding = ProviderFailure::Upstream.into_error(ApiSurface::Embedding, "502");
        assert!(matches!(embedding, Error::Embedding(_)));
        assert!(embedding.is_transient());
    }
}
