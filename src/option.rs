use std::time::Duration;

/// Connection options for a [`crate::DataContext`].
///
/// Consumed by transport implementations; the change-tracking core itself
/// only reads the dataset name for log correlation.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub(crate) endpoint: String,
    pub(crate) dataset: String,
    pub(crate) token: Option<String>,
    pub(crate) request_timeout: Duration,
}

impl ClientOptions {
    /// Options for `dataset` served at `endpoint`, with defaults elsewhere.
    pub fn new(endpoint: impl Into<String>, dataset: impl Into<String>) -> Self {
        ClientOptions {
            endpoint: endpoint.into(),
            dataset: dataset.into(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Bearer token presented by the transport.
    pub fn token(self, token: impl Into<String>) -> Self {
        ClientOptions {
            token: Some(token.into()),
            ..self
        }
    }

    /// Per-request timeout enforced by the transport.
    pub fn request_timeout(self, request_timeout: Duration) -> Self {
        ClientOptions {
            request_timeout,
            ..self
        }
    }

    /// Service endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Dataset name.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Bearer token, when configured.
    pub fn auth_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.request_timeout
    }
}
