/// Failures talking to the inference service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("{0}")]
    Request(String),
    #[error("invalid JSON: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Connect(e.to_string())
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Http {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}
