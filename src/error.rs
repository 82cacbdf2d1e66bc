use thiserror::Error;

/// Failure of a single pipeline stage
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unrecognized video reference: {0}")]
    Unrecognized(String),

    #[error("short link did not redirect to a video: {0}")]
    Redirect(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("provider returned code={code}, message={message}")]
    Api { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("captions require login (check the session cookie)")]
    LoginRequired,

    #[error("video has no captions")]
    NoCaptions,

    #[error("caption body is empty")]
    EmptyCaptions,

    #[error("completion is empty")]
    EmptyCompletion,

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl FetchError {
    /// Build an `HttpStatus` error from a non-success response, consuming its body
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        FetchError::HttpStatus { status, body }
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
