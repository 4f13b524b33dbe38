use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected backend response: {0}")]
    Decode(String),
}
