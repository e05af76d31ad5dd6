use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} rejected the message: {message}")]
    Rejected { backend: String, message: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;
