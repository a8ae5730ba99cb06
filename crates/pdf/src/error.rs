use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to load PDF: {0}")]
    Load(#[source] lopdf::Error),
    #[error("encrypted PDF is not supported")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
    #[error("page {page}: unreadable content stream: {message}")]
    Content { page: usize, message: String },
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Load(#[from] ExtractError),
    #[error("page {page}: {message}")]
    Page { page: usize, message: String },
    #[error("failed to write PDF: {0}")]
    Save(String),
}
