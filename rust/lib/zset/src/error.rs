use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZSetError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Map any backend error into [`ZSetError::Storage`].
pub(crate) fn storage<E: std::fmt::Display>(e: E) -> ZSetError {
    ZSetError::Storage(e.to_string())
}
