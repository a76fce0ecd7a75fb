use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Invalid .npy container: {0}")]
    Format(String),

    #[error("Unsupported dtype: {0}")]
    UnsupportedDtype(String),

    #[error("Invalid shape: {0}")]
    Shape(String),

    #[error("Truncated payload: {required} bytes required, {available} available")]
    TruncatedBuffer { required: usize, available: usize },

    #[error("Volume has no scalars")]
    EmptyVolume,

    #[error("Render container is missing or not attached")]
    MissingContainer,

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl From<reqwest::Error> for ViewerError {
    fn from(error: reqwest::Error) -> Self {
        ViewerError::Network(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
