pub type CanopyResult<T> = Result<T, CanopyError>;

#[derive(thiserror::Error, Debug)]
pub enum CanopyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("draw error: {0}")]
    Draw(String),

    #[error("data error: {0}")]
    Data(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CanopyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn draw(msg: impl Into<String>) -> Self {
        Self::Draw(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }
}
