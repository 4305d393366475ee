use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unable to decode image: {0}")]
    DecodeError(String),

    #[error("Unable to encode preview: {0}")]
    EncodeError(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(u32, u32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        AnalysisError::DecodeError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
