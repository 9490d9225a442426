use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerrainRgbError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid tile image: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid tile dimensions {0}x{1}, expected {2}x{2}")]
    Dimensions(u32, u32, u32),

    #[error("tile image has {0} channels, expected at least 3")]
    Channels(u8),

    #[error("invalid grid dimensions {0}x{1}")]
    GridDimensions(i32, i32),

    #[error("invalid grid layout, expected {expected} samples, got {actual}")]
    Layout { expected: usize, actual: usize },
}
