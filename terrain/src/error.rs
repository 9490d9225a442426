use std::path::PathBuf;
use terrain_rgb::{TerrainRgbError, TileKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerrainError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("not a tile directory {0}")]
    Path(PathBuf),

    #[error("{0}")]
    TerrainRgb(#[from] TerrainRgbError),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} fetching tile {key}")]
    Status { key: TileKey, status: u16 },

    #[error("no source data for tile {0}")]
    MissingTile(TileKey),

    #[error("tile {0} failed to load recently")]
    RecentlyFailed(TileKey),

    #[error("invalid url template {0:?}, expected {{z}}, {{x}} and {{y}}")]
    UrlTemplate(String),
}
