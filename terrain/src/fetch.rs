//! Tile byte sources.

use crate::TerrainError;
use log::{debug, warn};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use terrain_rgb::TileKey;

/// Fetches the encoded bytes of a single tile.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, key: TileKey) -> Result<Vec<u8>, TerrainError>;
}

impl<F> TileFetcher for F
where
    F: Fn(TileKey) -> Result<Vec<u8>, TerrainError> + Send + Sync,
{
    fn fetch(&self, key: TileKey) -> Result<Vec<u8>, TerrainError> {
        self(key)
    }
}

/// Fetches tiles over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::blocking::Client,

    /// URL containing `{z}`, `{x}` and `{y}` placeholders.
    url_template: String,

    /// Additional attempts after the first failed request.
    retries: u32,
}

impl HttpFetcher {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_RETRIES: u32 = 2;

    pub fn new(url_template: impl Into<String>) -> Result<Self, TerrainError> {
        Self::with_options(url_template, Self::DEFAULT_TIMEOUT, Self::DEFAULT_RETRIES)
    }

    pub fn with_options(
        url_template: impl Into<String>,
        timeout: Duration,
        retries: u32,
    ) -> Result<Self, TerrainError> {
        let url_template = url_template.into();
        check_template(&url_template)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url_template,
            retries,
        })
    }

    pub fn url(&self, key: TileKey) -> String {
        render(&self.url_template, key)
    }

    fn get(&self, url: &str, key: TileKey) -> Result<Vec<u8>, TerrainError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TerrainError::Status {
                key,
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

impl TileFetcher for HttpFetcher {
    fn fetch(&self, key: TileKey) -> Result<Vec<u8>, TerrainError> {
        let url = self.url(key);
        let mut attempt = 0;
        loop {
            debug!("GET {url}");
            match self.get(&url, key) {
                Ok(bytes) => return Ok(bytes),
                // A missing tile will stay missing.
                Err(TerrainError::Status { status: 404, .. }) => {
                    return Err(TerrainError::MissingTile(key))
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("fetching {key} failed, attempt {attempt}: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Reads tiles from a local directory tree.
pub struct DirFetcher {
    root: PathBuf,

    /// Path relative to `root` containing `{z}`, `{x}` and `{y}`
    /// placeholders.
    path_template: String,
}

impl DirFetcher {
    pub const DEFAULT_TEMPLATE: &'static str = "{z}/{x}/{y}.png";

    pub fn new(root: PathBuf) -> Result<Self, TerrainError> {
        Self::with_template(root, Self::DEFAULT_TEMPLATE)
    }

    pub fn with_template(
        root: PathBuf,
        path_template: impl Into<String>,
    ) -> Result<Self, TerrainError> {
        let path_template = path_template.into();
        check_template(&path_template)?;
        // Let's try to fail early by checking that root is a
        // readable directory.
        if !root.is_dir() {
            return Err(TerrainError::Path(root));
        }
        Ok(Self {
            root,
            path_template,
        })
    }

    pub fn path(&self, key: TileKey) -> PathBuf {
        self.root.join(Path::new(&render(&self.path_template, key)))
    }
}

impl TileFetcher for DirFetcher {
    fn fetch(&self, key: TileKey) -> Result<Vec<u8>, TerrainError> {
        let path = self.path(key);
        debug!("reading {path:?}");
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TerrainError::MissingTile(key)),
            Err(e) => Err(e.into()),
        }
    }
}

fn render(template: &str, TileKey { zoom, x, y }: TileKey) -> String {
    template
        .replace("{z}", &zoom.to_string())
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
}

fn check_template(template: &str) -> Result<(), TerrainError> {
    if ["{z}", "{x}", "{y}"].iter().all(|p| template.contains(p)) {
        Ok(())
    } else {
        Err(TerrainError::UrlTemplate(template.to_owned()))
    }
}
