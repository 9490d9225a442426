//! Conversion between Terrain-RGB images and [`ElevationGrid`]s.

use crate::{ElevationGrid, TerrainRgbError, TILE_SIZE};
use image::{GenericImageView, ImageFormat, RgbImage};
use std::io::Cursor;

const BASE_M: f64 = -10_000.0;
const STEP_M: f64 = 0.1;
const MAX_CODE: f64 = 16_777_215.0;

/// Decodes a Terrain-RGB tile payload into an elevation grid.
///
/// The payload must be a `TILE_SIZE` x `TILE_SIZE` image with at
/// least three color channels. Any extra (alpha) channel is ignored.
pub fn decode(bytes: &[u8]) -> Result<ElevationGrid, TerrainRgbError> {
    let img = image::load_from_memory(bytes)?;
    let channels = img.color().channel_count();
    if channels < 3 {
        return Err(TerrainRgbError::Channels(channels));
    }
    let (width, height) = img.dimensions();
    if (width, height) != (TILE_SIZE, TILE_SIZE) {
        return Err(TerrainRgbError::Dimensions(width, height, TILE_SIZE));
    }
    let samples = img
        .to_rgb8()
        .into_raw()
        .chunks_exact(3)
        .map(|px| rgb_to_elevation(px[0], px[1], px[2]))
        .collect();
    ElevationGrid::new(width, height, samples)
}

/// Encodes `grid` as a Terrain-RGB PNG.
///
/// Elevations are rounded to the nearest 0.1 m and clamped to the
/// range the encoding can represent.
pub fn encode_png(grid: &ElevationGrid) -> Result<Vec<u8>, TerrainRgbError> {
    let raw: Vec<u8> = grid
        .samples()
        .iter()
        .flat_map(|elevation| elevation_to_rgb(*elevation))
        .collect();
    let actual = raw.len();
    let img = RgbImage::from_raw(grid.width(), grid.height(), raw).ok_or(
        TerrainRgbError::Layout {
            expected: grid.len() * 3,
            actual,
        },
    )?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

#[allow(clippy::cast_possible_truncation)]
fn rgb_to_elevation(r: u8, g: u8, b: u8) -> f32 {
    let code = u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b);
    (BASE_M + f64::from(code) * STEP_M) as f32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn elevation_to_rgb(elevation: f32) -> [u8; 3] {
    let code = ((f64::from(elevation) - BASE_M) / STEP_M)
        .round()
        .clamp(0.0, MAX_CODE) as u32;
    [(code >> 16) as u8, (code >> 8) as u8, code as u8]
}
