use crate::{TerrainRgbError, TILE_SIZE};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::{io::Read, mem::size_of, sync::OnceLock};

/// A dense, row-major grid of elevation samples (meters).
///
/// Grids are immutable once built and are shared between threads
/// behind an `Arc`.
#[derive(Debug)]
pub struct ElevationGrid {
    width: u32,
    height: u32,

    /// Row-major samples, row 0 is the northern edge.
    samples: Box<[f32]>,

    /// Lowest and highest sample, computed on first use.
    extremes: OnceLock<(f32, f32)>,
}

impl ElevationGrid {
    /// Largest sample count accepted from a persisted header, one full
    /// tile.
    pub const MAX_PERSISTED_LEN: usize = TILE_SIZE as usize * TILE_SIZE as usize;

    /// Returns a grid wrapping `samples`.
    pub fn new(width: u32, height: u32, samples: Vec<f32>) -> Result<Self, TerrainRgbError> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(TerrainRgbError::Layout {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples: samples.into_boxed_slice(),
            extremes: OnceLock::new(),
        })
    }

    /// Returns a `size` x `size` grid where every sample is `elevation`.
    pub fn filled(size: u32, elevation: f32) -> Self {
        let samples = vec![elevation; size as usize * size as usize].into_boxed_slice();
        Self {
            width: size,
            height: size,
            samples,
            extremes: OnceLock::new(),
        }
    }

    /// Returns a `size` x `size` grid sampled from `f(x, y)`.
    pub fn from_fn(size: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut samples = Vec::with_capacity(size as usize * size as usize);
        for y in 0..size {
            for x in 0..size {
                samples.push(f(x, y));
            }
        }
        Self {
            width: size,
            height: size,
            samples: samples.into_boxed_slice(),
            extremes: OnceLock::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the number of samples in this grid.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns the size of this grid's samples in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.samples.len() * size_of::<f32>()
    }

    /// Returns the lowest elevation sample in this grid.
    pub fn min(&self) -> f32 {
        self.extremes().0
    }

    /// Returns the highest elevation sample in this grid.
    pub fn max(&self) -> f32 {
        self.extremes().1
    }

    /// Returns the raw sample at `(x, y)`.
    ///
    /// Out of range indices return `0.0` rather than failing.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn elevation(&self, x: i64, y: i64) -> f32 {
        if (0..i64::from(self.width)).contains(&x) && (0..i64::from(self.height)).contains(&y) {
            self.get_xy(x as u32, y as u32)
        } else {
            0.0
        }
    }

    /// Returns the bilinear interpolation of the four samples around
    /// fractional pixel position `(x, y)`.
    ///
    /// Neighbors are clamped to the grid, so positions past an edge
    /// take that edge's value.
    pub fn interpolated_elevation(&self, x: f64, y: f64) -> f32 {
        let (x0, x1) = self.neighbors(x, self.width);
        let (y0, y1) = self.neighbors(y, self.height);
        let fx = (x - x.floor()) as f32;
        let fy = (y - y.floor()) as f32;

        let top = lerp(self.get_xy(x0, y0), self.get_xy(x1, y0), fx);
        let bottom = lerp(self.get_xy(x0, y1), self.get_xy(x1, y1), fx);
        lerp(top, bottom, fy)
    }

    /// Reads a grid persisted by [`ElevationGrid::write`].
    ///
    /// Layout, little endian:
    ///
    /// ```text
    /// [width: i32][height: i32][width * height f32 samples, row-major]
    /// ```
    ///
    /// Headers describing more than [`ElevationGrid::MAX_PERSISTED_LEN`]
    /// samples are rejected before anything is allocated.
    pub fn read<R: Read>(mut rdr: R) -> Result<Self, TerrainRgbError> {
        let (width, height, len) = Self::read_header(&mut rdr)?;
        let mut samples = vec![0.0_f32; len];
        rdr.read_f32_into::<LE>(&mut samples)?;
        Self::new(width, height, samples)
    }

    /// Writes this grid in the layout [`ElevationGrid::read`] expects.
    #[allow(clippy::cast_possible_wrap)]
    pub fn write<W: std::io::Write>(&self, mut wtr: W) -> Result<(), TerrainRgbError> {
        wtr.write_i32::<LE>(self.width as i32)?;
        wtr.write_i32::<LE>(self.height as i32)?;
        for sample in self.samples.iter() {
            wtr.write_f32::<LE>(*sample)?;
        }
        Ok(())
    }

    /// Returns this grid serialized with [`ElevationGrid::write`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 * size_of::<i32>() + self.size_in_bytes());
        self.write(&mut buf).expect("writing to a Vec can not fail");
        buf
    }

    /// Parses bytes produced by [`ElevationGrid::to_bytes`].
    ///
    /// The payload must hold exactly the number of samples its header
    /// announces.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TerrainRgbError> {
        let mut rdr = bytes;
        let (width, height, len) = Self::read_header(&mut rdr)?;
        let actual = rdr.len() / size_of::<f32>();
        if rdr.len() != len * size_of::<f32>() {
            return Err(TerrainRgbError::Layout {
                expected: len,
                actual,
            });
        }
        let mut samples = vec![0.0_f32; len];
        rdr.read_f32_into::<LE>(&mut samples)?;
        Self::new(width, height, samples)
    }
}

/// Private API
impl ElevationGrid {
    /// Reads and validates `[width][height]`, returning the sample
    /// count they describe.
    fn read_header<R: Read>(rdr: &mut R) -> Result<(u32, u32, usize), TerrainRgbError> {
        let width = rdr.read_i32::<LE>()?;
        let height = rdr.read_i32::<LE>()?;
        let dims = u32::try_from(width).ok().zip(u32::try_from(height).ok());
        let len = dims
            .and_then(|(w, h)| (w as usize).checked_mul(h as usize))
            .filter(|len| *len <= Self::MAX_PERSISTED_LEN);
        match (dims, len) {
            (Some((w, h)), Some(len)) => Ok((w, h, len)),
            _ => Err(TerrainRgbError::GridDimensions(width, height)),
        }
    }

    fn get_xy(&self, x: u32, y: u32) -> f32 {
        self.samples[y as usize * self.width as usize + x as usize]
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn neighbors(&self, t: f64, len: u32) -> (u32, u32) {
        let max = f64::from(len.saturating_sub(1));
        let lo = t.floor().clamp(0.0, max) as u32;
        let hi = t.ceil().clamp(0.0, max) as u32;
        (lo, hi)
    }

    fn extremes(&self) -> (f32, f32) {
        *self.extremes.get_or_init(|| {
            self.samples
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
                    (lo.min(*s), hi.max(*s))
                })
        })
    }
}

impl PartialEq for ElevationGrid {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.samples == other.samples
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::ElevationGrid;
    use crate::TerrainRgbError;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn ramp() -> ElevationGrid {
        ElevationGrid::from_fn(4, |x, y| (x + 10 * y) as f32)
    }

    #[test]
    fn test_raw_sample() {
        let grid = ramp();
        assert_eq!(grid.elevation(0, 0), 0.0);
        assert_eq!(grid.elevation(3, 2), 23.0);
    }

    #[test]
    fn test_out_of_range_sample_is_zero() {
        let grid = ElevationGrid::filled(4, 100.0);
        assert_eq!(grid.elevation(-1, 0), 0.0);
        assert_eq!(grid.elevation(0, 4), 0.0);
        assert_eq!(grid.elevation(4, 4), 0.0);
    }

    #[test]
    fn test_interpolation() {
        let grid = ramp();
        assert_relative_eq!(grid.interpolated_elevation(1.0, 1.0), 11.0);
        assert_relative_eq!(grid.interpolated_elevation(1.5, 0.0), 1.5);
        assert_relative_eq!(grid.interpolated_elevation(0.0, 0.5), 5.0);
        assert_relative_eq!(grid.interpolated_elevation(2.25, 1.5), 17.25);
    }

    #[test]
    fn test_interpolation_clamps_at_edges() {
        let grid = ramp();
        assert_relative_eq!(grid.interpolated_elevation(3.5, 3.0), 33.0);
        assert_relative_eq!(grid.interpolated_elevation(-0.5, 0.0), 0.0);
    }

    #[test]
    fn test_min_max() {
        let grid = ramp();
        assert_eq!(grid.min(), 0.0);
        assert_eq!(grid.max(), 33.0);
    }

    #[test]
    fn test_layout() {
        let grid = ElevationGrid::new(2, 1, vec![1.5, -2.0]).unwrap();
        let bytes = grid.to_bytes();
        assert_eq!(
            bytes,
            [
                2, 0, 0, 0, // width
                1, 0, 0, 0, // height
                0, 0, 0xc0, 0x3f, // 1.5
                0, 0, 0, 0xc0, // -2.0
            ]
        );
        assert_eq!(ElevationGrid::from_bytes(&bytes).unwrap(), grid);
    }

    #[test]
    fn test_truncated_layout_fails() {
        let bytes = ramp().to_bytes();
        assert!(matches!(
            ElevationGrid::from_bytes(&bytes[..bytes.len() - 1]),
            Err(TerrainRgbError::Layout {
                expected: 16,
                actual: 15
            })
        ));
        assert!(matches!(
            ElevationGrid::read(&bytes[..bytes.len() - 1]),
            Err(TerrainRgbError::Io(_))
        ));
        assert!(matches!(
            ElevationGrid::from_bytes(&[4, 0, 0]),
            Err(TerrainRgbError::Io(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_fail() {
        let mut bytes = ramp().to_bytes();
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(
            ElevationGrid::from_bytes(&bytes),
            Err(TerrainRgbError::Layout { .. })
        ));
    }

    #[test]
    fn test_oversized_header_fails_without_allocating() {
        let huge = [0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff, 0x7f];
        assert!(matches!(
            ElevationGrid::from_bytes(&huge),
            Err(TerrainRgbError::GridDimensions(i32::MAX, i32::MAX))
        ));
        assert!(matches!(
            ElevationGrid::read(&huge[..]),
            Err(TerrainRgbError::GridDimensions(i32::MAX, i32::MAX))
        ));
        // One past a full tile.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&513_i32.to_le_bytes());
        bytes.extend_from_slice(&512_i32.to_le_bytes());
        assert!(matches!(
            ElevationGrid::from_bytes(&bytes),
            Err(TerrainRgbError::GridDimensions(513, 512))
        ));
        assert!(matches!(
            ElevationGrid::from_bytes(&[0xff, 0xff, 0xff, 0xff, 1, 0, 0, 0]),
            Err(TerrainRgbError::GridDimensions(-1, 1))
        ));
    }

    #[test]
    fn test_sample_count_mismatch() {
        assert!(matches!(
            ElevationGrid::new(2, 2, vec![0.0; 3]),
            Err(TerrainRgbError::Layout {
                expected: 4,
                actual: 3
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_interpolation_is_bounded(
            samples in proptest::collection::vec(-500.0_f32..9000.0, 16),
            x in 0.0_f64..3.0,
            y in 0.0_f64..3.0,
        ) {
            let grid = ElevationGrid::new(4, 4, samples).unwrap();
            let (x0, y0) = (x.floor() as i64, y.floor() as i64);
            let (x1, y1) = (x.ceil() as i64, y.ceil() as i64);
            let corners = [
                grid.elevation(x0, y0),
                grid.elevation(x1, y0),
                grid.elevation(x0, y1),
                grid.elevation(x1, y1),
            ];
            let lo = corners.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = corners.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let value = grid.interpolated_elevation(x, y);
            let slop = 1e-3;
            prop_assert!(lo - slop <= value && value <= hi + slop);
        }
    }
}
