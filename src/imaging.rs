//! # Detector frames and stamps
//!
//! A [Frame] is the image of a wavefront sensor detector (or half detector) with the
//! atmosphere header of the simulation.
//! The [StampExtractor] cuts out of a frame a square [Stamp] centered on the defocused image.

use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ArtifactError, ExtractionError},
    utilities::artifact,
    Centroid,
};

/// Number of atmosphere layers in the frame header
pub const N_LAYER: usize = 7;

/// Atmosphere layer header
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AtmosphereLayer {
    /// seeing in arcsec
    pub seeing: f64,
    /// outer scale in meter
    pub outer_scale: f64,
    /// wind speed in m/s
    pub wind_speed: f64,
    /// wind direction in degree
    pub wind_direction: f64,
}

/// Detector frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub image: DMatrix<f64>,
    pub atmosphere: Vec<AtmosphereLayer>,
}

impl Frame {
    pub fn new(image: DMatrix<f64>) -> Self {
        Self {
            image,
            atmosphere: vec![],
        }
    }
    /// Sets the atmosphere header
    pub fn atmosphere(self, atmosphere: Vec<AtmosphereLayer>) -> Self {
        Self { atmosphere, ..self }
    }
    /// Loads a frame from a pickle file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        artifact::load(path)
    }
    /// Saves the frame into a pickle file
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        artifact::dump(self, path)
    }
    /// Writes the atmosphere header into a text table
    ///
    /// ```text
    /// Layer#   seeing   L0   wind_v   wind_dir
    /// ```
    pub fn write_atmosphere<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let mut table = String::from("Layer# \t seeing \t L0 \t\t wind_v \t wind_dir\n");
        table.extend(self.atmosphere.iter().enumerate().map(|(i, layer)| {
            format!(
                "{} \t {:.6} \t {:.5} \t {:.6} \t {:.6}\n",
                i, layer.seeing, layer.outer_scale, layer.wind_speed, layer.wind_direction
            )
        }));
        if self.atmosphere.len() != N_LAYER {
            log::warn!(
                "atmosphere header with {} layers instead of {}",
                self.atmosphere.len(),
                N_LAYER
            );
        }
        artifact::overwrite(path, table.as_bytes())
    }
}

/// Square image cut out of a frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub image: DMatrix<f64>,
    /// centroid in the frame pixel coordinates
    pub centroid: Centroid,
    /// (column, row) offset of the centroid with respect to the approximate location
    pub offset: (f64, f64),
}

impl Stamp {
    /// Rotates the stamp by `quarter_turns` x 90 degrees
    ///
    /// The rotation is given in image coordinates (row #0 at the bottom),
    /// it is the flipud-rot90-flipud sequence of the array, i.e. the array is turned clockwise
    pub fn rotate(self, quarter_turns: u8) -> Self {
        let image = (0..quarter_turns % 4).fold(self.image, |image, _| turn(&image));
        Self { image, ..self }
    }
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        artifact::load(path)
    }
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        artifact::dump(self, path)
    }
}

/// Turns an array clockwise
fn turn(image: &DMatrix<f64>) -> DMatrix<f64> {
    let (n_row, n_col) = image.shape();
    DMatrix::from_fn(n_col, n_row, |i, j| image[(n_row - 1 - j, i)])
}

/// Stamp extractor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampExtractor {
    /// stamp size in pixel
    pub size: usize,
}
impl Default for StampExtractor {
    fn default() -> Self {
        Self { size: 128 }
    }
}

impl StampExtractor {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
    /// Extracts the stamp centered on the image near the pixel (`x`,`y`)
    ///
    /// `x` is the column and `y` is the row.
    /// The centroid is computed in a window 4 times the stamp size centered on (`x`,`y`),
    /// clipped to the frame.
    pub fn extract(&self, frame: &DMatrix<f64>, x: f64, y: f64) -> Result<Stamp, ExtractionError> {
        let (n_row, n_col) = frame.shape();
        let size = self.size as i64;
        let (px, py) = (x.trunc() as i64, y.trunc() as i64);

        let clip = |p: i64, n: usize| ((p - 2 * size).max(0), (p + 2 * size).min(n as i64));
        let (r0, r1) = clip(py, n_row);
        let (c0, c1) = clip(px, n_col);
        if r0 >= r1 || c0 >= c1 {
            return Err(ExtractionError::OutOfBounds {
                row: py - 2 * size,
                col: px - 2 * size,
                size: 4 * self.size,
                n_row,
                n_col,
            });
        }
        let (rows, cols) = ((r1 - r0) as usize, (c1 - c0) as usize);
        let window = frame.view((r0 as usize, c0 as usize), (rows, cols));
        let centroid = Centroid::new(window).ok_or(ExtractionError::NoFlux { rows, cols })?;

        // offset from the window center, corrected by the amount the window is clipped on the low edges
        let mut offset_row = centroid.row - 2. * size as f64;
        let mut offset_col = centroid.col - 2. * size as f64;
        if py - 2 * size < 0 {
            offset_row -= (py - 2 * size) as f64;
        }
        if px - 2 * size < 0 {
            offset_col -= (px - 2 * size) as f64;
        }

        let half = 0.5 * self.size as f64;
        let row = (py as f64 - half + offset_row).floor() as i64;
        let col = (px as f64 - half + offset_col).floor() as i64;
        log::debug!(
            "px = {}, py = {}, offsetx = {:.2}, offsety = {:.2}",
            px,
            py,
            offset_col,
            offset_row
        );
        if row < 0 || col < 0 || row + size > n_row as i64 || col + size > n_col as i64 {
            return Err(ExtractionError::OutOfBounds {
                row,
                col,
                size: self.size,
                n_row,
                n_col,
            });
        }
        Ok(Stamp {
            image: frame
                .view((row as usize, col as usize), (self.size, self.size))
                .into_owned(),
            centroid: Centroid {
                row: r0 as f64 + centroid.row,
                col: c0 as f64 + centroid.col,
                flux: centroid.flux,
            },
            offset: (offset_col, offset_row),
        })
    }
}
