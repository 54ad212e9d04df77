//! # Wavefront measurements
//!
//! Zernike coefficient tables and the measurement and intrinsic aberration vectors
//! fed to the [Estimator](crate::Estimator).
//! Vectors are ordered position-major: `(field #0, Z4), (field #0, Z5), ..., (field #1, Z4), ...`

use std::{
    ops::{Deref, Sub},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::ShapeError, utilities::artifact};

/// Reference wavelength of the intrinsic aberration table in micron
pub const REFERENCE_WAVELENGTH: f64 = 0.5;

/// Table of Zernike coefficients
///
/// One row per field point, one column per Zernike term starting at Z1
/// (or at Z4 for the curvature sensing coefficient files)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZernikeTable {
    rows: Vec<Vec<f64>>,
}

impl ZernikeTable {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }
    /// Loads a whitespace separated table
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Ok(Self {
            rows: artifact::read_table(path)?,
        })
    }
    pub fn n_row(&self) -> usize {
        self.rows.len()
    }
    /// Smallest number of columns over all the rows
    pub fn n_col(&self) -> usize {
        self.rows.iter().map(|row| row.len()).min().unwrap_or_default()
    }
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
    /// Returns the table restricted to the rows `rows` and the columns `cols`, row-major
    pub fn block(
        &self,
        what: &'static str,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> Result<Vec<f64>, ShapeError> {
        if rows.end > self.n_row() || cols.end > self.n_col() {
            return Err(ShapeError::Table {
                what,
                expected: rows.end,
                expected_cols: cols.end,
                found: self.n_row(),
                found_cols: self.n_col(),
            });
        }
        Ok(self.rows[rows]
            .iter()
            .flat_map(|row| row[cols.clone()].iter().copied())
            .collect())
    }
    /// Scales all the coefficients by `factor`
    pub fn scale(mut self, factor: f64) -> Self {
        self.rows
            .iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|x| *x *= factor);
        self
    }
}

/// Wavefront measurement vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement(Vec<f64>);

impl Deref for Measurement {
    type Target = [f64];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<Vec<f64>> for Measurement {
    fn from(value: Vec<f64>) -> Self {
        Self(value)
    }
}
impl From<Measurement> for Vec<f64> {
    fn from(value: Measurement) -> Self {
        value.0
    }
}
impl Sub<&IntrinsicAberration> for &Measurement {
    type Output = Measurement;

    fn sub(self, rhs: &IntrinsicAberration) -> Self::Output {
        Measurement(self.0.iter().zip(rhs.iter()).map(|(y, y0)| y - y0).collect())
    }
}

impl Measurement {
    /// Measurement from a full Zernike table (Z1 first)
    ///
    /// Keeps the last `n_position` rows and the Zernike terms Z4 to Z`zn_max`
    pub fn from_zernike_table(
        table: &ZernikeTable,
        zn_max: usize,
        n_position: usize,
    ) -> Result<Self, ShapeError> {
        let n_row = table.n_row();
        if n_position > n_row {
            return Err(ShapeError::Table {
                what: "Zernike table",
                expected: n_position,
                expected_cols: zn_max,
                found: n_row,
                found_cols: table.n_col(),
            });
        }
        table
            .block("Zernike table", n_row - n_position..n_row, 3..zn_max)
            .map(Self)
    }
    /// Measurement from a curvature sensing coefficient table (Z4 first)
    ///
    /// Keeps the first `n_mode` coefficients of each row, the diagnostic column is discarded
    pub fn from_coefficient_table(table: &ZernikeTable, n_mode: usize) -> Result<Self, ShapeError> {
        table
            .block("coefficient table", 0..table.n_row(), 0..n_mode)
            .map(Self)
    }
    /// Averages several measurements, like the exposures of the same iteration
    pub fn mean<'a>(measurements: impl IntoIterator<Item = &'a Measurement>) -> Result<Self, ShapeError> {
        let mut n = 0usize;
        let mut sum: Vec<f64> = vec![];
        for m in measurements {
            if n == 0 {
                sum = m.0.clone();
            } else {
                if m.len() != sum.len() {
                    return Err(ShapeError::Length {
                        what: "averaged measurement",
                        expected: sum.len(),
                        found: m.len(),
                    });
                }
                sum.iter_mut().zip(m.iter()).for_each(|(s, x)| *s += x);
            }
            n += 1;
        }
        if n > 1 {
            sum.iter_mut().for_each(|s| *s /= n as f64);
        }
        Ok(Self(sum))
    }
}

/// Intrinsic aberration of the instrument at the wavefront sensing fields in micron
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicAberration(Vec<f64>);

impl Deref for IntrinsicAberration {
    type Target = [f64];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<Vec<f64>> for IntrinsicAberration {
    fn from(value: Vec<f64>) -> Self {
        Self(value)
    }
}

impl IntrinsicAberration {
    /// Intrinsic aberration file name of the observing band
    ///
    /// The default file is given at the reference wavelength,
    /// any other wavelength uses the file of the band `intrinsic_zn_<BAND>.txt`
    pub fn file_name(band: &str, wavelength: f64) -> PathBuf {
        if (wavelength - REFERENCE_WAVELENGTH).abs() > 1e-3 {
            format!("intrinsic_zn_{}.txt", band.to_uppercase()).into()
        } else {
            "intrinsic_zn.txt".into()
        }
    }
    /// Loads the intrinsic aberration of the `n_wfs` wavefront sensors
    ///
    /// The table is in waves and is scaled by the `wavelength` in micron,
    /// the wavefront sensors are the last `n_wfs` rows
    pub fn load<P: AsRef<Path>>(
        path: P,
        n_wfs: usize,
        zn_max: usize,
        wavelength: f64,
    ) -> crate::Result<Self> {
        let table = ZernikeTable::load(&path)?.scale(wavelength);
        let Measurement(data) = Measurement::from_zernike_table(&table, zn_max, n_wfs)?;
        log::info!(
            "intrinsic aberration: {} values from {:?}",
            data.len(),
            path.as_ref()
        );
        Ok(Self(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ZernikeTable {
        ZernikeTable::new(
            (0..6)
                .map(|i| (0..8).map(|j| (10 * i + j) as f64).collect())
                .collect(),
        )
    }

    #[test]
    fn zernike_table_measurement() -> anyhow::Result<()> {
        let m = Measurement::from_zernike_table(&table(), 6, 4)?;
        // Z4..Z6 of the rows #2 to #5
        assert_eq!(m.len(), 12);
        assert_eq!(&m[..3], &[23., 24., 25.]);
        assert_eq!(m[11], 55.);
        assert!(Measurement::from_zernike_table(&table(), 9, 4).is_err());
        assert!(Measurement::from_zernike_table(&table(), 6, 7).is_err());
        Ok(())
    }

    #[test]
    fn coefficient_table_measurement() -> anyhow::Result<()> {
        let m = Measurement::from_coefficient_table(&table(), 2)?;
        assert_eq!(m.len(), 12);
        assert_eq!(&m[2..4], &[10., 11.]);
        Ok(())
    }

    #[test]
    fn mean_of_exposures() -> anyhow::Result<()> {
        let a = Measurement::from(vec![1., 2.]);
        let b = Measurement::from(vec![3., 6.]);
        assert_eq!(Measurement::mean([&a, &b])?, Measurement::from(vec![2., 4.]));
        assert!(Measurement::mean([&a, &Measurement::from(vec![1.])]).is_err());
        Ok(())
    }

    #[test]
    fn intrinsic_file_name() {
        assert_eq!(
            IntrinsicAberration::file_name("r", 0.5),
            PathBuf::from("intrinsic_zn.txt")
        );
        assert_eq!(
            IntrinsicAberration::file_name("r", 0.622),
            PathBuf::from("intrinsic_zn_R.txt")
        );
    }

    #[test]
    fn load_intrinsic() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("intrinsic_zn.txt");
        let rows = table().rows;
        artifact::write_table(&path, rows.iter().map(|row| row.as_slice()))?;
        let intrinsic = IntrinsicAberration::load(&path, 4, 6, 0.5)?;
        assert_eq!(intrinsic.len(), 12);
        assert!((intrinsic[0] - 11.5).abs() < 1e-12);
        let corrected = &Measurement::from(vec![11.5; 12]) - &intrinsic;
        assert!(corrected[0].abs() < 1e-12);
        Ok(())
    }
}
