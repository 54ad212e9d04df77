//! # Degrees of freedom estimator
//!
//! Maps the wavefront measurements at the wavefront sensing fields into an estimate of the
//! degrees of freedom (DOF) correction with the pseudo-inverse of the [SensitivityModel]
//! and gives the residual wavefront after the correction.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::{error::ShapeError, MaskFilter, SensitivityModel};

mod config;
pub use config::{EstimatorConfig, EstimatorStrategy};

/// DOF estimate and residual wavefront
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// DOF estimate, zero for the DOFs excluded by the selection mask
    pub xhat: Vec<f64>,
    /// wavefront left after applying the correction, same shape as the measurement
    pub residual: Vec<f64>,
    /// measurement minus the intrinsic aberration
    pub corrected: Vec<f64>,
}

impl Estimate {
    /// Returns the RMS of the residual wavefront
    pub fn residual_rms(&self) -> f64 {
        if self.residual.is_empty() {
            return 0f64;
        }
        (self.residual.iter().map(|x| x * x).sum::<f64>() / self.residual.len() as f64).sqrt()
    }
}

/// DOF estimator
///
/// Borrows the sensitivity model read-only, every estimate depends only on its inputs
#[derive(Debug, Clone, Copy)]
pub struct Estimator<'a> {
    model: &'a SensitivityModel,
}

impl SensitivityModel {
    /// Returns an [Estimator] borrowing the model
    pub fn estimator(&self) -> Estimator<'_> {
        Estimator::new(self)
    }
}

impl<'a> Estimator<'a> {
    pub fn new(model: &'a SensitivityModel) -> Self {
        Self { model }
    }
    /// Estimates the DOF correction
    ///
    /// The `measurement` is ordered like the rows of the sensitivity matrix, position-major,
    /// and is either the full set of wavefront modes at the 4 wavefront sensing fields or
    /// only the selected ones.
    /// The intrinsic aberration is given with the same ordering and length as the measurement.
    ///
    /// For a full length measurement, the rows that are not selected pass through to the residual unchanged.
    pub fn estimate(&self, measurement: &[f64], intrinsic: &[f64]) -> Result<Estimate, ShapeError> {
        let n_full = self.model.n_row();
        let n_masked = self.model.n_masked_row();
        let full = match measurement.len() {
            n if n == n_full => true,
            n if n == n_masked => false,
            n => {
                return Err(ShapeError::Length {
                    what: "wavefront measurement",
                    expected: n_full,
                    found: n,
                })
            }
        };
        if intrinsic.len() != measurement.len() {
            return Err(ShapeError::Length {
                what: "intrinsic aberration",
                expected: measurement.len(),
                found: intrinsic.len(),
            });
        }

        let corrected: Vec<f64> = measurement
            .iter()
            .zip(intrinsic)
            .map(|(y, y0)| y - y0)
            .collect();
        let row_mask = self.model.row_mask();
        let y = if full {
            DVector::from_iterator(n_masked, row_mask.filter(corrected.iter()).copied())
        } else {
            DVector::from_column_slice(&corrected)
        };

        let x = self.model.a_inv() * &y;
        let xhat = self.model.comp_idx().unmask(x.iter().copied());

        let correction = self.model.a_norm() * &x;
        let mut residual = corrected.clone();
        if full {
            row_mask
                .indices()
                .zip(correction.iter())
                .for_each(|(i, c)| residual[i] -= c);
        } else {
            residual
                .iter_mut()
                .zip(correction.iter())
                .for_each(|(r, c)| *r -= c);
        }

        Ok(Estimate {
            xhat,
            residual,
            corrected,
        })
    }
}
