//! # Optical sensitivity model
//!
//! The sensitivity tensor gives the changes of the wavefront modes Z4 to Z`znmax`,
//! at a set of sample positions in the field, induced by a unit change of each
//! degree of freedom (M1M3 and M2 bending modes and rigid body motions).
//!
//! Only the last [N_BOUNDARY_POSITION] sample positions, the wavefront sensing fields at the
//! corners of the field of view, are used to build the sensitivity matrix `A`.
//! The rows of `A` are ordered position-major: `(position #0, Z4), (position #0, Z5), ...`

use std::{fmt::Display, path::Path};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    error::{NumericalError, ShapeError},
    utilities::artifact,
    FromBuilder, MaskFilter, SelectionMask,
};

mod builder;
mod pinv;

pub use builder::SensitivityModelBuilder;
pub use pinv::TruncatedPseudoInverse;

/// Number of sample positions at the boundary of the field used for wavefront sensing
pub const N_BOUNDARY_POSITION: usize = 4;

/// Sensitivity tensor indexed by (sample position, wavefront mode, DOF)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityTensor {
    data: Vec<f64>,
    n_position: usize,
    n_mode: usize,
    n_dof: usize,
}

impl Display for SensitivityTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sensitivity tensor: ({}, {}, {})",
            self.n_position, self.n_mode, self.n_dof
        )
    }
}

impl SensitivityTensor {
    /// Reshapes the flat `data` into a (_, `n_mode`, `n_dof`) tensor
    ///
    /// `data` is in row major order, the DOF index varying the fastest
    pub fn new(data: Vec<f64>, n_mode: usize, n_dof: usize) -> Result<Self, ShapeError> {
        let n = n_mode * n_dof;
        if n == 0 || data.is_empty() || data.len() % n != 0 {
            return Err(ShapeError::Tensor {
                len: data.len(),
                n_mode,
                n_dof,
            });
        }
        Ok(Self {
            n_position: data.len() / n,
            data,
            n_mode,
            n_dof,
        })
    }
    /// Loads the tensor from a numeric table
    pub fn load<P: AsRef<Path>>(path: P, n_mode: usize, n_dof: usize) -> crate::Result<Self> {
        let data: Vec<f64> = artifact::read_table(path)?.into_iter().flatten().collect();
        let tensor = Self::new(data, n_mode, n_dof)?;
        log::info!("{}", tensor);
        Ok(tensor)
    }
    /// Returns the tensor shape (sample position, wavefront mode, DOF)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_position, self.n_mode, self.n_dof)
    }
    /// Returns the sensitivity of `mode` at `position` to `dof`
    #[inline]
    pub fn get(&self, position: usize, mode: usize, dof: usize) -> f64 {
        self.data[(position * self.n_mode + mode) * self.n_dof + dof]
    }
    /// Returns the sensitivity matrix of the last `n` sample positions
    ///
    /// The matrix has `n x n_mode` rows ordered position-major and `n_dof` columns
    pub fn boundary(&self, n: usize) -> Result<DMatrix<f64>, ShapeError> {
        if n > self.n_position {
            return Err(ShapeError::Length {
                what: "sensitivity sample positions",
                expected: n,
                found: self.n_position,
            });
        }
        let p0 = self.n_position - n;
        Ok(DMatrix::from_fn(n * self.n_mode, self.n_dof, |i, j| {
            self.get(p0 + i / self.n_mode, i % self.n_mode, j)
        }))
    }
}

/// Sensitivity model
///
/// Owns the sensitivity tensor and the DOF and wavefront mode selection masks,
/// and derives from them the usable sensitivity matrix and its pseudo-inverse
#[derive(Debug, Clone)]
pub struct SensitivityModel {
    tensor: SensitivityTensor,
    comp_idx: SelectionMask,
    zn3_idx: SelectionMask,
    normalize: bool,
    dof_unit: Option<Vec<f64>>,
    n_singular_inf: usize,
    a: DMatrix<f64>,
    a_norm: DMatrix<f64>,
    pinv: TruncatedPseudoInverse,
}

impl FromBuilder for SensitivityModel {
    type ComponentBuilder = SensitivityModelBuilder;
}

impl Display for SensitivityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.tensor)?;
        writeln!(
            f,
            " * A: {:?}, usable: {:?}, normalized: {}",
            self.a.shape(),
            self.a_norm.shape(),
            self.normalize
        )?;
        let s = &self.pinv.singular_values;
        write!(
            f,
            " * pseudo-inverse: {:?}, singular values: [{:e},{:e}] ({} discarded)",
            self.pinv.inverse.shape(),
            s.min(),
            s.max(),
            self.n_singular_inf
        )
    }
}

impl SensitivityModel {
    fn new(
        tensor: SensitivityTensor,
        comp_idx: SelectionMask,
        zn3_idx: SelectionMask,
        normalize: bool,
        dof_unit: Option<Vec<f64>>,
        n_singular_inf: usize,
    ) -> crate::Result<Self> {
        let a = tensor.boundary(N_BOUNDARY_POSITION)?;
        let (_, n_mode, n_dof) = tensor.shape();
        if comp_idx.len() != n_dof {
            return Err(ShapeError::Length {
                what: "DOF mask",
                expected: n_dof,
                found: comp_idx.len(),
            }
            .into());
        }
        if zn3_idx.len() != n_mode {
            return Err(ShapeError::Length {
                what: "wavefront mode mask",
                expected: n_mode,
                found: zn3_idx.len(),
            }
            .into());
        }
        let (a_norm, pinv) = Self::derive(
            &a,
            dof_unit.as_deref(),
            &comp_idx,
            &zn3_idx,
            normalize,
            n_singular_inf,
        )?;
        Ok(Self {
            tensor,
            comp_idx,
            zn3_idx,
            normalize,
            dof_unit,
            n_singular_inf,
            a,
            a_norm,
            pinv,
        })
    }
    /// Computes the usable, possibly normalized, sensitivity matrix and its pseudo-inverse
    ///
    /// The usable matrix is `A` restricted to the selected wavefront modes (rows) and DOFs (columns)
    fn derive(
        a: &DMatrix<f64>,
        dof_unit: Option<&[f64]>,
        comp_idx: &SelectionMask,
        zn3_idx: &SelectionMask,
        normalize: bool,
        n_singular_inf: usize,
    ) -> crate::Result<(DMatrix<f64>, TruncatedPseudoInverse)> {
        let divisor: Vec<f64> = if normalize {
            let dof_unit = dof_unit.ok_or(crate::error::ConfigError::MissingDofUnits)?;
            if dof_unit.len() != comp_idx.len() {
                return Err(ShapeError::Length {
                    what: "DOF units",
                    expected: comp_idx.len(),
                    found: dof_unit.len(),
                }
                .into());
            }
            comp_idx.filter(dof_unit.iter()).copied().collect()
        } else {
            vec![1f64; comp_idx.nnz()]
        };
        let rows: Vec<usize> = zn3_idx.tile(N_BOUNDARY_POSITION).indices().collect();
        let cols: Vec<usize> = comp_idx.indices().collect();
        let a_norm = DMatrix::from_fn(rows.len(), cols.len(), |i, j| {
            a[(rows[i], cols[j])] / divisor[j]
        });
        log::debug!("usable sensitivity matrix: {:?}", a_norm.shape());
        let pinv = TruncatedPseudoInverse::new(&a_norm, n_singular_inf)?;
        Ok((a_norm, pinv))
    }
    /// Computes the truncated SVD pseudo-inverse of the usable sensitivity matrix
    pub fn build_inverse(&mut self) -> Result<&mut Self, NumericalError> {
        self.pinv = TruncatedPseudoInverse::new(&self.a_norm, self.n_singular_inf)?;
        Ok(self)
    }
    /// Sets new DOF and wavefront mode selection masks
    ///
    /// The model is left unchanged if the new usable matrix cannot be inverted
    pub fn set_masks(
        &mut self,
        comp_idx: SelectionMask,
        zn3_idx: SelectionMask,
    ) -> crate::Result<&mut Self> {
        let (_, n_mode, n_dof) = self.tensor.shape();
        if comp_idx.len() != n_dof || zn3_idx.len() != n_mode {
            return Err(ShapeError::Length {
                what: "DOF and wavefront mode masks",
                expected: n_dof + n_mode,
                found: comp_idx.len() + zn3_idx.len(),
            }
            .into());
        }
        let (a_norm, pinv) = Self::derive(
            &self.a,
            self.dof_unit.as_deref(),
            &comp_idx,
            &zn3_idx,
            self.normalize,
            self.n_singular_inf,
        )?;
        self.comp_idx = comp_idx;
        self.zn3_idx = zn3_idx;
        self.a_norm = a_norm;
        self.pinv = pinv;
        Ok(self)
    }
    /// Enables or disables the normalization of the sensitivity matrix by the DOF units
    pub fn set_normalization(&mut self, normalize: bool) -> crate::Result<&mut Self> {
        let (a_norm, pinv) = Self::derive(
            &self.a,
            self.dof_unit.as_deref(),
            &self.comp_idx,
            &self.zn3_idx,
            normalize,
            self.n_singular_inf,
        )?;
        self.normalize = normalize;
        self.a_norm = a_norm;
        self.pinv = pinv;
        Ok(self)
    }
    /// Sets the number of discarded singular values, the model is left unchanged on error
    pub fn set_n_singular_inf(&mut self, n_singular_inf: usize) -> Result<&mut Self, NumericalError> {
        self.pinv = TruncatedPseudoInverse::new(&self.a_norm, n_singular_inf)?;
        self.n_singular_inf = n_singular_inf;
        Ok(self)
    }
    /// Returns the sensitivity tensor
    pub fn tensor(&self) -> &SensitivityTensor {
        &self.tensor
    }
    /// Returns the sensitivity matrix of the boundary positions
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }
    /// Returns the usable, possibly normalized, sensitivity matrix
    pub fn a_norm(&self) -> &DMatrix<f64> {
        &self.a_norm
    }
    /// Returns the pseudo-inverse of the usable sensitivity matrix
    pub fn a_inv(&self) -> &DMatrix<f64> {
        &self.pinv.inverse
    }
    /// Returns the singular values of the usable sensitivity matrix in descending order
    pub fn singular_values(&self) -> &DVector<f64> {
        &self.pinv.singular_values
    }
    /// Returns the DOF selection mask
    pub fn comp_idx(&self) -> &SelectionMask {
        &self.comp_idx
    }
    /// Returns the wavefront mode selection mask
    pub fn zn3_idx(&self) -> &SelectionMask {
        &self.zn3_idx
    }
    /// Returns the wavefront mode selection mask repeated for each boundary position
    pub fn row_mask(&self) -> SelectionMask {
        self.zn3_idx.tile(N_BOUNDARY_POSITION)
    }
    /// Number of rows of `A`
    pub fn n_row(&self) -> usize {
        self.a.nrows()
    }
    /// Number of rows of the usable sensitivity matrix
    pub fn n_masked_row(&self) -> usize {
        self.a_norm.nrows()
    }
    /// Total number of DOFs
    pub fn n_dof(&self) -> usize {
        self.a.ncols()
    }
    pub fn is_normalized(&self) -> bool {
        self.normalize
    }
}
