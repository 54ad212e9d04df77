use nalgebra::{DMatrix, DVector};

use crate::error::NumericalError;

const SVD_MAX_ITERATIONS: usize = 10_000;

/// Truncated SVD pseudo-inverse
#[derive(Debug, Clone)]
pub struct TruncatedPseudoInverse {
    /// singular values in descending order
    pub singular_values: DVector<f64>,
    /// pseudo-inverse, with the transposed shape of the inverted matrix
    pub inverse: DMatrix<f64>,
}

impl TruncatedPseudoInverse {
    /// Computes the pseudo-inverse of `a` discarding its `n_singular_inf` smallest singular values
    ///
    /// With `a = U S V^T`, the pseudo-inverse is `V S^+ U^T` where the diagonal of `S^+` is
    /// `1/s` for the kept singular values and zero for the discarded ones.
    /// The thin decomposition makes `S^+` square (`min(m,n)`) with `U` and `V` trimmed accordingly,
    /// the product has the shape of `a^T`.
    pub fn new(a: &DMatrix<f64>, n_singular_inf: usize) -> Result<Self, NumericalError> {
        let (nrows, ncols) = a.shape();
        let svd = a
            .clone()
            .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
            .ok_or(NumericalError::SvdConvergence(nrows, ncols))?;
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(NumericalError::SvdConvergence(nrows, ncols));
        };
        let n_singular = svd.singular_values.len();
        if n_singular_inf > n_singular {
            return Err(NumericalError::Truncation {
                n_singular_inf,
                n_singular,
            });
        }

        // descending order of the singular values
        let mut order: Vec<usize> = (0..n_singular).collect();
        order.sort_by(|&i, &j| svd.singular_values[j].total_cmp(&svd.singular_values[i]));

        let s_max = order
            .first()
            .map(|&i| svd.singular_values[i])
            .unwrap_or_default();
        let tolerance = s_max * nrows.max(ncols) as f64 * f64::EPSILON;
        let mut s_inv = DVector::<f64>::zeros(n_singular);
        for (rank, &i) in order.iter().enumerate().take(n_singular - n_singular_inf) {
            let s = svd.singular_values[i];
            if s <= tolerance {
                return Err(NumericalError::Singular(rank));
            }
            s_inv[i] = s.recip();
        }
        if let (Some(&first), Some(&last)) = (order.first(), order.last()) {
            log::info!(
                "Sensitivity singular values range: [{:e},{:e}], {} discarded",
                svd.singular_values[last],
                svd.singular_values[first],
                n_singular_inf
            );
        }

        let mut v = v_t.transpose();
        v.column_iter_mut()
            .zip(s_inv.iter())
            .for_each(|(mut col, s)| col *= *s);
        let inverse = v * u.transpose();

        let singular_values = DVector::from_iterator(
            n_singular,
            order.iter().map(|&i| svd.singular_values[i]),
        );
        Ok(Self {
            singular_values,
            inverse,
        })
    }
}
