use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ArtifactError, ShapeError},
    utilities::artifact,
    ZernikeTable,
};

/// Comparison of the wavefront sensing coefficients of a field with the truth
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldComparison {
    /// index of the wavefront sensor
    pub field: usize,
    /// measured coefficients from Z4 in micron
    pub measured: Vec<f64>,
    /// true coefficients from Z4 in micron
    pub truth: Vec<f64>,
}
impl FieldComparison {
    /// Measured minus true coefficients
    pub fn deviation(&self) -> impl Iterator<Item = f64> + '_ {
        self.measured.iter().zip(&self.truth).map(|(m, t)| m - t)
    }
    /// RMS of the deviation
    pub fn rms(&self) -> f64 {
        let n = self.measured.len().min(self.truth.len());
        if n == 0 {
            return 0f64;
        }
        (self.deviation().map(|x| x * x).sum::<f64>() / n as f64).sqrt()
    }
}

/// Wavefront sensing coefficients versus truth
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// exposure of the measured coefficients
    pub exposure: usize,
    pub fields: Vec<FieldComparison>,
}

impl ComparisonReport {
    /// Compares the `measured` coefficient table with the `truth` Zernike table
    ///
    /// The `measured` table has one row per wavefront sensor, the coefficients from Z4
    /// and a last diagnostic column.
    /// The `truth` table is made of blocks of `n_field_total` rows, one block per wavefront simulation,
    /// each row with the coefficients from Z1. The wavefront sensors are the last rows of each block
    /// and the truth is the average over the blocks.
    pub fn compare(
        measured: &ZernikeTable,
        truth: &ZernikeTable,
        n_field_total: usize,
    ) -> Result<Self, ShapeError> {
        let n_wfs = measured.n_row();
        let n_block = if n_field_total > 0 {
            truth.n_row() / n_field_total
        } else {
            0
        };
        if n_block == 0 || n_wfs > n_field_total {
            return Err(ShapeError::Table {
                what: "truth Zernike table",
                expected: n_field_total.max(n_wfs),
                expected_cols: 4,
                found: truth.n_row(),
                found_cols: truth.n_col(),
            });
        }
        let n_mode = measured
            .n_col()
            .saturating_sub(1)
            .min(truth.n_col().saturating_sub(3));
        let fields = (0..n_wfs)
            .map(|i| {
                let row = n_field_total - n_wfs + i;
                let truth = (0..n_mode)
                    .map(|j| {
                        (0..n_block)
                            .map(|b| truth.rows()[b * n_field_total + row][3 + j])
                            .sum::<f64>()
                            / n_block as f64
                    })
                    .collect();
                FieldComparison {
                    field: i,
                    measured: measured.rows()[i][..n_mode].to_vec(),
                    truth,
                }
            })
            .collect();
        Ok(Self {
            exposure: 0,
            fields,
        })
    }
    /// Sets the exposure of the measured coefficients
    pub fn exposure(self, exposure: usize) -> Self {
        Self { exposure, ..self }
    }
    /// Largest RMS deviation over the fields
    pub fn max_rms(&self) -> f64 {
        self.fields.iter().map(|f| f.rms()).fold(0f64, f64::max)
    }
    /// Report lines: one per field and mode followed by the field RMS
    fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.fields.iter().flat_map(move |field| {
            field
                .measured
                .iter()
                .zip(&field.truth)
                .zip(field.deviation())
                .enumerate()
                .map(move |(j, ((m, t), d))| {
                    format!(
                        "{} {} {} {:.6e} {:.6e} {:.6e}\n",
                        self.exposure,
                        field.field,
                        j + 4,
                        m,
                        t,
                        d
                    )
                })
                .chain(Some(format!(
                    "# exposure {} field {} rms: {:.6e}\n",
                    self.exposure,
                    field.field,
                    field.rms()
                )))
        })
    }
}

/// Writes the reports of all the exposures in a single table
///
/// ```text
/// exposure  field  zernike  measured  truth  deviation
/// ```
pub fn write<P: AsRef<Path>>(path: P, reports: &[ComparisonReport]) -> Result<(), ArtifactError> {
    let mut table = String::from("# exposure field zernike measured truth deviation\n");
    table.extend(reports.iter().flat_map(|report| report.lines()));
    artifact::overwrite(path, table.as_bytes())
}
