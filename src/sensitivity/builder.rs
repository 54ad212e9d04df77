use std::path::{Path, PathBuf};

use crate::{error::ConfigError, Builder, EstimatorConfig, EstimatorStrategy};

use super::{SensitivityModel, SensitivityTensor};

/// [SensitivityModel] builder
///
/// The sensitivity tensor is either given explicitly or loaded from the file
/// `senMFile` of the estimator configuration, relative to the data directory
#[derive(Debug, Clone)]
pub struct SensitivityModelBuilder {
    config: Option<EstimatorConfig>,
    data_dir: PathBuf,
    tensor: Option<SensitivityTensor>,
    dof_unit: Option<Vec<f64>>,
}
/// Default properties:
///  * config: none
///  * data directory: `data`
///  * tensor: loaded from the data directory
///  * DOF units: none
impl Default for SensitivityModelBuilder {
    fn default() -> Self {
        Self {
            config: None,
            data_dir: "data".into(),
            tensor: None,
            dof_unit: None,
        }
    }
}

impl SensitivityModelBuilder {
    /// Sets the estimator configuration
    pub fn config(self, config: EstimatorConfig) -> Self {
        Self {
            config: Some(config),
            ..self
        }
    }
    /// Sets the directory of the sensitivity data file
    pub fn data_dir<P: AsRef<Path>>(self, data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..self
        }
    }
    /// Sets the sensitivity tensor, bypassing the data file
    pub fn tensor(self, tensor: SensitivityTensor) -> Self {
        Self {
            tensor: Some(tensor),
            ..self
        }
    }
    /// Sets the per-DOF unit scales used to normalize the sensitivity matrix columns
    pub fn dof_unit(self, dof_unit: Vec<f64>) -> Self {
        Self {
            dof_unit: Some(dof_unit),
            ..self
        }
    }
}

impl Builder for SensitivityModelBuilder {
    type Component = SensitivityModel;

    fn build(self) -> crate::Result<Self::Component> {
        let config = self.config.ok_or(ConfigError::MissingKey("estimator"))?;
        config.check()?;
        match config.strategy {
            EstimatorStrategy::Pinv => (),
        }
        let (n_mode, n_dof) = (config.n_mode(), config.n_dof());
        let tensor = match self.tensor {
            Some(tensor) => tensor,
            None => {
                let file = config
                    .sensitivity_file
                    .as_ref()
                    .ok_or(ConfigError::MissingKey("senMFile"))?;
                let path = self.data_dir.join(file);
                log::info!("Using sensitivity file: {:?}", path);
                SensitivityTensor::load(path, n_mode, n_dof)?
            }
        };
        let (_, tensor_n_mode, tensor_n_dof) = tensor.shape();
        if (tensor_n_mode, tensor_n_dof) != (n_mode, n_dof) {
            return Err(crate::error::ShapeError::Tensor {
                len: tensor.shape().0 * tensor_n_mode * tensor_n_dof,
                n_mode,
                n_dof,
            }
            .into());
        }
        if config.normalize_a && self.dof_unit.is_none() {
            return Err(ConfigError::MissingDofUnits.into());
        }
        let model = SensitivityModel::new(
            tensor,
            config.comp_idx,
            config.zn3_idx,
            config.normalize_a,
            self.dof_unit,
            config.n_singular_inf,
        )?;
        log::info!("{}", model);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{AosError, NumericalError},
        FromBuilder, SelectionMask,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn config(n_singular_inf: usize) -> EstimatorConfig {
        EstimatorConfig {
            zn_max: 6,
            n_bending_m1m3: 1,
            n_bending_m2: 1,
            n_singular_inf,
            icomp: 10,
            izn3: 2,
            comp_idx: "111111111001".parse().unwrap(),
            zn3_idx: "110".parse().unwrap(),
            ..Default::default()
        }
    }

    fn tensor(seed: u64) -> SensitivityTensor {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<f64> = (0..19 * 3 * 12).map(|_| rng.gen_range(-1f64..1f64)).collect();
        SensitivityTensor::new(data, 3, 12).unwrap()
    }

    #[test]
    fn usable_matrix() -> anyhow::Result<()> {
        let model = SensitivityModel::builder()
            .config(config(0))
            .tensor(tensor(1))
            .build()?;
        assert_eq!(model.a().shape(), (12, 12));
        assert_eq!(model.a_norm().shape(), (8, 10));
        assert_eq!(model.a_inv().shape(), (10, 8));
        assert_eq!(model.row_mask().to_string(), "110110110110");
        // the last selected row is mode Z5 of the last position
        // and the last selected column is the last DOF
        assert_eq!(model.a_norm()[(7, 9)], model.tensor().get(18, 1, 11));
        Ok(())
    }

    #[test]
    fn normalization() -> anyhow::Result<()> {
        let dof_unit: Vec<f64> = (1..=12).map(|x| x as f64).collect();
        let mut model = SensitivityModel::builder()
            .config(EstimatorConfig {
                normalize_a: true,
                ..config(0)
            })
            .tensor(tensor(2))
            .dof_unit(dof_unit)
            .build()?;
        assert!(model.is_normalized());
        let normalized = model.a_norm()[(0, 9)];
        model.set_normalization(false)?;
        assert!((model.a_norm()[(0, 9)] - normalized * 12.).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn normalization_without_units() {
        let result = SensitivityModel::builder()
            .config(EstimatorConfig {
                normalize_a: true,
                ..config(0)
            })
            .tensor(tensor(3))
            .build();
        assert!(matches!(
            result,
            Err(AosError::Config(ConfigError::MissingDofUnits))
        ));
    }

    #[test]
    fn mask_update() -> anyhow::Result<()> {
        let mut model = SensitivityModel::builder()
            .config(config(1))
            .tensor(tensor(4))
            .build()?;
        assert_eq!(model.singular_values().len(), 8);
        model.set_masks(SelectionMask::all(12), SelectionMask::all(3))?;
        assert_eq!(model.a_norm().shape(), (12, 12));
        assert_eq!(model.a_inv().shape(), (12, 12));
        Ok(())
    }

    #[test]
    fn too_many_discarded_singular_values() {
        let result = SensitivityModel::builder()
            .config(config(9))
            .tensor(tensor(5))
            .build();
        assert!(matches!(result, Err(AosError::Numerical(_))));
    }

    #[test]
    fn failed_update_keeps_previous_state() -> anyhow::Result<()> {
        let mut model = SensitivityModel::builder()
            .config(config(2))
            .tensor(tensor(7))
            .build()?;
        let y: Vec<f64> = (0..8).map(|i| 0.1 * i as f64).collect();
        let y0 = vec![0f64; 8];
        let before = model.estimator().estimate(&y, &y0)?;

        // a single selected DOF leaves a single singular value, 2 cannot be discarded
        let result = model.set_masks("100000000000".parse().unwrap(), "110".parse().unwrap());
        assert!(matches!(
            result,
            Err(AosError::Numerical(NumericalError::Truncation {
                n_singular_inf: 2,
                n_singular: 1
            }))
        ));
        assert_eq!(model.comp_idx().nnz(), 10);
        assert_eq!(model.a_norm().shape(), (8, 10));
        assert_eq!(model.estimator().estimate(&y, &y0)?, before);

        assert!(model.set_n_singular_inf(9).is_err());
        assert_eq!(model.singular_values().len(), 8);
        assert_eq!(model.estimator().estimate(&y, &y0)?, before);
        Ok(())
    }

    #[test]
    fn tensor_from_data_dir() -> anyhow::Result<()> {
        let data_dir = tempfile::tempdir()?;
        let t = tensor(6);
        let (n_position, n_mode, n_dof) = t.shape();
        let table: Vec<Vec<f64>> = (0..n_position * n_mode)
            .map(|i| (0..n_dof).map(|j| t.get(i / n_mode, i % n_mode, j)).collect())
            .collect();
        crate::utilities::artifact::write_table(
            data_dir.path().join("senM_test.txt"),
            table.iter().map(|row| row.as_slice()),
        )?;
        let model = SensitivityModel::builder()
            .config(EstimatorConfig {
                sensitivity_file: Some("senM_test.txt".into()),
                ..config(0)
            })
            .data_dir(data_dir.path())
            .build()?;
        assert_eq!(model.tensor().shape(), t.shape());
        Ok(())
    }
}
