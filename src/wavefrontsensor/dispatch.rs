use std::{path::PathBuf, time::Instant};

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ArtifactError, ShapeError},
    utilities::artifact,
    RunContext, Stamp,
};

use super::catalog::{self, CatalogEntry};

/// Curvature sensing solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// instrument name
    pub instrument: String,
    /// algorithm name
    pub algorithm: String,
    /// optical model name
    pub model: String,
}
impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            instrument: "lsst15".into(),
            algorithm: "exp".into(),
            model: "offAxis".into(),
        }
    }
}

/// Curvature sensing solver result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolverOutput {
    /// Zernike coefficients from Z4 in nm
    pub coefficients: Vec<f64>,
    /// solver instability flag
    pub caustic: bool,
}
impl SolverOutput {
    /// Coefficient table row: the coefficients in micron followed by the caustic flag
    pub fn row(&self) -> Vec<f64> {
        self.coefficients
            .iter()
            .map(|c| c * 1e-3)
            .chain(Some(if self.caustic { 1f64 } else { 0f64 }))
            .collect()
    }
}

/// Curvature sensing solver interface
///
/// The solver is a pure function of the intra and extra focal stamps and of their field angles
pub trait CurvatureSolver: Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    fn solve(
        &self,
        intra: &Stamp,
        intra_field: (f64, f64),
        extra: &Stamp,
        extra_field: (f64, f64),
        config: &SolverConfig,
    ) -> Result<SolverOutput, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to build a pool of {1} workers")]
    Pool(#[source] rayon::ThreadPoolBuildError, usize),
    #[error("cannot load the stamps of field #{field}, exposure {exposure}, iteration {iteration}")]
    Stamp {
        field: usize,
        exposure: usize,
        iteration: usize,
        #[source]
        source: ArtifactError,
    },
    #[error("curvature solver failed on field #{field}, exposure {exposure}, iteration {iteration}")]
    Solver {
        field: usize,
        exposure: usize,
        iteration: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Parallel dispatch of the curvature sensing solver
///
/// One task per catalog entry is run on a pool of `n_worker` threads,
/// the results are in the order of the catalog entries.
/// The first failed task aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverDispatch {
    pub n_worker: usize,
    pub config: SolverConfig,
}
impl Default for SolverDispatch {
    fn default() -> Self {
        Self {
            n_worker: 1,
            config: Default::default(),
        }
    }
}

impl SolverDispatch {
    pub fn new(n_worker: usize) -> Self {
        Self {
            n_worker,
            ..Default::default()
        }
    }
    /// Sets the solver configuration
    pub fn config(self, config: SolverConfig) -> Self {
        Self { config, ..self }
    }
    /// Runs the solver on all the `entries` of the catalog of `exposure`
    pub fn dispatch<S: CurvatureSolver>(
        &self,
        entries: &[CatalogEntry],
        solver: &S,
        ctx: &RunContext,
        exposure: usize,
        pb: Option<ProgressBar>,
    ) -> Result<Vec<SolverOutput>, DispatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_worker)
            .build()
            .map_err(|e| DispatchError::Pool(e, self.n_worker))?;
        let iteration = ctx.iteration;
        let now = Instant::now();
        let outputs = pool.install(|| {
            entries
                .par_iter()
                .enumerate()
                .map(|(field, entry)| {
                    let stamp_error = |source| DispatchError::Stamp {
                        field,
                        exposure,
                        iteration,
                        source,
                    };
                    let intra = Stamp::load(&entry.intra_file).map_err(stamp_error)?;
                    let extra = Stamp::load(&entry.extra_file).map_err(stamp_error)?;
                    let output = solver
                        .solve(
                            &intra,
                            entry.intra_field,
                            &extra,
                            entry.extra_field,
                            &self.config,
                        )
                        .map_err(|e| DispatchError::Solver {
                            field,
                            exposure,
                            iteration,
                            source: Box::new(e),
                        })?;
                    if let Some(pb) = pb.as_ref() {
                        pb.inc(1);
                    }
                    Ok::<_, DispatchError>(output)
                })
                .collect::<Result<Vec<_>, DispatchError>>()
        })?;
        if let Some(pb) = pb {
            pb.finish();
        }
        log::info!(
            "curvature sensing of {} fields (exposure {}) in {}ms with {} worker(s)",
            entries.len(),
            exposure,
            now.elapsed().as_millis(),
            self.n_worker
        );
        Ok(outputs)
    }
    /// Runs the solver on the catalogs of `n_exposure` exposures and writes the coefficient files
    pub fn run<S: CurvatureSolver>(
        &self,
        ctx: &RunContext,
        n_exposure: usize,
        solver: &S,
        pb: Option<ProgressBar>,
    ) -> crate::Result<Vec<Vec<SolverOutput>>> {
        (0..n_exposure)
            .map(|exposure| {
                let entries = catalog::read(ctx.catalog_file(exposure))?;
                let outputs = self.dispatch(&entries, solver, ctx, exposure, pb.clone())?;
                write_coefficients(ctx.coefficient_file(exposure), &outputs)?;
                Ok::<_, crate::AosError>(outputs)
            })
            .collect()
    }
}

/// Writes the coefficient table, one row per field
pub fn write_coefficients(path: PathBuf, outputs: &[SolverOutput]) -> crate::Result<()> {
    let rows: Vec<Vec<f64>> = outputs.iter().map(|output| output.row()).collect();
    if let Some(first) = rows.first() {
        if let Some(row) = rows.iter().find(|row| row.len() != first.len()) {
            return Err(ShapeError::Length {
                what: "coefficient table row",
                expected: first.len(),
                found: row.len(),
            }
            .into());
        }
    }
    artifact::write_table(&path, rows.iter().map(|row| row.as_slice()))?;
    log::info!("{:?} written", path);
    Ok(())
}
