//!
//! # Curvature wavefront sensing
//!
//! The wavefront sensing pipeline of an iteration:
//!  1. the locate-and-extract pass ([Preprocessor]) writes the intra and extra focal stamps
//!     of every wavefront sensor and the catalog of each exposure,
//!  2. the curvature sensing solver is run on every catalog entry ([SolverDispatch])
//!     and the coefficient table of each exposure is written,
//!  3. the coefficients of every exposure are compared to the truth ([ComparisonReport]) and handed to the estimator
//!     as a [Measurement].
//!
//! [WavefrontSensing] strings the steps together for an [Instrument]

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::{
    error::ArtifactError, Instrument, Measurement, RunContext, StampExtractor, ZernikeTable,
};

pub mod catalog;
mod comparison;
mod dispatch;
mod preprocess;

pub use catalog::CatalogEntry;
pub use comparison::{ComparisonReport, FieldComparison};
pub use dispatch::{
    write_coefficients, CurvatureSolver, DispatchError, SolverConfig, SolverDispatch, SolverOutput,
};
pub use preprocess::Preprocessor;

/// Wavefront sensing pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WavefrontSensing {
    pub instrument: Instrument,
    pub extractor: StampExtractor,
    pub dispatch: SolverDispatch,
}

impl WavefrontSensing {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            ..Default::default()
        }
    }
    /// Sets the stamp size in pixel
    pub fn stamp_size(self, size: usize) -> Self {
        Self {
            extractor: StampExtractor::new(size),
            ..self
        }
    }
    /// Sets the curvature sensing solver dispatch
    pub fn solver_dispatch(self, dispatch: SolverDispatch) -> Self {
        Self { dispatch, ..self }
    }
    /// Extracts the stamps and writes the catalogs of all the exposures
    pub fn preprocess(&self, ctx: &RunContext) -> crate::Result<Vec<Vec<CatalogEntry>>> {
        Preprocessor::new(&self.instrument, self.extractor).run(ctx)
    }
    /// Runs the solver on the catalogs and writes the coefficient tables
    pub fn solve<S: CurvatureSolver>(
        &self,
        ctx: &RunContext,
        solver: &S,
        pb: Option<ProgressBar>,
    ) -> crate::Result<Vec<Vec<SolverOutput>>> {
        self.dispatch
            .run(ctx, self.instrument.n_exposure, solver, pb)
    }
    /// Links the missing coefficient tables to the ones of the base simulation
    pub fn link_from_base(&self, ctx: &RunContext, base_sim: usize) -> Result<(), ArtifactError> {
        ctx.link_from_base(base_sim, self.instrument.n_exposure)
    }
    /// Loads the coefficient tables of all the exposures
    pub fn coefficients(&self, ctx: &RunContext) -> crate::Result<Vec<ZernikeTable>> {
        (0..self.instrument.n_exposure)
            .map(|exposure| ZernikeTable::load(ctx.coefficient_file(exposure)))
            .collect()
    }
    /// Wavefront measurement averaged over the exposures, `n_mode` coefficients per field
    pub fn measurement(&self, ctx: &RunContext, n_mode: usize) -> crate::Result<Measurement> {
        let measurements = self
            .coefficients(ctx)?
            .iter()
            .map(|table| Measurement::from_coefficient_table(table, n_mode))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Measurement::mean(&measurements)?)
    }
    /// Compares the coefficients of every exposure with the truth and writes the reports
    pub fn compare<P: AsRef<std::path::Path>>(
        &self,
        ctx: &RunContext,
        truth: P,
        n_field_total: usize,
    ) -> crate::Result<Vec<ComparisonReport>> {
        let truth = ZernikeTable::load(truth)?;
        let reports = (0..self.instrument.n_exposure)
            .map(|exposure| {
                let measured = ZernikeTable::load(ctx.coefficient_file(exposure))?;
                let report =
                    ComparisonReport::compare(&measured, &truth, n_field_total)?.exposure(exposure);
                log::info!(
                    "wavefront sensing max. rms deviation (exposure {}): {:.3e}micron",
                    exposure,
                    report.max_rms()
                );
                Ok::<_, crate::AosError>(report)
            })
            .collect::<Result<Vec<_>, _>>()?;
        comparison::write(ctx.comparison_file(), &reports)?;
        Ok(reports)
    }
}
