//!
//! # Active optics measurement-to-correction core
//!
//! The crate turns raw wavefront sensor detector frames into a degrees-of-freedom (DOF)
//! correction of the optical system:
//!
//!  1. [`FieldLocator`] maps a wavefront sensing field point to a detector and a pixel location,
//!  2. [`StampExtractor`] cuts centroided intra/extra-focal stamps out of the detector frames,
//!  3. [`SolverDispatch`] runs an external curvature sensing solver ([`CurvatureSolver`])
//!     on every stamp pair of the catalog over a worker pool,
//!  4. [`Estimator`] inverts the [`SensitivityModel`] to estimate the DOF correction
//!     and the residual wavefront.
//!
//! Run identity (data and image directories, simulation and iteration numbers) is carried
//! by a [`RunContext`] that is passed explicitly to every step.
//!
//! The [`SensitivityModel`] is created with its builder:
//! ```no_run
//! use aos::{Builder, EstimatorConfig, FromBuilder, SensitivityModel};
//!
//! let config = EstimatorConfig::load("data/pinv.esti")?;
//! let model = SensitivityModel::builder()
//!     .config(config)
//!     .data_dir("data")
//!     .build()?;
//! println!("{model}");
//! # Ok::<(), aos::AosError>(())
//! ```

pub mod centroiding;
pub mod error;
pub mod estimator;
pub mod field;
pub mod imaging;
pub mod run_context;
pub mod sensitivity;
pub mod utilities;
pub mod wavefront;
pub mod wavefrontsensor;

#[doc(inline)]
pub use self::centroiding::Centroid;
#[doc(inline)]
pub use self::error::{
    AosError, ArtifactError, ConfigError, ExtractionError, NumericalError, ShapeError,
};
#[doc(inline)]
pub use self::estimator::{Estimate, Estimator, EstimatorConfig, EstimatorStrategy};
#[doc(inline)]
pub use self::field::{
    DetectorFootprint, DetectorPosition, FieldLocator, FieldPoint, Instrument, InstrumentFamily,
};
#[doc(inline)]
pub use self::imaging::{AtmosphereLayer, Frame, Stamp, StampExtractor};
#[doc(inline)]
pub use self::run_context::{Defocus, RunContext};
#[doc(inline)]
pub use self::sensitivity::{SensitivityModel, SensitivityModelBuilder, SensitivityTensor};
#[doc(inline)]
pub use self::utilities::{MaskFilter, SelectionMask};
#[doc(inline)]
pub use self::wavefront::{IntrinsicAberration, Measurement, ZernikeTable};
#[doc(inline)]
pub use self::wavefrontsensor::{
    CatalogEntry, ComparisonReport, CurvatureSolver, DispatchError, Preprocessor, SolverConfig,
    SolverDispatch, SolverOutput, WavefrontSensing,
};

pub type Result<T> = std::result::Result<T, AosError>;

/// Component builder type trait
pub trait Builder: Default {
    type Component;
    fn new() -> Self {
        Default::default()
    }
    fn build(self) -> Result<Self::Component>;
}

/// Gives access to the [Builder] of a component
pub trait FromBuilder {
    type ComponentBuilder: Builder;
    fn builder() -> Self::ComponentBuilder {
        Self::ComponentBuilder::new()
    }
}
