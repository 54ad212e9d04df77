use std::path::PathBuf;

/// Malformed or inconsistent configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write configuration file {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("missing configuration key `{0}`")]
    MissingKey(&'static str),
    #[error("invalid value `{value}` for configuration key `{key}`")]
    InvalidValue { key: String, value: String },
    #[error("unsupported estimator strategy `{0}`")]
    UnsupportedStrategy(String),
    #[error("`{mask}` mask declares {declared} selected entries, found {found}")]
    MaskCardinality {
        mask: &'static str,
        declared: usize,
        found: usize,
    },
    #[error("`{mask}` mask has {found} entries, expected {expected}")]
    MaskLength {
        mask: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("`{0}` mask declared without any mask line")]
    MissingMask(&'static str),
    #[error("A normalization is requested but no DOF units are given")]
    MissingDofUnits,
    #[error("unknown instrument `{0}`")]
    UnknownInstrument(String),
    #[error("cannot deserialize configuration from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize configuration into toml")]
    Save(#[from] toml::ser::Error),
}

/// Failures of the sensitivity matrix inversion
#[derive(Debug, thiserror::Error)]
pub enum NumericalError {
    #[error("singular value decomposition of the {0}x{1} sensitivity matrix failed to converge")]
    SvdConvergence(usize, usize),
    #[error("cannot discard {n_singular_inf} singular values out of {n_singular}")]
    Truncation {
        n_singular_inf: usize,
        n_singular: usize,
    },
    #[error("singular value #{0} is zero and is not discarded")]
    Singular(usize),
}

/// Mismatched vector or matrix dimensions
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("{what}: expected {expected} values, found {found}")]
    Length {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{len} sensitivity values cannot be reshaped into (_, {n_mode}, {n_dof})")]
    Tensor {
        len: usize,
        n_mode: usize,
        n_dof: usize,
    },
    #[error("{what}: expected at least {expected} rows and {expected_cols} columns, found {found}x{found_cols}")]
    Table {
        what: &'static str,
        expected: usize,
        expected_cols: usize,
        found: usize,
        found_cols: usize,
    },
}

/// Stamp extraction failures
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("field ({0:.6},{1:.6})deg does not fall on any detector")]
    OutsideDetectors(f64, f64),
    #[error("no flux in the {rows}x{cols} centroiding window")]
    NoFlux { rows: usize, cols: usize },
    #[error(
        "stamp [{row},{col}]+{size} exceeds the {n_row}x{n_col} frame bounds"
    )]
    OutOfBounds {
        row: i64,
        col: i64,
        size: usize,
        n_row: usize,
        n_col: usize,
    },
    #[error("field #{field} ({defocus}), exposure {exposure}, iteration {iteration}")]
    Field {
        field: usize,
        defocus: crate::Defocus,
        exposure: usize,
        iteration: usize,
        #[source]
        source: Box<ExtractionError>,
    },
}

/// Expected files from upstream steps that are absent or unreadable
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("missing artifact {0}")]
    Missing(PathBuf),
    #[error("cannot read artifact {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write artifact {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot link artifact {1}")]
    Link(#[source] std::io::Error, PathBuf),
    #[error("cannot decode pickle artifact {1}")]
    Decode(#[source] serde_pickle::Error, PathBuf),
    #[error("cannot encode pickle artifact {1}")]
    Encode(#[source] serde_pickle::Error, PathBuf),
    #[error("invalid number `{token}` at line {line} of {path}")]
    Parse {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("malformed catalog line {line} of {path}")]
    Catalog { path: PathBuf, line: usize },
}

/// Error taxonomy of the active optics core
///
/// Configuration errors abort before any numerical work,
/// numerical and shape errors abort the estimate cycle,
/// extraction errors fail a single field and missing artifacts
/// flag a broken pipeline precondition.
#[derive(Debug, thiserror::Error)]
pub enum AosError {
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error("numerical error")]
    Numerical(#[from] NumericalError),
    #[error("shape error")]
    Shape(#[from] ShapeError),
    #[error("stamp extraction error")]
    Extraction(#[from] ExtractionError),
    #[error("missing pipeline artifact")]
    MissingArtifact(#[from] ArtifactError),
    #[error("curvature solver dispatch failed")]
    Dispatch(#[from] crate::wavefrontsensor::DispatchError),
}
