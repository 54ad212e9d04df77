//! Run identity and pipeline artifact paths
//!
//! All the file names of the pipeline artifacts are deterministic functions of
//! the simulation, iteration, field and exposure numbers.

use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

/// Defocused image state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Defocus {
    Intra,
    Extra,
}
impl Defocus {
    /// Both states, intra first
    pub const BOTH: [Defocus; 2] = [Defocus::Intra, Defocus::Extra];
    /// Half chip of a split wavefront sensor detector, C0 is always intra
    pub fn half_chip(&self) -> &'static str {
        match self {
            Defocus::Intra => "C0",
            Defocus::Extra => "C1",
        }
    }
    /// 0 for intra, 1 for extra
    pub fn index(&self) -> usize {
        match self {
            Defocus::Intra => 0,
            Defocus::Extra => 1,
        }
    }
}
impl Display for Defocus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Defocus::Intra => write!(f, "intra"),
            Defocus::Extra => write!(f, "extra"),
        }
    }
}

/// Run context
///
/// Threaded through every pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// directory with the estimator configuration and the sensitivity data
    pub data_dir: PathBuf,
    /// root directory of the images of the simulation
    pub image_dir: PathBuf,
    /// simulation number
    pub sim: usize,
    /// iteration number
    pub iteration: usize,
    /// observation id of the detector frames
    pub obs_id: u64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            image_dir: "image/sim0".into(),
            sim: 0,
            iteration: 0,
            obs_id: 9006000,
        }
    }
}

impl Display for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sim #{} iteration #{} (obs. {}) in {:?}",
            self.sim, self.iteration, self.obs_id, self.image_dir
        )
    }
}

impl RunContext {
    /// Creates a new run context for the simulation `sim`
    pub fn new(sim: usize) -> Self {
        Self {
            sim,
            image_dir: format!("image/sim{sim}").into(),
            ..Default::default()
        }
    }
    /// Sets the data directory
    pub fn data_dir<P: AsRef<Path>>(self, data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..self
        }
    }
    /// Sets the image directory
    pub fn image_dir<P: AsRef<Path>>(self, image_dir: P) -> Self {
        Self {
            image_dir: image_dir.as_ref().to_path_buf(),
            ..self
        }
    }
    /// Sets the observation id
    pub fn obs_id(self, obs_id: u64) -> Self {
        Self { obs_id, ..self }
    }
    /// Returns the context of the iteration `iteration`
    pub fn at_iteration(&self, iteration: usize) -> Self {
        Self {
            iteration,
            ..self.clone()
        }
    }
    /// Directory of the current iteration
    pub fn iter_dir(&self) -> PathBuf {
        self.image_dir.join(format!("iter{}", self.iteration))
    }
    fn prefix(&self) -> String {
        format!("sim{}_iter{}", self.sim, self.iteration)
    }
    /// Detector frame of a wavefront sensor
    ///
    /// `obs_id` is the observation the frame belongs to
    /// (the extra-focal frames may be in a different observation than the intra-focal frames)
    pub fn frame_file(
        &self,
        obs_id: u64,
        detector: &str,
        defocus: Defocus,
        exposure: usize,
    ) -> PathBuf {
        self.iter_dir().join(format!(
            "frame_{}_{}_{}_E{:03}.pkl",
            obs_id,
            detector,
            defocus.half_chip(),
            exposure
        ))
    }
    /// Stamp of a wavefront sensing field
    pub fn stamp_file(&self, field: usize, defocus: Defocus, exposure: usize) -> PathBuf {
        self.iter_dir().join(format!(
            "{}_wfs{}_{}_0_E{:03}.pkl",
            self.prefix(),
            field,
            defocus,
            exposure
        ))
    }
    /// Wavefront sensing catalog of an exposure
    pub fn catalog_file(&self, exposure: usize) -> PathBuf {
        self.iter_dir()
            .join(format!("{}_E{:03}.wfs", self.prefix(), exposure))
    }
    /// Atmosphere side-channel table of an exposure
    pub fn atmosphere_file(&self, exposure: usize) -> PathBuf {
        self.iter_dir()
            .join(format!("{}_E{:03}.atm", self.prefix(), exposure))
    }
    /// Curvature sensing coefficients of an exposure
    pub fn coefficient_file(&self, exposure: usize) -> PathBuf {
        self.iter_dir()
            .join(format!("{}_E{:03}.z4c", self.prefix(), exposure))
    }
    /// Comparison of the wavefront sensing coefficients with the truth
    pub fn comparison_file(&self) -> PathBuf {
        self.iter_dir()
            .join(format!("{}_z4c_comparison.txt", self.prefix()))
    }
    /// Reuses the coefficient files of the simulation `base_sim`
    ///
    /// For each exposure, if the coefficient file of this run is missing,
    /// it is hard linked to the file of the same iteration of the base simulation
    pub fn link_from_base(&self, base_sim: usize, n_exposure: usize) -> Result<(), ArtifactError> {
        let base = Self {
            sim: base_sim,
            image_dir: base_image_dir(&self.image_dir, self.sim, base_sim),
            ..self.clone()
        };
        for exposure in 0..n_exposure {
            let target = self.coefficient_file(exposure);
            if target.is_file() {
                continue;
            }
            let source = base.coefficient_file(exposure);
            if !source.is_file() {
                return Err(ArtifactError::Missing(source));
            }
            link(&source, &target)?;
        }
        let (source, target) = (base.comparison_file(), self.comparison_file());
        if !target.is_file() && source.is_file() {
            link(&source, &target)?;
        }
        Ok(())
    }
}

fn link(source: &Path, target: &Path) -> Result<(), ArtifactError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::Write(e, parent.to_path_buf()))?;
    }
    log::info!("linking {:?} to {:?}", target, source);
    fs::hard_link(source, target).map_err(|e| ArtifactError::Link(e, target.to_path_buf()))
}

fn base_image_dir(image_dir: &Path, sim: usize, base_sim: usize) -> PathBuf {
    let name = format!("sim{sim}");
    match image_dir.file_name() {
        Some(dir) if dir == name.as_str() => image_dir.with_file_name(format!("sim{base_sim}")),
        _ => image_dir.to_path_buf(),
    }
}
