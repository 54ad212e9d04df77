//! # Field of view geometry
//!
//! Maps field angles to detectors and pixel locations for the two instrument families:
//!  - LSST: 4 split wavefront sensors in the corner rafts, the intra and extra focal images
//!    are on the two halves (C0 and C1) of the same detector,
//!  - ComCam: 9 sensors, the intra and extra focal images are taken in two successive observations.
//!
//! The mapping is driven by the [DetectorFootprint] table of the [Instrument].

use std::{
    fmt::Display,
    fs,
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, ExtractionError},
    Defocus,
};

pub mod layout;

/// Instrument families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentFamily {
    Lsst,
    ComCam,
}
impl FromStr for InstrumentFamily {
    type Err = ConfigError;
    /// Parses the family from an instrument name like `lsst`, `lsst15` or `comcam10`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        if name.starts_with("comcam") {
            Ok(Self::ComCam)
        } else if name.starts_with("lsst") {
            Ok(Self::Lsst)
        } else {
            Err(ConfigError::UnknownInstrument(s.into()))
        }
    }
}
impl Display for InstrumentFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lsst => write!(f, "lsst"),
            Self::ComCam => write!(f, "comcam"),
        }
    }
}

/// Wavefront sensing field point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldPoint {
    /// field index in the field list of the optical model
    pub id: usize,
    /// field angle along x in degree
    pub x: f64,
    /// field angle along y in degree
    pub y: f64,
}

/// Footprint of a detector in the focal plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorFootprint {
    pub name: String,
    /// center field angle in degree
    pub center: (f64, f64),
    /// number of pixels (columns, rows)
    pub shape: (usize, usize),
    /// number of 90 degree rotations of the detector readout with respect to the focal plane
    pub quarter_turns: u8,
    /// field angle shift in degree of the intra-focal image, the extra-focal image is shifted by the opposite
    pub intra_shift: (f64, f64),
}
impl DetectorFootprint {
    /// Field shift of the defocused image
    pub fn field_shift(&self, defocus: Defocus) -> (f64, f64) {
        match defocus {
            Defocus::Intra => self.intra_shift,
            Defocus::Extra => (-self.intra_shift.0, -self.intra_shift.1),
        }
    }
}

/// Detector and pixel location of a field point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorPosition {
    /// index of the detector in the instrument table
    pub index: usize,
    /// detector name
    pub detector: String,
    /// pixel column
    pub x: f64,
    /// pixel row
    pub y: f64,
}

/// Instrument definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub family: InstrumentFamily,
    /// number of observations per iteration
    pub n_run: usize,
    /// number of exposures per observation
    pub n_exposure: usize,
    /// defocal offset in mm, the intra focal offset is the opposite
    pub defocal_offset: f64,
    /// plate scale in pixel per degree
    pub plate_scale: f64,
    /// field angle in degree the defocused images are pulled away from the split line of split detectors
    pub pull: f64,
    /// the intra and extra focal images are on the two halves of the same detector
    pub split_detector: bool,
    pub detectors: Vec<DetectorFootprint>,
    /// wavefront sensing fields
    pub fields: Vec<FieldPoint>,
}

impl Default for Instrument {
    fn default() -> Self {
        Self::new(InstrumentFamily::Lsst)
    }
}

impl Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} ({}): {} wavefront sensors, {} run(s) of {} exposure(s), defocus: ±{}mm",
            self.name,
            self.family,
            self.n_wfs(),
            self.n_run,
            self.n_exposure,
            self.defocal_offset
        )?;
        for d in &self.detectors {
            writeln!(
                f,
                " * {}: ({:+.4},{:+.4})deg, {} quarter turn(s)",
                d.name, d.center.0, d.center.1, d.quarter_turns
            )?;
        }
        Ok(())
    }
}

impl FromStr for Instrument {
    type Err = ConfigError;
    /// Creates the instrument from its name
    ///
    /// A two digit suffix gives the defocal offset in tenth of mm, e.g. `lsst15` is ±1.5mm
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let family: InstrumentFamily = s.parse()?;
        let mut instrument = Self::new(family);
        let prefix = family.to_string();
        let suffix = s.get(prefix.len()..).unwrap_or_default();
        if !suffix.is_empty() {
            if suffix.len() != 2 || !suffix.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::UnknownInstrument(s.into()));
            }
            instrument.defocal_offset = suffix
                .parse::<f64>()
                .map_err(|_| ConfigError::UnknownInstrument(s.into()))?
                / 10.;
        }
        instrument.name = s.into();
        Ok(instrument)
    }
}

impl Instrument {
    /// Creates the default instrument of a family
    pub fn new(family: InstrumentFamily) -> Self {
        match family {
            InstrumentFamily::Lsst => {
                let (detectors, fields) = layout::lsst();
                Self {
                    name: "lsst".into(),
                    family,
                    n_run: 1,
                    n_exposure: 2,
                    defocal_offset: 1.5,
                    plate_scale: layout::PLATE_SCALE,
                    pull: layout::LSST_PULL,
                    split_detector: true,
                    detectors,
                    fields,
                }
            }
            InstrumentFamily::ComCam => {
                let (detectors, fields) = layout::comcam();
                Self {
                    name: "comcam".into(),
                    family,
                    n_run: 2,
                    n_exposure: 1,
                    defocal_offset: 1.5,
                    plate_scale: layout::PLATE_SCALE,
                    pull: 0.,
                    split_detector: false,
                    detectors,
                    fields,
                }
            }
        }
    }
    /// Loads the instrument from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let toml = fs::read_to_string(&path)
            .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
        Ok(toml::from_str(&toml)?)
    }
    /// Saves the instrument into a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)?;
        fs::write(&path, format!("# ::aos::Instrument\n\n{}", toml))
            .map_err(|e| ConfigError::Write(e, path.as_ref().to_path_buf()))
    }
    /// Number of wavefront sensors
    pub fn n_wfs(&self) -> usize {
        self.fields.len()
    }
    /// Defocal offsets in mm (intra, extra)
    pub fn defocal_offsets(&self) -> [f64; 2] {
        [-self.defocal_offset, self.defocal_offset]
    }
    /// Observation of the defocused images of run `obs_id`
    pub fn obs_id(&self, obs_id: u64, defocus: Defocus) -> u64 {
        if self.n_run > 1 {
            obs_id + defocus.index() as u64
        } else {
            obs_id
        }
    }
    /// Returns the [FieldLocator] of the instrument
    pub fn locator(&self) -> FieldLocator<'_> {
        FieldLocator {
            detectors: &self.detectors,
            plate_scale: self.plate_scale,
        }
    }
    /// Approximate pixel location of a defocused image in the frame of `n_col` columns
    ///
    /// On split detectors, the intra focal image is pulled toward the left of the split line
    /// on the C0 half chip and the extra focal image toward the right on the C1 half chip
    pub fn image_location(
        &self,
        position: &DetectorPosition,
        defocus: Defocus,
        n_col: usize,
    ) -> (f64, f64) {
        if !self.split_detector {
            return (position.x, position.y);
        }
        let pull = (self.pull * self.plate_scale).round();
        let x = match defocus {
            Defocus::Intra => position.x - pull,
            Defocus::Extra => position.x + pull - n_col as f64,
        };
        (x.trunc(), position.y)
    }
}

/// Field angle to detector pixel mapping
#[derive(Debug, Clone, Copy)]
pub struct FieldLocator<'a> {
    detectors: &'a [DetectorFootprint],
    plate_scale: f64,
}

impl<'a> FieldLocator<'a> {
    pub fn new(detectors: &'a [DetectorFootprint], plate_scale: f64) -> Self {
        Self {
            detectors,
            plate_scale,
        }
    }
    /// Returns the detector and the pixel location of the field angle (x,y) in degree
    ///
    /// The field offset from the detector center is rotated in the detector readout frame
    pub fn locate(&self, x: f64, y: f64) -> Result<DetectorPosition, ExtractionError> {
        self.detectors
            .iter()
            .enumerate()
            .find_map(|(index, d)| {
                let (n_col, n_row) = (d.shape.0 as f64, d.shape.1 as f64);
                let (u, v) = unrotate(
                    (x - d.center.0) * self.plate_scale,
                    (y - d.center.1) * self.plate_scale,
                    d.quarter_turns,
                );
                let (px, py) = (u + 0.5 * n_col, v + 0.5 * n_row);
                ((0f64..n_col).contains(&px) && (0f64..n_row).contains(&py)).then(|| {
                    DetectorPosition {
                        index,
                        detector: d.name.clone(),
                        x: px,
                        y: py,
                    }
                })
            })
            .ok_or(ExtractionError::OutsideDetectors(x, y))
            .map(|p| {
                log::debug!(
                    "field ({:+.6},{:+.6}) on {} at pixel ({:.1},{:.1})",
                    x,
                    y,
                    p.detector,
                    p.x,
                    p.y
                );
                p
            })
    }
    /// Returns the detector footprint of a located field
    pub fn footprint(&self, position: &DetectorPosition) -> Option<&'a DetectorFootprint> {
        self.detectors.get(position.index)
    }
}

/// Rotates (u,v) by `quarter_turns` x -90 degrees
fn unrotate(u: f64, v: f64, quarter_turns: u8) -> (f64, f64) {
    match quarter_turns % 4 {
        0 => (u, v),
        1 => (v, -u),
        2 => (-u, -v),
        _ => (-v, u),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_names() -> anyhow::Result<()> {
        let lsst: Instrument = "lsst10".parse()?;
        assert_eq!(lsst.family, InstrumentFamily::Lsst);
        assert_eq!(lsst.defocal_offsets(), [-1., 1.]);
        assert_eq!(lsst.n_wfs(), 4);
        let comcam: Instrument = "comcam".parse()?;
        assert_eq!(comcam.n_wfs(), 9);
        assert_eq!(comcam.defocal_offset, 1.5);
        assert_eq!(comcam.obs_id(9006000, Defocus::Extra), 9006001);
        assert_eq!(lsst.obs_id(9006000, Defocus::Extra), 9006000);
        assert!("lsst1".parse::<Instrument>().is_err());
        assert!("hsc".parse::<Instrument>().is_err());
        Ok(())
    }

    #[test]
    fn locate_wavefront_sensors() -> anyhow::Result<()> {
        for instrument in [
            Instrument::new(InstrumentFamily::Lsst),
            Instrument::new(InstrumentFamily::ComCam),
        ] {
            let locator = instrument.locator();
            for (i, field) in instrument.fields.iter().enumerate() {
                let p = locator.locate(field.x, field.y)?;
                assert_eq!(p.index, i);
                assert_eq!((p.x, p.y), (2000., 2036.));
            }
        }
        Ok(())
    }

    #[test]
    fn rotated_readout() -> anyhow::Result<()> {
        let lsst = Instrument::default();
        let locator = lsst.locator();
        // 100 pixels toward +x of the focal plane
        let dx = 100. / lsst.plate_scale;
        let p = locator.locate(layout::LSST_CORNER + dx, layout::LSST_CORNER)?;
        assert_eq!(p.detector, "R44_S00");
        assert!((p.x - 1900.).abs() < 1e-6);
        let p = locator.locate(-layout::LSST_CORNER + dx, -layout::LSST_CORNER)?;
        assert_eq!(p.detector, "R00_S22");
        assert!((p.x - 2100.).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn outside_detectors() {
        let lsst = Instrument::default();
        assert!(matches!(
            lsst.locator().locate(0., 0.),
            Err(ExtractionError::OutsideDetectors(..))
        ));
    }

    #[test]
    fn split_detector_locations() -> anyhow::Result<()> {
        let lsst = Instrument::default();
        let p = lsst.locator().locate(layout::LSST_CORNER, layout::LSST_CORNER)?;
        assert_eq!(lsst.image_location(&p, Defocus::Intra, 2000), (1640., 2036.));
        assert_eq!(lsst.image_location(&p, Defocus::Extra, 2000), (360., 2036.));
        let comcam = Instrument::new(InstrumentFamily::ComCam);
        let p = comcam.locator().locate(0., 0.)?;
        assert_eq!(p.detector, "R22_S11");
        assert_eq!(comcam.image_location(&p, Defocus::Extra, 4000), (2000., 2036.));
        Ok(())
    }

    #[test]
    fn toml_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("comcam.toml");
        let comcam = Instrument::new(InstrumentFamily::ComCam);
        comcam.save(&path)?;
        assert_eq!(Instrument::load(&path)?, comcam);
        Ok(())
    }
}
