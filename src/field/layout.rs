//! Built-in detector layouts of the instrument families

use super::{DetectorFootprint, FieldPoint};

/// Focal plane plate scale in pixel per degree (0.2arcsec pixels)
pub const PLATE_SCALE: f64 = 18_000.;
/// Distance in degree of the LSST corner wavefront sensing fields to the focal plane center, along x and y
pub const LSST_CORNER: f64 = 1.176;
/// Field angle in degree the defocused images are pulled away from the LSST split line
pub const LSST_PULL: f64 = 0.020;
/// Pitch in degree of the ComCam sensors
pub const COMCAM_PITCH: f64 = 0.2347;
/// Pixel size (columns, rows) of a science and wavefront sensor detector
pub const DETECTOR_SHAPE: (usize, usize) = (4000, 4072);

/// Index of the first LSST wavefront sensing field in the field list of the optical model
pub const LSST_FIRST_WFS_FIELD: usize = 31;

/// LSST corner rafts wavefront sensors
///
/// The four split detectors are read out identically, the stamps of 3 of them
/// are rotated by a multiple of 90 degrees to give them the orientation of the focal plane.
/// The intra-focal image of each sensor is shifted toward the focal plane center
/// along the split direction, the extra-focal image away from it.
pub fn lsst() -> (Vec<DetectorFootprint>, Vec<FieldPoint>) {
    let c = LSST_CORNER;
    let table = [
        ("R44_S00", (c, c), 2, (-LSST_PULL, 0.)),
        ("R04_S20", (-c, c), 3, (0., -LSST_PULL)),
        ("R00_S22", (-c, -c), 0, (LSST_PULL, 0.)),
        ("R40_S02", (c, -c), 1, (0., LSST_PULL)),
    ];
    table
        .into_iter()
        .enumerate()
        .map(|(i, (name, center, quarter_turns, intra_shift))| {
            (
                DetectorFootprint {
                    name: name.into(),
                    center,
                    shape: DETECTOR_SHAPE,
                    quarter_turns,
                    intra_shift,
                },
                FieldPoint {
                    id: LSST_FIRST_WFS_FIELD + i,
                    x: center.0,
                    y: center.1,
                },
            )
        })
        .unzip()
}

/// ComCam 3x3 sensors raft
///
/// Field #i is at the center of the sensor of column `i/3` and row `i%3`,
/// counted from the bottom left corner
pub fn comcam() -> (Vec<DetectorFootprint>, Vec<FieldPoint>) {
    (0..9)
        .map(|i| {
            let (col, row) = (i / 3, i % 3);
            let center = (
                (col as f64 - 1.) * COMCAM_PITCH,
                (row as f64 - 1.) * COMCAM_PITCH,
            );
            (
                DetectorFootprint {
                    name: format!("R22_S{row}{col}"),
                    center,
                    shape: DETECTOR_SHAPE,
                    quarter_turns: 0,
                    intra_shift: (0., 0.),
                },
                FieldPoint {
                    id: i,
                    x: center.0,
                    y: center.1,
                },
            )
        })
        .unzip()
}
