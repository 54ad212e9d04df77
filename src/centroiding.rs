//! Intensity weighted centroiding

use nalgebra::DMatrixView;
use serde::{Deserialize, Serialize};

/// Image centroid in pixel, (0,0) is the center of the first pixel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Centroid {
    pub row: f64,
    pub col: f64,
    /// total intensity
    pub flux: f64,
}

impl Centroid {
    /// Computes the intensity weighted centroid of the image
    ///
    /// Returns `None` if the image has no positive flux
    pub fn new(image: DMatrixView<'_, f64>) -> Option<Self> {
        let (flux, row, col) = image.row_iter().enumerate().fold(
            (0f64, 0f64, 0f64),
            |(flux, row, col), (i, values)| {
                values
                    .iter()
                    .enumerate()
                    .fold((flux, row, col), |(flux, row, col), (j, &value)| {
                        (
                            flux + value,
                            row + value * i as f64,
                            col + value * j as f64,
                        )
                    })
            },
        );
        (flux > 0f64).then(|| Self {
            row: row / flux,
            col: col / flux,
            flux,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn single_pixel() {
        let mut image = DMatrix::<f64>::zeros(7, 9);
        image[(2, 6)] = 3.;
        let c = Centroid::new(image.as_view()).unwrap();
        assert_eq!((c.row, c.col, c.flux), (2., 6., 3.));
    }

    #[test]
    fn weighted() {
        let mut image = DMatrix::<f64>::zeros(4, 4);
        image[(1, 1)] = 1.;
        image[(1, 3)] = 3.;
        let c = Centroid::new(image.view((1, 0), (2, 4))).unwrap();
        assert_eq!((c.row, c.col), (0., 2.5));
    }

    #[test]
    fn dark() {
        assert!(Centroid::new(DMatrix::<f64>::zeros(3, 3).as_view()).is_none());
    }
}
