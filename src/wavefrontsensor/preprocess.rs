use crate::{
    error::ExtractionError, Defocus, FieldPoint, Frame, Instrument, RunContext, StampExtractor,
};

use super::catalog::{self, CatalogEntry};

/// Locate-and-extract pass
///
/// For each exposure, each wavefront sensing field and each defocus, the stamp is extracted from
/// the detector frame, rotated to the focal plane orientation and written to the stamp file,
/// then the catalog of the exposure is written.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor<'a> {
    instrument: &'a Instrument,
    extractor: StampExtractor,
    skip_failed: bool,
}

impl<'a> Preprocessor<'a> {
    pub fn new(instrument: &'a Instrument, extractor: StampExtractor) -> Self {
        Self {
            instrument,
            extractor,
            skip_failed: false,
        }
    }
    /// Leaves out of the catalog the fields whose stamps cannot be extracted instead of aborting
    pub fn skip_failed(self, skip_failed: bool) -> Self {
        Self {
            skip_failed,
            ..self
        }
    }
    /// Runs the pass for all the exposures of the instrument
    pub fn run(&self, ctx: &RunContext) -> crate::Result<Vec<Vec<CatalogEntry>>> {
        (0..self.instrument.n_exposure)
            .map(|exposure| self.exposure(ctx, exposure))
            .collect()
    }
    /// Runs the pass for one exposure and returns the catalog
    pub fn exposure(&self, ctx: &RunContext, exposure: usize) -> crate::Result<Vec<CatalogEntry>> {
        let mut entries = vec![];
        for (k, field) in self.instrument.fields.iter().enumerate() {
            match self.field(ctx, exposure, field, k == 0) {
                Ok(entry) => entries.push(entry),
                Err(crate::AosError::Extraction(e)) if self.skip_failed => {
                    log::warn!("{e}, field skipped");
                }
                Err(e) => return Err(e),
            }
        }
        catalog::write(ctx.catalog_file(exposure), &entries)?;
        log::info!(
            "{} field(s) in catalog {:?}",
            entries.len(),
            ctx.catalog_file(exposure)
        );
        Ok(entries)
    }
    fn field(
        &self,
        ctx: &RunContext,
        exposure: usize,
        field: &FieldPoint,
        with_atmosphere: bool,
    ) -> crate::Result<CatalogEntry> {
        let context = |defocus, source| ExtractionError::Field {
            field: field.id,
            defocus,
            exposure,
            iteration: ctx.iteration,
            source: Box::new(source),
        };
        let locator = self.instrument.locator();
        let position = locator
            .locate(field.x, field.y)
            .map_err(|e| context(Defocus::Intra, e))?;
        let quarter_turns = locator
            .footprint(&position)
            .map(|d| d.quarter_turns)
            .unwrap_or_default();
        for defocus in Defocus::BOTH {
            let obs_id = self.instrument.obs_id(ctx.obs_id, defocus);
            let frame = Frame::load(ctx.frame_file(obs_id, &position.detector, defocus, exposure))?;
            let (x, y) = self
                .instrument
                .image_location(&position, defocus, frame.image.ncols());
            let stamp = self
                .extractor
                .extract(&frame.image, x, y)
                .map_err(|e| context(defocus, e))?
                .rotate(quarter_turns);
            log::debug!(
                "field #{} {}: {} at ({},{}), offset ({:.2},{:.2})",
                field.id,
                defocus,
                position.detector,
                x,
                y,
                stamp.offset.0,
                stamp.offset.1
            );
            stamp.dump(ctx.stamp_file(field.id, defocus, exposure))?;
            if with_atmosphere && defocus == Defocus::Intra {
                frame.write_atmosphere(ctx.atmosphere_file(exposure))?;
            }
        }
        let footprint = locator.footprint(&position);
        let shift = |defocus| {
            footprint
                .map(|d| d.field_shift(defocus))
                .unwrap_or_default()
        };
        let (intra, extra) = (shift(Defocus::Intra), shift(Defocus::Extra));
        Ok(CatalogEntry {
            intra_field: (field.x + intra.0, field.y + intra.1),
            extra_field: (field.x + extra.0, field.y + extra.1),
            intra_file: ctx.stamp_file(field.id, Defocus::Intra, exposure),
            extra_file: ctx.stamp_file(field.id, Defocus::Extra, exposure),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field::layout, AtmosphereLayer, InstrumentFamily, Stamp};
    use nalgebra::DMatrix;

    const SIZE: usize = 16;

    /// Half chip frames with a point source at the stamp location
    fn lsst_frames(ctx: &RunContext, instrument: &Instrument) -> anyhow::Result<()> {
        for exposure in 0..instrument.n_exposure {
            for field in &instrument.fields {
                let position = instrument.locator().locate(field.x, field.y)?;
                for defocus in Defocus::BOTH {
                    let (n_row, n_col) = (200, 100);
                    let (x, y) = instrument.image_location(&position, defocus, n_col);
                    let mut image = DMatrix::<f64>::zeros(n_row, n_col);
                    image[(y as usize + 2, x as usize - 1)] = 1.;
                    image[(y as usize + 2, x as usize)] = 1.;
                    let frame = Frame::new(image)
                        .atmosphere(vec![AtmosphereLayer::default(); 7]);
                    let obs_id = instrument.obs_id(ctx.obs_id, defocus);
                    frame.dump(ctx.frame_file(obs_id, &position.detector, defocus, exposure))?;
                }
            }
        }
        Ok(())
    }

    fn small_lsst() -> Instrument {
        let mut instrument = Instrument::new(InstrumentFamily::Lsst);
        // 200x200 pixels split detectors, pulling the images 20 pixels from the split line
        instrument.detectors.iter_mut().for_each(|d| d.shape = (200, 200));
        instrument.pull = 20. / instrument.plate_scale;
        instrument
    }

    #[test]
    fn lsst_pass() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let ctx = RunContext::new(0).image_dir(root.path());
        let instrument = small_lsst();
        lsst_frames(&ctx, &instrument)?;

        let catalogs = Preprocessor::new(&instrument, StampExtractor::new(SIZE)).run(&ctx)?;
        assert_eq!(catalogs.len(), 2);
        let entries = &catalogs[1];
        assert_eq!(entries.len(), 4);
        let saved = catalog::read(ctx.catalog_file(1))?;
        assert_eq!(saved.len(), 4);
        assert_eq!(saved[3].extra_file, entries[3].extra_file);
        let c = layout::LSST_CORNER;
        let p = layout::LSST_PULL;
        assert!((entries[0].intra_field.0 - (c - p)).abs() < 1e-12);
        assert!((entries[0].extra_field.0 - (c + p)).abs() < 1e-12);
        assert!((entries[3].intra_field.1 - (-c + p)).abs() < 1e-12);
        assert!(ctx.atmosphere_file(0).is_file());

        let stamp = Stamp::load(&entries[2].intra_file)?;
        assert_eq!(stamp.image.shape(), (SIZE, SIZE));
        assert_eq!(stamp.image.sum(), 2.);
        Ok(())
    }

    #[test]
    fn comcam_pass() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let ctx = RunContext::new(0).image_dir(root.path());
        let mut instrument = Instrument::new(InstrumentFamily::ComCam);
        instrument
            .detectors
            .iter_mut()
            .for_each(|d| d.shape = (200, 200));
        // intra and extra focal frames in 2 successive observations
        let locator = instrument.locator();
        for field in &instrument.fields {
            let position = locator.locate(field.x, field.y)?;
            for (defocus, flux) in [(Defocus::Intra, 2.), (Defocus::Extra, 3.)] {
                let (x, y) = instrument.image_location(&position, defocus, 200);
                assert_eq!((x, y), (100., 100.));
                let mut image = DMatrix::<f64>::zeros(200, 200);
                image[(y as usize, x as usize)] = flux;
                let obs_id = ctx.obs_id + defocus.index() as u64;
                Frame::new(image)
                    .atmosphere(vec![AtmosphereLayer::default(); 7])
                    .dump(ctx.frame_file(obs_id, &position.detector, defocus, 0))?;
            }
        }

        let preprocessor = Preprocessor::new(&instrument, StampExtractor::new(SIZE));
        let catalogs = preprocessor.run(&ctx)?;
        assert_eq!(catalogs.len(), 1);
        let entries = &catalogs[0];
        assert_eq!(entries.len(), 9);
        for (entry, field) in entries.iter().zip(&instrument.fields) {
            assert_eq!(entry.intra_field, (field.x, field.y));
            assert_eq!(entry.extra_field, (field.x, field.y));
            assert_eq!(Stamp::load(&entry.intra_file)?.image.sum(), 2.);
            assert_eq!(Stamp::load(&entry.extra_file)?.image.sum(), 3.);
        }

        // the extra focal frames are only read from the second observation
        let position = locator.locate(instrument.fields[4].x, instrument.fields[4].y)?;
        std::fs::remove_file(ctx.frame_file(
            ctx.obs_id + 1,
            &position.detector,
            Defocus::Extra,
            0,
        ))?;
        assert!(matches!(
            preprocessor.exposure(&ctx, 0),
            Err(crate::AosError::MissingArtifact(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_frame() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let ctx = RunContext::new(0).image_dir(root.path());
        let instrument = small_lsst();
        assert!(matches!(
            Preprocessor::new(&instrument, StampExtractor::new(SIZE)).exposure(&ctx, 0),
            Err(crate::AosError::MissingArtifact(_))
        ));
        Ok(())
    }

    #[test]
    fn skip_failed_fields() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let ctx = RunContext::new(0).image_dir(root.path());
        let instrument = small_lsst();
        lsst_frames(&ctx, &instrument)?;
        // no flux on the intra focal frame of the second field
        let position = instrument
            .locator()
            .locate(instrument.fields[1].x, instrument.fields[1].y)?;
        Frame::new(DMatrix::zeros(200, 100)).dump(ctx.frame_file(
            ctx.obs_id,
            &position.detector,
            Defocus::Intra,
            0,
        ))?;

        let preprocessor = Preprocessor::new(&instrument, StampExtractor::new(SIZE));
        match preprocessor.exposure(&ctx, 0) {
            Err(crate::AosError::Extraction(ExtractionError::Field {
                field, iteration, ..
            })) => assert_eq!((field, iteration), (instrument.fields[1].id, 0)),
            other => panic!("unexpected {other:?}"),
        }
        let entries = preprocessor.skip_failed(true).exposure(&ctx, 0)?;
        assert_eq!(entries.len(), 3);
        Ok(())
    }
}
