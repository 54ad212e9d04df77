use std::{convert::Infallible, fs, time::Instant};

use aos::{
    AtmosphereLayer, Builder, CurvatureSolver, Defocus, EstimatorConfig, Frame, FromBuilder,
    Instrument, InstrumentFamily, RunContext, SensitivityModel, SolverConfig, SolverDispatch,
    SolverOutput, Stamp, WavefrontSensing,
};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng, SeedableRng};

const N_POSITION: usize = 31;
const N_MODE: usize = 5;
const N_DOF: usize = 12;

const ESTI: &str = r#"
# 1 bending mode per mirror
estimator_strategy pinv
senMFile senM_pipeline.txt
znmax 8
n_bending_M1M3 1
n_bending_M2 1
normalize_A 0
n_singular_inf 0
icomp 10
111111111001
izn3 4
11011
"#;

/// Returns precomputed wavefront coefficients for the field closest to the intra focal field angle
struct TableSolver {
    fields: Vec<(f64, f64)>,
    /// coefficients in nm per field
    coefficients: Vec<Vec<f64>>,
}
impl CurvatureSolver for TableSolver {
    type Error = Infallible;

    fn solve(
        &self,
        _intra: &Stamp,
        intra_field: (f64, f64),
        _extra: &Stamp,
        _extra_field: (f64, f64),
        _config: &SolverConfig,
    ) -> Result<SolverOutput, Self::Error> {
        let distance = |(x, y): &(f64, f64)| (x - intra_field.0).hypot(y - intra_field.1);
        let k = self
            .fields
            .iter()
            .enumerate()
            .min_by(|a, b| distance(a.1).total_cmp(&distance(b.1)))
            .map(|(k, _)| k)
            .unwrap_or_default();
        Ok(SolverOutput {
            coefficients: self.coefficients[k].clone(),
            caustic: false,
        })
    }
}

fn small_lsst() -> Instrument {
    let mut instrument = Instrument::new(InstrumentFamily::Lsst);
    instrument
        .detectors
        .iter_mut()
        .for_each(|d| d.shape = (200, 200));
    instrument.pull = 20. / instrument.plate_scale;
    instrument
}

fn write_frames(ctx: &RunContext, instrument: &Instrument) -> anyhow::Result<()> {
    let locator = instrument.locator();
    for exposure in 0..instrument.n_exposure {
        for field in &instrument.fields {
            let position = locator.locate(field.x, field.y)?;
            for defocus in Defocus::BOTH {
                let (x, y) = instrument.image_location(&position, defocus, 100);
                let mut image = DMatrix::<f64>::zeros(200, 100);
                image[(y as usize, x as usize)] = 1.;
                image[(y as usize + 1, x as usize)] = 1.;
                let obs_id = instrument.obs_id(ctx.obs_id, defocus);
                Frame::new(image)
                    .atmosphere(vec![AtmosphereLayer::default(); 7])
                    .dump(ctx.frame_file(obs_id, &position.detector, defocus, exposure))?;
            }
        }
    }
    Ok(())
}

#[test]
fn lsst_closed_loop_iteration() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let now = Instant::now();

    let root = tempfile::tempdir()?;
    let ctx = RunContext::new(0)
        .data_dir(root.path().join("data"))
        .image_dir(root.path().join("image").join("sim0"));
    fs::create_dir_all(&ctx.data_dir)?;

    let mut rng = StdRng::seed_from_u64(42);
    let data: Vec<f64> = (0..N_POSITION * N_MODE * N_DOF)
        .map(|_| rng.gen_range(-1f64..1f64))
        .collect();
    let table: String = data
        .chunks(N_DOF)
        .map(|row| {
            row.iter()
                .map(|x| format!("{:.18e}", x))
                .collect::<Vec<_>>()
                .join(" ")
                + "\n"
        })
        .collect();
    fs::write(ctx.data_dir.join("senM_pipeline.txt"), table)?;
    fs::write(ctx.data_dir.join("pinv.esti"), ESTI)?;

    let config = EstimatorConfig::load(ctx.data_dir.join("pinv.esti"))?;
    let model = SensitivityModel::builder()
        .config(config)
        .data_dir(&ctx.data_dir)
        .build()?;
    assert_eq!(model.n_row(), 4 * N_MODE);

    // DOFs #9 and #10 are not selected
    let x_true: Vec<f64> = (0..N_DOF)
        .map(|i| {
            if model.comp_idx().as_slice()[i] {
                0.1 * (i as f64 + 1.)
            } else {
                0.
            }
        })
        .collect();
    let y = model.tensor().boundary(4)? * DVector::from_column_slice(&x_true);

    let instrument = small_lsst();
    write_frames(&ctx, &instrument)?;
    let solver = TableSolver {
        fields: instrument.fields.iter().map(|f| (f.x, f.y)).collect(),
        coefficients: y
            .as_slice()
            .chunks(N_MODE)
            .map(|c| c.iter().map(|x| x * 1e3).collect())
            .collect(),
    };

    let wfs = WavefrontSensing::new(instrument)
        .stamp_size(16)
        .solver_dispatch(SolverDispatch::new(2));
    let catalogs = wfs.preprocess(&ctx)?;
    assert_eq!(catalogs.len(), 2);
    assert!(catalogs.iter().all(|c| c.len() == 4));
    wfs.solve(&ctx, &solver, None)?;

    // truth: 31 science fields followed by the 4 wavefront sensors, Z1 to Z8
    let truth: String = (0..N_POSITION + 4)
        .map(|i| {
            let row: Vec<f64> = match i.checked_sub(N_POSITION) {
                Some(k) => [0f64; 3]
                    .into_iter()
                    .chain(y.as_slice()[k * N_MODE..(k + 1) * N_MODE].iter().copied())
                    .collect(),
                None => vec![0f64; 8],
            };
            row.iter()
                .map(|x| format!("{:.18e}", x))
                .collect::<Vec<_>>()
                .join(" ")
                + "\n"
        })
        .collect();
    let truth_file = ctx.data_dir.join("zTrue.txt");
    fs::write(&truth_file, truth)?;
    let reports = wfs.compare(&ctx, &truth_file, N_POSITION + 4)?;
    assert_eq!(reports.len(), 2);
    for (exposure, report) in reports.iter().enumerate() {
        assert_eq!(report.exposure, exposure);
        assert_eq!(report.fields.len(), 4);
        assert!(report.max_rms() < 1e-9);
    }
    assert!(ctx.comparison_file().is_file());

    let measurement = wfs.measurement(&ctx, N_MODE)?;
    assert_eq!(measurement.len(), 4 * N_MODE);
    let estimate = model
        .estimator()
        .estimate(&measurement, &vec![0f64; measurement.len()])?;

    let error = estimate
        .xhat
        .iter()
        .zip(&x_true)
        .map(|(x, x0)| (x - x0).abs())
        .fold(0f64, f64::max);
    println!("DOF max. error: {:.3e}", error);
    assert!(error < 1e-9);
    // the wavefront modes left out of the estimation pass through
    for i in model.row_mask().indices() {
        assert!(estimate.residual[i].abs() < 1e-9);
    }
    assert!(estimate.residual_rms() > 0.);

    println!("Elapsed time: {}ms", now.elapsed().as_millis());
    Ok(())
}
