use std::{
    collections::HashMap,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, SelectionMask};

type Result<T> = std::result::Result<T, ConfigError>;

/// State estimation method
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorStrategy {
    /// Truncated SVD pseudo-inverse of the sensitivity matrix
    #[default]
    Pinv,
}
impl FromStr for EstimatorStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pinv" => Ok(Self::Pinv),
            _ => Err(ConfigError::UnsupportedStrategy(s.into())),
        }
    }
}
impl Display for EstimatorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pinv => write!(f, "pinv"),
        }
    }
}

/// Opens or closes a comment block
const BLOCK_DELIMITER: &str = "###";

/// Classification of a line of an estimator parameter file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigLine<'a> {
    Blank,
    Comment,
    /// `key value`
    Scalar { key: &'a str, value: &'a str },
    /// a digit run like `1111100000`
    Bits(&'a str),
}
impl<'a> ConfigLine<'a> {
    fn classify(line: &'a str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Blank);
        }
        if line.starts_with('#') {
            return Ok(Self::Comment);
        }
        if line.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Self::Bits(line));
        }
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(key), Some(value)) => Ok(Self::Scalar { key, value }),
            (Some(key), None) => Err(ConfigError::InvalidValue {
                key: key.into(),
                value: String::new(),
            }),
            _ => Ok(Self::Blank),
        }
    }
}

/// Estimator parameters
///
/// The parameters are read from a line oriented file:
/// ```text
/// ###
/// block comment
/// ###
/// # comment
/// estimator_strategy pinv
/// senMFile senM_35_19_50.txt
/// znmax 22
/// n_bending_M1M3 20
/// n_bending_M2 20
/// normalize_A 0
/// n_singular_inf 5
/// icomp 50
/// 11111111111111111111111111111111111111111111111111
/// izn3 19
/// 1111111111111111111
/// ```
/// `icomp` and `izn3` give the number of DOFs and wavefront modes selected by the masks
/// written on the lines that immediately follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub strategy: EstimatorStrategy,
    /// sensitivity data file, relative to the data directory
    pub sensitivity_file: Option<PathBuf>,
    /// largest Zernike index of the wavefront measurements
    pub zn_max: usize,
    pub n_bending_m1m3: usize,
    pub n_bending_m2: usize,
    /// normalizes the sensitivity matrix columns with the DOF units
    pub normalize_a: bool,
    /// number of the smallest singular values discarded in the pseudo-inverse
    pub n_singular_inf: usize,
    pub icomp: usize,
    pub izn3: usize,
    /// DOF selection mask
    pub comp_idx: SelectionMask,
    /// wavefront mode selection mask
    pub zn3_idx: SelectionMask,
}
/// Default properties:
///  * strategy: pinv
///  * znmax: 22
///  * # of M1M3 and M2 bending modes: 20
///  * normalization: no
///  * # of discarded singular values: 0
///  * masks: all the 50 DOFs and 19 wavefront modes
impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            strategy: EstimatorStrategy::Pinv,
            sensitivity_file: None,
            zn_max: 22,
            n_bending_m1m3: 20,
            n_bending_m2: 20,
            normalize_a: false,
            n_singular_inf: 0,
            icomp: 50,
            izn3: 19,
            comp_idx: SelectionMask::all(50),
            zn3_idx: SelectionMask::all(19),
        }
    }
}

impl Display for EstimatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Estimator ({}):", self.strategy)?;
        if let Some(file) = &self.sensitivity_file {
            writeln!(f, " * sensitivity file: {:?}", file)?;
        }
        writeln!(
            f,
            " * modes: Z4-Z{} ({} selected)",
            self.zn_max, self.izn3
        )?;
        writeln!(
            f,
            " * DOFs: {} M1M3 + {} M2 bending modes + 10 rigid body motions ({} selected)",
            self.n_bending_m1m3, self.n_bending_m2, self.icomp
        )?;
        write!(
            f,
            " * normalized: {}, # discarded singular values: {}",
            self.normalize_a, self.n_singular_inf
        )
    }
}

impl EstimatorConfig {
    /// Number of wavefront modes per sample position
    #[inline]
    pub fn n_mode(&self) -> usize {
        self.zn_max - 3
    }
    /// Number of degrees of freedom
    #[inline]
    pub fn n_dof(&self) -> usize {
        self.n_bending_m1m3 + self.n_bending_m2 + 10
    }
    /// Loads the estimator parameters from the file `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
        let config: Self = contents.parse()?;
        log::info!("{}", config);
        Ok(config)
    }
    /// Loads the estimator parameters from a toml file
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
        let config: Self = toml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }
    /// Saves the estimator parameters into a toml file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        fs::write(&path, format!("# ::aos::EstimatorConfig\n\n{}", toml))
            .map_err(|e| ConfigError::Write(e, path.as_ref().to_path_buf()))
    }
    /// Checks the masks against the declared cardinalities and the tensor dimensions
    pub fn check(&self) -> Result<()> {
        if self.zn_max < 4 {
            return Err(ConfigError::InvalidValue {
                key: "znmax".into(),
                value: self.zn_max.to_string(),
            });
        }
        check_mask("icomp", &self.comp_idx, self.icomp, self.n_dof())?;
        check_mask("izn3", &self.zn3_idx, self.izn3, self.n_mode())
    }
}

fn check_mask(
    name: &'static str,
    mask: &SelectionMask,
    declared: usize,
    expected_len: usize,
) -> Result<()> {
    if mask.nnz() != declared {
        return Err(ConfigError::MaskCardinality {
            mask: name,
            declared,
            found: mask.nnz(),
        });
    }
    if mask.len() != expected_len {
        return Err(ConfigError::MaskLength {
            mask: name,
            expected: expected_len,
            found: mask.len(),
        });
    }
    Ok(())
}

fn scalar<T: FromStr>(scalars: &HashMap<&str, &str>, key: &'static str) -> Result<T> {
    let value = scalars.get(key).ok_or(ConfigError::MissingKey(key))?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        value: value.to_string(),
    })
}

/// Concatenates the digit runs that immediately follow the `key` line
fn mask_block(
    lines: &[ConfigLine<'_>],
    key: &'static str,
) -> Result<SelectionMask> {
    let start = lines
        .iter()
        .rposition(|line| matches!(line, ConfigLine::Scalar { key: k, .. } if *k == key))
        .ok_or(ConfigError::MissingKey(key))?;
    let bits: String = lines[start + 1..]
        .iter()
        .map_while(|line| match line {
            ConfigLine::Bits(bits) => Some(*bits),
            _ => None,
        })
        .collect();
    if bits.is_empty() {
        return Err(ConfigError::MissingMask(key));
    }
    bits.parse().map_err(|c: char| ConfigError::InvalidValue {
        key: key.into(),
        value: c.to_string(),
    })
}

impl FromStr for EstimatorConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        // first pass: line classification outside of comment blocks
        let mut in_block = false;
        let mut lines = vec![];
        for line in s.lines() {
            if line.trim().starts_with(BLOCK_DELIMITER) {
                in_block = !in_block;
                continue;
            }
            if in_block {
                continue;
            }
            match ConfigLine::classify(line)? {
                ConfigLine::Blank | ConfigLine::Comment => (),
                line => lines.push(line),
            }
        }
        let scalars: HashMap<&str, &str> = lines
            .iter()
            .filter_map(|line| match line {
                ConfigLine::Scalar { key, value } => Some((*key, *value)),
                _ => None,
            })
            .collect();

        let normalize_a: i32 = scalar(&scalars, "normalize_A")?;
        let config = Self {
            strategy: scalar::<String>(&scalars, "estimator_strategy")?.parse()?,
            sensitivity_file: scalars.get("senMFile").map(PathBuf::from),
            zn_max: scalar(&scalars, "znmax")?,
            n_bending_m1m3: scalar(&scalars, "n_bending_M1M3")?,
            n_bending_m2: scalar(&scalars, "n_bending_M2")?,
            normalize_a: normalize_a != 0,
            n_singular_inf: scalar(&scalars, "n_singular_inf")?,
            icomp: scalar(&scalars, "icomp")?,
            izn3: scalar(&scalars, "izn3")?,
            // second pass: masks keyed by the scalars
            comp_idx: mask_block(&lines, "icomp")?,
            zn3_idx: mask_block(&lines, "izn3")?,
        };
        config.check()?;
        Ok(config)
    }
}
