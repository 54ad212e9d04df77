use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::ArtifactError, utilities::artifact};

/// Wavefront sensing catalog entry
///
/// A catalog line is
/// ```text
/// intra_x intra_y extra_x extra_y intra_stamp extra_stamp
/// ```
/// with the field angles in degree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// intra-focal image field angle
    pub intra_field: (f64, f64),
    /// extra-focal image field angle
    pub extra_field: (f64, f64),
    /// intra-focal stamp file
    pub intra_file: PathBuf,
    /// extra-focal stamp file
    pub extra_file: PathBuf,
}

impl Display for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:9.6} {:9.6} {:9.6} {:9.6} {} {}",
            self.intra_field.0,
            self.intra_field.1,
            self.extra_field.0,
            self.extra_field.1,
            self.intra_file.display(),
            self.extra_file.display()
        )
    }
}

impl CatalogEntry {
    fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [ix, iy, ex, ey, intra_file, extra_file] = tokens.as_slice() else {
            return None;
        };
        Some(Self {
            intra_field: (ix.parse().ok()?, iy.parse().ok()?),
            extra_field: (ex.parse().ok()?, ey.parse().ok()?),
            intra_file: intra_file.into(),
            extra_file: extra_file.into(),
        })
    }
}

/// Writes the catalog, one line per field
pub fn write<P: AsRef<Path>>(path: P, entries: &[CatalogEntry]) -> Result<(), ArtifactError> {
    let contents: String = entries.iter().map(|entry| format!("{entry}\n")).collect();
    artifact::overwrite(path, contents.as_bytes())
}

/// Reads the catalog, the entries are in the order of the lines
pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogEntry>, ArtifactError> {
    let path = path.as_ref();
    artifact::read_to_string(path)?
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            CatalogEntry::parse(line).ok_or_else(|| ArtifactError::Catalog {
                path: path.to_path_buf(),
                line: i + 1,
            })
        })
        .collect()
}
