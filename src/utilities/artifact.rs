//! Plain text numeric tables and pickle files exchanged between pipeline steps

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::ArtifactError;

type Result<T> = std::result::Result<T, ArtifactError>;

/// Reads a whitespace separated numeric table
///
/// Blank lines and lines starting with `#` are skipped
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let contents = read_to_string(path)?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !(line.is_empty() || line.starts_with('#'))
        })
        .map(|(i, line)| {
            line.split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|_| ArtifactError::Parse {
                        path: path.to_path_buf(),
                        line: i + 1,
                        token: token.to_string(),
                    })
                })
                .collect()
        })
        .collect()
}

/// Writes a numeric table, one row per line with a fixed width scientific format
pub fn write_table<'a, P, I>(path: P, rows: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut contents = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|x| format!("{:.18e}", x)).collect();
        contents.push_str(&line.join(" "));
        contents.push('\n');
    }
    overwrite(path, contents.as_bytes())
}

/// Reads a file into a string, a missing file is a [ArtifactError::Missing] error
pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ArtifactError::Missing(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|e| ArtifactError::Read(e, path.to_path_buf()))
}

/// Writes `contents` to `path`, removing first any existing file at `path`
pub fn overwrite<P: AsRef<Path>>(path: P, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    remove_existing(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::Write(e, parent.to_path_buf()))?;
    }
    fs::write(path, contents).map_err(|e| ArtifactError::Write(e, path.to_path_buf()))
}

fn remove_existing(path: &Path) -> Result<()> {
    if path.is_file() {
        log::debug!("removing stale {:?}", path);
        fs::remove_file(path).map_err(|e| ArtifactError::Write(e, path.to_path_buf()))?;
    }
    Ok(())
}

/// Serializes `data` into the pickle file `path`, removing first any existing file at `path`
pub fn dump<T: Serialize, P: AsRef<Path>>(data: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    remove_existing(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::Write(e, parent.to_path_buf()))?;
    }
    let file = File::create(path).map_err(|e| ArtifactError::Write(e, path.to_path_buf()))?;
    let mut buffer = BufWriter::new(file);
    serde_pickle::to_writer(&mut buffer, data, Default::default())
        .map_err(|e| ArtifactError::Encode(e, path.to_path_buf()))?;
    buffer
        .flush()
        .map_err(|e| ArtifactError::Write(e, path.to_path_buf()))
}

/// Deserializes the pickle file `path`
pub fn load<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ArtifactError::Missing(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| ArtifactError::Read(e, path.to_path_buf()))?;
    serde_pickle::from_reader(file, Default::default())
        .map_err(|e| ArtifactError::Decode(e, path.to_path_buf()))
}
