use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::inspect::TopicLabels;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `value` as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let file = File::create(path).map_err(io_error(path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("wrote {}", path.display());
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = File::open(path).map_err(io_error(path))?;

    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Non-empty trimmed lines of a plain word list; `#` starts a comment line.
pub fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut lines = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line.map_err(io_error(path))?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            lines.push(line.to_string());
        }
    }

    Ok(lines)
}

pub fn read_labels(path: &Path) -> Result<TopicLabels, StoreError> {
    let text = fs::read_to_string(path).map_err(io_error(path))?;

    TopicLabels::from_toml_str(&text).map_err(|source| StoreError::Labels {
        path: path.to_path_buf(),
        source,
    })
}
