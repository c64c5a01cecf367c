use crate::snapshot::Snapshot;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

pub fn dump_file_name(hostname: &str, timestamp: &str) -> String {
    let host: String = hostname
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("process_dump_{host}_{timestamp}.json")
}

pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<PathBuf, ArchiveError> {
    fs::create_dir_all(dir).map_err(|source| ArchiveError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let path = dir.join(dump_file_name(snapshot.hostname(), snapshot.timestamp()));
    let body = serde_json::to_vec_pretty(snapshot)?;
    fs::write(&path, body).map_err(|source| ArchiveError::Write {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}
