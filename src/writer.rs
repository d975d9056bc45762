use crate::{
    config::Config,
    error::{Error, Result},
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info};

const FALLBACK_NAME: &str = "software";

/// Keeps ASCII-safe file-name characters; everything else becomes `_`.
fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// Deterministic document name: `{name}_{version}_source_code.{ext}`.
pub(crate) fn output_file_name(name: &str, version: &str, extension: &str) -> String {
    format!("{}_{}_source_code.{extension}", sanitize(name), sanitize(version))
}

/// Path of the JSON summary written next to `document`.
pub(crate) fn summary_path(document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .map_or_else(|| FALLBACK_NAME.into(), |s| s.to_string_lossy());
    document.with_file_name(format!("{stem}.summary.json"))
}

/// Writes the rendered document with atomic operations.
pub(crate) struct Writer {
    backup_existing: bool,
}

impl Writer {
    /// Creates a new writer from configuration.
    pub(crate) const fn new(config: &Config) -> Self {
        Self {
            backup_existing: config.backup_existing,
        }
    }

    /// Writes the document to `path`, creating its directory.
    ///
    /// Returns the backup path if an existing file was backed up.
    ///
    /// # Errors
    ///
    /// Returns a render error if the directory, the backup or the document
    /// cannot be written.
    pub(crate) fn write_document(&self, path: &Path, bytes: &[u8]) -> Result<Option<PathBuf>> {
        self.write_document_inner(path, bytes)
            .map_err(|e| match e {
                Error::Render { .. } => e,
                other => Error::render(path, other.to_string()),
            })
    }

    fn write_document_inner(&self, path: &Path, bytes: &[u8]) -> Result<Option<PathBuf>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let backup = if path.exists() && self.backup_existing {
            Some(Self::backup_file(path)?)
        } else {
            None
        };

        Self::write_file_atomic(path, bytes)?;

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(backup)
    }

    /// Writes a file atomically.
    ///
    /// # Process
    ///
    /// 1. Writes content to a temporary file next to the target
    /// 2. Syncs the temporary file to disk
    /// 3. Renames the temporary file to the target path
    fn write_file_atomic(path: &Path, content: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::render(path, "output path has no file name"))?
            .to_string_lossy();
        let temp_path = path.with_file_name(format!("{file_name}.tmp"));

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .sync_all()
            .map_err(|e| Error::io(&temp_path, e))?;

        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(path, e));
        }

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(path: &Path) -> Result<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_nanos();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::render(path, "output path has no file name"))?
            .to_string_lossy();

        let backup_path = path.with_file_name(format!("{filename}.backup.{timestamp}"));

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }

    /// Writes `summary` as pretty JSON next to `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary cannot be serialized or written.
    pub(crate) fn write_summary<T: Serialize>(&self, document: &Path, summary: &T) -> Result<PathBuf> {
        let path = summary_path(document);
        let json = serde_json::to_vec_pretty(summary)?;

        Self::write_file_atomic(&path, &json)?;

        info!("Wrote summary to {}", path.display());
        Ok(path)
    }
}
