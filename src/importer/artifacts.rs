/// Timestamped artifact files for rows that did not make it into the store.
///
/// Each file holds one line per failed statement or rejected record so it
/// can be corrected and replayed offline.

use crate::error::ImportError;
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<dir>/<kind>_<importer>_<YYYYmmdd-HHMMSS>.<ext>`
pub fn artifact_path(dir: &Path, kind: &str, importer: &str, ext: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}_{}.{}", kind, importer, at.format("%Y%m%d-%H%M%S"), ext))
}

/// Writes `lines` to a new artifact file stamped with the current time.
/// Returns `None` without touching the filesystem when there is nothing
/// to write.
pub fn write_artifact(
    dir: &Path,
    kind: &str,
    importer: &str,
    ext: &str,
    lines: &[String],
) -> Result<Option<PathBuf>, ImportError> {
    if lines.is_empty() {
        return Ok(None);
    }
    let path = artifact_path(dir, kind, importer, ext, Local::now());
    write_lines(&path, lines).map_err(|source| ImportError::Artifact {
        path: path.clone(),
        source,
    })?;
    Ok(Some(path))
}

fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_path_encodes_kind_importer_and_time() {
        let at = Local.with_ymd_and_hms(2024, 3, 29, 14, 56, 59).unwrap();
        let path = artifact_path(Path::new("/tmp/out"), "duplicates", "cosmo", "sql", at);
        assert_eq!(path, PathBuf::from("/tmp/out/duplicates_cosmo_20240329-145659.sql"));
    }

    #[test]
    fn test_empty_artifact_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_artifact(dir.path(), "errors", "cosmo", "sql", &[]).unwrap();
        assert!(written.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_artifact_is_newline_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec!["first;".to_string(), "second;".to_string()];
        let path = write_artifact(dir.path(), "errors", "cnv-rainfall", "sql", &lines)
            .unwrap()
            .expect("artifact should be written");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first;\nsecond;\n");
    }
}
