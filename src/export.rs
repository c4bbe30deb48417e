use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::card::Card;
use crate::error::PersistenceError;

const DELIMITER: char = ',';
const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    NothingToSave,
    Saved { rows: usize, path: PathBuf },
}

/// Writes one header-less CSV row per card. An empty slice leaves `path`
/// untouched. Rows are written to a sibling temporary file which replaces
/// `path` only once every row is flushed. An existing target keeps its
/// permissions, and a symlinked target is written through.
pub fn save_cards_csv(cards: &[Card], path: &Path) -> Result<SaveOutcome, PersistenceError> {
    if cards.is_empty() {
        return Ok(SaveOutcome::NothingToSave);
    }

    let write_error = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    let target = resolve_target(path);
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let existing = fs::metadata(&target).ok().map(|meta| meta.permissions());

    let mut temp = new_temp_file(dir).map_err(write_error)?;
    if let Some(permissions) = existing {
        temp.as_file().set_permissions(permissions).map_err(write_error)?;
    }
    let rows = write_csv(cards, &mut temp).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(&target).map_err(|err| write_error(err.error))?;

    debug!(rows, path = %path.display(), "wrote csv export");
    Ok(SaveOutcome::Saved {
        rows,
        path: path.to_path_buf(),
    })
}

fn resolve_target(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

// New exports get the usual 0o666 minus umask instead of tempfile's 0o600.
#[cfg(unix)]
fn new_temp_file(dir: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    Builder::new()
        .prefix(".phrasedeck")
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn new_temp_file(dir: &Path) -> io::Result<NamedTempFile> {
    Builder::new().prefix(".phrasedeck").tempfile_in(dir)
}

pub fn write_csv<W: Write>(cards: &[Card], mut writer: W) -> io::Result<usize> {
    let mut line = String::new();
    for card in cards {
        line.clear();
        for (index, cell) in card.row().into_iter().enumerate() {
            if index > 0 {
                line.push(DELIMITER);
            }
            line.push_str(&escape_field(cell));
        }
        line.push_str(LINE_TERMINATOR);
        writer.write_all(line.as_bytes())?;
    }
    writer.flush()?;
    Ok(cards.len())
}

fn escape_field(value: &str) -> Cow<'_, str> {
    let needs_quotes = value
        .chars()
        .any(|c| c == DELIMITER || c == '"' || c == '\r' || c == '\n');
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
