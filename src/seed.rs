//! Fallback volume table
//!
//! Plain text, one `<stream-key> <decibels>` pair per line. Blank lines and
//! lines starting with `#` or `;` are ignored. Only attenuation (dB ≤ 0) is
//! accepted; other values are logged and skipped. A line with fewer than two
//! words makes the whole table invalid.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub name: String,
    pub db: f64,
}

/// Where the table comes from, and whether its absence is an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedTable {
    None,
    /// Default location; skipped when the file does not exist
    Optional(std::path::PathBuf),
    /// Explicitly configured; must be readable
    Required(std::path::PathBuf),
}

/// Parse table contents; `origin` names the source in diagnostics
pub fn parse_table(contents: &str, origin: &str) -> Result<Vec<SeedRecord>> {
    let mut records = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        // The value is everything after the key, so trailing words make it unparseable
        let Some((name, value)) = line
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
        else {
            bail!("[{}:{}] failed to parse line - too few words", origin, line_no);
        };

        let db: f64 = match value.parse() {
            Ok(db) => db,
            Err(_) => {
                warn!("[{}:{}] failed to parse decibel value '{}'", origin, line_no, value);
                continue;
            }
        };
        if db > 0.0 {
            warn!(
                "[{}:{}] positive decibel values are not allowed, not restoring volume {:?}",
                origin, line_no, name
            );
            continue;
        }

        records.push(SeedRecord {
            name: name.to_owned(),
            db,
        });
    }

    Ok(records)
}

/// Read and parse a table file.
///
/// Returns `Ok(None)` for a missing file when `required` is false.
pub fn load_table(path: &Path, required: bool) -> Result<Option<Vec<SeedRecord>>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open fallback table {}", path.display()))
        }
    };
    parse_table(&contents, &path.display().to_string()).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_skips_comments_and_bad_values() {
        let table = "\
# default attenuation
sink-input-by-media-role:event  -20

; notifications
sink-input-by-media-role:phone 0
sink-input-by-media-role:music 3
sink-input-by-media-role:video loud
";
        let records = parse_table(table, "test").unwrap();
        assert_eq!(
            records,
            vec![
                SeedRecord {
                    name: "sink-input-by-media-role:event".into(),
                    db: -20.0
                },
                SeedRecord {
                    name: "sink-input-by-media-role:phone".into(),
                    db: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_missing_value_fails_table() {
        let err = parse_table("ok -1\nlonely\n", "seed").unwrap_err();
        assert!(err.to_string().contains("[seed:2]"));
    }

    #[test]
    fn test_trailing_words_make_value_invalid() {
        let records = parse_table("alice -6 junk\nbob\t -3\n", "seed").unwrap();
        assert_eq!(
            records,
            vec![SeedRecord {
                name: "bob".into(),
                db: -3.0
            }]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.table");
        assert!(load_table(&path, false).unwrap().is_none());
        assert!(load_table(&path, true).is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "alice -6").unwrap();
        let records = load_table(file.path(), true).unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alice");
    }
}
