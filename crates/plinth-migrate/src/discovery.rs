//! Finds migration files under `<root>/<feature>/migrations/`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MigrationError;

const MIGRATIONS_DIR: &str = "migrations";
const DOWN_SUFFIX: &str = ".down";

/// A runnable migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Ledger key: `<feature>/migrations/<name>`.
    pub file: String,
    /// Base name, which alone decides the run order.
    pub name: String,
    pub path: PathBuf,
    /// The `<stem>.down.<ext>` companion next to it, if any.
    pub down: Option<PathBuf>,
}

impl MigrationFile {
    pub fn is_sql(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext == "sql")
    }
}

/// Lists every runnable migration below `root`, ordered by file name and
/// then by relative path. Down companions are attached to their migration
/// instead of being listed; hidden files are ignored.
///
/// # Errors
///
/// Returns `MigrationError::Discovery` if `root` or one of the migration
/// folders cannot be read.
pub fn discover(root: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    let mut features = Vec::new();
    for entry in read_dir(root)? {
        let path = entry.path();
        if !path.join(MIGRATIONS_DIR).is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(feature) => features.push((feature, path.join(MIGRATIONS_DIR))),
            Err(name) => tracing::warn!(?name, "skipping folder with a non utf-8 name"),
        }
    }
    features.sort();

    let mut files = Vec::new();
    for (feature, dir) in features {
        let mut ups = Vec::new();
        let mut downs = HashMap::new();

        for entry in read_dir(&dir)? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    tracing::warn!(?name, "skipping migration with a non utf-8 name");
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }
            match up_name_of_down(&name) {
                Some(up) => {
                    downs.insert(up, path);
                }
                None => ups.push((name, path)),
            }
        }

        for (name, path) in ups {
            let down = downs.remove(&name);
            files.push(MigrationFile {
                file: format!("{feature}/{MIGRATIONS_DIR}/{name}"),
                name,
                path,
                down,
            });
        }
        for orphan in downs.into_values() {
            tracing::warn!(path = %orphan.display(), "down migration without a matching up migration");
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.file.cmp(&b.file)));
    Ok(files)
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>, MigrationError> {
    let discovery = |source| MigrationError::Discovery {
        path: dir.to_path_buf(),
        source,
    };
    fs::read_dir(dir)
        .map_err(discovery)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(discovery)
}

/// `002-x.down.sql` → `002-x.sql`; `None` for anything that is not a down
/// companion.
fn up_name_of_down(name: &str) -> Option<String> {
    if let Some(base) = name.strip_suffix(DOWN_SUFFIX) {
        return (!base.is_empty()).then(|| base.to_string());
    }
    let path = Path::new(name);
    let stem = path.file_stem()?.to_str()?;
    let base = stem.strip_suffix(DOWN_SUFFIX)?;
    if base.is_empty() {
        return None;
    }
    Some(match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{base}.{ext}"),
        None => base.to_string(),
    })
}
