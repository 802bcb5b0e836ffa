use std::collections::HashMap;
use std::path::PathBuf;

use sqlshift_common::{Direction, Error, Result};
use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::migrations::{MigrationScript, parse_script};

/// A script as handed over by a source, before its name is interpreted.
#[derive(Debug, Clone)]
pub struct RawScript {
    pub file_name: String,
    pub body: String,
}

/// Read-only supplier of migration scripts.
pub trait MigrationSource {
    fn scripts(&self) -> Result<Vec<RawScript>>;
}

/// Scripts stored as files in one directory (not searched recursively).
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MigrationSource for DirectorySource {
    fn scripts(&self) -> Result<Vec<RawScript>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read migrations dir {}: {e}", self.dir.display()),
            ))
        })?;

        let mut scripts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("skipping migration file with non UTF-8 name: {}", path.display());
                continue;
            };
            scripts.push(RawScript {
                file_name: file_name.to_string(),
                body: std::fs::read_to_string(&path)?,
            });
        }
        debug!("found {} files in {}", scripts.len(), self.dir.display());
        Ok(scripts)
    }
}

/// Scripts compiled into the binary, typically with `include_str!`.
///
/// ```ignore
/// static MIGRATIONS: &[(&str, &str)] = &[
///     ("000001_init.up.sql", include_str!("../migrations/000001_init.up.sql")),
/// ];
/// let source = StaticSource::new(MIGRATIONS);
/// ```
pub struct StaticSource {
    entries: &'static [(&'static str, &'static str)],
}

impl StaticSource {
    pub fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }
}

impl MigrationSource for StaticSource {
    fn scripts(&self) -> Result<Vec<RawScript>> {
        Ok(self
            .entries
            .iter()
            .map(|(name, body)| RawScript {
                file_name: name.to_string(),
                body: body.to_string(),
            })
            .collect())
    }
}

/// Load the scripts for one direction, sorted ascending by version.
///
/// Files whose names cannot be parsed are logged and skipped. Two scripts
/// sharing a version, direction and dialect tag are an error, as is an
/// untagged script sharing a version with a tagged one.
pub fn load_scripts(
    source: &dyn MigrationSource,
    direction: Direction,
) -> Result<Vec<MigrationScript>> {
    let mut scripts = Vec::new();
    for raw in source.scripts()? {
        match parse_script(&raw.file_name, &raw.body) {
            Ok(script) if script.direction == direction => scripts.push(script),
            Ok(_) => {}
            Err(e) => warn!("{e}; skipping"),
        }
    }

    scripts.sort_by(|a, b| a.cmp_ascending(b));
    check_unique(&scripts)?;
    Ok(scripts)
}

fn check_unique(scripts: &[MigrationScript]) -> Result<()> {
    let mut seen: HashMap<(u64, Option<Dialect>), &MigrationScript> = HashMap::new();
    for script in scripts {
        let clash = seen
            .get(&(script.version, script.dialect))
            .or_else(|| match script.dialect {
                // An untagged script would run alongside every tagged variant.
                Some(_) => seen.get(&(script.version, None)),
                None => seen
                    .iter()
                    .find(|((version, _), _)| *version == script.version)
                    .map(|(_, first)| first),
            });
        if let Some(first) = clash {
            return Err(Error::DuplicateVersion {
                version: script.version,
                direction: script.direction,
                first: first.file_name.clone(),
                second: script.file_name.clone(),
            });
        }
        seen.insert((script.version, script.dialect), script);
    }
    Ok(())
}
