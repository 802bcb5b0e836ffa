//! Versioned migration scripts and the file-name convention they follow.
//!
//! A script file is named `<version>_<slug>[.<dialect>].<up|down>.sql`,
//! e.g. `000004_gists_fts.sqlite.up.sql`. Versions compare numerically, so
//! `000002` runs before `000010` regardless of zero padding.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use sqlshift_common::{Direction, Error, Result};

use crate::dialect::{Dialect, FeatureCategory};

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<version>[0-9]+)_(?P<slug>[A-Za-z0-9][A-Za-z0-9_\-]*)(?:\.(?P<dialect>[A-Za-z0-9]+))?\.(?P<direction>up|down)\.sql$",
    )
    .expect("file name pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: u64,
    pub name: String,
    pub direction: Direction,
    /// Set when the script only applies to one dialect.
    pub dialect: Option<Dialect>,
    pub category: Option<FeatureCategory>,
    pub body: String,
    pub file_name: String,
}

impl MigrationScript {
    /// Ascending by version; ties broken by dialect tag so ordering is total.
    pub fn cmp_ascending(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| tag_key(self.dialect).cmp(&tag_key(other.dialect)))
    }
}

fn tag_key(dialect: Option<Dialect>) -> &'static str {
    dialect.map(Dialect::as_str).unwrap_or("")
}

/// Parse a script file name and attach its body.
pub fn parse_script(file_name: &str, body: &str) -> Result<MigrationScript> {
    let load_error = |reason: String| Error::Load {
        file: file_name.to_string(),
        reason,
    };

    let caps = FILE_NAME.captures(file_name).ok_or_else(|| {
        load_error("expected <version>_<name>[.<dialect>].<up|down>.sql".to_string())
    })?;

    let version: u64 = caps["version"]
        .parse()
        .map_err(|e| load_error(format!("invalid version: {e}")))?;
    if i64::try_from(version).is_err() {
        return Err(load_error(format!("version {version} is too large")));
    }

    let direction = Direction::from_suffix(&caps["direction"])
        .ok_or_else(|| load_error("invalid direction".to_string()))?;

    let dialect = match caps.name("dialect") {
        Some(tag) => Some(
            tag.as_str()
                .parse::<Dialect>()
                .map_err(|e| load_error(e.to_string()))?,
        ),
        None => None,
    };

    let slug = &caps["slug"];
    Ok(MigrationScript {
        version,
        name: slug.to_string(),
        direction,
        dialect,
        category: FeatureCategory::from_slug(slug),
        body: body.to_string(),
        file_name: file_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_up_script() {
        let s = parse_script("001_create_users.up.sql", "CREATE TABLE users (id INTEGER);").unwrap();
        assert_eq!(s.version, 1);
        assert_eq!(s.name, "create_users");
        assert_eq!(s.direction, Direction::Up);
        assert_eq!(s.dialect, None);
        assert_eq!(s.category, None);
        assert_eq!(s.body, "CREATE TABLE users (id INTEGER);");
    }

    #[test]
    fn parses_dialect_tag_and_category() {
        let s = parse_script("000004_gists_fts.sqlite.down.sql", "").unwrap();
        assert_eq!(s.version, 4);
        assert_eq!(s.direction, Direction::Down);
        assert_eq!(s.dialect, Some(Dialect::Sqlite));
        assert_eq!(s.category, Some(FeatureCategory::FullTextSearch));
    }

    #[test]
    fn zero_padding_does_not_affect_version() {
        let a = parse_script("000002_a.up.sql", "").unwrap();
        let b = parse_script("000010_b.up.sql", "").unwrap();
        assert_eq!(a.version, 2);
        assert_eq!(b.version, 10);
        assert_eq!(a.cmp_ascending(&b), Ordering::Less);
    }

    #[test]
    fn rejects_malformed_names() {
        for name in [
            "create_users.up.sql",
            "001_create_users.sql",
            "001_create_users.up.txt",
            "001_create_users.sideways.sql",
            "001_.up.sql",
            "README.md",
        ] {
            let err = parse_script(name, "").unwrap_err();
            assert!(matches!(err, Error::Load { .. }), "{name} should fail to load");
        }
    }

    #[test]
    fn rejects_unknown_dialect_tag() {
        let err = parse_script("003_x.oracle.up.sql", "").unwrap_err();
        assert!(err.to_string().contains("unsupported dialect: oracle"));
    }

    #[test]
    fn rejects_versions_beyond_ledger_range() {
        let err = parse_script("99999999999999999999_x.up.sql", "").unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }
}
