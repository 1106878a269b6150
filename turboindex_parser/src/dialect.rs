// Dialect model
//
// A dialect is a server flavor plus version. It decides which grammar
// variants the parser accepts and which index features may be recommended.

use serde::Serialize;
use std::fmt;

use crate::error::DialectError;

/// Server family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    MySql,
    MariaDb,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::MySql => "mysql",
            Flavor::MariaDb => "mariadb",
        }
    }
}

/// A version-specific grammar/feature variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dialect {
    pub flavor: Flavor,
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::mysql(8, 0)
    }
}

impl Dialect {
    pub const fn mysql(major: u16, minor: u16) -> Self {
        Self {
            flavor: Flavor::MySql,
            major,
            minor,
            patch: 0,
        }
    }

    pub const fn mariadb(major: u16, minor: u16) -> Self {
        Self {
            flavor: Flavor::MariaDb,
            major,
            minor,
            patch: 0,
        }
    }

    pub const fn with_patch(mut self, patch: u16) -> Self {
        self.patch = patch;
        self
    }

    /// Parse a logical tag such as `mysql_5.7`, `mysql-8.0.32`, `mariadb_10.x`
    /// or a bare flavor (`mysql`, `mariadb`).
    ///
    /// A wildcard component (`x`) resolves to `0`, i.e. the oldest release of
    /// the series, so feature checks stay conservative.
    pub fn from_tag(tag: &str) -> Result<Self, DialectError> {
        let lowered = tag.trim().to_ascii_lowercase();

        let (flavor, rest) = if let Some(rest) = lowered.strip_prefix("mariadb") {
            (Flavor::MariaDb, rest)
        } else if let Some(rest) = lowered.strip_prefix("mysql") {
            (Flavor::MySql, rest)
        } else {
            return Err(DialectError::UnknownTag(tag.to_string()));
        };

        let version = rest.trim_start_matches(|c: char| c == '_' || c == '-' || c == ' ');
        if version.is_empty() {
            return Ok(match flavor {
                Flavor::MySql => Dialect::mysql(8, 0),
                Flavor::MariaDb => Dialect::mariadb(10, 6),
            });
        }

        let (major, minor, patch) = parse_version(version)
            .ok_or_else(|| DialectError::InvalidVersion(tag.to_string()))?;
        Ok(Dialect {
            flavor,
            major,
            minor,
            patch,
        })
    }

    /// Parse the string returned by `SELECT VERSION()`, e.g. `8.0.32`,
    /// `5.7.44-log` or `10.6.12-MariaDB-1:10.6.12+maria~ubu2004`.
    pub fn from_server_version(version: &str) -> Result<Self, DialectError> {
        let flavor = if version.to_ascii_lowercase().contains("mariadb") {
            Flavor::MariaDb
        } else {
            Flavor::MySql
        };

        let numeric: String = version
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let (major, minor, patch) = parse_version(&numeric)
            .ok_or_else(|| DialectError::InvalidVersion(version.to_string()))?;

        Ok(Dialect {
            flavor,
            major,
            minor,
            patch,
        })
    }

    fn at_least(&self, major: u16, minor: u16, patch: u16) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }

    /// `OVER (...)` window functions.
    pub fn supports_window_functions(&self) -> bool {
        match self.flavor {
            Flavor::MySql => self.at_least(8, 0, 0),
            Flavor::MariaDb => self.at_least(10, 2, 0),
        }
    }

    /// Non-recursive `WITH name AS (...)` common table expressions.
    pub fn supports_cte(&self) -> bool {
        match self.flavor {
            Flavor::MySql => self.at_least(8, 0, 0),
            Flavor::MariaDb => self.at_least(10, 2, 0),
        }
    }

    /// Functional key parts such as `INDEX ((YEAR(created_at)))`.
    pub fn supports_functional_indexes(&self) -> bool {
        matches!(self.flavor, Flavor::MySql) && self.at_least(8, 0, 13)
    }

    /// Descending index key parts that are actually stored descending.
    pub fn supports_descending_indexes(&self) -> bool {
        match self.flavor {
            Flavor::MySql => self.at_least(8, 0, 0),
            Flavor::MariaDb => self.at_least(10, 8, 0),
        }
    }

    pub fn index_syntax(&self) -> IndexSyntax {
        IndexSyntax::for_dialect(*self)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}.{}", self.flavor.as_str(), self.major, self.minor)?;
        if self.patch > 0 {
            write!(f, ".{}", self.patch)?;
        }
        Ok(())
    }
}

/// Index DDL capabilities for a dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSyntax {
    pub functional_supported: bool,
    pub descending_supported: bool,
    pub if_not_exists_supported: bool,
}

impl IndexSyntax {
    /// Get index syntax for a dialect
    pub fn for_dialect(dialect: Dialect) -> Self {
        IndexSyntax {
            functional_supported: dialect.supports_functional_indexes(),
            descending_supported: dialect.supports_descending_indexes(),
            // MariaDB accepts CREATE INDEX IF NOT EXISTS, MySQL does not
            if_not_exists_supported: matches!(dialect.flavor, Flavor::MariaDb),
        }
    }
}

fn parse_version(text: &str) -> Option<(u16, u16, u16)> {
    let mut parts = text.split('.');
    let mut next = |required: bool| -> Option<u16> {
        match parts.next() {
            Some("x") | Some("X") | Some("*") => Some(0),
            Some(p) if !p.is_empty() => p.parse().ok(),
            _ if required => None,
            _ => Some(0),
        }
    };
    let major = next(true)?;
    let minor = next(false)?;
    let patch = next(false)?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!(Dialect::from_tag("mysql_5.7").unwrap(), Dialect::mysql(5, 7));
        assert_eq!(
            Dialect::from_tag("mysql-8.0.32").unwrap(),
            Dialect::mysql(8, 0).with_patch(32)
        );
        assert_eq!(Dialect::from_tag("MariaDB_10.x").unwrap(), Dialect::mariadb(10, 0));
        assert_eq!(Dialect::from_tag("mariadb").unwrap(), Dialect::mariadb(10, 6));
        assert!(Dialect::from_tag("postgres_15").is_err());
        assert!(Dialect::from_tag("mysql_eight").is_err());
    }

    #[test]
    fn test_parse_server_versions() {
        let maria = Dialect::from_server_version("10.6.12-MariaDB-1:10.6.12+maria~ubu2004").unwrap();
        assert_eq!(maria.flavor, Flavor::MariaDb);
        assert_eq!((maria.major, maria.minor, maria.patch), (10, 6, 12));

        let mysql = Dialect::from_server_version("5.7.44-log").unwrap();
        assert_eq!(mysql, Dialect::mysql(5, 7).with_patch(44));
    }

    #[test]
    fn test_capabilities() {
        assert!(!Dialect::mysql(5, 7).supports_window_functions());
        assert!(Dialect::mysql(8, 0).supports_window_functions());
        assert!(Dialect::mariadb(10, 2).supports_cte());
        assert!(!Dialect::mysql(8, 0).with_patch(12).supports_functional_indexes());
        assert!(Dialect::mysql(8, 0).with_patch(13).supports_functional_indexes());
        assert!(!Dialect::mariadb(11, 0).supports_functional_indexes());
    }

    #[test]
    fn test_display_round_trips_through_tag() {
        for dialect in [Dialect::mysql(5, 7), Dialect::mariadb(10, 11), Dialect::mysql(8, 0).with_patch(36)] {
            assert_eq!(Dialect::from_tag(&dialect.to_string()).unwrap(), dialect);
        }
    }
}
