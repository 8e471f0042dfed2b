//! Drivers and version negotiation.
//!
//! A vendor declares a table of `(minVersion, driverName)` rows. The table
//! is sorted once, newest first; the live server version then picks the
//! first row it satisfies.

use crate::error::{DaoError, Result};
use crate::semver::Version;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Row name meaning "the driver one row below, server newer than tested"
pub const LATEST_DRIVER: &str = "[latest]";

/// Lifecycle hooks shared by graph and index drivers
#[async_trait]
pub trait Driver: Send + Sync {
    /// Runs once after the driver is bound; the DAO is ready when it resolves
    async fn on_after_connect(&self) -> Result<()> {
        Ok(())
    }

    /// Runs after the index of the data source was rebuilt
    async fn on_after_indexation(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDescriptor {
    pub min_version: Version,
    pub name: String,
}

/// Immutable driver table, sorted by descending `min_version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverTable {
    rows: Vec<DriverDescriptor>,
}

/// Non-fatal note emitted when the live version is outside the tested range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionWarning {
    NewerThanTested { actual: Version, newest: Version },
    OlderThanTested { actual: Version, oldest: Version },
}

impl fmt::Display for VersionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionWarning::NewerThanTested { actual, newest } => write!(
                f,
                "version {actual} is newer than anything tested (newest tested: {newest})"
            ),
            VersionWarning::OlderThanTested { actual, oldest } => write!(
                f,
                "version {actual} is older than anything tested (oldest tested: {oldest})"
            ),
        }
    }
}

/// Outcome of matching a live version against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSelection {
    pub driver: String,
    pub warning: Option<VersionWarning>,
}

impl DriverTable {
    pub fn new(mut rows: Vec<DriverDescriptor>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(DaoError::bug(format!(
                "A driver table needs at least 2 rows (got {})",
                rows.len()
            )));
        }
        // stable: rows sharing a version keep their declared order
        rows.sort_by(|a, b| b.min_version.cmp(&a.min_version));

        for (i, row) in rows.iter().enumerate() {
            if row.name.is_empty() {
                return Err(DaoError::bug("Driver names must not be empty"));
            }
            if row.name == LATEST_DRIVER {
                match rows.get(i + 1) {
                    Some(next) if next.name != LATEST_DRIVER => {}
                    _ => {
                        return Err(DaoError::bug(format!(
                            "\"{LATEST_DRIVER}\" must be followed by a concrete driver"
                        )))
                    }
                }
            }
        }

        Ok(Self { rows })
    }

    /// Build from `(minVersion, name)` pairs
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let rows = pairs
            .iter()
            .map(|(version, name)| {
                let min_version = Version::parse(version).map_err(|_| {
                    DaoError::bug(format!("Invalid minVersion \"{version}\" for driver {name}"))
                })?;
                Ok(DriverDescriptor {
                    min_version,
                    name: name.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(rows)
    }

    pub fn rows(&self) -> &[DriverDescriptor] {
        &self.rows
    }

    /// Concrete driver names, without the sentinel
    pub fn driver_names(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(|row| row.name.as_str())
            .filter(|name| *name != LATEST_DRIVER)
    }

    pub fn select(&self, actual: &Version) -> DriverSelection {
        let newest = &self.rows[0];
        let oldest = &self.rows[self.rows.len() - 1];

        let Some(index) = self.rows.iter().position(|row| row.min_version <= *actual) else {
            return DriverSelection {
                driver: oldest.name.clone(),
                warning: Some(VersionWarning::OlderThanTested {
                    actual: actual.clone(),
                    oldest: oldest.min_version.clone(),
                }),
            };
        };

        let row = &self.rows[index];
        if row.name != LATEST_DRIVER {
            return DriverSelection {
                driver: row.name.clone(),
                warning: None,
            };
        }

        // `new` guarantees a concrete row follows the sentinel
        let driver = self.rows[index + 1].name.clone();
        let warning = (*actual > newest.min_version).then(|| VersionWarning::NewerThanTested {
            actual: actual.clone(),
            newest: newest.min_version.clone(),
        });
        DriverSelection { driver, warning }
    }
}
