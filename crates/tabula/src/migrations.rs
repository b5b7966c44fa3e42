//! The migration log and the migrator.
//!
//! A [`MigrationLog`] is an append-only directory of JSON files, one per
//! generated migration, named `m<YYYY_MM_DD_HHMMSS>_<name>.json`. Each file
//! holds the planned steps and the schema snapshot they lead to; the newest
//! snapshot is what the next plan is computed against.
//!
//! A [`Migrator`] applies pending files to a [`Store`], one transaction per
//! migration, recording each version in the same transaction.

use std::fs::OpenOptions;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tabula_schema::PhysicalSchema;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::plan::{self, MigrationPlan, MigrationStep};
use crate::store::{Store, StoreTransaction};

/// `YYYY_MM_DD_HHMMSS`
const VERSION_FORMAT: &str = "%Y_%m_%d_%H%M%S";
const VERSION_LEN: usize = 17;

/// One persisted migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub created_at: Timestamp,
    pub steps: Vec<MigrationStep>,
    /// The schema after applying `steps`.
    pub snapshot: PhysicalSchema,
}

impl MigrationFile {
    pub fn file_name(&self) -> String {
        format!("m{}_{}.json", self.version, self.name)
    }

    pub fn plan(&self) -> MigrationPlan {
        MigrationPlan {
            steps: self.steps.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid migration file {path}: {source}")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid migration name {0:?}")]
    InvalidName(String),

    #[error("migration file {0} already exists")]
    AlreadyExists(Utf8PathBuf),

    #[error("migration {version} is not newer than the latest migration {latest}")]
    OutOfOrder { version: String, latest: String },
}

/// The on-disk migration history.
#[derive(Debug, Clone)]
pub struct MigrationLog {
    dir: Utf8PathBuf,
}

impl MigrationLog {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// All migrations, oldest first. A missing directory is an empty log.
    pub fn list(&self) -> Result<Vec<MigrationFile>, LogError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LogError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LogError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(stem) = file_name.strip_suffix(".json") else {
                continue;
            };
            let (version, name) = parse_stem(stem)?;

            let path = self.dir.join(&file_name);
            let file = read_file(&path)?;
            if file.version != version || file.name != name {
                return Err(LogError::InvalidName(file_name));
            }
            files.push(file);
        }

        files.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(files)
    }

    /// The snapshot of the newest migration, if any.
    pub fn latest_snapshot(&self) -> Result<Option<PhysicalSchema>, LogError> {
        Ok(self.list()?.pop().map(|file| file.snapshot))
    }

    /// Plan the changes from the newest snapshot to `next`.
    pub fn plan(&self, next: &PhysicalSchema) -> Result<MigrationPlan, LogError> {
        let previous = self.latest_snapshot()?;
        Ok(plan::plan(previous.as_ref(), next))
    }

    /// Write a new migration leading to `next`, versioned by the current time.
    ///
    /// Returns `None` when there is nothing to migrate.
    pub fn generate(&self, name: &str, next: &PhysicalSchema) -> Result<Option<MigrationFile>> {
        self.generate_at(name, next, Timestamp::now())
    }

    /// Like [`generate`](Self::generate), with an explicit creation time.
    pub fn generate_at(
        &self,
        name: &str,
        next: &PhysicalSchema,
        now: Timestamp,
    ) -> Result<Option<MigrationFile>> {
        let name = slug(name)?;
        let existing = self.list()?;
        let previous = existing.last().map(|file| &file.snapshot);

        let plan = plan::plan(previous, next);
        if plan.is_empty() {
            debug!(dir = %self.dir, "schema unchanged, no migration generated");
            return Ok(None);
        }
        let snapshot = plan.verify(previous)?;

        let version = now.strftime(VERSION_FORMAT).to_string();
        if let Some(latest) = existing.last()
            && latest.version >= version
        {
            return Err(LogError::OutOfOrder {
                version,
                latest: latest.version.clone(),
            }
            .into());
        }

        let file = MigrationFile {
            version,
            name,
            created_at: now,
            steps: plan.steps,
            snapshot,
        };
        self.write(&file)?;
        info!(
            version = %file.version,
            name = %file.name,
            steps = file.steps.len(),
            "generated migration"
        );
        Ok(Some(file))
    }

    fn write(&self, file: &MigrationFile) -> Result<(), LogError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| LogError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(file.file_name());
        let mut json = serde_json::to_string_pretty(file).map_err(|source| LogError::Json {
            path: path.clone(),
            source,
        })?;
        json.push('\n');

        let mut out = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(out) => out,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LogError::AlreadyExists(path));
            }
            Err(source) => return Err(LogError::Io { path, source }),
        };
        out.write_all(json.as_bytes())
            .map_err(|source| LogError::Io { path, source })
    }
}

fn read_file(path: &Utf8Path) -> Result<MigrationFile, LogError> {
    let content = std::fs::read_to_string(path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LogError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Split `m2026_10_16_093000_add_users` into version and name.
fn parse_stem(stem: &str) -> Result<(String, String), LogError> {
    let invalid = || LogError::InvalidName(format!("{stem}.json"));
    let rest = stem.strip_prefix('m').ok_or_else(invalid)?;
    if rest.len() <= VERSION_LEN + 1 || !rest.is_char_boundary(VERSION_LEN) {
        return Err(invalid());
    }
    let (version, name) = rest.split_at(VERSION_LEN);
    let name = name.strip_prefix('_').ok_or_else(invalid)?;

    let well_formed = version.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 | 10 => b == b'_',
        _ => b.is_ascii_digit(),
    });
    if !well_formed {
        return Err(invalid());
    }
    Ok((version.to_string(), name.to_string()))
}

/// Normalize a migration name: lowercase, with `-` and spaces as `_`.
fn slug(name: &str) -> Result<String, LogError> {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(slug)
    } else {
        Err(LogError::InvalidName(name.to_string()))
    }
}

/// Whether a logged migration has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub applied: bool,
    pub applied_at: Option<Timestamp>,
}

/// Applies logged migrations to a store.
pub struct Migrator<'a, S> {
    store: &'a S,
    log: &'a MigrationLog,
}

impl<'a, S: Store> Migrator<'a, S> {
    pub fn new(store: &'a S, log: &'a MigrationLog) -> Self {
        Self { store, log }
    }

    /// Every logged migration, oldest first, with its applied state.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let files = self.log.list()?;
        let applied = self.store.applied_migrations().await?;

        Ok(files
            .into_iter()
            .map(|file| {
                let applied_at = applied
                    .iter()
                    .find(|a| a.version == file.version)
                    .map(|a| a.applied_at);
                MigrationStatus {
                    version: file.version,
                    name: file.name,
                    applied: applied_at.is_some(),
                    applied_at,
                }
            })
            .collect())
    }

    /// Apply every pending migration in version order.
    ///
    /// Stops at the first failure; migrations applied before it stay applied.
    /// Returns the versions applied by this call.
    pub async fn migrate(&self) -> Result<Vec<String>> {
        let files = self.log.list()?;
        let applied = self.store.applied_migrations().await?;

        let mut ran = Vec::new();
        for file in files {
            if applied.iter().any(|a| a.version == file.version) {
                continue;
            }
            self.apply(&file.version, &file.name, &file.steps).await?;
            ran.push(file.version);
        }

        if ran.is_empty() {
            debug!("no pending migrations");
        } else {
            info!(count = ran.len(), "migrations applied");
        }
        Ok(ran)
    }

    /// Apply a plan as migration `version` in one transaction.
    ///
    /// On failure everything is rolled back and the version is not recorded.
    pub async fn apply_plan(&self, version: &str, name: &str, plan: &MigrationPlan) -> Result<()> {
        self.apply(version, name, &plan.steps).await
    }

    async fn apply(&self, version: &str, name: &str, steps: &[MigrationStep]) -> Result<()> {
        let mut tx = self.store.begin().await?;

        for (index, step) in steps.iter().enumerate() {
            if let Err(source) = tx.run(&Operation::Migrate(step.clone())).await {
                warn!(version, index, step = %step, error = %source, "migration failed, rolling back");
                if let Err(err) = tx.rollback().await {
                    warn!(version, error = %err, "rollback failed");
                }
                return Err(Error::Migration {
                    version: version.to_string(),
                    index,
                    step: step.to_string(),
                    source,
                });
            }
        }

        let record = Operation::RecordMigration {
            version: version.to_string(),
            name: name.to_string(),
        };
        if let Err(err) = tx.run(&record).await {
            warn!(version, error = %err, "recording migration failed, rolling back");
            if let Err(err) = tx.rollback().await {
                warn!(version, error = %err, "rollback failed");
            }
            return Err(err.into());
        }
        tx.commit().await?;

        info!(version, name, steps = steps.len(), "applied migration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_split_into_version_and_name() {
        assert_eq!(
            parse_stem("m2026_10_16_093000_add_users").unwrap(),
            ("2026_10_16_093000".to_string(), "add_users".to_string())
        );
        assert!(parse_stem("2026_10_16_093000_add_users").is_err());
        assert!(parse_stem("m2026_10_16_093000").is_err());
        assert!(parse_stem("m2026-10-16_093000_x").is_err());
        assert!(parse_stem("mabcd_10_16_093000_x").is_err());
    }

    #[test]
    fn names_are_slugged() {
        assert_eq!(slug("Add users").unwrap(), "add_users");
        assert_eq!(slug("more-fkeys").unwrap(), "more_fkeys");
        assert!(slug("").is_err());
        assert!(slug("drop/table").is_err());
    }

    #[test]
    fn versions_sort_chronologically() {
        let at = |s: &str| s.parse::<Timestamp>().unwrap().strftime(VERSION_FORMAT).to_string();
        let early = at("2026-01-18T20:36:59Z");
        let late = at("2026-01-19T11:09:50Z");
        assert_eq!(early, "2026_01_18_203659");
        assert_eq!(early.len(), VERSION_LEN);
        assert!(early < late);
    }
}
