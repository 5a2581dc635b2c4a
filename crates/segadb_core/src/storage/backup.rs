//! Numbered, optionally date-stamped backups of database files.
//!
//! Backups for a database named `shop` live under `<root>/backups_shop/`
//! as `shop_backup_<n>.segadb` or `shop_backup_<n>_<YYYYMMDD>.segadb`.

use crate::auth::{Authenticator, Permission};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::storage::{load, save, LoadOptions, SaveOptions};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// One backup file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Sequential backup number, parsed from the file name.
    pub number: u64,
    /// File name within the backup directory.
    pub file_name: String,
    /// Full path to the backup file.
    pub path: PathBuf,
}

/// Creates, lists, and restores backups under a root directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    /// Manages backups under the given root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_for(&self, db_name: &str) -> PathBuf {
        self.root.join(format!("backups_{db_name}"))
    }

    /// Writes a new backup of the database, returning its path.
    ///
    /// The backup number is one past the count of existing backups. With
    /// `dated`, the local date is appended to the file name.
    pub fn create_backup(
        &self,
        db: &Database,
        options: &SaveOptions,
        dated: bool,
    ) -> DbResult<PathBuf> {
        let dir = self.dir_for(db.name());
        fs::create_dir_all(&dir)?;
        let number = self.list(db.name())?.len() as u64 + 1;
        let file_name = if dated {
            let stamp = Local::now().format("%Y%m%d");
            format!("{}_backup_{number}_{stamp}.segadb", db.name())
        } else {
            format!("{}_backup_{number}.segadb", db.name())
        };
        let path = dir.join(&file_name);
        save(db, &path, options)?;
        tracing::info!(db = %db.name(), path = %path.display(), "backup created");
        Ok(path)
    }

    /// Lists existing backups for a database, sorted by backup number.
    pub fn list(&self, db_name: &str) -> DbResult<Vec<BackupEntry>> {
        let dir = self.dir_for(db_name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{db_name}_backup_");
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(number) = parse_backup_number(&file_name, &prefix) {
                entries.push(BackupEntry {
                    number,
                    file_name,
                    path: entry.path(),
                });
            }
        }
        entries.sort_by_key(|e| e.number);
        Ok(entries)
    }

    /// Loads a database back from a backup.
    ///
    /// With `backup_name` given, that exact file is used; otherwise the
    /// highest-numbered backup is.
    pub fn restore(
        &self,
        db_name: &str,
        options: &LoadOptions,
        backup_name: Option<&str>,
    ) -> DbResult<Database> {
        let path = match backup_name {
            Some(name) => {
                let path = self.dir_for(db_name).join(name);
                if !path.exists() {
                    return Err(DbError::invalid_operation(format!(
                        "backup {name:?} not found for {db_name:?}"
                    )));
                }
                path
            }
            None => {
                let entries = self.list(db_name)?;
                entries
                    .last()
                    .map(|e| e.path.clone())
                    .ok_or_else(|| {
                        DbError::invalid_operation(format!("no backups for {db_name:?}"))
                    })?
            }
        };
        load(&path, options)
    }

    /// Restores a backup after checking the caller holds the restore
    /// capability.
    pub fn restore_authenticated(
        &self,
        auth: &dyn Authenticator,
        username: &str,
        password: &str,
        db_name: &str,
        options: &LoadOptions,
        backup_name: Option<&str>,
    ) -> DbResult<Database> {
        let permissions = auth.authenticate(username, password)?;
        if !permissions.contains(Permission::Restore) {
            return Err(DbError::permission_denied(format!(
                "user {username:?} may not restore backups"
            )));
        }
        self.restore(db_name, options, backup_name)
    }

    /// The managed root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Extracts the backup number from `<prefix><n>[_<date>].segadb`.
fn parse_backup_number(file_name: &str, prefix: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(prefix)?.strip_suffix(".segadb")?;
    let digits = rest.split('_').next()?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, UserManager};
    use crate::database::fixtures::sample_database;
    use tempfile::tempdir;

    #[test]
    fn numbered_backups_accumulate() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let db = sample_database();

        let first = manager.create_backup(&db, &SaveOptions::new(), false).unwrap();
        let second = manager.create_backup(&db, &SaveOptions::new(), false).unwrap();
        assert!(first.ends_with("backups_shop/shop_backup_1.segadb"));
        assert!(second.ends_with("backups_shop/shop_backup_2.segadb"));

        let listed = manager.list("shop").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].number, 1);
        assert_eq!(listed[1].number, 2);
    }

    #[test]
    fn dated_backup_name_carries_stamp() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let path = manager
            .create_backup(&sample_database(), &SaveOptions::new(), true)
            .unwrap();
        let stamp = Local::now().format("%Y%m%d").to_string();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("shop_backup_1_{stamp}.segadb"));
        // dated names still parse for listing
        assert_eq!(manager.list("shop").unwrap()[0].number, 1);
    }

    #[test]
    fn restore_latest_and_named() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new(dir.path());

        let mut db = sample_database();
        manager.create_backup(&db, &SaveOptions::new(), false).unwrap();
        db.drop_table("orders").unwrap();
        manager.create_backup(&db, &SaveOptions::new(), false).unwrap();

        // latest backup reflects the drop
        let latest = manager.restore("shop", &LoadOptions::new(), None).unwrap();
        assert!(latest.get_table("orders").is_err());

        // the first one still has it
        let first = manager
            .restore("shop", &LoadOptions::new(), Some("shop_backup_1.segadb"))
            .unwrap();
        assert!(first.get_table("orders").is_ok());
    }

    #[test]
    fn restore_without_backups_errors() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        assert!(manager.restore("ghost", &LoadOptions::new(), None).is_err());
        assert!(manager
            .restore("ghost", &LoadOptions::new(), Some("nope.segadb"))
            .is_err());
    }

    #[test]
    fn restore_requires_permission() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        manager
            .create_backup(&sample_database(), &SaveOptions::new(), false)
            .unwrap();

        let mut users = UserManager::new();
        users.register_user("ops", "pw", vec![Role::Admin]).unwrap();
        users
            .register_user("viewer", "pw", vec![Role::ReadOnly])
            .unwrap();

        assert!(manager
            .restore_authenticated(&users, "ops", "pw", "shop", &LoadOptions::new(), None)
            .is_ok());
        assert!(matches!(
            manager
                .restore_authenticated(&users, "viewer", "pw", "shop", &LoadOptions::new(), None)
                .unwrap_err(),
            DbError::PermissionDenied { .. }
        ));
        assert!(manager
            .restore_authenticated(&users, "ops", "wrong", "shop", &LoadOptions::new(), None)
            .is_err());
    }
}
