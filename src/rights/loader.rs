use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::rights::document::{parse_document, render_document};
use crate::rights::errors::RightsError;
use crate::rights::types::ConfigurationDocument;

/// Read side of the two rights documents.
pub trait DocumentSource: Send + Sync {
    /// The factory default layer. Must exist.
    fn load_base(&self) -> Result<ConfigurationDocument, RightsError>;

    /// The administrator layer, `None` until the first update is saved.
    fn load_override(&self) -> Result<Option<ConfigurationDocument>, RightsError>;

    fn override_exists(&self) -> bool;
}

/// Write side of the override document.
pub trait DocumentSink: Send + Sync {
    fn write_override(&self, document: &ConfigurationDocument) -> Result<(), RightsError>;

    /// Copy the current override aside, replacing any previous backup.
    fn backup_override(&self) -> Result<(), RightsError>;

    /// Put the backup taken by `backup_override` back in place.
    fn restore_override_from_backup(&self) -> Result<(), RightsError>;
}

/// Default and override documents stored as KDL files.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    base_path: PathBuf,
    override_path: PathBuf,
    backup_path: PathBuf,
}

impl FileDocumentStore {
    pub fn new(base_path: impl Into<PathBuf>, override_path: impl Into<PathBuf>) -> Self {
        Self::with_backup_suffix(base_path, override_path, ".bak")
    }

    pub fn with_backup_suffix(
        base_path: impl Into<PathBuf>,
        override_path: impl Into<PathBuf>,
        suffix: &str,
    ) -> Self {
        let override_path = override_path.into();
        let mut backup = override_path.clone().into_os_string();
        backup.push(suffix);
        Self {
            base_path: base_path.into(),
            override_path,
            backup_path: PathBuf::from(backup),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn override_path(&self) -> &Path {
        &self.override_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.override_path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

/// Read and parse a single rights document.
pub fn load_document(path: &Path) -> Result<ConfigurationDocument, RightsError> {
    let contents = fs::read_to_string(path).map_err(|source| RightsError::DocumentLoad {
        path: path.display().to_string(),
        source,
    })?;
    let document = parse_document(&contents)?;

    tracing::debug!(
        path = %path.display(),
        mode = %document.mode,
        profiles = document.profiles.len(),
        userprofiles = document.user_profiles.len(),
        "Read rights document"
    );

    Ok(document)
}

impl DocumentSource for FileDocumentStore {
    fn load_base(&self) -> Result<ConfigurationDocument, RightsError> {
        load_document(&self.base_path)
    }

    fn load_override(&self) -> Result<Option<ConfigurationDocument>, RightsError> {
        if !self.override_exists() {
            return Ok(None);
        }
        load_document(&self.override_path).map(Some)
    }

    fn override_exists(&self) -> bool {
        self.override_path.is_file()
    }
}

impl DocumentSink for FileDocumentStore {
    fn write_override(&self, document: &ConfigurationDocument) -> Result<(), RightsError> {
        let rendered = render_document(document);
        let tmp = self.temp_path();

        // Write next to the target and rename over it so readers never see a
        // truncated document.
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(rendered.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.override_path)
        };
        write().map_err(|source| {
            let _ = fs::remove_file(&tmp);
            RightsError::persist(
                format!("writing `{}`", self.override_path.display()),
                source,
            )
        })
    }

    fn backup_override(&self) -> Result<(), RightsError> {
        if self.override_exists() {
            fs::copy(&self.override_path, &self.backup_path).map_err(|source| {
                RightsError::persist(
                    format!("backing up `{}`", self.override_path.display()),
                    source,
                )
            })?;
        } else if self.backup_path.exists() {
            // A stale backup would otherwise be restored over a first-time write.
            fs::remove_file(&self.backup_path).map_err(|source| {
                RightsError::persist(
                    format!("removing stale backup `{}`", self.backup_path.display()),
                    source,
                )
            })?;
        }
        Ok(())
    }

    fn restore_override_from_backup(&self) -> Result<(), RightsError> {
        if self.backup_path.is_file() {
            fs::copy(&self.backup_path, &self.override_path)?;
        } else if self.override_exists() {
            // No override existed before the failed write.
            fs::remove_file(&self.override_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rights::types::*;

    const BASE: &str = r#"
mode "allow-listed"
profile "editor" {
    actions {
        - "edit"
    }
}
userprofile "alice" {
    profiles {
        - "editor"
    }
}
"#;

    fn store_in(dir: &Path) -> FileDocumentStore {
        fs::write(dir.join("rights-default.kdl"), BASE).unwrap();
        FileDocumentStore::new(dir.join("rights-default.kdl"), dir.join("rights.kdl"))
    }

    #[test]
    fn test_load_base_and_missing_override() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let base = store.load_base().unwrap();
        assert_eq!(base.profiles.len(), 1);
        assert!(!store.override_exists());
        assert!(store.load_override().unwrap().is_none());
    }

    #[test]
    fn test_load_nonexistent_base() {
        let store = FileDocumentStore::new("/nonexistent/base.kdl", "/nonexistent/over.kdl");
        let err = store.load_base().unwrap_err();
        assert!(matches!(err, RightsError::DocumentLoad { .. }));
    }

    #[test]
    fn test_write_then_load_override() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let doc = ConfigurationDocument::new(PolicyMode::AllowListed)
            .with_profile(Profile::new("auditor", ["view"]))
            .with_user_profile(UserProfile::new("bob", ["auditor"]));
        store.write_override(&doc).unwrap();

        assert!(store.override_exists());
        assert!(!store.temp_path().exists());
        assert_eq!(store.load_override().unwrap(), Some(doc));
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = ConfigurationDocument::new(PolicyMode::AllowListed)
            .with_profile(Profile::new("first", ["a"]));
        store.write_override(&first).unwrap();
        store.backup_override().unwrap();
        assert!(store.backup_path().is_file());

        let second = ConfigurationDocument::new(PolicyMode::AllowListed)
            .with_profile(Profile::new("second", ["b"]));
        store.write_override(&second).unwrap();

        store.restore_override_from_backup().unwrap();
        assert_eq!(store.load_override().unwrap(), Some(first));
    }

    #[test]
    fn test_restore_without_prior_override_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        // stale backup from an earlier life of the file
        fs::write(store.backup_path(), "mode \"allow-listed\"").unwrap();

        store.backup_override().unwrap();
        assert!(!store.backup_path().exists());

        store
            .write_override(&ConfigurationDocument::new(PolicyMode::AllowListed))
            .unwrap();
        store.restore_override_from_backup().unwrap();
        assert!(!store.override_exists());
    }

    #[test]
    fn test_custom_backup_suffix() {
        let store = FileDocumentStore::with_backup_suffix("a.kdl", "conf/b.kdl", ".orig");
        assert_eq!(store.backup_path(), Path::new("conf/b.kdl.orig"));
    }
}
