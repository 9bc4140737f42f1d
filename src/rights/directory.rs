use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::errors::ServiceError;

/// Source of role/group memberships for logins.
pub trait Directory: Send + Sync {
    /// Roles and groups `login` belongs to. The login itself is not included.
    fn roles_of(&self, login: &str) -> Result<BTreeSet<String>, ServiceError>;

    /// Every known user name.
    fn usernames(&self) -> Result<Vec<String>, ServiceError> {
        Ok(Vec::new())
    }

    /// Every known role/group name.
    fn groupnames(&self) -> Result<Vec<String>, ServiceError> {
        Ok(Vec::new())
    }
}

/// Directory without any users or roles; logins only match themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

impl Directory for NoDirectory {
    fn roles_of(&self, _login: &str) -> Result<BTreeSet<String>, ServiceError> {
        Ok(BTreeSet::new())
    }
}

/// User entry of a directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Root structure of the directory JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryFile {
    pub users: Vec<DirectoryUser>,
}

/// In-memory login -> roles table.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: BTreeMap<String, BTreeSet<String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user<I, S>(mut self, username: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users
            .entry(username.to_string())
            .or_default()
            .extend(roles.into_iter().map(Into::into));
        self
    }

    /// Load users and their roles from a JSON file:
    /// `{"users": [{"username": "alice", "roles": ["auditors"]}]}`
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let content = fs::read_to_string(path)?;
        let file: DirectoryFile = serde_json::from_str(&content)?;

        let mut directory = Self::new();
        for user in file.users {
            if user.username.trim().is_empty() {
                return Err(ServiceError::Other(format!(
                    "directory file `{}` contains a user without username",
                    path.display()
                )));
            }
            directory = directory.with_user(&user.username, user.roles);
        }

        tracing::info!(
            path = %path.display(),
            users = directory.users.len(),
            "Loaded user directory"
        );
        Ok(directory)
    }
}

impl Directory for StaticDirectory {
    fn roles_of(&self, login: &str) -> Result<BTreeSet<String>, ServiceError> {
        Ok(self.users.get(login).cloned().unwrap_or_default())
    }

    fn usernames(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.users.keys().cloned().collect())
    }

    fn groupnames(&self) -> Result<Vec<String>, ServiceError> {
        let groups: BTreeSet<&String> = self.users.values().flatten().collect();
        Ok(groups.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_directory_roles() {
        let directory = StaticDirectory::new()
            .with_user("alice", ["auditors", "staff"])
            .with_user("bob", Vec::<String>::new());

        assert_eq!(
            directory.roles_of("alice").unwrap(),
            BTreeSet::from(["auditors".to_string(), "staff".to_string()])
        );
        assert!(directory.roles_of("bob").unwrap().is_empty());
        assert!(directory.roles_of("nobody").unwrap().is_empty());
        assert_eq!(directory.usernames().unwrap(), vec!["alice", "bob"]);
        assert_eq!(directory.groupnames().unwrap(), vec!["auditors", "staff"]);
    }

    #[test]
    fn test_no_directory() {
        assert!(NoDirectory.roles_of("alice").unwrap().is_empty());
        assert!(NoDirectory.usernames().unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            r#"{"users": [
                {"username": "alice", "roles": ["auditors"]},
                {"username": "carol"}
            ]}"#,
        )
        .unwrap();

        let directory = StaticDirectory::from_file(&path).unwrap();
        assert_eq!(directory.usernames().unwrap(), vec!["alice", "carol"]);
        assert!(directory.roles_of("alice").unwrap().contains("auditors"));
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "not json").unwrap();

        let err = StaticDirectory::from_file(&path).unwrap_err();
        assert!(matches!(err, ServiceError::Serde(_)));

        let err = StaticDirectory::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ServiceError::Io(_)));
    }
}
