use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rights::store::EDIT_RIGHTS_ACTION;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub rights: Rights,
    #[serde(default)]
    pub directory: DirectorySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rights {
    /// Factory default rights document. Default: conf/rights-default.kdl
    pub default_path: PathBuf,
    /// Administrator override document, created on the first update. Default: conf/rights.kdl
    pub override_path: PathBuf,
    /// Suffix appended to `override_path` for the backup taken before each write
    pub backup_suffix: String,
    /// Action id whose loss triggers the self-lockout warning
    pub edit_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectorySettings {
    /// JSON file listing users and their roles. Without it logins only match themselves.
    pub users_file: Option<PathBuf>,
}

impl Default for Rights {
    fn default() -> Self {
        Self {
            default_path: PathBuf::from("conf/rights-default.kdl"),
            override_path: PathBuf::from("conf/rights.kdl"),
            backup_suffix: ".bak".to_string(),
            edit_action: EDIT_RIGHTS_ACTION.to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let defaults = Rights::default();
        let mut builder = config::Config::builder()
            .set_default(
                "rights.default_path",
                defaults.default_path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default(
                "rights.override_path",
                defaults.override_path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default("rights.backup_suffix", defaults.backup_suffix)
            .into_diagnostic()?
            .set_default("rights.edit_action", defaults.edit_action)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: RIGHTSD__RIGHTS__OVERRIDE_PATH=/etc/rights.kdl, etc.
        builder = builder.add_source(config::Environment::with_prefix("RIGHTSD").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        let cwd = std::env::current_dir().into_diagnostic()?;
        if s.rights.default_path.is_relative() {
            s.rights.default_path = cwd.join(&s.rights.default_path);
        }
        if s.rights.override_path.is_relative() {
            s.rights.override_path = cwd.join(&s.rights.override_path);
        }
        if let Some(users_file) = &s.directory.users_file {
            if users_file.is_relative() {
                s.directory.users_file = Some(cwd.join(users_file));
            }
        }

        Ok(s)
    }
}
