pub mod directory;
pub mod document;
pub mod errors;
pub mod loader;
pub mod merge;
pub mod notifier;
pub mod resolver;
pub mod store;
pub mod types;

use std::sync::Arc;

use directory::{Directory, NoDirectory, StaticDirectory};
use loader::FileDocumentStore;
use miette::{IntoDiagnostic, Result};
use resolver::RightsResolver;
use store::RightsStore;

use crate::settings::Settings;

/// Store and resolver wired together from settings.
#[derive(Debug, Clone)]
pub struct RightsEngine {
    pub store: Arc<RightsStore>,
    pub resolver: Arc<RightsResolver>,
}

impl RightsEngine {
    pub fn new(store: Arc<RightsStore>, directory: Arc<dyn Directory>) -> Self {
        let resolver = RightsResolver::new(store.clone(), directory);
        Self { store, resolver }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let files = FileDocumentStore::with_backup_suffix(
            &settings.rights.default_path,
            &settings.rights.override_path,
            &settings.rights.backup_suffix,
        );
        let store = Arc::new(
            RightsStore::from_files(files).with_edit_action(settings.rights.edit_action.clone()),
        );

        let directory: Arc<dyn Directory> = match &settings.directory.users_file {
            Some(path) => Arc::new(StaticDirectory::from_file(path).into_diagnostic()?),
            None => Arc::new(NoDirectory),
        };

        Ok(Self::new(store, directory))
    }
}
