use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::rights::document::render_document;
use crate::rights::errors::RightsError;
use crate::rights::loader::{DocumentSink, DocumentSource, FileDocumentStore};
use crate::rights::merge::merge;
use crate::rights::notifier::{ChangeNotifier, ListenerId, RightsChangeListener};
use crate::rights::types::{Auth, PolicyMode, Principal, Profile, UserProfile};

/// Action id that lets an administrator change the rights configuration.
pub const EDIT_RIGHTS_ACTION: &str = "editprofile";

/// Owner of the effective rights configuration.
///
/// Readers get the current `Arc<Auth>` snapshot with a single short read of the
/// snapshot slot. Loading and updating are serialized by `write_lock`; only
/// those paths ever replace the slot.
pub struct RightsStore {
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn DocumentSink>,
    edit_action: String,
    snapshot: RwLock<Option<Arc<Auth>>>,
    write_lock: Mutex<()>,
    notifier: ChangeNotifier,
}

impl RightsStore {
    pub fn new(source: Arc<dyn DocumentSource>, sink: Arc<dyn DocumentSink>) -> Self {
        Self {
            source,
            sink,
            edit_action: EDIT_RIGHTS_ACTION.to_string(),
            snapshot: RwLock::new(None),
            write_lock: Mutex::new(()),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn from_files(files: FileDocumentStore) -> Self {
        let files = Arc::new(files);
        Self::new(files.clone(), files)
    }

    pub fn with_edit_action(mut self, action: impl Into<String>) -> Self {
        self.edit_action = action.into();
        self
    }

    pub fn edit_action(&self) -> &str {
        &self.edit_action
    }

    /// The effective configuration, loading and merging both documents on first use.
    pub fn current(&self) -> Result<Arc<Auth>, RightsError> {
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Ok(snapshot.clone());
        }

        let _guard = self.write_lock.lock();
        // Another caller may have finished loading while we waited.
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Ok(snapshot.clone());
        }
        let loaded = self.load()?;
        *self.snapshot.write() = Some(loaded.clone());
        Ok(loaded)
    }

    /// Whether a snapshot is currently resident.
    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    pub fn mode(&self) -> Result<PolicyMode, RightsError> {
        Ok(self.current()?.mode)
    }

    pub fn is_allow_listed(&self) -> Result<bool, RightsError> {
        Ok(self.mode()? == PolicyMode::AllowListed)
    }

    pub fn is_deny_listed(&self) -> Result<bool, RightsError> {
        Ok(self.mode()? == PolicyMode::DenyListed)
    }

    pub fn profiles(&self) -> Result<Vec<Profile>, RightsError> {
        Ok(self.current()?.profiles.clone())
    }

    /// User profiles that apply to a login directly or through one of its roles.
    pub fn user_profiles_for(&self, principal: &Principal) -> Result<Vec<UserProfile>, RightsError> {
        let snapshot = self.current()?;
        Ok(snapshot
            .matching_user_profiles(principal)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Persist a new configuration.
    ///
    /// Only entries tagged `Origin::Modification` are written; default entries
    /// are re-derived from the base document on the next load. If the backup
    /// cannot be taken nothing is written. On a write failure the previous
    /// override is restored from backup. Either way the resident snapshot keeps
    /// serving reads.
    pub fn update(&self, candidate: Auth) -> Result<(), RightsError> {
        candidate.validate()?;

        if !grants_action(&candidate, &self.edit_action) {
            tracing::warn!(
                action = %self.edit_action,
                "Action is not granted to any userprofile; nobody will be able to change the rights configuration anymore"
            );
        }

        let document = candidate.modifications();

        let committed = {
            let _guard = self.write_lock.lock();

            let base = self.source.load_base()?;
            if base.mode != document.mode {
                return Err(RightsError::PolicyModeConflict {
                    base: base.mode,
                    layer: document.mode,
                });
            }

            // Without a fresh backup there is nothing safe to restore from, so
            // the current override is left untouched.
            if let Err(err) = self.sink.backup_override() {
                tracing::error!(error = %err, "Error while backing up rights configuration");
                return Err(err);
            }

            if let Err(err) = self.sink.write_override(&document) {
                tracing::error!(error = %err, "Error while updating rights configuration");
                tracing::error!("Trying to restore the rights configuration from backup");
                match self.sink.restore_override_from_backup() {
                    Ok(()) => tracing::error!("Rights configuration restored from backup"),
                    Err(restore_err) => tracing::error!(
                        error = %restore_err,
                        "Error while restoring rights configuration"
                    ),
                }
                return Err(err);
            }

            tracing::info!(
                profiles = document.profiles.len(),
                userprofiles = document.user_profiles.len(),
                "Saved rights configuration"
            );

            self.swap_snapshot()
        };

        if let Some(snapshot) = committed {
            self.notifier.notify(&snapshot);
        }
        Ok(())
    }

    /// Drop the resident snapshot and re-read both documents.
    pub fn reload(&self) -> Result<Arc<Auth>, RightsError> {
        let reloaded = {
            let _guard = self.write_lock.lock();
            *self.snapshot.write() = None;
            let loaded = self.load()?;
            *self.snapshot.write() = Some(loaded.clone());
            loaded
        };
        self.notifier.notify(&reloaded);
        Ok(reloaded)
    }

    pub fn add_listener(&self, listener: Weak<dyn RightsChangeListener>) -> ListenerId {
        self.notifier.add_listener(listener)
    }

    pub fn subscribe<L: RightsChangeListener + 'static>(&self, listener: &Arc<L>) -> ListenerId {
        let listener: Arc<dyn RightsChangeListener> = listener.clone();
        self.add_listener(Arc::downgrade(&listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier.remove_listener(id)
    }

    /// Replace the snapshot after a commit. Caller holds `write_lock`.
    fn swap_snapshot(&self) -> Option<Arc<Auth>> {
        *self.snapshot.write() = None;
        match self.load() {
            Ok(loaded) => {
                *self.snapshot.write() = Some(loaded.clone());
                Some(loaded)
            }
            Err(err) => {
                // Left unloaded: the next `current()` retries and reports the error.
                tracing::error!(error = %err, "Saved rights configuration could not be reloaded");
                None
            }
        }
    }

    fn load(&self) -> Result<Arc<Auth>, RightsError> {
        let base = self.source.load_base()?;
        let layer = self.source.load_override()?;
        let has_override = layer.is_some();
        let auth = merge(base, layer).map_err(|err| {
            tracing::error!(error = %err, "Error while merging rights documents");
            err
        })?;

        tracing::info!(
            mode = %auth.mode,
            profiles = auth.profiles.len(),
            userprofiles = auth.user_profiles.len(),
            has_override,
            "Loaded rights configuration"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!("Merged rights configuration:\n{}", render_document(&auth.to_document()));
        }

        Ok(Arc::new(auth))
    }
}

impl std::fmt::Debug for RightsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RightsStore")
            .field("edit_action", &self.edit_action)
            .field("loaded", &self.is_loaded())
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// Whether some userprofile of `auth` ends up allowed to perform `action`.
///
/// In a deny-listed configuration that is the case as long as no userprofile
/// lists the action.
pub fn grants_action(auth: &Auth, action: &str) -> bool {
    auth.mode.decide(auth.referenced_actions().contains(action))
}
