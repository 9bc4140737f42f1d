use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::rights::directory::Directory;
use crate::rights::errors::RightsError;
use crate::rights::notifier::{ListenerId, RightsChangeListener};
use crate::rights::store::RightsStore;
use crate::rights::types::{Auth, Principal, Profile};

/// Action ids a login may exercise through some assigned profile.
pub type ActionSet = BTreeSet<String>;

/// Derived views of one configuration snapshot. Replaced as a whole, never cleared in place.
struct DecisionCache {
    snapshot: Arc<Auth>,
    profiles: HashMap<String, Profile>,
    actions: RwLock<HashMap<String, Arc<ActionSet>>>,
}

impl DecisionCache {
    fn new(snapshot: Arc<Auth>) -> Self {
        Self {
            profiles: snapshot.profile_map(),
            snapshot,
            actions: RwLock::new(HashMap::new()),
        }
    }

    fn build_action_set(&self, principal: &Principal) -> ActionSet {
        let mut actions = ActionSet::new();
        for user_profile in self.snapshot.matching_user_profiles(principal) {
            for reference in &user_profile.profiles {
                match self.profiles.get(&reference.name) {
                    Some(profile) => actions.extend(profile.actions.iter().cloned()),
                    None => tracing::error!(
                        profile = %reference.name,
                        userprofile = %user_profile.login,
                        login = %principal.login,
                        "Could not find profile"
                    ),
                }
            }
        }
        actions
    }
}

/// Answers "may this login perform this action" from the store's current
/// configuration, caching per-login action sets until the configuration or
/// the user directory changes.
pub struct RightsResolver {
    store: Arc<RightsStore>,
    directory: Arc<dyn Directory>,
    cache: RwLock<Option<Arc<DecisionCache>>>,
    build_lock: Mutex<()>,
    /// Bumped on every discard so a cache built across a discard is not installed.
    epoch: AtomicU64,
    listener: ListenerId,
}

impl RightsResolver {
    /// Create a resolver and register it as a change listener of `store`.
    pub fn new(store: Arc<RightsStore>, directory: Arc<dyn Directory>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn RightsChangeListener> = me.clone();
            let listener = store.add_listener(me);
            Self {
                store,
                directory,
                cache: RwLock::new(None),
                build_lock: Mutex::new(()),
                epoch: AtomicU64::new(0),
                listener,
            }
        })
    }

    /// Whether `login` may perform `action`. Denies when the configuration cannot be loaded.
    pub fn is_allowed(&self, login: &str, action: &str) -> bool {
        match self.try_is_allowed(login, action) {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::error!(
                    %login,
                    %action,
                    error = %err,
                    "Rights configuration unavailable, denying"
                );
                false
            }
        }
    }

    pub fn try_is_allowed(&self, login: &str, action: &str) -> Result<bool, RightsError> {
        let cache = self.cache()?;
        let listed = self.actions_for(&cache, login).contains(action);
        Ok(cache.snapshot.mode.decide(listed))
    }

    /// The action ids listed for `login` across all matching userprofiles.
    ///
    /// In a deny-listed configuration these are the actions the login may *not* perform.
    pub fn effective_actions(&self, login: &str) -> Result<Arc<ActionSet>, RightsError> {
        let cache = self.cache()?;
        Ok(self.actions_for(&cache, login))
    }

    /// Build the action sets of every user the directory knows. Returns the number built.
    pub fn warm_up(&self) -> Result<usize, RightsError> {
        let usernames = match self.directory.usernames() {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(error = %err, "Could not list users of the directory");
                return Ok(0);
            }
        };
        let cache = self.cache()?;
        for username in &usernames {
            self.actions_for(&cache, username);
        }
        tracing::debug!(users = usernames.len(), "Built user action sets");
        Ok(usernames.len())
    }

    /// Drop everything derived from the user directory, e.g. after a role assignment changed.
    pub fn discard_user_data(&self) {
        self.discard("user directory changed");
    }

    /// Number of logins with a cached action set.
    pub fn cached_logins(&self) -> usize {
        self.cache
            .read()
            .as_ref()
            .map(|cache| cache.actions.read().len())
            .unwrap_or(0)
    }

    fn discard(&self, reason: &str) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *self.cache.write() = None;
        tracing::debug!(reason, "Discarded cached rights decisions");
    }

    fn cache(&self) -> Result<Arc<DecisionCache>, RightsError> {
        let snapshot = self.store.current()?;
        if let Some(cache) = self.fresh_cache(&snapshot) {
            return Ok(cache);
        }

        let _guard = self.build_lock.lock();
        let epoch = self.epoch.load(Ordering::Acquire);
        let snapshot = self.store.current()?;
        if let Some(cache) = self.fresh_cache(&snapshot) {
            return Ok(cache);
        }

        let built = Arc::new(DecisionCache::new(snapshot));
        // A discard that raced the build wins; the built cache only serves this call.
        if self.epoch.load(Ordering::Acquire) == epoch {
            *self.cache.write() = Some(built.clone());
        }
        Ok(built)
    }

    fn fresh_cache(&self, snapshot: &Arc<Auth>) -> Option<Arc<DecisionCache>> {
        self.cache
            .read()
            .as_ref()
            .filter(|cache| Arc::ptr_eq(&cache.snapshot, snapshot))
            .cloned()
    }

    fn actions_for(&self, cache: &DecisionCache, login: &str) -> Arc<ActionSet> {
        if let Some(actions) = cache.actions.read().get(login) {
            return actions.clone();
        }

        let roles = match self.directory.roles_of(login) {
            Ok(roles) => roles,
            Err(err) => {
                tracing::warn!(%login, error = %err, "Role lookup failed, using no roles");
                BTreeSet::new()
            }
        };
        let principal = Principal::new(login, roles);
        let actions = Arc::new(cache.build_action_set(&principal));

        cache
            .actions
            .write()
            .entry(login.to_string())
            .or_insert(actions)
            .clone()
    }
}

impl RightsChangeListener for RightsResolver {
    fn configuration_changed(&self, _snapshot: &Arc<Auth>) -> miette::Result<()> {
        self.discard("rights configuration changed");
        Ok(())
    }
}

impl Drop for RightsResolver {
    fn drop(&mut self) {
        self.store.remove_listener(self.listener);
    }
}

impl std::fmt::Debug for RightsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RightsResolver")
            .field("listener", &self.listener)
            .field("cached_logins", &self.cached_logins())
            .finish()
    }
}
