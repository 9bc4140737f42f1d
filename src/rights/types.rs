use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::rights::errors::RightsError;

/// How the action sets of a configuration are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Listed actions are granted, everything else is denied.
    AllowListed,
    /// Listed actions are denied, everything else is granted.
    DenyListed,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::AllowListed => "allow-listed",
            PolicyMode::DenyListed => "deny-listed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow-listed" => Some(PolicyMode::AllowListed),
            "deny-listed" => Some(PolicyMode::DenyListed),
            _ => None,
        }
    }

    /// Turn "action is in the user's set" into a decision.
    pub fn decide(&self, listed: bool) -> bool {
        match self {
            PolicyMode::AllowListed => listed,
            PolicyMode::DenyListed => !listed,
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which layer an entry of the effective configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Factory default document; never written back.
    #[default]
    Default,
    /// Administrator edit; persisted in the override document.
    Modification,
}

/// Named group of action ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub actions: Vec<String>,
    #[serde(default)]
    pub origin: Origin,
}

impl Profile {
    pub fn new<I, S>(name: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            actions: actions.into_iter().map(Into::into).collect(),
            origin: Origin::Default,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Reference from a user profile to a profile, resolved by name at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileRef {
    pub name: String,
}

impl From<&str> for ProfileRef {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl From<String> for ProfileRef {
    fn from(name: String) -> Self {
        Self { name }
    }
}

/// Binds a login key to profiles. The key is either a user name or a role/group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub login: String,
    pub profiles: Vec<ProfileRef>,
    #[serde(default)]
    pub origin: Origin,
}

impl UserProfile {
    pub fn new<I, R>(login: &str, profiles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ProfileRef>,
    {
        Self {
            login: login.to_string(),
            profiles: profiles.into_iter().map(Into::into).collect(),
            origin: Origin::Default,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// The subject of a rights query: a login plus the roles the directory reports for it.
///
/// A user profile applies to a principal when its key equals the login itself
/// or one of the roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub login: String,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new(login: &str, roles: BTreeSet<String>) -> Self {
        Self {
            login: login.to_string(),
            roles,
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.login == key || self.roles.contains(key)
    }
}

/// One parsed layer of the rights configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDocument {
    pub mode: PolicyMode,
    pub profiles: Vec<Profile>,
    pub user_profiles: Vec<UserProfile>,
}

impl ConfigurationDocument {
    pub fn new(mode: PolicyMode) -> Self {
        Self {
            mode,
            profiles: Vec::new(),
            user_profiles: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn with_user_profile(mut self, user_profile: UserProfile) -> Self {
        self.user_profiles.push(user_profile);
        self
    }

    /// Check the structural rules a well-formed document follows.
    pub fn validate(&self) -> Result<(), RightsError> {
        validate_entries(&self.profiles, &self.user_profiles)
    }
}

/// Effective (merged) rights configuration.
///
/// Loaded snapshots are shared as `Arc<Auth>` and never mutated; administrators
/// edit a clone and hand it to `RightsStore::update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub mode: PolicyMode,
    pub profiles: Vec<Profile>,
    pub user_profiles: Vec<UserProfile>,
}

impl Auth {
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn user_profile(&self, login: &str) -> Option<&UserProfile> {
        self.user_profiles.iter().find(|u| u.login == login)
    }

    /// Profile name -> profile lookup table.
    pub fn profile_map(&self) -> HashMap<String, Profile> {
        self.profiles
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect()
    }

    /// All user profiles whose key matches the principal's login or one of its roles.
    pub fn matching_user_profiles<'a>(&'a self, principal: &Principal) -> Vec<&'a UserProfile> {
        self.user_profiles
            .iter()
            .filter(|u| principal.matches(&u.login))
            .collect()
    }

    /// Every action id reachable from any user profile.
    pub fn referenced_actions(&self) -> BTreeSet<String> {
        let profiles = self.profile_map();
        let mut actions = BTreeSet::new();
        for user_profile in &self.user_profiles {
            for reference in &user_profile.profiles {
                match profiles.get(&reference.name) {
                    Some(profile) => actions.extend(profile.actions.iter().cloned()),
                    None => tracing::debug!(
                        profile = %reference.name,
                        login = %user_profile.login,
                        "dangling profile reference"
                    ),
                }
            }
        }
        actions
    }

    /// Insert or replace a profile as an administrator edit.
    pub fn upsert_profile(&mut self, profile: Profile) {
        let profile = profile.with_origin(Origin::Modification);
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Insert or replace a user profile as an administrator edit.
    pub fn upsert_user_profile(&mut self, user_profile: UserProfile) {
        let user_profile = user_profile.with_origin(Origin::Modification);
        match self
            .user_profiles
            .iter_mut()
            .find(|u| u.login == user_profile.login)
        {
            Some(existing) => *existing = user_profile,
            None => self.user_profiles.push(user_profile),
        }
    }

    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        let idx = self.profiles.iter().position(|p| p.name == name)?;
        Some(self.profiles.remove(idx))
    }

    pub fn remove_user_profile(&mut self, login: &str) -> Option<UserProfile> {
        let idx = self.user_profiles.iter().position(|u| u.login == login)?;
        Some(self.user_profiles.remove(idx))
    }

    /// Keep only the administrator edits; this is what the override document holds.
    pub fn modifications(&self) -> ConfigurationDocument {
        ConfigurationDocument {
            mode: self.mode,
            profiles: self
                .profiles
                .iter()
                .filter(|p| p.origin == Origin::Modification)
                .cloned()
                .collect(),
            user_profiles: self
                .user_profiles
                .iter()
                .filter(|u| u.origin == Origin::Modification)
                .cloned()
                .collect(),
        }
    }

    /// The full configuration as a single document (origins are not part of a document).
    pub fn to_document(&self) -> ConfigurationDocument {
        ConfigurationDocument {
            mode: self.mode,
            profiles: self.profiles.clone(),
            user_profiles: self.user_profiles.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), RightsError> {
        validate_entries(&self.profiles, &self.user_profiles)
    }
}

fn validate_entries(profiles: &[Profile], user_profiles: &[UserProfile]) -> Result<(), RightsError> {
    let mut names = HashSet::new();
    for profile in profiles {
        if profile.name.trim().is_empty() {
            return Err(RightsError::InvalidDocument(
                "profile name must not be empty".into(),
            ));
        }
        if !names.insert(profile.name.as_str()) {
            return Err(RightsError::InvalidDocument(format!(
                "duplicate profile `{}`",
                profile.name
            )));
        }
        let mut actions = HashSet::new();
        for action in &profile.actions {
            if !actions.insert(action.as_str()) {
                return Err(RightsError::InvalidDocument(format!(
                    "duplicate action `{action}` in profile `{}`",
                    profile.name
                )));
            }
        }
    }

    let mut logins = HashSet::new();
    for user_profile in user_profiles {
        if user_profile.login.trim().is_empty() {
            return Err(RightsError::InvalidDocument(
                "userprofile login must not be empty".into(),
            ));
        }
        if !logins.insert(user_profile.login.as_str()) {
            return Err(RightsError::InvalidDocument(format!(
                "duplicate userprofile `{}`",
                user_profile.login
            )));
        }
    }
    Ok(())
}
