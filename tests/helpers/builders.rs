use rightsd::rights::document::render_document;
use rightsd::rights::types::{ConfigurationDocument, PolicyMode, Profile, UserProfile};
use std::path::Path;

/// Builder for rights documents used as test fixtures
pub struct DocumentBuilder {
    document: ConfigurationDocument,
}

impl DocumentBuilder {
    pub fn allow_listed() -> Self {
        Self {
            document: ConfigurationDocument::new(PolicyMode::AllowListed),
        }
    }

    pub fn deny_listed() -> Self {
        Self {
            document: ConfigurationDocument::new(PolicyMode::DenyListed),
        }
    }

    pub fn profile(mut self, name: &str, actions: &[&str]) -> Self {
        self.document
            .profiles
            .push(Profile::new(name, actions.iter().copied()));
        self
    }

    pub fn user(mut self, login: &str, profiles: &[&str]) -> Self {
        self.document
            .user_profiles
            .push(UserProfile::new(login, profiles.iter().copied()));
        self
    }

    pub fn build(self) -> ConfigurationDocument {
        self.document
    }

    pub fn write_to(self, path: &Path) -> ConfigurationDocument {
        std::fs::write(path, render_document(&self.document)).expect("Failed to write document");
        self.document
    }
}
