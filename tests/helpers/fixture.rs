use rightsd::rights::directory::{Directory, NoDirectory};
use rightsd::rights::errors::RightsError;
use rightsd::rights::loader::{DocumentSink, FileDocumentStore};
use rightsd::rights::store::RightsStore;
use rightsd::rights::types::ConfigurationDocument;
use rightsd::rights::RightsEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use super::builders::DocumentBuilder;

/// Temporary directory holding a default and an override rights document
pub struct RightsFixture {
    pub dir: TempDir,
    pub files: FileDocumentStore,
}

impl RightsFixture {
    pub fn new(base: DocumentBuilder) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let base_path = dir.path().join("rights-default.kdl");
        base.write_to(&base_path);
        let files = FileDocumentStore::new(base_path, dir.path().join("rights.kdl"));
        Self { dir, files }
    }

    pub fn with_override(self, layer: DocumentBuilder) -> Self {
        layer.write_to(self.files.override_path());
        self
    }

    pub fn engine(&self) -> RightsEngine {
        self.engine_with(Arc::new(NoDirectory))
    }

    pub fn engine_with(&self, directory: Arc<dyn Directory>) -> RightsEngine {
        let store = Arc::new(RightsStore::from_files(self.files.clone()));
        RightsEngine::new(store, directory)
    }

    /// Engine whose writes can be made to fail on demand.
    pub fn flaky_engine(&self) -> (RightsEngine, Arc<FlakySink>) {
        let sink = Arc::new(FlakySink {
            inner: self.files.clone(),
            fail_writes: AtomicBool::new(false),
        });
        let store = Arc::new(RightsStore::new(Arc::new(self.files.clone()), sink.clone()));
        (RightsEngine::new(store, Arc::new(NoDirectory)), sink)
    }

    pub fn override_contents(&self) -> Option<String> {
        std::fs::read_to_string(self.files.override_path()).ok()
    }
}

/// Sink that leaves a garbage override behind and fails while `fail_writes` is set
pub struct FlakySink {
    inner: FileDocumentStore,
    pub fail_writes: AtomicBool,
}

impl FlakySink {
    pub fn fail(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl DocumentSink for FlakySink {
    fn write_override(&self, document: &ConfigurationDocument) -> Result<(), RightsError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            std::fs::write(self.inner.override_path(), "profile \"half-writ")?;
            return Err(RightsError::PersistFailure {
                reason: "simulated write failure".into(),
                source: None,
            });
        }
        self.inner.write_override(document)
    }

    fn backup_override(&self) -> Result<(), RightsError> {
        self.inner.backup_override()
    }

    fn restore_override_from_backup(&self) -> Result<(), RightsError> {
        self.inner.restore_override_from_backup()
    }
}
