use miette::Diagnostic;
use thiserror::Error;

use crate::rights::types::PolicyMode;

#[derive(Debug, Error, Diagnostic)]
pub enum RightsError {
    #[error("Failed to load rights document `{path}`")]
    #[diagnostic(
        code(rightsd::rights::document_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    DocumentLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(rightsd::rights::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("Invalid rights document: {0}")]
    #[diagnostic(
        code(rightsd::rights::invalid_document),
        help("A rights document has one `mode` node plus `profile` and `userprofile` nodes with unique names")
    )]
    InvalidDocument(String),

    #[error("Policy mode conflict: default layer is `{base}`, override layer is `{layer}`")]
    #[diagnostic(
        code(rightsd::rights::policy_mode_conflict),
        help("Both rights documents must declare the same `mode`")
    )]
    PolicyModeConflict { base: PolicyMode, layer: PolicyMode },

    #[error("Failed to persist rights configuration: {reason}")]
    #[diagnostic(
        code(rightsd::rights::persist),
        help("The previous configuration is still in effect; check permissions and free space of the override location")
    )]
    PersistFailure {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(rightsd::rights::io))]
    Io(#[from] std::io::Error),
}

impl RightsError {
    pub(crate) fn persist(reason: impl Into<String>, source: std::io::Error) -> Self {
        RightsError::PersistFailure {
            reason: reason.into(),
            source: Some(source),
        }
    }
}
