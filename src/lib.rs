//! rightsd - layered authorization rights engine
//!
//! Loads a rights configuration from a factory default document and an
//! administrator override document, answers `is_allowed(login, action)`
//! queries from cached per-login action sets, and persists administrator
//! edits with backup and restore.

pub mod errors;
pub mod rights;
pub mod settings;
