//! Core client bootstrap and index compilation for MongoSim.
//!
//! This crate turns a declarative BSON configuration document into a fully
//! configured MongoDB client and compiled index definitions. It is consumed
//! by the workload runner, which owns the client's lifetime and applies the
//! compiled indexes.
//!
//! # Security Guarantees
//! - Connection strings are redacted before they reach logs or errors
//! - Invalid CA material aborts construction; there is no insecure fallback
//! - Local KMS master-key material is zeroized after use
//! - No partially-secured or partially-encrypted client is ever returned
//!
//! # Architecture
//! - Connection strings are classified once into a profile that decides
//!   whether TLS is forced (managed-cloud DocumentDB variants)
//! - Base client options are built as an immutable value and
//!   cloned-and-extended for each variant (primary, encrypted, key-vault)
//! - Encrypted collection provisioning is idempotent and fail-fast

pub mod client;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use client::{
    ClientFactory, ConnectionProfile, EncryptedCollectionSpec, EncryptionSettings, TlsSettings,
    UriKind,
};
pub use config::{ConfigReader, IndexDefinition};
pub use error::{MongoSimError, Result};
