//! Connection string classification.
//!
//! Managed-cloud document-database offerings (Amazon DocumentDB and its
//! elastic variant) mandate TLS and are recognizable from the connection
//! string's authority, so the profile is derived once per URI instead of
//! requiring an extra explicit flag. An explicit TLS block can still refine
//! the defaults for any profile.

/// Host substrings identifying a managed-cloud deployment (case-sensitive).
const MANAGED_CLOUD_MARKERS: &[&str] = &["docdb", "documentdb", "amazonaws.com", "docdb-elastic"];

/// Deployment flavor derived from a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriKind {
    /// Standard MongoDB or Atlas SRV deployment
    Generic,
    /// Managed-cloud DocumentDB variant
    ManagedCloud,
}

/// Classification of a connection string, derived once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Deployment flavor
    pub kind: UriKind,
    /// Whether transport security must be enabled regardless of configuration
    pub force_tls: bool,
}

impl ConnectionProfile {
    /// Classifies a connection string.
    ///
    /// Decision rule, in order:
    /// 1. `mongodb+srv` scheme: Generic, no forced TLS (the managed service
    ///    pre-configures transport security via the connection string).
    /// 2. Plain `mongodb` scheme with a managed-cloud marker in the host
    ///    list: ManagedCloud, TLS forced. The host list is matched as a raw
    ///    substring, so comma-separated seed lists classify the same as a
    ///    single host.
    /// 3. Anything else: Generic, no forced TLS. Malformed strings fall
    ///    here too; they are rejected later, during client construction.
    pub fn classify(uri: &str) -> Self {
        let generic = Self {
            kind: UriKind::Generic,
            force_tls: false,
        };

        let Some(rest) = uri.strip_prefix("mongodb://") else {
            return generic;
        };

        let authority = rest.split(|c| c == '/' || c == '?').next().unwrap_or("");
        let hosts = authority.rsplit('@').next().unwrap_or("");
        if MANAGED_CLOUD_MARKERS
            .iter()
            .any(|marker| hosts.contains(marker))
        {
            Self {
                kind: UriKind::ManagedCloud,
                force_tls: true,
            }
        } else {
            generic
        }
    }
}
