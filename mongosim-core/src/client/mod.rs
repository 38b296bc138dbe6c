//! Client construction from a declarative configuration document.
//!
//! # Module Structure
//! - `profile`: connection string classification (generic vs managed-cloud)
//! - `tls`: TLS settings parsing and CA bundle trust configuration
//! - `encryption`: field-level encryption bootstrap and collection provisioning
//!
//! # Security Guarantees
//! - Connection strings are sanitized in all error messages
//! - Managed-cloud deployments get TLS whether or not the config asks for it
//! - A client is returned fully configured or not at all

pub mod encryption;
pub mod profile;
pub mod tls;

use mongodb::bson::Document;
use mongodb::options::ClientOptions;
use mongodb::Client;

use crate::config::ConfigReader;
use crate::error::{redact_connection_string, MongoSimError};
use crate::Result;

pub use encryption::{EncryptedCollectionSpec, EncryptionBootstrapper, EncryptionSettings};
pub use profile::{ConnectionProfile, UriKind};
pub use tls::{apply_profile, CaBundle, TlsSettings};

/// Builds clients from the top-level configuration document.
///
/// # Example
/// ```rust,ignore
/// use mongodb::bson::doc;
/// use mongosim_core::client::ClientFactory;
///
/// let config = doc! {
///     "connectionString": "mongodb://localhost:27017/test",
///     "tlsOptions": { "tls": true, "tlsCAFile": "$CA_BUNDLE" },
/// };
/// let client = ClientFactory::from_config(&config)?.connect().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ClientFactory {
    uri: String,
    tls: Option<TlsSettings>,
    encryption: EncryptionSettings,
}

impl ClientFactory {
    /// Parses the top-level configuration document.
    ///
    /// Reads `connectionString` (mandatory) plus the optional `tlsOptions`
    /// and `encryption` sub-documents.
    ///
    /// # Errors
    /// Returns a configuration error on a missing connection string or
    /// wrong-typed values in either sub-document.
    pub fn from_config(config: &Document) -> Result<Self> {
        let reader = ConfigReader::new(config);

        let uri = reader.get_str("connectionString")?.ok_or_else(|| {
            MongoSimError::configuration("Configuration requires a connectionString")
        })?;
        let tls = reader
            .get_document("tlsOptions")?
            .map(TlsSettings::from_document)
            .transpose()?;
        let encryption = reader
            .get_document("encryption")?
            .map(EncryptionSettings::from_document)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            uri,
            tls,
            encryption,
        })
    }

    /// The primary connection string (never logged unredacted).
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Builds the configured client.
    ///
    /// Transport settings are applied identically whether or not encryption
    /// is enabled; when it is, the encryption bootstrap layers on top of the
    /// same base options and provisions its collections before the client is
    /// handed back. The caller owns the client's lifetime from here on.
    ///
    /// # Errors
    /// Any configuration, TLS, or bootstrap failure aborts construction;
    /// no partially-secured client is returned.
    pub async fn connect(&self) -> Result<Client> {
        let base_options = build_base_options(&self.uri, self.tls.as_ref()).await?;

        if !self.encryption.enabled {
            return Client::with_options(base_options).map_err(|e| {
                MongoSimError::connection(
                    format!(
                        "Failed to create client for {}",
                        redact_connection_string(&self.uri)
                    ),
                    e,
                )
            });
        }

        EncryptionBootstrapper::new(&self.encryption, &self.uri, self.tls.as_ref())
            .build(base_options)
            .await
    }
}

/// Validates a connection string before handing it to the driver.
///
/// Checks only the scheme and the presence of a host list; multi-host seed
/// lists are valid here. Full syntax validation belongs to the driver's own
/// connection-string parser.
///
/// # Errors
/// Returns a configuration error if the string is not a `mongodb://` or
/// `mongodb+srv://` URI with at least one host.
pub fn validate_connection_string(uri: &str) -> Result<()> {
    let rest = uri
        .strip_prefix("mongodb://")
        .or_else(|| uri.strip_prefix("mongodb+srv://"))
        .ok_or_else(|| {
            MongoSimError::configuration(
                "Connection string must use mongodb:// or mongodb+srv:// scheme",
            )
        })?;

    let authority = rest.split(|c| c == '/' || c == '?').next().unwrap_or("");
    let hosts = authority.rsplit('@').next().unwrap_or("");
    if hosts.is_empty() {
        return Err(MongoSimError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

/// Builds validated base client options for a URI.
///
/// The result is an immutable starting point: each client variant (primary,
/// encrypted, key-vault) clones and extends it rather than mutating shared
/// state. The connection profile and TLS settings are applied here so every
/// variant carries identical transport security.
pub(crate) async fn build_base_options(
    uri: &str,
    tls: Option<&TlsSettings>,
) -> Result<ClientOptions> {
    validate_connection_string(uri)?;

    let mut options = ClientOptions::parse(uri).await.map_err(|e| {
        MongoSimError::configuration(format!("Failed to parse connection options: {}", e))
    })?;

    options.app_name = Some(format!("mongosim-{}", env!("CARGO_PKG_VERSION")));

    let profile = ConnectionProfile::classify(uri);
    if profile.kind == UriKind::ManagedCloud {
        tracing::debug!(
            "Managed-cloud deployment detected for {}, forcing TLS",
            redact_connection_string(uri)
        );
    }
    apply_profile(&mut options, &profile, tls)?;

    Ok(options)
}
