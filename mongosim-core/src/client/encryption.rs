//! Client-side field-level encryption bootstrap.
//!
//! Resolves KMS provider credentials, layers auto-encryption on top of the
//! base client settings, builds the companion key-vault client, and
//! provisions encrypted collections. The sequence per encryption-enabled
//! client is: credentials resolved, encrypted client built, key-vault client
//! built, collections provisioned. Any step failure aborts the sequence; no
//! partially encrypted client is ever returned to the caller.
//!
//! # Security Features
//! - Local master-key material is zeroized when the read buffer is dropped
//! - Unknown KMS provider names fail before any credential is resolved
//! - Encryption layers on top of transport security, never replaces it

use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, Binary, Bson, Document};
use mongodb::client_encryption::{ClientEncryption, LocalMasterKey, MasterKey};
use mongodb::mongocrypt::ctx::KmsProvider;
use mongodb::options::{ClientOptions, TlsOptions};
use mongodb::{Client, Namespace};
use zeroize::Zeroizing;

use crate::client::tls::TlsSettings;
use crate::config::ConfigReader;
use crate::error::MongoSimError;
use crate::Result;

/// Master-key size required by the encryption scheme, in bytes.
const MASTER_KEY_LEN: usize = 96;

type KmsCredentials = Vec<(KmsProvider, Document, Option<TlsOptions>)>;

/// Encryption configuration block, parsed from the `encryption` sub-document.
///
/// String-valued fields accept the `$ENV_VAR` indirection form; resolution
/// happens when the block is parsed from the raw document.
#[derive(Debug, Clone, Default)]
pub struct EncryptionSettings {
    /// Whether field-level encryption is requested
    pub enabled: bool,
    /// Key-vault namespace in `database.collection` form
    pub key_vault_namespace: String,
    /// Key-vault connection string; defaults to the primary URI when absent
    pub key_vault_uri: Option<String>,
    /// Path to the crypt_shared library for local cryptographic operations
    pub shared_lib_path: Option<String>,
    /// Provider-name to provider-specific credential document
    pub key_providers: Document,
    /// Encrypted collections to provision, in order
    pub collections: Vec<EncryptedCollectionSpec>,
}

impl EncryptionSettings {
    /// Parses the `encryption` configuration sub-document.
    ///
    /// # Errors
    /// Returns a configuration error when encryption is enabled but
    /// `keyVaultNamespace` or `keyProviders` is missing, or on wrong-typed
    /// values anywhere in the block.
    pub fn from_document(config: &Document) -> Result<Self> {
        let reader = ConfigReader::new(config);

        let enabled = reader.get_bool("enabled")?.unwrap_or(false);
        if !enabled {
            return Ok(Self::default());
        }

        let key_vault_namespace = reader.get_str("keyVaultNamespace")?.ok_or_else(|| {
            MongoSimError::configuration("Encryption requires a keyVaultNamespace")
        })?;
        let key_providers = reader
            .get_document("keyProviders")?
            .cloned()
            .ok_or_else(|| MongoSimError::configuration("Encryption requires keyProviders"))?;

        let collections = match reader.get_array("collections")? {
            None => Vec::new(),
            Some(entries) => entries
                .iter()
                .map(|entry| match entry {
                    Bson::Document(spec) => EncryptedCollectionSpec::from_document(spec),
                    _ => Err(MongoSimError::configuration(
                        "Encrypted collection entries must be documents",
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(Self {
            enabled,
            key_vault_namespace,
            key_vault_uri: reader.get_str("keyVaultUri")?,
            shared_lib_path: reader.get_str("sharedlib")?,
            key_providers,
            collections,
        })
    }

    fn key_vault_namespace(&self) -> Result<Namespace> {
        let (db, coll) = self.key_vault_namespace.split_once('.').ok_or_else(|| {
            MongoSimError::configuration(format!(
                "keyVaultNamespace must be in 'database.collection' form, got '{}'",
                self.key_vault_namespace
            ))
        })?;
        Ok(Namespace::new(db, coll))
    }
}

/// One encrypted collection to provision. All four fields are mandatory.
#[derive(Debug, Clone)]
pub struct EncryptedCollectionSpec {
    /// Target database
    pub database: String,
    /// Target collection
    pub collection: String,
    /// KMS provider name wrapping this collection's data keys
    pub kms_provider: String,
    /// Field-encryption descriptors, passed through to the driver
    pub fields: Vec<Bson>,
}

impl EncryptedCollectionSpec {
    /// Parses one entry of the `collections` array.
    ///
    /// # Errors
    /// Returns a configuration error if any of `database`, `collection`,
    /// `kmsProvider` or `fields` is absent.
    pub fn from_document(config: &Document) -> Result<Self> {
        let reader = ConfigReader::new(config);

        let database = reader.get_str("database")?;
        let collection = reader.get_str("collection")?;
        let kms_provider = reader.get_str("kmsProvider")?;
        let fields = reader.get_array("fields")?;

        match (database, collection, kms_provider, fields) {
            (Some(database), Some(collection), Some(kms_provider), Some(fields)) => Ok(Self {
                database,
                collection,
                kms_provider,
                fields: fields.clone(),
            }),
            _ => Err(MongoSimError::configuration(
                "Encrypted collection mandatory fields are database, collection, kmsProvider, fields",
            )),
        }
    }

    /// Target namespace in `database.collection` form.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// The master key used when creating this collection's data keys.
    ///
    /// The local provider carries no per-collection master-key metadata;
    /// cloud and KMIP providers would need it and are rejected up front.
    fn master_key(&self) -> Result<MasterKey> {
        match self.kms_provider.as_str() {
            "local" => Ok(LocalMasterKey::builder().build().into()),
            other => Err(MongoSimError::unsupported_provider(other)),
        }
    }
}

/// Resolves credential documents for every configured KMS provider.
///
/// Dispatches per provider name; only the local (file-based) provider is
/// supported. An unrecognized name fails the whole resolution, never a
/// partial one.
pub(crate) fn resolve_kms_credentials(providers: &Document) -> Result<KmsCredentials> {
    let mut credentials = KmsCredentials::new();

    for (name, value) in providers {
        match name.as_str() {
            "local" => {
                let config = match value {
                    Bson::Document(doc) => doc,
                    _ => {
                        return Err(MongoSimError::configuration(
                            "Expected document value for config parameter 'local'",
                        ))
                    }
                };
                credentials.push((KmsProvider::local(), local_kms_credentials(config)?, None));
            }
            other => return Err(MongoSimError::unsupported_provider(other)),
        }
    }

    Ok(credentials)
}

/// Builds the local provider's credential document from its key file.
///
/// Reads exactly [`MASTER_KEY_LEN`] bytes; a shorter file is a fatal
/// configuration error. The read buffer is zeroized on drop.
fn local_kms_credentials(config: &Document) -> Result<Document> {
    let reader = ConfigReader::new(config);
    let key_path = reader.get_str("key")?.ok_or_else(|| {
        MongoSimError::configuration("Local key provider requires a 'key' file path")
    })?;

    let contents = Zeroizing::new(
        std::fs::read(&key_path)
            .map_err(|e| MongoSimError::io("Cannot read encryption key file", e))?,
    );
    if contents.len() < MASTER_KEY_LEN {
        return Err(MongoSimError::configuration(format!(
            "Encryption key file should be {} bytes, found {}",
            MASTER_KEY_LEN,
            contents.len()
        )));
    }

    Ok(doc! {
        "key": Binary {
            subtype: BinarySubtype::Generic,
            bytes: contents[..MASTER_KEY_LEN].to_vec(),
        },
    })
}

/// Builds the encrypted client and provisions encrypted collections.
pub struct EncryptionBootstrapper<'a> {
    settings: &'a EncryptionSettings,
    primary_uri: &'a str,
    tls: Option<&'a TlsSettings>,
}

impl<'a> EncryptionBootstrapper<'a> {
    /// Creates a bootstrapper for the given encryption settings.
    pub fn new(
        settings: &'a EncryptionSettings,
        primary_uri: &'a str,
        tls: Option<&'a TlsSettings>,
    ) -> Self {
        Self {
            settings,
            primary_uri,
            tls,
        }
    }

    /// Runs the bootstrap sequence on top of the given base settings.
    ///
    /// The base options are cloned-and-extended, never mutated: the encrypted
    /// client extends them with auto-encryption, and the key-vault client is
    /// built independently against the key-vault URI (defaulting to the
    /// primary URI) with the same TLS configuration.
    ///
    /// # Errors
    /// Any step failure aborts the sequence and is returned with its cause.
    pub async fn build(&self, base_options: ClientOptions) -> Result<Client> {
        let kms_credentials = resolve_kms_credentials(&self.settings.key_providers)?;
        let namespace = self.settings.key_vault_namespace()?;

        let mut builder = Client::encrypted_builder(
            base_options,
            namespace.clone(),
            kms_credentials.clone(),
        )
        .map_err(|e| MongoSimError::connection("Failed to configure auto-encryption", e))?;
        if let Some(path) = &self.settings.shared_lib_path {
            builder = builder.extra_options(doc! { "cryptSharedLibPath": path.as_str() });
        }
        let encrypted_client = builder
            .build()
            .await
            .map_err(|e| MongoSimError::connection("Failed to create encrypted client", e))?;

        let key_vault_client = self.key_vault_client().await?;
        let client_encryption = ClientEncryption::new(key_vault_client, namespace, kms_credentials)
            .map_err(|e| MongoSimError::connection("Failed to create key-vault encryption handle", e))?;

        for spec in &self.settings.collections {
            self.provision_collection(&encrypted_client, &client_encryption, spec)
                .await?;
        }

        Ok(encrypted_client)
    }

    /// Builds the independent key-vault client, reusing the TLS configuration.
    async fn key_vault_client(&self) -> Result<Client> {
        let uri = self
            .settings
            .key_vault_uri
            .as_deref()
            .unwrap_or(self.primary_uri);
        let options = super::build_base_options(uri, self.tls).await?;
        Client::with_options(options).map_err(|e| {
            MongoSimError::connection(
                format!(
                    "Failed to create key-vault client for {}",
                    crate::error::redact_connection_string(uri)
                ),
                e,
            )
        })
    }

    /// Provisions one encrypted collection, idempotently.
    ///
    /// If the target collection already exists, creation is skipped and
    /// logged: re-running the bootstrap against an already-provisioned
    /// deployment must be safe.
    async fn provision_collection(
        &self,
        encrypted_client: &Client,
        client_encryption: &ClientEncryption,
        spec: &EncryptedCollectionSpec,
    ) -> Result<()> {
        let db = encrypted_client.database(&spec.database);

        let existing = db
            .list_collection_names()
            .await
            .map_err(|e| MongoSimError::provisioning(spec.namespace(), e))?;
        if !needs_provisioning(&existing, &spec.collection) {
            tracing::info!(
                "Collection {} already exists, do not create encrypted collection",
                spec.namespace()
            );
            return Ok(());
        }

        let master_key = spec.master_key()?;
        let (_, result) = client_encryption
            .create_encrypted_collection(&db, &spec.collection, master_key)
            .encrypted_fields(doc! { "fields": spec.fields.clone() })
            .await;
        result.map_err(|e| MongoSimError::provisioning(spec.namespace(), e))?;

        tracing::info!("Created encrypted collection {}", spec.namespace());
        Ok(())
    }
}

/// Whether the target collection still needs to be created.
///
/// Re-running the bootstrap against an already-provisioned deployment must be
/// safe, so a collection already present in the database short-circuits
/// creation instead of raising an error.
fn needs_provisioning(existing: &[String], collection: &str) -> bool {
    !existing.iter().any(|name| name == collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use std::io::Write;

    fn write_key_file(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0x42u8; len]).unwrap();
        file.flush().unwrap();
        file
    }

    fn key_path(file: &tempfile::NamedTempFile) -> String {
        file.path().to_str().unwrap().to_string()
    }

    #[test]
    fn test_settings_disabled_by_default() {
        let settings = EncryptionSettings::from_document(&doc! {}).unwrap();
        assert!(!settings.enabled);

        let settings = EncryptionSettings::from_document(&doc! { "enabled": false }).unwrap();
        assert!(!settings.enabled);
    }

    #[test]
    fn test_settings_mandatory_fields() {
        let missing_namespace = doc! { "enabled": true, "keyProviders": { "local": {} } };
        assert!(EncryptionSettings::from_document(&missing_namespace).is_err());

        let missing_providers = doc! { "enabled": true, "keyVaultNamespace": "keyvault.datakeys" };
        assert!(EncryptionSettings::from_document(&missing_providers).is_err());
    }

    #[test]
    fn test_settings_full_parse() {
        let config = doc! {
            "enabled": true,
            "keyVaultNamespace": "keyvault.datakeys",
            "keyVaultUri": "mongodb://vault:27017",
            "sharedlib": "/opt/mongo_crypt_v1.so",
            "keyProviders": { "local": { "key": "/etc/keys/master.bin" } },
            "collections": [{
                "database": "db",
                "collection": "patients",
                "kmsProvider": "local",
                "fields": [{ "path": "ssn", "bsonType": "string" }],
            }],
        };
        let settings = EncryptionSettings::from_document(&config).unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.key_vault_namespace, "keyvault.datakeys");
        assert_eq!(settings.key_vault_uri.as_deref(), Some("mongodb://vault:27017"));
        assert_eq!(settings.shared_lib_path.as_deref(), Some("/opt/mongo_crypt_v1.so"));
        assert_eq!(settings.collections.len(), 1);
        assert_eq!(settings.collections[0].namespace(), "db.patients");
    }

    #[test]
    fn test_key_vault_namespace_form() {
        let config = doc! {
            "enabled": true,
            "keyVaultNamespace": "nodot",
            "keyProviders": { "local": { "key": "/k" } },
        };
        let settings = EncryptionSettings::from_document(&config).unwrap();

        assert!(settings.key_vault_namespace().is_err());
    }

    #[test]
    fn test_collection_spec_mandatory_fields() {
        let complete = doc! {
            "database": "db",
            "collection": "coll",
            "kmsProvider": "local",
            "fields": [],
        };
        assert!(EncryptedCollectionSpec::from_document(&complete).is_ok());

        for missing in ["database", "collection", "kmsProvider", "fields"] {
            let mut config = complete.clone();
            config.remove(missing);
            let result = EncryptedCollectionSpec::from_document(&config);
            assert!(result.is_err(), "expected error without '{}'", missing);
        }
    }

    #[test]
    fn test_local_master_key() {
        let spec = EncryptedCollectionSpec {
            database: "db".to_string(),
            collection: "coll".to_string(),
            kms_provider: "local".to_string(),
            fields: Vec::new(),
        };
        assert!(matches!(spec.master_key(), Ok(MasterKey::Local(_))));
    }

    #[test]
    fn test_cloud_master_key_is_unsupported() {
        let spec = EncryptedCollectionSpec {
            database: "db".to_string(),
            collection: "coll".to_string(),
            kms_provider: "aws".to_string(),
            fields: Vec::new(),
        };
        assert!(matches!(
            spec.master_key(),
            Err(MongoSimError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_local_credentials_read_96_bytes() {
        let file = write_key_file(MASTER_KEY_LEN);
        let credentials = local_kms_credentials(&doc! { "key": key_path(&file) }).unwrap();

        let key = credentials.get_binary_generic("key").unwrap();
        assert_eq!(key.len(), MASTER_KEY_LEN);
    }

    #[test]
    fn test_local_credentials_truncate_longer_files() {
        let file = write_key_file(MASTER_KEY_LEN + 32);
        let credentials = local_kms_credentials(&doc! { "key": key_path(&file) }).unwrap();

        let key = credentials.get_binary_generic("key").unwrap();
        assert_eq!(key.len(), MASTER_KEY_LEN);
    }

    #[test]
    fn test_local_credentials_short_file_fails() {
        let file = write_key_file(MASTER_KEY_LEN - 1);
        let result = local_kms_credentials(&doc! { "key": key_path(&file) });

        assert!(matches!(result, Err(MongoSimError::Configuration { .. })));
    }

    #[test]
    fn test_local_credentials_missing_file_fails() {
        let result = local_kms_credentials(&doc! { "key": "/nonexistent/master.bin" });

        assert!(matches!(result, Err(MongoSimError::Io { .. })));
    }

    #[test]
    fn test_key_path_env_indirection() {
        let file = write_key_file(MASTER_KEY_LEN);
        std::env::set_var("MONGOSIM_TEST_KEY_FILE", key_path(&file));

        let credentials =
            local_kms_credentials(&doc! { "key": "$MONGOSIM_TEST_KEY_FILE" }).unwrap();
        assert_eq!(
            credentials.get_binary_generic("key").unwrap().len(),
            MASTER_KEY_LEN
        );

        std::env::remove_var("MONGOSIM_TEST_KEY_FILE");
    }

    #[test]
    fn test_absent_collection_needs_provisioning() {
        let existing = vec!["datakeys".to_string(), "patients".to_string()];

        assert!(needs_provisioning(&existing, "visits"));
        assert!(!needs_provisioning(&existing, "patients"));
        assert!(needs_provisioning(&[], "patients"));
    }

    #[test]
    fn test_second_provisioning_run_creates_nothing() {
        let config = doc! {
            "enabled": true,
            "keyVaultNamespace": "keyvault.datakeys",
            "keyProviders": { "local": { "key": "/etc/keys/master.bin" } },
            "collections": [
                {
                    "database": "db",
                    "collection": "patients",
                    "kmsProvider": "local",
                    "fields": [],
                },
                {
                    "database": "db",
                    "collection": "visits",
                    "kmsProvider": "local",
                    "fields": [],
                },
            ],
        };
        let settings = EncryptionSettings::from_document(&config).unwrap();

        // After a first run every configured collection exists, so a second
        // pass over the same settings skips them all.
        let existing: Vec<String> = settings
            .collections
            .iter()
            .map(|spec| spec.collection.clone())
            .collect();

        assert!(settings
            .collections
            .iter()
            .all(|spec| !needs_provisioning(&existing, &spec.collection)));
    }

    #[test]
    fn test_resolve_local_provider() {
        let file = write_key_file(MASTER_KEY_LEN);
        let providers = doc! { "local": { "key": key_path(&file) } };

        let credentials = resolve_kms_credentials(&providers).unwrap();
        assert_eq!(credentials.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_provider_fails() {
        let providers = doc! { "aws": { "accessKeyId": "AKIA...", "secretAccessKey": "..." } };
        let result = resolve_kms_credentials(&providers);

        assert!(matches!(
            result,
            Err(MongoSimError::UnsupportedProvider { .. })
        ));
    }
}
