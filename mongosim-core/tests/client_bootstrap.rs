//! Client bootstrap tests without requiring a real deployment.
//!
//! Client construction in the driver is lazy, so a factory built from a valid
//! configuration succeeds without a server; the failure paths exercised here
//! are the ones that must abort before any network traffic happens.

use std::io::Write;

use mongodb::bson::doc;
use mongosim_core::client::ClientFactory;
use mongosim_core::error::MongoSimError;

const FAKE_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\n\
     QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVo=\n\
     -----END CERTIFICATE-----\n";

#[tokio::test]
async fn test_plain_client_from_minimal_config() {
    let config = doc! { "connectionString": "mongodb://localhost:27017/test" };
    let factory = ClientFactory::from_config(&config).unwrap();

    // No server interaction happens at construction time.
    let result = factory.connect().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_client_with_custom_ca_bundle() {
    let mut ca_file = tempfile::NamedTempFile::new().unwrap();
    ca_file.write_all(FAKE_CERTIFICATE.as_bytes()).unwrap();
    ca_file.flush().unwrap();

    let config = doc! {
        "connectionString": "mongodb://localhost:27017/test",
        "tlsOptions": {
            "tls": true,
            "tlsCAFile": ca_file.path().to_str().unwrap(),
        },
    };
    let factory = ClientFactory::from_config(&config).unwrap();

    let result = factory.connect().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_missing_ca_bundle_aborts_construction() {
    let config = doc! {
        "connectionString": "mongodb://localhost:27017/test",
        "tlsOptions": { "tls": true, "tlsCAFile": "/nonexistent/bundle.pem" },
    };
    let factory = ClientFactory::from_config(&config).unwrap();

    let result = factory.connect().await;
    assert!(matches!(result, Err(MongoSimError::TlsConfig { .. })));
}

#[tokio::test]
async fn test_unsupported_kms_provider_aborts_before_credentials() {
    let config = doc! {
        "connectionString": "mongodb://localhost:27017/test",
        "encryption": {
            "enabled": true,
            "keyVaultNamespace": "keyvault.datakeys",
            "keyProviders": { "kmip": { "endpoint": "kmip.example.com" } },
            "collections": [],
        },
    };
    let factory = ClientFactory::from_config(&config).unwrap();

    let result = factory.connect().await;
    assert!(matches!(
        result,
        Err(MongoSimError::UnsupportedProvider { .. })
    ));
}

#[tokio::test]
async fn test_short_key_file_aborts_bootstrap() {
    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    key_file.write_all(&[0u8; 32]).unwrap();
    key_file.flush().unwrap();

    let config = doc! {
        "connectionString": "mongodb://localhost:27017/test",
        "encryption": {
            "enabled": true,
            "keyVaultNamespace": "keyvault.datakeys",
            "keyProviders": { "local": { "key": key_file.path().to_str().unwrap() } },
        },
    };
    let factory = ClientFactory::from_config(&config).unwrap();

    let result = factory.connect().await;
    assert!(matches!(result, Err(MongoSimError::Configuration { .. })));
}

#[tokio::test]
async fn test_invalid_scheme_is_rejected() {
    let config = doc! { "connectionString": "redis://localhost:6379" };
    let factory = ClientFactory::from_config(&config).unwrap();

    let result = factory.connect().await;
    assert!(matches!(result, Err(MongoSimError::Configuration { .. })));
}
