//! TLS trust configuration from CA bundle material.
//!
//! Builds the transport-security side of client options: parsing the
//! `tlsOptions` configuration block, validating custom CA bundles (which
//! commonly contain a root plus one or more intermediates), and applying the
//! connection profile's TLS policy.
//!
//! # Security Features
//! - Invalid or empty CA material is a hard failure, never a fallback to
//!   insecure transport
//! - Hostname verification stays strict unless explicitly relaxed
//! - The number of certificates loaded is logged so operators can confirm
//!   the expected bundle size

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use mongodb::bson::Document;
use mongodb::options::{ClientOptions, Tls, TlsOptions};

use crate::client::profile::ConnectionProfile;
use crate::config::ConfigReader;
use crate::error::MongoSimError;
use crate::Result;

/// TLS configuration block, parsed from the `tlsOptions` sub-document.
///
/// Consumed once to build the client's trust context; never mutated after
/// construction.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// Whether transport security is requested
    pub enabled: bool,
    /// Optional CA bundle path (already env-resolved)
    pub ca_file_path: Option<PathBuf>,
    /// Relax hostname verification (default: strict)
    pub allow_invalid_hostnames: bool,
}

impl TlsSettings {
    /// Parses the `tlsOptions` configuration sub-document.
    ///
    /// The `tlsCAFile` value accepts the `$ENV_VAR` indirection form.
    ///
    /// # Errors
    /// Returns a configuration error on wrong-typed values.
    pub fn from_document(config: &Document) -> Result<Self> {
        let reader = ConfigReader::new(config);

        Ok(Self {
            enabled: reader.get_bool("tls")?.unwrap_or(false),
            ca_file_path: reader.get_str("tlsCAFile")?.map(PathBuf::from),
            allow_invalid_hostnames: reader.get_bool("invalidHostNameAllowed")?.unwrap_or(false),
        })
    }
}

/// A validated CA bundle: the trust-context handle handed to the driver.
///
/// Loading decodes every PEM certificate in the file so that a broken or
/// empty bundle fails client construction up front; the driver then owns the
/// resulting trust store for the lifetime of the client built with it.
#[derive(Debug, Clone)]
pub struct CaBundle {
    path: PathBuf,
    certificate_count: usize,
}

impl CaBundle {
    /// Loads and validates a CA bundle file.
    ///
    /// The file is read as a concatenated sequence of PEM certificates; the
    /// count is unbounded.
    ///
    /// # Errors
    /// Returns a TLS configuration error wrapping the underlying I/O or
    /// decoding cause if the file is missing, unreadable, or contains no
    /// decodable certificate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MongoSimError::tls_config(
                format!("Cannot open CA bundle file: {}", path.display()),
                e,
            )
        })?;

        let mut reader = BufReader::new(file);
        let certificates = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                MongoSimError::tls_config(
                    format!("Cannot decode CA bundle file: {}", path.display()),
                    e,
                )
            })?;

        if certificates.is_empty() {
            return Err(MongoSimError::tls_config(
                format!(
                    "CA bundle contains no decodable certificate: {}",
                    path.display()
                ),
                std::io::Error::new(std::io::ErrorKind::InvalidData, "empty certificate bundle"),
            ));
        }

        tracing::info!(
            "Loaded {} certificates from CA bundle: {}",
            certificates.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            certificate_count: certificates.len(),
        })
    }

    /// The validated bundle path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of certificates decoded from the bundle.
    pub fn certificate_count(&self) -> usize {
        self.certificate_count
    }
}

/// Applies the connection profile's TLS policy to client options.
///
/// When the profile forces TLS, transport security is enabled unconditionally
/// regardless of `TlsSettings.enabled`; otherwise it is enabled only when the
/// settings request it. In either case a supplied CA file is validated and
/// applied, and hostname verification is relaxed only when explicitly allowed.
/// The rustls backend exposes no hostname-only switch, so the relaxation maps
/// to the driver's certificate-verification override.
///
/// # Errors
/// Returns a TLS configuration error if the configured CA bundle is invalid.
pub fn apply_profile(
    options: &mut ClientOptions,
    profile: &ConnectionProfile,
    settings: Option<&TlsSettings>,
) -> Result<()> {
    let requested = settings.is_some_and(|s| s.enabled);
    if !profile.force_tls && !requested {
        return Ok(());
    }

    let mut tls_options = TlsOptions::default();

    if let Some(settings) = settings {
        if let Some(ca_path) = &settings.ca_file_path {
            let bundle = CaBundle::load(ca_path)?;
            tracing::info!("Using custom TLS CA file: {}", bundle.path().display());
            tls_options.ca_file_path = Some(bundle.path().to_path_buf());
        }
        if settings.allow_invalid_hostnames {
            tls_options.allow_invalid_certificates = Some(true);
        }
    }

    options.tls = Some(Tls::Enabled(tls_options));
    Ok(())
}
