//! TLS configuration and upgrade helpers, built on `tokio-rustls`.

use std::io::Cursor;
use std::sync::Arc;

use tokio_rustls::rustls;

use crate::error::ConnectError;
use crate::options::TlsOptions;

/// Builds a `rustls::ClientConfig` from the user's [`TlsOptions`], falling
/// back to the bundled Mozilla root store when no custom roots are given.
pub fn build_client_config(options: &TlsOptions) -> Result<rustls::ClientConfig, ConnectError> {
    let mut roots = rustls::RootCertStore::empty();

    if options.root_certificates.is_empty() {
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
    } else {
        for der in &options.root_certificates {
            let mut reader = Cursor::new(der);
            let certs = rustls_pemfile::certs(&mut reader).map_err(|err| {
                ConnectError::TlsConfigurationFailed {
                    reason: format!("invalid root certificate: {err}"),
                }
            })?;
            for cert in certs {
                roots
                    .add(&rustls::Certificate(cert))
                    .map_err(|err| ConnectError::TlsConfigurationFailed {
                        reason: format!("failed to add root certificate: {err}"),
                    })?;
            }
        }
    }

    let builder = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots);

    let mut config = if let Some((chain_pem, key_pem)) = &options.client_certificate {
        let certs = chain_pem
            .iter()
            .map(|der| rustls::Certificate(der.clone()))
            .collect();
        let key = rustls::PrivateKey(key_pem.clone());
        builder
            .with_single_cert(certs, key)
            .map_err(|err| ConnectError::TlsConfigurationFailed {
                reason: format!("invalid client certificate: {err}"),
            })?
    } else {
        builder.with_no_client_auth()
    };

    if options.insecure_skip_verify {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertificateVerification));
    }

    Ok(config)
}

/// A verifier that accepts any server certificate. Only wired up when the
/// caller explicitly opts into `TlsOptions::insecure_skip_verify` (e.g. for
/// talking to a server with a self-signed certificate in a test
/// environment); never the default.
struct NoCertificateVerification;

impl rustls::client::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

/// Resolves the TLS server-name to use for SNI: the explicit override if
/// set, otherwise the server-reported host, falling back to the address the
/// client dialed.
pub fn server_name(
    options: &TlsOptions,
    info_host: &str,
    dialed_host: &str,
) -> Result<rustls::ServerName, ConnectError> {
    let candidate = options
        .sni
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| if info_host.is_empty() { None } else { Some(info_host) })
        .unwrap_or(dialed_host);

    rustls::ServerName::try_from(candidate).map_err(|_| ConnectError::TlsConfigurationFailed {
        reason: format!("cannot determine a valid hostname for TLS SNI: {candidate}"),
    })
}

pub(crate) fn connector(config: rustls::ClientConfig) -> tokio_rustls::TlsConnector {
    tokio_rustls::TlsConnector::from(Arc::new(config))
}
