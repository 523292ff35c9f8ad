//! rustls server-certificate verifier that trusts by digest only.

use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tracing::warn;

use crate::{CertHash, PinError};

/// Accepts the leaf certificate iff its SHA-384 digest matches one of
/// the configured pins. Handshake signatures are still verified with
/// the provider's algorithms; only the trust-anchor step is replaced.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    pins: Vec<CertHash>,
    provider: Arc<CryptoProvider>,
    // rustls can only report a generic error out of the handshake, so
    // the rejected digest is parked here for the caller to pick up.
    mismatch: Mutex<Option<String>>,
}

impl PinnedCertVerifier {
    pub fn new(pins: Vec<CertHash>) -> Result<Self, PinError> {
        if pins.is_empty() {
            return Err(PinError::NoPins);
        }
        Ok(Self {
            pins,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            mismatch: Mutex::new(None),
        })
    }

    /// Builds a client config that delegates all server authentication
    /// to this verifier.
    pub fn client_config(self: Arc<Self>) -> Result<rustls::ClientConfig, PinError> {
        let config = rustls::ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(self)
            .with_no_client_auth();
        Ok(config)
    }

    /// Returns and clears the digest of the last rejected certificate.
    pub fn take_mismatch(&self) -> Option<String> {
        self.mismatch.lock().expect("mismatch lock").take()
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let presented = CertHash::of_der(end_entity.as_ref());
        if self.pins.iter().any(|pin| *pin == presented) {
            return Ok(ServerCertVerified::assertion());
        }
        warn!(presented = %presented, "server certificate matched no pin");
        *self.mismatch.lock().expect("mismatch lock") = Some(presented.to_string());
        Err(rustls::Error::InvalidCertificate(
            CertificateError::ApplicationVerificationFailure,
        ))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
