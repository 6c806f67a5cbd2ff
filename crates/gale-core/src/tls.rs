//! TLS support using rustls
//!
//! Provides the client side of HTTPS exchanges:
//! - A [`TlsContext`] holding the trust store and verification policy,
//!   either standalone or as the guarded process-wide instance
//! - A [`SessionFactory`] that hands out one SNI-bound [`TlsSession`] per
//!   connection
//! - A per-context error queue drained by [`SessionFactory::last_error_string`]
//!
//! Peer verification (chain and hostname) is on by default.
//! [`Verification::AcceptAll`] turns it off and must be asked for explicitly.

use crate::error::NO_TLS_ERRORS;
use crate::{Error, Result};
use parking_lot::Mutex;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Where trust anchors come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustStore {
    /// Bundled Mozilla root program (webpki-roots)
    #[default]
    System,
    /// PEM bundle on disk
    File(PathBuf),
}

/// Server certificate policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verification {
    /// Verify chain and hostname
    #[default]
    Peer,
    /// Accept any certificate. Handshake signatures are still checked.
    AcceptAll,
}

/// TLS configuration
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub trust: TrustStore,
    pub verification: Verification,
    /// ALPN protocols (default: ["http/1.1"])
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            trust: TrustStore::System,
            verification: Verification::Peer,
            alpn_protocols: vec![b"http/1.1".to_vec()],
        }
    }
}

impl TlsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust only the certificates in a PEM file
    pub fn trust_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust = TrustStore::File(path.into());
        self
    }

    pub fn verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Build rustls ClientConfig
    pub fn build_client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?;

        let mut config = match self.verification {
            Verification::Peer => builder
                .with_root_certificates(load_roots(&self.trust)?)
                .with_no_client_auth(),
            Verification::AcceptAll => {
                tracing::warn!("TLS peer verification disabled: accepting any server certificate");
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(&provider)))
                    .with_no_client_auth()
            }
        };
        config.alpn_protocols = self.alpn_protocols.clone();

        Ok(Arc::new(config))
    }
}

/// Load certificates from PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("Failed to open trust file {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certs: {}", e)))?;

    if certs.is_empty() {
        return Err(Error::Tls("No certificates found in file".to_string()));
    }

    Ok(certs)
}

fn load_roots(trust: &TrustStore) -> Result<RootCertStore> {
    match trust {
        TrustStore::System => Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        }),
        TrustStore::File(path) => {
            let mut roots = RootCertStore::empty();
            let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
            if added == 0 {
                return Err(Error::Tls(format!(
                    "No usable trust anchors in {} ({} ignored)",
                    path.display(),
                    ignored
                )));
            }
            Ok(roots)
        }
    }
}

/// Verifier behind [`Verification::AcceptAll`]
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

static PROCESS_CONTEXT: Mutex<Option<Arc<TlsContext>>> = parking_lot::const_mutex(None);

/// Shared TLS state: client config plus the diagnostic error queue
pub struct TlsContext {
    options: TlsOptions,
    connector: TlsConnector,
    errors: Mutex<VecDeque<String>>,
}

impl TlsContext {
    /// Build a standalone context
    pub fn new(options: TlsOptions) -> Result<Arc<Self>> {
        let config = options.build_client_config()?;
        Ok(Arc::new(Self {
            options,
            connector: TlsConnector::from(config),
            errors: Mutex::new(VecDeque::new()),
        }))
    }

    /// The process-wide context, built on first use.
    ///
    /// Concurrent first calls build it once. Options passed after that are
    /// ignored until [`TlsContext::teardown`].
    pub fn process(options: TlsOptions) -> Result<Arc<Self>> {
        let mut slot = PROCESS_CONTEXT.lock();
        if let Some(context) = slot.as_ref() {
            return Ok(context.clone());
        }
        let context = Self::new(options)?;
        tracing::debug!(trust = ?context.options.trust, "process TLS context initialized");
        *slot = Some(context.clone());
        Ok(context)
    }

    /// Drop the process-wide context; the next `process` call rebuilds it.
    /// Contexts already handed out stay valid.
    pub fn teardown() {
        if PROCESS_CONTEXT.lock().take().is_some() {
            tracing::debug!("process TLS context torn down");
        }
    }

    pub fn options(&self) -> &TlsOptions {
        &self.options
    }

    pub(crate) fn record_error(&self, error: impl Into<String>) {
        self.errors.lock().push_back(error.into());
    }

    /// Drain the error queue, oldest first
    pub fn last_error_string(&self) -> String {
        let mut errors = self.errors.lock();
        if errors.is_empty() {
            return NO_TLS_ERRORS.to_string();
        }
        errors.drain(..).collect::<Vec<_>>().join("; ")
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("options", &self.options)
            .field("queued_errors", &self.errors.lock().len())
            .finish()
    }
}

/// Hands out per-connection TLS sessions bound to one context
#[derive(Debug, Clone)]
pub struct SessionFactory {
    context: Arc<TlsContext>,
}

impl SessionFactory {
    /// Factory over a new standalone context
    pub fn new(options: TlsOptions) -> Result<Self> {
        Ok(Self::from_context(TlsContext::new(options)?))
    }

    /// Factory over the process-wide context with default options
    pub fn process_default() -> Result<Self> {
        Ok(Self::from_context(TlsContext::process(TlsOptions::default())?))
    }

    pub fn from_context(context: Arc<TlsContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<TlsContext> {
        &self.context
    }

    /// Create a session for one connection to `host`, with SNI set
    pub fn create_session(&self, host: &str) -> Result<TlsSession> {
        let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
            let message = format!("invalid server name {:?}: {}", host, e);
            self.context.record_error(message.clone());
            Error::Tls(message)
        })?;
        Ok(TlsSession {
            server_name,
            context: self.context.clone(),
        })
    }

    /// Explicit release; a no-op for `None`
    pub fn release_session(&self, session: Option<TlsSession>) {
        drop(session);
    }

    /// Drain the context's pending TLS errors
    pub fn last_error_string(&self) -> String {
        self.context.last_error_string()
    }
}

/// One-use TLS session bound to a server name
pub struct TlsSession {
    server_name: ServerName<'static>,
    context: Arc<TlsContext>,
}

impl TlsSession {
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    pub(crate) fn context(&self) -> &Arc<TlsContext> {
        &self.context
    }

    /// Run the client handshake over `io`
    pub(crate) async fn handshake<IO>(self, io: IO) -> std::io::Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self
            .context
            .connector
            .connect(self.server_name.clone(), io)
            .await;
        if let Err(e) = &result {
            let detail = e
                .get_ref()
                .map(|inner| inner.to_string())
                .unwrap_or_else(|| e.kind().to_string());
            self.context
                .record_error(format!("handshake with {:?} failed: {}", self.server_name, detail));
        }
        result
    }
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("server_name", &self.server_name)
            .finish()
    }
}
