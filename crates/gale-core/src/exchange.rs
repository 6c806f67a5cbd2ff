//! One request/response exchange over one connection
//!
//! An [`Exchange`] is built on the caller's thread and runs as a single
//! task on the reactor: connect, optional TLS handshake, HTTP/1.1 request,
//! full body read. The connection is dropped when the task ends, so nothing
//! is reused across requests.
//!
//! Every exchange carries a [`Completion`] guard. Whatever ends the task
//! (success, failure, cancellation, reactor shutdown) the guard settles the
//! registry entry exactly once.

use crate::config::EngineConfig;
use crate::error::{NO_SOCKET_ERRORS, NO_TLS_ERRORS};
use crate::registry::{ExchangeId, Registry};
use crate::response::{ExchangeState, Outcome, Slot};
#[cfg(feature = "tls")]
use crate::tls::{TlsContext, TlsSession};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Socket error reported for exchanges dropped by a reactor shutdown
pub(crate) const REACTOR_SHUT_DOWN: &str = "reactor shut down before the exchange completed";

/// Diagnostic composite: socket error first, TLS queue second
pub(crate) fn compose_error(socket: &str, tls: &str) -> String {
    let socket = if socket.is_empty() { NO_SOCKET_ERRORS } else { socket };
    let tls = if tls.is_empty() { NO_TLS_ERRORS } else { tls };
    format!("[Socket error: {}]; [TLS error: {}]", socket, tls)
}

/// Per-exchange knobs taken from the engine config at submission
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    connect_timeout: Option<Duration>,
    exchange_timeout: Option<Duration>,
    tcp_nodelay: bool,
    tcp_keepalive: Option<Duration>,
}

impl From<&EngineConfig> for Settings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            exchange_timeout: config.exchange_timeout,
            tcp_nodelay: config.tcp_nodelay,
            tcp_keepalive: config.tcp_keepalive,
        }
    }
}

/// Plain TCP or TLS over TCP
pub(crate) enum Transport {
    Plain,
    #[cfg(feature = "tls")]
    Tls(TlsSession),
}

/// Lowest-level failure text of a transport error
#[derive(Debug)]
pub(crate) struct TransportError(String);

impl TransportError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// `context: error: source: source...`
    fn chain(context: &str, error: &(dyn StdError + 'static)) -> Self {
        let mut message = format!("{}: {}", context, error);
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self(message)
    }
}

impl From<hyper::Error> for TransportError {
    fn from(e: hyper::Error) -> Self {
        Self::chain("http", &e)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What arrived on the wire
struct Delivered {
    http_version: String,
    status_code: i32,
    status_phrase: String,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

/// Settles one registry entry exactly once.
///
/// Dropped without [`Completion::finish`] (task aborted or never polled),
/// it reports the reactor shutdown; if the entry was cancelled that report
/// goes nowhere.
pub(crate) struct Completion {
    registry: Arc<Registry>,
    id: ExchangeId,
    slot: Arc<Slot>,
    #[cfg(feature = "tls")]
    tls: Option<Arc<TlsContext>>,
    finished: bool,
}

impl Completion {
    fn set_state(&self, state: ExchangeState) {
        tracing::debug!(exchange = %self.id, state = %state, "exchange state");
        self.slot.set_state(state);
    }

    /// Drain the TLS queue of the session's context, if there was one
    #[cfg(feature = "tls")]
    fn tls_errors(&self) -> String {
        match &self.tls {
            Some(context) => context.last_error_string(),
            None => NO_TLS_ERRORS.to_string(),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn tls_errors(&self) -> String {
        NO_TLS_ERRORS.to_string()
    }

    fn delivered(&self, delivered: Delivered) -> Outcome {
        let error = if (200..300).contains(&delivered.status_code) {
            String::new()
        } else {
            compose_error("", &self.tls_errors())
        };
        Outcome {
            http_version: delivered.http_version,
            status_code: delivered.status_code,
            status_phrase: delivered.status_phrase,
            headers: delivered.headers,
            body: delivered.body,
            error,
        }
    }

    fn failed(&self, error: &TransportError) -> Outcome {
        Outcome::failed(compose_error(&error.0, &self.tls_errors()))
    }

    fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        if outcome.is_delivered() {
            tracing::debug!(exchange = %self.id, status = outcome.status_code, "exchange completed");
        } else {
            tracing::debug!(exchange = %self.id, error = %outcome.error, "exchange failed");
        }
        self.registry.complete(self.id, outcome);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let outcome = Outcome::failed(compose_error(REACTOR_SHUT_DOWN, &self.tls_errors()));
        if self.registry.complete(self.id, outcome) {
            tracing::debug!(exchange = %self.id, "exchange dropped by reactor shutdown");
        }
    }
}

/// Everything needed to run one exchange on the reactor
pub(crate) struct Exchange {
    host: String,
    port: u16,
    wire: http::Request<Full<Bytes>>,
    transport: Transport,
    settings: Settings,
}

impl Exchange {
    pub(crate) fn new(
        host: String,
        port: u16,
        wire: http::Request<Full<Bytes>>,
        transport: Transport,
        settings: Settings,
    ) -> Self {
        Self {
            host,
            port,
            wire,
            transport,
            settings,
        }
    }

    /// Bind the exchange to its registry entry and produce the reactor task.
    ///
    /// The guard exists before the task is enqueued, so a task the reactor
    /// never polls still settles the entry.
    pub(crate) fn into_task(
        self,
        registry: Arc<Registry>,
        id: ExchangeId,
        slot: Arc<Slot>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let completion = Completion {
            registry,
            id,
            slot,
            #[cfg(feature = "tls")]
            tls: match &self.transport {
                Transport::Tls(session) => Some(session.context().clone()),
                Transport::Plain => None,
            },
            finished: false,
        };
        async move { self.run(completion).await }
    }

    async fn run(self, completion: Completion) {
        let result = match self.settings.exchange_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.perform(&completion)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::new(format!(
                    "exchange timed out after {:?}",
                    limit
                ))),
            },
            None => self.perform(&completion).await,
        };
        let outcome = match result {
            Ok(delivered) => completion.delivered(delivered),
            Err(e) => completion.failed(&e),
        };
        completion.finish(outcome);
    }

    async fn perform(self, completion: &Completion) -> Result<Delivered, TransportError> {
        completion.set_state(ExchangeState::Connecting);
        let stream = self.connect().await?;

        match self.transport {
            Transport::Plain => send(TokioIo::new(stream), self.wire, completion).await,
            #[cfg(feature = "tls")]
            Transport::Tls(session) => {
                completion.set_state(ExchangeState::Handshaking);
                let stream = session
                    .handshake(stream)
                    .await
                    .map_err(|e| TransportError::chain("tls handshake", &e))?;
                send(TokioIo::new(stream), self.wire, completion).await
            }
        }
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let target = (self.host.as_str(), self.port);
        let context = format!("connect to {}:{}", self.host, self.port);

        let stream = match self.settings.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(target))
                .await
                .map_err(|_| TransportError::new(format!("{}: timed out after {:?}", context, limit)))?,
            None => TcpStream::connect(target).await,
        }
        .map_err(|e| TransportError::chain(&context, &e))?;

        configure_socket(&stream, &self.settings)
            .map_err(|e| TransportError::chain("socket options", &e))?;
        Ok(stream)
    }
}

/// Apply TCP options to the connected socket
fn configure_socket(stream: &TcpStream, settings: &Settings) -> std::io::Result<()> {
    let socket = socket2::SockRef::from(stream);
    socket.set_nodelay(settings.tcp_nodelay)?;
    if let Some(idle) = settings.tcp_keepalive {
        socket.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(idle))?;
    }
    Ok(())
}

/// HTTP/1.1 exchange over an established stream.
///
/// The connection is driven in this same task, so cancelling the exchange
/// also closes the socket.
async fn send<T>(
    io: T,
    wire: http::Request<Full<Bytes>>,
    completion: &Completion,
) -> Result<Delivered, TransportError>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    completion.set_state(ExchangeState::Sending);
    let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io).await?;

    let exchange = async {
        completion.set_state(ExchangeState::AwaitingResponse);
        let response = sender.send_request(wire).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok::<_, TransportError>(delivered_from(parts, body))
    };
    tokio::pin!(exchange);
    tokio::pin!(conn);

    tokio::select! {
        result = &mut exchange => result,
        closed = &mut conn => match closed {
            // Closed cleanly; the response is already buffered
            Ok(()) => exchange.await,
            Err(e) => {
                tracing::warn!(error = %e, "connection ended with error");
                Err(TransportError::from(e))
            }
        },
    }
}

fn delivered_from(parts: http::response::Parts, body: Bytes) -> Delivered {
    let status_phrase = match parts.extensions.get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => parts.status.canonical_reason().unwrap_or("").to_string(),
    };

    let mut headers = BTreeMap::new();
    for (name, value) in &parts.headers {
        headers.insert(
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }

    Delivered {
        http_version: format!("{:?}", parts.version),
        status_code: i32::from(parts.status.as_u16()),
        status_phrase,
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_compose_error_placeholders() {
        assert_eq!(
            compose_error("", ""),
            "[Socket error: No socket errors]; [TLS error: No additional TLS errors]"
        );
        assert_eq!(
            compose_error("connection refused", "bad certificate"),
            "[Socket error: connection refused]; [TLS error: bad certificate]"
        );
    }

    #[test]
    fn test_transport_error_chain() {
        let inner = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");
        let outer = io::Error::new(io::ErrorKind::Other, inner);
        let error = TransportError::chain("read", &outer);
        assert!(error.to_string().starts_with("read: peer reset"));
    }

    #[test]
    fn test_delivered_from_parts() {
        let response = http::Response::builder()
            .status(404)
            .header("Content-Type", "text/plain")
            .header("x-dup", "1")
            .header("x-dup", "2")
            .body(())
            .unwrap();
        let (parts, _) = response.into_parts();
        let delivered = delivered_from(parts, Bytes::from_static(b"missing"));
        assert_eq!(delivered.status_code, 404);
        assert_eq!(delivered.status_phrase, "Not Found");
        assert_eq!(delivered.http_version, "HTTP/1.1");
        assert_eq!(delivered.headers.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(delivered.headers.get("x-dup").map(String::as_str), Some("2"));
        assert_eq!(&delivered.body[..], b"missing");
    }

    #[test]
    fn test_dropped_task_reports_shutdown() {
        let registry = Arc::new(Registry::new());
        let (id, slot) = registry.register();
        let wire = http::Request::builder()
            .uri("/")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let settings = Settings::from(&EngineConfig::default());
        let task = Exchange::new("127.0.0.1".to_string(), 1, wire, Transport::Plain, settings)
            .into_task(registry.clone(), id, slot.clone());
        drop(task);

        assert_eq!(slot.state(), ExchangeState::Failed);
        assert_eq!(registry.len(), 0);
    }
}
