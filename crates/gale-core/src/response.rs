//! HTTP Response handle
//!
//! A [`Response`] is returned by `Engine::send` before any network I/O has
//! happened. The reactor thread fills it in exactly once; until then every
//! accessor reports the "not yet received" value (status `-1`, empty
//! strings, empty body).

use crate::registry::{ExchangeId, Registry};
use crate::signal::Signal;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Status code reported before a response has been received
pub const STATUS_PENDING: i32 = -1;

/// Lifecycle of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExchangeState {
    /// Accepted by the engine, not yet picked up by the reactor
    Submitted = 0,
    /// TCP connect in progress
    Connecting = 1,
    /// TLS handshake in progress
    Handshaking = 2,
    /// HTTP/1.1 connection setup and request write
    Sending = 3,
    /// Waiting for the response head and body
    AwaitingResponse = 4,
    /// A response was received (whatever its status)
    Completed = 5,
    /// The exchange ended without a response
    Failed = 6,
}

impl ExchangeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExchangeState::Submitted,
            1 => ExchangeState::Connecting,
            2 => ExchangeState::Handshaking,
            3 => ExchangeState::Sending,
            4 => ExchangeState::AwaitingResponse,
            5 => ExchangeState::Completed,
            _ => ExchangeState::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeState::Submitted => "submitted",
            ExchangeState::Connecting => "connecting",
            ExchangeState::Handshaking => "tls-handshaking",
            ExchangeState::Sending => "sending",
            ExchangeState::AwaitingResponse => "awaiting-response",
            ExchangeState::Completed => "completed",
            ExchangeState::Failed => "failed",
        }
    }

    /// Completed or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Failed)
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the completion step writes, published in one piece
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub(crate) http_version: String,
    pub(crate) status_code: i32,
    pub(crate) status_phrase: String,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) body: Bytes,
    pub(crate) error: String,
}

impl Outcome {
    /// No response was delivered
    pub(crate) fn failed(error: String) -> Self {
        Self {
            error,
            ..PENDING.clone()
        }
    }

    pub(crate) fn is_delivered(&self) -> bool {
        self.status_code != STATUS_PENDING
    }
}

static PENDING: Outcome = Outcome {
    http_version: String::new(),
    status_code: STATUS_PENDING,
    status_phrase: String::new(),
    headers: BTreeMap::new(),
    body: Bytes::new(),
    error: String::new(),
};

/// State shared by the reactor-side exchange and the caller's Response
pub(crate) struct Slot {
    state: AtomicU8,
    done: Signal<Outcome>,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ExchangeState::Submitted as u8),
            done: Signal::new(),
        }
    }

    pub(crate) fn state(&self) -> ExchangeState {
        ExchangeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ExchangeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Publish the outcome; `false` if one was already published
    pub(crate) fn finish(&self, outcome: Outcome) -> bool {
        let terminal = if outcome.is_delivered() {
            ExchangeState::Completed
        } else {
            ExchangeState::Failed
        };
        if self.done.get().is_some() {
            return false;
        }
        self.set_state(terminal);
        self.done.fulfill(outcome).is_ok()
    }

    fn outcome(&self) -> &Outcome {
        self.done.get().unwrap_or(&PENDING)
    }
}

/// Caller-owned handle on one in-flight or finished exchange.
///
/// Dropping a Response whose exchange is still running cancels it.
pub struct Response {
    id: ExchangeId,
    slot: Arc<Slot>,
    registry: Arc<Registry>,
}

impl Response {
    pub(crate) fn new(id: ExchangeId, slot: Arc<Slot>, registry: Arc<Registry>) -> Self {
        Self { id, slot, registry }
    }

    /// Identifier of the underlying exchange
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Current position in the exchange lifecycle
    pub fn state(&self) -> ExchangeState {
        self.slot.state()
    }

    /// Non-blocking completion check
    pub fn is_done(&self) -> bool {
        self.slot.done.get().is_some()
    }

    /// Block until the exchange has completed or failed
    pub fn wait(&self) {
        self.slot.done.wait();
    }

    /// Block for at most `timeout`; returns whether the exchange finished
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.slot.done.wait_timeout(timeout).is_some()
    }

    /// Numeric status, `-1` until a response has been received
    pub fn status_code(&self) -> i32 {
        self.slot.outcome().status_code
    }

    pub fn status_phrase(&self) -> &str {
        &self.slot.outcome().status_phrase
    }

    /// e.g. `HTTP/1.1`
    pub fn http_version(&self) -> &str {
        &self.slot.outcome().http_version
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.slot.outcome().headers
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        let headers = self.headers();
        if let Some(value) = headers.get(name) {
            return Some(value);
        }
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.slot.outcome().body
    }

    /// Get body as string (if UTF-8)
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.body()).ok()
    }

    /// Status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }

    /// Diagnostic text, empty unless the exchange failed or got a non-2xx status
    pub fn error(&self) -> &str {
        &self.slot.outcome().error
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.slot.outcome();
        write!(
            f,
            "{} {} {}\r\n",
            outcome.http_version, outcome.status_code, outcome.status_phrase
        )?;
        for (name, value) in &outcome.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        write!(f, "\r\n{}", String::from_utf8_lossy(&outcome.body))
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("status_code", &self.status_code())
            .finish()
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.registry.cancel(self.id);
    }
}
