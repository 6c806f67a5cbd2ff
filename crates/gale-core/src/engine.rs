//! Client engine
//!
//! Turns a [`Request`] into an exchange running on a reactor and hands back
//! a [`Response`] immediately. `send` never waits for the network.
//!
//! ## Modes
//! - Owning (`Engine::new`, `Engine::with_config`): the engine creates a
//!   reactor and a dedicated worker thread that drives it until `stop`
//! - Shared (`Engine::with_reactor`): the caller owns and drives the
//!   reactor; the engine only enqueues work on it

use crate::config::EngineConfig;
use crate::exchange::{Exchange, Settings, Transport};
use crate::reactor::{Reactor, ReactorHandle};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;
#[cfg(feature = "tls")]
use crate::tls::SessionFactory;
use crate::{Error, Result};
#[cfg(feature = "tls")]
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Background thread driving an owned reactor
struct Worker {
    thread: JoinHandle<()>,
}

impl Worker {
    /// The thread stays inside `drive` (parked in the reactor while idle)
    /// until `stop` requests an exit.
    fn spawn(reactor: Reactor, config: &EngineConfig) -> Result<Self> {
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                tracing::debug!("reactor worker started");
                reactor.drive();
                // Queued exchanges are settled as the runtime drops them
                drop(reactor);
                tracing::debug!("reactor worker stopped");
            })?;

        Ok(Self { thread })
    }
}

/// Asynchronous HTTP/HTTPS client engine
pub struct Engine {
    reactor: ReactorHandle,
    worker: Option<Worker>,
    registry: Arc<Registry>,
    #[cfg(feature = "tls")]
    tls: Mutex<Option<SessionFactory>>,
    config: EngineConfig,
}

impl Engine {
    /// Owning engine with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Owning engine: starts its own reactor and worker thread
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        #[cfg(feature = "tls")]
        let tls = match &config.tls {
            Some(options) => Some(SessionFactory::new(options.clone())?),
            None => None,
        };

        let reactor = Reactor::new()?;
        let handle = reactor.handle();
        let worker = Worker::spawn(reactor, &config)?;

        Ok(Self {
            reactor: handle,
            worker: Some(worker),
            registry: Arc::new(Registry::new()),
            #[cfg(feature = "tls")]
            tls: Mutex::new(tls),
            config,
        })
    }

    /// Shared engine on a caller-driven reactor
    pub fn with_reactor(reactor: ReactorHandle) -> Result<Self> {
        if reactor.is_closed() {
            return Err(Error::InvalidReactor);
        }
        Ok(Self {
            reactor,
            worker: None,
            registry: Arc::new(Registry::new()),
            #[cfg(feature = "tls")]
            tls: Mutex::new(None),
            config: EngineConfig::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a request.
    ///
    /// `https` requests use the engine's TLS context, or the process-wide
    /// one when the config names none. An `Err` means nothing was
    /// submitted; transport and protocol failures arrive on the Response.
    pub fn send(&self, request: &Request) -> Result<Response> {
        check_host(request)?;
        let transport = if request.is_secure() {
            self.secure_transport(request)?
        } else {
            Transport::Plain
        };
        self.submit(request, transport)
    }

    /// Submit a request, taking TLS sessions from `factory`
    #[cfg(feature = "tls")]
    pub fn send_with(&self, request: &Request, factory: &SessionFactory) -> Result<Response> {
        check_host(request)?;
        let transport = if request.is_secure() {
            Transport::Tls(factory.create_session(request.host())?)
        } else {
            Transport::Plain
        };
        self.submit(request, transport)
    }

    /// Exchanges submitted and not yet completed or cancelled
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Stop the worker and destroy the owned reactor.
    ///
    /// Exchanges still in flight complete as failures. A shared-mode engine
    /// has nothing to stop. Calling this twice is harmless.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.reactor.request_exit();
        if worker.thread.join().is_err() {
            tracing::error!("reactor worker panicked");
        }
    }

    #[cfg(feature = "tls")]
    fn secure_transport(&self, request: &Request) -> Result<Transport> {
        let factory = {
            let mut tls = self.tls.lock();
            match tls.as_ref() {
                Some(factory) => factory.clone(),
                None => {
                    let factory = SessionFactory::process_default()?;
                    *tls = Some(factory.clone());
                    factory
                }
            }
        };
        Ok(Transport::Tls(factory.create_session(request.host())?))
    }

    #[cfg(not(feature = "tls"))]
    fn secure_transport(&self, _request: &Request) -> Result<Transport> {
        Err(Error::TlsUnavailable)
    }

    fn submit(&self, request: &Request, transport: Transport) -> Result<Response> {
        let wire = request.to_wire()?;
        let (id, slot) = self.registry.register();
        tracing::debug!(
            exchange = %id,
            method = %request.method(),
            host = request.host(),
            port = request.port(),
            target = %wire.uri(),
            "submitting exchange"
        );

        let task = Exchange::new(
            request.host().to_string(),
            request.port(),
            wire,
            transport,
            Settings::from(&self.config),
        )
        .into_task(self.registry.clone(), id, slot.clone());

        // On failure the dropped task settles and removes the entry
        let abort = self.reactor.spawn(task)?;
        self.registry.attach(id, abort);

        Ok(Response::new(id, slot, self.registry.clone()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_host(request: &Request) -> Result<()> {
    if request.host().is_empty() {
        return Err(Error::InvalidHost(request.host().to_string()));
    }
    Ok(())
}
