//! Reactor: the event loop exchanges run on
//!
//! A single-threaded tokio runtime with I/O and time drivers enabled. Work
//! is enqueued from any thread through a [`ReactorHandle`] and only makes
//! progress while some thread is inside [`Reactor::drive`].
//!
//! ## Lifecycle
//!
//! - `drive` blocks until an exit is requested
//! - `request_exit` makes the current and every later `drive` return
//! - dropping the `Reactor` shuts the runtime down; queued tasks are
//!   dropped and later enqueues fail with [`Error::ReactorClosed`]

use crate::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Notify;
use tokio::task::AbortHandle;

struct Shared {
    handle: Handle,
    exit: Notify,
    exiting: AtomicBool,
    closed: AtomicBool,
}

/// Owner of the event loop
pub struct Reactor {
    runtime: Option<Runtime>,
    shared: Arc<Shared>,
}

impl Reactor {
    /// Create a reactor with its own single-threaded runtime
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let shared = Arc::new(Shared {
            handle: runtime.handle().clone(),
            exit: Notify::new(),
            exiting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        Ok(Self {
            runtime: Some(runtime),
            shared,
        })
    }

    /// Cloneable enqueue handle
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run enqueued work on the calling thread until an exit is requested.
    ///
    /// Only one thread may drive a given reactor.
    pub fn drive(&self) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let shared = &self.shared;
        runtime.block_on(async {
            let notified = shared.exit.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent request_exit
            // cannot slip between the check and the await
            notified.as_mut().enable();
            if shared.exiting.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        });
    }

    /// Make the current and all future `drive` calls return
    pub fn request_exit(&self) {
        self.shared.request_exit();
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.request_exit();
        if let Some(runtime) = self.runtime.take() {
            tracing::debug!("reactor shutting down");
            runtime.shutdown_background();
        }
    }
}

impl Shared {
    fn request_exit(&self) {
        self.exiting.store(true, Ordering::Release);
        self.exit.notify_waiters();
    }
}

/// Thread-safe handle for enqueueing work on a [`Reactor`]
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<Shared>,
}

impl ReactorHandle {
    /// Whether the owning reactor has been destroyed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Make the reactor's current and all future `drive` calls return
    pub fn request_exit(&self) {
        self.shared.request_exit();
    }

    /// Enqueue a task. It runs the next time the reactor is driven.
    pub(crate) fn spawn<F>(&self, future: F) -> Result<AbortHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::ReactorClosed);
        }
        Ok(self.shared.handle.spawn(future).abort_handle())
    }
}

impl std::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
