//! Routes server-to-client notifications to registered handlers
//!
//! One handler per method; registering again replaces the previous handler.
//! Handlers run on the session's reader task, so they must not block.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::rpc::error::SessionError;

pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
pub struct NotificationDispatcher {
    handlers: RwLock<HashMap<String, NotificationHandler>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `method`, returning true if it replaced an earlier one.
    pub fn register<F>(&self, method: impl Into<String>, handler: F) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.into(), Arc::new(handler))
            .is_some()
    }

    /// Drops every handler. Pending waiters resolve with `SessionClosed`.
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Invokes the handler for `method`. Returns false if none is registered.
    pub fn dispatch(&self, method: &str, params: Value) -> bool {
        // Clone the handler out so it runs without holding the lock; a handler
        // may register a replacement for itself.
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned();

        match handler {
            Some(handler) => {
                handler(params);
                true
            }
            None => {
                debug!("Dropping notification {} with no handler", method);
                false
            }
        }
    }

    /// Registers a single-fire handler for `method` and returns a waiter for its params.
    pub fn waiter<P>(&self, method: &str) -> NotificationWaiter<P>
    where
        P: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let method_name = method.to_string();

        self.register(method, move |params| {
            let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() else {
                return;
            };
            match serde_json::from_value::<P>(params) {
                Ok(params) => {
                    let _ = tx.send(params);
                }
                Err(e) => warn!("Failed to decode {} params: {}", method_name, e),
            }
        });

        NotificationWaiter {
            method: method.to_string(),
            rx,
            _params: PhantomData,
        }
    }
}

/// Resolves once with the params of the first matching notification.
pub struct NotificationWaiter<P> {
    method: String,
    rx: oneshot::Receiver<P>,
    _params: PhantomData<fn() -> P>,
}

impl<P> NotificationWaiter<P> {
    pub async fn wait(self, limit: Duration) -> Result<P, SessionError> {
        match tokio::time::timeout(limit, self.rx).await {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(SessionError::SessionClosed),
            Err(_) => Err(SessionError::Timeout {
                method: self.method,
                after: limit,
            }),
        }
    }
}
