//! Client side of one LSP connection
//!
//! A background reader task drains the transport and routes every inbound
//! message: responses go to the caller waiting on that id, notifications go
//! to the dispatcher, and server-initiated requests are answered from a fixed
//! table. Callers may issue requests concurrently; the pending map (together
//! with the lifecycle state) is the only state the reader and callers share.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::notification::{
    DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, Exit, Initialized,
    Notification, PublishDiagnostics,
};
use tower_lsp::lsp_types::request::{
    CodeActionRequest, Initialize, RegisterCapability, Request, Shutdown, UnregisterCapability,
    WorkDoneProgressCreate, WorkspaceConfiguration,
};
use tower_lsp::lsp_types::{
    CodeActionParams, CodeActionResponse, Diagnostic, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, InitializeParams, InitializeResult,
    InitializedParams, PublishDiagnosticsParams, Url,
};
use tracing::{debug, error, warn};

use crate::rpc::dispatcher::{NotificationDispatcher, NotificationWaiter};
use crate::rpc::error::SessionError;
use crate::rpc::message::{Message, RequestId, ResponseError};
use crate::rpc::transport::{MessageReader, MessageWriter};
use crate::store::DiagnosticStore;

/// Default deadline for a request, matching what editors tolerate before giving up
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Responder = oneshot::Sender<Result<Value, ResponseError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initializing,
    Initialized,
    ShuttingDown,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Initialized => "initialized",
            SessionState::ShuttingDown => "shutting down",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline applied to every request; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

struct PendingRequest {
    method: String,
    issued_at: Instant,
    responder: Responder,
}

struct Inner {
    state: SessionState,
    pending: HashMap<RequestId, PendingRequest>,
}

struct Shared {
    inner: Mutex<Inner>,
    writer: tokio::sync::Mutex<MessageWriter<BoxedWriter>>,
    dispatcher: NotificationDispatcher,
    diagnostics: DiagnosticStore,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, message: &Message) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        writer.send(&message.to_value()).await
    }

    /// Moves to `Closed` and fails every pending request and waiter.
    fn close(&self) {
        let pending = {
            let mut inner = self.lock();
            inner.state = SessionState::Closed;
            std::mem::take(&mut inner.pending)
        };
        if !pending.is_empty() {
            debug!("Cancelling {} pending requests", pending.len());
        }
        // Dropping the responders wakes each caller with `SessionClosed`.
        drop(pending);
        self.dispatcher.clear();
    }

    fn route(self: &Arc<Self>, message: Message) {
        match message {
            Message::Response { id, outcome } => self.complete(id, outcome),
            Message::Notification { method, params } => self.notify(&method, params),
            Message::Request { id, method, params } => {
                let outcome = answer_server_request(&method, &params);
                if outcome.is_err() {
                    debug!("Rejecting server request {}", method);
                }
                // Replies wait for the writer on their own task; the reader never blocks on it.
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = shared.send(&Message::response(id, outcome)).await {
                        warn!("Failed to answer server request {}: {}", method, e);
                    }
                });
            }
        }
    }

    fn complete(&self, id: Option<RequestId>, outcome: Result<Value, ResponseError>) {
        let Some(id) = id else {
            warn!("Ignoring response without an id: {:?}", outcome);
            return;
        };

        let Some(pending) = self.lock().pending.remove(&id) else {
            warn!("Ignoring response for unknown request id {}", id);
            return;
        };

        debug!(
            "Response to {} (id {}) after {:?}",
            pending.method,
            id,
            pending.issued_at.elapsed()
        );
        // The caller may have stopped waiting; that is not an error here.
        let _ = pending.responder.send(outcome);
    }

    fn notify(&self, method: &str, params: Value) {
        if method == PublishDiagnostics::METHOD {
            match serde_json::from_value::<PublishDiagnosticsParams>(params.clone()) {
                Ok(published) => self.diagnostics.update(published.uri, published.diagnostics),
                Err(e) => warn!("Malformed publishDiagnostics params: {}", e),
            }
        }
        self.dispatcher.dispatch(method, params);
    }
}

/// Answers requests the server sends to the client.
fn answer_server_request(method: &str, params: &Value) -> Result<Value, ResponseError> {
    const ACKNOWLEDGED: [&str; 3] = [
        RegisterCapability::METHOD,
        UnregisterCapability::METHOD,
        WorkDoneProgressCreate::METHOD,
    ];

    if ACKNOWLEDGED.contains(&method) {
        Ok(Value::Null)
    } else if method == WorkspaceConfiguration::METHOD {
        let items = params
            .get("items")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        Ok(Value::Array(vec![Value::Null; items]))
    } else {
        Err(ResponseError::method_not_found(method))
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: MessageReader<R>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.receive().await {
            Ok(Some(value)) => match Message::from_value(value) {
                Ok(message) => shared.route(message),
                Err(e) => warn!("Skipping unrecognised message: {}", e),
            },
            Ok(None) => {
                debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                error!("Closing session after transport failure: {}", e);
                break;
            }
        }
    }
    shared.close();
}

pub struct LspSession {
    shared: Arc<Shared>,
    next_id: AtomicI64,
    config: SessionConfig,
    reader: JoinHandle<()>,
}

impl LspSession {
    /// Starts a session over an established duplex stream.
    ///
    /// Must be called within a tokio runtime; the reader task is spawned here.
    pub fn new<R, W>(reader: R, writer: W, config: SessionConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: SessionState::Created,
                pending: HashMap::new(),
            }),
            writer: tokio::sync::Mutex::new(MessageWriter::new(Box::new(writer) as BoxedWriter)),
            dispatcher: NotificationDispatcher::new(),
            diagnostics: DiagnosticStore::new(),
        });

        let reader = tokio::spawn(read_loop(shared.clone(), MessageReader::new(reader)));

        Self {
            shared,
            next_id: AtomicI64::new(1),
            config,
            reader,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Latest diagnostics the server published for `uri`.
    pub fn diagnostics(&self, uri: &Url) -> Vec<Diagnostic> {
        self.shared.diagnostics.get(uri)
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Sends a request using the session's default deadline.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.request_with_timeout(method, params, self.config.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, SessionError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.begin_request(id.clone(), method, tx)?;

        debug!("Sending request {} (id {})", method, id);
        if let Err(e) = self
            .shared
            .send(&Message::request(id.clone(), method, params))
            .await
        {
            self.abandon_request(&id, method);
            return Err(e);
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!("Request {} (id {}) timed out after {:?}", method, id, limit);
                    self.abandon_request(&id, method);
                    return Err(SessionError::Timeout {
                        method: method.to_string(),
                        after: limit,
                    });
                }
            },
            None => rx.await,
        };

        let result = match outcome {
            Ok(response) => response.map_err(SessionError::from),
            Err(_) => Err(SessionError::SessionClosed),
        };
        if method == Initialize::METHOD {
            self.finish_initialize(result.is_ok());
        }
        result
    }

    /// Checks the lifecycle, applies the request's transition and records it as pending.
    fn begin_request(
        &self,
        id: RequestId,
        method: &str,
        responder: Responder,
    ) -> Result<(), SessionError> {
        let mut inner = self.shared.lock();
        let is_initialize = method == Initialize::METHOD;
        let state = inner.state;

        match state {
            SessionState::Closed => return Err(SessionError::SessionClosed),
            SessionState::Created if is_initialize => inner.state = SessionState::Initializing,
            SessionState::Initialized if method == Shutdown::METHOD => {
                inner.state = SessionState::ShuttingDown
            }
            SessionState::Initialized if !is_initialize => {}
            state => {
                return Err(SessionError::InvalidState {
                    method: method.to_string(),
                    state,
                });
            }
        }

        inner.pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                issued_at: Instant::now(),
                responder,
            },
        );
        Ok(())
    }

    fn abandon_request(&self, id: &RequestId, method: &str) {
        let mut inner = self.shared.lock();
        inner.pending.remove(id);
        if method == Initialize::METHOD && inner.state == SessionState::Initializing {
            inner.state = SessionState::Created;
        }
    }

    fn finish_initialize(&self, succeeded: bool) {
        let mut inner = self.shared.lock();
        if inner.state == SessionState::Initializing {
            inner.state = if succeeded {
                SessionState::Initialized
            } else {
                SessionState::Created
            };
        }
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Closed => return Err(SessionError::SessionClosed),
            _ if method == Exit::METHOD => {}
            SessionState::Initialized => {}
            state => {
                return Err(SessionError::InvalidState {
                    method: method.to_string(),
                    state,
                });
            }
        }

        debug!("Sending notification {}", method);
        self.shared
            .send(&Message::notification(method, params))
            .await
    }

    pub async fn send_request<R>(&self, params: R::Params) -> Result<R::Result, SessionError>
    where
        R: Request,
    {
        let value = self
            .request(R::METHOD, serde_json::to_value(params)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn send_notification<N>(&self, params: N::Params) -> Result<(), SessionError>
    where
        N: Notification,
    {
        self.notify(N::METHOD, serde_json::to_value(params)?).await
    }

    /// Runs the `initialize` handshake and sends `initialized` once it succeeds.
    pub async fn initialize(
        &self,
        params: InitializeParams,
    ) -> Result<InitializeResult, SessionError> {
        let result = self.send_request::<Initialize>(params).await?;
        self.send_notification::<Initialized>(InitializedParams {})
            .await?;
        Ok(result)
    }

    pub async fn notify_did_open(
        &self,
        params: DidOpenTextDocumentParams,
    ) -> Result<(), SessionError> {
        self.send_notification::<DidOpenTextDocument>(params).await
    }

    pub async fn notify_did_change(
        &self,
        params: DidChangeTextDocumentParams,
    ) -> Result<(), SessionError> {
        self.send_notification::<DidChangeTextDocument>(params)
            .await
    }

    pub async fn notify_did_close(
        &self,
        params: DidCloseTextDocumentParams,
    ) -> Result<(), SessionError> {
        self.send_notification::<DidCloseTextDocument>(params).await
    }

    pub async fn text_document_code_action(
        &self,
        params: CodeActionParams,
    ) -> Result<Option<CodeActionResponse>, SessionError> {
        self.send_request::<CodeActionRequest>(params).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send_request::<Shutdown>(()).await
    }

    /// Sends `exit` and closes the session. Valid from any state but `Closed`.
    pub async fn exit(&self) -> Result<(), SessionError> {
        let sent = self.send_notification::<Exit>(()).await;
        {
            let mut writer = self.shared.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!("Failed to shut down writer: {}", e);
            }
        }
        self.close();
        sent
    }

    /// Closes the session without notifying the server.
    pub fn close(&self) {
        self.shared.close();
        self.reader.abort();
    }

    /// Replaces the handler for `method`.
    pub fn set_notification_callback<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.shared.dispatcher.register(method, handler);
    }

    /// Registers a single-fire handler for `N`, replacing any existing handler.
    ///
    /// Register before triggering the notification, then await the waiter
    /// with a bounded wait.
    pub fn notification_waiter<N>(&self) -> NotificationWaiter<N::Params>
    where
        N: Notification,
        N::Params: DeserializeOwned + Send + 'static,
    {
        self.shared.dispatcher.waiter(N::METHOD)
    }
}

impl Drop for LspSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_server_request_acknowledges_registration() {
        assert_eq!(
            answer_server_request("client/registerCapability", &json!({ "registrations": [] })),
            Ok(Value::Null)
        );
        assert_eq!(
            answer_server_request("window/workDoneProgress/create", &json!({ "token": 1 })),
            Ok(Value::Null)
        );
    }

    #[test]
    fn answer_server_request_returns_null_per_configuration_item() {
        let params = json!({ "items": [{ "section": "a" }, { "section": "b" }] });
        assert_eq!(
            answer_server_request("workspace/configuration", &params),
            Ok(json!([null, null]))
        );
    }

    #[test]
    fn answer_server_request_rejects_unknown_methods() {
        let error = answer_server_request("workspace/applyEdit", &json!({})).unwrap_err();
        assert_eq!(error.code, crate::rpc::message::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn request_before_initialize_is_invalid_state() {
        let (client, _server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client);
        let session = LspSession::new(read, write, SessionConfig::default());

        let error = session.shutdown().await.unwrap_err();

        assert!(matches!(
            error,
            SessionError::InvalidState {
                state: SessionState::Created,
                ..
            }
        ));
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn notification_before_initialize_is_invalid_state() {
        let (client, _server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client);
        let session = LspSession::new(read, write, SessionConfig::default());

        let error = session
            .notify("textDocument/didOpen", json!({}))
            .await
            .unwrap_err();

        assert!(matches!(error, SessionError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn close_rejects_further_requests() {
        let (client, _server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client);
        let session = LspSession::new(read, write, SessionConfig::default());

        session.close();

        assert_eq!(session.state(), SessionState::Closed);
        let error = session
            .request("initialize", json!({ "capabilities": {} }))
            .await
            .unwrap_err();
        assert!(matches!(error, SessionError::SessionClosed));
    }
}
