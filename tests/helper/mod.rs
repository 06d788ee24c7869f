//! Shared fixtures for the e2e suites

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::mpsc;
use tower_lsp::jsonrpc::Request;
use tower_lsp::lsp_types::*;
use tower_lsp::{ClientSocket, LspService, Server};

use pycodestyle_lsp::config::Settings;
use pycodestyle_lsp::linter::{LintError, Linter};
use pycodestyle_lsp::lsp::backend::Backend;
use pycodestyle_lsp::lsp::documents::Document;
use pycodestyle_lsp::lsp::rules::RuleTable;
use pycodestyle_lsp::rpc::{LspSession, SessionConfig};

pub const TIMEOUT: Duration = Duration::from_secs(10);
pub const TEST_FILE_URI: &str = "file:///test/sample1/sample.py";

/// Linter stub that reports the same diagnostics for every document
pub struct StaticLinter {
    diagnostics: Vec<Diagnostic>,
}

impl StaticLinter {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }
}

#[async_trait::async_trait]
impl Linter for StaticLinter {
    async fn lint(
        &self,
        _document: &Document,
        _settings: &Settings,
    ) -> Result<Vec<Diagnostic>, LintError> {
        Ok(self.diagnostics.clone())
    }
}

/// Linter stub that returns queued responses in order, then nothing
pub struct ScriptedLinter {
    responses: Mutex<Vec<Vec<Diagnostic>>>,
}

impl ScriptedLinter {
    pub fn new(mut responses: Vec<Vec<Diagnostic>>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait::async_trait]
impl Linter for ScriptedLinter {
    async fn lint(
        &self,
        _document: &Document,
        _settings: &Settings,
    ) -> Result<Vec<Diagnostic>, LintError> {
        Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
    }
}

pub fn uri() -> Url {
    Url::parse(TEST_FILE_URI).unwrap()
}

pub fn range(start: (u32, u32), end: (u32, u32)) -> Range {
    Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1))
}

/// The whole-first-line range used by code action requests
pub fn line_range() -> Range {
    range((0, 0), (1, 0))
}

pub fn diagnostic(code: &str, range: Range, message: &str) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::ERROR),
        code: Some(NumberOrString::String(code.to_string())),
        source: Some("pycodestyle".to_string()),
        message: message.to_string(),
        ..Default::default()
    }
}

pub fn did_open_params(text: &str) -> DidOpenTextDocumentParams {
    DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: uri(),
            language_id: "python".to_string(),
            version: 1,
            text: text.to_string(),
        },
    }
}

pub fn code_action_params(range: Range, diagnostics: Vec<Diagnostic>) -> CodeActionParams {
    CodeActionParams {
        text_document: TextDocumentIdentifier::new(uri()),
        range,
        context: CodeActionContext {
            diagnostics,
            ..Default::default()
        },
        work_done_progress_params: Default::default(),
        partial_result_params: Default::default(),
    }
}

/// Runs a server backed by `linter` in-process and returns a session connected to it.
pub fn spawn_server(linter: Arc<dyn Linter>) -> LspSession {
    spawn_server_with(linter, SessionConfig::default())
}

pub fn spawn_server_with(linter: Arc<dyn Linter>, config: SessionConfig) -> LspSession {
    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);

    let (service, socket) = LspService::new(move |client| {
        Backend::build(
            client,
            linter,
            Arc::new(RuleTable::pycodestyle()),
            Settings::default(),
        )
    });
    let (server_read, server_write) = tokio::io::split(server_stream);
    tokio::spawn(Server::new(server_read, server_write, socket).serve(service));

    connect(client_stream, config)
}

/// Connects a session to one end of a duplex pipe.
pub fn connect(stream: DuplexStream, config: SessionConfig) -> LspSession {
    let (read, write) = tokio::io::split(stream);
    LspSession::new(read, write, config)
}

/// Starts a session against a hand-driven peer and returns the peer's end.
pub fn raw_peer(config: SessionConfig) -> (LspSession, DuplexStream) {
    let (client_stream, peer) = tokio::io::duplex(64 * 1024);
    (connect(client_stream, config), peer)
}

/// Opens `text` and waits for the diagnostics published for it.
pub async fn open_and_wait(session: &LspSession, text: &str) -> PublishDiagnosticsParams {
    let waiter = session.notification_waiter::<notification::PublishDiagnostics>();
    session.notify_did_open(did_open_params(text)).await.unwrap();
    waiter
        .wait(TIMEOUT)
        .await
        .expect("Expected publishDiagnostics notification")
}

pub fn frame(body: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(body).unwrap();
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend(body);
    framed
}

/// Reads one framed message from the peer side of a duplex pipe.
pub async fn read_frame<R>(reader: &mut R) -> Value
where
    R: AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut header = Vec::new();
    while !header.ends_with(b"\r\n\r\n") {
        header.push(reader.read_u8().await.unwrap());
    }
    let header = String::from_utf8(header).unwrap();
    let length: usize = header
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn write_frame<W>(writer: &mut W, body: &Value)
where
    W: AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    writer.write_all(&frame(body)).await.unwrap();
    writer.flush().await.unwrap();
}

/// Answers the session's `initialize` request from a raw peer.
pub async fn accept_initialize<S>(peer: &mut S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_frame(peer).await;
    assert_eq!(request["method"], "initialize");
    write_frame(
        peer,
        &json!({ "jsonrpc": "2.0", "id": request["id"], "result": { "capabilities": {} } }),
    )
    .await;
    let initialized = read_frame(peer).await;
    assert_eq!(initialized["method"], "initialized");
}

pub fn create_initialize_request(id: i64) -> Request {
    Request::build("initialize")
        .id(id)
        .params(json!({ "capabilities": {} }))
        .finish()
}

pub fn create_initialized_notification() -> Request {
    Request::build("initialized").params(json!({})).finish()
}

pub fn create_did_open_notification(uri: &str, text: &str) -> Request {
    Request::build("textDocument/didOpen")
        .params(json!({
            "textDocument": {
                "uri": uri,
                "languageId": "python",
                "version": 1,
                "text": text
            }
        }))
        .finish()
}

pub fn create_did_close_notification(uri: &str) -> Request {
    Request::build("textDocument/didClose")
        .params(json!({ "textDocument": { "uri": uri } }))
        .finish()
}

pub fn create_code_action_request(id: i64, uri: &str, range: Range, diagnostics: Value) -> Request {
    Request::build("textDocument/codeAction")
        .id(id)
        .params(json!({
            "textDocument": { "uri": uri },
            "range": range,
            "context": { "diagnostics": diagnostics }
        }))
        .finish()
}

/// Forwards every server-to-client message from the socket into a channel.
pub fn spawn_notification_collector(socket: ClientSocket) -> mpsc::UnboundedReceiver<Request> {
    use futures::StreamExt;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut socket = socket;
        while let Some(message) = socket.next().await {
            if tx.send(message).is_err() {
                break;
            }
        }
    });
    rx
}

pub async fn wait_for_notification(
    rx: &mut mpsc::UnboundedReceiver<Request>,
    method: &str,
) -> Option<Request> {
    tokio::time::timeout(TIMEOUT, async {
        while let Some(message) = rx.recv().await {
            if message.method() == method {
                return Some(message);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
