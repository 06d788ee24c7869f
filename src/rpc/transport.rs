//! Content-Length framing
//!
//! Each message is `Content-Length: N\r\n` (other headers are ignored), a
//! blank line, then exactly N bytes of JSON. Upper layers only ever see whole
//! messages.

use std::io::ErrorKind;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::rpc::error::SessionError;

/// Frames larger than this are rejected rather than buffered
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Upper bound on one frame's header block, terminating blank line included
pub const MAX_HEADER_BYTES: u64 = 8 * 1024;

const CONTENT_LENGTH: &str = "content-length";

pub struct MessageReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: Vec::new(),
        }
    }

    /// Reads the next complete message.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between messages. A
    /// stream that ends inside a frame, a bad header or an invalid body is a
    /// `ProtocolFraming` error.
    pub async fn receive(&mut self) -> Result<Option<Value>, SessionError> {
        let Some(length) = self.read_headers().await? else {
            return Ok(None);
        };

        let mut body = vec![0; length];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => SessionError::framing(format!(
                    "stream ended before {} byte body was complete",
                    length
                )),
                _ => SessionError::Io(e),
            })?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| SessionError::framing(format!("body is not valid JSON: {}", e)))
    }

    async fn read_headers(&mut self) -> Result<Option<usize>, SessionError> {
        let mut content_length = None;
        let mut remaining = MAX_HEADER_BYTES;
        let mut first_line = true;

        loop {
            self.line.clear();
            let read = (&mut self.inner)
                .take(remaining)
                .read_until(b'\n', &mut self.line)
                .await?;
            remaining -= read as u64;

            if !self.line.ends_with(b"\n") {
                if remaining == 0 {
                    return Err(SessionError::framing(format!(
                        "header block exceeds the {} byte limit",
                        MAX_HEADER_BYTES
                    )));
                }
                if read == 0 && first_line {
                    return Ok(None);
                }
                return Err(SessionError::framing("stream ended inside a header block"));
            }
            first_line = false;

            let line = std::str::from_utf8(&self.line)
                .map_err(|_| SessionError::framing("header is not valid UTF-8"))?
                .trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| SessionError::framing(format!("malformed header {:?}", line)))?;

            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let length = value.trim().parse::<usize>().map_err(|_| {
                    SessionError::framing(format!("invalid Content-Length {:?}", value.trim()))
                })?;
                if length > MAX_FRAME_BYTES {
                    return Err(SessionError::framing(format!(
                        "frame of {} bytes exceeds the {} byte limit",
                        length, MAX_FRAME_BYTES
                    )));
                }
                content_length = Some(length);
            }
        }

        content_length
            .map(Some)
            .ok_or_else(|| SessionError::framing("missing Content-Length header"))
    }
}

pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    pub async fn send(&mut self, message: &Value) -> Result<(), SessionError> {
        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(&body).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[tokio::test]
    async fn receive_reads_consecutive_frames() {
        let mut bytes = frame(r#"{"jsonrpc":"2.0","method":"a"}"#);
        bytes.extend(frame(r#"{"jsonrpc":"2.0","id":1,"result":null}"#));
        let mut reader = MessageReader::new(bytes.as_slice());

        assert_eq!(
            reader.receive().await.unwrap(),
            Some(json!({ "jsonrpc": "2.0", "method": "a" }))
        );
        assert_eq!(
            reader.receive().await.unwrap(),
            Some(json!({ "jsonrpc": "2.0", "id": 1, "result": null }))
        );
        assert_eq!(reader.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn receive_ignores_other_headers_and_header_case() {
        let body = r#"{"x":1}"#;
        let bytes = format!(
            "content-length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut reader = MessageReader::new(bytes.as_bytes());

        assert_eq!(reader.receive().await.unwrap(), Some(json!({ "x": 1 })));
    }

    #[tokio::test]
    async fn receive_counts_bytes_not_chars() {
        let body = r#"{"text":"héllo"}"#;
        let bytes = frame(body);
        let mut reader = MessageReader::new(bytes.as_slice());

        assert_eq!(
            reader.receive().await.unwrap(),
            Some(json!({ "text": "héllo" }))
        );
    }

    #[tokio::test]
    async fn receive_returns_none_on_empty_stream() {
        let mut reader = MessageReader::new(&b""[..]);
        assert_eq!(reader.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn receive_rejects_truncated_body() {
        let mut reader = MessageReader::new(&b"Content-Length: 20\r\n\r\n{\"a\":"[..]);
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_stream_ending_in_headers() {
        let mut reader = MessageReader::new(&b"Content-Length: 20\r\n"[..]);
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_non_numeric_length() {
        let mut reader = MessageReader::new(&b"Content-Length: ten\r\n\r\n{}"[..]);
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_missing_length() {
        let mut reader = MessageReader::new(&b"Content-Type: text/plain\r\n\r\n{}"[..]);
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_oversized_frame() {
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut reader = MessageReader::new(header.as_bytes());
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_non_utf8_header() {
        let mut reader = MessageReader::new(&b"Content-Length: 2\xff\xfe\r\n\r\n{}"[..]);
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_unbounded_header_line() {
        let mut bytes = b"X-Pad: ".to_vec();
        bytes.resize(MAX_HEADER_BYTES as usize * 4, b'a');
        bytes.extend(b"\r\n");
        bytes.extend(frame("{}"));
        let mut reader = MessageReader::new(bytes.as_slice());

        let error = reader.receive().await.unwrap_err();

        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_rejects_oversized_header_block() {
        let mut bytes = Vec::new();
        while bytes.len() <= MAX_HEADER_BYTES as usize {
            bytes.extend(b"X-Pad: aaaaaaaaaaaaaaaa\r\n");
        }
        bytes.extend(frame("{}"));
        let mut reader = MessageReader::new(bytes.as_slice());

        let error = reader.receive().await.unwrap_err();

        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn receive_accepts_headers_just_under_limit() {
        let body = "{}";
        let fixed = format!("Content-Length: {}\r\nX-Pad: \r\n\r\n", body.len()).len();
        let padding = "a".repeat(MAX_HEADER_BYTES as usize - fixed);
        let bytes = format!(
            "Content-Length: {}\r\nX-Pad: {}\r\n\r\n{}",
            body.len(),
            padding,
            body
        );
        let mut reader = MessageReader::new(bytes.as_bytes());

        assert_eq!(reader.receive().await.unwrap(), Some(json!({})));
    }

    #[tokio::test]
    async fn receive_rejects_invalid_json_body() {
        let bytes = frame("{not json");
        let mut reader = MessageReader::new(bytes.as_slice());
        let error = reader.receive().await.unwrap_err();
        assert!(matches!(error, SessionError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn send_writes_length_prefixed_frame() {
        let mut buffer = Vec::new();
        let mut writer = MessageWriter::new(&mut buffer);

        writer.send(&json!({ "jsonrpc": "2.0", "method": "exit" })).await.unwrap();

        let body = r#"{"jsonrpc":"2.0","method":"exit"}"#;
        assert_eq!(buffer, frame(body));
    }
}
