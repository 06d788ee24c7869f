//! JSON-RPC client layer
//! - transport.rs: Content-Length framing over a byte stream
//! - message.rs: Request/response/notification classification
//! - dispatcher.rs: Notification handlers and single-fire waiters
//! - session.rs: Connection lifecycle and request correlation
//! - error.rs: Session error taxonomy

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;

pub use dispatcher::{NotificationDispatcher, NotificationWaiter};
pub use error::SessionError;
pub use message::{Message, RequestId, ResponseError};
pub use session::{LspSession, SessionConfig, SessionState};
pub use transport::{MessageReader, MessageWriter};
