/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Error taxonomy of the messaging layer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::MessageId;

/// Errors produced while processing or routing messages.
#[derive(Debug)]
pub enum MessagingError {
    /// No resolver owns the message.
    HandlerNotFound {
        /// Type name of the unresolved message.
        message_type: String,
    },

    /// The resolved handler failed or panicked.
    Processing {
        /// Type name of the processed message.
        message_type: String,
        /// Name of the failing handler registration.
        handler: String,
        /// Correlation id of the message, when it had one.
        correlation_id: Option<MessageId>,
        /// The handler's error.
        source: anyhow::Error,
    },

    /// Every router in the chain declined the message.
    NoRouteFound {
        /// Id of the unroutable message.
        message_id: MessageId,
    },

    /// The correlated reply did not arrive in time.
    RouteTimeout {
        /// Id of the request.
        message_id: MessageId,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// A transport failed.
    Transport(TransportError),

    /// The operation was cancelled.
    Cancelled,

    /// An envelope could not be unwrapped.
    Envelope(EnvelopeError),

    /// A reply did not have the expected response type.
    UnexpectedResponse {
        /// The expected response type.
        expected: &'static str,
        /// The received type, or `None` when the handler replied with nothing.
        actual: Option<String>,
    },

    /// The remote side reported a failure.
    Remote(RemoteFault),
}

impl MessagingError {
    /// Stable error code, used when the error travels back to a remote caller.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::HandlerNotFound { .. } => "HANDLER_NOT_FOUND",
            Self::Processing { .. } => "PROCESSING_ERROR",
            Self::NoRouteFound { .. } => "NO_ROUTE_FOUND",
            Self::RouteTimeout { .. } => "ROUTE_TIMEOUT",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Envelope(_) => "MISSING_CONTENT",
            Self::UnexpectedResponse { .. } => "UNEXPECTED_RESPONSE",
            Self::Remote(_) => "REMOTE_ERROR",
        }
    }
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandlerNotFound { message_type } => {
                write!(f, "No handler found for message type {message_type}")
            }
            Self::Processing {
                message_type,
                handler,
                correlation_id,
                source,
            } => {
                write!(f, "Handler {handler} failed to process {message_type}")?;
                if let Some(id) = correlation_id {
                    write!(f, " (message {id})")?;
                }
                write!(f, ": {source}")
            }
            Self::NoRouteFound { message_id } => write!(f, "No route found for message {message_id}"),
            Self::RouteTimeout {
                message_id,
                timeout,
            } => write!(
                f,
                "No reply to message {message_id} within {}ms",
                timeout.as_millis()
            ),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Envelope(e) => write!(f, "Envelope error: {e}"),
            Self::UnexpectedResponse { expected, actual } => match actual {
                Some(actual) => write!(f, "Expected a {expected} reply, received {actual}"),
                None => write!(f, "Expected a {expected} reply, received none"),
            },
            Self::Remote(fault) => write!(f, "Remote error: {fault}"),
        }
    }
}

impl std::error::Error for MessagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Processing { source, .. } => Some(&**source),
            Self::Transport(e) => Some(e),
            Self::Envelope(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for MessagingError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<EnvelopeError> for MessagingError {
    fn from(err: EnvelopeError) -> Self {
        Self::Envelope(err)
    }
}

/// Error types for transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Content type not registered in the [`MessageTypeRegistry`](crate::common::MessageTypeRegistry).
    UnknownMessageType(String),

    /// Serialization or deserialization failure.
    SerializationError(String),

    /// Connection was closed unexpectedly.
    ConnectionClosed,

    /// Connecting to a peer or server failed.
    ConnectionFailed(String),

    /// No known peer serves the recipient.
    PeerNotFound(String),

    /// Protocol error (invalid frame, unsupported version, etc.).
    ProtocolError(String),

    /// Socket or I/O error.
    IoError(String),

    /// Connection or send timeout exceeded.
    Timeout,

    /// The router was used before it was initialized.
    NotInitialized(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMessageType(t) => write!(f, "Unknown message type: {t}"),
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::ConnectionFailed(e) => write!(f, "Connection failed: {e}"),
            Self::PeerNotFound(p) => write!(f, "Peer not found: {p}"),
            Self::ProtocolError(e) => write!(f, "Protocol error: {e}"),
            Self::IoError(e) => write!(f, "I/O error: {e}"),
            Self::Timeout => write!(f, "Transport timeout"),
            Self::NotInitialized(r) => write!(f, "Router {r} is not initialized"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors raised when unwrapping an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The envelope carries no content.
    MissingContent,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingContent => write!(f, "Envelope has no content"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// A failure reported by a remote handler, carried in a reply envelope.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteFault {
    /// Error code (see [`MessagingError::code`]).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl RemoteFault {
    /// Creates a fault.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&MessagingError> for RemoteFault {
    fn from(err: &MessagingError) -> Self {
        match err {
            // a remote fault passes through unchanged
            MessagingError::Remote(fault) => fault.clone(),
            other => Self::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_processing_error_keeps_source() {
        let err = MessagingError::Processing {
            message_type: "OrderPlaced".to_string(),
            handler: "audit".to_string(),
            correlation_id: Some(MessageId::from("msg_1")),
            source: anyhow::anyhow!("disk full"),
        };

        assert_eq!(
            err.to_string(),
            "Handler audit failed to process OrderPlaced (message msg_1): disk full"
        );
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("disk full"));
        assert_eq!(err.code(), "PROCESSING_ERROR");
    }

    #[test]
    fn test_fault_from_error_uses_code() {
        let err = MessagingError::HandlerNotFound {
            message_type: "GetPrice".to_string(),
        };
        let fault = RemoteFault::from(&err);

        assert_eq!(fault.code, "HANDLER_NOT_FOUND");
        assert!(fault.message.contains("GetPrice"));
    }

    #[test]
    fn test_transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: MessagingError = TransportError::from(io).into();

        assert!(matches!(err, MessagingError::Transport(TransportError::IoError(_))));
        assert_eq!(err.code(), "TRANSPORT_ERROR");
    }
}
