//! Classification of operation failures.

use super::ClientError;
use crate::jsonrpc::METHOD_NOT_FOUND;

/// How a failed operation should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The server does not implement the method.
    Unsupported,
    /// The server forgot our session; reconnecting may help.
    SessionExpired,
    Other,
}

/// Decides whether an error means "unsupported" or "session gone".
pub trait SessionErrorClassifier: Send + Sync {
    fn classify(&self, error: &ClientError) -> ErrorClass;
}

const UNSUPPORTED_PHRASES: &[&str] = &["method not found", "not supported", "not implemented"];

const SESSION_PHRASES: &[&str] = &[
    "session not found",
    "session expired",
    "session invalid",
    "invalid session",
    "session terminated",
    "no valid session",
];

/// Matches error codes and well-known message phrasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseClassifier;

impl SessionErrorClassifier for PhraseClassifier {
    fn classify(&self, error: &ClientError) -> ErrorClass {
        match error {
            ClientError::Rpc { code, .. } if *code == METHOD_NOT_FOUND => {
                return ErrorClass::Unsupported;
            }
            ClientError::Rpc { .. } | ClientError::Transport(_) | ClientError::Protocol(_) => {}
            ClientError::ConnectFailed { .. } | ClientError::Timeout(_) | ClientError::Stopped(_) => {
                return ErrorClass::Other;
            }
        }

        let message = error.to_string().to_lowercase();
        if SESSION_PHRASES.iter().any(|p| message.contains(p)) {
            return ErrorClass::SessionExpired;
        }

        let bad_status = message.contains("http 400") || message.contains("http 404");
        let posting = message.contains("posting") || message.contains("endpoint");
        if bad_status && posting {
            return ErrorClass::SessionExpired;
        }

        if UNSUPPORTED_PHRASES.iter().any(|p| message.contains(p)) {
            return ErrorClass::Unsupported;
        }
        ErrorClass::Other
    }
}
