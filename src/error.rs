//! Error types for mailpace.

use thiserror::Error;

/// SMTP response codes providers use to signal throttling or temporary refusal.
///
/// 421 service unavailable, 450/451/452 mailbox busy / local error / storage,
/// 454 temporary auth failure (SES throttles here), 554 SES "Throttling failure".
///
/// 554 is also SES's generic "Message rejected" reply, so it only counts as
/// throttling when the reply text mentions throttling.
pub const THROTTLE_RESPONSE_CODES: [u16; 6] = [421, 450, 451, 452, 454, 554];

/// What went wrong at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Peer reset the connection mid-conversation.
    ConnectionReset,
    /// Connect or command timed out.
    Timeout,
    /// Could not open or keep a connection (DNS, refused, TLS handshake).
    Connection,
    /// Sender or recipient rejected while building the SMTP envelope.
    Envelope,
    /// Server answered with an error response code.
    Response,
    /// Anything else.
    Other,
}

/// Errors that can occur when sending emails.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Configuration error (missing env var, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing required field (e.g., from address).
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Error building the email message.
    #[error("Build error: {0}")]
    BuildError(String),

    /// Error sending the email.
    #[error("Send error: {0}")]
    SendError(String),

    /// Transport failure carrying what is needed to classify it.
    #[error("Transport error: {message}")]
    Transport {
        failure: TransportFailure,
        /// SMTP reply code, when the server answered.
        response_code: Option<u16>,
        message: String,
    },

    /// The recipient status store rejected an update.
    #[error("Status store error: {0}")]
    Status(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MailError {
    /// Create a transport error.
    pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            failure,
            response_code: None,
            message: message.into(),
        }
    }

    /// Create a transport error for an SMTP error reply.
    pub fn smtp_response(code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            failure: TransportFailure::Response,
            response_code: Some(code),
            message: message.into(),
        }
    }

    /// SMTP response code, if the failure came from a server reply.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            Self::Transport { response_code, .. } => *response_code,
            _ => None,
        }
    }

    /// Whether this failure looks like provider throttling or a transient
    /// network condition rather than a problem with the message itself.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Transport {
                failure,
                response_code,
                message,
            } => match failure {
                TransportFailure::ConnectionReset
                | TransportFailure::Timeout
                | TransportFailure::Connection
                | TransportFailure::Envelope => true,
                TransportFailure::Response | TransportFailure::Other => match *response_code {
                    Some(554) => message.to_lowercase().contains("throttl"),
                    Some(code) => THROTTLE_RESPONSE_CODES.contains(&code),
                    None => false,
                },
            },
            _ => false,
        }
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::BuildError(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        let response_code = err
            .status()
            .and_then(|code| code.to_string().parse::<u16>().ok());

        let failure = if err.is_timeout() {
            TransportFailure::Timeout
        } else if response_code.is_some() {
            TransportFailure::Response
        } else if err.is_client() {
            TransportFailure::Envelope
        } else {
            match io_error_kind(&err) {
                Some(std::io::ErrorKind::ConnectionReset) => TransportFailure::ConnectionReset,
                Some(std::io::ErrorKind::TimedOut) => TransportFailure::Timeout,
                Some(_) => TransportFailure::Connection,
                None if err.is_tls() => TransportFailure::Connection,
                None => TransportFailure::Other,
            }
        };

        Self::Transport {
            failure,
            response_code,
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

/// Find the first `io::Error` in an error's source chain.
#[cfg(feature = "smtp")]
fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut current = err.source();
    while let Some(source) = current {
        if let Some(io) = source.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        current = source.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_failures_are_rate_limited() {
        for failure in [
            TransportFailure::ConnectionReset,
            TransportFailure::Timeout,
            TransportFailure::Connection,
            TransportFailure::Envelope,
        ] {
            assert!(MailError::transport(failure, "boom").is_rate_limited());
        }
    }

    #[test]
    fn test_throttle_codes_are_rate_limited() {
        assert!(MailError::smtp_response(454, "Throttling failure").is_rate_limited());
        assert!(MailError::smtp_response(421, "try later").is_rate_limited());
        assert!(!MailError::smtp_response(535, "bad credentials").is_rate_limited());
        assert!(!MailError::smtp_response(550, "mailbox unavailable").is_rate_limited());
    }

    #[test]
    fn test_other_errors_are_not_rate_limited() {
        assert!(!MailError::SendError("nope".into()).is_rate_limited());
        assert!(!MailError::MissingField("to").is_rate_limited());
        assert!(!MailError::transport(TransportFailure::Other, "x").is_rate_limited());
    }

    #[test]
    fn test_response_code() {
        assert_eq!(MailError::smtp_response(451, "x").response_code(), Some(451));
        assert_eq!(MailError::Internal("x".into()).response_code(), None);
    }

    #[test]
    fn test_554_needs_throttling_text() {
        assert!(MailError::smtp_response(554, "Throttling failure: Maximum sending rate exceeded.")
            .is_rate_limited());
        assert!(!MailError::smtp_response(
            554,
            "Message rejected: Email address is not verified."
        )
        .is_rate_limited());
    }
}
