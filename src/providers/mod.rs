//! Transporter implementations.
//!
//! Each transporter implements the [`Mailer`](crate::Mailer) trait.
//!
//! | Transporter | Feature Flag | Description |
//! |-------------|--------------|-------------|
//! | [`SmtpMailer`] | `smtp` | SMTP via lettre, used for SES and Gmail |
//! | [`LocalMailer`] | (none) | In-memory recording for dev/testing |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpBuilder, SmtpMailer, TlsMode};

mod local;
pub use local::{LocalMailer, SentEmail};
