//! Message envelope handed to a transporter.

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// An outbound email message.
///
/// ```
/// use mailpace::Email;
///
/// let email = Email::new()
///     .from(("Training Team", "noreply@academy.test"))
///     .to("learner@example.com")
///     .subject("Your certificate is ready")
///     .html_body("<p>Download it from your dashboard.</p>");
///
/// assert_eq!(email.to[0].email, "learner@example.com");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Email {
    /// Sender address
    pub from: Option<Address>,
    /// Primary recipients
    pub to: Vec<Address>,
    /// Email subject line
    pub subject: String,
    /// HTML body
    pub html_body: Option<String>,
}

impl Email {
    /// Create a new empty email.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl Into<Address>) -> Self {
        self.from = Some(addr.into());
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl Into<Address>) -> Self {
        self.to.push(addr.into());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the HTML body.
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let email = Email::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Test")
            .html_body("<p>Hello</p>");

        assert_eq!(email.from.unwrap().email, "sender@example.com");
        assert_eq!(email.to.len(), 1);
        assert_eq!(email.subject, "Test");
        assert_eq!(email.html_body, Some("<p>Hello</p>".to_string()));
    }

    #[test]
    fn test_from_tuple_sets_display_name() {
        let email = Email::new().from(("Academy", "noreply@academy.test"));
        let from = email.from.unwrap();
        assert_eq!(from.name.as_deref(), Some("Academy"));
        assert_eq!(from.email, "noreply@academy.test");
    }
}
