//! Email address type with optional display name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An email address with an optional display name.
///
/// # Examples
///
/// ```
/// use mailpace::Address;
///
/// let addr: Address = "user@example.com".into();
/// assert_eq!(addr.email, "user@example.com");
/// assert_eq!(addr.name, None);
///
/// let addr: Address = ("Academy", "noreply@academy.test").into();
/// assert_eq!(addr.formatted(), "\"Academy\" <noreply@academy.test>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name (e.g., "Training Team")
    pub name: Option<String>,
    /// Email address (e.g., "noreply@example.com")
    pub email: String,
}

impl Address {
    /// Create a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new address with a name and email.
    ///
    /// An empty name is treated as no name.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: (!name.trim().is_empty()).then_some(name),
            email: email.into(),
        }
    }

    /// True when there is no usable address.
    pub fn is_empty(&self) -> bool {
        self.email.trim().is_empty()
    }

    /// Format for a `From`/`To` header.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) => format!("\"{}\" <{}>", name.replace('"', "\\\""), self.email),
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl From<(&str, &str)> for Address {
    fn from((name, email): (&str, &str)) -> Self {
        Self::with_name(name, email)
    }
}

impl From<(String, String)> for Address {
    fn from((name, email): (String, String)) -> Self {
        Self::with_name(name, email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_without_name() {
        assert_eq!(Address::new("a@b.com").formatted(), "a@b.com");
    }

    #[test]
    fn test_formatted_escapes_quotes() {
        let addr = Address::with_name("The \"Best\" Academy", "a@b.com");
        assert_eq!(addr.formatted(), "\"The \\\"Best\\\" Academy\" <a@b.com>");
    }

    #[test]
    fn test_blank_name_dropped() {
        assert_eq!(Address::with_name("  ", "a@b.com").name, None);
    }

    #[test]
    fn test_is_empty() {
        assert!(Address::new("").is_empty());
        assert!(Address::new("   ").is_empty());
        assert!(!Address::new("a@b.com").is_empty());
    }
}
