//! Identifier types for sessions and users.
//!
//! Session tokens arrive from clients in URL paths and JSON bodies, so they are
//! opaque strings rather than parsed UUIDs. Server-side generation still uses
//! random UUIDs to keep tokens unguessable.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare an opaque string token newtype with a consistent API.
macro_rules! define_token_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing token.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the token text.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the token text.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_token_id!(
    /// Identifier of one conversation between a client and the assistant.
    SessionId
);

define_token_id!(
    /// Identifier of the shop user owning a session, when known.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = UserId::new("rider-42");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"rider-42\"");
    }
}
