//! Identifier types for the chat synchronization core.
//!
//! Server-assigned identifiers are plain integers on the wire and are
//! ordered: the delta cursor asks the backend for "everything with an id
//! greater than X". Newtypes keep the id spaces from mixing at compile time.

use core::fmt;
use core::num::ParseIntError;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare an `i64` newtype for a server-assigned identifier.
macro_rules! define_i64_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw id.
            #[inline]
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Extract the raw id.
            #[inline]
            #[must_use]
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            #[inline]
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_i64_id!(
    /// Identifier for a conversation session.
    SessionId
);

define_i64_id!(
    /// Identifier for a message within a session.
    ///
    /// Assignment order matches conversation order, which is what makes the
    /// "newer than baseline" cursor query meaningful.
    MessageId
);

define_i64_id!(
    /// User account identifier.
    UserId
);

/// Client-generated correlation identifier attached to every dispatched
/// request, so one exchange can be followed across logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a fresh correlation id.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_ordering() {
        assert!(MessageId::new(41) < MessageId::new(42));
    }

    #[test]
    fn test_id_display_and_parse() {
        let id = SessionId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!("7".parse::<SessionId>().ok(), Some(id));
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
