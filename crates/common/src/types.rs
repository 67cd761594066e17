//! Common data types for the watch room components.
//!
//! Every identifier is an opaque random 128-bit token. On the wire each one
//! is the hyphenated UUID string, so clients can treat them as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

opaque_id!(
    /// Unique identifier for a room
    RoomId
);

opaque_id!(
    /// Unique identifier for a user, scoped to one room membership
    UserId
);

opaque_id!(
    /// Unique identifier for a live client connection
    ConnectionId
);

opaque_id!(
    /// Unique identifier for a relayed chat or system message
    MessageId
);
