//! Identifier newtypes.
//!
//! Every aggregate and correlation field uses a dedicated UUID newtype so
//! that a ticket id can never be passed where an order id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type! {
    /// Unique identifier for a listed ticket
    TicketId
}

id_type! {
    /// Unique identifier for an order
    OrderId
}

id_type! {
    /// Opaque identifier for an already-authenticated user.
    ///
    /// Issued by the identity collaborator; the core trusts it without
    /// re-verification.
    UserId
}

id_type! {
    /// Identifier for a completed payment, assigned by the payment collaborator
    PaymentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        assert_ne!(TicketId::new(), TicketId::new());
    }

    #[test]
    fn id_round_trips_through_uuid() {
        let id = OrderId::new();
        assert_eq!(OrderId::from_uuid(*id.as_uuid()), id);
    }
}
