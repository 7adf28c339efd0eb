use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] for one of the identifier
/// kinds named in the data model (Vendor, ThingClass, Thing, ...).
///
/// Mirrors the way the teacher newtype-wraps `PropertyHandle`/`EventHandle`
/// rather than passing bare `u64`s around everywhere.
macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(VendorId);
uuid_id!(ThingClassId);
uuid_id!(ParamTypeId);
uuid_id!(StateTypeId);
uuid_id!(EventTypeId);
uuid_id!(ActionTypeId);
uuid_id!(BrowserItemActionTypeId);
uuid_id!(ThingId);
uuid_id!(PluginId);
uuid_id!(IOConnectionId);
uuid_id!(PairingTransactionId);
uuid_id!(ThingDescriptorId);
uuid_id!(RuleId);
