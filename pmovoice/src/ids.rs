//! Identifiants des destinations et des canaux

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! impl_snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

impl_snowflake_id!(
    /// Une destination vocale (une par communauté servie)
    DestinationId
);

impl_snowflake_id!(
    /// Un canal : canal vocal de sortie ou canal texte lu à voix haute
    ChannelId
);
