// Ids - strongly typed integer keys, hashed as 32-byte big-endian words

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn value(&self) -> u64 {
                self.0
            }

            /// The id that follows this one
            pub const fn next(&self) -> Self {
                Self(self.0 + 1)
            }

            /// 32-byte big-endian word, the form every digest uses
            pub fn to_word(&self) -> B256 {
                B256::from(U256::from(self.0))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Position in the sparse accounts map
    SlotId
);
define_id!(
    /// Ledger-assigned transaction number
    TxId
);
define_id!(
    /// Contract-assigned checkpoint number
    CheckpointId
);
define_id!(DepositId);
define_id!(WithdrawalId);
define_id!(DepositWithdrawalId);
define_id!(QueryId);

impl CheckpointId {
    /// The checkpoint this one is adjudicated against; `None` for id 0
    pub fn previous(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}
