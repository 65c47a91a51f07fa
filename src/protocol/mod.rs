//! The wire-protocol codec (SPEC_FULL.md §4.1): encodes command argument vectors as RESP
//! arrays and decodes any RESP2/RESP3 reply into a [`crate::value::Value`] tree.

pub mod resp;

pub use resp::encode;

#[cfg(feature = "tokio")]
pub use resp::{decode, decode_or_none};
