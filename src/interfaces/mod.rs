//! Adapters between external representations and domain types.

pub mod codec;
pub mod csv;
