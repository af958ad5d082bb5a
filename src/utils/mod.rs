//! Serde helpers shared by the wire types.

pub mod id;
pub mod time;
