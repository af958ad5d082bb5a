// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod poller;
pub mod render;
pub mod store;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports
pub use client::{ChatClient, RemoteClient};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use poller::{PollHandle, Poller};
pub use store::SessionStore;
pub use types::*;
