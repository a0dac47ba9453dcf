pub mod auth;
pub mod broadcast;
pub mod export;
pub mod sync;

pub use auth::{CredentialCheck, StaticPassphrase};
pub use broadcast::{BroadcastError, BroadcastSession};
pub use sync::{LiveSnapshot, StateBroadcaster};
