//! Client side of a joke market session: transports to reach the engine,
//! a polling synchronisation layer and local caches of what a player
//! submitted.

pub mod cache;
pub mod error;
pub mod local;
pub mod remote;
pub mod sync;
pub mod transport;

pub use error::ClientError;
pub use local::LocalTransport;
pub use remote::HttpTransport;
pub use sync::{spawn_poller, ClientState, Identity, PollOutcome, PollerHandle, SyncClient};
pub use transport::Transport;
