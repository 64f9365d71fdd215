// ABOUTME: Remote execution over SSH for storage management commands.
// ABOUTME: Key-based authentication with known_hosts verification and connection reuse.

mod connect;
mod error;
mod known_hosts;
mod session;
mod target;

pub use connect::{
    ConnectionId, DEFAULT_PORT, HostKeyPolicy, default_key_path, default_known_hosts_path,
    load_private_key,
};
pub use error::{ConnectFailure, Error, Result};
pub use known_hosts::{
    HostKeyVerdict, HostPattern, HostRegistry, KnownHostEntry, KnownHostsError, Marker,
};
pub use session::{CommandOutput, Session};
pub use target::{RemoteTarget, UNKNOWN_IDENTITY};
