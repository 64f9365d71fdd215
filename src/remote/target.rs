// ABOUTME: RemoteTarget descriptor owning at most one live SSH connection.
// ABOUTME: Provides the session factory, reuse policy, teardown, and identity rendering.

use super::connect::{
    self, Connection, ConnectionId, DEFAULT_PORT, DialParams, HostKeyPolicy,
    default_key_path, default_known_hosts_path, load_private_key,
};
use super::error::{Error, Result};
use super::known_hosts::HostRegistry;
use super::session::{CommandOutput, Session};
use std::fmt;
use std::path::PathBuf;
use tokio::runtime::{Builder, Runtime};

/// Rendered identity of a target without a host.
pub const UNKNOWN_IDENTITY: &str = "<unknown>";

/// Connection parameters plus the at-most-one live connection.
///
/// The public API is blocking. A private tokio runtime is built on the
/// first connection attempt and drives the SSH transport; do not call
/// these methods from inside an async runtime.
///
/// `port` and `key_path` defaults are filled in by [`connect`](Self::connect),
/// not at construction.
pub struct RemoteTarget {
    pub host: String,
    /// Defaults to `"22"` on the first connection attempt.
    pub port: String,
    pub user: String,
    /// Defaults to `$HOME/.ssh/id_rsa` on the first connection attempt.
    pub key_path: Option<PathBuf>,
    /// Reuse the connection across sessions instead of dialing per session.
    pub keep_alive: bool,
    /// Defaults to `$HOME/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    pub host_key_policy: HostKeyPolicy,
    connection: Option<Connection>,
    runtime: Option<Runtime>,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: String::new(),
            user: String::new(),
            key_path: None,
            keep_alive: false,
            known_hosts_path: None,
            host_key_policy: HostKeyPolicy::default(),
            connection: None,
            runtime: None,
        }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Identity of the live connection, if any.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }

    /// Establish a new connection, replacing any existing one.
    pub fn connect(&mut self) -> Result<ConnectionId> {
        if self.host.is_empty() {
            return Err(Error::Config("host is required".to_string()));
        }

        if self.key_path.is_none() {
            self.key_path = Some(default_key_path()?);
        }
        let key_path = self.key_path.clone().unwrap_or_default();
        let key = load_private_key(&key_path)?;

        let registry_path = match &self.known_hosts_path {
            Some(path) => path.clone(),
            None => default_known_hosts_path()?,
        };
        let registry =
            HostRegistry::load(&registry_path).map_err(|source| Error::HostRegistry {
                path: registry_path.clone(),
                source,
            })?;

        if self.port.is_empty() {
            self.port = DEFAULT_PORT.to_string();
        }
        let port = self
            .port
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid port: {:?}", self.port)))?;

        self.close_quietly();

        let params = DialParams {
            host: self.host.clone(),
            port,
            user: self.login_user(),
            key,
            registry,
            policy: self.host_key_policy,
        };
        let connection = self.runtime()?.block_on(connect::dial(params))?;
        let id = connection.id;
        self.connection = Some(connection);
        Ok(id)
    }

    /// Open a session for one command.
    ///
    /// With `keep_alive` set and a live connection, the connection is reused
    /// without a new handshake. Otherwise a fresh connection is established.
    /// If the session cannot be opened the connection is closed and cleared.
    pub fn new_session(&mut self) -> Result<Session<'_>> {
        if self.keep_alive && self.connection.is_some() {
            tracing::debug!("re-using existing SSH connection to {}", self);
        } else {
            self.connect()?;
        }

        let (runtime, connection) = match (&self.runtime, &self.connection) {
            (Some(runtime), Some(connection)) => (runtime, connection),
            _ => return Err(Error::NotConnected(self.to_string())),
        };
        let id = connection.id;
        let opened = runtime.block_on(connection.handle.channel_open_session());

        match opened {
            Ok(channel) => {
                tracing::debug!("opened session on {} ({})", self, id);
                let target = self.to_string();
                let runtime = self
                    .runtime
                    .as_ref()
                    .ok_or_else(|| Error::NotConnected(target.clone()))?;
                Ok(Session::new(channel, runtime, target, id))
            }
            Err(source) => {
                let target = self.to_string();
                self.close_quietly();
                Err(Error::Session { target, source })
            }
        }
    }

    /// Run one command and capture its output.
    ///
    /// Without `keep_alive` the connection is closed afterwards, whether or
    /// not the command succeeded.
    pub fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let result = self.new_session().and_then(|session| session.run(command));

        if !self.keep_alive {
            if let Err(e) = self.close() {
                tracing::warn!("{}", e);
            }
        }
        result
    }

    /// Close and clear the connection. A no-op when not connected.
    pub fn close(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        let id = connection.id;
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };

        tracing::debug!("closing connection to {} ({})", self, id);
        runtime
            .block_on(connection.disconnect())
            .map_err(|source| Error::Disconnect {
                target: self.to_string(),
                source,
            })
    }

    fn close_quietly(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("{}", e);
        }
    }

    /// User to authenticate as. Falls back to `$USER` without modifying `user`.
    fn login_user(&self) -> String {
        if self.user.is_empty() {
            std::env::var("USER").unwrap_or_else(|_| "root".to_string())
        } else {
            self.user.clone()
        }
    }

    fn runtime(&mut self) -> Result<&Runtime> {
        if self.runtime.is_none() {
            // One worker keeps an idle kept-alive connection serviced between commands.
            let runtime = Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("zfs-remote-ssh")
                .enable_all()
                .build()?;
            self.runtime = Some(runtime);
        }
        self.runtime
            .as_ref()
            .ok_or_else(|| Error::NotConnected(self.to_string()))
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A host without a user keeps the unknown marker and still gains the port.
        let mut identity = UNKNOWN_IDENTITY.to_string();
        if !self.host.is_empty() {
            if !self.user.is_empty() {
                identity = format!("{}@{}", self.user, self.host);
            }
            if !self.port.is_empty() {
                identity.push(':');
                identity.push_str(&self.port);
            }
        }
        f.write_str(&identity)
    }
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("key_path", &self.key_path)
            .field("keep_alive", &self.keep_alive)
            .field("known_hosts_path", &self.known_hosts_path)
            .field("host_key_policy", &self.host_key_policy)
            .field("connection", &self.connection)
            .finish()
    }
}
