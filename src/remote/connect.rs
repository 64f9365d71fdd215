// ABOUTME: Connection establishment using russh.
// ABOUTME: Loads key material, verifies the host key against known_hosts, and authenticates.

use super::error::{ConnectFailure, Error, Result};
use super::known_hosts::{HostKeyVerdict, HostRegistry};
use parking_lot::Mutex;
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, decode_secret_key, ssh_key};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_PORT: &str = "22";
const DEFAULT_KEY_FILE: &str = ".ssh/id_rsa";
const DEFAULT_KNOWN_HOSTS_FILE: &str = ".ssh/known_hosts";

/// Process-unique identity of an established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How presented server host keys are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Only keys trusted by the known_hosts registry are accepted.
    #[default]
    Strict,
    /// Accepts any host key. Test environments only; never use in production.
    #[cfg(feature = "insecure-host-key")]
    InsecureAcceptAny,
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| Error::Config("cannot resolve the home directory".to_string()))
}

/// `$HOME/.ssh/id_rsa`
pub fn default_key_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(DEFAULT_KEY_FILE))
}

/// `$HOME/.ssh/known_hosts`
pub fn default_known_hosts_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(DEFAULT_KNOWN_HOSTS_FILE))
}

/// Read and decode an unencrypted private key.
pub fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let bytes = std::fs::read(path).map_err(|source| Error::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |source: russh::keys::Error| Error::KeyParse {
        path: path.to_path_buf(),
        source,
    };

    let contents = String::from_utf8(bytes).map_err(|e| parse_error(e.into()))?;
    decode_secret_key(&contents, None).map_err(parse_error)
}

/// russh client handler enforcing the host key policy.
pub(crate) struct TargetHandler {
    host: String,
    port: u16,
    registry: HostRegistry,
    policy: HostKeyPolicy,
    /// Verdict that caused the handshake to be refused, if any.
    rejected: Arc<Mutex<Option<HostKeyVerdict>>>,
}

impl client::Handler for TargetHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let verdict = self
            .registry
            .verify(&self.host, self.port, server_public_key);

        let accepted = match self.policy {
            HostKeyPolicy::Strict => verdict.is_trusted(),
            #[cfg(feature = "insecure-host-key")]
            HostKeyPolicy::InsecureAcceptAny => {
                tracing::warn!(
                    "INSECURE: accepting host key for {}:{} without verification ({:?})",
                    self.host,
                    self.port,
                    verdict
                );
                true
            }
        };

        if !accepted {
            tracing::debug!(
                "rejecting host key for {}:{}: {:?}",
                self.host,
                self.port,
                verdict
            );
            *self.rejected.lock() = Some(verdict);
        }
        Ok(accepted)
    }
}

/// An established, authenticated connection.
pub(crate) struct Connection {
    pub(crate) handle: Handle<TargetHandler>,
    pub(crate) id: ConnectionId,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Connection {
    pub(crate) async fn disconnect(self) -> std::result::Result<(), russh::Error> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
    }
}

/// Everything needed to dial once defaults are resolved.
pub(crate) struct DialParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key: PrivateKey,
    pub registry: HostRegistry,
    pub policy: HostKeyPolicy,
}

/// Dial, verify the host key, and authenticate.
pub(crate) async fn dial(params: DialParams) -> Result<Connection> {
    let DialParams {
        host,
        port,
        user,
        key,
        registry,
        policy,
    } = params;

    let address = format!("{}:{}", host, port);
    let registry_path = registry.path().to_path_buf();
    let rejected = Arc::new(Mutex::new(None));

    let handler = TargetHandler {
        host: host.clone(),
        port,
        registry,
        policy,
        rejected: Arc::clone(&rejected),
    };

    tracing::debug!("dialing {}", address);
    let mut handle = client::connect(Arc::new(Config::default()), (host.as_str(), port), handler)
        .await
        .map_err(|e| Error::Connection {
            address: address.clone(),
            failure: classify(e, rejected.lock().take(), &registry_path),
        })?;

    let authenticated = authenticate(&mut handle, &user, key)
        .await
        .map_err(|e| Error::Connection {
            address: address.clone(),
            failure: ConnectFailure::Protocol(e),
        })?;

    if !authenticated {
        if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
            tracing::debug!("disconnect after rejected authentication failed: {}", e);
        }
        return Err(Error::Connection {
            address,
            failure: ConnectFailure::AuthenticationRejected { user },
        });
    }

    let connection = Connection {
        handle,
        id: ConnectionId::next(),
    };
    tracing::info!("connected to {} as {:?} ({})", address, user, connection.id);
    Ok(connection)
}

async fn authenticate(
    handle: &mut Handle<TargetHandler>,
    user: &str,
    key: PrivateKey,
) -> std::result::Result<bool, russh::Error> {
    let hash_alg = handle.best_supported_rsa_hash().await?.flatten();

    let result = handle
        .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
        .await?;

    Ok(result.success())
}

fn classify(
    error: russh::Error,
    rejected: Option<HostKeyVerdict>,
    registry: &Path,
) -> ConnectFailure {
    let registry = registry.to_path_buf();
    match rejected {
        Some(HostKeyVerdict::Mismatch { line }) => {
            ConnectFailure::HostKeyMismatch { registry, line }
        }
        Some(HostKeyVerdict::Revoked { line }) => ConnectFailure::RevokedHostKey { registry, line },
        Some(HostKeyVerdict::Unknown) => ConnectFailure::UnknownHostKey { registry },
        Some(HostKeyVerdict::Trusted) | None => match error {
            russh::Error::IO(e) => ConnectFailure::Network(e),
            other => ConnectFailure::Protocol(other),
        },
    }
}
