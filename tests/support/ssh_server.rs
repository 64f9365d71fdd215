// ABOUTME: In-process SSH server helper for integration tests.
// ABOUTME: Runs a russh server on a background thread and counts handshakes and sessions.

use russh::keys::load_secret_key;
use russh::keys::ssh_key::PublicKey;
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zfs_remote::remote::RemoteTarget;

pub const TEST_USER: &str = "tester";

/// Path to a file under tests/fixtures.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// `algorithm base64` fields of a fixture public key.
pub fn public_key_fields(name: &str) -> String {
    let contents = std::fs::read_to_string(fixture(name)).expect("fixture public key");
    contents
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct Stats {
    connections: AtomicUsize,
    authentications: AtomicUsize,
    sessions: AtomicUsize,
    commands: AtomicUsize,
}

#[derive(Clone)]
struct TestHandler {
    stats: Arc<Stats>,
    authorized_key: PublicKey,
    refuse_sessions: bool,
}

impl server::Server for TestHandler {
    type Handler = Self;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> Self {
        self.stats.connections.fetch_add(1, Ordering::SeqCst);
        self.clone()
    }
}

impl server::Handler for TestHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        assert_eq!(
            public_key.key_data(),
            self.authorized_key.key_data(),
            "client authenticated with an unexpected key"
        );
        self.stats.authentications.fetch_add(1, Ordering::SeqCst);
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.refuse_sessions {
            return Ok(false);
        }
        self.stats.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.stats.commands.fetch_add(1, Ordering::SeqCst);
        let command = String::from_utf8_lossy(data).into_owned();
        let (stdout, stderr, exit_code) = respond(&command);

        let _ = session.channel_success(channel);
        if !stdout.is_empty() {
            let _ = session.data(channel, stdout.into_bytes().into());
        }
        if !stderr.is_empty() {
            let _ = session.extended_data(channel, 1, stderr.into_bytes().into());
        }
        let _ = session.exit_status_request(channel, exit_code);
        let _ = session.eof(channel);
        let _ = session.close(channel);
        Ok(())
    }
}

/// Canned responses: `echo`, `error`, `exit`, and a pool listing.
fn respond(command: &str) -> (String, String, u32) {
    if let Some(text) = command.strip_prefix("echo ") {
        return (format!("{text}\n"), String::new(), 0);
    }
    if let Some(text) = command.strip_prefix("error ") {
        return (String::new(), format!("{text}\n"), 1);
    }
    if let Some(code) = command.strip_prefix("exit ") {
        return (String::new(), String::new(), code.trim().parse().unwrap_or(255));
    }
    if command == "zpool list -H -o name" {
        return ("tank\nbackup\n".to_string(), String::new(), 0);
    }
    (
        String::new(),
        format!("sh: {command}: command not found\n"),
        127,
    )
}

/// A running test server bound to 127.0.0.1 on an ephemeral port.
pub struct TestServer {
    port: u16,
    stats: Arc<Stats>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(false)
    }

    /// A server that authenticates clients but refuses every session channel.
    pub fn refusing_sessions() -> Self {
        Self::start_with(true)
    }

    fn start_with(refuse_sessions: bool) -> Self {
        let stats = Arc::new(Stats::default());
        let authorized_key = PublicKey::from_openssh(&public_key_fields("client_key.pub"))
            .expect("client public key");
        let host_key = load_secret_key(fixture("host_key"), None).expect("host key");

        let mut handler = TestHandler {
            stats: Arc::clone(&stats),
            authorized_key,
            refuse_sessions,
        };

        let (port_tx, port_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("server runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind test server");
                let port = listener.local_addr().expect("local addr").port();
                port_tx.send(port).expect("report port");

                let config = server::Config {
                    keys: vec![host_key],
                    auth_rejection_time: Duration::from_millis(10),
                    auth_rejection_time_initial: Some(Duration::from_millis(0)),
                    ..Default::default()
                };
                let _ = handler.run_on_socket(Arc::new(config), &listener).await;
            });
        });

        let port = port_rx.recv().expect("test server port");
        Self { port, stats }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn authentications(&self) -> usize {
        self.stats.authentications.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.stats.sessions.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.stats.commands.load(Ordering::SeqCst)
    }

    /// known_hosts line trusting this server's host key.
    pub fn known_hosts_line(&self) -> String {
        format!("[127.0.0.1]:{} {}\n", self.port, public_key_fields("host_key.pub"))
    }

    /// Write a known_hosts file trusting this server into `dir`.
    pub fn write_known_hosts(&self, dir: &Path) -> PathBuf {
        let path = dir.join("known_hosts");
        std::fs::write(&path, self.known_hosts_line()).expect("write known_hosts");
        path
    }

    /// Target for this server with explicit key and known_hosts paths.
    pub fn target(&self, dir: &Path) -> RemoteTarget {
        RemoteTarget::new("127.0.0.1")
            .port(self.port.to_string())
            .user(TEST_USER)
            .key_path(fixture("client_key"))
            .known_hosts_path(self.write_known_hosts(dir))
    }
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("ephemeral port addr").port();
    drop(listener);
    port
}
