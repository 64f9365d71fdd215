// ABOUTME: Single-use command sessions over an established connection.
// ABOUTME: A session runs exactly one command and is consumed by it.

use super::connect::ConnectionId;
use super::error::{Error, Result};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use serde::Serialize;
use tokio::runtime::Runtime;

/// Output from a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A command channel valid for exactly one command.
///
/// The session borrows its [`RemoteTarget`](super::RemoteTarget), so the
/// target cannot be closed or reconnected while a session is outstanding.
/// Dropping an unused session releases its channel.
pub struct Session<'t> {
    channel: Option<Channel<Msg>>,
    runtime: &'t Runtime,
    target: String,
    connection: ConnectionId,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("connection", &self.connection)
            .field("channel", &self.channel.as_ref().map(|c| c.id()))
            .finish()
    }
}

impl<'t> Session<'t> {
    pub(crate) fn new(
        channel: Channel<Msg>,
        runtime: &'t Runtime,
        target: String,
        connection: ConnectionId,
    ) -> Self {
        Self {
            channel: Some(channel),
            runtime,
            target,
            connection,
        }
    }

    /// Connection this session was opened on.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Run `command` and collect its output. Consumes the session.
    pub fn run(mut self, command: &str) -> Result<CommandOutput> {
        let Some(mut channel) = self.channel.take() else {
            return Err(Error::ChannelClosed);
        };

        tracing::debug!("running on {}: {}", self.target, command);
        self.runtime.block_on(async move {
            let result = execute(&mut channel, command).await;
            if let Err(e) = channel.close().await {
                tracing::debug!("closing channel failed: {}", e);
            }
            result
        })
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            tracing::debug!("releasing unused session on {}", self.target);
            if let Err(e) = self.runtime.block_on(channel.close()) {
                tracing::debug!("closing unused channel failed: {}", e);
            }
        }
    }
}

async fn execute(channel: &mut Channel<Msg>, command: &str) -> Result<CommandOutput> {
    channel.exec(true, command).await.map_err(Error::Exec)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut got_eof = false;

    while let Some(message) = channel.wait().await {
        match message {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            // Extended data type 1 is stderr.
            ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => {
                exit_code = Some(exit_status);
                if got_eof {
                    break;
                }
            }
            ChannelMsg::Eof => {
                got_eof = true;
                if exit_code.is_some() {
                    break;
                }
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    let exit_code = exit_code.ok_or(Error::ChannelClosed)?;

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
