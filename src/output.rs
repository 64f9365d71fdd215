// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports human-readable and JSON lines output modes.

use crate::remote::CommandOutput;
use serde::Serialize;
use std::io::Write;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Remote output passed through, progress on stderr
    Normal,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    /// Print a progress message (suppressed in json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            eprintln!("{message}");
        }
    }

    /// Forward a remote command's output.
    pub fn command(&self, target: &str, output: &CommandOutput) {
        match self.mode {
            OutputMode::Normal => {
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
                let _ = std::io::stdout().flush();
            }
            OutputMode::Json => emit_json(&CommandEvent {
                event: "command",
                target,
                output,
            }),
        }
    }

    /// Print a result line.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("{message}"),
            OutputMode::Json => emit_json(&JsonEvent {
                event: "success",
                message,
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

fn emit_json(event: &impl Serialize) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct CommandEvent<'a> {
    event: &'a str,
    target: &'a str,
    #[serde(flatten)]
    output: &'a CommandOutput,
}
