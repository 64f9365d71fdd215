// ABOUTME: Library root for zfs-remote - exposes the remote execution API.
// ABOUTME: The CLI binary is in main.rs.

pub mod config;
pub mod error;
pub mod output;
pub mod remote;
