// ABOUTME: Configuration types and parsing for zfs-remote.yml.
// ABOUTME: Handles YAML parsing, file discovery, and conversion into a RemoteTarget.

mod address;

pub use address::TargetAddress;

use crate::error::{Error, Result};
use crate::remote::RemoteTarget;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "zfs-remote.yml";
pub const CONFIG_FILENAME_ALT: &str = "zfs-remote.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".zfs-remote/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, deserialize_with = "deserialize_target")]
    pub target: Option<TargetAddress>,

    #[serde(default)]
    pub key_path: Option<String>,

    #[serde(default)]
    pub known_hosts_path: Option<String>,

    #[serde(default)]
    pub keep_alive: bool,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Build a disconnected target. `~/` in paths expands to the home directory.
    pub fn into_target(self) -> Result<RemoteTarget> {
        let address = self.target.ok_or(Error::NoTarget)?;

        let mut target = RemoteTarget::new(address.host).keep_alive(self.keep_alive);
        if let Some(port) = address.port {
            target = target.port(port.to_string());
        }
        if let Some(user) = address.user {
            target = target.user(user);
        }
        if let Some(path) = self.key_path {
            target = target.key_path(expand_path("key_path", &path)?);
        }
        if let Some(path) = self.known_hosts_path {
            target = target.known_hosts_path(expand_path("known_hosts_path", &path)?);
        }
        Ok(target)
    }

    pub fn template() -> Self {
        Config {
            target: Some(TargetAddress {
                host: "storage.example.com".to_string(),
                port: Some(22),
                user: Some("root".to_string()),
            }),
            key_path: None,
            known_hosts_path: None,
            keep_alive: false,
        }
    }
}

fn expand_path(field: &str, path: &str) -> Result<PathBuf> {
    if path.trim().is_empty() {
        return Err(Error::InvalidConfig(format!("{field} cannot be empty")));
    }
    Ok(PathBuf::from(shellexpand::tilde(path).into_owned()))
}

pub fn init_config(dir: &Path, target: Option<TargetAddress>, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();
    if target.is_some() {
        config.target = target;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;
    Ok(config_path)
}

fn generate_template_yaml(config: &Config) -> String {
    let mut yaml = String::new();
    if let Some(target) = &config.target {
        yaml.push_str("target:\n");
        yaml.push_str(&format!("  host: {}\n", target.host));
        if let Some(port) = target.port {
            yaml.push_str(&format!("  port: {}\n", port));
        }
        if let Some(user) = &target.user {
            yaml.push_str(&format!("  user: {}\n", user));
        }
    }
    yaml.push_str(
        "# key_path: ~/.ssh/id_rsa\n\
         # known_hosts_path: ~/.ssh/known_hosts\n",
    );
    yaml.push_str(&format!("keep_alive: {}\n", config.keep_alive));
    yaml
}

fn deserialize_target<'de, D>(deserializer: D) -> std::result::Result<Option<TargetAddress>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entry: Option<TargetEntry> = Option::deserialize(deserializer)?;
    entry
        .map(TargetEntry::into_address)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Simple(String),
    Detailed(TargetAddress),
}

impl TargetEntry {
    fn into_address(self) -> std::result::Result<TargetAddress, String> {
        match self {
            TargetEntry::Simple(s) => TargetAddress::parse(&s),
            TargetEntry::Detailed(address) if address.host.is_empty() => {
                Err("hostname cannot be empty".to_string())
            }
            TargetEntry::Detailed(address) => Ok(address),
        }
    }
}
