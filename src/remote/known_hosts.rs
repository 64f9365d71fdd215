// ABOUTME: Host-key trust registry backed by an OpenSSH known_hosts file.
// ABOUTME: Validates the file up front and verifies presented server keys against it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::hmac;
use russh::keys::ssh_key::PublicKey;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnownHostsError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Marker prefix on a known_hosts line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    CertAuthority,
    Revoked,
}

/// One entry of a host pattern list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// `|1|salt|hash`: HMAC-SHA1 of the host name keyed by the salt.
    Hashed { salt: Vec<u8>, hash: Vec<u8> },
    /// Host name or `*`/`?` wildcard, `!` negates.
    Wildcard { pattern: String, negated: bool },
}

impl HostPattern {
    fn parse(text: &str) -> Result<Self, String> {
        if let Some(hashed) = text.strip_prefix("|1|") {
            let (salt, hash) = hashed
                .split_once('|')
                .ok_or_else(|| "hashed host is missing its hash".to_string())?;
            let salt = STANDARD
                .decode(salt)
                .map_err(|e| format!("invalid hashed host salt: {e}"))?;
            let hash = STANDARD
                .decode(hash)
                .map_err(|e| format!("invalid hashed host: {e}"))?;
            return Ok(HostPattern::Hashed { salt, hash });
        }
        if text.starts_with('|') {
            return Err(format!("unsupported hashed host {text}"));
        }

        let (pattern, negated) = match text.strip_prefix('!') {
            Some(pattern) => (pattern, true),
            None => (text, false),
        };
        if pattern.is_empty() {
            return Err("empty host pattern".to_string());
        }
        Ok(HostPattern::Wildcard {
            pattern: pattern.to_ascii_lowercase(),
            negated,
        })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            HostPattern::Hashed { salt, hash } => {
                let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, salt);
                hmac::verify(&key, name.as_bytes(), hash).is_ok()
            }
            HostPattern::Wildcard { pattern, .. } => {
                wildcard_match(pattern.as_bytes(), name.to_ascii_lowercase().as_bytes())
            }
        }
    }

    fn is_negated(&self) -> bool {
        matches!(self, HostPattern::Wildcard { negated: true, .. })
    }
}

/// One parsed known_hosts line.
#[derive(Debug, Clone)]
pub struct KnownHostEntry {
    /// 1-based line number in the file.
    pub line: usize,
    pub marker: Option<Marker>,
    /// Raw host pattern list, possibly hashed (`|1|salt|hash`).
    pub hosts: String,
    pub patterns: Vec<HostPattern>,
    pub key: PublicKey,
}

impl KnownHostEntry {
    /// Whether this entry applies to `name` (`host`, or `[host]:port` off port 22).
    ///
    /// A matching negated pattern excludes the host regardless of the others.
    pub fn matches_host(&self, name: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if pattern.matches(name) {
                if pattern.is_negated() {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// Outcome of checking a server key against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyVerdict {
    Trusted,
    /// No entry for this host and key type.
    Unknown,
    /// Entries exist for this host and key type, none with the presented key.
    Mismatch { line: usize },
    /// The presented key is explicitly marked `@revoked`.
    Revoked { line: usize },
}

impl HostKeyVerdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, HostKeyVerdict::Trusted)
    }
}

/// A loaded, validated known_hosts file.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    path: PathBuf,
    entries: Vec<KnownHostEntry>,
}

impl HostRegistry {
    /// Read and validate the registry at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, KnownHostsError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)?;
        Self::parse(path, &contents)
    }

    /// Validate registry contents. Any malformed line rejects the whole file.
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self, KnownHostsError> {
        let mut entries = Vec::new();

        for (index, raw) in contents.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            entries.push(parse_line(line, trimmed)?);
        }

        Ok(Self {
            path: path.into(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[KnownHostEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the key presented by `host:port` against the loaded entries.
    ///
    /// Keys are compared without their comments. `@cert-authority` lines
    /// never vouch for a plain host key.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyVerdict {
        if let Some(entry) = self.entries.iter().find(|entry| {
            entry.marker == Some(Marker::Revoked) && entry.key.key_data() == key.key_data()
        }) {
            return HostKeyVerdict::Revoked { line: entry.line };
        }

        let name = host_port(host, port);
        let mut changed = None;
        for entry in self
            .entries
            .iter()
            .filter(|entry| entry.marker.is_none() && entry.matches_host(&name))
        {
            if entry.key.algorithm() != key.algorithm() {
                continue;
            }
            if entry.key.key_data() == key.key_data() {
                return HostKeyVerdict::Trusted;
            }
            changed.get_or_insert(entry.line);
        }

        match changed {
            Some(line) => HostKeyVerdict::Mismatch { line },
            None => HostKeyVerdict::Unknown,
        }
    }
}

/// Name a host is recorded under: bare on port 22, `[host]:port` otherwise.
fn host_port(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

fn wildcard_match(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0, 0);
    // Position of the last `*` and how much of `name` it has consumed.
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == b'?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    star = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

fn parse_line(line: usize, text: &str) -> Result<KnownHostEntry, KnownHostsError> {
    let malformed = |reason: &str| KnownHostsError::Malformed {
        line,
        reason: reason.to_string(),
    };

    let mut fields = text.split_whitespace();
    let first = fields.next().ok_or_else(|| malformed("empty entry"))?;

    let (marker, hosts) = match first.strip_prefix('@') {
        Some("cert-authority") => (Some(Marker::CertAuthority), fields.next()),
        Some("revoked") => (Some(Marker::Revoked), fields.next()),
        Some(other) => return Err(malformed(&format!("unknown marker @{other}"))),
        None => (None, Some(first)),
    };

    let hosts = hosts.ok_or_else(|| malformed("missing host pattern"))?;
    let patterns = hosts
        .split(',')
        .map(HostPattern::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| malformed(&reason))?;
    let algorithm = fields.next().ok_or_else(|| malformed("missing key type"))?;
    let encoded = fields.next().ok_or_else(|| malformed("missing key data"))?;

    let key = PublicKey::from_openssh(&format!("{algorithm} {encoded}"))
        .map_err(|e| malformed(&format!("invalid {algorithm} key: {e}")))?;

    Ok(KnownHostEntry {
        line,
        marker,
        hosts: hosts.to_string(),
        patterns,
        key,
    })
}
