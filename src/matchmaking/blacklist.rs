//! Player-maintained server blacklist

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::Deserialize;
use tracing::{info, trace};

/// One entry of the blacklist file
#[derive(Debug, Clone, Deserialize)]
struct BlacklistEntry {
    /// `ip:port` for one server or a bare `ip` for every server on a host
    address: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Host(IpAddr),
    Server(SocketAddr),
}

/// Servers the player never wants to be matched to
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    targets: Vec<Target>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of `{"address": "...", "name": "..."}` entries
    pub fn load(path: &Path) -> Result<Self, BlacklistError> {
        let raw = fs::read_to_string(path)?;
        let blacklist = Self::from_json(&raw)?;
        info!(path = %path.display(), entries = blacklist.len(), "Loaded server blacklist");
        Ok(blacklist)
    }

    pub fn from_json(raw: &str) -> Result<Self, BlacklistError> {
        let entries: Vec<BlacklistEntry> = serde_json::from_str(raw)?;
        let mut blacklist = Self::new();
        for entry in entries {
            blacklist.targets.push(parse_target(&entry.address)?);
            if let Some(name) = entry.name {
                trace!(address = %entry.address, name = %name, "Blacklisted server");
            }
        }
        Ok(blacklist)
    }

    pub fn block_server(&mut self, address: SocketAddr) {
        self.targets.push(Target::Server(address));
    }

    pub fn block_host(&mut self, ip: IpAddr) {
        self.targets.push(Target::Host(ip));
    }

    pub fn is_blacklisted(&self, address: &SocketAddr) -> bool {
        self.targets.iter().any(|target| match target {
            Target::Host(ip) => *ip == address.ip(),
            Target::Server(server) => server == address,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn parse_target(raw: &str) -> Result<Target, BlacklistError> {
    let raw = raw.trim();
    if let Ok(server) = raw.parse::<SocketAddr>() {
        return Ok(Target::Server(server));
    }
    raw.parse::<IpAddr>()
        .map(Target::Host)
        .map_err(|_| BlacklistError::InvalidAddress(raw.to_string()))
}

/// Blacklist loading errors
#[derive(Debug, thiserror::Error)]
pub enum BlacklistError {
    #[error("Failed to read blacklist: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed blacklist: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid blacklist address: {0}")]
    InvalidAddress(String),
}
