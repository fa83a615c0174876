//! Server advertisements and the per-server record kept during a search

use std::cmp::Ordering;
use std::net::SocketAddr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Kind of account a server authenticates with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Invalid,
    Individual,
    /// Persistent dedicated server account
    GameServer,
    /// Dedicated server logged in anonymously
    AnonGameServer,
}

/// Steam-style server account identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAccount {
    pub account_id: u32,
    pub kind: AccountKind,
}

impl ServerAccount {
    pub fn game_server(account_id: u32) -> Self {
        Self {
            account_id,
            kind: AccountKind::GameServer,
        }
    }

    pub fn is_game_server(&self) -> bool {
        matches!(self.kind, AccountKind::GameServer | AccountKind::AnonGameServer)
    }

    /// A dedicated server account with a real account id
    pub fn is_valid_game_server(&self) -> bool {
        self.is_game_server() && self.account_id != 0
    }
}

/// Raw fields a server advertises in a list or ping response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub address: SocketAddr,
    pub name: String,
    /// Total players, bots included
    pub players: u32,
    pub bots: u32,
    pub max_players: u32,
    pub ping_ms: u32,
    pub map: String,
    /// Comma separated tag list
    pub tags: String,
    pub password: bool,
    pub account: ServerAccount,
    pub app_id: u32,
}

impl ServerInfo {
    pub fn humans(&self) -> u32 {
        self.players.saturating_sub(self.bots)
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// Responses with no usable address are dropped before scoring
    pub fn has_routable_address(&self) -> bool {
        !self.address.ip().is_unspecified() && self.address.port() != 0
    }
}

/// Per-server progress through a search.
///
/// Ordered as `Invalid < Ineligible < Eligible < RequestedScore < Scored <
/// Pinged < {Connected | PingTimedOut | PingIneligible}`; the three outcomes
/// of a ping are not comparable with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Invalid,
    Ineligible,
    Eligible,
    RequestedScore,
    Scored,
    Pinged,
    Connected,
    PingTimedOut,
    PingIneligible,
}

impl ServerStatus {
    /// Numeric code reported in search stats
    pub fn code(self) -> i32 {
        match self {
            Self::Invalid => -1,
            Self::Ineligible => 10,
            Self::Eligible => 20,
            Self::RequestedScore => 30,
            Self::Scored => 40,
            Self::Pinged => 50,
            Self::PingTimedOut => 60,
            Self::PingIneligible => 70,
            Self::Connected => 100,
        }
    }

    fn level(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Ineligible => 1,
            Self::Eligible => 2,
            Self::RequestedScore => 3,
            Self::Scored => 4,
            Self::Pinged => 5,
            Self::Connected | Self::PingTimedOut | Self::PingIneligible => 6,
        }
    }

    /// The ping has been answered one way or the other
    pub fn is_settled(self) -> bool {
        self.level() == 6
    }

    pub fn can_advance_to(self, next: ServerStatus) -> bool {
        next.level() > self.level()
    }
}

impl PartialOrd for ServerStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match self.level().cmp(&other.level()) {
            Ordering::Equal => None,
            ordering => Some(ordering),
        }
    }
}

bitflags! {
    /// Reasons a server was excluded from candidacy
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Rejections: u32 {
        /// Population score hit the full/degenerate sentinel
        const NO_HEADROOM = 1 << 9;
        const BLACKLISTED = 1 << 10;
        /// Player count at or above max players
        const PLAYERS = 1 << 11;
        /// Map belongs to another game category
        const CATEGORY = 1 << 12;
        /// Map is not in the quickplay rotation
        const MAP_NOT_ALLOWED = 1 << 13;
        const TAGS = 1 << 14;
        /// App id, password, capacity bounds or account identity
        const FILTER = 1 << 15;
    }
}

impl Serialize for Rejections {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// Everything known about one server address during a search
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub info: ServerInfo,
    /// Advertises the `_registered` tag
    pub registered: bool,
    pub map_legal: bool,
    pub blacklisted: bool,
    pub recent_match_penalty: f32,
    /// Client-local component: ping score minus the rejoin penalty
    pub user_score: f32,
    /// Population fill component
    pub server_score: f32,
    pub rejections: Rejections,
    pub status: ServerStatus,
}

impl ServerRecord {
    pub fn address(&self) -> SocketAddr {
        self.info.address
    }

    pub fn total_score(&self) -> f32 {
        self.user_score + self.server_score
    }

    pub fn is_eligible(&self) -> bool {
        self.rejections.is_empty()
    }

    /// Move to `next` if it is further along the status lattice
    pub fn advance(&mut self, next: ServerStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
