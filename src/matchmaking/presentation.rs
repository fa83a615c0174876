//! Presentation boundary: progress, candidate lists and the final result

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::server::ServerRecord;

/// Terminal outcome of a search, delivered exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchResult {
    /// A connect command was issued
    Connecting,
    UserCancelled,
    /// Discovery never heard from a single server
    NoServersFound,
    /// Servers answered, but none were good enough
    NoServersMetCriteria,
    /// Every ranked candidate failed its final ping
    FinalPingFailed,
    InternalError,
}

impl SearchResult {
    /// Numeric code reported in search stats
    pub fn code(self) -> i32 {
        match self {
            Self::InternalError => -1,
            Self::UserCancelled => 10,
            Self::NoServersFound => 20,
            Self::NoServersMetCriteria => 30,
            Self::FinalPingFailed => 60,
            Self::Connecting => 100,
        }
    }
}

/// Why a server picked from the list could not be joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PingFailure {
    Full,
    NoLongerMeetsCriteria,
    Timeout,
}

/// Discovery progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchProgress {
    /// 0.0 to 1.0
    pub fraction: f32,
    pub eligible: usize,
    pub ineligible: usize,
}

/// One row of the candidate list shown to the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedServer {
    pub address: SocketAddr,
    pub name: String,
    pub map: String,
    pub players: u32,
    pub max_players: u32,
    pub ping_ms: u32,
    pub total_score: f32,
}

impl From<&ServerRecord> for RankedServer {
    fn from(record: &ServerRecord) -> Self {
        Self {
            address: record.address(),
            name: record.info.name.clone(),
            map: record.info.map.clone(),
            players: record.info.players,
            max_players: record.info.max_players,
            ping_ms: record.info.ping_ms,
            total_score: record.total_score(),
        }
    }
}

/// Receives search updates. Implementations must not block.
pub trait Presentation {
    fn on_progress(&mut self, progress: SearchProgress);

    /// Candidates the player can choose from, best first
    fn on_ranked_list(&mut self, servers: &[RankedServer]);

    fn on_candidate_removed(&mut self, address: SocketAddr, reason: PingFailure);

    fn on_result(&mut self, result: SearchResult);
}

/// Executes the connect directive for the chosen server
pub trait Connector {
    fn connect(&mut self, address: SocketAddr, command: &str);
}

/// Presentation that only writes to the log
#[derive(Debug, Default)]
pub struct LogPresentation;

impl Presentation for LogPresentation {
    fn on_progress(&mut self, progress: SearchProgress) {
        debug!(
            progress = progress.fraction,
            eligible = progress.eligible,
            ineligible = progress.ineligible,
            "Search progress"
        );
    }

    fn on_ranked_list(&mut self, servers: &[RankedServer]) {
        for (rank, server) in servers.iter().enumerate() {
            info!(
                rank,
                address = %server.address,
                map = %server.map,
                players = server.players,
                max_players = server.max_players,
                ping = server.ping_ms,
                score = server.total_score,
                "Candidate"
            );
        }
    }

    fn on_candidate_removed(&mut self, address: SocketAddr, reason: PingFailure) {
        warn!(address = %address, ?reason, "Selected server can no longer be joined");
    }

    fn on_result(&mut self, result: SearchResult) {
        info!(?result, code = result.code(), "Quickplay search finished");
    }
}

/// Connector that keeps the issued connect commands
#[derive(Debug, Default)]
pub struct ConnectLog {
    pub commands: Vec<String>,
}

impl Connector for ConnectLog {
    fn connect(&mut self, address: SocketAddr, command: &str) {
        info!(address = %address, command, "Issuing connect command");
        self.commands.push(command.to_string());
    }
}
