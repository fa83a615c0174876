//! Per-session report of what a search saw and how it ended

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::presentation::SearchResult;
use super::server::{Rejections, ServerRecord, ServerStatus};

/// Summary of one catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub address: String,
    pub name: String,
    pub map: String,
    pub tags: String,
    pub humans: u32,
    pub max_players: u32,
    pub ping_ms: u32,
    pub registered: bool,
    pub map_legal: bool,
    pub blacklisted: bool,
    pub recent_match_penalty: f32,
    pub user_score: f32,
    pub server_score: f32,
    pub total_score: f32,
    pub rejections: Rejections,
    pub status: ServerStatus,
    pub status_code: i32,
}

impl From<&ServerRecord> for ServerSummary {
    fn from(record: &ServerRecord) -> Self {
        Self {
            address: record.address().to_string(),
            name: record.info.name.clone(),
            map: record.info.map.clone(),
            tags: record.info.tags.clone(),
            humans: record.info.humans(),
            max_players: record.info.max_players,
            ping_ms: record.info.ping_ms,
            registered: record.registered,
            map_legal: record.map_legal,
            blacklisted: record.blacklisted,
            recent_match_penalty: record.recent_match_penalty,
            user_score: record.user_score,
            server_score: record.server_score,
            total_score: record.total_score(),
            rejections: record.rejections,
            status: record.status,
            status_code: record.status.code(),
        }
    }
}

/// Search report, logged as JSON when a session ends
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub user_game_mode: String,
    /// Seconds from start until the result, or until now if still running
    pub search_secs: f32,
    pub result: Option<SearchResult>,
    pub result_code: Option<i32>,
    pub servers: Vec<ServerSummary>,
}

impl SearchStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| format!("{{\"error\":\"{err}\"}}"))
    }
}
