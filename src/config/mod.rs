//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::matchmaking::scoring::{CurveError, ScoreCurve};

/// Longest discovery phase accepted from configuration
const MAX_SEARCH_SECS_LIMIT: f32 = 3600.0;

/// Longest liveness ping timeout accepted from configuration
const PING_TIMEOUT_MS_LIMIT: u64 = 60_000;

/// Scoring and search tunables. Every value can be overridden through a
/// `QUICKPLAY_*` environment variable.
#[derive(Clone, Debug, Serialize)]
pub struct Tunables {
    /// Scoring considers a server full when this many slots are still open
    pub headroom_slots: u32,
    /// How long a quickplay join is remembered for the rejoin penalty
    pub recent_match_cooldown_secs: u64,
    /// Penalty applied right after a match, decaying linearly over the cooldown
    pub recent_match_max_penalty: f32,

    /// Ping curve data points (milliseconds) and their scores
    pub ping_a: f32,
    pub ping_a_score: f32,
    pub ping_b: f32,
    pub ping_b_score: f32,
    pub ping_c: f32,
    pub ping_c_score: f32,

    /// "Good enough" thresholds at the start and end of the search window
    pub good_enough_score_start: f32,
    pub good_enough_score_end: f32,
    pub good_enough_count_start: f32,
    pub good_enough_count_end: f32,

    /// Hard limit on the discovery phase
    pub max_search_secs: f32,
    /// Peak population score when a server is at its ideal fill
    pub max_population_score: f32,
    /// Offset added to every population score
    pub population_score_offset: f32,
    /// Number of best candidates carried into ranking
    pub max_candidates_to_score: usize,
    /// Feeling-lucky mode only pings this many candidates before giving up
    pub max_join_attempts: usize,
    /// Total score a server must exceed to be considered at all
    pub min_candidate_score: f32,

    /// Servers advertising fewer max players are never matched
    pub min_bound_max_players: u32,
    /// Servers advertising more max players are never matched
    pub max_bound_max_players: u32,

    pub ping_timeout_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            headroom_slots: 1,
            recent_match_cooldown_secs: 300,
            recent_match_max_penalty: 1.0,
            ping_a: 50.0,
            ping_a_score: 0.9,
            ping_b: 150.0,
            ping_b_score: 0.0,
            ping_c: 300.0,
            ping_c_score: -1.0,
            good_enough_score_start: 8.5,
            good_enough_score_end: 7.0,
            good_enough_count_start: 20.0,
            good_enough_count_end: 5.0,
            max_search_secs: 45.0,
            max_population_score: 1.5,
            population_score_offset: 6.0,
            max_candidates_to_score: 25,
            max_join_attempts: 5,
            min_candidate_score: 1.0,
            min_bound_max_players: 2,
            max_bound_max_players: 33,
            ping_timeout_ms: 1000,
        }
    }
}

impl Tunables {
    /// Read tunables from the environment, keeping defaults for unset values
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let tunables = Self {
            headroom_slots: parse_or("QUICKPLAY_HEADROOM_SLOTS", d.headroom_slots)?,
            recent_match_cooldown_secs: parse_or(
                "QUICKPLAY_RECENT_MATCH_COOLDOWN_SECS",
                d.recent_match_cooldown_secs,
            )?,
            recent_match_max_penalty: parse_or(
                "QUICKPLAY_RECENT_MATCH_MAX_PENALTY",
                d.recent_match_max_penalty,
            )?,
            ping_a: parse_or("QUICKPLAY_PING_A", d.ping_a)?,
            ping_a_score: parse_or("QUICKPLAY_PING_A_SCORE", d.ping_a_score)?,
            ping_b: parse_or("QUICKPLAY_PING_B", d.ping_b)?,
            ping_b_score: parse_or("QUICKPLAY_PING_B_SCORE", d.ping_b_score)?,
            ping_c: parse_or("QUICKPLAY_PING_C", d.ping_c)?,
            ping_c_score: parse_or("QUICKPLAY_PING_C_SCORE", d.ping_c_score)?,
            good_enough_score_start: parse_or(
                "QUICKPLAY_GOODENOUGH_SCORE_START",
                d.good_enough_score_start,
            )?,
            good_enough_score_end: parse_or(
                "QUICKPLAY_GOODENOUGH_SCORE_END",
                d.good_enough_score_end,
            )?,
            good_enough_count_start: parse_or(
                "QUICKPLAY_GOODENOUGH_COUNT_START",
                d.good_enough_count_start,
            )?,
            good_enough_count_end: parse_or(
                "QUICKPLAY_GOODENOUGH_COUNT_END",
                d.good_enough_count_end,
            )?,
            max_search_secs: parse_or("QUICKPLAY_MAX_SEARCH_SECS", d.max_search_secs)?,
            max_population_score: parse_or(
                "QUICKPLAY_MAX_POPULATION_SCORE",
                d.max_population_score,
            )?,
            population_score_offset: parse_or(
                "QUICKPLAY_POPULATION_SCORE_OFFSET",
                d.population_score_offset,
            )?,
            max_candidates_to_score: parse_or(
                "QUICKPLAY_MAX_CANDIDATES_TO_SCORE",
                d.max_candidates_to_score,
            )?,
            max_join_attempts: parse_or("QUICKPLAY_MAX_JOIN_ATTEMPTS", d.max_join_attempts)?,
            min_candidate_score: parse_or(
                "QUICKPLAY_MIN_CANDIDATE_SCORE",
                d.min_candidate_score,
            )?,
            min_bound_max_players: parse_or(
                "QUICKPLAY_MIN_BOUND_MAX_PLAYERS",
                d.min_bound_max_players,
            )?,
            max_bound_max_players: parse_or(
                "QUICKPLAY_MAX_BOUND_MAX_PLAYERS",
                d.max_bound_max_players,
            )?,
            ping_timeout_ms: parse_or("QUICKPLAY_PING_TIMEOUT_MS", d.ping_timeout_ms)?,
        };

        tunables.validate()?;
        Ok(tunables)
    }

    /// Reject tunables the scoring math cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ping_curve()?;
        if !(self.max_search_secs > 0.0 && self.max_search_secs <= MAX_SEARCH_SECS_LIMIT) {
            return Err(ConfigError::Invalid("QUICKPLAY_MAX_SEARCH_SECS"));
        }
        if self.ping_timeout_ms == 0 || self.ping_timeout_ms > PING_TIMEOUT_MS_LIMIT {
            return Err(ConfigError::Invalid("QUICKPLAY_PING_TIMEOUT_MS"));
        }
        if self.min_bound_max_players < 1 || self.min_bound_max_players > self.max_bound_max_players {
            return Err(ConfigError::Invalid("QUICKPLAY_MIN_BOUND_MAX_PLAYERS"));
        }
        if !(self.good_enough_count_start > 0.0 && self.good_enough_count_start.is_finite()) {
            return Err(ConfigError::Invalid("QUICKPLAY_GOODENOUGH_COUNT_START"));
        }
        if !(self.good_enough_count_end > 0.0 && self.good_enough_count_end <= self.good_enough_count_start) {
            return Err(ConfigError::Invalid("QUICKPLAY_GOODENOUGH_COUNT_END"));
        }
        // Thresholds only ever relax as the search runs
        if !(self.good_enough_score_start.is_finite() && self.good_enough_score_end.is_finite())
            || self.good_enough_score_start <= self.good_enough_score_end
        {
            return Err(ConfigError::Invalid("QUICKPLAY_GOODENOUGH_SCORE_END"));
        }
        Ok(())
    }

    /// The ping -> score curve described by the three ping data points
    pub fn ping_curve(&self) -> Result<ScoreCurve, CurveError> {
        ScoreCurve::new(
            [self.ping_a, self.ping_b, self.ping_c],
            [self.ping_a_score, self.ping_b_score, self.ping_c_score],
        )
    }

    pub fn recent_match_cooldown(&self) -> Duration {
        Duration::from_secs(self.recent_match_cooldown_secs)
    }

    pub fn max_search_time(&self) -> Duration {
        Duration::try_from_secs_f32(self.max_search_secs).unwrap_or(Duration::ZERO)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// App id every matched server must advertise
    pub app_id: u32,
    /// Game directory sent as the `gamedir` list filter
    pub game_dir: String,
    /// Optional JSON server blacklist
    pub blacklist_path: Option<PathBuf>,
    /// Maps quickplay is allowed to match to
    pub maps: Vec<String>,

    /// Seed for the simulated master server
    pub sim_seed: u64,
    /// Number of servers the simulated master server advertises
    pub sim_server_count: usize,

    pub tunables: Tunables,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            app_id: parse_or("QUICKPLAY_APP_ID", 620)?,
            game_dir: env::var("QUICKPLAY_GAME_DIR").unwrap_or_else(|_| "portal2".to_string()),
            blacklist_path: env::var("QUICKPLAY_BLACKLIST_PATH").ok().map(PathBuf::from),
            maps: env::var("QUICKPLAY_MAPS")
                .map(|list| split_list(&list))
                .unwrap_or_else(|_| DEFAULT_MAPS.iter().map(|m| m.to_string()).collect()),
            sim_seed: parse_or("QUICKPLAY_SIM_SEED", 0x5eed)?,
            sim_server_count: parse_or("QUICKPLAY_SIM_SERVER_COUNT", 60)?,
            tunables: Tunables::from_env()?,
        })
    }
}

/// Maps shipped with the game that quickplay may match to
pub const DEFAULT_MAPS: &[&str] = &[
    "p2coop_intro",
    "p2coop_bridges",
    "p2coop_catapults",
    "p2coop_lasers",
    "p3coop_intro",
    "p3coop_triangle",
    "rex2c_intro",
    "rex2c_relay",
];

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid ping curve: {0}")]
    Curve(#[from] CurveError),
}
