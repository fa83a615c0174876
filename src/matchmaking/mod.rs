//! Quickplay matchmaking: server discovery, scoring and joining

pub mod blacklist;
pub mod catalog;
pub mod evaluate;
pub mod maps;
pub mod options;
pub mod presentation;
pub mod recent;
pub mod scoring;
pub mod server;
pub mod service;
pub mod session;
pub mod stats;

pub use blacklist::{Blacklist, BlacklistError};
pub use catalog::ServerCatalog;
pub use maps::{GameCategory, MapCatalog, StaticMapCatalog};
pub use options::{MaxPlayersPreference, SearchOptions};
pub use presentation::{
    ConnectLog, Connector, LogPresentation, PingFailure, Presentation, RankedServer, SearchProgress,
    SearchResult,
};
pub use recent::{RecentMatchRegistry, SharedRegistry};
pub use server::{Rejections, ServerInfo, ServerRecord, ServerStatus};
pub use service::QuickplayService;
pub use session::{SearchContext, SearchPhase, SearchSession};
pub use stats::SearchStats;
