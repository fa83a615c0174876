#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quickplay_client::config::Tunables;
use quickplay_client::matchmaking::options::ServerFilter;
use quickplay_client::matchmaking::server::ServerAccount;
use quickplay_client::matchmaking::{
    Blacklist, ConnectLog, PingFailure, Presentation, RankedServer, RecentMatchRegistry,
    SearchContext, SearchOptions, SearchProgress, SearchResult, SearchSession, ServerInfo,
    StaticMapCatalog,
};
use quickplay_client::transport::{PingHandle, QueryHandle, SearchEvent, Transport};

/// Transport that records every request and never answers on its own
#[derive(Debug, Default)]
pub struct RecordingTransport {
    next: u64,
    pub queries: Vec<(QueryHandle, u32, Vec<ServerFilter>)>,
    pub cancelled_queries: Vec<QueryHandle>,
    pub pings: Vec<(PingHandle, SocketAddr)>,
    pub cancelled_pings: Vec<PingHandle>,
}

impl RecordingTransport {
    fn next_id(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

impl Transport for RecordingTransport {
    fn begin_server_list_query(&mut self, app_id: u32, filters: &[ServerFilter]) -> QueryHandle {
        let handle = QueryHandle(self.next_id());
        self.queries.push((handle, app_id, filters.to_vec()));
        handle
    }

    fn cancel_query(&mut self, handle: QueryHandle) {
        self.cancelled_queries.push(handle);
    }

    fn ping_server(&mut self, address: SocketAddr) -> PingHandle {
        let handle = PingHandle(self.next_id());
        self.pings.push((handle, address));
        handle
    }

    fn cancel_ping(&mut self, handle: PingHandle) {
        self.cancelled_pings.push(handle);
    }
}

#[derive(Debug, Default)]
pub struct RecordingPresentation {
    pub progress: Vec<SearchProgress>,
    pub ranked: Vec<Vec<RankedServer>>,
    pub removed: Vec<(SocketAddr, PingFailure)>,
    pub results: Vec<SearchResult>,
}

impl Presentation for RecordingPresentation {
    fn on_progress(&mut self, progress: SearchProgress) {
        self.progress.push(progress);
    }

    fn on_ranked_list(&mut self, servers: &[RankedServer]) {
        self.ranked.push(servers.to_vec());
    }

    fn on_candidate_removed(&mut self, address: SocketAddr, reason: PingFailure) {
        self.removed.push((address, reason));
    }

    fn on_result(&mut self, result: SearchResult) {
        self.results.push(result);
    }
}

pub type Session = SearchSession<RecordingTransport, RecordingPresentation, ConnectLog>;

pub fn context_with(tunables: Tunables, blacklist: Blacklist) -> SearchContext {
    SearchContext::new(
        620,
        "portal2",
        tunables,
        Arc::new(StaticMapCatalog::new(["p2coop_intro", "p2coop_bridges", "p3coop_triangle"])),
        Arc::new(blacklist),
        RecentMatchRegistry::shared(),
    )
    .unwrap()
}

pub fn context() -> SearchContext {
    context_with(Tunables::default(), Blacklist::new())
}

pub fn addr(n: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, n], 27015))
}

/// A joinable two player server; 19/24 players scores at the population peak
pub fn server(n: u8, players: u32, max_players: u32, ping_ms: u32) -> ServerInfo {
    ServerInfo {
        address: addr(n),
        name: format!("server {n}"),
        players,
        bots: 0,
        max_players,
        ping_ms,
        map: "p2coop_intro".into(),
        tags: "2player".into(),
        password: false,
        account: ServerAccount::game_server(100 + n as u32),
        app_id: 620,
    }
}

pub fn start(ctx: &SearchContext, options: SearchOptions, now: Instant) -> Session {
    SearchSession::start(
        ctx,
        options,
        RecordingTransport::default(),
        RecordingPresentation::default(),
        ConnectLog::default(),
        now,
    )
}

pub fn list_query(session: &Session) -> QueryHandle {
    session.transport().queries[0].0
}

pub fn found(session: &mut Session, server: ServerInfo, now: Instant) {
    let query = list_query(session);
    session.handle(SearchEvent::ServerFound { query, server }, now);
}

pub fn complete(session: &mut Session, now: Instant) {
    let query = list_query(session);
    session.handle(SearchEvent::QueryComplete { query }, now);
}

pub fn last_ping(session: &Session) -> (PingHandle, SocketAddr) {
    *session.transport().pings.last().unwrap()
}

pub fn secs(secs: f32) -> Duration {
    Duration::from_secs_f32(secs)
}

pub fn lucky() -> SearchOptions {
    SearchOptions::default()
}

pub fn pick_from_list() -> SearchOptions {
    SearchOptions {
        feeling_lucky: false,
        ..SearchOptions::default()
    }
}
