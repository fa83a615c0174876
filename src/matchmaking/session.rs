//! Search session - the quickplay state machine
//!
//! A session walks through discovery, ranking and liveness pings:
//! - Discovering: collect and score servers from the list query until the
//!   "good enough" thresholds are met or the search times out
//! - AwaitingRanking: cut the best candidates and order them
//! - PingingCandidate: ping candidates best-first until one is still joinable
//! - SelectingInTerminalUI: let the player pick, pinging only their choice
//!
//! Sessions never block and never return errors. Every failure ends in a
//! terminal phase with a single [`SearchResult`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError, Tunables};
use crate::transport::{PingHandle, QueryHandle, SearchEvent, Transport};
use crate::util::time::{elapsed_fraction, Deadline};

use super::blacklist::Blacklist;
use super::catalog::ServerCatalog;
use super::evaluate::Evaluator;
use super::maps::MapCatalog;
use super::options::SearchOptions;
use super::presentation::{
    Connector, PingFailure, Presentation, RankedServer, SearchProgress, SearchResult,
};
use super::recent::SharedRegistry;
use super::scoring::{good_enough_thresholds, ScoreCurve};
use super::server::{Rejections, ServerInfo, ServerStatus};
use super::stats::{SearchStats, ServerSummary};

/// Everything a session needs from the process around it
#[derive(Clone)]
pub struct SearchContext {
    pub app_id: u32,
    pub game_dir: String,
    pub tunables: Tunables,
    ping_curve: ScoreCurve,
    pub maps: Arc<dyn MapCatalog + Send + Sync>,
    pub blacklist: Arc<Blacklist>,
    pub registry: SharedRegistry,
}

impl SearchContext {
    pub fn new(
        app_id: u32,
        game_dir: impl Into<String>,
        tunables: Tunables,
        maps: Arc<dyn MapCatalog + Send + Sync>,
        blacklist: Arc<Blacklist>,
        registry: SharedRegistry,
    ) -> Result<Self, ConfigError> {
        tunables.validate()?;
        let ping_curve = tunables.ping_curve()?;
        Ok(Self {
            app_id,
            game_dir: game_dir.into(),
            tunables,
            ping_curve,
            maps,
            blacklist,
            registry,
        })
    }

    pub fn from_config(
        config: &Config,
        maps: Arc<dyn MapCatalog + Send + Sync>,
        blacklist: Arc<Blacklist>,
        registry: SharedRegistry,
    ) -> Result<Self, ConfigError> {
        Self::new(
            config.app_id,
            config.game_dir.clone(),
            config.tunables.clone(),
            maps,
            blacklist,
            registry,
        )
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// Waiting on the server list
    Discovering,
    /// Discovery is over, candidates are ranked on the next tick
    AwaitingRanking,
    /// Looking for the best candidate that is still joinable
    PingingCandidate,
    /// Player wanted to see the options first
    SelectingInTerminalUI,
    Joined,
    Exhausted,
    Cancelled,
    /// Reached a state the session should never be in
    Faulted,
}

impl SearchPhase {
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Discovering
            | Self::AwaitingRanking
            | Self::PingingCandidate
            | Self::SelectingInTerminalUI => false,
            Self::Joined | Self::Exhausted | Self::Cancelled | Self::Faulted => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPing {
    handle: PingHandle,
    address: SocketAddr,
    deadline: Deadline,
}

/// One live matchmaking attempt
pub struct SearchSession<T, P, C> {
    id: Uuid,
    options: SearchOptions,
    tunables: Tunables,
    evaluator: Evaluator,
    registry: SharedRegistry,
    transport: T,
    presentation: P,
    connector: C,

    phase: SearchPhase,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    finished_at: Option<Instant>,
    result: Option<SearchResult>,

    catalog: ServerCatalog,
    /// Ranked addresses still worth trying
    join_queue: Vec<SocketAddr>,
    list_query: Option<QueryHandle>,
    ping: Option<PendingPing>,
}

impl<T, P, C> SearchSession<T, P, C>
where
    T: Transport,
    P: Presentation,
    C: Connector,
{
    /// Start a search by sending the server-list query
    pub fn start(
        context: &SearchContext,
        options: SearchOptions,
        mut transport: T,
        presentation: P,
        connector: C,
        now: Instant,
    ) -> Self {
        let id = Uuid::new_v4();
        let evaluator = Evaluator::new(
            context.app_id,
            &options,
            context.tunables.clone(),
            context.ping_curve,
            context.maps.clone(),
            context.blacklist.clone(),
        );
        let filters = options.list_filters(&context.game_dir, context.maps.as_ref());

        info!(
            session_id = %id,
            game_mode = options.category.label(),
            map = ?options.map_name,
            feeling_lucky = options.feeling_lucky,
            "Starting quickplay search"
        );
        debug!(
            session_id = %id,
            ?filters,
            tags = ?evaluator.tag_policy(),
            "Using server list filters"
        );

        let expired = context
            .registry
            .lock()
            .purge_expired(now, context.tunables.recent_match_cooldown());
        if expired > 0 {
            debug!(session_id = %id, expired, "Forgot expired recent matches");
        }

        let query = transport.begin_server_list_query(context.app_id, &filters);

        Self {
            id,
            options,
            tunables: context.tunables.clone(),
            evaluator,
            registry: context.registry.clone(),
            transport,
            presentation,
            connector,
            phase: SearchPhase::Discovering,
            started_at: now,
            started_wall: Utc::now(),
            finished_at: None,
            result: None,
            catalog: ServerCatalog::new(),
            join_queue: Vec::new(),
            list_query: Some(query),
            ping: None,
        }
    }

    /// Feed one event into the state machine
    pub fn handle(&mut self, event: SearchEvent, now: Instant) {
        if self.phase.is_terminal() {
            trace!(session_id = %self.id, ?event, "Ignoring event for finished search");
            return;
        }

        match event {
            SearchEvent::Tick => self.on_tick(now),
            SearchEvent::ServerFound { query, server } => {
                if self.is_current_query(query) {
                    self.on_server_found(server, now);
                } else {
                    trace!(session_id = %self.id, address = %server.address, "Stale server list response");
                }
            }
            SearchEvent::ServerFailedToRespond { query } => {
                trace!(session_id = %self.id, query = query.0, "Server failed to respond to list query");
            }
            SearchEvent::QueryComplete { query } => {
                if self.is_current_query(query) {
                    debug!(session_id = %self.id, servers = self.catalog.len(), "Server list query complete");
                    self.release_list_query();
                    self.check_discovery(now);
                }
            }
            SearchEvent::PingResponded { ping, server } => self.on_ping_response(ping, server, now),
            SearchEvent::PingTimedOut { ping } => {
                match self.ping.filter(|pending| pending.handle == ping) {
                    Some(pending) => {
                        self.ping = None;
                        self.ping_failed(pending, now);
                    }
                    None => debug!(session_id = %self.id, ping = ping.0, "Stale ping timeout"),
                }
            }
            SearchEvent::UserSelected(address) => self.on_user_selected(address, now),
            SearchEvent::UserCancelled => self.cancel(now),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.handle(SearchEvent::Tick, now);
    }

    /// Stop the search on behalf of the player
    pub fn cancel(&mut self, now: Instant) {
        if self.phase.is_terminal() {
            return;
        }
        info!(session_id = %self.id, phase = ?self.phase, "Quickplay search cancelled by user");
        self.finish(SearchPhase::Cancelled, SearchResult::UserCancelled, now);
    }

    fn on_tick(&mut self, now: Instant) {
        match self.phase {
            SearchPhase::Discovering => self.check_discovery(now),
            SearchPhase::AwaitingRanking => self.rank_candidates(now),
            SearchPhase::PingingCandidate | SearchPhase::SelectingInTerminalUI => {
                self.check_ping_timeout(now)
            }
            SearchPhase::Joined
            | SearchPhase::Exhausted
            | SearchPhase::Cancelled
            | SearchPhase::Faulted => {}
        }
    }

    fn is_current_query(&self, query: QueryHandle) -> bool {
        self.phase == SearchPhase::Discovering && self.list_query == Some(query)
    }

    fn recent_match_penalty(&self, address: SocketAddr, now: Instant) -> f32 {
        self.registry.lock().penalty_for(
            address,
            now,
            self.tunables.recent_match_cooldown(),
            self.tunables.recent_match_max_penalty,
        )
    }

    fn on_server_found(&mut self, server: ServerInfo, now: Instant) {
        if !server.has_routable_address() {
            warn!(session_id = %self.id, address = %server.address, "Ignoring server with bogus address");
            return;
        }
        if !server.account.is_valid_game_server() {
            debug!(
                session_id = %self.id,
                address = %server.address,
                account = ?server.account,
                "Ignoring gameserver with invalid account"
            );
            return;
        }

        let penalty = self.recent_match_penalty(server.address, now);
        let record = self.evaluator.evaluate(server, penalty);
        trace!(
            session_id = %self.id,
            address = %record.address(),
            status = ?record.status,
            score = record.total_score(),
            "Server responded"
        );
        if !self.catalog.upsert(record) {
            trace!(session_id = %self.id, "Replaced duplicate server response");
        }
    }

    fn report_progress(&mut self, fraction: f32) {
        let eligible = self.catalog.count_where(|r| r.is_eligible());
        self.presentation.on_progress(SearchProgress {
            fraction: fraction.clamp(0.0, 1.0),
            eligible,
            ineligible: self.catalog.len() - eligible,
        });
    }

    /// Decide whether discovery has gathered enough, and wrap it up if so
    fn check_discovery(&mut self, now: Instant) {
        let search_fraction = elapsed_fraction(self.started_at, now, self.tunables.max_search_time());

        if search_fraction > 1.0 && self.list_query.is_some() {
            info!(session_id = %self.id, "Quickplay search timed out, going with what we've found so far");
            self.release_list_query();
        }

        let min_score = self.tunables.min_candidate_score;
        let candidates: Vec<(SocketAddr, f32)> = self
            .catalog
            .rank(|r| r.total_score() > min_score)
            .iter()
            .map(|r| (r.address(), r.total_score()))
            .collect();

        if self.list_query.is_some() {
            let (score_lo, count_lo) = good_enough_thresholds(search_fraction, &self.tunables);
            let good_enough = candidates
                .iter()
                .take_while(|(_, score)| *score >= score_lo)
                .count();

            if (good_enough as f32) < count_lo.round() {
                let good_enough_fraction = good_enough as f32 / count_lo;
                self.report_progress(good_enough_fraction.max(search_fraction));
                return;
            }

            info!(
                session_id = %self.id,
                good_enough,
                score_threshold = score_lo,
                "Found enough good servers, ending discovery"
            );
            self.release_list_query();
        }

        self.report_progress(1.0);
        self.finish_discovery(candidates, now);
    }

    fn finish_discovery(&mut self, candidates: Vec<(SocketAddr, f32)>, now: Instant) {
        let to_score = candidates.len().min(self.tunables.max_candidates_to_score);
        info!(
            session_id = %self.id,
            search_secs = now.saturating_duration_since(self.started_at).as_secs_f32(),
            total = self.catalog.len(),
            above_threshold = candidates.len(),
            to_score,
            "Quickplay discovery finished"
        );
        self.trace_candidates(&candidates);

        if to_score == 0 {
            let result = if self.catalog.is_empty() {
                SearchResult::NoServersFound
            } else {
                SearchResult::NoServersMetCriteria
            };
            self.finish(SearchPhase::Exhausted, result, now);
            return;
        }

        for (address, _) in &candidates[..to_score] {
            if let Some(record) = self.catalog.get_mut(address) {
                record.advance(ServerStatus::RequestedScore);
            }
        }
        self.phase = SearchPhase::AwaitingRanking;
    }

    fn trace_candidates(&self, candidates: &[(SocketAddr, f32)]) {
        // Worst first, so the best end up at the bottom of the log
        for (address, _) in candidates.iter().rev() {
            if let Some(record) = self.catalog.get(address) {
                trace!(
                    session_id = %self.id,
                    name = %record.info.name,
                    address = %address,
                    humans = record.info.humans(),
                    max_players = record.info.max_players,
                    ping = record.info.ping_ms,
                    registered = record.registered,
                    recent_match_penalty = record.recent_match_penalty,
                    user_score = record.user_score,
                    server_score = record.server_score,
                    total_score = record.total_score(),
                    map = %record.info.map,
                    tags = %record.info.tags,
                    "Candidate"
                );
            }
        }
    }

    fn rank_candidates(&mut self, now: Instant) {
        let ranked: Vec<SocketAddr> = self
            .catalog
            .rank(|r| r.status >= ServerStatus::RequestedScore)
            .iter()
            .map(|r| r.address())
            .collect();
        for address in &ranked {
            if let Some(record) = self.catalog.get_mut(address) {
                record.advance(ServerStatus::Scored);
            }
        }
        debug!(session_id = %self.id, candidates = ranked.len(), "Using client-only scoring");
        self.join_queue = ranked;

        if !self.options.feeling_lucky {
            self.phase = SearchPhase::SelectingInTerminalUI;
            let list: Vec<RankedServer> = self
                .join_queue
                .iter()
                .filter_map(|address| self.catalog.get(address))
                .map(RankedServer::from)
                .collect();
            self.presentation.on_ranked_list(&list);
            if self.join_queue.is_empty() {
                self.finish(SearchPhase::Cancelled, SearchResult::UserCancelled, now);
            }
            return;
        }

        // If the first few all fail there is a bigger problem
        self.join_queue.truncate(self.tunables.max_join_attempts);
        self.phase = SearchPhase::PingingCandidate;
        self.ping_next_best(now);
    }

    fn ping_next_best(&mut self, now: Instant) {
        self.cancel_ping();
        if self.join_queue.is_empty() {
            info!(session_id = %self.id, "No more scored servers left to ping");
            self.finish(SearchPhase::Exhausted, SearchResult::FinalPingFailed, now);
            return;
        }
        let address = self.join_queue.remove(0);
        self.ping_server(address, now);
    }

    fn ping_server(&mut self, address: SocketAddr, now: Instant) {
        debug_assert!(self.list_query.is_none());
        self.cancel_ping();

        let Some(record) = self.catalog.get_mut(&address) else {
            self.fault(now, address, "Ping candidate is missing from the catalog");
            return;
        };
        if !record.advance(ServerStatus::Pinged) {
            warn!(session_id = %self.id, address = %address, status = ?record.status, "Pinging server out of order");
        }

        debug!(session_id = %self.id, address = %address, "Pinging");
        let handle = self.transport.ping_server(address);
        // It answered recently and we are about to join, so keep this short
        self.ping = Some(PendingPing {
            handle,
            address,
            deadline: Deadline::after(now, self.tunables.ping_timeout()),
        });
    }

    fn check_ping_timeout(&mut self, now: Instant) {
        let Some(pending) = self.ping else {
            return;
        };
        if pending.deadline.has_passed(now) {
            self.cancel_ping();
            self.ping_failed(pending, now);
        }
    }

    /// Mark the pinged record settled; false if it vanished from the catalog
    fn settle(&mut self, address: SocketAddr, status: ServerStatus, now: Instant) -> bool {
        match self.catalog.get_mut(&address) {
            Some(record) => {
                if !record.advance(status) {
                    warn!(session_id = %self.id, address = %address, from = ?record.status, to = ?status, "Unexpected status change");
                }
                true
            }
            None => {
                self.fault(now, address, "Pinged server is missing from the catalog");
                false
            }
        }
    }

    fn on_ping_response(&mut self, handle: PingHandle, server: ServerInfo, now: Instant) {
        let Some(pending) = self.ping.filter(|pending| pending.handle == handle) else {
            debug!(session_id = %self.id, address = %server.address, "Stale ping response");
            return;
        };
        if server.address != pending.address {
            warn!(
                session_id = %self.id,
                address = %server.address,
                expected = %pending.address,
                "Received unexpected server ping"
            );
            return;
        }
        self.ping = None;

        // Same filters as discovery, against the fresh response
        let penalty = self.recent_match_penalty(server.address, now);
        let refreshed = self.evaluator.evaluate(server, penalty);

        if refreshed.is_eligible() {
            if !self.settle(pending.address, ServerStatus::Connected, now) {
                return;
            }
            debug!(
                session_id = %self.id,
                address = %pending.address,
                score = refreshed.total_score(),
                "Reply ping, still joinable"
            );
            self.connect(pending.address, now);
            return;
        }

        if !self.settle(pending.address, ServerStatus::PingIneligible, now) {
            return;
        }
        debug!(
            session_id = %self.id,
            address = %pending.address,
            rejections = ?refreshed.rejections,
            "Reply ping, but no longer joinable"
        );
        if self.phase == SearchPhase::SelectingInTerminalUI {
            // No room for one more player reads as full to the player too
            let reason = if refreshed
                .rejections
                .intersects(Rejections::PLAYERS | Rejections::NO_HEADROOM)
            {
                PingFailure::Full
            } else {
                PingFailure::NoLongerMeetsCriteria
            };
            self.selection_failed(pending.address, reason, now);
        } else {
            self.ping_next_best(now);
        }
    }

    fn ping_failed(&mut self, pending: PendingPing, now: Instant) {
        debug!(session_id = %self.id, address = %pending.address, "Timeout waiting on ping reply");
        if !self.settle(pending.address, ServerStatus::PingTimedOut, now) {
            return;
        }
        if self.phase == SearchPhase::SelectingInTerminalUI {
            self.selection_failed(pending.address, PingFailure::Timeout, now);
        } else {
            self.ping_next_best(now);
        }
    }

    fn on_user_selected(&mut self, address: SocketAddr, now: Instant) {
        if self.phase != SearchPhase::SelectingInTerminalUI {
            debug!(session_id = %self.id, phase = ?self.phase, "Ignoring selection outside the server list");
            return;
        }
        if self.ping.is_some() {
            debug!(session_id = %self.id, "Already checking a selected server");
            return;
        }
        if !self.join_queue.contains(&address) {
            warn!(session_id = %self.id, address = %address, "Selected server is not in the list");
            return;
        }
        self.ping_server(address, now);
    }

    /// Drop a failed pick from the list; an empty list counts as a cancel
    fn selection_failed(&mut self, address: SocketAddr, reason: PingFailure, now: Instant) {
        self.join_queue.retain(|candidate| *candidate != address);
        self.presentation.on_candidate_removed(address, reason);
        if self.join_queue.is_empty() {
            info!(session_id = %self.id, "No servers left to choose from");
            self.finish(SearchPhase::Cancelled, SearchResult::UserCancelled, now);
        }
    }

    fn connect(&mut self, address: SocketAddr, now: Instant) {
        self.registry.lock().record_match(address, now);

        let command = format!("connect {} {}_0", address, self.options.connect_code());
        info!(session_id = %self.id, address = %address, "Quickplay connecting");
        self.connector.connect(address, &command);
        self.finish(SearchPhase::Joined, SearchResult::Connecting, now);
    }

    fn fault(&mut self, now: Instant, address: SocketAddr, what: &str) {
        error!(session_id = %self.id, address = %address, phase = ?self.phase, "{what}");
        self.finish(SearchPhase::Faulted, SearchResult::InternalError, now);
    }

    fn release_list_query(&mut self) {
        if let Some(query) = self.list_query.take() {
            self.transport.cancel_query(query);
        }
    }

    fn cancel_ping(&mut self) {
        if let Some(pending) = self.ping.take() {
            self.transport.cancel_ping(pending.handle);
        }
    }

    fn finish(&mut self, phase: SearchPhase, result: SearchResult, now: Instant) {
        self.release_list_query();
        self.cancel_ping();
        self.phase = phase;

        debug_assert!(self.result.is_none(), "search result delivered twice");
        if self.result.is_some() {
            return;
        }
        self.result = Some(result);
        self.finished_at = Some(now);
        self.presentation.on_result(result);

        let stats = self.stats(now);
        info!(
            session_id = %self.id,
            ?result,
            code = result.code(),
            search_secs = stats.search_secs,
            "Quickplay search finished"
        );
        debug!(session_id = %self.id, report = %stats.to_json(), "Quickplay search report");
    }

    pub fn stats(&self, now: Instant) -> SearchStats {
        let end = self.finished_at.unwrap_or(now);
        SearchStats {
            session_id: self.id,
            started_at: self.started_wall,
            user_game_mode: self.options.category.label().to_string(),
            search_secs: end.saturating_duration_since(self.started_at).as_secs_f32(),
            result: self.result,
            result_code: self.result.map(SearchResult::code),
            servers: self.catalog.iter().map(ServerSummary::from).collect(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn result(&self) -> Option<SearchResult> {
        self.result
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    /// Ranked candidates not yet tried (feeling lucky) or still listed
    pub fn join_queue(&self) -> &[SocketAddr] {
        &self.join_queue
    }

    pub fn current_ping_target(&self) -> Option<SocketAddr> {
        self.ping.map(|pending| pending.address)
    }

    pub fn has_list_query(&self) -> bool {
        self.list_query.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}
