//! In-process master server and game servers for local runs and tests.
//!
//! Replies are delivered from tokio tasks after a delay derived from each
//! server's ping, so a [`SimulatedTransport`] must be used inside a runtime.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::Config;
use crate::matchmaking::maps::{MapCatalog, StaticMapCatalog};
use crate::matchmaking::options::ServerFilter;
use crate::matchmaking::server::{ServerAccount, ServerInfo};

use super::{PingHandle, QueryHandle, SearchEvent, Transport};

const MAX_PLAYER_CHOICES: [u32; 4] = [8, 16, 24, 32];

/// A game server as the simulation sees it
#[derive(Debug, Clone)]
pub struct SimulatedServer {
    pub info: ServerInfo,
    /// Answers liveness pings
    pub responsive: bool,
    /// Fills up between the list response and the liveness ping
    pub fills_before_ping: bool,
}

impl SimulatedServer {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            responsive: true,
            fills_before_ping: false,
        }
    }
}

/// Generate `count` servers running `app_id` on a random pick of `maps`
pub fn generate_servers(seed: u64, count: usize, app_id: u32, maps: &[String]) -> Vec<SimulatedServer> {
    let catalog = StaticMapCatalog::new(maps.iter().cloned());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..count)
        .map(|i| {
            let max_players = MAX_PLAYER_CHOICES[rng.gen_range(0..MAX_PLAYER_CHOICES.len())];
            let players = rng.gen_range(0..=max_players);
            let bots = rng.gen_range(0..=players.min(2));
            let map = if maps.is_empty() {
                "p2coop_intro".to_string()
            } else {
                maps[rng.gen_range(0..maps.len())].clone()
            };

            let mut tags: Vec<&str> = catalog.category_of(&map).required_tag().into_iter().collect();
            if rng.gen_bool(0.5) {
                tags.push("_registered");
            }
            if rng.gen_bool(0.05) {
                tags.push("noquickplay");
            }

            let info = ServerInfo {
                address: SocketAddr::from(([10, 0, (i / 250) as u8, (i % 250 + 1) as u8], 27015)),
                name: format!("Simulated server #{i}"),
                players,
                bots,
                max_players,
                ping_ms: rng.gen_range(10..300),
                map,
                tags: tags.join(","),
                password: rng.gen_bool(0.05),
                account: ServerAccount::game_server(1000 + i as u32),
                app_id,
            };
            SimulatedServer {
                info,
                responsive: rng.gen_bool(0.9),
                fills_before_ping: rng.gen_bool(0.15),
            }
        })
        .collect()
}

fn matches_filters(info: &ServerInfo, app_id: u32, filters: &[ServerFilter]) -> bool {
    if info.app_id != app_id {
        return false;
    }
    filters.iter().all(|filter| match filter.key.as_str() {
        "full" => filter.value != "1" || info.players < info.max_players,
        "map" => filter
            .value
            .split(',')
            .any(|map| map.trim().eq_ignore_ascii_case(&info.map)),
        _ => true,
    })
}

fn reply_delay(ping_ms: u32, latency_scale: f32) -> Duration {
    Duration::from_secs_f32(ping_ms as f32 / 1000.0 * latency_scale.max(0.0))
}

/// Transport answering from a fixed set of [`SimulatedServer`]s
pub struct SimulatedTransport {
    servers: Vec<SimulatedServer>,
    events: mpsc::UnboundedSender<SearchEvent>,
    rng: ChaCha8Rng,
    next_handle: u64,
    /// Reply delay multiplier; 0.0 answers immediately
    latency_scale: f32,
    /// Chance a listed server never answers the list query
    drop_rate: f64,
    queries: HashMap<QueryHandle, JoinHandle<()>>,
    pings: HashMap<PingHandle, JoinHandle<()>>,
}

impl SimulatedTransport {
    pub fn new(servers: Vec<SimulatedServer>, seed: u64, events: mpsc::UnboundedSender<SearchEvent>) -> Self {
        Self {
            servers,
            events,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_handle: 1,
            latency_scale: 1.0,
            drop_rate: 0.0,
            queries: HashMap::new(),
            pings: HashMap::new(),
        }
    }

    /// Transport populated from the `QUICKPLAY_SIM_*` settings
    pub fn from_config(config: &Config, events: mpsc::UnboundedSender<SearchEvent>) -> Self {
        let servers = generate_servers(config.sim_seed, config.sim_server_count, config.app_id, &config.maps);
        Self::new(servers, config.sim_seed, events).with_drop_rate(0.03)
    }

    pub fn with_latency_scale(mut self, scale: f32) -> Self {
        self.latency_scale = scale;
        self
    }

    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn servers(&self) -> &[SimulatedServer] {
        &self.servers
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }
}

impl Transport for SimulatedTransport {
    fn begin_server_list_query(&mut self, app_id: u32, filters: &[ServerFilter]) -> QueryHandle {
        let query = QueryHandle(self.next_id());

        let mut replies: Vec<(Duration, SearchEvent)> = Vec::new();
        for server in self.servers.iter().filter(|s| matches_filters(&s.info, app_id, filters)) {
            let delay = reply_delay(server.info.ping_ms, self.latency_scale);
            let event = if self.rng.gen_bool(self.drop_rate) {
                SearchEvent::ServerFailedToRespond { query }
            } else {
                SearchEvent::ServerFound {
                    query,
                    server: server.info.clone(),
                }
            };
            replies.push((delay, event));
        }
        replies.sort_by_key(|(delay, _)| *delay);
        debug!(query = query.0, matching = replies.len(), total = self.servers.len(), "Simulated server list query");

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (delay, event) in replies {
                tokio::time::sleep_until(start + delay).await;
                if events.send(event).is_err() {
                    return;
                }
            }
            let _ = events.send(SearchEvent::QueryComplete { query });
        });
        self.queries.insert(query, task);
        query
    }

    fn cancel_query(&mut self, handle: QueryHandle) {
        if let Some(task) = self.queries.remove(&handle) {
            task.abort();
        }
    }

    fn ping_server(&mut self, address: SocketAddr) -> PingHandle {
        let ping = PingHandle(self.next_id());
        self.pings.retain(|_, task| !task.is_finished());

        let Some(server) = self.servers.iter().find(|s| s.info.address == address) else {
            debug!(address = %address, "Ping to unknown simulated server");
            return ping;
        };
        if !server.responsive {
            trace!(address = %address, "Simulated server ignores ping");
            return ping;
        }

        let mut info = server.info.clone();
        if server.fills_before_ping {
            info.players = info.max_players;
        }
        info.ping_ms += self.rng.gen_range(0..20);
        let delay = reply_delay(info.ping_ms, self.latency_scale);

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SearchEvent::PingResponded { ping, server: info });
        });
        self.pings.insert(ping, task);
        ping
    }

    fn cancel_ping(&mut self, handle: PingHandle) {
        if let Some(task) = self.pings.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        for task in self.queries.drain().map(|(_, t)| t).chain(self.pings.drain().map(|(_, t)| t)) {
            task.abort();
        }
    }
}
