//! Transport boundary: server-list queries, pings and the events they produce

pub mod simulated;

pub use simulated::SimulatedTransport;

use std::net::SocketAddr;

use crate::matchmaking::options::ServerFilter;
use crate::matchmaking::server::ServerInfo;

/// Handle of an outstanding server-list query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// Handle of an outstanding server ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PingHandle(pub u64);

/// Issues requests to the master server list and to individual servers.
/// Results come back later as [`SearchEvent`]s.
pub trait Transport {
    /// Enumerate servers running `app_id` that match `filters`
    fn begin_server_list_query(&mut self, app_id: u32, filters: &[ServerFilter]) -> QueryHandle;

    /// Release a query; no further events for it are wanted
    fn cancel_query(&mut self, handle: QueryHandle);

    fn ping_server(&mut self, address: SocketAddr) -> PingHandle;

    fn cancel_ping(&mut self, handle: PingHandle);
}

/// Everything that can drive a search session forward
#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// Periodic timer
    Tick,
    ServerFound {
        query: QueryHandle,
        server: ServerInfo,
    },
    ServerFailedToRespond {
        query: QueryHandle,
    },
    QueryComplete {
        query: QueryHandle,
    },
    PingResponded {
        ping: PingHandle,
        server: ServerInfo,
    },
    PingTimedOut {
        ping: PingHandle,
    },
    /// The player picked a server from the presented list
    UserSelected(SocketAddr),
    UserCancelled,
}
