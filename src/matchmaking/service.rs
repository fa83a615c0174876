//! Quickplay service - drives search sessions on the tokio runtime

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::transport::{SearchEvent, Transport};

use super::options::SearchOptions;
use super::presentation::{Connector, Presentation};
use super::recent::SharedRegistry;
use super::session::{SearchContext, SearchSession};

/// Session tick period
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Runs searches one after another against a shared context.
/// The recent-match registry carries over between searches.
#[derive(Clone)]
pub struct QuickplayService {
    context: SearchContext,
}

impl QuickplayService {
    pub fn new(context: SearchContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.context.registry
    }

    /// Run one search to completion.
    ///
    /// `events` carries transport results and player input. The session is
    /// ticked every [`TICK_INTERVAL`] until it reaches a terminal phase, so
    /// a closed event channel still ends in a timeout result.
    pub async fn run_search<T, P, C>(
        &self,
        options: SearchOptions,
        transport: T,
        presentation: P,
        connector: C,
        mut events: mpsc::UnboundedReceiver<SearchEvent>,
    ) -> SearchSession<T, P, C>
    where
        T: Transport,
        P: Presentation,
        C: Connector,
    {
        let mut session = SearchSession::start(
            &self.context,
            options,
            transport,
            presentation,
            connector,
            Instant::now().into_std(),
        );

        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut events_open = true;

        while !session.is_finished() {
            tokio::select! {
                _ = interval.tick() => {
                    session.tick(Instant::now().into_std());
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => session.handle(event, Instant::now().into_std()),
                    None => {
                        debug!(session_id = %session.id(), "Search event channel closed");
                        events_open = false;
                    }
                },
            }
        }

        info!(
            session_id = %session.id(),
            phase = ?session.phase(),
            result = ?session.result(),
            "Search session closed"
        );
        session
    }
}
