//! Turns a server advertisement into a filtered, scored record

use std::sync::Arc;

use tracing::trace;

use crate::config::Tunables;

use super::blacklist::Blacklist;
use super::maps::{GameCategory, MapCatalog};
use super::options::{SearchOptions, TagPolicy};
use super::scoring::{
    passes_static_filter, passes_tag_filter, score_ping, score_server_population, ScoreCurve,
    FULL_SERVER_SCORE,
};
use super::server::{Rejections, ServerInfo, ServerRecord, ServerStatus};

const TAG_REGISTERED: &str = "_registered";

/// We always search as a party of one
const PARTY_SIZE: u32 = 1;

/// Filters and scores servers for one search
pub struct Evaluator {
    app_id: u32,
    category: GameCategory,
    tags: TagPolicy,
    ping_curve: ScoreCurve,
    tunables: Tunables,
    maps: Arc<dyn MapCatalog + Send + Sync>,
    blacklist: Arc<Blacklist>,
}

impl Evaluator {
    pub fn new(
        app_id: u32,
        options: &SearchOptions,
        tunables: Tunables,
        ping_curve: ScoreCurve,
        maps: Arc<dyn MapCatalog + Send + Sync>,
        blacklist: Arc<Blacklist>,
    ) -> Self {
        Self {
            app_id,
            category: options.category,
            tags: options.tag_policy(),
            ping_curve,
            tunables,
            maps,
            blacklist,
        }
    }

    pub fn tag_policy(&self) -> &TagPolicy {
        &self.tags
    }

    fn rejections_for(
        &self,
        server: &ServerInfo,
        tags: &[&str],
        map_legal: bool,
        blacklisted: bool,
    ) -> Rejections {
        let mut rejections = Rejections::empty();
        let bounds = self.tunables.min_bound_max_players..=self.tunables.max_bound_max_players;

        if !passes_static_filter(server, self.app_id, bounds) {
            rejections |= Rejections::FILTER;
        }
        if !passes_tag_filter(tags, &self.tags.required, &self.tags.rejected) {
            rejections |= Rejections::TAGS;
        }
        if !map_legal {
            rejections |= Rejections::MAP_NOT_ALLOWED;
        } else if self.category != GameCategory::Quickplay
            && self.maps.category_of(&server.map) != self.category
        {
            rejections |= Rejections::CATEGORY;
        }
        if server.players >= server.max_players {
            rejections |= Rejections::PLAYERS;
        }
        if blacklisted {
            rejections |= Rejections::BLACKLISTED;
        }
        rejections
    }

    /// Filter and score `server`. `recent_match_penalty` comes from the
    /// recently matched registry.
    pub fn evaluate(&self, server: ServerInfo, recent_match_penalty: f32) -> ServerRecord {
        let tags = server.tag_list();
        let registered = tags.iter().any(|tag| tag.eq_ignore_ascii_case(TAG_REGISTERED));
        let map_legal = self.maps.is_quickplay_legal(&server.map);
        let blacklisted = self.blacklist.is_blacklisted(&server.address);

        let mut rejections = self.rejections_for(&server, &tags, map_legal, blacklisted);

        let mut server_score = 0.0;
        if rejections.is_empty() {
            server_score = score_server_population(
                server.humans(),
                server.bots,
                server.max_players,
                PARTY_SIZE,
                &self.tunables,
            );
            if server_score <= FULL_SERVER_SCORE {
                rejections |= Rejections::NO_HEADROOM;
            }
        }

        let (user_score, server_score, status) = if rejections.is_empty() {
            let ping_score = score_ping(server.ping_ms as f32, &self.ping_curve);
            (
                ping_score - recent_match_penalty,
                server_score + self.tunables.population_score_offset,
                ServerStatus::Eligible,
            )
        } else {
            trace!(address = %server.address, ?rejections, "Server rejected");
            let failure = -(rejections.bits() as f32);
            (failure, failure, ServerStatus::Ineligible)
        };

        ServerRecord {
            info: server,
            registered,
            map_legal,
            blacklisted,
            recent_match_penalty,
            user_score,
            server_score,
            rejections,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::maps::StaticMapCatalog;
    use crate::matchmaking::server::ServerAccount;

    fn evaluator(options: &SearchOptions, blacklist: Blacklist) -> Evaluator {
        let tunables = Tunables::default();
        let curve = tunables.ping_curve().unwrap();
        Evaluator::new(
            620,
            options,
            tunables,
            curve,
            Arc::new(StaticMapCatalog::new(["p2coop_intro", "p3coop_triangle"])),
            Arc::new(blacklist),
        )
    }

    fn server() -> ServerInfo {
        ServerInfo {
            address: "10.0.0.1:27015".parse().unwrap(),
            name: "srv".into(),
            players: 19,
            bots: 0,
            max_players: 24,
            ping_ms: 0,
            map: "p2coop_intro".into(),
            tags: "2player,_registered".into(),
            password: false,
            account: ServerAccount::game_server(9),
            app_id: 620,
        }
    }

    #[test]
    fn good_server_is_scored() {
        let eval = evaluator(&SearchOptions::default(), Blacklist::new());
        let record = eval.evaluate(server(), 0.25);

        assert_eq!(record.status, ServerStatus::Eligible);
        assert!(record.registered);
        assert!((record.server_score - 7.5).abs() < 1e-4);
        assert!((record.user_score - 0.75).abs() < 1e-4);
        assert!((record.total_score() - 8.25).abs() < 1e-4);
    }

    #[test]
    fn rejections_accumulate_into_negative_scores() {
        let mut blacklist = Blacklist::new();
        blacklist.block_server("10.0.0.1:27015".parse().unwrap());
        let eval = evaluator(&SearchOptions::default(), blacklist);

        let mut info = server();
        info.password = true;
        info.tags = "noquickplay".into();
        let record = eval.evaluate(info, 0.0);

        let expected = Rejections::FILTER | Rejections::TAGS | Rejections::BLACKLISTED;
        assert_eq!(record.rejections, expected);
        assert_eq!(record.status, ServerStatus::Ineligible);
        assert_eq!(record.user_score, -(expected.bits() as f32));
        assert_eq!(record.server_score, record.user_score);
    }

    #[test]
    fn wrong_category_and_unknown_map() {
        let opts = SearchOptions {
            category: GameCategory::ThreePlayer,
            ..SearchOptions::default()
        };
        let eval = evaluator(&opts, Blacklist::new());

        let mut info = server();
        info.tags = "3player".into();
        assert_eq!(eval.evaluate(info.clone(), 0.0).rejections, Rejections::CATEGORY);

        info.map = "p3coop_unknown".into();
        assert_eq!(eval.evaluate(info, 0.0).rejections, Rejections::MAP_NOT_ALLOWED);
    }

    #[test]
    fn full_server_is_rejected() {
        let eval = evaluator(&SearchOptions::default(), Blacklist::new());
        let mut info = server();
        info.players = 24;
        assert!(eval.evaluate(info.clone(), 0.0).rejections.contains(Rejections::PLAYERS));

        info.players = 23;
        assert_eq!(eval.evaluate(info, 0.0).rejections, Rejections::NO_HEADROOM);
    }
}
