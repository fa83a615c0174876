//! Search options and the filters/tags they translate into

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::maps::{GameCategory, MapCatalog};

/// Longest value the server-list protocol accepts in one filter pair
pub const MAX_FILTER_VALUE_LEN: usize = 255;

const TAG_NO_QUICKPLAY: &str = "noquickplay";
const TAG_INCREASED_MAXPLAYERS: &str = "increased_maxplayers";

/// Player preference for servers with raised player limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxPlayersPreference {
    /// Stock player limits only
    #[default]
    Default,
    /// Only servers with raised limits
    Increased,
    DontCare,
}

/// What the player asked quickplay to find
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub category: GameCategory,
    /// Restrict the search to one map
    pub map_name: Option<String>,
    pub max_players: MaxPlayersPreference,
    /// Join the best server automatically instead of listing candidates
    pub feeling_lucky: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            category: GameCategory::Quickplay,
            map_name: None,
            max_players: MaxPlayersPreference::Default,
            feeling_lucky: true,
        }
    }
}

/// Tags a server must and must not advertise
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPolicy {
    pub required: Vec<String>,
    pub rejected: Vec<String>,
}

/// One key/value pair of a server-list query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerFilter {
    pub key: String,
    pub value: String,
}

impl ServerFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl SearchOptions {
    fn map_override(&self) -> Option<&str> {
        self.map_name.as_deref().filter(|map| !map.is_empty())
    }

    pub fn tag_policy(&self) -> TagPolicy {
        let mut tags = TagPolicy::default();
        tags.rejected.push(TAG_NO_QUICKPLAY.to_string());

        match self.max_players {
            MaxPlayersPreference::Default => tags.rejected.push(TAG_INCREASED_MAXPLAYERS.to_string()),
            MaxPlayersPreference::Increased => tags.required.push(TAG_INCREASED_MAXPLAYERS.to_string()),
            MaxPlayersPreference::DontCare => {}
        }

        if self.map_override().is_none() {
            if let Some(tag) = self.category.required_tag() {
                tags.required.push(tag.to_string());
            }
        }
        tags
    }

    /// Filters sent with the server-list query
    pub fn list_filters(&self, game_dir: &str, maps: &dyn MapCatalog) -> Vec<ServerFilter> {
        let mut filters = vec![
            ServerFilter::new("gamedir", game_dir),
            // "full" = 1 asks for servers that are not full
            ServerFilter::new("full", "1"),
        ];

        if let Some(map) = self.map_override() {
            filters.push(ServerFilter::new("map", map));
        } else if self.category != GameCategory::Quickplay {
            let map_list = maps.maps_in(self.category).join(",");
            if map_list.len() <= MAX_FILTER_VALUE_LEN {
                filters.push(ServerFilter::new("map", map_list));
            } else {
                warn!(
                    category = ?self.category,
                    "Map list too long for this game mode, filtering client side only"
                );
            }
        }
        filters
    }

    /// Suffix of the connect command, telling the server how we got there
    pub fn connect_code(&self) -> &'static str {
        if self.feeling_lucky {
            "quickplay"
        } else {
            "quickpick"
        }
    }
}
