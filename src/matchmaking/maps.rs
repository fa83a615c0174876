//! Game categories and the map lookup used by filtering

use serde::{Deserialize, Serialize};

/// Game mode a player asked quickplay to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameCategory {
    TwoPlayer,
    TwoPlayerRexaura,
    ThreePlayer,
    /// Any map in the rotation
    Quickplay,
}

impl GameCategory {
    /// Label used in stats reports
    pub fn label(self) -> &'static str {
        match self {
            Self::TwoPlayer => "2player",
            Self::TwoPlayerRexaura => "2player_rexaura",
            Self::ThreePlayer => "3player",
            Self::Quickplay => "(any)",
        }
    }

    /// Tag servers of this category must advertise
    pub fn required_tag(self) -> Option<&'static str> {
        match self {
            Self::TwoPlayer => Some("2player"),
            Self::TwoPlayerRexaura => Some("2player_rexaura"),
            Self::ThreePlayer => Some("3player"),
            Self::Quickplay => None,
        }
    }
}

/// Read-only map knowledge consumed by server filtering
pub trait MapCatalog {
    fn category_of(&self, map: &str) -> GameCategory;

    fn is_quickplay_legal(&self, map: &str) -> bool;

    /// Known maps belonging to `category`
    fn maps_in(&self, category: GameCategory) -> Vec<String>;
}

/// Map catalog backed by a fixed list of known maps
#[derive(Debug, Clone, Default)]
pub struct StaticMapCatalog {
    maps: Vec<String>,
}

impl StaticMapCatalog {
    pub fn new<I, S>(maps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            maps: maps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn maps(&self) -> &[String] {
        &self.maps
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

impl MapCatalog for StaticMapCatalog {
    fn category_of(&self, map: &str) -> GameCategory {
        if contains_ignore_case(map, "p2coop_") {
            GameCategory::TwoPlayer
        } else if contains_ignore_case(map, "p3coop_") {
            GameCategory::ThreePlayer
        } else if contains_ignore_case(map, "rex2c_") {
            GameCategory::TwoPlayerRexaura
        } else {
            GameCategory::TwoPlayer
        }
    }

    fn is_quickplay_legal(&self, map: &str) -> bool {
        self.maps.iter().any(|known| known.eq_ignore_ascii_case(map))
    }

    fn maps_in(&self, category: GameCategory) -> Vec<String> {
        self.maps
            .iter()
            .filter(|map| category == GameCategory::Quickplay || self.category_of(map) == category)
            .cloned()
            .collect()
    }
}
