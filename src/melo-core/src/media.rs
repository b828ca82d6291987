use serde::{Deserialize, Serialize};

/// A playable item: which player handles it and where it lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Media {
    pub player_id: String,
    pub uri: String,
}

impl Media {
    pub fn new(player_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            uri: uri.into(),
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}
