use serde::{Deserialize, Serialize};

use crate::core::Author;

/// Avatar shown when none has been configured
pub const DEFAULT_AVATAR: &str = "assets/img/avatar-default.svg";

/// One side of the simulated conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
}

impl Participant {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
        }
    }

    pub fn has_custom_avatar(&self) -> bool {
        !self.avatar.is_empty() && !self.avatar.ends_with("avatar-default.svg")
    }
}

fn default_avatar() -> String {
    DEFAULT_AVATAR.to_string()
}

/// The two participants, keyed `1` (local) and `2` (remote) on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participants {
    #[serde(rename = "1")]
    pub local: Participant,
    #[serde(rename = "2")]
    pub remote: Participant,
}

impl Participants {
    pub fn get(&self, author: Author) -> &Participant {
        match author {
            Author::Local => &self.local,
            Author::Remote => &self.remote,
        }
    }

    pub fn get_mut(&mut self, author: Author) -> &mut Participant {
        match author {
            Author::Local => &mut self.local,
            Author::Remote => &mut self.remote,
        }
    }
}

impl Default for Participants {
    fn default() -> Self {
        Self {
            local: Participant::new("You"),
            remote: Participant::new("Contact"),
        }
    }
}
