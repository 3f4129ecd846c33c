use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user: String,
    pub agent: String,
    pub at: DateTime<Utc>,
}

/// Exchanges of the current process, oldest first. Never persisted.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn record(&mut self, user: &str, agent: String) -> &Turn {
        self.turns.push(Turn {
            user: user.to_string(),
            agent,
            at: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}
