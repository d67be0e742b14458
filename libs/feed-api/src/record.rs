use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InvalidMatch;

// ════════════════════════════════════════════════════════════════
//  Team
// ════════════════════════════════════════════════════════════════

/// Участник матча. `id` уникален в пределах каталога лиг.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub stadium: String,
}

impl Team {
    pub fn new(id: u32, name: impl Into<String>, stadium: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            stadium: stadium.into(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Match
// ════════════════════════════════════════════════════════════════

/// Football match record: the unit published on the event topic.
///
/// Built once by the record factory and never mutated afterwards. The
/// consumer side decodes an equal-valued copy (`PartialEq`), not the same
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub home_team: Team,
    pub away_team: Team,
    /// Always the home team's stadium.
    pub stadium: String,
    pub round: u32,
    pub competition: String,
    pub country: String,
    pub kick_off: DateTime<Utc>,
}

impl Match {
    /// Message key: the textual UUID.
    pub fn key(&self) -> Vec<u8> {
        self.id.to_string().into_bytes()
    }

    /// Check the structural invariants that hold for every match regardless
    /// of catalog: distinct teams, home stadium, positive round.
    pub fn validate(&self) -> Result<(), InvalidMatch> {
        if self.home_team.id == self.away_team.id {
            return Err(InvalidMatch::SameTeam(self.home_team.id));
        }
        if self.stadium != self.home_team.stadium {
            return Err(InvalidMatch::Stadium {
                stadium: self.stadium.clone(),
                home: self.home_team.stadium.clone(),
            });
        }
        if self.round == 0 {
            return Err(InvalidMatch::Round(self.round));
        }
        Ok(())
    }
}
