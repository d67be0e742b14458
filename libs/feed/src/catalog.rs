use std::collections::{HashMap, HashSet};

use feed_api::Team;

// ═══════════════════════════════════════════════════════════════
//  League catalog
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct League {
    pub competition: String,
    pub country: String,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog has no leagues")]
    Empty,

    #[error("league '{0}' needs at least two teams")]
    Roster(String),

    #[error("league '{0}' has no country")]
    Country(String),

    #[error("competition '{0}' listed twice")]
    DuplicateCompetition(String),

    #[error("team id {0} used more than once")]
    DuplicateTeam(u32),
}

/// Immutable league → roster table, built and validated once at startup.
///
/// Construction guarantees what the record factory relies on: at least one
/// league, every roster has two or more teams, team ids are unique across
/// the catalog and each competition maps to exactly one country.
#[derive(Debug, Clone)]
pub struct Catalog {
    leagues: Vec<League>,
    by_competition: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(leagues: Vec<League>) -> Result<Self, CatalogError> {
        if leagues.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_competition = HashMap::with_capacity(leagues.len());
        let mut team_ids = HashSet::new();

        for (i, league) in leagues.iter().enumerate() {
            if league.teams.len() < 2 {
                return Err(CatalogError::Roster(league.competition.clone()));
            }
            if league.country.trim().is_empty() {
                return Err(CatalogError::Country(league.competition.clone()));
            }
            if by_competition.insert(league.competition.clone(), i).is_some() {
                return Err(CatalogError::DuplicateCompetition(league.competition.clone()));
            }
            for team in &league.teams {
                if !team_ids.insert(team.id) {
                    return Err(CatalogError::DuplicateTeam(team.id));
                }
            }
        }

        Ok(Self { leagues, by_competition })
    }

    /// Built-in football catalog.
    pub fn football() -> Result<Self, CatalogError> {
        let mut next_id = 1u32;
        let leagues = FOOTBALL
            .iter()
            .map(|(competition, country, teams)| League {
                competition: competition.to_string(),
                country: country.to_string(),
                teams: teams
                    .iter()
                    .map(|(name, stadium)| {
                        let team = Team::new(next_id, *name, *stadium);
                        next_id += 1;
                        team
                    })
                    .collect(),
            })
            .collect();
        Self::new(leagues)
    }

    pub fn leagues(&self) -> &[League] {
        &self.leagues
    }

    pub fn league(&self, competition: &str) -> Option<&League> {
        self.by_competition.get(competition).map(|&i| &self.leagues[i])
    }

    pub fn country_of(&self, competition: &str) -> Option<&str> {
        self.league(competition).map(|l| l.country.as_str())
    }

    pub fn roster_size(&self, competition: &str) -> Option<usize> {
        self.league(competition).map(|l| l.teams.len())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Built-in data
// ═══════════════════════════════════════════════════════════════

type LeagueRow = (&'static str, &'static str, &'static [(&'static str, &'static str)]);

const FOOTBALL: &[LeagueRow] = &[
    (
        "Premier League",
        "England",
        &[
            ("Arsenal", "Emirates Stadium"),
            ("Chelsea", "Stamford Bridge"),
            ("Liverpool", "Anfield"),
            ("Manchester City", "Etihad Stadium"),
            ("Manchester United", "Old Trafford"),
            ("Tottenham Hotspur", "Tottenham Hotspur Stadium"),
            ("Newcastle United", "St James' Park"),
            ("Aston Villa", "Villa Park"),
        ],
    ),
    (
        "La Liga",
        "Spain",
        &[
            ("Real Madrid", "Santiago Bernabeu"),
            ("Barcelona", "Camp Nou"),
            ("Atletico Madrid", "Metropolitano"),
            ("Sevilla", "Ramon Sanchez-Pizjuan"),
            ("Real Sociedad", "Anoeta"),
            ("Villarreal", "Estadio de la Ceramica"),
        ],
    ),
    (
        "Serie A",
        "Italy",
        &[
            ("Juventus", "Allianz Stadium"),
            ("Inter", "San Siro"),
            ("Napoli", "Stadio Diego Armando Maradona"),
            ("Roma", "Stadio Olimpico"),
            ("Atalanta", "Gewiss Stadium"),
            ("Fiorentina", "Stadio Artemio Franchi"),
        ],
    ),
    (
        "Bundesliga",
        "Germany",
        &[
            ("Bayern Munich", "Allianz Arena"),
            ("Borussia Dortmund", "Signal Iduna Park"),
            ("RB Leipzig", "Red Bull Arena"),
            ("Bayer Leverkusen", "BayArena"),
            ("Eintracht Frankfurt", "Deutsche Bank Park"),
            ("VfB Stuttgart", "MHPArena"),
        ],
    ),
    (
        "Ligue 1",
        "France",
        &[
            ("Paris Saint-Germain", "Parc des Princes"),
            ("Marseille", "Orange Velodrome"),
            ("Lyon", "Groupama Stadium"),
            ("Monaco", "Stade Louis II"),
            ("Lille", "Stade Pierre-Mauroy"),
        ],
    ),
    (
        "A-League",
        "Australia",
        &[
            ("Melbourne Victory", "AAMI Park"),
            ("Sydney FC", "Allianz Stadium Sydney"),
            ("Western Sydney Wanderers", "CommBank Stadium"),
            ("Brisbane Roar", "Suncorp Stadium"),
        ],
    ),
];
