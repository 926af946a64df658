use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite file holding every realm
    pub database_path: String,
    /// Realm name used to resolve the session
    pub realm: Option<String>,
    /// Email of the acting user
    pub user_email: Option<String>,
    /// Bound of the live store queue and of the change-feed buffer
    pub feed_capacity: usize,
    /// Used by `task list` and `board` when no query is given
    pub default_filters: Vec<String>,
    /// Width of the board timeline in days
    pub board_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "ptrack.db".to_string(),
            realm: None,
            user_email: None,
            feed_capacity: 256,
            default_filters: Vec::new(),
            board_days: 14,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("ptrack.toml"))
            .merge(Env::prefixed("PTRACK_"))
    }

    /// The default filters joined into one query.
    pub fn default_query(&self) -> String {
        self.default_filters.join(" and ")
    }
}
