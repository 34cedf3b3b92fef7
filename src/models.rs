use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, time::Duration};
use thiserror::Error;

/// Maximum number of hints a player can reveal for one country.
pub const MAX_HINTS: u8 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the country catalog is empty")]
    EmptyCatalog,

    #[error("country id '{0}' appears more than once in the catalog")]
    DuplicateId(String),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub country: Vec<Country>,

    #[serde(default)]
    pub game: GameConfig,

    #[serde(default)]
    pub map: MapConfig,
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Config, ConfigError> {
        Ok(toml::de::from_str(source)?)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub time_budget_secs: u32,
    pub advance_delay_ms: u64,
    pub feedback_clear_ms: u64,
    pub idle_timeout_secs: u64,
}

impl GameConfig {
    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    pub fn feedback_clear_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_clear_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            time_budget_secs: 240,
            advance_delay_ms: 1000,
            feedback_clear_ms: 2000,
            idle_timeout_secs: 30 * 60,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub geography_path: String,
    pub code_property: String,
}

impl Default for MapConfig {
    fn default() -> MapConfig {
        MapConfig {
            geography_path: "world-50m.json".into(),
            code_property: "ISO_A3".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Country {
    pub id: String,
    pub name: String,
    pub capital: String,
}

impl Country {
    pub fn new(id: &str, name: &str, capital: &str) -> Country {
        Country {
            id: id.into(),
            name: name.into(),
            capital: capital.into(),
        }
    }
}

/// The immutable list of countries a quiz draws from. Ids are unique.
#[derive(Clone, Debug)]
pub struct Catalog {
    countries: Vec<Country>,
}

impl Catalog {
    pub fn new(countries: Vec<Country>) -> Result<Catalog, ConfigError> {
        if countries.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        let mut seen = BTreeSet::new();
        for country in &countries {
            if !seen.insert(country.id.as_str()) {
                return Err(ConfigError::DuplicateId(country.id.clone()));
            }
        }

        Ok(Catalog { countries })
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn get(&self, id: &str) -> Option<&Country> {
        self.countries.iter().find(|country| country.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.countries.iter()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct SessionId(pub [u8; 16]);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let err = Catalog::new(vec![
            Country::new("FRA", "France", "Paris"),
            Country::new("FRA", "Francia", "Parigi"),
        ])
        .unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateId(id) if id == "FRA"));
    }

    #[test]
    fn catalog_rejects_empty_list() {
        assert!(matches!(
            Catalog::new(vec![]).unwrap_err(),
            ConfigError::EmptyCatalog
        ));
    }

    #[test]
    fn config_fills_in_defaults() {
        let config = Config::from_toml(
            r#"
            [[country]]
            id = "ISL"
            name = "Islande"
            capital = "Reykjavik"

            [game]
            time_budget_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.country.len(), 1);
        assert_eq!(config.game.time_budget_secs, 60);
        assert_eq!(config.game.advance_delay_ms, 1000);
        assert_eq!(config.game.feedback_clear_ms, 2000);
        assert_eq!(config.map.code_property, "ISO_A3");
    }

    #[test]
    fn shipped_config_is_a_valid_catalog() {
        let config = Config::from_toml(include_str!("../quiz.toml")).unwrap();
        let catalog = Catalog::new(config.country).unwrap();

        assert_eq!(catalog.len(), 46);
        assert_eq!(catalog.get("BIH").unwrap().name, "Bosnie-Herzégovine");
    }
}
