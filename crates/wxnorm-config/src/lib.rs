use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use wxnorm_core::{BoundaryKey, BoundaryRules, ObsolescenceLevel};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Append bucketed samples to the daily history table
    #[serde(default)]
    pub collect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObsolescenceConfig {
    #[serde(default)]
    pub level: ObsolescenceLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BoundaryOverride {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationOverride {
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    256
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub obsolescence: ObsolescenceConfig,
    /// Keyed by boundary key (`tempext`, `pressure`, ...)
    #[serde(default)]
    pub boundaries: BTreeMap<String, BoundaryOverride>,
    /// Keyed by station id
    #[serde(default)]
    pub stations: BTreeMap<String, StationOverride>,
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown boundary key: {0}")]
    UnknownBoundary(String),
    #[error("Boundary '{key}' has min {min} above max {max}")]
    InvertedBoundary { key: String, min: f64, max: f64 },
}

impl AppConfig {
    /// Load configuration from WXNORM_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("WXNORM_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&s)?
        } else {
            AppConfig::default()
        };
        cfg.boundary_rules()?;
        Ok(cfg)
    }

    /// Database URL; DATABASE_URL wins over the file
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.database.url.clone())
    }

    /// Get HTTP bind address (default 0.0.0.0:8080)
    pub fn http_bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
    }

    pub fn history_enabled(&self) -> bool {
        self.history.collect
    }

    pub fn obsolescence_level(&self) -> ObsolescenceLevel {
        self.obsolescence.level
    }

    /// Timezone configured for a station, if any
    pub fn station_timezone(&self, station_id: &str) -> Option<&str> {
        self.stations
            .get(station_id)
            .and_then(|s| s.timezone.as_deref())
            .filter(|tz| !tz.trim().is_empty())
    }

    /// Default ranges with the configured overrides applied
    pub fn boundary_rules(&self) -> Result<BoundaryRules, ConfigError> {
        let mut rules = BoundaryRules::default();
        for (name, over) in &self.boundaries {
            let key = name
                .parse::<BoundaryKey>()
                .map_err(|_| ConfigError::UnknownBoundary(name.clone()))?;
            rules = rules.with_override(key, over.min, over.max);

            let range = rules.get(key);
            if range.min > range.max {
                return Err(ConfigError::InvertedBoundary {
                    key: name.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_bind_is_8080() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.http_bind(), "0.0.0.0:8080");
        assert!(!cfg.history_enabled());
        assert_eq!(cfg.obsolescence_level(), ObsolescenceLevel::None);
        assert_eq!(cfg.ingest.workers, 4);
    }

    #[test]
    fn loads_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[database]
url = "mysql://wxnorm@localhost/wxnorm"

[history]
collect = true

[obsolescence]
level = "tight"

[boundaries.humext]
max = 110.0

[stations."70:ee:50:00:00:01"]
timezone = "Europe/Paris"

[server]
bind = "127.0.0.1:9000"

[ingest]
workers = 2
"#
        )
        .unwrap();

        let cfg = AppConfig::load_from(file.path()).unwrap();
        assert!(cfg.history_enabled());
        assert_eq!(cfg.obsolescence_level(), ObsolescenceLevel::Tight);
        assert_eq!(cfg.http_bind(), "127.0.0.1:9000");
        assert_eq!(cfg.ingest.workers, 2);
        assert_eq!(cfg.ingest.queue_depth, 256);
        assert_eq!(
            cfg.station_timezone("70:ee:50:00:00:01"),
            Some("Europe/Paris")
        );
        assert_eq!(cfg.station_timezone("other"), None);

        let rules = cfg.boundary_rules().unwrap();
        let hum = rules.get(BoundaryKey::HumExt);
        assert_eq!((hum.min, hum.max), (0.0, 110.0));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert!(cfg.boundaries.is_empty());
    }

    #[test]
    fn rejects_bad_boundaries() {
        let cfg: AppConfig = toml::from_str("[boundaries.bogus]\nmin = 1.0\n").unwrap();
        assert!(matches!(
            cfg.boundary_rules(),
            Err(ConfigError::UnknownBoundary(_))
        ));

        let cfg: AppConfig = toml::from_str("[boundaries.pressure]\nmin = 2000.0\n").unwrap();
        assert!(matches!(
            cfg.boundary_rules(),
            Err(ConfigError::InvertedBoundary { .. })
        ));
    }
}
