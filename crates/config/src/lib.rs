use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level application settings.
///
/// Loaded from `config/sereno.toml` (optional) with `SERENO_`-prefixed
/// environment overrides, e.g. `SERENO_GEMINI__API_KEY` or
/// `SERENO_SERVER__PORT`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub mongo: MongoSettings,
    #[serde(default)]
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    #[serde(default = "default_mongo_database")]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    /// API key for the Gemini Live endpoint. Required for broadcasting;
    /// viewers work without it.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Seconds to wait for the session handshake before giving up.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    /// Samples per frame sent to the speech session (at 16 kHz mono).
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSettings {
    /// Shared passphrase for the broadcaster role. An empty passphrase
    /// disables the broadcaster control plane entirely.
    #[serde(default)]
    pub passphrase: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_mongo_database() -> String {
    "sereno".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-native-audio-preview-12-2025".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_frame_samples() -> usize {
    4096
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            database: default_mongo_database(),
        }
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            frame_samples: default_frame_samples(),
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            passphrase: String::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            mongo: MongoSettings::default(),
            gemini: GeminiSettings::default(),
            audio: AudioSettings::default(),
            broadcast: BroadcastSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/sereno").required(false))
            .add_source(Environment::with_prefix("SERENO").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Socket address string the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.mongo.database, "sereno");
        assert_eq!(settings.gemini.connect_timeout_secs, 30);
        assert_eq!(settings.audio.frame_samples, 4096);
        assert!(settings.broadcast.passphrase.is_empty());
    }

    #[test]
    fn test_bind_addr() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8090");
    }
}
