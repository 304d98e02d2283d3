use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use bridge::{BridgeConfig, RuntimeConf, TOPIC};

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "bridge-server", about = "Публикация записей pipeline'а в брокер сообщений")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить bridge
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,

    /// JSON-lines файл с записями (по умолчанию stdin)
    #[arg(long, env = "BRIDGE_INPUT")]
    pub input: Option<String>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Destination по умолчанию (runtime `topic`).
    pub topic: Option<String>,
    /// Период tick-сигналов; 0 — без tick'ов.
    #[serde(default)]
    pub tick_interval_ms: u64,
    /// Ёмкость очереди input → processing thread.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    /// Сколько ждать обработки хвоста очереди при shutdown.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
}

#[derive(Debug, Deserialize)]
pub struct ProducerConfig {
    /// "memory" | "kafka"
    #[serde(default = "default_producer_kind")]
    pub kind: String,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            kind: default_producer_kind(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl ProducerConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

fn default_buffer() -> usize {
    8192
}
fn default_drain_timeout_ms() -> u64 {
    5000
}
fn default_producer_kind() -> String {
    "memory".into()
}
fn default_flush_timeout_ms() -> u64 {
    5000
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        self.bridge
            .validate()
            .map_err(|detail| ServerError::Config { context: "bridge", detail })?;
        if self.buffer == 0 {
            return Err(ServerError::Config { context: "buffer", detail: "must be > 0".into() });
        }
        match self.producer.kind.as_str() {
            "memory" => Ok(()),
            "kafka" if cfg!(feature = "kafka") => Ok(()),
            "kafka" => Err(ServerError::Config {
                context: "producer",
                detail: "kind 'kafka' requires the `kafka` feature".into(),
            }),
            other => Err(ServerError::Config {
                context: "producer",
                detail: format!("unknown kind '{other}'"),
            }),
        }
    }

    /// Runtime-конфиг для `start`: пока только `topic`.
    pub fn runtime_conf(&self) -> RuntimeConf {
        let mut conf = RuntimeConf::new();
        if let Some(topic) = &self.topic {
            conf.insert(TOPIC.to_string(), serde_json::Value::String(topic.clone()));
        }
        conf
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ServerConfig {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn full_config_parses() {
        let config = parse(
            r#"
            topic = "fallback"
            tick_interval_ms = 1000

            [bridge]
            name = "orders"
            topic_field = "route"
            async = false
            [bridge.producer_properties]
            "bootstrap.servers" = "localhost:9092"
            "linger.ms" = 5

            [producer]
            kind = "memory"
            "#,
        );
        config.validate().unwrap();

        assert_eq!(config.runtime_conf()[TOPIC], "fallback");
        assert_eq!(config.tick_interval(), Some(Duration::from_secs(1)));
        assert_eq!(config.buffer, 8192);
        assert_eq!(config.bridge.producer_properties()["linger.ms"], "5");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("");
        assert!(config.runtime_conf().is_empty());
        assert_eq!(config.tick_interval(), None);
        assert_eq!(config.producer.kind, "memory");
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_producer_kind_is_rejected() {
        let config = parse("[producer]\nkind = \"carrier-pigeon\"");
        assert!(matches!(config.validate(), Err(ServerError::Config { context: "producer", .. })));
    }

    #[test]
    fn bridge_validation_is_surfaced() {
        let config = parse("[bridge]\ntopic = \"a\"\ntopic_field = \"b\"");
        assert!(matches!(config.validate(), Err(ServerError::Config { context: "bridge", .. })));
    }
}
