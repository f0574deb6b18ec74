use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = &value[1..value.len() - 1];
            }

            // Only set if not already set (env vars take precedence)
            if std::env::var(key).is_err() {
                // SAFETY: called from main before the runtime starts any other thread
                unsafe { std::env::set_var(key, value) };
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub client: ClientConfig,
    pub icd: IcdConfig,
    pub persistence: PersistenceConfig,
}

/// Server-side limits of the reporting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent one-shot read transactions.
    pub max_read_handlers: usize,
    /// Concurrent subscriptions across all peers.
    pub max_subscriptions: usize,
    /// Report chunks awaiting a status response, engine-wide.
    pub max_reports_in_flight: usize,
    /// Upper bound of one encoded ReportData message in bytes.
    pub max_message_size: usize,
    /// Synthesize the EventList global attribute on wildcard reads.
    pub event_list_enabled: bool,
    /// Events retained by the server-side event log.
    pub event_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_read_handlers: 4,
            max_subscriptions: 8,
            max_reports_in_flight: 4,
            max_message_size: 1200,
            event_list_enabled: true,
            event_log_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub max_clients: usize,
    /// Extra time granted past the negotiated max interval before a
    /// subscription is declared dead.
    pub liveness_grace_ms: u64,
    pub auto_resubscribe: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_clients: 8,
            liveness_grace_ms: 10_000,
            auto_resubscribe: true,
        }
    }
}

/// Intermittently connected device settings.
///
/// `idle_mode_duration_secs` mirrors the ICD Management IdleModeDuration
/// attribute; `None` means an always-on device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IcdConfig {
    pub idle_mode_duration_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub subscriptions_file: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            subscriptions_file: dirs::data_local_dir()
                .map(|dir| dir.join("matter-im-reporting").join("subscriptions.json")),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("IM_MAX_READ_HANDLERS")
            && let Ok(v) = value.parse()
        {
            config.engine.max_read_handlers = v;
        }
        if let Ok(value) = std::env::var("IM_MAX_SUBSCRIPTIONS")
            && let Ok(v) = value.parse()
        {
            config.engine.max_subscriptions = v;
        }
        if let Ok(value) = std::env::var("IM_MAX_REPORTS_IN_FLIGHT")
            && let Ok(v) = value.parse()
        {
            config.engine.max_reports_in_flight = v;
        }
        if let Ok(value) = std::env::var("IM_MAX_MESSAGE_SIZE")
            && let Ok(v) = value.parse()
        {
            config.engine.max_message_size = v;
        }
        if let Ok(value) = std::env::var("IM_EVENT_LIST")
            && let Ok(v) = value.parse()
        {
            config.engine.event_list_enabled = v;
        }
        if let Ok(value) = std::env::var("IM_EVENT_LOG_CAPACITY")
            && let Ok(v) = value.parse()
        {
            config.engine.event_log_capacity = v;
        }

        // Client configuration
        if let Ok(value) = std::env::var("IM_MAX_CLIENTS")
            && let Ok(v) = value.parse()
        {
            config.client.max_clients = v;
        }
        if let Ok(value) = std::env::var("IM_LIVENESS_GRACE_MS")
            && let Ok(v) = value.parse()
        {
            config.client.liveness_grace_ms = v;
        }
        if let Ok(value) = std::env::var("IM_AUTO_RESUBSCRIBE")
            && let Ok(v) = value.parse()
        {
            config.client.auto_resubscribe = v;
        }

        if let Ok(value) = std::env::var("ICD_IDLE_MODE_DURATION")
            && let Ok(v) = value.parse()
        {
            config.icd.idle_mode_duration_secs = Some(v);
        }

        if let Ok(path) = std::env::var("IM_SUBSCRIPTIONS_FILE") {
            config.persistence.subscriptions_file = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = Config::default();
        assert!(config.engine.max_reports_in_flight > 0);
        assert!(config.engine.max_message_size >= 256);
        assert!(config.icd.idle_mode_duration_secs.is_none());
        assert!(config.client.auto_resubscribe);
    }

    #[test]
    fn test_config_serializes() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.engine.max_subscriptions,
            config.engine.max_subscriptions
        );
    }
}
