use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, strum::EnumString, strum::Display, strum_macros::EnumIter)]
pub enum Environment {
    Production,
    Development,
}

/// Runtime configuration, resolved from `MEMODECK_*` environment variables
/// with per-environment defaults. Every recognized option is listed here;
/// anything else is hard-coded policy.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Directory holding one `user_<id>.anki2` per user plus the credential
    /// database.
    pub data_dir: PathBuf,
    pub listen_address: String,
    /// Idle time before a cached session is evicted.
    pub session_ttl: Duration,
    /// How often the registry sweeps for evictable sessions.
    pub sweep_interval: Duration,
    /// Attempts for the SQLITE_BUSY backoff loop.
    pub busy_retry_attempts: u32,
    /// Deflate level (0..=9) for `.apkg` export.
    pub export_zip_level: i64,
    /// Opaque; handed to the auth gate for token minting.
    pub secret_key: String,
}

impl ServerConfig {
    pub fn from_env(env: Environment) -> Self {
        let data_dir = std::env::var("MEMODECK_DATA_DIR").map_or_else(
            |_| {
                PathBuf::from(match env {
                    Environment::Production => "./memodeck-data",
                    Environment::Development => "./memodeck-data-dev",
                })
            },
            PathBuf::from,
        );
        let listen_address = std::env::var("MEMODECK_LISTEN_ADDRESS").unwrap_or_else(|_| {
            match env {
                Environment::Production => "127.0.0.1:8080".to_string(),
                Environment::Development => "127.0.0.1:8081".to_string(),
            }
        });
        Self {
            data_dir,
            listen_address,
            session_ttl: Duration::from_secs(env_u64("MEMODECK_SESSION_TTL_SECONDS", 300)),
            sweep_interval: Duration::from_secs(env_u64("MEMODECK_SWEEP_INTERVAL_SECONDS", 30)),
            busy_retry_attempts: env_u64("MEMODECK_BUSY_RETRY_ATTEMPTS", 5) as u32,
            export_zip_level: (env_u64("MEMODECK_EXPORT_ZIP_LEVEL", 6) as i64).clamp(0, 9),
            secret_key: std::env::var("MEMODECK_SECRET_KEY")
                .unwrap_or_else(|_| "memodeck-local-secret".to_string()),
        }
    }

    /// Path of one user's collection file.
    pub fn collection_path(&self, user_id: i64) -> PathBuf {
        self.data_dir.join(format!("user_{}.anki2", user_id))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
