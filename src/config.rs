use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogSettings;
use crate::services::curriculum::{GenerationSettings, DEFAULT_TIMEOUT};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub logging: LogSettings,
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub generation: GenerationSettings,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let logging = LogSettings {
            level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            file: env_bool("ENABLE_FILE_LOGS", false).then(|| {
                std::env::var("LOG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./logs"))
            }),
        };

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let timeout_ms = env_u64("GENERATION_TIMEOUT_MS", DEFAULT_TIMEOUT.as_millis() as u64);
        let generation = GenerationSettings {
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            serialize_per_profile: env_bool("GENERATION_SERIALIZE_PER_PROFILE", true),
        };

        Self {
            host,
            port,
            logging,
            database_url,
            db_max_connections: env_u32("DB_MAX_CONNECTIONS", 10),
            run_migrations: env_bool("RUN_MIGRATIONS", true),
            generation,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}
