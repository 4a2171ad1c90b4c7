//! Runtime configuration from `ROBBIE_*` environment variables

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// JSON file with the studio's records; the demo studio is used without one
    pub seed_path: Option<PathBuf>,
    /// Base URL for gallery, download and payment links
    pub public_url: String,
    /// Show handler errors in fallback replies
    pub debug: bool,
    /// Inbox for escalations and support tickets
    pub support_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = var("ROBBIE_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".robbie").join("robbie.db")
            },
            PathBuf::from,
        );

        let port = var("ROBBIE_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let public_url =
            var("ROBBIE_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        let debug = var("ROBBIE_DEBUG")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"));

        Self {
            db_path,
            port,
            seed_path: var("ROBBIE_SEED_PATH").map(PathBuf::from),
            public_url,
            debug,
            support_email: var("ROBBIE_SUPPORT_EMAIL"),
        }
    }
}
