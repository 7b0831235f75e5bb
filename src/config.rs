use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("PORT must be a number, got '{0}'")]
    InvalidPort(String),

    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Cannot resolve songs directory: {0}")]
    SongsDir(#[from] std::io::Error),
}

/// Process settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// Absolute path of the song library.
    pub songs_dir: PathBuf,
    /// Websocket endpoint override for the synthesis service.
    pub tts_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "8000".to_string());
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;

        let addr_str = format!("{}:{}", host, port);
        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(addr_str.clone()))?;

        let songs_dir = lookup("SONGS_DIR").unwrap_or_else(|| "songs".to_string());
        let songs_dir = std::path::absolute(songs_dir)?;

        let tts_endpoint = lookup("EDGE_TTS_ENDPOINT").filter(|s| !s.is_empty());

        Ok(Self {
            addr,
            songs_dir,
            tts_endpoint,
        })
    }
}
