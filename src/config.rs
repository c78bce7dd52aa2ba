use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address
    pub bind_addr: String,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Path to the append-only file
    pub aof_path: PathBuf,

    /// Size of the scratch buffer used for each socket read
    pub read_buffer_size: usize,

    /// TCP nodelay
    pub tcp_nodelay: bool,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 3490,
            aof_path: PathBuf::from("database.aof"),
            read_buffer_size: 16 * 1024, // 16KB
            tcp_nodelay: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use miniredis::Config;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::from_file("miniredis.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.aof_path.as_os_str().is_empty() {
            anyhow::bail!("aof_path must not be empty");
        }

        if self.read_buffer_size < 512 {
            anyhow::bail!("read_buffer_size must be >= 512");
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            );
        }

        Ok(())
    }

    /// `host:port` string handed to address resolution
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "127.0.0.1:3490");
    }

    #[test]
    fn rejects_small_read_buffer() {
        let config = Config {
            read_buffer_size: 64,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miniredis.toml");

        let config = Config {
            port: 7000,
            aof_path: PathBuf::from("/var/lib/miniredis/appendonly.aof"),
            tcp_nodelay: false,
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.port, 7000);
        assert_eq!(loaded.aof_path, config.aof_path);
        assert!(!loaded.tcp_nodelay);
        assert_eq!(loaded.bind_addr, "127.0.0.1");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("port = 6380\n").unwrap();
        assert_eq!(config.port, 6380);
        assert_eq!(config.aof_path, PathBuf::from("database.aof"));
        assert_eq!(config.read_buffer_size, 16 * 1024);
    }
}
