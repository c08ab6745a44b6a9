use error::ConfigError;
use garnet_net::protocol::DEFAULT_SERVER_PORT;
use garnet_net::Role;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Either "server" or "client".
    pub role: String,
    /// IPv4 address of the server a client connects to. Not needed when
    /// `broadcast` is enabled.
    pub server_address: Option<String>,
    pub server_port: u16,
    /// Local port a client binds to; 0 lets the OS choose.
    pub client_port: u16,
    /// Client discovers the server by broadcasting connection requests.
    pub broadcast: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DemoConfig {
    /// Payload the harness keeps sending to every connected peer.
    pub payload: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            role: "server".to_string(),
            server_address: None,
            server_port: DEFAULT_SERVER_PORT,
            client_port: 0,
            broadcast: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            payload: "derp".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl Config {
    pub fn role(&self) -> Result<Role, ConfigError> {
        match self.network.role.as_str() {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            other => Err(ConfigError::Validation(format!(
                "unknown role '{other}'; expected 'server' or 'client'"
            ))),
        }
    }

    pub fn server_address(&self) -> Result<Option<Ipv4Addr>, ConfigError> {
        match &self.network.server_address {
            None => Ok(None),
            Some(address) => Ipv4Addr::from_str(address).map(Some).map_err(|_| {
                ConfigError::Validation(format!(
                    "invalid server address '{address}'; expected an IPv4 address like '192.168.1.2'"
                ))
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let role = self.role()?;
        self.server_address()?;

        if self.network.server_port == 0 {
            return Err(ConfigError::Validation(
                "server port must be non-zero".to_string(),
            ));
        }

        if role == Role::Client
            && self.network.server_address.is_none()
            && !self.network.broadcast
        {
            return Err(ConfigError::Validation(
                "a client needs a server address or broadcast enabled".to_string(),
            ));
        }

        if self.demo.payload.is_empty() {
            return Err(ConfigError::Validation(
                "demo payload cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Loads `config.toml` from the working directory, writing and returning the
/// defaults when the file does not exist yet.
pub fn handle() -> Result<Config, ConfigError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() {
        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, &config_path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_content = toml::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(config_content.as_bytes())?;
    Ok(())
}
