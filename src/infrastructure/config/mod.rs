//! Configuration management

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;
use crate::domain::entities::is_channel_name;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub server: ServerConfig,
    /// Channels joined after registration and on rejoin
    pub channels: Vec<String>,
    /// Raw lines sent right after connecting
    pub commands: Vec<String>,
    pub storage: StorageConfig,
    pub modules: ModulesConfig,
    pub greeting: GreetingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub nick: String,
    pub realname: String,
    /// Nick allowed to run owner-only commands
    pub owner: Option<String>,
    pub command_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub flood: FloodConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FloodConfig {
    /// Lines that may be written back to back
    pub burst: u32,
    /// Time to refill one token
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModulesConfig {
    pub directory: PathBuf,
    pub auto_load: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GreetingConfig {
    pub say_online: bool,
    pub online_message: String,
    pub welcome_new: bool,
    /// `{nick}` and `{channel}` are substituted
    pub welcome_message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nick: "mirbot".to_string(),
            realname: "MIRbot".to_string(),
            owner: None,
            command_prefix: "!".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "irc.libera.chat".to_string(),
            port: 6667,
            password: None,
            connect_timeout_secs: 30,
            idle_timeout_secs: 300,
            flood: FloodConfig::default(),
        }
    }
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            burst: 5,
            interval_ms: 2000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mirbot.db"),
        }
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./modules"),
            auto_load: true,
        }
    }
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            say_online: false,
            online_message: "Hello! I am online.".to_string(),
            welcome_new: false,
            welcome_message: "Welcome to {channel}, {nick}!".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            server: ServerConfig::default(),
            channels: Vec::new(),
            commands: Vec::new(),
            storage: StorageConfig::default(),
            modules: ModulesConfig::default(),
            greeting: GreetingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl GreetingConfig {
    pub fn render_welcome(&self, nick: &str, channel: &str) -> String {
        self.welcome_message
            .replace("{nick}", nick)
            .replace("{channel}", channel)
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    pub fn load_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `MIRBOT_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay `MIRBOT_*` values from `lookup`. A value that does not parse is
    /// an error rather than silently ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(nick) = lookup("MIRBOT_NICK") {
            self.bot.nick = nick;
        }

        if let Some(owner) = lookup("MIRBOT_OWNER") {
            self.bot.owner = Some(owner);
        }

        if let Some(server) = lookup("MIRBOT_SERVER") {
            self.server.host = server;
        }

        if let Some(port) = lookup("MIRBOT_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("MIRBOT_PORT '{}'", port)))?;
        }

        if let Some(channels) = lookup("MIRBOT_CHANNELS") {
            self.channels = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Check the parts of the config the protocol is strict about
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::MissingField("server.host".to_string()));
        }

        let nick_re = Regex::new(r"^[A-Za-z\[\]\\`_^{|}][A-Za-z0-9\[\]\\`_^{|}-]{0,29}$")
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        if !nick_re.is_match(&self.bot.nick) {
            return Err(ConfigError::InvalidValue(format!("bot.nick '{}'", self.bot.nick)));
        }

        if self.bot.realname.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.realname".to_string()));
        }

        if self.bot.command_prefix.is_empty() {
            return Err(ConfigError::MissingField("bot.command-prefix".to_string()));
        }

        if let Some(bad) = self.channels.iter().find(|c| !is_channel_name(c)) {
            return Err(ConfigError::InvalidValue(format!("channel '{}'", bad)));
        }

        if let Some(bad) = self.commands.iter().find(|c| c.contains(['\r', '\n'])) {
            return Err(ConfigError::InvalidValue(format!("command '{}'", bad.escape_default())));
        }

        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("server.connect-timeout-secs must be > 0".to_string()));
        }

        if self.server.flood.burst == 0 {
            return Err(ConfigError::InvalidValue("server.flood.burst must be > 0".to_string()));
        }

        Ok(())
    }

    /// Whether a nick is the configured owner
    pub fn is_owner(&self, nick: &str) -> bool {
        self.bot
            .owner
            .as_deref()
            .map_or(false, |owner| crate::domain::entities::irc_eq(owner, nick))
    }
}
