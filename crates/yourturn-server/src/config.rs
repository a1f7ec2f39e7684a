use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use yourturn_session::{CollectorConfig, SessionConfig};
use yourturn_telegram::TelegramConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub tool: ToolConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the `your_turn` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Seconds to wait for a reply; zero or negative waits forever
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,

    /// Question sent to the human; `${reason}` is replaced by the tool argument
    #[serde(default = "default_question_template")]
    pub question_template: String,

    /// Appended to every tool result (may be empty)
    #[serde(default = "default_post_instructions")]
    pub post_instructions: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            question_template: default_question_template(),
            post_instructions: default_post_instructions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Ring the terminal bell
    #[serde(default = "default_true")]
    pub bell: bool,

    /// Sound player command, e.g. `["paplay", "/usr/share/sounds/bell.wav"]`
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            bell: default_true(),
            command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values given on the command line; they win over file and environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub timeout_secs: Option<i64>,
    pub log_level: Option<String>,
}

impl ServerConfig {
    /// Load from YAML, or TOML when the extension says so
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN")
            && !token.trim().is_empty()
        {
            self.telegram.bot_token = Some(token.trim().to_string());
        }

        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID")
            && !chat_id.trim().is_empty()
        {
            self.telegram.chat_id = Some(chat_id.trim().to_string());
        }

        if let Ok(val) = std::env::var("TELEGRAM_ENABLED") {
            self.telegram.enabled = parse_flag(&val);
        }

        if let Ok(level) = std::env::var("YOURTURN_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(val) = std::env::var("YOURTURN_TIMEOUT_SECS") {
            match val.trim().parse::<i64>() {
                Ok(secs) => self.tool.timeout_secs = secs,
                Err(_) => eprintln!(
                    "Warning: Invalid YOURTURN_TIMEOUT_SECS '{}', keeping {}",
                    val, self.tool.timeout_secs
                ),
            }
        }
    }

    /// Apply command-line values (highest precedence)
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(token) = overrides.telegram_token {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = overrides.telegram_chat_id {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(secs) = overrides.timeout_secs {
            self.tool.timeout_secs = secs;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Err(e) = self.sessions.validate() {
            bail!("Invalid sessions config: {}", e);
        }
        if self.tool.question_template.trim().is_empty() {
            bail!("tool.question_template must not be empty");
        }
        if let Some(command) = &self.alert.command
            && command.first().is_none_or(|program| program.trim().is_empty())
        {
            bail!("alert.command must name a program");
        }
        Ok(())
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(
        val.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

fn default_timeout_secs() -> i64 {
    300
}

fn default_question_template() -> String {
    "🔔 Notification: ${reason}\n\nPlease respond if you have any input, or I'll continue automatically."
        .to_string()
}

fn default_post_instructions() -> String {
    "It looks like the mission may not be entirely complete yet. Once it is, update the \
     project's context documentation with the tools and references you used, then write a \
     sharp prompt for a follow-up session: review what was accomplished honestly and plan \
     the quality improvements it needs."
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_VARS: [&str; 5] = [
        "TELEGRAM_BOT_TOKEN",
        "TELEGRAM_CHAT_ID",
        "TELEGRAM_ENABLED",
        "YOURTURN_LOG_LEVEL",
        "YOURTURN_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.tool.timeout_secs, 300);
        assert!(config.tool.question_template.contains("${reason}"));
        assert!(config.alert.bell);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sessions.poll_interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let file = write_config(
            ".yaml",
            r#"
sessions:
  poll_interval_ms: 250
  prewritten:
    - label: keep-going
      text: "No answer to '${message}', carrying on"
      default: true
tool:
  timeout_secs: 120
telegram:
  bot_token: "1:abc"
  chat_id: "42"
alert:
  command: ["paplay", "/tmp/ding.wav"]
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sessions.poll_interval_ms, 250);
        assert!(config.sessions.default_response().is_some());
        assert_eq!(config.tool.timeout_secs, 120);
        assert!(config.telegram.is_configured());
        assert_eq!(config.alert.command.as_deref().unwrap()[0], "paplay");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            r#"
[tool]
timeout_secs = 0
post_instructions = ""

[logging]
level = "debug"
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.tool.timeout_secs, 0);
        assert!(config.tool.post_instructions.is_empty());
        assert_eq!(config.logging.level, "debug");
        assert!(!config.telegram.is_configured());
    }

    #[test]
    fn test_load_reports_bad_file() {
        let file = write_config(".yaml", "tool: [not, a, map]");
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"));

        assert!(ServerConfig::from_file("/nonexistent/yourturn.yaml").is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_values() {
        clear_env();
        unsafe {
            std::env::set_var("TELEGRAM_BOT_TOKEN", "9:from-env");
            std::env::set_var("TELEGRAM_CHAT_ID", " 77 ");
            std::env::set_var("TELEGRAM_ENABLED", "off");
            std::env::set_var("YOURTURN_LOG_LEVEL", "warn");
            std::env::set_var("YOURTURN_TIMEOUT_SECS", "45");
        }

        let mut config = ServerConfig::default();
        config.telegram.bot_token = Some("1:from-file".to_string());
        config.merge_env();

        assert_eq!(config.telegram.bot_token.as_deref(), Some("9:from-env"));
        assert_eq!(config.telegram.chat_id.as_deref(), Some("77"));
        assert!(!config.telegram.enabled);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.tool.timeout_secs, 45);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_ignores_bad_values() {
        clear_env();
        unsafe {
            std::env::set_var("YOURTURN_TIMEOUT_SECS", "soon");
            std::env::set_var("TELEGRAM_BOT_TOKEN", "   ");
        }

        let mut config = ServerConfig::default();
        config.merge_env();
        assert_eq!(config.tool.timeout_secs, 300);
        assert!(config.telegram.bot_token.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_cli_wins_over_env() {
        clear_env();
        unsafe {
            std::env::set_var("TELEGRAM_CHAT_ID", "1");
            std::env::set_var("YOURTURN_TIMEOUT_SECS", "10");
        }

        let mut config = ServerConfig::default();
        config.merge_env();
        config.apply_overrides(Overrides {
            telegram_chat_id: Some("2".to_string()),
            timeout_secs: Some(-1),
            ..Default::default()
        });

        assert_eq!(config.telegram.chat_id.as_deref(), Some("2"));
        assert_eq!(config.tool.timeout_secs, -1);

        clear_env();
    }

    #[test]
    fn test_enabled_flag_spellings() {
        for on in ["true", "1", "YES", "on", "Enabled"] {
            assert!(parse_flag(on), "{} should enable", on);
        }
        for off in ["false", "0", "no", "", "maybe"] {
            assert!(!parse_flag(off), "{} should disable", off);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.sessions.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.alert.command = Some(vec![]);
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.tool.question_template = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
