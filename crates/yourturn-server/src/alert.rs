//! Local attention signals

use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, warn};
use yourturn_core::{Alert, Error, Result};

use crate::config::AlertConfig;

/// ASCII BEL on stderr
#[derive(Debug, Default)]
pub struct BellAlert;

impl Alert for BellAlert {
    fn alert(&self, _reason: &str) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        debug!("Rang terminal bell");
        Ok(())
    }
}

/// Runs a sound player without waiting for it
#[derive(Debug)]
pub struct CommandAlert {
    program: String,
    args: Vec<String>,
    fallback: Option<BellAlert>,
}

impl CommandAlert {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            fallback: None,
        }
    }

    /// Ring the bell when the command cannot be started
    pub fn with_bell_fallback(mut self) -> Self {
        self.fallback = Some(BellAlert);
        self
    }
}

impl Alert for CommandAlert {
    fn alert(&self, reason: &str) -> Result<()> {
        // tokio reaps the child in the background once the handle is dropped
        let spawned = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(_child) => {
                debug!("Started alert command {}", self.program);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start alert command {}: {}", self.program, e);
                match &self.fallback {
                    Some(bell) => bell.alert(reason),
                    None => Err(Error::Alert(format!("{}: {}", self.program, e))),
                }
            }
        }
    }
}

/// Build the configured alert, if any
pub fn build_alert(config: &AlertConfig) -> Option<Arc<dyn Alert>> {
    if let Some((program, args)) = config.command.as_deref().and_then(<[String]>::split_first) {
        let alert = CommandAlert::new(program.clone(), args.to_vec());
        let alert = if config.bell {
            alert.with_bell_fallback()
        } else {
            alert
        };
        return Some(Arc::new(alert));
    }

    if config.bell {
        Some(Arc::new(BellAlert))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_without_fallback_fails() {
        let alert = CommandAlert::new("yourturn-no-such-player", vec![]);
        let err = alert.alert("hello").unwrap_err();
        assert!(err.to_string().starts_with("Alert failed: yourturn-no-such-player"));
    }

    #[tokio::test]
    async fn test_missing_program_falls_back_to_bell() {
        let alert = CommandAlert::new("yourturn-no-such-player", vec![]).with_bell_fallback();
        assert!(alert.alert("hello").is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_is_not_awaited() {
        let alert = CommandAlert::new("sleep", vec!["5".to_string()]);
        let start = std::time::Instant::now();
        alert.alert("hello").unwrap();
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_build_alert_choices() {
        let none = AlertConfig {
            bell: false,
            command: None,
        };
        assert!(build_alert(&none).is_none());

        assert!(build_alert(&AlertConfig::default()).is_some());

        let command = AlertConfig {
            bell: false,
            command: Some(vec!["paplay".to_string(), "/tmp/ding.wav".to_string()]),
        };
        assert!(build_alert(&command).is_some());

        let empty_command = AlertConfig {
            bell: false,
            command: Some(vec![]),
        };
        assert!(build_alert(&empty_command).is_none());
    }
}
