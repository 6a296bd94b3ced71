use thiserror::Error;

const TROUBLESHOOTING: &str = "see https://github.com/mobile-next/mobile-mcp/wiki/";

#[derive(Error, Debug)]
pub enum RobotError {
    /// The operator can fix the root cause; `hint` says how.
    #[error("{message}. {hint}")]
    Actionable { message: String, hint: String },

    #[error("{program} {} failed with exit code {}: {output}", .args.join(" "), exit_code(.code))]
    Command {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        output: String,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parsing failed: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Invalid image: {0}")]
    Png(String),
}

pub type Result<T> = std::result::Result<T, RobotError>;

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl RobotError {
    pub fn actionable(message: impl Into<String>, hint: impl Into<String>) -> Self {
        RobotError::Actionable {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        RobotError::actionable(
            format!("{} is not supported", what.into()),
            "Pick one of the supported values and try again",
        )
    }

    pub fn no_device_selected() -> Self {
        RobotError::actionable(
            "No device selected",
            "Select a device with use_device before issuing commands",
        )
    }

    pub fn tunnel_not_running() -> Self {
        RobotError::actionable(
            "iOS tunnel is not running",
            format!("Start it with 'ios tunnel start --userspace', {}", TROUBLESHOOTING),
        )
    }

    pub fn wda_forward_not_running() -> Self {
        RobotError::actionable(
            "Port forwarding to WebDriverAgent is not running (tunnel okay)",
            format!("Run 'ios forward 8100 8100', {}", TROUBLESHOOTING),
        )
    }

    pub fn wda_not_running(on: &str) -> Self {
        RobotError::actionable(
            format!("WebDriverAgent is not running on {}", on),
            format!("Launch the WebDriverAgentRunner test bundle, {}", TROUBLESHOOTING),
        )
    }

    pub fn invalid_screenshot() -> Self {
        RobotError::actionable(
            "Screenshot is invalid",
            "Please try again",
        )
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, RobotError::Actionable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_display_carries_hint() {
        let err = RobotError::tunnel_not_running();
        let text = err.to_string();
        assert!(text.starts_with("iOS tunnel is not running."));
        assert!(text.contains("ios tunnel start"));
        assert!(err.is_actionable());
    }

    #[test]
    fn test_command_display() {
        let err = RobotError::Command {
            program: "adb".to_string(),
            args: vec!["install".to_string(), "-r".to_string()],
            code: Some(1),
            output: "INSTALL_FAILED_OLDER_SDK".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "adb install -r failed with exit code 1: INSTALL_FAILED_OLDER_SDK"
        );
        assert!(!err.is_actionable());
    }
}
