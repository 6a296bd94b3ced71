use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_WDA_PORT: u16 = 8100;
pub const DEFAULT_IOS_TUNNEL_PORT: u16 = 60105;
pub const DEFAULT_UIA2_HOST_PORT: u16 = 8200;
pub const DEFAULT_UIA2_DEVICE_PORT: u16 = 6790;
pub const DEFAULT_JPEG_QUALITY: u8 = 75;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How the UiAutomator2 `ignoreUnimportantViews` setting is applied around
/// page-source fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnimportantViews {
    /// Never touch the setting.
    #[default]
    Off,
    /// Enable for a single fetch, then restore.
    PerFetch,
    /// Enable once and leave it on for the session.
    Persistent,
}

impl FromStr for UnimportantViews {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "false" | "0" => Ok(UnimportantViews::Off),
            "per-fetch" | "per_fetch" => Ok(UnimportantViews::PerFetch),
            "persistent" | "on" | "true" | "1" => Ok(UnimportantViews::Persistent),
            other => Err(format!("unknown ignore-unimportant-views mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RobotConfig {
    pub adb_path: PathBuf,
    pub go_ios_path: PathBuf,
    pub wda_host: String,
    pub wda_port: u16,
    pub ios_tunnel_port: u16,
    pub uia2_enabled: bool,
    pub uia2_host_port: u16,
    pub uia2_device_port: u16,
    pub uia2_unimportant_views: UnimportantViews,
    pub screenshot_max_width: Option<u32>,
    pub jpeg_quality: u8,
    pub command_timeout: Duration,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            go_ios_path: PathBuf::from("ios"),
            wda_host: "localhost".to_string(),
            wda_port: DEFAULT_WDA_PORT,
            ios_tunnel_port: DEFAULT_IOS_TUNNEL_PORT,
            uia2_enabled: true,
            uia2_host_port: DEFAULT_UIA2_HOST_PORT,
            uia2_device_port: DEFAULT_UIA2_DEVICE_PORT,
            uia2_unimportant_views: UnimportantViews::Off,
            screenshot_max_width: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl RobotConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(home) = lookup("ANDROID_HOME").filter(|s| !s.is_empty()) {
            config.adb_path = PathBuf::from(home).join("platform-tools").join("adb");
        }
        if let Some(path) = lookup("GO_IOS_PATH").filter(|s| !s.is_empty()) {
            config.go_ios_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("MOBILE_WDA_HOST").filter(|s| !s.is_empty()) {
            config.wda_host = host;
        }

        config.wda_port = parse_or(&lookup, "MOBILE_WDA_PORT", config.wda_port);
        config.ios_tunnel_port = parse_or(&lookup, "MOBILE_IOS_TUNNEL_PORT", config.ios_tunnel_port);
        config.uia2_enabled = parse_bool_or(&lookup, "MOBILE_UIA2_ENABLED", config.uia2_enabled);
        config.uia2_host_port = parse_or(&lookup, "MOBILE_UIA2_HOST_PORT", config.uia2_host_port);
        config.uia2_device_port =
            parse_or(&lookup, "MOBILE_UIA2_DEVICE_PORT", config.uia2_device_port);
        config.uia2_unimportant_views = parse_or(
            &lookup,
            "MOBILE_UIA2_IGNORE_UNIMPORTANT_VIEWS",
            config.uia2_unimportant_views,
        );
        let quality: u32 = parse_or(&lookup, "MOBILE_JPEG_QUALITY", u32::from(config.jpeg_quality));
        config.jpeg_quality = quality.clamp(1, 100) as u8;

        if lookup("MOBILE_SCREENSHOT_MAX_WIDTH").is_some() {
            let width: u32 = parse_or(&lookup, "MOBILE_SCREENSHOT_MAX_WIDTH", 0);
            config.screenshot_max_width = (width > 0).then_some(width);
        }

        let timeout_secs = parse_or(
            &lookup,
            "MOBILE_COMMAND_TIMEOUT_SECS",
            config.command_timeout.as_secs(),
        );
        config.command_timeout = Duration::from_secs(timeout_secs.max(1));

        config
    }

    pub fn wda_base_url(&self) -> String {
        format!("http://{}:{}", self.wda_host, self.wda_port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        None => default,
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "1" || v == "true" || v == "yes" => true,
        Some(v) if v == "0" || v == "false" || v == "no" => false,
        Some(v) => {
            warn!("Ignoring invalid value {:?} for {}", v, key);
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> RobotConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RobotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.adb_path, PathBuf::from("adb"));
        assert_eq!(config.wda_base_url(), "http://localhost:8100");
        assert_eq!(config.uia2_host_port, 8200);
        assert_eq!(config.uia2_unimportant_views, UnimportantViews::Off);
        assert_eq!(config.screenshot_max_width, None);
        assert_eq!(config.jpeg_quality, 75);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ANDROID_HOME", "/opt/android"),
            ("MOBILE_WDA_PORT", "9100"),
            ("MOBILE_UIA2_ENABLED", "false"),
            ("MOBILE_UIA2_IGNORE_UNIMPORTANT_VIEWS", "per-fetch"),
            ("MOBILE_SCREENSHOT_MAX_WIDTH", "720"),
            ("MOBILE_JPEG_QUALITY", "500"),
        ]);
        assert_eq!(
            config.adb_path,
            PathBuf::from("/opt/android/platform-tools/adb")
        );
        assert_eq!(config.wda_port, 9100);
        assert!(!config.uia2_enabled);
        assert_eq!(config.uia2_unimportant_views, UnimportantViews::PerFetch);
        assert_eq!(config.screenshot_max_width, Some(720));
        assert_eq!(config.jpeg_quality, 100);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("MOBILE_WDA_PORT", "not-a-port"),
            ("MOBILE_COMMAND_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(config.wda_port, DEFAULT_WDA_PORT);
        assert_eq!(config.command_timeout, Duration::from_secs(1));
    }
}
