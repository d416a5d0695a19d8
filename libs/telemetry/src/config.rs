use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            env::var(key).ok()
        })
    }

    pub fn from_lookup<F>(
        default_service_name: &str,
        default_service_version: &str,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name =
            lookup("SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());
        let service_version =
            lookup("SERVICE_VERSION").unwrap_or_else(|| default_service_version.to_string());
        let format = lookup("LOG_FORMAT")
            .map(|v| match v.to_lowercase().as_str() {
                "text" | "pretty" | "plain" => LogFormat::Text,
                _ => LogFormat::Json,
            })
            .unwrap_or(LogFormat::Json);
        let default_filter = lookup("LOG_LEVEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        Self {
            service_name,
            service_version,
            format,
            default_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_json_at_info() {
        let cfg = TelemetryConfig::from_lookup("wa-bridge", "0.1.0", |_| None);
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.default_filter, "info");
        assert_eq!(cfg.service_name, "wa-bridge");
        assert_eq!(cfg.service_version, "0.1.0");
    }

    #[test]
    fn text_format_and_level_overrides() {
        let cfg = TelemetryConfig::from_lookup("wa-bridge", "0.1.0", |key| match key {
            "LOG_FORMAT" => Some("Pretty".into()),
            "LOG_LEVEL" => Some("debug".into()),
            "SERVICE_NAME" => Some("bridge-laptop".into()),
            _ => None,
        });
        assert_eq!(cfg.format, LogFormat::Text);
        assert_eq!(cfg.default_filter, "debug");
        assert_eq!(cfg.service_name, "bridge-laptop");
    }
}
