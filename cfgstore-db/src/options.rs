//! Storage options
//!
//! Every field is optional; a zero duration disables the corresponding idle
//! timer or deadline. Durations are written in [`humantime`] form (`"50ms"`,
//! `"2s"`, `"1h30m"`) or as `"0"` in configuration files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backing table used when no name is configured
pub const DEFAULT_TABLE_NAME: &str = "core_config_data";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbStorageOptions {
    /// Overrides [`DEFAULT_TABLE_NAME`]
    pub table_name: Option<String>,

    /// Skip checking that the table exists at construction time
    pub skip_schema_validation: bool,

    /// Idle period before the read statement is closed
    #[serde(with = "duration")]
    pub idle_read: Duration,

    /// Idle period before the write statement is closed
    #[serde(with = "duration")]
    pub idle_write: Duration,

    /// Deadline for a single read
    #[serde(with = "duration")]
    pub context_timeout_read: Duration,

    /// Deadline for a single write
    #[serde(with = "duration")]
    pub context_timeout_write: Duration,
}

impl DbStorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective table name
    pub fn table_name(&self) -> &str {
        self.table_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn with_skip_schema_validation(mut self, skip: bool) -> Self {
        self.skip_schema_validation = skip;
        self
    }

    pub fn with_idle_read(mut self, idle: Duration) -> Self {
        self.idle_read = idle;
        self
    }

    pub fn with_idle_write(mut self, idle: Duration) -> Self {
        self.idle_write = idle;
        self
    }

    pub fn with_context_timeout_read(mut self, timeout: Duration) -> Self {
        self.context_timeout_read = timeout;
        self
    }

    pub fn with_context_timeout_write(mut self, timeout: Duration) -> Self {
        self.context_timeout_write = timeout;
        self
    }
}

/// Serde adapter for durations in configuration files.
///
/// Accepts anything [`humantime`] parses (`"50ms"`, `"2s"`, `"1h30m"`) plus a
/// bare `"0"` for "disabled".
pub mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        humantime_serde::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }

    pub fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("duration string is empty".to_string());
        }
        if text == "0" {
            return Ok(Duration::ZERO);
        }
        humantime::parse_duration(text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_everything() {
        let options = DbStorageOptions::default();
        assert_eq!(options.table_name(), DEFAULT_TABLE_NAME);
        assert!(!options.skip_schema_validation);
        assert!(options.idle_read.is_zero());
        assert!(options.context_timeout_write.is_zero());
    }

    #[test]
    fn empty_table_name_falls_back_to_default() {
        let options = DbStorageOptions::new().with_table_name("");
        assert_eq!(options.table_name(), DEFAULT_TABLE_NAME);
    }

    #[test]
    fn parses_toml() {
        let options: DbStorageOptions = toml::from_str(
            r#"
            table_name = "scoped_config"
            idle_read = "50ms"
            idle_write = "2m"
            context_timeout_read = "1s"
            "#,
        )
        .unwrap();

        assert_eq!(options.table_name(), "scoped_config");
        assert_eq!(options.idle_read, Duration::from_millis(50));
        assert_eq!(options.idle_write, Duration::from_secs(120));
        assert_eq!(options.context_timeout_read, Duration::from_secs(1));
        assert!(options.context_timeout_write.is_zero());
    }

    #[test]
    fn duration_parse() {
        assert_eq!(duration::parse(" 0 ").unwrap(), Duration::ZERO);
        assert_eq!(duration::parse("0s").unwrap(), Duration::ZERO);
        assert_eq!(duration::parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(duration::parse("250ms").unwrap(), Duration::from_millis(250));
        assert!(duration::parse("").is_err());
        assert!(duration::parse("50").is_err());
        assert!(duration::parse("5 fortnights").is_err());
    }

    #[test]
    fn oversized_duration_is_an_error() {
        assert!(duration::parse("9999999999999999999h").is_err());

        let result: Result<DbStorageOptions, _> = toml::from_str(r#"idle_read = "9999999999999999999h""#);
        assert!(result.is_err());
    }

    #[test]
    fn toml_round_trip_keeps_sub_millisecond_precision() {
        let options = DbStorageOptions::new()
            .with_idle_read(Duration::from_micros(1500))
            .with_context_timeout_write(Duration::from_secs(90));

        let text = toml::to_string(&options).unwrap();
        let back: DbStorageOptions = toml::from_str(&text).unwrap();
        assert_eq!(back, options);
    }
}
