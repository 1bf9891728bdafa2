//! Processor configuration.

use crate::resolver::Direction;
use serde::{Deserialize, Deserializer};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

/// Where attributes are read from and written to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AttributeContext {
    Resource,
    Record,
}

impl FromStr for AttributeContext {
    type Err = LookupConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource" => Ok(AttributeContext::Resource),
            "record" => Ok(AttributeContext::Record),
            _ => Err(LookupConfigError::InvalidContext(s.to_owned())),
        }
    }
}

impl fmt::Display for AttributeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeContext::Resource => f.write_str("resource"),
            AttributeContext::Record => f.write_str("record"),
        }
    }
}

/// Settings for one lookup direction.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupConfig {
    pub enabled: bool,
    /// `"resource"` or `"record"`, checked by [`ProcessorConfig::validate`].
    pub context: String,
    /// Candidate source attributes, tried in order.
    pub attributes: Vec<String>,
    /// Attribute receiving the first resolved value.
    pub resolved_attribute: String,
}

impl LookupConfig {
    pub fn attribute_context(&self) -> Result<AttributeContext, LookupConfigError> {
        self.context.parse()
    }

    fn validate(&self) -> Result<(), LookupConfigError> {
        if self.attributes.is_empty() {
            return Err(LookupConfigError::NoAttributes);
        }
        if self.resolved_attribute.is_empty() {
            return Err(LookupConfigError::NoResolvedAttribute);
        }
        self.attribute_context().map(|_| ())
    }

    fn forward_default() -> Self {
        Self {
            enabled: true,
            context: AttributeContext::Resource.to_string(),
            attributes: vec!["host.name".to_string()],
            resolved_attribute: "host.ip".to_string(),
        }
    }

    fn reverse_default() -> Self {
        Self {
            enabled: false,
            context: AttributeContext::Resource.to_string(),
            attributes: vec!["client.ip".to_string()],
            resolved_attribute: "client.name".to_string(),
        }
    }
}

/// A `resolve`/`reverse` block as written in the file. Fields left out keep
/// the value of the direction's preset.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LookupOverrides {
    enabled: Option<bool>,
    context: Option<String>,
    attributes: Option<Vec<String>>,
    resolved_attribute: Option<String>,
}

impl LookupOverrides {
    fn apply(self, preset: LookupConfig) -> LookupConfig {
        LookupConfig {
            enabled: self.enabled.unwrap_or(preset.enabled),
            context: self.context.unwrap_or(preset.context),
            attributes: self.attributes.unwrap_or(preset.attributes),
            resolved_attribute: self.resolved_attribute.unwrap_or(preset.resolved_attribute),
        }
    }
}

fn forward_lookup<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LookupConfig, D::Error> {
    LookupOverrides::deserialize(deserializer).map(|o| o.apply(LookupConfig::forward_default()))
}

fn reverse_lookup<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LookupConfig, D::Error> {
    LookupOverrides::deserialize(deserializer).map(|o| o.apply(LookupConfig::reverse_default()))
}

/// Full processor configuration.
///
/// Signed and floating-point fields mirror the configuration file so that
/// out-of-range values reach [`validate`](Self::validate) rather than
/// failing deserialization with a less helpful message.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    #[serde(default = "LookupConfig::forward_default", deserialize_with = "forward_lookup")]
    pub resolve: LookupConfig,
    #[serde(default = "LookupConfig::reverse_default", deserialize_with = "reverse_lookup")]
    pub reverse: LookupConfig,
    pub hit_cache_size: i64,
    /// Seconds.
    pub hit_cache_ttl: i64,
    pub miss_cache_size: i64,
    /// Seconds.
    pub miss_cache_ttl: i64,
    pub max_retries: i64,
    /// Seconds, fractional allowed.
    pub timeout: f64,
    pub enable_system_resolver: bool,
    pub hostfiles: Vec<PathBuf>,
    pub nameservers: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            resolve: LookupConfig::forward_default(),
            reverse: LookupConfig::reverse_default(),
            hit_cache_size: 1000,
            hit_cache_ttl: 60,
            miss_cache_size: 1000,
            miss_cache_ttl: 5,
            max_retries: 2,
            timeout: 0.5,
            enable_system_resolver: true,
            hostfiles: Vec::new(),
            nameservers: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    /// Parses a JSON configuration document. Does not validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Parse)
    }

    /// Checks every rule and returns the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.resolve.enabled && !self.reverse.enabled {
            return Err(ConfigError::NoLookupEnabled);
        }

        for (direction, lookup) in [
            (Direction::Forward, &self.resolve),
            (Direction::Reverse, &self.reverse),
        ] {
            if lookup.enabled {
                lookup
                    .validate()
                    .map_err(|source| ConfigError::Lookup { direction, source })?;
            }
        }

        if self.hit_cache_size < 0 {
            return Err(ConfigError::Negative("hit_cache_size"));
        }
        if self.miss_cache_size < 0 {
            return Err(ConfigError::Negative("miss_cache_size"));
        }
        if self.hit_cache_ttl <= 0 {
            return Err(ConfigError::NotPositive("hit_cache_ttl"));
        }
        if self.miss_cache_ttl <= 0 {
            return Err(ConfigError::NotPositive("miss_cache_ttl"));
        }
        if self.max_retries < 0 {
            return Err(ConfigError::Negative("max_retries"));
        }
        // Also rejects NaN
        if !(self.timeout > 0.0) || !self.timeout.is_finite() {
            return Err(ConfigError::NotPositive("timeout"));
        }

        if !self.enable_system_resolver && self.hostfiles.is_empty() && self.nameservers.is_empty()
        {
            return Err(ConfigError::NoResolver);
        }

        Ok(())
    }

    pub fn hit_cache_capacity(&self) -> usize {
        usize::try_from(self.hit_cache_size).unwrap_or(0)
    }

    pub fn miss_cache_capacity(&self) -> usize {
        usize::try_from(self.miss_cache_size).unwrap_or(0)
    }

    pub fn hit_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.hit_cache_ttl.unsigned_abs())
    }

    pub fn miss_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.miss_cache_ttl.unsigned_abs())
    }

    pub fn max_retries(&self) -> usize {
        usize::try_from(self.max_retries).unwrap_or(0)
    }

    /// Positive timeouts too large for a `Duration` saturate.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout.max(0.0)).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Error)]
pub enum LookupConfigError {
    #[error("at least one attribute must be specified for DNS resolution")]
    NoAttributes,

    #[error("resolved_attribute must be specified for DNS resolution")]
    NoResolvedAttribute,

    #[error("context must be either 'resource' or 'record', got {0:?}")]
    InvalidContext(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("either forward (resolve) or reverse DNS lookup must be enabled")]
    NoLookupEnabled,

    #[error("{direction} configuration: {source}")]
    Lookup {
        direction: Direction,
        source: LookupConfigError,
    },

    #[error("{0} must be non-negative")]
    Negative(&'static str),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("at least one of enable_system_resolver, hostfiles, or nameservers must be specified")]
    NoResolver,

    #[error("invalid configuration: {0}")]
    Parse(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ProcessorConfig {
        ProcessorConfig {
            resolve: LookupConfig {
                enabled: true,
                context: "resource".to_string(),
                attributes: vec!["host.name".to_string()],
                resolved_attribute: "host.ip".to_string(),
            },
            reverse: LookupConfig {
                enabled: false,
                context: "resource".to_string(),
                attributes: vec!["client.ip".to_string()],
                resolved_attribute: "client.name".to_string(),
            },
            hit_cache_size: 1000,
            hit_cache_ttl: 60,
            miss_cache_size: 1000,
            miss_cache_ttl: 5,
            max_retries: 2,
            timeout: 0.5,
            enable_system_resolver: true,
            hostfiles: Vec::new(),
            nameservers: Vec::new(),
        }
    }

    fn enable_reverse_only(cfg: &mut ProcessorConfig) {
        cfg.resolve.enabled = false;
        cfg.reverse.enabled = true;
    }

    struct Case {
        name: &'static str,
        mutate: fn(&mut ProcessorConfig),
        expected: Option<&'static str>,
    }

    fn case(name: &'static str, mutate: fn(&mut ProcessorConfig), expected: Option<&'static str>) -> Case {
        Case {
            name,
            mutate,
            expected,
        }
    }

    #[test]
    fn validate() {
        let cases = [
            case("valid default configuration", |_| {}, None),
            case(
                "no enabled lookups",
                |cfg| {
                    cfg.resolve.enabled = false;
                    cfg.reverse.enabled = false;
                },
                Some("either forward (resolve) or reverse DNS lookup must be enabled"),
            ),
            case(
                "empty resolve attribute list",
                |cfg| cfg.resolve.attributes.clear(),
                Some("resolve configuration: at least one attribute must be specified for DNS resolution"),
            ),
            case(
                "empty reverse attribute list",
                |cfg| {
                    enable_reverse_only(cfg);
                    cfg.reverse.attributes.clear();
                },
                Some("reverse configuration: at least one attribute must be specified for DNS resolution"),
            ),
            case(
                "missing resolve resolved_attribute",
                |cfg| cfg.resolve.resolved_attribute.clear(),
                Some("resolve configuration: resolved_attribute must be specified for DNS resolution"),
            ),
            case(
                "missing reverse resolved_attribute",
                |cfg| {
                    enable_reverse_only(cfg);
                    cfg.reverse.resolved_attribute.clear();
                },
                Some("reverse configuration: resolved_attribute must be specified for DNS resolution"),
            ),
            case(
                "invalid resolve context",
                |cfg| cfg.resolve.context = "invalid".to_string(),
                Some("resolve configuration: context must be either 'resource' or 'record'"),
            ),
            case(
                "invalid reverse context",
                |cfg| {
                    enable_reverse_only(cfg);
                    cfg.reverse.context = "invalid".to_string();
                },
                Some("reverse configuration: context must be either 'resource' or 'record'"),
            ),
            case(
                "disabled direction is not checked",
                |cfg| {
                    cfg.reverse.attributes.clear();
                    cfg.reverse.context = "invalid".to_string();
                },
                None,
            ),
            case("zero timeout", |cfg| cfg.timeout = 0.0, Some("timeout must be positive")),
            case("negative timeout", |cfg| cfg.timeout = -1.0, Some("timeout must be positive")),
            case("NaN timeout", |cfg| cfg.timeout = f64::NAN, Some("timeout must be positive")),
            case(
                "negative max retries",
                |cfg| cfg.max_retries = -1,
                Some("max_retries must be non-negative"),
            ),
            case(
                "negative hit cache size",
                |cfg| cfg.hit_cache_size = -1,
                Some("hit_cache_size must be non-negative"),
            ),
            case(
                "negative miss cache size",
                |cfg| cfg.miss_cache_size = -1,
                Some("miss_cache_size must be non-negative"),
            ),
            case(
                "zero sized caches",
                |cfg| {
                    cfg.hit_cache_size = 0;
                    cfg.miss_cache_size = 0;
                },
                None,
            ),
            case("zero hit cache ttl", |cfg| cfg.hit_cache_ttl = 0, Some("hit_cache_ttl must be positive")),
            case("negative hit cache ttl", |cfg| cfg.hit_cache_ttl = -1, Some("hit_cache_ttl must be positive")),
            case("zero miss cache ttl", |cfg| cfg.miss_cache_ttl = 0, Some("miss_cache_ttl must be positive")),
            case("negative miss cache ttl", |cfg| cfg.miss_cache_ttl = -1, Some("miss_cache_ttl must be positive")),
            case(
                "no resolver configured",
                |cfg| {
                    cfg.enable_system_resolver = false;
                    cfg.hostfiles.clear();
                    cfg.nameservers.clear();
                },
                Some("at least one of enable_system_resolver, hostfiles, or nameservers must be specified"),
            ),
            case(
                "only hostfiles",
                |cfg| {
                    cfg.enable_system_resolver = false;
                    cfg.hostfiles = vec![PathBuf::from("/etc/hosts")];
                },
                None,
            ),
            case(
                "only nameservers",
                |cfg| {
                    cfg.enable_system_resolver = false;
                    cfg.nameservers = vec!["8.8.8.8".to_string()];
                },
                None,
            ),
        ];

        for Case {
            name,
            mutate,
            expected,
        } in cases
        {
            let mut cfg = valid_config();
            mutate(&mut cfg);

            match (cfg.validate(), expected) {
                (Ok(()), None) => {}
                (Err(err), Some(msg)) => {
                    assert!(err.to_string().contains(msg), "{name}: got {err}")
                }
                (result, expected) => panic!("{name}: expected {expected:?}, got {result:?}"),
            }
        }
    }

    #[test]
    fn partial_blocks_keep_direction_presets() {
        let cfg = ProcessorConfig::from_json(
            r#"{"resolve": {"context": "record"}, "reverse": {"enabled": true}}"#,
        )
        .unwrap();

        assert!(cfg.resolve.enabled);
        assert_eq!(cfg.resolve.attribute_context().unwrap(), AttributeContext::Record);
        assert_eq!(cfg.resolve.attributes, vec!["host.name"]);
        assert_eq!(cfg.resolve.resolved_attribute, "host.ip");

        assert!(cfg.reverse.enabled);
        assert_eq!(cfg.reverse.context, "resource");
        assert_eq!(cfg.reverse.attributes, vec!["client.ip"]);
        assert_eq!(cfg.reverse.resolved_attribute, "client.name");

        cfg.validate().unwrap();
    }

    #[test]
    fn explicit_empty_fields_are_kept() {
        let cfg =
            ProcessorConfig::from_json(r#"{"reverse": {"enabled": true, "attributes": []}}"#).unwrap();

        assert_eq!(
            cfg.validate().unwrap_err().to_string(),
            "reverse configuration: at least one attribute must be specified for DNS resolution"
        );
    }

    #[test]
    fn oversized_timeout_saturates() {
        let mut cfg = valid_config();
        cfg.timeout = 1e300;

        cfg.validate().unwrap();
        assert_eq!(cfg.timeout(), Duration::MAX);
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = ProcessorConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg, valid_config());
    }

    #[test]
    fn parses_json_with_defaults() {
        let cfg = ProcessorConfig::from_json(
            r#"{
                "reverse": {
                    "enabled": true,
                    "context": "record",
                    "attributes": ["client.address", "source.address"],
                    "resolved_attribute": "client.name"
                },
                "hit_cache_size": 0,
                "timeout": 1.5,
                "nameservers": ["1.1.1.1"]
            }"#,
        )
        .unwrap();

        cfg.validate().unwrap();
        assert!(cfg.resolve.enabled);
        assert_eq!(cfg.reverse.attribute_context().unwrap(), AttributeContext::Record);
        assert_eq!(cfg.reverse.attributes, vec!["client.address", "source.address"]);
        assert_eq!(cfg.hit_cache_capacity(), 0);
        assert_eq!(cfg.miss_cache_capacity(), 1000);
        assert_eq!(cfg.timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.miss_cache_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_context_is_left_to_validation() {
        let cfg = ProcessorConfig::from_json(r#"{"reverse": {"context": "invalid"}}"#).unwrap();
        cfg.validate().unwrap();

        let cfg = ProcessorConfig::from_json(r#"{"resolve": {"context": "invalid"}}"#).unwrap();
        assert_eq!(
            cfg.validate().unwrap_err().to_string(),
            r#"resolve configuration: context must be either 'resource' or 'record', got "invalid""#
        );
    }

    #[test]
    fn unknown_lookup_fields_are_rejected() {
        let err = ProcessorConfig::from_json(r#"{"resolve": {"attribute": "host.name"}}"#).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
