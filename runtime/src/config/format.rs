//! Document formats understood by the store

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_json::{Map, Value};

use super::error::{ConfigError, ParseError};

/// Serialization format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Infer the format from the file extension.
    ///
    /// `.yml` and `.yaml` (any case) are YAML; everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yml") | Some("yaml") => Self::Yaml,
            _ => Self::Json,
        }
    }

    /// Parse a document into a tree whose root is a mapping
    pub fn parse(self, content: &str) -> Result<Value, ParseError> {
        let value = match self {
            Self::Json => serde_json::from_str::<Value>(content)?,
            Self::Yaml => {
                if content.trim().is_empty() {
                    return Ok(Value::Object(Map::new()));
                }
                yaml_to_json(serde_yaml::from_str::<serde_yaml::Value>(content)?)?
            }
        };

        match value {
            Value::Object(_) => Ok(value),
            // a document holding only comments or `~`
            Value::Null if self == Self::Yaml => Ok(Value::Object(Map::new())),
            other => Err(ParseError::NotAMapping(kind_name(&other))),
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

/// Convert a YAML tree, turning scalar mapping keys (`8080: web`) into strings
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, ParseError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                // non-finite floats have no JSON form and become null
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                map.insert(yaml_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_key(key: serde_yaml::Value) -> Result<String, ParseError> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        Yaml::Tagged(tagged) => yaml_key(tagged.value),
        Yaml::Sequence(_) => Err(ParseError::NonScalarKey("sequence")),
        Yaml::Mapping(_) => Err(ParseError::NonScalarKey("mapping")),
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/config.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("config.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("config.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config.toml")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }

    #[test]
    fn test_format_hint_parsing() {
        assert_eq!("JSON".parse::<ConfigFormat>().unwrap(), ConfigFormat::Json);
        assert_eq!("yml".parse::<ConfigFormat>().unwrap(), ConfigFormat::Yaml);

        let err = "toml".parse::<ConfigFormat>().unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_parse_yaml_nested() {
        let value = ConfigFormat::Yaml
            .parse("server:\n  host: 0.0.0.0\n  port: 8000\nflags: [a, b]\n")
            .unwrap();
        assert_eq!(value["server"]["port"], 8000);
        assert_eq!(value["flags"][1], "b");
    }

    #[test]
    fn test_yaml_scalar_keys_become_strings() {
        let value = ConfigFormat::Yaml
            .parse("ports:\n  8080: web\n  9090: metrics\ntrue: yes\n")
            .unwrap();
        assert_eq!(value["ports"]["8080"], "web");
        assert_eq!(value["ports"]["9090"], "metrics");
        assert_eq!(value["true"], "yes");

        let err = ConfigFormat::Yaml.parse("? [a, b]\n: value\n").unwrap_err();
        assert!(matches!(err, ParseError::NonScalarKey("sequence")));
    }

    #[test]
    fn test_empty_yaml_is_empty_mapping() {
        assert_eq!(ConfigFormat::Yaml.parse("").unwrap(), serde_json::json!({}));
        assert_eq!(ConfigFormat::Yaml.parse("  \n").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_truncated_json_is_rejected() {
        let err = ConfigFormat::Json.parse(r#"{"a": "#).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_non_mapping_root_is_rejected() {
        let err = ConfigFormat::Json.parse("[1, 2]").unwrap_err();
        assert!(matches!(err, ParseError::NotAMapping("sequence")));
    }
}
