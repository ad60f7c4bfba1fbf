//! Metadata decoders and the delimiter → decoder registry.
//!
//! A [`MetadataDecoder`] turns the text of a front-matter block into
//! [`Metadata`]. Three formats ship with the crate:
//!
//! | Decoder | Default delimiter | Format |
//! |---------|-------------------|--------|
//! | [`YamlDecoder`] | `---` | YAML mapping |
//! | [`TomlDecoder`] | `+++` | TOML table |
//! | [`JsonDecoder`] | `;;;` | JSON object |
//!
//! Every decoder accepts empty (or whitespace-only) text as an empty mapping.
//! A document whose top level is not a mapping is rejected.
//!
//! The [`DecoderRegistry`] is assembled once, then shared read-only (behind an
//! `Arc`) by every scanner created from it.

use crate::value::{Metadata, Value, yaml_number};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{format} metadata must be a mapping at the top level")]
    NotAMapping { format: &'static str },
    #[error("{format} metadata has a non-scalar mapping key")]
    UnsupportedKey { format: &'static str },
    #[error("metadata is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Decodes front-matter text into a string-keyed mapping.
///
/// Implementations are shared across loader threads, hence `Send + Sync`.
pub trait MetadataDecoder: Send + Sync {
    /// Human-readable format name (`"YAML"`, `"JSON"`, ...).
    fn format(&self) -> &'static str;

    fn decode(&self, text: &str) -> Result<Metadata, DecodeError>;
}

// ============================================================================
// YAML
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDecoder;

impl MetadataDecoder for YamlDecoder {
    fn format(&self) -> &'static str {
        "YAML"
    }

    fn decode(&self, text: &str) -> Result<Metadata, DecodeError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Metadata::default());
        }
        let doc: serde_yaml::Value = serde_yaml::from_str(trimmed)?;
        match doc {
            serde_yaml::Value::Null => Ok(Metadata::default()),
            serde_yaml::Value::Mapping(map) => yaml_mapping(map).map(Metadata::from),
            _ => Err(DecodeError::NotAMapping {
                format: self.format(),
            }),
        }
    }
}

fn yaml_mapping(
    map: serde_yaml::Mapping,
) -> Result<std::collections::BTreeMap<String, Value>, DecodeError> {
    map.into_iter()
        .map(|(k, v)| {
            let key = yaml_value(k)?
                .scalar_string()
                .ok_or(DecodeError::UnsupportedKey { format: "YAML" })?;
            Ok((key, yaml_value(v)?))
        })
        .collect()
}

fn yaml_value(v: serde_yaml::Value) -> Result<Value, DecodeError> {
    Ok(match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => yaml_number(&n),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::List(
            items
                .into_iter()
                .map(yaml_value)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(map) => Value::Map(yaml_mapping(map)?),
        // Custom tags (`!include foo`) decode to their inner value
        serde_yaml::Value::Tagged(tagged) => yaml_value(tagged.value)?,
    })
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl MetadataDecoder for JsonDecoder {
    fn format(&self) -> &'static str {
        "JSON"
    }

    fn decode(&self, text: &str) -> Result<Metadata, DecodeError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Metadata::default());
        }
        match serde_json::from_str::<serde_json::Value>(trimmed)? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect()),
            _ => Err(DecodeError::NotAMapping {
                format: self.format(),
            }),
        }
    }
}

// ============================================================================
// TOML
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDecoder;

impl MetadataDecoder for TomlDecoder {
    fn format(&self) -> &'static str {
        "TOML"
    }

    fn decode(&self, text: &str) -> Result<Metadata, DecodeError> {
        // A TOML document is always a table, so no NotAMapping case here
        let table: toml::Table = toml::from_str(text)?;
        Ok(table
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect())
    }
}

// ============================================================================
// Registry
// ============================================================================

pub const YAML_DELIMITER: &str = "---";
pub const TOML_DELIMITER: &str = "+++";
pub const JSON_DELIMITER: &str = ";;;";

/// Maps front-matter delimiters to the decoder for their block.
///
/// Built with [`DecoderRegistry::with`] and frozen once handed to a
/// [`Matter`](crate::matter::Matter): scanners only ever read it.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn MetadataDecoder>>,
}

impl DecoderRegistry {
    /// An empty registry. Every delimiter is unknown until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock registry: `---` YAML, `+++` TOML, `;;;` JSON.
    pub fn standard() -> Self {
        Self::new()
            .with(YAML_DELIMITER, YamlDecoder)
            .with(TOML_DELIMITER, TomlDecoder)
            .with(JSON_DELIMITER, JsonDecoder)
    }

    /// Register `decoder` for `delimiter`, replacing any previous entry.
    pub fn with(
        mut self,
        delimiter: impl Into<String>,
        decoder: impl MetadataDecoder + 'static,
    ) -> Self {
        self.decoders.insert(delimiter.into(), Arc::new(decoder));
        self
    }

    pub fn get(&self, delimiter: &str) -> Option<&dyn MetadataDecoder> {
        self.decoders.get(delimiter).map(|d| d.as_ref())
    }

    pub fn contains(&self, delimiter: &str) -> bool {
        self.decoders.contains_key(delimiter)
    }

    /// Registered delimiters, sorted.
    pub fn delimiters(&self) -> Vec<&str> {
        let mut delims: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        delims.sort_unstable();
        delims
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.decoders.iter().map(|(k, d)| (k, d.format())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_decodes_typed_values() {
        let meta = YamlDecoder
            .decode("title: Hello\nweight: 3\ndraft: false\ntags: [a, b]\nauthor:\n  name: Ann")
            .unwrap();
        assert_eq!(meta.get_str("title"), Some("Hello"));
        assert_eq!(meta.get("weight"), Some(&Value::from(3_i64)));
        assert_eq!(meta.get("draft").and_then(Value::as_bool), Some(false));
        assert_eq!(meta.get("tags").and_then(Value::as_list).unwrap().len(), 2);
        assert_eq!(
            meta.get("author").and_then(Value::as_map).unwrap()["name"].as_str(),
            Some("Ann")
        );
    }

    #[test]
    fn yaml_numeric_keys_become_strings() {
        let meta = YamlDecoder.decode("2024: leap\ntrue: yes").unwrap();
        assert_eq!(meta.get_str("2024"), Some("leap"));
        assert!(meta.contains_key("true"));
    }

    #[test]
    fn yaml_nested_key_rejected() {
        let err = YamlDecoder.decode("? [a, b]\n: value").unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedKey { .. }));
    }

    #[test]
    fn empty_text_is_empty_mapping_for_all_formats() {
        for decoder in [
            &YamlDecoder as &dyn MetadataDecoder,
            &JsonDecoder,
            &TomlDecoder,
        ] {
            assert!(decoder.decode("").unwrap().is_empty(), "{}", decoder.format());
            assert!(decoder.decode("  \n\t ").unwrap().is_empty(), "{}", decoder.format());
        }
    }

    #[test]
    fn yaml_null_document_is_empty() {
        assert!(YamlDecoder.decode("~").unwrap().is_empty());
    }

    #[test]
    fn scalar_document_is_not_a_mapping() {
        assert!(matches!(
            YamlDecoder.decode("just text"),
            Err(DecodeError::NotAMapping { format: "YAML" })
        ));
        assert!(matches!(
            JsonDecoder.decode("[1, 2]"),
            Err(DecodeError::NotAMapping { format: "JSON" })
        ));
    }

    #[test]
    fn malformed_text_reports_parser_error() {
        assert!(matches!(
            YamlDecoder.decode("title: [unclosed"),
            Err(DecodeError::Yaml(_))
        ));
        assert!(matches!(
            JsonDecoder.decode("{\"title\": "),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            TomlDecoder.decode("title = "),
            Err(DecodeError::Toml(_))
        ));
    }

    #[test]
    fn json_and_toml_decode_objects() {
        let json = JsonDecoder.decode(r#"{"title": "bongo", "n": 1.5}"#).unwrap();
        assert_eq!(json.get_str("title"), Some("bongo"));
        let toml = TomlDecoder.decode("title = \"bongo\"\n[extra]\nok = true").unwrap();
        assert_eq!(toml.get_str("title"), Some("bongo"));
        assert_eq!(
            toml.get("extra").and_then(Value::as_map).unwrap()["ok"],
            Value::Bool(true)
        );
    }

    #[test]
    fn standard_registry_knows_three_delimiters() {
        let registry = DecoderRegistry::standard();
        assert_eq!(registry.delimiters(), vec!["+++", "---", ";;;"]);
        assert_eq!(registry.get("---").unwrap().format(), "YAML");
        assert_eq!(registry.get("+++").unwrap().format(), "TOML");
        assert_eq!(registry.get(";;;").unwrap().format(), "JSON");
        assert!(registry.get("***").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let registry = DecoderRegistry::new()
            .with("+++", TomlDecoder)
            .with("+++", JsonDecoder);
        assert_eq!(registry.get("+++").unwrap().format(), "JSON");
    }
}
