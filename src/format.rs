//! Serialization formats for configuration files.
//!
//! Every format decodes into a `serde_json::Value` tree so that layers can be
//! merged uniformly before the result is type-checked against the target record.

use crate::error::{ConfigError, Result};
use crate::schema::optional_text_fields;
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Yaml,
    Toml,
    Json,
    Ini,
}

impl Format {
    /// Formats tried, in order, for files without a recognized extension.
    pub const AUTO_DETECT_ORDER: [Format; 3] = [Format::Toml, Format::Json, Format::Yaml];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            "json" => Some(Format::Json),
            "ini" => Some(Format::Ini),
            _ => None,
        }
    }

    /// Pick the format from a file's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Toml => "toml",
            Format::Json => "json",
            Format::Ini => "ini",
        }
    }

    /// Whether unknown keys can be reported for this format.
    pub fn supports_strict(&self) -> bool {
        !matches!(self, Format::Ini)
    }

    /// Parse raw bytes into a value tree.
    ///
    /// `hint` is the zero-value tree of the target record, with text-only
    /// optional fields set to `""`. Only INI uses it, to decide which string
    /// values should be read as typed literals.
    pub fn decode(&self, bytes: &[u8], hint: &Value) -> Result<Value, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match self {
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Format::Ini => decode_ini(text, hint),
        }
    }

    /// Serialize a record into this format.
    pub fn encode<T: Serialize>(&self, config: &T) -> Result<Vec<u8>> {
        let encoded = match self {
            Format::Yaml => serde_yaml::to_string(config)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            Format::Toml => toml::to_string(config)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            Format::Json => serde_json::to_vec_pretty(config).map_err(|e| e.to_string()),
            Format::Ini => serde_json::to_value(config)
                .map_err(|e| e.to_string())
                .and_then(|value| encode_ini(&value)),
        };
        encoded.map_err(|message| ConfigError::Encode {
            format: *self,
            message,
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a single file with an explicit format, without layering.
pub fn read_file<T: DeserializeOwned + Serialize + Default>(
    format: Format,
    path: impl AsRef<Path>,
) -> Result<T> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let decode_err = |message: String| ConfigError::Decode {
        path: path.to_path_buf(),
        format,
        message,
    };
    let zero = serde_json::to_value(T::default()).map_err(|e| decode_err(e.to_string()))?;
    let mut hint = zero.clone();
    if let Value::Object(map) = &mut hint {
        for name in optional_text_fields::<T>(&zero) {
            map.insert(name, Value::String(String::new()));
        }
    }
    let value = format.decode(&bytes, &hint).map_err(decode_err)?;
    let merged = crate::config::deep_merge(zero, value);
    serde_json::from_value(merged).map_err(|e| decode_err(e.to_string()))
}

/// Write a record to `path`, picking the format from its extension.
pub fn dump<T: Serialize>(config: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let bytes = format.encode(config)?;
    std::fs::write(path, bytes).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Sections become nested maps; `[a.b]` nests `b` under `a`.
fn decode_ini(text: &str, hint: &Value) -> Result<Value, String> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    };
    let ini = Ini::load_from_str_opt(text, options).map_err(|e| e.to_string())?;
    let mut root = Map::new();
    for (section, props) in ini.iter() {
        let mut target = &mut root;
        if let Some(section) = section {
            for part in section.split('.') {
                let entry = target
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                match entry {
                    Value::Object(next) => target = next,
                    _ => return Err(format!("section [{section}] collides with key `{part}`")),
                }
            }
        }
        for (key, value) in props.iter() {
            target.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    let mut value = Value::Object(root);
    coerce_strings(&mut value, Some(hint));
    Ok(value)
}

/// Turn INI string leaves into typed values wherever the zero tree says the
/// slot is not a string.
fn coerce_strings(value: &mut Value, hint: Option<&Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let child_hint = hint.and_then(|h| h.get(key));
                coerce_strings(child, child_hint);
            }
        }
        Value::String(raw) => {
            if matches!(hint, Some(Value::String(_))) {
                return;
            }
            if let Ok(parsed) = serde_yaml::from_str::<Value>(raw) {
                *value = parsed;
            }
        }
        _ => {}
    }
}

fn encode_ini(value: &Value) -> Result<Vec<u8>, String> {
    let Value::Object(root) = value else {
        return Err("only maps can be written as INI".to_string());
    };
    let mut ini = Ini::new();
    write_ini_section(&mut ini, None, root)?;
    let mut out = Vec::new();
    let options = WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..Default::default()
    };
    ini.write_to_opt(&mut out, options)
        .map_err(|e| e.to_string())?;
    Ok(out)
}

fn write_ini_section(
    ini: &mut Ini,
    section: Option<&str>,
    map: &Map<String, Value>,
) -> Result<(), String> {
    let mut nested = Vec::new();
    for (key, value) in map {
        let text = match value {
            Value::Null => continue,
            Value::Object(child) => {
                nested.push((key, child));
                continue;
            }
            Value::String(s) => s.clone(),
            Value::Bool(_) | Value::Number(_) | Value::Array(_) => value.to_string(),
        };
        ini.with_section(section.map(str::to_string))
            .set(key.as_str(), text);
    }
    for (key, child) in nested {
        let name = match section {
            Some(parent) => format!("{parent}.{key}"),
            None => key.clone(),
        };
        write_ini_section(ini, Some(&name), child)?;
    }
    Ok(())
}
