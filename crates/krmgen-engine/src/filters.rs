//! Template filters
//!
//! Pure value-first helpers usable with pipe syntax (`{{ x | b64encode }}`).
//! The sprig-style functions in [`crate::functions`] reuse them with the
//! argument order Go template authors are used to.

use base64::Engine as _;
use minijinja::{Environment, Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

/// Register every filter on an environment
pub fn register(env: &mut Environment<'_>) {
    env.add_filter("toyaml", toyaml);
    env.add_filter("tojson", tojson);
    env.add_filter("b64encode", b64encode);
    env.add_filter("b64decode", b64decode);
    env.add_filter("quote", quote);
    env.add_filter("squote", squote);
    env.add_filter("indent", indent);
    env.add_filter("nindent", nindent);
    env.add_filter("required", required);
    env.add_filter("sha256", sha256sum);
    env.add_filter("trunc", trunc);
}

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.to_string())
}

/// Convert a value to YAML format
///
/// Usage: {{ values | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&value).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to JSON format
///
/// Usage: {{ values | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(invalid)
}

/// Base64 encode a string
///
/// Usage: {{ secret | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Base64 decode a string
///
/// Usage: {{ encoded | b64decode }}
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;

    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn as_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Quote a string with double quotes
///
/// Usage: {{ name | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    format!(
        "\"{}\"",
        as_text(&value).replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Quote a string with single quotes
#[must_use]
pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line
///
/// Usage: {{ cert | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indent with a leading newline
///
/// Usage: {{ cert | nindent(4) }}
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail when a value is undefined, none or empty
///
/// Usage: {{ value | required("value is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);

    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// SHA256 hex digest
#[must_use]
pub fn sha256sum(value: String) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Truncate to at most `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({"name": "test", "port": 8080}));
        let yaml = toyaml(value).unwrap();
        assert!(yaml.contains("name: test"));
        assert!(yaml.contains("port: 8080"));
        assert!(!yaml.ends_with('\n'));
    }

    #[test]
    fn test_b64_roundtrip() {
        let encoded = b64encode("hello world".to_string());
        assert_eq!(encoded, "aGVsbG8gd29ybGQ=");
        assert_eq!(b64decode(encoded).unwrap(), "hello world");
        assert!(b64decode("%%%".to_string()).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("te\"st")), "\"te\\\"st\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
        assert_eq!(quote(Value::from(42)), "\"42\"");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
        assert_eq!(nindent("a\nb".to_string(), 4), "\n    a\n    b");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("x"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
        let err = required(Value::from(""), Some("need it".to_string())).unwrap_err();
        assert!(err.to_string().contains("need it"));
    }

    #[test]
    fn test_sha256_and_trunc() {
        assert_eq!(
            sha256sum("abc".to_string()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(trunc("hello".to_string(), 3), "hel");
        assert_eq!(trunc("hi".to_string(), 10), "hi");
    }

    #[test]
    fn test_filters_in_environment() {
        let mut env = Environment::new();
        register(&mut env);
        let rendered = env
            .render_str("{{ 'abc' | b64encode | quote }}", ())
            .unwrap();
        assert_eq!(rendered, "\"YWJj\"");
    }
}
