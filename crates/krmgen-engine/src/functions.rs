//! Baseline template functions
//!
//! A sprig flavoured helper library. Argument order follows sprig, so the
//! value being transformed comes last: `{{ trimPrefix("v", version) }}`.
//!
//! Nothing here reads the process environment; templates reach environment
//! values only through the scoped providers.

use minijinja::value::Rest;
use minijinja::{Error, ErrorKind, Value};
use semver::{Version, VersionReq};

use crate::filters;

/// The complete baseline library as (name, callable) pairs
pub fn baseline() -> Vec<(&'static str, Value)> {
    vec![
        ("print", Value::from_function(print)),
        ("printf", Value::from_function(printf)),
        ("upper", Value::from_function(upper)),
        ("lower", Value::from_function(lower)),
        ("title", Value::from_function(title)),
        ("trim", Value::from_function(trim)),
        ("trimPrefix", Value::from_function(trim_prefix)),
        ("trimSuffix", Value::from_function(trim_suffix)),
        ("replace", Value::from_function(replace)),
        ("contains", Value::from_function(contains)),
        ("hasPrefix", Value::from_function(has_prefix)),
        ("hasSuffix", Value::from_function(has_suffix)),
        ("quote", Value::from_function(filters::quote)),
        ("squote", Value::from_function(filters::squote)),
        ("indent", Value::from_function(indent)),
        ("nindent", Value::from_function(nindent)),
        ("trunc", Value::from_function(trunc)),
        ("b64enc", Value::from_function(filters::b64encode)),
        ("b64dec", Value::from_function(filters::b64decode)),
        ("sha256sum", Value::from_function(filters::sha256sum)),
        ("toYaml", Value::from_function(filters::toyaml)),
        ("toJson", Value::from_function(filters::tojson)),
        ("default", Value::from_function(default)),
        ("empty", Value::from_function(empty)),
        ("coalesce", Value::from_function(coalesce)),
        ("ternary", Value::from_function(ternary)),
        ("required", Value::from_function(required)),
        ("fail", Value::from_function(fail)),
        ("list", Value::from_function(list)),
        ("dict", Value::from_function(dict)),
        ("join", Value::from_function(join)),
        ("splitList", Value::from_function(split_list)),
        ("semverCompare", Value::from_function(semver_compare)),
        ("now", Value::from_function(now)),
    ]
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Concatenate the arguments
///
/// Usage: {{ print("a", 1) }}
pub fn print(args: Rest<Value>) -> String {
    args.iter().map(text).collect()
}

/// Printf-style formatting
///
/// Usage: {{ printf("%s-%d", name, count) }}
///
/// Supports format specifiers: %s, %d, %v, %q, %%
pub fn printf(format: String, args: Rest<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len());
    let mut chars = format.chars();
    let mut remaining = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let Some(spec) = chars.next() else {
            result.push('%');
            break;
        };
        if spec == '%' {
            result.push('%');
            continue;
        }

        let arg = remaining
            .next()
            .ok_or_else(|| invalid("not enough arguments for format string"))?;
        match spec {
            'q' => result.push_str(&filters::quote(arg.clone())),
            _ => result.push_str(&text(arg)),
        }
    }

    Ok(result)
}

pub fn upper(value: String) -> String {
    value.to_uppercase()
}

pub fn lower(value: String) -> String {
    value.to_lowercase()
}

/// Upper-case the first letter of every word
pub fn title(value: String) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn trim(value: String) -> String {
    value.trim().to_string()
}

/// Usage: {{ trimPrefix("v", "v1.2.3") }}
pub fn trim_prefix(prefix: String, value: String) -> String {
    value.strip_prefix(prefix.as_str()).unwrap_or(&value).to_string()
}

/// Usage: {{ trimSuffix(".yaml", name) }}
pub fn trim_suffix(suffix: String, value: String) -> String {
    value.strip_suffix(suffix.as_str()).unwrap_or(&value).to_string()
}

/// Usage: {{ replace("-", "_", name) }}
pub fn replace(old: String, new: String, value: String) -> String {
    value.replace(&old, &new)
}

pub fn contains(needle: String, value: String) -> bool {
    value.contains(&needle)
}

pub fn has_prefix(prefix: String, value: String) -> bool {
    value.starts_with(&prefix)
}

pub fn has_suffix(suffix: String, value: String) -> bool {
    value.ends_with(&suffix)
}

/// Usage: {{ indent(4, cert) }}
pub fn indent(spaces: usize, value: String) -> String {
    filters::indent(value, spaces)
}

/// Usage: {{ nindent(4, cert) }}
pub fn nindent(spaces: usize, value: String) -> String {
    filters::nindent(value, spaces)
}

/// Usage: {{ trunc(63, name) }}
pub fn trunc(length: usize, value: String) -> String {
    filters::trunc(value, length)
}

/// Return `given` unless it is empty, `fallback` otherwise
///
/// Usage: {{ default("latest", tag) }}
pub fn default(fallback: Value, given: Option<Value>) -> Value {
    match given {
        Some(value) if !empty(value.clone()) => value,
        _ => fallback,
    }
}

/// Sprig emptiness: undefined, none, false, zero, "" and empty collections
pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    if let Some(s) = value.as_str() {
        return s.is_empty();
    }
    match value.len() {
        Some(len) => len == 0,
        None => !value.is_true(),
    }
}

/// First non-empty argument
///
/// Usage: {{ coalesce(a, b, "fallback") }}
pub fn coalesce(args: Rest<Value>) -> Value {
    args.iter()
        .find(|arg| !empty((*arg).clone()))
        .cloned()
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("yes", "no", condition) }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() {
        true_val
    } else {
        false_val
    }
}

/// Usage: {{ required("tag is required", tag) }}
pub fn required(message: String, value: Value) -> Result<Value, Error> {
    filters::required(value, Some(message))
}

/// Fail with a custom error message
///
/// Usage: {{ fail("Something went wrong") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Usage: {{ list("a", "b") }}
pub fn list(args: Rest<Value>) -> Value {
    Value::from(args.0)
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("key1", value1, "key2", value2) }}
pub fn dict(args: Rest<Value>) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(invalid(
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = indexmap::IndexMap::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("dict keys must be strings"))?;
        map.insert(key.to_string(), pair[1].clone());
    }
    Ok(Value::from_iter(map))
}

/// Usage: {{ join(",", list("a", "b")) }}
pub fn join(separator: String, items: Value) -> Result<String, Error> {
    let parts: Vec<String> = items.try_iter()?.map(|item| text(&item)).collect();
    Ok(parts.join(&separator))
}

/// Usage: {{ splitList(",", "a,b") }}
pub fn split_list(separator: String, value: String) -> Vec<String> {
    value.split(&separator).map(str::to_string).collect()
}

/// Check a version against a semver constraint
///
/// Usage: {{ semverCompare(">=1.2.0", version) }}
pub fn semver_compare(constraint: String, version: String) -> Result<bool, Error> {
    let req = VersionReq::parse(constraint.trim())
        .map_err(|e| invalid(format!("invalid constraint '{}': {}", constraint, e)))?;
    let parsed = Version::parse(version.trim().trim_start_matches('v'))
        .map_err(|e| invalid(format!("invalid version '{}': {}", version, e)))?;
    Ok(req.matches(&parsed))
}

/// Current UTC timestamp
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest(values: Vec<Value>) -> Rest<Value> {
        Rest(values)
    }

    #[test]
    fn test_printf() {
        let result = printf(
            "Hello %s, you have %d messages, %q%%".to_string(),
            rest(vec![Value::from("Alice"), Value::from(5), Value::from("x")]),
        )
        .unwrap();
        assert_eq!(result, "Hello Alice, you have 5 messages, \"x\"%");

        assert!(printf("%s %s".to_string(), rest(vec![Value::from("a")])).is_err());
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(title("hello big world".to_string()), "Hello Big World");
        assert_eq!(trim_prefix("v".to_string(), "v1.0".to_string()), "1.0");
        assert_eq!(trim_suffix(".yaml".to_string(), "a.yaml".to_string()), "a");
        assert_eq!(replace("-".to_string(), "_".to_string(), "a-b".to_string()), "a_b");
        assert!(has_prefix("ab".to_string(), "abc".to_string()));
        assert!(!has_suffix("ab".to_string(), "abc".to_string()));
    }

    #[test]
    fn test_default_and_empty() {
        assert_eq!(default(Value::from("x"), None).as_str(), Some("x"));
        assert_eq!(default(Value::from("x"), Some(Value::from(""))).as_str(), Some("x"));
        assert_eq!(default(Value::from("x"), Some(Value::from("y"))).as_str(), Some("y"));
        assert!(empty(Value::from(false)));
        assert!(empty(Value::from(0)));
        assert!(!empty(Value::from(1)));
    }

    #[test]
    fn test_coalesce_and_ternary() {
        let first = coalesce(rest(vec![Value::from(""), Value::UNDEFINED, Value::from("z")]));
        assert_eq!(first.as_str(), Some("z"));
        assert_eq!(
            ternary(Value::from("yes"), Value::from("no"), Value::from(false)).as_str(),
            Some("no")
        );
    }

    #[test]
    fn test_dict_and_join() {
        let d = dict(rest(vec![Value::from("a"), Value::from(1)])).unwrap();
        assert_eq!(d.get_attr("a").unwrap().as_i64(), Some(1));
        assert!(dict(rest(vec![Value::from("a")])).is_err());

        let joined = join(
            ",".to_string(),
            list(rest(vec![Value::from("a"), Value::from(2)])),
        )
        .unwrap();
        assert_eq!(joined, "a,2");
    }

    #[test]
    fn test_semver_compare() {
        assert!(semver_compare(">=1.2.0".to_string(), "v1.3.0".to_string()).unwrap());
        assert!(!semver_compare("<1.0.0".to_string(), "1.3.0".to_string()).unwrap());
        assert!(semver_compare("junk".to_string(), "1.0.0".to_string()).is_err());
    }

    #[test]
    fn test_baseline_names_are_unique() {
        let mut names: Vec<&str> = baseline().into_iter().map(|(name, _)| name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(!names.contains(&"env"));
        assert!(!names.contains(&"expandenv"));
    }
}
