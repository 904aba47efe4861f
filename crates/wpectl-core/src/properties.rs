use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_SEPARATOR: &str = "=";

/// One named runtime setting of a wallpaper item. `sep` joins name and value
/// in the synthesized `--set-property` flag; `type_hint` is advisory text
/// from the listing output and may be empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyRecord {
    pub name: String,
    pub value: String,
    pub sep: String,
    pub type_hint: String,
}

impl PropertyRecord {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            sep: DEFAULT_SEPARATOR.to_owned(),
            type_hint: String::new(),
        }
    }

    pub fn with_type(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = type_hint.into();
        self
    }
}

type Strategy = fn(&str) -> Option<Vec<PropertyRecord>>;

/// The listing output of the engine binary is wildly inconsistent between
/// versions, so parsing is a cascade from strict to lenient. Each strategy
/// is a pure function over the whole text; the first non-empty result wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("json-document", parse_json_document),
    ("json-embedded", parse_json_embedded),
    ("header-blocks", parse_header_blocks),
    ("loose-lines", parse_loose_lines),
];

/// Parses the raw output of a `-l <id>` invocation into property records.
/// Never fails: unusable input yields an empty list.
pub fn parse_listing(output: &str) -> Vec<PropertyRecord> {
    if output.trim().is_empty() {
        return Vec::new();
    }
    for (name, strategy) in STRATEGIES {
        if let Some(records) = strategy(output) {
            if !records.is_empty() {
                debug!(strategy = name, count = records.len(), "parsed property listing");
                return records;
            }
        }
    }
    Vec::new()
}

fn parse_json_document(text: &str) -> Option<Vec<PropertyRecord>> {
    let parsed: Value = serde_json::from_str(text.trim()).ok()?;
    records_from_json(&parsed)
}

/// Engine versions that wrap the JSON in banner noise still put exactly one
/// object in there; take everything between the first `{` and the last `}`.
fn parse_json_embedded(text: &str) -> Option<Vec<PropertyRecord>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: Value = serde_json::from_str(&text[start..=end]).ok()?;
    records_from_json(&parsed)
}

fn records_from_json(parsed: &Value) -> Option<Vec<PropertyRecord>> {
    match parsed {
        Value::Object(map) => Some(
            map.iter()
                .map(|(name, value)| PropertyRecord::new(name.clone(), json_text(value)))
                .collect(),
        ),
        Value::Array(items) => {
            let mut records = Vec::new();
            for item in items {
                match item {
                    Value::Object(map) => {
                        let name = ["name", "property", "key"]
                            .iter()
                            .find_map(|key| map.get(*key));
                        let Some(name) = name else { continue };
                        let value = map.get("value").map(json_text).unwrap_or_default();
                        records.push(PropertyRecord::new(json_text(name), value));
                    }
                    Value::String(name) => records.push(PropertyRecord::new(name.clone(), "")),
                    _ => {}
                }
            }
            if records.is_empty() { None } else { Some(records) }
        }
        _ => None,
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `name - type` headers followed by a `Value:` line. A header without a
/// value line is dropped.
fn parse_header_blocks(text: &str) -> Option<Vec<PropertyRecord>> {
    let mut records = Vec::new();
    let mut pending: Option<(String, String)> = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('_') || line.contains(" - ") {
            pending = match line.split_once(" - ") {
                Some((name, kind)) => Some((name.trim().to_owned(), kind.trim().to_owned())),
                None => Some((line.to_owned(), String::new())),
            };
            continue;
        }
        if let Some(value) = line.strip_prefix("Value:") {
            if let Some((name, kind)) = pending.take() {
                records.push(PropertyRecord::new(name, value.trim()).with_type(kind));
            }
        }
    }
    if records.is_empty() { None } else { Some(records) }
}

/// Status noise the engine prints around loose key/value lines.
const SKIP_PREFIXES: &[&str] = &[
    "properties",
    "running with",
    "particle ",
    "found user setting with script value",
];

/// Last resort: split remaining lines on the first `=`, else the first `:`,
/// else the first whitespace run.
fn parse_loose_lines(text: &str) -> Option<Vec<PropertyRecord>> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lower = line.to_lowercase();
        if SKIP_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
            continue;
        }
        let (name, value, sep) = if let Some((name, value)) = line.split_once('=') {
            (name, value, "=")
        } else if let Some((name, value)) = line.split_once(':') {
            (name, value, ":")
        } else {
            match line.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value, "="),
                None => (line, "", "="),
            }
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        records.push(PropertyRecord {
            name: name.to_owned(),
            value: value.trim().to_owned(),
            sep: sep.to_owned(),
            type_hint: String::new(),
        });
    }
    if records.is_empty() { None } else { Some(records) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, value: &str, sep: &str, type_hint: &str) -> PropertyRecord {
        PropertyRecord {
            name: name.into(),
            value: value.into(),
            sep: sep.into(),
            type_hint: type_hint.into(),
        }
    }

    #[test]
    fn whole_document_json_object() {
        let records = parse_listing(r#"{"fps":"30"}"#);
        assert_eq!(records, vec![record("fps", "30", "=", "")]);
    }

    #[test]
    fn embedded_json_object_between_noise() {
        let records = parse_listing("noise {\"fps\":\"30\"} noise");
        assert_eq!(records, vec![record("fps", "30", "=", "")]);
    }

    #[test]
    fn json_array_of_objects_and_strings() {
        let records = parse_listing(r#"[{"name":"fps","value":"30"},{"key":"tint"},"plain"]"#);
        assert_eq!(
            records,
            vec![
                record("fps", "30", "=", ""),
                record("tint", "", "=", ""),
                record("plain", "", "=", ""),
            ]
        );
    }

    #[test]
    fn array_name_key_priority() {
        let records = parse_listing(r#"[{"property":"a","name":"b","value":"1"}]"#);
        assert_eq!(records, vec![record("b", "1", "=", "")]);
    }

    #[test]
    fn non_string_json_values_are_rendered() {
        let records = parse_listing(r#"{"fps":30,"dark":true}"#);
        assert_eq!(
            records,
            vec![record("dark", "true", "=", ""), record("fps", "30", "=", "")]
        );
    }

    #[test]
    fn header_and_value_blocks() {
        let records = parse_listing("fps - number\nValue: 30\n");
        assert_eq!(records, vec![record("fps", "30", "=", "number")]);
    }

    #[test]
    fn underscore_header_without_type() {
        let records = parse_listing("_hidden\nValue: yes\n");
        assert_eq!(records, vec![record("_hidden", "yes", "=", "")]);
    }

    #[test]
    fn header_without_value_is_dropped() {
        let records = parse_listing("fps - number\ntint - color\nValue: 1,0,0\n");
        assert_eq!(records, vec![record("tint", "1,0,0", "=", "color")]);
    }

    #[test]
    fn loose_equals_and_colon_lines() {
        let records = parse_listing("fps=30\nmode: fill\nbare value\n");
        assert_eq!(
            records,
            vec![
                record("fps", "30", "=", ""),
                record("mode", "fill", ":", ""),
                record("bare", "value", "=", ""),
            ]
        );
    }

    #[test]
    fn loose_lines_skip_status_noise() {
        let input = "Properties for wallpaper\n# comment\nRunning with 4 threads\n\
                     particle count 200\nFound user setting with script value x\nfps=60\n";
        let records = parse_listing(input);
        assert_eq!(records, vec![record("fps", "60", "=", "")]);
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(parse_listing("").is_empty());
        assert!(parse_listing("   \n\t\n").is_empty());
    }

    #[test]
    fn garbage_never_panics_and_may_yield_nothing() {
        assert!(parse_listing("Properties\n# only noise\n").is_empty());
    }
}
