//! Recognition result parser.
//!
//! Normalises the vision model's opaque reply into [`Detection`]s. The
//! structured path reads JSON (an object with a `foods` list, a bare list,
//! or a JSON object embedded in prose). When no JSON can be read, a
//! line-oriented text scan runs an ordered list of matchers over each line.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::config::ParserConfig;
use crate::types::{BoundingBox, Detection};

/// Result of parsing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// At least one detection.
    Parsed(Vec<Detection>),
    /// Nothing usable in the payload.
    Empty,
}

impl ParseOutcome {
    fn from_detections(detections: Vec<Detection>) -> Self {
        if detections.is_empty() {
            Self::Empty
        } else {
            Self::Parsed(detections)
        }
    }

    /// Borrow the detections (empty slice for [`ParseOutcome::Empty`]).
    #[must_use]
    pub fn detections(&self) -> &[Detection] {
        match self {
            Self::Parsed(d) => d,
            Self::Empty => &[],
        }
    }

    /// Take the detections.
    #[must_use]
    pub fn into_detections(self) -> Vec<Detection> {
        match self {
            Self::Parsed(d) => d,
            Self::Empty => Vec::new(),
        }
    }

    /// Whether nothing was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Parse a model reply.
#[must_use]
pub fn parse(payload: &str, config: &ParserConfig) -> ParseOutcome {
    let detections = match parse_structured(payload, config) {
        Some(found) => {
            tracing::debug!(count = found.len(), "parsed structured recognition payload");
            found
        }
        None => {
            let found = parse_text(payload, config);
            tracing::debug!(count = found.len(), "parsed recognition payload as text");
            found
        }
    };
    ParseOutcome::from_detections(dedup(detections))
}

/// Whether `name` contains Hangul syllables or jamo.
#[must_use]
pub fn is_local_script(name: &str) -> bool {
    name.chars().any(|c| {
        matches!(c,
            '\u{AC00}'..='\u{D7A3}'
            | '\u{1100}'..='\u{11FF}'
            | '\u{3130}'..='\u{318F}')
    })
}

// ---------------------------------------------------------------------------
// Structured path
// ---------------------------------------------------------------------------

fn parse_structured(payload: &str, config: &ParserConfig) -> Option<Vec<Detection>> {
    let trimmed = payload.trim();
    let value = serde_json::from_str::<Value>(trimmed)
        .ok()
        .or_else(|| embedded_object(trimmed))?;

    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("foods") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    Some(
        entries
            .iter()
            .filter_map(|entry| structured_entry(entry, config))
            .collect(),
    )
}

/// Greedy `{ ... }` span: first opening brace to last closing brace.
fn embedded_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn string_field(entry: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| entry.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn structured_entry(entry: &Value, config: &ParserConfig) -> Option<Detection> {
    let map = entry.as_object()?;
    let mut local = string_field(map, &["nameKo", "nameLocal"]);
    let mut foreign = string_field(map, &["nameEn", "nameForeign"]);
    let generic = string_field(map, &["name"]);

    if local.is_none() && foreign.is_none() {
        let name = generic.clone()?;
        if is_local_script(&name) {
            local = Some(name);
        } else {
            foreign = Some(name);
        }
    }

    let primary = local
        .clone()
        .or_else(|| foreign.clone())
        .or(generic)
        .unwrap_or_default();

    #[allow(clippy::cast_possible_truncation)]
    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map_or(config.structured_default_confidence, |c| c as f32);

    let mut detection = Detection::new(primary, local, foreign, confidence);
    if let Some(bbox) = map
        .get("boundingBox")
        .and_then(|b| serde_json::from_value::<BoundingBox>(b.clone()).ok())
    {
        detection = detection.with_bounding_box(bbox);
    }
    Some(detection)
}

// ---------------------------------------------------------------------------
// Text fallback path
// ---------------------------------------------------------------------------

/// Line matchers in priority order: bulleted, numbered, parenthetical.
static LINE_MATCHERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^[-•*·]\s*(.+?)(?:\s*\(([^)]+)\))?\s*$",
        r"^\d+[.)]\s*(.+?)(?:\s*\(([^)]+)\)|\s+-\s+(.+?))?\s*$",
        r"^(.+?)\s*\(([^)]+)\)\s*$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn parse_text(payload: &str, config: &ParserConfig) -> Vec<Detection> {
    payload
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            LINE_MATCHERS
                .iter()
                .find_map(|re| text_line(re, line, config))
        })
        .collect()
}

fn within_bounds(name: &str, config: &ParserConfig) -> bool {
    let n = name.chars().count();
    n >= config.min_name_chars && n <= config.max_name_chars
}

fn text_line(re: &Regex, line: &str, config: &ParserConfig) -> Option<Detection> {
    let caps = re.captures(line)?;
    let parts: Vec<&str> = caps
        .iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().trim().trim_matches('*').trim())
        .filter(|p| within_bounds(p, config))
        .collect();

    let local = parts.iter().find(|p| is_local_script(p)).map(ToString::to_string);
    let foreign = parts.iter().find(|p| !is_local_script(p)).map(ToString::to_string);
    let primary = local.clone().or_else(|| foreign.clone())?;

    Some(Detection::new(
        primary,
        local,
        foreign,
        config.text_fallback_confidence,
    ))
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Keep the first detection for each (local, foreign) name pair.
fn dedup(detections: Vec<Detection>) -> Vec<Detection> {
    let mut seen: HashSet<(Option<String>, Option<String>)> = HashSet::new();
    detections
        .into_iter()
        .filter(|d| seen.insert((d.name_local.clone(), d.name_foreign.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ParserConfig {
        ParserConfig::default()
    }

    #[test]
    fn structured_foods_object() {
        let payload = r#"{"foods":[
            {"nameKo":"김치찌개","nameEn":"Kimchi stew","confidence":0.92},
            {"nameKo":"쌀밥","nameEn":"Steamed rice"}
        ]}"#;
        let out = parse(payload, &cfg()).into_detections();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].primary_name, "김치찌개");
        assert!((out[0].confidence - 0.92).abs() < 1e-6);
        assert!((out[1].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn structured_bare_array_and_generic_names() {
        let payload = r#"[{"name":"Apple"},{"name":"바나나","confidence":2.0},{"confidence":0.5}]"#;
        let out = parse(payload, &cfg()).into_detections();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name_foreign.as_deref(), Some("Apple"));
        assert_eq!(out[0].name_local, None);
        assert_eq!(out[1].name_local.as_deref(), Some("바나나"));
        assert!((out[1].confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn structured_object_embedded_in_prose() {
        let payload = "Here is what I found:\n```json\n{\"foods\":[{\"nameKo\":\"사과\",\"confidence\":0.95}]}\n```";
        let out = parse(payload, &cfg()).into_detections();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name_local.as_deref(), Some("사과"));
    }

    #[test]
    fn bounding_box_is_carried() {
        let payload = r#"{"foods":[{"nameKo":"사과","boundingBox":{"x":1,"y":2,"width":3,"height":4}}]}"#;
        let out = parse(payload, &cfg()).into_detections();
        let bbox = out[0].bounding_box.expect("bbox");
        assert!((bbox.width - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_foods_list_is_empty() {
        assert!(parse(r#"{"foods":[]}"#, &cfg()).is_empty());
        assert!(parse("", &cfg()).is_empty());
    }

    #[test]
    fn text_fallback_lines() {
        let payload = "I can see:\n- 김치찌개 (Kimchi stew)\n2. 쌀밥 - Steamed rice\n계란말이 (Rolled omelette)\nnothing here";
        let out = parse(payload, &cfg()).into_detections();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].name_local.as_deref(), Some("김치찌개"));
        assert_eq!(out[0].name_foreign.as_deref(), Some("Kimchi stew"));
        assert_eq!(out[1].name_local.as_deref(), Some("쌀밥"));
        assert_eq!(out[1].name_foreign.as_deref(), Some("Steamed rice"));
        assert_eq!(out[2].name_foreign.as_deref(), Some("Rolled omelette"));
        assert!(out.iter().all(|d| (d.confidence - 0.7).abs() < 1e-6));
    }

    #[test]
    fn text_names_outside_bounds_are_rejected() {
        let long = "가".repeat(51);
        let payload = format!("- 밥\n- {long}\n- 김");
        let out = parse(&payload, &cfg()).into_detections();
        assert!(out.is_empty());

        let ok = parse("- 밥 (rice)", &cfg()).into_detections();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].name_local, None);
        assert_eq!(ok[0].name_foreign.as_deref(), Some("rice"));
    }

    #[test]
    fn duplicates_by_name_pair_are_removed() {
        let payload = r#"{"foods":[
            {"nameKo":"사과","nameEn":"Apple","confidence":0.9},
            {"nameKo":"사과","nameEn":"Apple","confidence":0.4},
            {"nameKo":"사과","nameEn":"Green apple"}
        ]}"#;
        let out = parse(payload, &cfg()).into_detections();
        assert_eq!(out.len(), 2);
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn hangul_detection() {
        assert!(is_local_script("사과"));
        assert!(is_local_script("ㅋㅋ"));
        assert!(!is_local_script("apple"));
    }
}
