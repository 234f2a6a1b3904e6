//! A small dotted-path evaluator for descriptor JSON paths.
//!
//! Grammar per segment, separated by `.`:
//!   `key`                descend into an object key; arrays map over elements
//!   `key[*]`             descend and flatten one array level explicitly
//!   `key[?name='X']`     descend into an array and keep elements whose
//!                        `name` member equals `X`
//!
//! Evaluation never fails on missing structure; it returns every hit.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use subsearch_types::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    KeyAll(String),
    KeyFilter { key: String, field: String, value: String },
}

#[derive(Debug, Clone)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(Error::InvalidConfig("empty json path".into()));
        }
        let segments = path.split('.').map(parse_segment).collect::<Result<Vec<Segment>>>()?;
        Ok(Self { segments })
    }

    pub fn eval<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current: Vec<&'a Value> = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                descend(value, segment, &mut next);
            }
            current = next;
        }
        current
    }
}

fn parse_segment(raw: &str) -> Result<Segment> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidConfig("blank json path segment".into()));
    }
    if let Some(open) = raw.find('[') {
        let key = raw[..open].to_string();
        let selector = raw[open..].trim();
        if selector == "[*]" {
            return Ok(Segment::KeyAll(key));
        }
        // [?field='value']
        if selector.starts_with("[?") && selector.ends_with("']") {
            let body = &selector[2..selector.len() - 2];
            if let Some(eq) = body.find("='") {
                let field = body[..eq].trim().to_string();
                let value = body[eq + 2..].to_string();
                if !field.is_empty() {
                    return Ok(Segment::KeyFilter { key, field, value });
                }
            }
        }
        return Err(Error::InvalidConfig(format!("bad json path selector: {}", raw)));
    }
    Ok(Segment::Key(raw.to_string()))
}

fn descend<'a>(value: &'a Value, segment: &Segment, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                descend(item, segment, out);
            }
        }
        Value::Object(map) => match segment {
            Segment::Key(key) => {
                if let Some(v) = map.get(key) {
                    flatten(v, out);
                }
            }
            Segment::KeyAll(key) => {
                if let Some(v) = map.get(key) {
                    flatten(v, out);
                }
            }
            Segment::KeyFilter { key, field, value: expect } => {
                if let Some(Value::Array(items)) = map.get(key) {
                    for item in items {
                        let matches = item
                            .get(field)
                            .and_then(Value::as_str)
                            .map(|s| s.eq_ignore_ascii_case(expect))
                            .unwrap_or(false);
                        if matches {
                            out.push(item);
                        }
                    }
                }
            }
        },
        _ => {}
    }
}

fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter()),
        other => out.push(other),
    }
}

/// Compiled-path cache shared by every parser invocation
#[derive(Default)]
pub struct JsonPathService {
    cache: DashMap<String, Arc<JsonPath>>,
}

impl JsonPathService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eval<'a>(&self, path: &str, root: &'a Value) -> Result<Vec<&'a Value>> {
        let compiled = match self.cache.get(path) {
            Some(hit) => hit.value().clone(),
            None => {
                let parsed = Arc::new(JsonPath::parse(path)?);
                self.cache.insert(path.to_string(), parsed.clone());
                parsed
            }
        };
        Ok(compiled.eval(root))
    }
}
