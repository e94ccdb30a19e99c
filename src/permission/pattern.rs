//! Field allow-list patterns.
//!
//! A pattern is a dotted path whose segments are either literal names, `*` (any single
//! name), `prefix*` (names starting with `prefix`) or `**` (any remaining depth, only
//! valid as the last segment).

use serde_json::{Map, Value as JsonValue};

use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Exact(String),
    Prefix(String),
    Any,
    Deep,
}

impl Segment {
    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Exact(exact) => exact == name,
            Segment::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Segment::Any | Segment::Deep => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPattern {
    segments: Vec<Segment>,
}

impl FieldPattern {
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        let fail = |reason: &str| SchemaError::InvalidFieldPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = raw.trim().split('.').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(fail("empty segment")),
                "**" if i + 1 == parts.len() => Segment::Deep,
                "**" => return Err(fail("\"**\" is only valid as the last segment")),
                "*" => Segment::Any,
                other => match other.strip_suffix('*') {
                    Some(prefix) if !prefix.contains('*') => Segment::Prefix(prefix.to_string()),
                    Some(_) => return Err(fail("only a single trailing \"*\" is supported")),
                    None if other.contains('*') => {
                        return Err(fail("\"*\" may only end a segment"))
                    }
                    None => Segment::Exact(other.to_string()),
                },
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// Whether the dotted `path` is allowed by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = path.split('.').collect();
        matches_from(&self.segments, &path)
    }

    /// Whether the pattern allows at least part of the top-level field `name`.
    pub fn touches(&self, name: &str) -> bool {
        self.segments
            .first()
            .map(|segment| segment.matches(name))
            .unwrap_or(false)
    }

    /// Whether some path below `path` can still match.
    fn reaches_below(&self, path: &[&str]) -> bool {
        let mut segments = self.segments.iter();
        for name in path {
            match segments.next() {
                Some(Segment::Deep) => return true,
                Some(segment) if segment.matches(name) => {}
                _ => return false,
            }
        }
        segments.next().is_some()
    }

    /// Whether the pattern addresses paths below the top-level field `name` rather than
    /// the field as a whole.
    pub fn is_nested_under(&self, name: &str) -> bool {
        self.segments.len() > 1 && self.touches(name)
    }
}

fn matches_from(segments: &[Segment], path: &[&str]) -> bool {
    match segments.split_first() {
        None => path.is_empty(),
        Some((Segment::Deep, _)) => true,
        Some((segment, rest)) => match path.split_first() {
            Some((head, tail)) => segment.matches(head) && matches_from(rest, tail),
            None => false,
        },
    }
}

/// Allow-list of a permission entry. The default allows nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPatterns {
    patterns: Vec<FieldPattern>,
}

impl FieldPatterns {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, SchemaError> {
        let patterns = raw
            .iter()
            .map(|p| FieldPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether the whole dotted `path` is allowed.
    pub fn allows(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    /// Whether any part of the top-level field `name` is allowed.
    pub fn allows_any_of(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.touches(name))
    }

    /// Whether some pattern addresses paths inside the top-level field `name`.
    pub fn addresses_nested(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_nested_under(name))
    }

    /// Copy of the JSON document stored in `field` holding only allowed keys.
    pub fn prune(&self, field: &str, value: &JsonValue) -> JsonValue {
        let mut path = vec![field];
        self.prune_at(&mut path, value).unwrap_or(JsonValue::Null)
    }

    fn prune_at<'v>(&self, path: &mut Vec<&'v str>, value: &'v JsonValue) -> Option<JsonValue> {
        if self.patterns.iter().any(|p| matches_from(&p.segments, path.as_slice())) {
            return Some(value.clone());
        }
        let JsonValue::Object(map) = value else {
            return None;
        };
        if !self.patterns.iter().any(|p| p.reaches_below(path.as_slice())) {
            return None;
        }
        let mut out = Map::new();
        for (key, inner) in map {
            path.push(key);
            if let Some(kept) = self.prune_at(path, inner) {
                out.insert(key.clone(), kept);
            }
            path.pop();
        }
        Some(JsonValue::Object(out))
    }
}
