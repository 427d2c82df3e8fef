//! Topic names and wildcard binding patterns.
//!
//! Topics are dot-delimited (`shipment.created`). Queue bindings use
//! patterns where `*` matches exactly one segment and `#` matches the whole
//! remaining tail, so `shipment.*` covers every shipment lifecycle topic and
//! `#` covers everything.

use std::fmt;
use thiserror::Error;

/// Why a topic name or binding pattern was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicPatternError {
    /// Empty string, or an empty segment such as `shipment..created`.
    #[error("topic pattern has an empty segment: `{0}`")]
    EmptySegment(String),

    /// `#` must be the final segment of a pattern.
    #[error("`#` is only valid as the last segment: `{0}`")]
    RestNotLast(String),

    /// Concrete topic names must not contain wildcard segments.
    #[error("topic name contains a wildcard: `{0}`")]
    WildcardInName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    OneWord,
    Rest,
}

/// A parsed queue binding pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<Segment>,
    source: String,
}

impl TopicPattern {
    /// Parse a binding pattern.
    pub fn parse(pattern: &str) -> Result<Self, TopicPatternError> {
        let raw: Vec<&str> = pattern.split('.').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (index, segment) in raw.iter().enumerate() {
            match *segment {
                "" => return Err(TopicPatternError::EmptySegment(pattern.to_owned())),
                "*" => segments.push(Segment::OneWord),
                "#" => {
                    if index + 1 != raw.len() {
                        return Err(TopicPatternError::RestNotLast(pattern.to_owned()));
                    }
                    segments.push(Segment::Rest);
                }
                literal => segments.push(Segment::Literal(literal.to_owned())),
            }
        }
        Ok(Self {
            segments,
            source: pattern.to_owned(),
        })
    }

    /// Whether a concrete topic matches this pattern.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('.');
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::OneWord => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => match parts.next() {
                    Some(part) if part == literal => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Validate a concrete topic name: non-empty dot-delimited segments, no
/// wildcards.
pub fn validate_topic_name(name: &str) -> Result<(), TopicPatternError> {
    if name.is_empty() || name.split('.').any(str::is_empty) {
        return Err(TopicPatternError::EmptySegment(name.to_owned()));
    }
    if name.split('.').any(|segment| segment == "*" || segment == "#") {
        return Err(TopicPatternError::WildcardInName(name.to_owned()));
    }
    Ok(())
}
