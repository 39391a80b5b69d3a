#![forbid(unsafe_code)]

//! Property paths: ordered chains of member names.
//!
//! Two textual forms are accepted:
//!
//! - dotted: `customer.address.city`
//! - lambda: `c => c.address.city`, where the body must start at the
//!   parameter and access at least one member.
//!
//! Anything else (indexers, calls, operators, casts) is rejected with a
//! [`PathError`] when the path is built, never when it is resolved.

use std::fmt;
use std::str::FromStr;

use crate::error::PathError;

/// A validated, non-empty chain of member identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    /// Parse a dotted or lambda path expression.
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        match trimmed.split_once("=>") {
            Some((param, body)) => Self::parse_lambda(trimmed, param.trim(), body.trim()),
            None => Self::parse_chain(trimmed),
        }
    }

    /// Build a path from already separated member names.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<String> = segments
            .into_iter()
            .map(|s| s.as_ref().trim().to_owned())
            .collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        let joined = segments.join(".");
        for (position, segment) in segments.iter().enumerate() {
            check_segment(&joined, position, segment)?;
        }
        Ok(Self { segments })
    }

    fn parse_chain(text: &str) -> Result<Self, PathError> {
        let segments = split_members(text)?;
        Ok(Self { segments })
    }

    fn parse_lambda(expression: &str, param: &str, body: &str) -> Result<Self, PathError> {
        if !is_identifier(param) {
            return Err(PathError::InvalidIdentifier {
                segment: param.to_owned(),
            });
        }
        if body.is_empty() {
            return Err(PathError::NoMemberAccess {
                expression: expression.to_owned(),
            });
        }
        let mut members = split_members(body)?;
        if members[0] != param {
            return Err(PathError::NotRooted {
                param: param.to_owned(),
                body: body.to_owned(),
            });
        }
        if members.len() == 1 {
            return Err(PathError::NoMemberAccess {
                expression: expression.to_owned(),
            });
        }
        members.remove(0);
        Ok(Self { segments: members })
    }

    /// Member names, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The member whose value the path denotes.
    #[must_use]
    pub fn leaf(&self) -> &str {
        // Construction guarantees at least one segment.
        self.segments.last().map_or("", String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for PropertyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_members(text: &str) -> Result<Vec<String>, PathError> {
    text.split('.')
        .enumerate()
        .map(|(position, raw)| {
            let segment = raw.trim();
            check_segment(text, position, segment)?;
            Ok(segment.to_owned())
        })
        .collect()
}

fn check_segment(path: &str, position: usize, segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment {
            path: path.to_owned(),
            position,
        });
    }
    if !is_identifier(segment) {
        return Err(PathError::InvalidIdentifier {
            segment: segment.to_owned(),
        });
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
