// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Attribute set parsing and attribute path helpers

use std::borrow::Cow;

use crate::error::{InspectError, Result};
use crate::session::Frame;
use crate::value::Value;

/// Rendering the evaluator uses for a value it has not forced yet
pub const UNEXPANDED_PLACEHOLDERS: [&str; 2] = ["{ ... }", "[ ... ]"];

/// Attribute that marks an attribute set as an option declaration
pub const TYPE_ATTRIBUTE: &str = "_type";

const NIX_KEYWORDS: [&str; 10] = [
    "assert", "else", "if", "in", "inherit", "let", "or", "rec", "then", "with",
];

/// Value of one attribute in a rendered set
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Not evaluated yet; must be expanded on its own
    Placeholder,
    /// Scalar rendered in place
    Scalar(Value),
}

/// One `name = value;` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: FieldValue,
}

/// A parsed attribute set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedSet {
    /// Whether `_type = "option"` was present
    pub is_option: bool,
    /// Public attributes in rendering order
    pub attributes: Vec<Attribute>,
}

/// What a frame turned out to contain
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Scalar(Value),
    Set(ParsedSet),
}

/// Classify the frame produced by evaluating `expression`
pub fn classify(expression: &str, frame: &Frame) -> Result<Shape> {
    let unexpected = || InspectError::UnexpectedFrame {
        expression: expression.to_string(),
        frame: frame.text().to_string(),
    };

    match frame {
        Frame::Line(line) => {
            if line.starts_with('{') && line.ends_with('}') && line != "{ }" {
                let inner = &line[1..line.len() - 1];
                let entries = split_entries(inner).ok_or_else(unexpected)?;
                parse_entries(entries.iter().map(String::as_str))
                    .map(Shape::Set)
                    .ok_or_else(unexpected)
            } else {
                Ok(Shape::Scalar(Value::decode(line)))
            }
        }
        Frame::Block(block) => {
            let lines: Vec<&str> = block.lines().collect();
            match lines.as_slice() {
                ["{", body @ .., _closer] => parse_entries(body.iter().copied())
                    .map(Shape::Set)
                    .ok_or_else(unexpected),
                _ => Err(unexpected()),
            }
        }
    }
}

fn parse_entries<'a, I>(entries: I) -> Option<ParsedSet>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut set = ParsedSet::default();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, rendered) = parse_entry(entry)?;

        if name == TYPE_ATTRIBUTE {
            set.is_option = rendered == "\"option\"";
            continue;
        }
        if name.starts_with('_') {
            continue;
        }

        let value = if UNEXPANDED_PLACEHOLDERS.contains(&rendered) {
            FieldValue::Placeholder
        } else {
            FieldValue::Scalar(Value::decode(rendered))
        };
        set.attributes.push(Attribute {
            name: name.into_owned(),
            value,
        });
    }
    Some(set)
}

/// Split `name = value;` into its unquoted name and rendered value
fn parse_entry(entry: &str) -> Option<(Cow<'_, str>, &str)> {
    let entry = entry.strip_suffix(';').unwrap_or(entry).trim_end();
    let (name, rendered) = entry.split_once(" = ")?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let name = match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(quoted) => Cow::Owned(unescape(quoted)),
        None => Cow::Borrowed(name),
    };
    Some((name, rendered.trim()))
}

/// Split the body of a single-line set at top-level `;`
///
/// Returns `None` when quotes or brackets are unbalanced.
fn split_entries(body: &str) -> Option<Vec<String>> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in body.chars() {
        current.push(c);
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth = depth.checked_sub(1)?,
            ';' if depth == 0 => {
                entries.push(std::mem::take(&mut current));
            }
            _ => {}
        }
    }

    if in_string || depth != 0 {
        return None;
    }
    if !current.trim().is_empty() {
        entries.push(current);
    }
    Some(entries)
}

/// Whether `name` can be used in a selector without quoting
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '-'))
        && !NIX_KEYWORDS.contains(&name)
}

/// Attribute selector for `name`, quoted when needed
pub fn attr_selector(name: &str) -> Cow<'_, str> {
    if is_identifier(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", escape(name)))
    }
}

/// Escape `name` for use inside a double-quoted Nix string
fn escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '$' if chars.peek() == Some(&'{') => escaped.push_str("\\$"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decode the escapes of a double-quoted Nix string body
fn unescape(quoted: &str) -> String {
    let mut decoded = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => decoded.push(unescape_char(escaped)),
                None => decoded.push('\\'),
            },
            _ => decoded.push(c),
        }
    }
    decoded
}

fn unescape_char(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Append `name` to a dotted path
pub fn join_path(parent: &str, name: &str) -> String {
    let selector = attr_selector(name);
    if parent.is_empty() {
        selector.into_owned()
    } else {
        format!("{parent}.{selector}")
    }
}

/// Split a dotted path into attribute names
///
/// Segments may be double-quoted to contain dots: `services."foo.bar".enable`.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in path.chars() {
        if in_quotes {
            match c {
                _ if escaped => {
                    current.push(unescape_char(c));
                    escaped = false;
                }
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => current.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments.retain(|segment| !segment.is_empty());
    segments
}
