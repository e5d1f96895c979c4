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

//! Option metadata accessors

use serde::Serialize;
use std::fmt;

use super::materialize::Materializer;
use crate::error::{InspectError, Result};
use crate::session::{Frame, Session};
use crate::value::Value;

/// Where an option is declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub file: String,
    pub line: i64,
    pub column: i64,
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Where an option is given a value, and which value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub file: String,
    pub value: Option<Value>,
}

/// On-demand metadata of one option
///
/// Every accessor issues its own evaluation; nothing is cached.
///
/// Options declared inside an `attrsOf` or `listOf` submodule have no single
/// configuration value; their value accessors fail with
/// [`InspectError::NoConfigValue`].
pub struct OptionInfo<'a> {
    session: &'a mut Session,
    path: &'a str,
    schema: &'a str,
    config: Option<String>,
    skip: &'a [String],
}

impl<'a> OptionInfo<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        path: &'a str,
        schema: &'a str,
        config: Option<String>,
        skip: &'a [String],
    ) -> Self {
        Self {
            session,
            path,
            schema,
            config,
            skip,
        }
    }

    /// Dotted path of the option
    pub fn path(&self) -> &str {
        self.path
    }

    /// Rendered value of the option in the host configuration
    pub async fn value(&mut self) -> Result<String> {
        let config = self.config.as_deref().ok_or_else(|| no_config_value(self.path))?;
        self.session.evaluate(config).await
    }

    /// Typed value of the option in the host configuration
    ///
    /// Attribute sets and lists printed as blocks are returned as raw text.
    pub async fn typed_value(&mut self) -> Result<Value> {
        let config = self.config.as_deref().ok_or_else(|| no_config_value(self.path))?;
        let frame = self.session.evaluate_frame(config).await?;
        Ok(decode_frame(frame))
    }

    /// Fully evaluated value of the option as JSON
    ///
    /// Nested lists and attribute sets are forced element by element. Skipped
    /// paths and values that fail to evaluate below the option become `null`.
    pub async fn json_value(&mut self) -> Result<serde_json::Value> {
        let config = self.config.as_deref().ok_or_else(|| no_config_value(self.path))?;
        Materializer::new(&mut *self.session, self.skip)
            .value(config, self.path, 0)
            .await
    }

    /// Rendered default value, if the option declares one
    pub async fn default(&mut self) -> Result<Option<String>> {
        let expression = format!("{}.default", self.schema);
        Ok(self.optional(&expression).await?.map(Frame::into_text))
    }

    /// Typed default value, if the option declares one
    pub async fn typed_default(&mut self) -> Result<Option<Value>> {
        let expression = format!("{}.default", self.schema);
        Ok(self.optional(&expression).await?.map(decode_frame))
    }

    /// Rendered example, if the option declares one
    pub async fn example(&mut self) -> Result<Option<String>> {
        let expression = format!("{}.example", self.schema);
        Ok(self.optional(&expression).await?.map(Frame::into_text))
    }

    /// Description text, if the option has one
    pub async fn description(&mut self) -> Result<Option<String>> {
        let expression = format!("{}.description", self.schema);
        let rendered = self.optional(&expression).await?.map(Frame::into_text);
        Ok(rendered.map(|text| match Value::decode(&text) {
            Value::String(description) => description,
            _ => text,
        }))
    }

    /// Human readable description of the option's type
    pub async fn type_description(&mut self) -> Result<String> {
        let expression = format!("{}.type.description", self.schema);
        match self.session.value(&expression).await? {
            Value::String(description) => Ok(description),
            other => Err(InspectError::UnexpectedValue {
                expression,
                expected: "string",
                found: other.to_string(),
            }),
        }
    }

    /// Files and positions declaring the option
    pub async fn declared_by(&mut self) -> Result<Vec<Declaration>> {
        let list = format!("{}.declarationPositions", self.schema);
        let count = self.list_length(&list).await?;

        let mut declarations = Vec::with_capacity(count);
        for index in 0..count {
            let Some(file) = self.element_text(&list, index, "file").await? else {
                continue;
            };
            let Some(line) = self.element_int(&list, index, "line").await? else {
                continue;
            };
            let Some(column) = self.element_int(&list, index, "column").await? else {
                continue;
            };
            declarations.push(Declaration { file, line, column });
        }
        Ok(declarations)
    }

    /// Files defining the option and the value each defines
    pub async fn defined_by(&mut self) -> Result<Vec<Definition>> {
        let list = format!("{}.definitionsWithLocations", self.schema);
        let count = self.list_length(&list).await?;

        let mut definitions = Vec::with_capacity(count);
        for index in 0..count {
            let Some(file) = self.element_text(&list, index, "file").await? else {
                continue;
            };
            let value = self.element_field(&list, index, "value").await?;
            definitions.push(Definition { file, value });
        }
        Ok(definitions)
    }

    /// Length of a schema list; unevaluable lists count as empty
    async fn list_length(&mut self, list: &str) -> Result<usize> {
        match self.session.length(list).await {
            Ok(count) => Ok(count),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::debug!(path = self.path, expression = list, error = %err, "list not available");
                Ok(0)
            }
        }
    }

    async fn element_field(&mut self, list: &str, index: usize, field: &str) -> Result<Option<Value>> {
        let expression = format!("(builtins.elemAt ({list}) {index}).{field}");
        match self.session.evaluate_frame(&expression).await {
            Ok(frame) => Ok(Some(decode_frame(frame))),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::debug!(expression = %expression, error = %err, "could not get value");
                Ok(None)
            }
        }
    }

    async fn element_text(&mut self, list: &str, index: usize, field: &str) -> Result<Option<String>> {
        Ok(match self.element_field(list, index, field).await? {
            Some(Value::String(text) | Value::Path(text)) => Some(text),
            Some(other) => {
                tracing::debug!(field, found = %other, "expected a string");
                None
            }
            None => None,
        })
    }

    async fn element_int(&mut self, list: &str, index: usize, field: &str) -> Result<Option<i64>> {
        Ok(match self.element_field(list, index, field).await? {
            Some(Value::Int(number)) => Some(number),
            Some(other) => {
                tracing::debug!(field, found = %other, "expected an integer");
                None
            }
            None => None,
        })
    }

    /// Output of `expression`, or `None` when the evaluator rejects it
    async fn optional(&mut self, expression: &str) -> Result<Option<Frame>> {
        match self.session.evaluate_frame(expression).await {
            Ok(frame) => Ok(Some(frame)),
            Err(InspectError::Eval { message }) => {
                tracing::debug!(path = self.path, expression, error = %message, "not available");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn no_config_value(path: &str) -> InspectError {
    InspectError::NoConfigValue {
        path: path.to_string(),
    }
}

/// Decode a frame into a value; blocks are kept as raw text
fn decode_frame(frame: Frame) -> Value {
    match frame {
        Frame::Line(line) => Value::decode(&line),
        Frame::Block(block) => Value::Raw(block),
    }
}
