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

//! Error types for evaluator sessions and namespace traversal

use std::time::Duration;
use thiserror::Error;

/// Result type for inspection operations
pub type Result<T> = std::result::Result<T, InspectError>;

/// Errors that can occur while talking to the evaluator or walking the namespace
#[derive(Error, Debug)]
pub enum InspectError {
    /// The evaluator process could not be started or exited abnormally
    #[error("Evaluator process error: {message}")]
    Process {
        /// Error message
        message: String,
    },

    /// The evaluator output violated the framing rules
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Reading from or writing to one of the evaluator streams failed
    #[error("Evaluator stream error: {0}")]
    Io(#[from] std::io::Error),

    /// The evaluator rejected an expression
    #[error("Evaluation error: {message}")]
    Eval {
        /// Message reported by the evaluator
        message: String,
    },

    /// No reply arrived within the configured deadline
    #[error("Evaluation of '{expression}' timed out after {timeout:?}")]
    Timeout {
        /// Expression that was being evaluated
        expression: String,
        /// Configured deadline
        timeout: Duration,
    },

    /// The session was closed, either explicitly or after a fatal failure
    #[error("Evaluator session is closed")]
    Closed,

    /// A path segment does not exist in its parent attribute set
    #[error("Attribute path {path} not found")]
    PathNotFound {
        /// Path up to and including the missing segment
        path: String,
    },

    /// A path segment was requested below a leaf
    #[error("Attribute path {path} goes through a leaf")]
    PathThroughLeaf {
        /// Path up to and including the offending segment
        path: String,
    },

    /// The evaluator returned output the tree parser does not understand
    #[error("Unexpected evaluator output for '{expression}': {frame}")]
    UnexpectedFrame {
        /// Expression that produced the output
        expression: String,
        /// The offending output
        frame: String,
    },

    /// A value had a different shape than the caller required
    #[error("Expected {expected} from '{expression}', got {found}")]
    UnexpectedValue {
        /// Expression that produced the value
        expression: String,
        /// Expected kind of value
        expected: &'static str,
        /// Rendering of the value actually found
        found: String,
    },

    /// An option accessor was requested for a node that is not an option
    #[error("{path} is not an option")]
    NotAnOption {
        /// Path of the node
        path: String,
    },

    /// The option is declared per attribute or list element of its parent,
    /// so its path has no counterpart in the configuration
    #[error("{path} is declared for every element of its parent and has no single value")]
    NoConfigValue {
        /// Path of the option
        path: String,
    },

    /// An exported option would be nested below another exported value
    #[error("Cannot export {path}: a parent path already holds a value")]
    PathConflict {
        /// Path of the option being exported
        path: String,
    },
}

impl InspectError {
    /// Create a process error
    pub fn process<S: Into<String>>(message: S) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn eval<S: Into<String>>(message: S) -> Self {
        Self::Eval {
            message: message.into(),
        }
    }

    /// Whether this error leaves the session unusable
    ///
    /// Traversals use this to decide between skipping a single child and
    /// aborting altogether.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Process { .. }
                | Self::Protocol { .. }
                | Self::Io(_)
                | Self::Timeout { .. }
                | Self::Closed
        )
    }
}
