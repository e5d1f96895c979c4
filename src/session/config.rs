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

//! Session configuration

use std::time::Duration;

/// Default prefix the evaluator uses for error reports
pub const DEFAULT_ERROR_MARKER: &str = "error:";

/// How long `close` waits for the evaluator to exit before killing it
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Configuration for an evaluator session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Evaluator program
    pub program: String,

    /// Arguments passed before the preload expression
    pub args: Vec<String>,

    /// Expression loaded into the evaluator at start (`--expr <preload>`)
    pub preload: Option<String>,

    /// Prefix that marks diagnostic output as an evaluation error
    pub error_marker: String,

    /// Deadline for a single evaluation; `None` waits indefinitely
    pub eval_timeout: Option<Duration>,

    /// Grace period for the evaluator to exit on close
    pub close_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program: "nix".to_string(),
            args: vec!["repl".to_string()],
            preload: None,
            error_marker: DEFAULT_ERROR_MARKER.to_string(),
            eval_timeout: None,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl SessionConfig {
    /// Configuration for `nix repl` with the given flake loaded
    pub fn for_flake(flake: &str) -> Self {
        Self {
            preload: Some(format!("builtins.getFlake \"{flake}\"")),
            ..Self::default()
        }
    }

    /// Set the evaluator program and its leading arguments
    pub fn with_program<S: Into<String>>(mut self, program: S, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    /// Set the per-evaluation deadline
    pub fn with_eval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.eval_timeout = timeout;
        self
    }

    /// Set the error marker
    pub fn with_error_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.error_marker = marker.into();
        self
    }

    /// Full argument list for the evaluator process
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(preload) = &self.preload {
            args.push("--expr".to_string());
            args.push(preload.clone());
        }
        args
    }
}
