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

//! Shared test utilities
//!
//! Provides a scripted evaluator that speaks the repl protocol over in-memory
//! pipes, so sessions and trees can be tested without a Nix installation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nixcfg::{Session, SessionConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

const PIPE_CAPACITY: usize = 64 * 1024;

/// How the scripted evaluator answers one expression
#[derive(Debug, Clone)]
pub enum Reply {
    /// Print the text on the output stream, followed by an empty line
    Out(String),
    /// Print the text on the diagnostic stream
    Err(String),
    /// Print the text, then close every stream
    Truncate(String),
    /// Never answer
    Silence,
}

pub fn out(text: &str) -> Reply {
    Reply::Out(text.to_string())
}

pub fn err(text: &str) -> Reply {
    Reply::Err(text.to_string())
}

/// Expressions received by the scripted evaluator, in order
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<String>>>);

impl Transcript {
    pub fn expressions(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn record(&self, expression: &str) {
        self.0.lock().unwrap().push(expression.to_string());
    }
}

/// Builder for a scripted evaluator
#[derive(Debug, Default)]
pub struct FakeEvaluator {
    replies: HashMap<String, Reply>,
    banner: Option<String>,
}

impl FakeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `expression` with `reply`
    pub fn reply(mut self, expression: &str, reply: Reply) -> Self {
        self.replies.insert(expression.to_string(), reply);
        self
    }

    /// Print informational text on the diagnostic stream at start
    pub fn banner(mut self, text: &str) -> Self {
        self.banner = Some(text.to_string());
        self
    }

    /// Connect a session to this evaluator
    pub fn start(self, config: SessionConfig) -> (Session, Transcript) {
        let (session_input, evaluator_input) = tokio::io::duplex(PIPE_CAPACITY);
        let (evaluator_output, session_output) = tokio::io::duplex(PIPE_CAPACITY);
        let (evaluator_errors, session_errors) = tokio::io::duplex(PIPE_CAPACITY);

        let transcript = Transcript::default();
        tokio::spawn(self.run(
            evaluator_input,
            evaluator_output,
            evaluator_errors,
            transcript.clone(),
        ));

        let session = Session::from_streams(session_input, session_output, session_errors, config);
        (session, transcript)
    }

    async fn run(
        self,
        input: DuplexStream,
        mut output: DuplexStream,
        mut errors: DuplexStream,
        transcript: Transcript,
    ) {
        if let Some(banner) = &self.banner {
            let _ = errors.write_all(banner.as_bytes()).await;
        }

        let mut lines = BufReader::new(input).lines();
        while let Ok(Some(expression)) = lines.next_line().await {
            transcript.record(&expression);
            let reply = self.replies.get(&expression).cloned().unwrap_or_else(|| {
                Reply::Err(format!("error: undefined variable '{expression}'\n"))
            });

            match reply {
                Reply::Out(text) => {
                    let _ = output.write_all(format!("{text}\n\n").as_bytes()).await;
                }
                Reply::Err(text) => {
                    let _ = errors.write_all(text.as_bytes()).await;
                }
                Reply::Truncate(text) => {
                    let _ = output.write_all(format!("{text}\n").as_bytes()).await;
                    return;
                }
                Reply::Silence => {}
            }
        }
    }
}

/// A host with one scalar attribute `a` and one option `b` defaulting to "x"
pub fn toy_host() -> FakeEvaluator {
    FakeEvaluator::new()
        .reply("toy.options", out("{\n  a = 1;\n  b = { ... };\n}"))
        .reply(
            "toy.options.b",
            out("{\n  _type = \"option\";\n  default = \"x\";\n  description = \"A toy option.\";\n  type = { ... };\n}"),
        )
        .reply("toy.options.b.default", out("\"x\""))
        .reply("toy.options.b.description", out("\"A toy option.\""))
        .reply("toy.options.b.type.description", out("\"string\""))
        .reply("toy.config.b", out("\"x\""))
}
