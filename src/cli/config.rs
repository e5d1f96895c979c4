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

//! CLI configuration file support

use serde::{Deserialize, Serialize};
use std::path::Path;

/// CLI configuration loaded from .nixcfg.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CliConfig {
    /// Default flake reference
    #[serde(default)]
    pub flake: Option<String>,

    /// Default host to inspect
    #[serde(default)]
    pub host: Option<String>,

    /// Attribute holding the hosts of the flake
    #[serde(default)]
    pub namespace: Option<String>,

    /// Paths that are never expanded
    #[serde(default)]
    pub skip: Vec<String>,

    /// Per-evaluation timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Evaluator settings
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

/// Evaluator process settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluatorConfig {
    /// Program to run
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed before the preload expression
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Prefix marking an error report
    #[serde(default)]
    pub error_marker: Option<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            error_marker: None,
        }
    }
}

fn default_program() -> String {
    "nix".to_string()
}

fn default_args() -> Vec<String> {
    vec!["repl".to_string()]
}

impl CliConfig {
    /// Load configuration from standard locations
    ///
    /// Search order:
    /// 1. ./.nixcfg.toml (current directory)
    /// 2. ~/.nixcfg.toml (home directory)
    /// 3. ~/.config/nixcfg/config.toml
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(config) = Self::load_from_file(".nixcfg.toml") {
            return Ok(config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_rc = home.join(".nixcfg.toml");
            if home_rc.exists()
                && let Ok(config) = Self::load_from_file(&home_rc)
            {
                return Ok(config);
            }

            let config_file = home.join(".config").join("nixcfg").join("config.toml");
            if config_file.exists()
                && let Ok(config) = Self::load_from_file(&config_file)
            {
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }
}
