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

//! Command line interface for inspecting NixOS options

pub mod config;
pub mod handlers;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionConfig;
use crate::tree::{DEFAULT_NAMESPACE, TreeConfig};
use config::CliConfig;

#[derive(Parser, Clone, Debug)]
#[command(name = "nixcfg")]
#[command(about = "Inspect the options of a NixOS configuration")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
pub struct Cli {
    /// Flake holding the configuration, optionally with `#host`
    #[arg(long, global = true, value_name = "FLAKE")]
    pub flake: Option<String>,

    /// Host to inspect (defaults to this machine's hostname)
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Attribute of the flake holding the hosts
    #[arg(long, global = true, value_name = "ATTR")]
    pub namespace: Option<String>,

    /// Option paths that are never expanded (can be used multiple times)
    #[arg(long = "skip", global = true, value_name = "PATH")]
    pub skip: Vec<String>,

    /// Per-evaluation timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Configuration file to use instead of the standard locations
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List all options below a path
    List {
        /// Dotted option path (the whole namespace if omitted)
        path: Option<String>,
        /// Print a nested JSON object of option values instead of paths
        #[arg(long)]
        json: bool,
    },
    /// Print the details of one option
    Show {
        /// Dotted option path
        path: String,
    },
}

/// Settings after merging flags over the configuration file
#[derive(Debug, Clone)]
pub struct Settings {
    pub session: SessionConfig,
    pub tree: TreeConfig,
}

impl Cli {
    /// Load the configuration file this invocation refers to
    pub fn load_config(&self) -> anyhow::Result<CliConfig> {
        match &self.config {
            Some(path) => CliConfig::load_from_file(path),
            None => CliConfig::load(),
        }
    }

    /// Merge flags over `file`; flags win
    pub fn settings(&self, file: CliConfig) -> anyhow::Result<Settings> {
        let flake = self
            .flake
            .clone()
            .or(file.flake)
            .unwrap_or_else(|| ".".to_string());
        let (flake, flake_host) = split_flake_ref(&flake);

        let host = match self.host.clone().or(flake_host).or(file.host) {
            Some(host) => host,
            None => local_hostname()?,
        };

        let mut session = SessionConfig::for_flake(&canonical_flake(&flake))
            .with_program(file.evaluator.program, file.evaluator.args)
            .with_eval_timeout(self.timeout.or(file.timeout).map(Duration::from_secs));
        if let Some(marker) = file.evaluator.error_marker {
            session = session.with_error_marker(marker);
        }

        let namespace = self
            .namespace
            .clone()
            .or(file.namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let tree = TreeConfig::new(host)
            .with_namespace(namespace)
            .with_skip(file.skip)
            .with_skip(self.skip.iter().cloned());

        Ok(Settings { session, tree })
    }
}

/// Split `flake#host` into its parts; an empty host counts as none
pub fn split_flake_ref(reference: &str) -> (String, Option<String>) {
    match reference.split_once('#') {
        Some((flake, host)) => {
            let flake = if flake.is_empty() { "." } else { flake };
            let host = (!host.is_empty()).then(|| host.to_string());
            (flake.to_string(), host)
        }
        None => (reference.to_string(), None),
    }
}

/// Local flake paths are made absolute, `builtins.getFlake` rejects relative ones
fn canonical_flake(flake: &str) -> String {
    let is_local = flake.starts_with('.') || flake.starts_with('/') || flake.starts_with('~');
    if !is_local {
        return flake.to_string();
    }

    let expanded = match flake.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(flake)),
    };
    match expanded.map(|path| std::fs::canonicalize(&path)) {
        Some(Ok(path)) => path.display().to_string(),
        _ => {
            tracing::debug!(flake, "could not canonicalize flake path");
            flake.to_string()
        }
    }
}

fn local_hostname() -> anyhow::Result<String> {
    let hostname = std::fs::read_to_string(Path::new("/etc/hostname"))
        .map_err(|e| anyhow::anyhow!("No host given and the local hostname is unknown: {e}"))?;
    let hostname = hostname.trim();
    if hostname.is_empty() {
        anyhow::bail!("No host given and /etc/hostname is empty; use --host");
    }
    Ok(hostname.to_string())
}
