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

use anyhow::Context;
use clap::Parser;
use nixcfg::cli::handlers::{handle_list, handle_show};
use nixcfg::cli::{Cli, Commands};
use nixcfg::{Session, Tree};
use std::process;

#[tokio::main]
async fn main() {
    // Setup human-panic for better error messages
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "nixcfg=debug",
        _ => "nixcfg=trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file = cli.load_config().context("failed to load configuration file")?;
    let settings = cli.settings(file)?;
    let mut session = Session::spawn(settings.session).context("failed to start the evaluator")?;

    let outcome = {
        let mut tree = Tree::new(&mut session, settings.tree);
        let mut stdout = std::io::stdout().lock();
        match &cli.command {
            Commands::List { path, json } => {
                handle_list(&mut tree, path.as_deref(), *json, &mut stdout).await
            }
            Commands::Show { path } => handle_show(&mut tree, path, &mut stdout).await,
        }
    };

    let closed = session.close().await;
    outcome?;
    closed?;
    Ok(())
}
