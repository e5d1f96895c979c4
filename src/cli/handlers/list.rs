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

//! Option listing handler

use std::io::Write;

use crate::export::OptionsTree;
use crate::tree::Tree;

/// List every option below `path`
///
/// Prints one dotted path per line, or with `json` a nested object of the
/// options' current values. Options whose value cannot be evaluated are
/// exported as `null`.
pub async fn handle_list<W: Write>(
    tree: &mut Tree<'_>,
    path: Option<&str>,
    json: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let path = path.unwrap_or_default();
    tracing::info!(path, "listing options");
    let options = tree.list(path).await?;

    if !json {
        for id in options {
            writeln!(out, "{}", tree.node(id).path())?;
        }
        return Ok(());
    }

    let mut export = OptionsTree::new();
    for id in options {
        let option_path = tree.node(id).path().to_string();
        let value = match tree.option(id)?.json_value().await {
            Ok(value) => value,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                tracing::warn!(path = %option_path, error = %err, "option has no value");
                serde_json::Value::Null
            }
        };
        export.insert(&option_path, value)?;
    }
    writeln!(out, "{}", export.to_json_pretty()?)?;
    Ok(())
}
