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

//! Option details handler

use std::io::Write;

use crate::tree::{NodeKind, Tree};

/// Print the details of the node at `path`
///
/// Options get their full metadata. Attribute sets list their children and
/// scalars print their value.
pub async fn handle_show<W: Write>(
    tree: &mut Tree<'_>,
    path: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    tracing::info!(path, "showing option");
    let id = tree.resolve(path).await?;

    match tree.node(id).kind() {
        Some(NodeKind::Option { .. }) => {}
        Some(NodeKind::AttributeSet(children)) => {
            writeln!(out, "{path} is an attribute set with the following entries:\n")?;
            for name in children.keys() {
                writeln!(out, "  {name}")?;
            }
            return Ok(());
        }
        Some(NodeKind::Scalar(value)) => {
            writeln!(out, "{value}")?;
            return Ok(());
        }
        None => anyhow::bail!("{path} could not be expanded"),
    }

    let mut option = tree.option(id)?;

    writeln!(out, "Option: {}\n", option.path())?;
    writeln!(out, "Type: {}\n", option.type_description().await?)?;

    if let Some(description) = option.description().await? {
        writeln!(out, "Description:\n{}\n", description.trim())?;
    }
    if let Some(default) = option.default().await? {
        writeln!(out, "Default: {default}\n")?;
    }
    if let Some(example) = option.example().await? {
        writeln!(out, "Example: {example}\n")?;
    }

    match option.value().await {
        Ok(value) => writeln!(out, "Value: {value}\n")?,
        Err(err) if err.is_fatal() => return Err(err.into()),
        Err(err) => writeln!(out, "Value: <{err}>\n")?,
    }

    let declarations = option.declared_by().await?;
    if !declarations.is_empty() {
        writeln!(out, "Declared by:")?;
        for declaration in &declarations {
            writeln!(out, "  {declaration}")?;
        }
        writeln!(out)?;
    }

    let definitions = option.defined_by().await?;
    if !definitions.is_empty() {
        writeln!(out, "Defined by:")?;
        for definition in &definitions {
            match &definition.value {
                Some(value) => writeln!(out, "  {}: {value}", definition.file)?,
                None => writeln!(out, "  {}", definition.file)?,
            }
        }
    }

    Ok(())
}
