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

//! Lazy attribute tree over a host's option namespace
//!
//! Option namespaces have tens of thousands of leaves, far too many to evaluate
//! up front. The [`Tree`] discovers structure one attribute set at a time: a
//! node is evaluated the first time a path goes through it, its children are
//! recorded without being evaluated, and the result is kept for the lifetime of
//! the tree. Nodes live in an arena owned by the tree and are addressed by
//! [`NodeId`].

mod materialize;
mod option;
mod parse;

pub use option::{Declaration, Definition, OptionInfo};
pub use parse::{attr_selector, is_identifier, join_path, split_path};

use indexmap::IndexMap;

use crate::error::{InspectError, Result};
use crate::session::Session;
use crate::value::Value;
use parse::{FieldValue, Shape};

/// Default attribute holding the hosts of a flake
pub const DEFAULT_NAMESPACE: &str = "nixosConfigurations";

/// Option types whose sub-options are declared once for every element
const PER_ELEMENT_TYPES: [&str; 5] = ["attrsOf", "lazyAttrsOf", "listOf", "loaOf", "functionTo"];

/// Which host to inspect and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Attribute under the evaluator scope that holds the hosts
    pub namespace: String,
    /// Host whose options are inspected
    pub host: String,
    /// Paths (relative dotted paths or absolute expressions) never expanded
    pub skip: Vec<String>,
}

impl TreeConfig {
    /// Configuration for `host` under the default namespace
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            host: host.into(),
            skip: Vec::new(),
        }
    }

    /// Use a different namespace
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Add paths that are never expanded
    pub fn with_skip<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(paths.into_iter().map(Into::into));
        self
    }

    fn host_root(&self) -> String {
        let host = attr_selector(&self.host);
        if self.namespace.is_empty() {
            host.into_owned()
        } else {
            format!("{}.{host}", self.namespace)
        }
    }

    /// Expression of the host's option schema
    pub fn options_root(&self) -> String {
        format!("{}.options", self.host_root())
    }

    /// Expression of the host's realized configuration
    pub fn config_root(&self) -> String {
        format!("{}.config", self.host_root())
    }
}

/// Handle to a node in a [`Tree`]
///
/// Only meaningful for the tree that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// What an expanded node turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Attribute set with children in rendering order
    AttributeSet(IndexMap<String, NodeId>),
    /// Option declaration; `sub_options` holds the options of a submodule type
    Option { sub_options: NodeId },
    /// Terminal value
    Scalar(Value),
}

/// Expansion state of a node
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    Unexpanded,
    Expanded(NodeKind),
}

/// A node of the namespace
#[derive(Debug, Clone)]
pub struct Node {
    path: String,
    expression: String,
    expansion: Expansion,
    has_config: bool,
}

impl Node {
    /// Dotted path relative to the options root
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute expression that evaluates this node
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the path has a counterpart in the host configuration
    ///
    /// False below options whose type repeats its sub-options for every
    /// attribute or list element.
    pub fn has_config(&self) -> bool {
        self.has_config
    }

    /// Expansion state
    pub fn expansion(&self) -> &Expansion {
        &self.expansion
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self.expansion, Expansion::Expanded(_))
    }

    /// Kind of the node, once expanded
    pub fn kind(&self) -> Option<&NodeKind> {
        match &self.expansion {
            Expansion::Expanded(kind) => Some(kind),
            Expansion::Unexpanded => None,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self.kind(), Some(NodeKind::Option { .. }))
    }

    /// Scalar value, if this is an expanded scalar
    pub fn value(&self) -> Option<&Value> {
        match self.kind() {
            Some(NodeKind::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Children, if this is an expanded attribute set
    pub fn children(&self) -> Option<&IndexMap<String, NodeId>> {
        match self.kind() {
            Some(NodeKind::AttributeSet(children)) => Some(children),
            _ => None,
        }
    }
}

/// Cached, path-addressable view over a host's options
pub struct Tree<'s> {
    session: &'s mut Session,
    config: TreeConfig,
    options_root: String,
    config_root: String,
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl<'s> Tree<'s> {
    /// Create a tree over `session`; nothing is evaluated until first use
    pub fn new(session: &'s mut Session, config: TreeConfig) -> Self {
        let options_root = config.options_root();
        let config_root = config.config_root();
        Self {
            session,
            config,
            options_root,
            config_root,
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Expression of the option schema root
    pub fn options_root(&self) -> &str {
        &self.options_root
    }

    /// Expression of the configuration root
    pub fn config_root(&self) -> &str {
        &self.config_root
    }

    /// Look up a node
    ///
    /// # Panics
    ///
    /// Panics if `id` was returned by a different tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes created so far, expanded or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes that have been expanded
    pub fn expanded_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_expanded()).count()
    }

    /// Root node, created unexpanded on first access
    pub fn root(&mut self) -> NodeId {
        match self.root {
            Some(root) => root,
            None => {
                let expression = self.options_root.clone();
                let root = self.alloc(String::new(), expression, Expansion::Unexpanded, true);
                self.root = Some(root);
                root
            }
        }
    }

    /// Resolve a dotted path to its node, expanding every node on the way
    pub async fn resolve(&mut self, path: &str) -> Result<NodeId> {
        let mut current = self.root();
        let mut walked = String::new();
        for segment in split_path(path) {
            walked = join_path(&walked, &segment);
            current = self.child(current, &segment, &walked).await?;
        }
        self.expand(current).await?;
        Ok(current)
    }

    /// Every option at or below `path`, in rendering order
    ///
    /// Children that fail to expand are logged and skipped unless the failure
    /// leaves the session unusable.
    pub async fn list(&mut self, path: &str) -> Result<Vec<NodeId>> {
        let start = self.resolve(path).await?;
        let mut options = Vec::new();
        let mut pending = vec![start];

        while let Some(id) = pending.pop() {
            let failure = match self.expand(id).await {
                Ok(NodeKind::Option { .. }) => {
                    options.push(id);
                    None
                }
                Ok(NodeKind::AttributeSet(children)) => {
                    pending.extend(children.values().rev().copied());
                    None
                }
                Ok(NodeKind::Scalar(_)) => None,
                Err(err) => Some(err),
            };

            if let Some(err) = failure {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::warn!(path = %self.node(id).path, error = %err, "skipping attribute");
            }
        }

        Ok(options)
    }

    /// Accessors for the option at `id`
    pub fn option(&mut self, id: NodeId) -> Result<OptionInfo<'_>> {
        let node = &self.nodes[id.0];
        if !node.is_option() {
            return Err(InspectError::NotAnOption {
                path: node.path.clone(),
            });
        }

        let config_expression = match (node.has_config, node.path.is_empty()) {
            (false, _) => None,
            (true, true) => Some(self.config_root.clone()),
            (true, false) => Some(format!("{}.{}", self.config_root, node.path)),
        };
        Ok(OptionInfo::new(
            &mut *self.session,
            &node.path,
            &node.expression,
            config_expression,
            &self.config.skip,
        ))
    }

    /// Child `name` of `parent`, looking through options into their sub-options
    async fn child(&mut self, parent: NodeId, name: &str, walked: &str) -> Result<NodeId> {
        let through_leaf = || InspectError::PathThroughLeaf {
            path: walked.to_string(),
        };

        let sub_options = match self.expand(parent).await? {
            NodeKind::AttributeSet(_) => None,
            NodeKind::Option { sub_options } => Some(*sub_options),
            NodeKind::Scalar(_) => return Err(through_leaf()),
        };
        let container = match sub_options {
            Some(sub) => {
                if !self.nodes[sub.0].is_expanded() {
                    self.link_sub_options(parent, sub).await?;
                }
                sub
            }
            None => parent,
        };

        let children = match self.expand(container).await {
            Ok(NodeKind::AttributeSet(children)) => children,
            Ok(_) => return Err(through_leaf()),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::debug!(path = walked, error = %err, "option has no sub-options");
                return Err(through_leaf());
            }
        };

        children
            .get(name)
            .copied()
            .ok_or_else(|| InspectError::PathNotFound {
                path: walked.to_string(),
            })
    }

    /// Decide whether the sub-options of `option` map onto the configuration
    async fn link_sub_options(&mut self, option: NodeId, sub: NodeId) -> Result<()> {
        if !self.nodes[option.0].has_config {
            return Ok(());
        }

        let expression = format!("({}).type.name", self.nodes[option.0].expression);
        let has_config = match self.session.value(&expression).await {
            Ok(Value::String(name)) => !PER_ELEMENT_TYPES.contains(&name.as_str()),
            Ok(other) => {
                tracing::debug!(expression = %expression, found = %other, "unexpected type name");
                false
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::debug!(expression = %expression, error = %err, "type name not available");
                false
            }
        };
        self.nodes[sub.0].has_config = has_config;
        Ok(())
    }

    /// Expand `id` unless already expanded, returning its kind
    async fn expand(&mut self, id: NodeId) -> Result<&NodeKind> {
        if !self.nodes[id.0].is_expanded() {
            let kind = self.evaluate_node(id).await?;
            self.nodes[id.0].expansion = Expansion::Expanded(kind);
        }

        match &self.nodes[id.0].expansion {
            Expansion::Expanded(kind) => Ok(kind),
            Expansion::Unexpanded => Err(InspectError::protocol(format!(
                "node {} was not expanded",
                self.nodes[id.0].path
            ))),
        }
    }

    /// Evaluate one node and build its kind, allocating its children
    async fn evaluate_node(&mut self, id: NodeId) -> Result<NodeKind> {
        let path = self.nodes[id.0].path.clone();
        let expression = self.nodes[id.0].expression.clone();
        let has_config = self.nodes[id.0].has_config;

        if self.is_skipped(&path, &expression) {
            tracing::debug!(path = %path, "skipping configured path");
            return Ok(NodeKind::AttributeSet(IndexMap::new()));
        }

        let frame = self.session.evaluate_frame(&expression).await?;
        let kind = match parse::classify(&expression, &frame)? {
            Shape::Scalar(value) => NodeKind::Scalar(value),
            Shape::Set(set) if set.is_option => {
                let sub_options = self.alloc(
                    path.clone(),
                    format!("(({expression}).type.getSubOptions [])"),
                    Expansion::Unexpanded,
                    false,
                );
                NodeKind::Option { sub_options }
            }
            Shape::Set(set) => {
                let mut children = IndexMap::with_capacity(set.attributes.len());
                for attribute in set.attributes {
                    let child_path = join_path(&path, &attribute.name);
                    let child_expression =
                        format!("{expression}.{}", attr_selector(&attribute.name));
                    let expansion = match attribute.value {
                        FieldValue::Placeholder => Expansion::Unexpanded,
                        FieldValue::Scalar(value) => Expansion::Expanded(NodeKind::Scalar(value)),
                    };
                    let child = self.alloc(child_path, child_expression, expansion, has_config);
                    children.insert(attribute.name, child);
                }
                NodeKind::AttributeSet(children)
            }
        };

        tracing::debug!(path = %path, nodes = self.nodes.len(), "expanded");
        Ok(kind)
    }

    fn is_skipped(&self, path: &str, expression: &str) -> bool {
        self.config
            .skip
            .iter()
            .any(|skip| skip == path || skip == expression)
    }

    fn alloc(
        &mut self,
        path: String,
        expression: String,
        expansion: Expansion,
        has_config: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            path,
            expression,
            expansion,
            has_config,
        });
        id
    }
}
