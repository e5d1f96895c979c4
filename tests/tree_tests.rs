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

//! Lazy attribute tree and option accessor tests against a scripted evaluator

mod utils;

use nixcfg::cli::handlers::{handle_list, handle_show};
use nixcfg::{
    Declaration, Definition, InspectError, NodeKind, SessionConfig, Tree, TreeConfig, Value,
};
use pretty_assertions::assert_eq;
use utils::{out, toy_host};

fn toy_config() -> TreeConfig {
    TreeConfig::new("toy").with_namespace("")
}

#[tokio::test]
async fn test_scalar_attribute_needs_no_extra_round_trip() {
    let (mut session, transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let a = tree.resolve("a").await.unwrap();
        assert_eq!(tree.node(a).kind(), Some(&NodeKind::Scalar(Value::Int(1))));
        assert_eq!(tree.node(a).path(), "a");
    }
    assert_eq!(transcript.expressions(), vec!["toy.options"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_resolve_is_memoized() {
    let (mut session, transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let first = tree.resolve("b").await.unwrap();
        let round_trips = transcript.len();
        let second = tree.resolve("b").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transcript.len(), round_trips);
        assert!(tree.node(first).is_option());
    }
    assert_eq!(transcript.expressions(), vec!["toy.options", "toy.options.b"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_list_returns_only_options() {
    let (mut session, transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let options = tree.list("").await.unwrap();
        let paths: Vec<&str> = options.iter().map(|id| tree.node(*id).path()).collect();
        assert_eq!(paths, vec!["b"]);

        // `a` was rendered in place and the option's sub-options are not walked
        assert_eq!(transcript.len(), 2);
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_option_accessors() {
    let (mut session, _transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let b = tree.resolve("b").await.unwrap();
        let mut option = tree.option(b).unwrap();

        assert_eq!(option.path(), "b");
        assert_eq!(option.default().await.unwrap().as_deref(), Some("\"x\""));
        assert_eq!(
            option.typed_default().await.unwrap(),
            Some(Value::String("x".to_string()))
        );
        assert_eq!(option.value().await.unwrap(), "\"x\"");
        assert_eq!(option.typed_value().await.unwrap(), Value::String("x".to_string()));
        assert_eq!(option.type_description().await.unwrap(), "string");
        assert_eq!(
            option.description().await.unwrap().as_deref(),
            Some("A toy option.")
        );
        // not scripted, so the evaluator reports a missing attribute
        assert_eq!(option.example().await.unwrap(), None);
        assert_eq!(option.declared_by().await.unwrap(), Vec::<Declaration>::new());
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_option_on_attribute_set_is_rejected() {
    let (mut session, _transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let root = tree.resolve("").await.unwrap();
        assert!(matches!(
            tree.option(root),
            Err(InspectError::NotAnOption { .. })
        ));
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_and_leaf_paths() {
    let (mut session, _transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());

        match tree.resolve("c").await {
            Err(InspectError::PathNotFound { path }) => assert_eq!(path, "c"),
            other => panic!("expected PathNotFound, got {other:?}"),
        }
        match tree.resolve("a.x").await {
            Err(InspectError::PathThroughLeaf { path }) => assert_eq!(path, "a.x"),
            other => panic!("expected PathThroughLeaf, got {other:?}"),
        }
        // `b` has no sub-options, the evaluator rejects getSubOptions
        match tree.resolve("b.x").await {
            Err(InspectError::PathThroughLeaf { path }) => assert_eq!(path, "b.x"),
            other => panic!("expected PathThroughLeaf, got {other:?}"),
        }
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_submodule_options_are_walked_through() {
    let (mut session, transcript) = toy_host()
        .reply("(toy.options.b).type.name", out("\"submodule\""))
        .reply(
            "((toy.options.b).type.getSubOptions [])",
            out("{\n  enable = { ... };\n}"),
        )
        .reply(
            "((toy.options.b).type.getSubOptions []).enable",
            out("{ _type = \"option\"; default = false; }"),
        )
        .reply("toy.config.b.enable", out("true"))
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let enable = tree.resolve("b.enable").await.unwrap();
        assert_eq!(tree.node(enable).path(), "b.enable");
        assert!(tree.node(enable).is_option());
        assert!(tree.node(enable).has_config());

        let mut option = tree.option(enable).unwrap();
        assert_eq!(option.typed_value().await.unwrap(), Value::Bool(true));
    }
    assert_eq!(
        transcript.expressions(),
        vec![
            "toy.options",
            "toy.options.b",
            "(toy.options.b).type.name",
            "((toy.options.b).type.getSubOptions [])",
            "((toy.options.b).type.getSubOptions []).enable",
            "toy.config.b.enable",
        ]
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_skipped_paths_are_not_evaluated() {
    let (mut session, transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config().with_skip(["b"]));
        let options = tree.list("").await.unwrap();
        assert!(options.is_empty());
    }
    assert_eq!(transcript.expressions(), vec!["toy.options"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_list_skips_failing_children() {
    let (mut session, _transcript) = toy_host()
        .reply("toy.options", out("{\n  a = 1;\n  broken = { ... };\n  b = { ... };\n}"))
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let options = tree.list("").await.unwrap();
        let paths: Vec<&str> = options.iter().map(|id| tree.node(*id).path()).collect();
        assert_eq!(paths, vec!["b"]);
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_list_handler_outputs() {
    let (mut session, _transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());

        let mut paths = Vec::new();
        handle_list(&mut tree, None, false, &mut paths).await.unwrap();
        assert_eq!(String::from_utf8(paths).unwrap(), "b\n");

        let mut json = Vec::new();
        handle_list(&mut tree, None, true, &mut json).await.unwrap();
        let exported: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(exported, serde_json::json!({ "b": "x" }));
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_show_handler_output() {
    let (mut session, _transcript) = toy_host().start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let mut rendered = Vec::new();
        handle_show(&mut tree, "b", &mut rendered).await.unwrap();
        let rendered = String::from_utf8(rendered).unwrap();

        assert!(rendered.contains("Option: b"));
        assert!(rendered.contains("Type: string"));
        assert!(rendered.contains("Default: \"x\""));
        assert!(rendered.contains("A toy option."));
        assert!(rendered.contains("Value: \"x\""));
        assert!(!rendered.contains("Example"));
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_per_element_sub_options_have_no_config_value() {
    let (mut session, transcript) = toy_host()
        .reply("(toy.options.b).type.name", out("\"attrsOf\""))
        .reply(
            "((toy.options.b).type.getSubOptions [])",
            out("{\n  port = { ... };\n}"),
        )
        .reply(
            "((toy.options.b).type.getSubOptions []).port",
            out("{ _type = \"option\"; type = { ... }; }"),
        )
        .reply(
            "((toy.options.b).type.getSubOptions []).port.type.description",
            out("\"16 bit unsigned integer; between 0 and 65535 (both inclusive)\""),
        )
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let port = tree.resolve("b.port").await.unwrap();
        assert!(!tree.node(port).has_config());

        let mut option = tree.option(port).unwrap();
        match option.value().await {
            Err(InspectError::NoConfigValue { path }) => assert_eq!(path, "b.port"),
            other => panic!("expected NoConfigValue, got {other:?}"),
        }
        assert!(matches!(
            option.typed_value().await,
            Err(InspectError::NoConfigValue { .. })
        ));
        assert!(matches!(
            option.json_value().await,
            Err(InspectError::NoConfigValue { .. })
        ));
        assert_eq!(
            option.type_description().await.unwrap(),
            "16 bit unsigned integer; between 0 and 65535 (both inclusive)"
        );
    }
    // nothing below toy.config was requested
    assert!(
        transcript
            .expressions()
            .iter()
            .all(|expression| !expression.starts_with("toy.config"))
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_declarations_and_definitions() {
    let declarations = "toy.options.b.declarationPositions";
    let definitions = "toy.options.b.definitionsWithLocations";
    let field = |list: &str, index: usize, name: &str| format!("(builtins.elemAt ({list}) {index}).{name}");

    let (mut session, transcript) = toy_host()
        .reply(&format!("builtins.length ({declarations})"), out("2"))
        .reply(&field(declarations, 0, "file"), out("\"/nix/store/src/toy.nix\""))
        .reply(&field(declarations, 0, "line"), out("12"))
        .reply(&field(declarations, 0, "column"), out("5"))
        .reply(&field(declarations, 1, "file"), out("\"/nix/store/src/extra.nix\""))
        .reply(&field(declarations, 1, "line"), out("\"twelve\""))
        .reply(&format!("builtins.length ({definitions})"), out("2"))
        .reply(&field(definitions, 0, "file"), out("\"/etc/nixos/configuration.nix\""))
        .reply(&field(definitions, 0, "value"), out("\"x\""))
        .reply(&field(definitions, 1, "file"), out("\"/etc/nixos/hardware.nix\""))
        .reply(&field(definitions, 1, "value"), out("{\n  enable = true;\n}"))
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let b = tree.resolve("b").await.unwrap();
        let mut option = tree.option(b).unwrap();

        assert_eq!(
            option.declared_by().await.unwrap(),
            vec![Declaration {
                file: "/nix/store/src/toy.nix".to_string(),
                line: 12,
                column: 5,
            }]
        );
        assert_eq!(
            option.defined_by().await.unwrap(),
            vec![
                Definition {
                    file: "/etc/nixos/configuration.nix".to_string(),
                    value: Some(Value::String("x".to_string())),
                },
                Definition {
                    file: "/etc/nixos/hardware.nix".to_string(),
                    value: Some(Value::Raw("{\n  enable = true;\n}".to_string())),
                },
            ]
        );
    }

    // the malformed declaration is dropped before its column is requested
    let mut expected = vec![
        "toy.options".to_string(),
        "toy.options.b".to_string(),
        format!("builtins.length ({declarations})"),
        field(declarations, 0, "file"),
        field(declarations, 0, "line"),
        field(declarations, 0, "column"),
        field(declarations, 1, "file"),
        field(declarations, 1, "line"),
        format!("builtins.length ({definitions})"),
    ];
    for index in 0..2 {
        expected.push(field(definitions, index, "file"));
        expected.push(field(definitions, index, "value"));
    }
    assert_eq!(transcript.expressions(), expected);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_escaped_attribute_names_are_selected_as_rendered() {
    let (mut session, transcript) = toy_host()
        .reply("toy.options", out("{\n  \"a\\\\b\" = { ... };\n  b = { ... };\n}"))
        .reply(
            r#"toy.options."a\\b""#,
            out("{ _type = \"option\"; type = { ... }; }"),
        )
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let options = tree.list("").await.unwrap();
        let paths: Vec<&str> = options.iter().map(|id| tree.node(*id).path()).collect();
        assert_eq!(paths, vec![r#""a\\b""#, "b"]);

        let root = tree.resolve("").await.unwrap();
        let names: Vec<&String> = tree.node(root).children().unwrap().keys().collect();
        assert_eq!(names, vec!["a\\b", "b"]);
    }
    assert_eq!(
        transcript.expressions(),
        vec!["toy.options", r#"toy.options."a\\b""#, "toy.options.b"]
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_json_export_materializes_nested_values() {
    let (mut session, transcript) = toy_host()
        .reply("toy.options", out("{\n  b = { ... };\n  p = { ... };\n  q = { ... };\n}"))
        .reply("toy.options.p", out("{ _type = \"option\"; type = { ... }; }"))
        .reply("toy.options.q", out("{ _type = \"option\"; type = { ... }; }"))
        .reply("toy.config.p", out("[ 22 2222 ]"))
        .reply("builtins.length (toy.config.p)", out("2"))
        .reply("(builtins.elemAt (toy.config.p) 0)", out("22"))
        .reply("(builtins.elemAt (toy.config.p) 1)", out("2222"))
        .reply("toy.config.q", out("{\n  hosts = [ ... ];\n  port = 22;\n}"))
        .reply("toy.config.q.hosts", out("[ \"example.org\" ]"))
        .reply("builtins.length (toy.config.q.hosts)", out("1"))
        .reply("(builtins.elemAt (toy.config.q.hosts) 0)", out("\"example.org\""))
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config());
        let mut json = Vec::new();
        handle_list(&mut tree, None, true, &mut json).await.unwrap();
        let exported: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(
            exported,
            serde_json::json!({
                "b": "x",
                "p": [22, 2222],
                "q": { "hosts": ["example.org"], "port": 22 }
            })
        );
    }
    assert_eq!(
        transcript.expressions(),
        vec![
            "toy.options",
            "toy.options.b",
            "toy.options.p",
            "toy.options.q",
            "toy.config.b",
            "toy.config.p",
            "builtins.length (toy.config.p)",
            "(builtins.elemAt (toy.config.p) 0)",
            "(builtins.elemAt (toy.config.p) 1)",
            "toy.config.q",
            "toy.config.q.hosts",
            "builtins.length (toy.config.q.hosts)",
            "(builtins.elemAt (toy.config.q.hosts) 0)",
        ]
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_json_export_leaves_skipped_values_null() {
    let (mut session, transcript) = toy_host()
        .reply("toy.config.b", out("{\n  big = { ... };\n  small = 1;\n}"))
        .start(SessionConfig::default());
    {
        let mut tree = Tree::new(&mut session, toy_config().with_skip(["b.big"]));
        let b = tree.resolve("b").await.unwrap();
        let value = tree.option(b).unwrap().json_value().await.unwrap();
        assert_eq!(value, serde_json::json!({ "big": null, "small": 1 }));
    }
    assert_eq!(
        transcript.expressions(),
        vec!["toy.options", "toy.options.b", "toy.config.b"]
    );
    session.close().await.unwrap();
}
