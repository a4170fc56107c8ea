/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use script_bindings_codegen::idl::{Definitions, Location, Signature};
use script_bindings_codegen::overload::{OverloadSet, Selection, ValueClass};
use script_bindings_codegen::proxy::{ObjectState, PropertyKey, TrapPlan};
use script_bindings_codegen::{BindingsGenerator, CodegenConfig, Error, UnitKind};
use serde_json::json;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn definitions() -> Definitions {
    let node = json!({ "kind": "interface", "name": "Node" });
    let nullable_node = json!({ "kind": "interface", "name": "Node", "nullable": true });
    let dom_string = json!({ "kind": "string", "string": "dom_string" });
    let unsigned_long = json!({ "kind": "primitive", "primitive": "unsigned_long" });
    serde_json::from_value(json!({
        "interfaces": [
            {
                "name": "Node",
                "location": { "file": "Node.webidl", "line": 12 },
                "operations": [{
                    "name": "appendChild",
                    "flags": "THROWS | CE_REACTIONS",
                    "signatures": [{
                        "return_type": node,
                        "arguments": [{ "name": "node", "type": node }],
                    }],
                }],
                "attributes": [{ "name": "nodeName", "type": dom_string, "readonly": true }],
            },
            {
                "name": "HTMLCollection",
                "flags": "LEGACY_UNENUMERABLE_NAMED_PROPERTIES",
                "attributes": [{ "name": "length", "type": unsigned_long, "readonly": true }],
                "indexed_getter": {
                    "signature": {
                        "return_type": nullable_node,
                        "arguments": [{ "name": "index", "type": unsigned_long }],
                    },
                },
                "named_getter": {
                    "signature": {
                        "return_type": nullable_node,
                        "arguments": [{ "name": "name", "type": dom_string }],
                    },
                },
            },
        ],
        "dictionaries": [
            {
                "name": "MouseEventInit",
                "parent": "EventInit",
                "members": [{
                    "name": "button",
                    "type": { "kind": "primitive", "primitive": "short" },
                    "default": { "kind": "integer", "value": 0 },
                }],
            },
            {
                "name": "EventInit",
                "members": [{
                    "name": "bubbles",
                    "type": { "kind": "primitive", "primitive": "boolean" },
                    "default": { "kind": "boolean", "value": false },
                }],
            },
        ],
        "enums": [{ "name": "ScrollBehavior", "values": ["auto", "instant", "smooth"] }],
        "callbacks": [{ "name": "VoidFunction", "operations": [{ "name": "call", "signature": {} }] }],
    }))
    .unwrap()
}

#[test]
fn every_unit_starts_with_the_runtime_imports() {
    init_logger();
    let config: CodegenConfig = serde_json::from_value(json!({ "crate_path": "script_bindings" })).unwrap();
    let generator = BindingsGenerator::new(definitions(), config).unwrap();
    let units = generator.generate_all().unwrap();
    assert_eq!(units.len(), 7);
    for unit in &units {
        let import = match unit.kind {
            UnitKind::Interface => "use script_bindings::import::module::*;",
            _ => "use script_bindings::import::base::*;",
        };
        assert!(unit.code.starts_with("#![allow("), "{}", unit.name);
        assert!(unit.code.contains(import), "{}", unit.name);
    }
}

#[test]
fn parent_dictionaries_are_generated_first() {
    init_logger();
    let generator = BindingsGenerator::new(definitions(), CodegenConfig::default()).unwrap();
    let names: Vec<_> = generator
        .generate_all()
        .unwrap()
        .into_iter()
        .filter(|unit| unit.kind == UnitKind::Dictionary)
        .map(|unit| unit.name)
        .collect();
    assert_eq!(names, ["EventInit", "MouseEventInit"]);
}

#[test]
fn configured_native_types_are_used() {
    init_logger();
    let config: CodegenConfig = serde_json::from_value(json!({
        "descriptors": { "Node": { "native_type": "NodeImpl", "can_gc": ["appendChild"] } },
    }))
    .unwrap();
    let generator = BindingsGenerator::new(definitions(), config).unwrap();
    let code = generator.generate_interface("Node").unwrap();
    assert!(code.contains("let this = &*(this as *const NodeImpl);"));
    assert!(code.contains("root_from_handlevalue::<NodeImpl>"));
    assert!(code.contains("this.AppendChild(&arg0, CanGc::note())"));
}

#[test]
fn unenumerable_names_stay_out_of_enumeration() {
    init_logger();
    let generator = BindingsGenerator::new(definitions(), CodegenConfig::default()).unwrap();
    let code = generator.generate_interface("HTMLCollection").unwrap();
    let keys = code.find("fn own_property_keys(").unwrap();
    let enumerable = code.find("fn getOwnEnumerablePropertyKeys(").unwrap();
    let has_own = code.find("fn hasOwn(").unwrap();
    assert!(code[keys..enumerable].contains("SupportedPropertyNames()"));
    assert!(!code[enumerable..has_own].contains("SupportedPropertyNames()"));
    // Named descriptors are neither enumerable nor writable.
    assert!(code.contains("(JSPROP_READONLY) as u32"));
}

#[test]
fn collection_keys_list_indices_before_names() {
    let definitions = definitions();
    let collection = &definitions.interfaces["HTMLCollection"];
    let generator = BindingsGenerator::new(definitions.clone(), CodegenConfig::default()).unwrap();
    let descriptor = generator.context().descriptor("HTMLCollection", &Location::default()).unwrap();
    let plan = TrapPlan::new(collection, descriptor).unwrap();
    let state = ObjectState {
        length: 2,
        names: vec!["a".to_owned(), "b".to_owned()],
        expandos: vec!["extra".to_owned()],
        prototype: vec![],
    };
    assert_eq!(plan.own_property_keys(&state), ["0", "1", "a", "b", "extra"]);
    assert!(plan.has_own(&PropertyKey::Index(1), &state));
    assert!(!plan.has_own(&PropertyKey::Index(2), &state));
}

#[test]
fn null_and_array_likes_pick_their_overloads() {
    let definitions: Definitions = serde_json::from_value(json!({
        "interfaces": [{ "name": "Node" }],
    }))
    .unwrap();
    let signatures = serde_json::from_value::<Vec<Signature>>(json!([
        { "arguments": [{ "name": "node", "type": { "kind": "interface", "name": "Node", "nullable": true } }] },
        { "arguments": [{
            "name": "values",
            "type": { "kind": "sequence", "element": { "kind": "primitive", "primitive": "long" } },
        }] },
    ]))
    .unwrap();
    let plan = OverloadSet::new(&definitions, "Test.f", &signatures, &Location::default())
        .plan()
        .unwrap();
    assert_eq!(plan.select(1, &[ValueClass::Null]), Selection::Call(0));
    assert_eq!(plan.select(1, &[ValueClass::ArrayLike]), Selection::Call(1));
    assert_eq!(plan.select(1, &[ValueClass::platform_object("Node")]), Selection::Call(0));
    assert_eq!(plan.select(0, &[]), Selection::NotEnoughArguments);
}

#[test]
fn optional_interface_arguments_stay_optional_when_overloaded() {
    init_logger();
    let definitions: Definitions = serde_json::from_value(json!({
        "interfaces": [
            { "name": "Node" },
            {
                "name": "Doc",
                "operations": [{
                    "name": "f",
                    "signatures": [
                        { "arguments": [{
                            "name": "node",
                            "type": { "kind": "interface", "name": "Node" },
                            "optional": true,
                        }] },
                        { "arguments": [{
                            "name": "text",
                            "type": { "kind": "string", "string": "dom_string" },
                        }] },
                    ],
                }],
            },
        ],
    }))
    .unwrap();
    let generator = BindingsGenerator::new(definitions, CodegenConfig::default()).unwrap();
    let code = generator.generate_interface("Doc").unwrap();
    let attempt = code.find("'_block: {\n").unwrap();
    assert!(!code.contains("'_block: {{"));
    assert!(code[attempt..].contains("let arg0: Option<DomRoot<Node>> = if"));
    assert!(!code.contains("let arg0: DomRoot<Node> ="));
    assert!(code[attempt..].contains("this.F(arg0.as_deref())"));
}

#[test]
fn invalid_enum_values_name_their_location() {
    init_logger();
    let definitions: Definitions = serde_json::from_value(json!({
        "enums": [{
            "name": "Greeting",
            "values": ["caf\u{e9}"],
            "location": { "file": "Greeting.webidl", "line": 4 },
        }],
    }))
    .unwrap();
    let generator = BindingsGenerator::new(definitions, CodegenConfig::default()).unwrap();
    let error = generator.generate_enum("Greeting").unwrap_err();
    assert!(matches!(error, Error::InvalidEnumValue { .. }));
    assert!(error.to_string().starts_with("Greeting.webidl:4: enum value"));
}

#[test]
fn unknown_interfaces_are_reported() {
    init_logger();
    let definitions: Definitions = serde_json::from_value(json!({
        "dictionaries": [{
            "name": "Init",
            "members": [{ "name": "target", "type": { "kind": "interface", "name": "Missing" } }],
        }],
    }))
    .unwrap();
    let error = BindingsGenerator::new(definitions, CodegenConfig::default())
        .and_then(|generator| generator.generate_dictionary("Init"))
        .unwrap_err();
    assert!(matches!(error, Error::UnknownDefinition { kind: "interface", .. }));
}
