/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Options for a generation run.

use indexmap::IndexMap;
use serde::Deserialize;

/// How the native side holds an instance of an interface.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// A reflected DOM object, rooted as `DomRoot<T>` while native code holds it.
    #[default]
    Reflected,
    /// A `WindowProxy`, unwrapped through its own helper.
    WindowProxy,
}

/// Per-interface overrides of what would otherwise be derived from the IDL.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DescriptorConfig {
    /// The Rust type implementing the interface; defaults to the interface name.
    pub native_type: Option<String>,
    pub ownership: Ownership,
    /// Forces proxy backing on or off.
    pub proxy: Option<bool>,
    /// `[LegacyOverrideBuiltIns]`
    pub override_builtins: bool,
    /// Members that never fail, even when the IDL says `[Throws]`.
    pub infallible: Vec<String>,
    /// Members that fail although the IDL does not say so.
    pub throws: Vec<String>,
    /// Members that run custom element reactions.
    pub ce_reactions: Vec<String>,
    /// Members whose native implementation takes a `CanGc` token.
    pub can_gc: Vec<String>,
}

/// Options for a generation run.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodegenConfig {
    pub descriptors: IndexMap<String, DescriptorConfig>,
    /// Path prefix for runtime imports in generated code.
    pub crate_path: String,
    /// Upper bound of the capacity reserved up front for variadic arguments.
    pub max_variadic_preallocation: usize,
}

impl Default for CodegenConfig {
    fn default() -> CodegenConfig {
        CodegenConfig {
            descriptors: IndexMap::new(),
            crate_path: "crate".to_owned(),
            max_variadic_preallocation: 16,
        }
    }
}

impl CodegenConfig {
    /// The `use` prefix for a runtime module, e.g. `crate::dom::bindings`.
    pub fn runtime_path(&self, module: &str) -> String {
        format!("{}::{module}", self.crate_path)
    }
}
