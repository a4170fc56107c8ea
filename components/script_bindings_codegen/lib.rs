/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Generates the Rust glue that exposes WebIDL interfaces, dictionaries,
//! enumerations and callbacks to SpiderMonkey.
//!
//! The input is an already-resolved WebIDL tree ([`idl::Definitions`]) together
//! with a descriptor table mapping interface names to native types. The output is
//! Rust source text written against the `js` and `script_bindings` runtime crates.
//!
//! Every generator receives an explicit read-only [`Context`]; nothing here keeps
//! global state, so units can be generated independently and in any order.

#[macro_use]
extern crate log;

pub mod call;
pub mod callback;
pub mod config;
pub mod conversions;
pub mod descriptor;
pub mod dictionary;
pub mod enums;
pub mod error;
pub mod fragment;
pub mod idl;
pub mod interface;
pub mod overload;
pub mod proxy;
pub mod traceability;
pub mod unions;

use indexmap::IndexMap;

pub use crate::config::CodegenConfig;
pub use crate::descriptor::{Descriptor, DescriptorProvider, DescriptorTable};
pub use crate::error::{Error, Result};
use crate::idl::{Callback, Definitions, Dictionary, Enum, Interface, Location};
use crate::traceability::TraceAnalysis;

/// Everything a generator may consult while producing a unit.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub definitions: &'a Definitions,
    pub descriptors: &'a dyn DescriptorProvider,
    pub traces: &'a TraceAnalysis,
    pub config: &'a CodegenConfig,
}

impl<'a> Context<'a> {
    pub fn descriptor(&self, interface: &str, location: &Location) -> Result<&'a Descriptor> {
        self.descriptors
            .descriptor(interface)
            .ok_or_else(|| Error::UnknownDefinition {
                kind: "interface",
                name: interface.to_owned(),
                location: location.clone(),
            })
    }

    pub fn dictionary(&self, name: &str, location: &Location) -> Result<&'a Dictionary> {
        self.definitions.dictionary(name, location)
    }

    pub fn enumeration(&self, name: &str, location: &Location) -> Result<&'a Enum> {
        self.definitions.enumeration(name, location)
    }

    pub fn callback(&self, name: &str, location: &Location) -> Result<&'a Callback> {
        self.definitions.callback(name, location)
    }

    pub fn interface(&self, name: &str, location: &Location) -> Result<&'a Interface> {
        self.definitions.interface(name, location)
    }
}

/// The kind of a generated unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::IntoStaticStr)]
pub enum UnitKind {
    Interface,
    Dictionary,
    Enum,
    Callback,
    Unions,
}

/// One independently emittable piece of generated code.
#[derive(Clone, Debug)]
pub struct GeneratedUnit {
    pub name: String,
    pub kind: UnitKind,
    pub code: String,
}

/// Owns the analysed inputs and hands out [`Context`]s to the individual
/// generators.
pub struct BindingsGenerator {
    definitions: Definitions,
    config: CodegenConfig,
    descriptors: DescriptorTable,
    traces: TraceAnalysis,
}

impl BindingsGenerator {
    pub fn new(definitions: Definitions, config: CodegenConfig) -> Result<BindingsGenerator> {
        definitions.validate()?;
        let descriptors = DescriptorTable::from_config(&config, &definitions);
        let traces = TraceAnalysis::analyse(&definitions)?;
        Ok(BindingsGenerator {
            definitions,
            config,
            descriptors,
            traces,
        })
    }

    pub fn context(&self) -> Context<'_> {
        Context {
            definitions: &self.definitions,
            descriptors: &self.descriptors,
            traces: &self.traces,
            config: &self.config,
        }
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn generate_dictionary(&self, name: &str) -> Result<String> {
        let dictionary = self.definitions.dictionary(name, &Location::default())?;
        dictionary::DictionaryGenerator::new(self.context(), dictionary)?.generate()
    }

    pub fn generate_enum(&self, name: &str) -> Result<String> {
        let enumeration = self.definitions.enumeration(name, &Location::default())?;
        enums::generate_enum(enumeration, &self.config)
    }

    pub fn generate_callback(&self, name: &str) -> Result<String> {
        let callback = self.definitions.callback(name, &Location::default())?;
        callback::CallbackGenerator::new(self.context(), callback).generate()
    }

    pub fn generate_interface(&self, name: &str) -> Result<String> {
        let interface = self.definitions.interface(name, &Location::default())?;
        interface::InterfaceGenerator::new(self.context(), interface)?.generate()
    }

    pub fn generate_unions(&self) -> Result<String> {
        unions::generate_union_types(self.context())
    }

    /// The runtime imports a unit of the given kind starts with.
    pub fn prelude(&self, kind: UnitKind) -> String {
        let module = match kind {
            UnitKind::Interface => "import::module::*",
            _ => "import::base::*",
        };
        format!(
            "#![allow(non_snake_case, unused_imports, unused_variables)]\n\nuse {};\n",
            self.config.runtime_path(module)
        )
    }

    /// Generates every unit. Dictionaries come out parents first; all other
    /// units are independent of each other.
    pub fn generate_all(&self) -> Result<Vec<GeneratedUnit>> {
        let mut units = Vec::new();
        let mut push = |name: &str, kind: UnitKind, code: String| {
            debug!("generated {} {}", <&str>::from(kind), name);
            units.push(GeneratedUnit {
                name: name.to_owned(),
                kind,
                code: format!("{}\n{code}", self.prelude(kind)),
            });
        };

        for name in self.definitions.enums.keys() {
            push(name, UnitKind::Enum, self.generate_enum(name)?);
        }
        for name in traceability::dictionary_order(&self.definitions)? {
            push(name, UnitKind::Dictionary, self.generate_dictionary(name)?);
        }
        for name in self.definitions.callbacks.keys() {
            push(name, UnitKind::Callback, self.generate_callback(name)?);
        }
        for name in self.definitions.interfaces.keys() {
            push(name, UnitKind::Interface, self.generate_interface(name)?);
        }
        push("UnionTypes", UnitKind::Unions, self.generate_unions()?);
        Ok(units)
    }

    /// Generated code keyed by unit name, for drivers that write one file per unit.
    pub fn generate_by_name(&self) -> Result<IndexMap<String, String>> {
        Ok(self
            .generate_all()?
            .into_iter()
            .map(|unit| (unit.name, unit.code))
            .collect())
    }
}
