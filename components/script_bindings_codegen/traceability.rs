/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Which generated structures hold garbage-collected values and must be traced.
//!
//! The result for every dictionary is computed once, up front, so generators can
//! look it up regardless of the order in which units are produced.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::idl::{Definitions, IdlType, TypeKind};

#[derive(Clone, Debug, Default)]
pub struct TraceAnalysis {
    dictionaries: HashMap<String, bool>,
}

impl TraceAnalysis {
    pub fn analyse(definitions: &Definitions) -> Result<TraceAnalysis> {
        let mut analysis = TraceAnalysis::default();
        let mut visiting = HashSet::new();
        for name in definitions.dictionaries.keys() {
            analysis.visit(definitions, name, &mut visiting)?;
        }
        Ok(analysis)
    }

    fn visit(
        &mut self,
        definitions: &Definitions,
        name: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<bool> {
        if let Some(needs_tracing) = self.dictionaries.get(name) {
            return Ok(*needs_tracing);
        }
        let Some(dictionary) = definitions.dictionaries.get(name) else {
            // Unknown references are reported by the generator that resolves them.
            return Ok(false);
        };
        if !visiting.insert(name.to_owned()) {
            return Err(Error::DictionaryCycle {
                dictionary: name.to_owned(),
                location: dictionary.location.clone(),
            });
        }

        let mut needs_tracing = false;
        if let Some(parent) = &dictionary.parent {
            needs_tracing |= self.visit(definitions, parent, visiting)?;
        }
        for member in &dictionary.members {
            needs_tracing |= self.visit_type(definitions, &member.ty, visiting)?;
        }

        visiting.remove(name);
        trace!("dictionary {} needs tracing: {}", name, needs_tracing);
        self.dictionaries.insert(name.to_owned(), needs_tracing);
        Ok(needs_tracing)
    }

    fn visit_type(
        &mut self,
        definitions: &Definitions,
        ty: &IdlType,
        visiting: &mut HashSet<String>,
    ) -> Result<bool> {
        Ok(match &ty.kind {
            TypeKind::Any | TypeKind::Object | TypeKind::BufferSource { .. } => true,
            TypeKind::Sequence { element } => self.visit_type(definitions, element, visiting)?,
            TypeKind::Record { value, .. } => self.visit_type(definitions, value, visiting)?,
            TypeKind::Union { members } => {
                let mut needs_tracing = false;
                for member in members {
                    needs_tracing |= self.visit_type(definitions, member, visiting)?;
                }
                needs_tracing
            },
            TypeKind::Dictionary { name } => self.visit(definitions, name, visiting)?,
            _ => false,
        })
    }

    pub fn dictionary_needs_tracing(&self, name: &str) -> bool {
        self.dictionaries.get(name).copied().unwrap_or(false)
    }

    /// Whether a value of `ty` holds GC things once converted to native.
    pub fn type_needs_tracing(&self, ty: &IdlType) -> bool {
        match &ty.kind {
            TypeKind::Any | TypeKind::Object | TypeKind::BufferSource { .. } => true,
            TypeKind::Sequence { element } => self.type_needs_tracing(element),
            TypeKind::Record { value, .. } => self.type_needs_tracing(value),
            TypeKind::Union { members } => members.iter().any(|member| self.type_needs_tracing(member)),
            TypeKind::Dictionary { name } => self.dictionary_needs_tracing(name),
            _ => false,
        }
    }
}

/// Dictionary names ordered so that every parent precedes its children.
pub fn dictionary_order(definitions: &Definitions) -> Result<Vec<&str>> {
    let mut order: Vec<&str> = Vec::with_capacity(definitions.dictionaries.len());
    let mut placed = HashSet::new();
    for dictionary in definitions.dictionaries.values() {
        let mut chain = Vec::new();
        let mut current = Some(dictionary);
        while let Some(dictionary) = current {
            if placed.contains(dictionary.name.as_str()) {
                break;
            }
            if chain.contains(&dictionary.name.as_str()) {
                return Err(Error::DictionaryCycle {
                    dictionary: dictionary.name.clone(),
                    location: dictionary.location.clone(),
                });
            }
            chain.push(dictionary.name.as_str());
            current = match &dictionary.parent {
                Some(parent) => Some(definitions.dictionary(parent, &dictionary.location)?),
                None => None,
            };
        }
        for name in chain.into_iter().rev() {
            placed.insert(name);
            order.push(name);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{Dictionary, DictionaryMember};

    fn dictionary(name: &str, parent: Option<&str>, members: Vec<DictionaryMember>) -> Dictionary {
        Dictionary {
            name: name.to_owned(),
            parent: parent.map(str::to_owned),
            members,
            ..Default::default()
        }
    }

    #[test]
    fn tracing_propagates_through_parents_and_members() {
        let mut definitions = Definitions::default();
        definitions.add_dictionary(dictionary("Child", Some("Base"), vec![]));
        definitions.add_dictionary(dictionary(
            "Base",
            None,
            vec![DictionaryMember::new("detail", IdlType::any())],
        ));
        definitions.add_dictionary(dictionary(
            "Holder",
            None,
            vec![DictionaryMember::new(
                "children",
                IdlType::sequence(IdlType::dictionary("Child")),
            )],
        ));
        definitions.add_dictionary(dictionary(
            "Plain",
            None,
            vec![DictionaryMember::new("count", IdlType::long())],
        ));

        let analysis = TraceAnalysis::analyse(&definitions).unwrap();
        assert!(analysis.dictionary_needs_tracing("Base"));
        assert!(analysis.dictionary_needs_tracing("Child"));
        assert!(analysis.dictionary_needs_tracing("Holder"));
        assert!(!analysis.dictionary_needs_tracing("Plain"));
    }

    #[test]
    fn inheritance_cycles_are_rejected() {
        let mut definitions = Definitions::default();
        definitions.add_dictionary(dictionary("A", Some("B"), vec![]));
        definitions.add_dictionary(dictionary("B", Some("A"), vec![]));
        assert!(matches!(
            TraceAnalysis::analyse(&definitions),
            Err(Error::DictionaryCycle { .. })
        ));
        assert!(dictionary_order(&definitions).is_err());
    }

    #[test]
    fn parents_come_first() {
        let mut definitions = Definitions::default();
        definitions.add_dictionary(dictionary("Leaf", Some("Middle"), vec![]));
        definitions.add_dictionary(dictionary("Middle", Some("Root"), vec![]));
        definitions.add_dictionary(dictionary("Root", None, vec![]));
        assert_eq!(
            dictionary_order(&definitions).unwrap(),
            ["Root", "Middle", "Leaf"]
        );
    }
}
