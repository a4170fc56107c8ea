/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Resolution of interface names to native type information.

use indexmap::IndexMap;

pub use crate::config::Ownership;
use crate::config::{CodegenConfig, DescriptorConfig};
use crate::idl::{Definitions, Interface, InterfaceFlags, MemberFlags};

/// The generation-relevant policy of a single member.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MemberPolicy {
    pub throws: bool,
    pub ce_reactions: bool,
    pub can_gc: bool,
}

/// What the generators need to know about the native side of an interface.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub interface: String,
    pub native_type: String,
    pub ownership: Ownership,
    /// Whether instances are backed by a proxy with interception traps.
    pub proxy: bool,
    pub override_builtins: bool,
    infallible: Vec<String>,
    throws: Vec<String>,
    ce_reactions: Vec<String>,
    can_gc: Vec<String>,
}

impl Descriptor {
    pub fn new(interface: &Interface, config: Option<&DescriptorConfig>) -> Descriptor {
        let config = config.cloned().unwrap_or_default();
        Descriptor {
            interface: interface.name.clone(),
            native_type: config
                .native_type
                .unwrap_or_else(|| interface.name.clone()),
            ownership: config.ownership,
            proxy: config
                .proxy
                .unwrap_or_else(|| interface.is_legacy_platform_object()),
            override_builtins: config.override_builtins ||
                interface
                    .flags
                    .contains(InterfaceFlags::LEGACY_OVERRIDE_BUILTINS),
            infallible: config.infallible,
            throws: config.throws,
            ce_reactions: config.ce_reactions,
            can_gc: config.can_gc,
        }
    }

    /// Combines the member's IDL flags with the configured overrides.
    pub fn member_policy(&self, member: &str, flags: MemberFlags) -> MemberPolicy {
        let listed = |list: &[String]| list.iter().any(|name| name == member);
        MemberPolicy {
            throws: (flags.contains(MemberFlags::THROWS) || listed(&self.throws)) &&
                !listed(&self.infallible),
            ce_reactions: flags.contains(MemberFlags::CE_REACTIONS) || listed(&self.ce_reactions),
            can_gc: flags.contains(MemberFlags::CAN_GC) || listed(&self.can_gc),
        }
    }

    fn native_name(&self) -> &str {
        match self.ownership {
            Ownership::Reflected => &self.native_type,
            Ownership::WindowProxy => "WindowProxy",
        }
    }

    /// The type an unwrapped value of this interface is declared with.
    pub fn storage_type(&self, storage: InterfaceStorage) -> String {
        match storage {
            InterfaceStorage::Inline | InterfaceStorage::Argument => {
                format!("DomRoot<{}>", self.native_name())
            },
            InterfaceStorage::VariadicElement => format!("Dom<{}>", self.native_name()),
        }
    }

    pub fn argument_type(&self) -> String {
        self.storage_type(InterfaceStorage::Argument)
    }

    /// The type a native method returns for this interface type.
    pub fn return_type(&self) -> String {
        self.storage_type(InterfaceStorage::Inline)
    }

    /// The expression unwrapping `${val}` into the native type.
    pub fn unwrap_expression(&self) -> String {
        match self.ownership {
            Ownership::Reflected => format!(
                "root_from_handlevalue::<{}>(${{val}}, *cx)",
                self.native_type
            ),
            Ownership::WindowProxy => "windowproxy_from_handlevalue(${val}, *cx)".to_owned(),
        }
    }
}

/// Where an unwrapped interface value lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceStorage {
    /// Held directly: a field of a dictionary or union, a container element
    /// or a returned value.
    Inline,
    /// A local lent to the native method.
    Argument,
    /// An element of the `rooted_vec!` collecting a variadic list; the vector
    /// keeps it alive.
    VariadicElement,
}

/// Looks up descriptors by interface name.
pub trait DescriptorProvider {
    fn descriptor(&self, interface: &str) -> Option<&Descriptor>;
}

/// The descriptors of every interface of a run.
#[derive(Clone, Debug, Default)]
pub struct DescriptorTable {
    descriptors: IndexMap<String, Descriptor>,
}

impl DescriptorTable {
    pub fn from_config(config: &CodegenConfig, definitions: &Definitions) -> DescriptorTable {
        for name in config.descriptors.keys() {
            if !definitions.interfaces.contains_key(name) {
                warn!("descriptor configured for unknown interface {}", name);
            }
        }
        let descriptors = definitions
            .interfaces
            .values()
            .map(|interface| {
                let descriptor = Descriptor::new(interface, config.descriptors.get(&interface.name));
                (interface.name.clone(), descriptor)
            })
            .collect();
        DescriptorTable { descriptors }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl DescriptorProvider for DescriptorTable {
    fn descriptor(&self, interface: &str) -> Option<&Descriptor> {
        self.descriptors.get(interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{IdlType, SpecialOperation, Signature};

    fn collection() -> Interface {
        Interface {
            name: "HTMLCollection".to_owned(),
            indexed_getter: Some(SpecialOperation {
                signature: Signature::new(IdlType::interface("Element").nullable(), vec![]),
                flags: MemberFlags::empty(),
                location: Default::default(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn collections_are_proxies_by_default() {
        let descriptor = Descriptor::new(&collection(), None);
        assert!(descriptor.proxy);
        assert_eq!(descriptor.native_type, "HTMLCollection");
        assert_eq!(descriptor.argument_type(), "DomRoot<HTMLCollection>");
    }

    #[test]
    fn variadic_elements_are_stored_unrooted() {
        let descriptor = Descriptor::new(&collection(), None);
        assert_eq!(descriptor.return_type(), "DomRoot<HTMLCollection>");
        assert_eq!(
            descriptor.storage_type(InterfaceStorage::VariadicElement),
            "Dom<HTMLCollection>"
        );
    }

    #[test]
    fn configuration_overrides_member_policy() {
        let config = DescriptorConfig {
            infallible: vec!["item".to_owned()],
            ce_reactions: vec!["remove".to_owned()],
            ..Default::default()
        };
        let descriptor = Descriptor::new(&collection(), Some(&config));
        assert!(!descriptor.member_policy("item", MemberFlags::THROWS).throws);
        assert!(descriptor.member_policy("namedItem", MemberFlags::THROWS).throws);
        assert!(descriptor
            .member_policy("remove", MemberFlags::empty())
            .ce_reactions);
    }
}
