/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Union types: one Rust enum per distinct union, with conversions that follow
//! the WebIDL union conversion algorithm.

use indexmap::IndexMap;
use itertools::Itertools;

use crate::Context;
use crate::conversions::{ConversionContext, MemberKind, type_to_native};
use crate::error::{Error, Result};
use crate::fragment::{Fragment, fill};
use crate::idl::{
    CallbackKind, Definitions, IdlType, Location, Signature, TypeCategory, TypeKind,
};

/// The Rust name of a union type, e.g. `StringOrLongSequence`.
pub fn union_type_name(ty: &IdlType) -> String {
    ty.flattened_members()
        .into_iter()
        .map(union_variant_name)
        .join("Or")
}

/// The variant holding `member`; nullability belongs to the whole union.
pub fn union_variant_name(member: &IdlType) -> String {
    member.inner().variant_name()
}

fn snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if previous_lower {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
            previous_lower = false;
        } else {
            snake.push(c);
            previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    snake
}

/// Rejects unions whose members cannot be told apart at runtime.
pub fn validate_union(definitions: &Definitions, ty: &IdlType, location: &Location) -> Result<()> {
    let invalid = |reason| Error::InvalidUnion {
        union: ty.to_string(),
        reason,
        location: location.clone(),
    };
    let members = ty.flattened_members();
    let count = |category: TypeCategory| {
        members
            .iter()
            .filter(|member| member.category(definitions) == category)
            .count()
    };

    if members.iter().any(|member| member.is_any() || member.is_promise()) {
        return Err(invalid("cannot contain any or Promise"));
    }
    if count(TypeCategory::DictionaryLike) > 1 {
        return Err(invalid("has more than one dictionary-like member"));
    }
    if count(TypeCategory::SequenceLike) > 1 {
        return Err(invalid("has more than one sequence member"));
    }
    if count(TypeCategory::String) > 1 {
        return Err(invalid("has more than one string or enum member"));
    }
    if count(TypeCategory::Numeric) > 1 {
        return Err(invalid("has more than one numeric member"));
    }
    if count(TypeCategory::Boolean) > 1 {
        return Err(invalid("has more than one boolean member"));
    }
    if count(TypeCategory::Object) > 0 &&
        members.len() > 1 &&
        members.iter().any(|member| {
            matches!(
                member.category(definitions),
                TypeCategory::InterfaceLike |
                    TypeCategory::CallbackFunction |
                    TypeCategory::DictionaryLike |
                    TypeCategory::SequenceLike |
                    TypeCategory::Object
            ) && !member.is_object()
        })
    {
        return Err(invalid("combines object with another object type"));
    }
    if ty.includes_nullable() && count(TypeCategory::DictionaryLike) > 0 {
        return Err(invalid("is nullable and has a dictionary member"));
    }
    Ok(())
}

/// Generates the declaration and conversions of one union type.
pub struct UnionGenerator<'a> {
    ctx: Context<'a>,
    ty: &'a IdlType,
    name: String,
    location: &'a Location,
}

impl<'a> UnionGenerator<'a> {
    pub fn new(ctx: Context<'a>, ty: &'a IdlType, location: &'a Location) -> Result<Self> {
        validate_union(ctx.definitions, ty, location)?;
        Ok(UnionGenerator {
            ctx,
            ty,
            name: union_type_name(ty),
            location,
        })
    }

    fn member_context(&self, member: &IdlType) -> ConversionContext {
        let cc = ConversionContext::new("value", self.location)
            .member(MemberKind::Union)
            .with_failure("return Ok(None);")
            .with_exception("return Err(());")
            .soft_enum();
        if member.is_boolean() ||
            member.is_numeric() ||
            member.is_string() ||
            member.is_enum() ||
            member.is_dictionary()
        {
            return cc;
        }
        cc.definitely_object()
    }

    pub fn generate(&self) -> Result<String> {
        debug!("generating union {}", self.name);
        let members = self.ty.flattened_members();
        let mut variants = Vec::with_capacity(members.len());
        let mut helpers = Vec::with_capacity(members.len());
        for member in &members {
            let variant = union_variant_name(member);
            let info = type_to_native(self.ctx, &member.inner(), &self.member_context(member))?;
            let decl_type = info
                .decl_type
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "()".to_owned());
            variants.push(format!("{variant}({decl_type}),"));
            helpers.push(fill(
                "
                unsafe fn try_convert_to_${snake}(
                    cx: SafeJSContext,
                    value: HandleValue,
                ) -> Result<Option<${decl_type}>, ()> {
                    $*{body}
                }
                ",
                &[
                    ("snake", &snake_case(&variant)),
                    ("decl_type", &decl_type),
                    ("body", &format!("Ok(Some({}))", info.template.substitute("value"))),
                ],
            )?);
        }

        let derive = if self.ctx.traces.type_needs_tracing(self.ty) {
            "#[derive(JSTraceable)]\n#[cfg_attr(crown, crown::unrooted_must_root_lint::must_root)]"
        } else {
            "#[derive(JSTraceable)]"
        };
        let to_jsval_arms = members
            .iter()
            .map(|member| {
                format!(
                    "{}::{}(ref inner) => inner.to_jsval(cx, rval),",
                    self.name,
                    union_variant_name(member)
                )
            })
            .join("\n");

        fill(
            "
            ${derive}
            pub enum ${name} {
                $*{variants}
            }

            impl ToJSValConvertible for ${name} {
                unsafe fn to_jsval(&self, cx: *mut RawJSContext, rval: MutableHandleValue) {
                    match *self {
                        $*{to_jsval_arms}
                    }
                }
            }

            impl FromJSValConvertible for ${name} {
                type Config = ();
                unsafe fn from_jsval(
                    cx: *mut RawJSContext,
                    value: HandleValue,
                    _option: (),
                ) -> Result<ConversionResult<${name}>, ()> {
                    $*{classification}
                }
            }

            impl ${name} {
                $*{helpers}
            }
            ",
            &[
                ("derive", derive),
                ("name", &self.name),
                ("variants", &variants.join("\n")),
                ("to_jsval_arms", &to_jsval_arms),
                ("classification", &self.classification(&members)?.render()),
                ("helpers", &helpers.join("\n")),
            ],
        )
    }

    fn attempt(&self, member: &IdlType) -> Result<String> {
        let variant = union_variant_name(member);
        fill(
            "
            match ${name}::try_convert_to_${snake}(SafeJSContext::from_ptr(cx), value) {
                Err(_) => return Err(()),
                Ok(Some(value)) => return Ok(ConversionResult::Success(${name}::${variant}(value))),
                Ok(None) => (),
            }
            ",
            &[
                ("name", &self.name),
                ("snake", &snake_case(&variant)),
                ("variant", &variant),
            ],
        )
    }

    fn attempts<'m>(
        &self,
        members: impl IntoIterator<Item = &'m IdlType>,
    ) -> Result<Fragment> {
        let attempts = members
            .into_iter()
            .map(|member| self.attempt(member).map(Fragment::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(Fragment::lines(attempts))
    }

    /// The body of `from_jsval`: object members first, then primitives by
    /// value type, then the string, numeric, boolean fallbacks.
    fn classification(&self, members: &[&IdlType]) -> Result<Fragment> {
        let definitions = self.ctx.definitions;
        let of = |predicate: &dyn Fn(&IdlType) -> bool| {
            members
                .iter()
                .copied()
                .filter(|member| predicate(member))
                .collect::<Vec<_>>()
        };
        let interfaces = of(&|member| member.is_interface() || member.is_buffer_source());
        let sequences = of(&IdlType::is_sequence);
        let callbacks = of(&|member| {
            member.category(definitions) == TypeCategory::CallbackFunction
        });
        let dictionaries = of(&|member| {
            member.is_dictionary() ||
                member.is_record() ||
                matches!(&member.kind, TypeKind::Callback { name }
                    if definitions.callbacks.get(name).is_some_and(|callback| callback.kind == CallbackKind::Interface))
        });
        let objects = of(&IdlType::is_object);
        let booleans = of(&IdlType::is_boolean);
        let numerics = of(&IdlType::is_numeric);
        let strings = of(&|member| member.is_string() || member.is_enum());

        let mut object_branch = Fragment::lines([
            self.attempts(interfaces)?,
        ]);
        if !sequences.is_empty() {
            object_branch.push(Fragment::if_then(
                "is_array_like(cx, value)",
                self.attempts(sequences)?,
            ));
        }
        object_branch.push(self.attempts(callbacks)?);
        object_branch.push(self.attempts(dictionaries.iter().copied())?);
        object_branch.push(self.attempts(objects)?);

        let mut body = Fragment::lines([]);
        if !object_branch.is_empty() {
            body.push(Fragment::if_then("value.get().is_object()", object_branch));
        }
        let null_dictionaries = of(&IdlType::is_dictionary);
        if !null_dictionaries.is_empty() {
            body.push(Fragment::if_then(
                "value.get().is_null_or_undefined()",
                self.attempts(null_dictionaries)?,
            ));
        }
        if !booleans.is_empty() {
            body.push(Fragment::if_then(
                "value.get().is_boolean()",
                self.attempts(booleans.iter().copied())?,
            ));
        }
        if !numerics.is_empty() {
            body.push(Fragment::if_then(
                "value.get().is_number()",
                self.attempts(numerics.iter().copied())?,
            ));
        }
        let fallback = [&strings, &numerics, &booleans]
            .into_iter()
            .find(|candidates| !candidates.is_empty());
        if let Some(fallback) = fallback {
            body.push(self.attempts(fallback.iter().copied())?);
        }

        let names = members.iter().map(|member| member.inner().to_string()).join(", ");
        body.push(Fragment::text(format!(
            "Ok(ConversionResult::Failure({:?}.into()))",
            format!("argument could not be converted to any of: {names}.")
        )));
        Ok(body)
    }
}

fn collect(ty: &IdlType, location: &Location, unions: &mut IndexMap<String, (IdlType, Location)>) {
    match &ty.kind {
        TypeKind::Union { members } => {
            unions
                .entry(union_type_name(ty))
                .or_insert_with(|| (ty.clone(), location.clone()));
            for member in members {
                collect(member, location, unions);
            }
        },
        TypeKind::Sequence { element } => collect(element, location, unions),
        TypeKind::Record { value, .. } => collect(value, location, unions),
        TypeKind::Promise { resolved } => collect(resolved, location, unions),
        _ => {},
    }
}

fn collect_signature(
    signature: &Signature,
    location: &Location,
    unions: &mut IndexMap<String, (IdlType, Location)>,
) {
    collect(&signature.return_type, location, unions);
    for argument in &signature.arguments {
        collect(&argument.ty, location, unions);
    }
}

/// Every distinct union type used anywhere, keyed by its Rust name.
pub fn collect_union_types(definitions: &Definitions) -> IndexMap<String, (IdlType, Location)> {
    let mut unions = IndexMap::new();
    for interface in definitions.interfaces.values() {
        for operation in &interface.operations {
            for signature in &operation.signatures {
                collect_signature(signature, &operation.location, &mut unions);
            }
        }
        for attribute in &interface.attributes {
            collect(&attribute.ty, &attribute.location, &mut unions);
        }
        let special = [
            &interface.indexed_getter,
            &interface.indexed_setter,
            &interface.named_getter,
            &interface.named_setter,
            &interface.named_deleter,
        ];
        for operation in special.into_iter().flatten() {
            collect_signature(&operation.signature, &operation.location, &mut unions);
        }
    }
    for dictionary in definitions.dictionaries.values() {
        for member in &dictionary.members {
            collect(&member.ty, &dictionary.location, &mut unions);
        }
    }
    for callback in definitions.callbacks.values() {
        for operation in &callback.operations {
            collect_signature(&operation.signature, &callback.location, &mut unions);
        }
    }
    unions
}

/// The `UnionTypes` unit.
pub fn generate_union_types(ctx: Context<'_>) -> Result<String> {
    let unions = collect_union_types(ctx.definitions);
    let mut generated = Vec::with_capacity(unions.len());
    for (ty, location) in unions.values() {
        generated.push(UnionGenerator::new(ctx, ty, location)?.generate()?);
    }
    Ok(generated.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{Dictionary, Interface};

    fn definitions() -> Definitions {
        let mut definitions = Definitions::default();
        definitions.add_interface(Interface {
            name: "Node".to_owned(),
            ..Default::default()
        });
        definitions.add_dictionary(Dictionary {
            name: "Init".to_owned(),
            ..Default::default()
        });
        definitions.add_dictionary(Dictionary {
            name: "Other".to_owned(),
            ..Default::default()
        });
        definitions
    }

    #[test]
    fn names_join_flattened_members() {
        let ty = IdlType::union(vec![
            IdlType::interface("Node"),
            IdlType::union(vec![IdlType::dom_string(), IdlType::sequence(IdlType::long())]),
        ]);
        assert_eq!(union_type_name(&ty), "NodeOrStringOrLongSequence");
        assert_eq!(snake_case("LongSequence"), "long_sequence");
        assert_eq!(snake_case("USVString"), "usvstring");
    }

    #[test]
    fn indistinguishable_members_are_rejected() {
        let definitions = definitions();
        let location = Location::default();
        let two_dictionaries =
            IdlType::union(vec![IdlType::dictionary("Init"), IdlType::dictionary("Other")]);
        assert!(validate_union(&definitions, &two_dictionaries, &location).is_err());
        let two_numbers = IdlType::union(vec![IdlType::long(), IdlType::double()]);
        assert!(validate_union(&definitions, &two_numbers, &location).is_err());
        let nullable_dictionary =
            IdlType::union(vec![IdlType::dictionary("Init"), IdlType::long().nullable()]);
        assert!(validate_union(&definitions, &nullable_dictionary, &location).is_err());
        let fine = IdlType::union(vec![IdlType::interface("Node"), IdlType::dom_string()]);
        assert!(validate_union(&definitions, &fine, &location).is_ok());
    }
}
