/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Overload resolution.
//!
//! An [`OverloadSet`] is turned into a [`DispatchPlan`]: for every accepted
//! argument count, either a single signature or a distinguishing index with an
//! ordered list of branches. The plan is rendered into the `match argcount`
//! of the generated method, and [`DispatchPlan::select`] evaluates it against
//! abstract argument values so that dispatch can be checked without a script
//! engine.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::call::{
    CallSite, argument_converter, argument_count_check, not_enough_arguments, per_signature_call,
};
use crate::conversions::{ConversionContext, instantiate_conversion, type_to_native};
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::idl::{BufferSourceType, Definitions, IdlType, Location, Signature, TypeKind};

/// The runtime shape of an argument value, as far as dispatch is concerned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValueClass {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    /// A platform object implementing `interface`. Collections such as
    /// `NodeList` are also array-like.
    PlatformObject { interface: String, array_like: bool },
    BufferSource(BufferSourceType),
    /// A script array or another object with indexed elements and a length.
    ArrayLike,
    Callable,
    /// Any other object.
    Object,
}

impl ValueClass {
    pub fn platform_object(interface: &str) -> ValueClass {
        ValueClass::PlatformObject {
            interface: interface.to_owned(),
            array_like: false,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(
            self,
            ValueClass::PlatformObject { .. } |
                ValueClass::BufferSource(_) |
                ValueClass::ArrayLike |
                ValueClass::Callable |
                ValueClass::Object
        )
    }

    fn is_array_like(&self) -> bool {
        matches!(
            self,
            ValueClass::ArrayLike | ValueClass::PlatformObject { array_like: true, .. }
        )
    }
}

/// The test guarding one dispatch branch, in the order branches are tried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BranchTest {
    /// The value is undefined and the argument is optional.
    Undefined,
    NullOrUndefined,
    /// The value is an object; each candidate's unwrap is attempted in turn.
    Unwrap,
    ArrayLike,
    Object,
    String,
    Number,
    Boolean,
    /// Taken unconditionally; the value is coerced.
    Fallback,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Branch {
    pub test: BranchTest,
    /// Signature indices; only `Unwrap` branches hold more than one.
    pub candidates: Vec<usize>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaseDispatch {
    /// Same candidates as the next argument count; shares its arm.
    FallThrough,
    Single(usize),
    Distinguish { index: usize, branches: Vec<Branch> },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArgcCase {
    pub argc: usize,
    pub dispatch: CaseDispatch,
}

/// What the generated code does for a concrete call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Selection {
    Call(usize),
    NotEnoughArguments,
    NoMatchingOverload,
}

/// The dispatch decisions of an overloaded operation.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchPlan {
    pub max_argc: usize,
    pub cases: Vec<ArgcCase>,
    /// Argument types by signature, padded to `max_argc`.
    types: Vec<Vec<IdlType>>,
    /// `(interface, parent)` pairs, for unwrap checks.
    parents: Vec<(String, String)>,
}

impl DispatchPlan {
    /// The signature the generated code calls for `argc` arguments whose
    /// values have the given classes. Missing values count as undefined.
    pub fn select(&self, argc: usize, values: &[ValueClass]) -> Selection {
        let argcount = argc.min(self.max_argc);
        let Some(position) = self.cases.iter().position(|case| case.argc == argcount) else {
            return Selection::NotEnoughArguments;
        };
        // A fall-through case shares the arm of the next distinct case.
        let Some(case) = self.cases[position..]
            .iter()
            .find(|case| case.dispatch != CaseDispatch::FallThrough)
        else {
            return Selection::NotEnoughArguments;
        };
        match &case.dispatch {
            CaseDispatch::FallThrough => Selection::NotEnoughArguments,
            CaseDispatch::Single(signature) => Selection::Call(*signature),
            CaseDispatch::Distinguish { index, branches } => {
                let value = values.get(*index).unwrap_or(&ValueClass::Undefined);
                branches
                    .iter()
                    .find_map(|branch| self.take_branch(branch, *index, value))
                    .map_or(Selection::NoMatchingOverload, Selection::Call)
            },
        }
    }

    fn take_branch(&self, branch: &Branch, index: usize, value: &ValueClass) -> Option<usize> {
        let first = branch.candidates.first().copied();
        match branch.test {
            BranchTest::Undefined => (*value == ValueClass::Undefined).then_some(first).flatten(),
            BranchTest::NullOrUndefined => {
                matches!(value, ValueClass::Null | ValueClass::Undefined)
                    .then_some(first)
                    .flatten()
            },
            BranchTest::Unwrap => {
                if !value.is_object() {
                    return None;
                }
                branch
                    .candidates
                    .iter()
                    .copied()
                    .find(|&signature| self.unwraps(&self.types[signature][index], value))
            },
            BranchTest::ArrayLike => value.is_array_like().then_some(first).flatten(),
            BranchTest::Object => value.is_object().then_some(first).flatten(),
            BranchTest::String => (*value == ValueClass::String).then_some(first).flatten(),
            BranchTest::Number => (*value == ValueClass::Number).then_some(first).flatten(),
            BranchTest::Boolean => (*value == ValueClass::Boolean).then_some(first).flatten(),
            BranchTest::Fallback => first,
        }
    }

    fn inherits_from(&self, interface: &str, ancestor: &str) -> bool {
        let mut current = interface;
        for _ in 0..=self.parents.len() {
            if current == ancestor {
                return true;
            }
            match self.parents.iter().find(|(child, _)| child == current) {
                Some((_, parent)) => current = parent,
                None => return false,
            }
        }
        false
    }

    /// Whether unwrapping `value` as `ty` succeeds.
    fn unwraps(&self, ty: &IdlType, value: &ValueClass) -> bool {
        match (&ty.kind, value) {
            (TypeKind::Interface { name }, ValueClass::PlatformObject { interface, .. }) => {
                self.inherits_from(interface, name)
            },
            (TypeKind::BufferSource { buffer }, ValueClass::BufferSource(actual)) => {
                buffer == actual ||
                    (*buffer == BufferSourceType::ArrayBufferView &&
                        *actual != BufferSourceType::ArrayBuffer)
            },
            (TypeKind::Union { members }, _) => {
                members.iter().any(|member| self.unwraps(member, value))
            },
            (TypeKind::Object, _) => value.is_object(),
            _ => false,
        }
    }
}

/// The signatures of one operation.
pub struct OverloadSet<'a> {
    definitions: &'a Definitions,
    /// `Interface.operation`, for messages.
    name: &'a str,
    signatures: &'a [Signature],
    location: &'a Location,
}

impl<'a> OverloadSet<'a> {
    pub fn new(
        definitions: &'a Definitions,
        name: &'a str,
        signatures: &'a [Signature],
        location: &'a Location,
    ) -> OverloadSet<'a> {
        OverloadSet {
            definitions,
            name,
            signatures,
            location,
        }
    }

    pub fn max_argument_count(&self) -> usize {
        self.signatures
            .iter()
            .map(|signature| signature.arguments.len())
            .max()
            .unwrap_or(0)
    }

    /// Every argument count at which some signature may be called.
    pub fn allowed_argument_counts(&self) -> BTreeSet<usize> {
        self.signatures
            .iter()
            .flat_map(|signature| signature.required_argument_count()..=signature.arguments.len())
            .collect()
    }

    /// The signatures callable with exactly `argc` arguments.
    pub fn signatures_for_argc(&self, argc: usize) -> Vec<usize> {
        self.signatures
            .iter()
            .enumerate()
            .filter(|(_, signature)| {
                let arguments = &signature.arguments;
                arguments.len() == argc ||
                    (arguments.len() > argc && arguments[argc].optional) ||
                    (signature.is_variadic() && arguments.len() - 1 <= argc)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// The type of argument `index` of a signature, repeating a variadic tail.
    fn type_at(&self, signature: usize, index: usize) -> Option<&'a IdlType> {
        let arguments = &self.signatures[signature].arguments;
        match arguments.get(index) {
            Some(argument) => Some(&argument.ty),
            None => arguments
                .last()
                .filter(|argument| argument.variadic)
                .map(|argument| &argument.ty),
        }
    }

    /// The first index at which the candidates' types are pairwise
    /// distinguishable; all earlier types must agree.
    pub fn distinguishing_index(&self, argc: usize, candidates: &[usize]) -> Result<usize> {
        let ambiguous = || Error::AmbiguousOverload {
            operation: self.name.to_owned(),
            argc,
            location: self.location.clone(),
        };
        for index in 0..argc {
            let types = candidates
                .iter()
                .map(|&candidate| self.type_at(candidate, index).ok_or_else(ambiguous))
                .collect::<Result<Vec<_>>>()?;
            let distinguishable = types.iter().tuple_combinations().all(|(a, b)| {
                a.is_distinguishable_from(b, self.definitions)
            });
            if distinguishable {
                trace!("{}: argument {} distinguishes {} arguments", self.name, index, argc);
                return Ok(index);
            }
            if !types.iter().all_equal() {
                return Err(ambiguous());
            }
        }
        Err(ambiguous())
    }

    /// Only unions of interfaces, buffer sources and `object` can be unwrapped
    /// at a distinguishing index.
    fn check_union_candidates(&self, index: usize, candidates: &[usize]) -> Result<()> {
        for &candidate in candidates {
            let Some(ty) = self.type_at(candidate, index) else {
                continue;
            };
            let unsupported = ty.flattened_members().iter().any(|member| {
                !(member.is_interface() || member.is_buffer_source() || member.is_object())
            });
            if ty.is_union() && unsupported {
                return Err(Error::UnsupportedUnionOverload {
                    operation: self.name.to_owned(),
                    location: self.location.clone(),
                });
            }
        }
        Ok(())
    }

    fn branches(&self, index: usize, candidates: &[usize]) -> Vec<Branch> {
        let definitions = self.definitions;
        let matching = |predicate: &dyn Fn(usize, &IdlType) -> bool| {
            candidates
                .iter()
                .copied()
                .filter(|&candidate| {
                    self.type_at(candidate, index)
                        .is_some_and(|ty| predicate(candidate, ty))
                })
                .collect::<Vec<_>>()
        };
        let is_callback_like = |ty: &IdlType| {
            matches!(&ty.kind, TypeKind::Callback { name } if definitions.callbacks.contains_key(name))
        };

        let optional = matching(&|candidate, _| {
            self.signatures[candidate]
                .arguments
                .get(index)
                .is_some_and(|argument| argument.optional && !argument.variadic)
        });
        let nullish = matching(&|_, ty| {
            ty.includes_nullable() ||
                ty.is_dictionary() ||
                ty.flattened_members().iter().any(|member| member.is_dictionary())
        });
        let unwrappable =
            matching(&|_, ty| ty.is_interface() || ty.is_buffer_source() || ty.is_union());
        let array_like = matching(&|_, ty| ty.is_sequence() || ty.is_object());
        let objects = matching(&|_, ty| {
            is_callback_like(ty) || ty.is_dictionary() || ty.is_record() || ty.is_object()
        });
        let strings = matching(&|_, ty| ty.is_string() || ty.is_enum());
        let numerics = matching(&|_, ty| ty.is_numeric());
        let booleans = matching(&|_, ty| ty.is_boolean());
        let anys = matching(&|_, ty| ty.is_any());

        let mut branches = Vec::new();
        let mut push = |test, candidates: Vec<usize>| {
            if !candidates.is_empty() {
                branches.push(Branch { test, candidates });
            }
        };
        push(BranchTest::Undefined, optional);
        push(BranchTest::NullOrUndefined, nullish);
        push(BranchTest::Unwrap, unwrappable);
        push(BranchTest::ArrayLike, array_like);
        push(BranchTest::Object, objects);
        push(BranchTest::String, strings.clone());
        push(BranchTest::Number, numerics.clone());
        push(BranchTest::Boolean, booleans.clone());
        let fallback = [strings, numerics, booleans, anys]
            .into_iter()
            .find(|candidates| !candidates.is_empty());
        if let Some(fallback) = fallback {
            push(BranchTest::Fallback, fallback);
        }
        branches
    }

    pub fn plan(&self) -> Result<DispatchPlan> {
        let counts: Vec<usize> = self.allowed_argument_counts().into_iter().collect();
        let mut cases = Vec::with_capacity(counts.len());
        for (position, &argc) in counts.iter().enumerate() {
            let candidates = self.signatures_for_argc(argc);
            let next = counts
                .get(position + 1)
                .map(|&next| self.signatures_for_argc(next));
            let dispatch = if next.as_ref() == Some(&candidates) {
                CaseDispatch::FallThrough
            } else if let [signature] = candidates[..] {
                CaseDispatch::Single(signature)
            } else {
                let index = self.distinguishing_index(argc, &candidates)?;
                self.check_union_candidates(index, &candidates)?;
                CaseDispatch::Distinguish {
                    index,
                    branches: self.branches(index, &candidates),
                }
            };
            cases.push(ArgcCase { argc, dispatch });
        }
        let types = (0..self.signatures.len())
            .map(|signature| {
                (0..self.max_argument_count())
                    .map(|index| {
                        self.type_at(signature, index)
                            .cloned()
                            .unwrap_or_else(IdlType::undefined)
                    })
                    .collect()
            })
            .collect();
        let parents = self
            .definitions
            .interfaces
            .values()
            .filter_map(|interface| {
                interface
                    .parent
                    .as_ref()
                    .map(|parent| (interface.name.clone(), parent.clone()))
            })
            .collect();
        Ok(DispatchPlan {
            max_argc: self.max_argument_count(),
            cases,
            types,
            parents,
        })
    }
}

/// Renders the body of an operation's entry point.
pub struct OverloadRenderer<'a> {
    site: &'a CallSite<'a>,
    signatures: &'a [Signature],
}

impl<'a> OverloadRenderer<'a> {
    pub fn new(site: &'a CallSite<'a>, signatures: &'a [Signature]) -> OverloadRenderer<'a> {
        OverloadRenderer { site, signatures }
    }

    pub fn render(&self) -> Result<Fragment> {
        if let [signature] = self.signatures {
            let mut body = Fragment::lines([argument_count_check(
                &self.site.qualified_name,
                signature.required_argument_count(),
            )]);
            body.push(per_signature_call(self.site, signature, 0)?);
            return Ok(body);
        }

        let set = OverloadSet::new(
            self.site.ctx.definitions,
            &self.site.qualified_name,
            self.signatures,
            self.site.location,
        );
        let plan = set.plan()?;
        let mut arms = Vec::with_capacity(plan.cases.len());
        let mut pattern = Vec::new();
        for case in &plan.cases {
            pattern.push(case.argc.to_string());
            let body = match &case.dispatch {
                CaseDispatch::FallThrough => continue,
                CaseDispatch::Single(signature) => {
                    per_signature_call(self.site, &self.signatures[*signature], 0)?
                },
                CaseDispatch::Distinguish { index, branches } => {
                    self.distinguish(*index, branches)?
                },
            };
            arms.push((pattern.join(" | "), body));
            pattern.clear();
        }
        let default = Fragment::lines([
            Fragment::text(not_enough_arguments(&self.site.qualified_name)),
            Fragment::text("return false;"),
        ]);
        Ok(Fragment::lines([
            Fragment::text(format!("let argcount = cmp::min(argc, {});", plan.max_argc)),
            Fragment::match_arms("argcount", arms, Some(default)),
        ]))
    }

    fn distinguish(&self, index: usize, branches: &[Branch]) -> Result<Fragment> {
        let first = branches
            .iter()
            .flat_map(|branch| branch.candidates.first())
            .next()
            .copied()
            .unwrap_or(0);
        let mut body = Fragment::lines([]);
        // The arguments before the distinguishing one agree across candidates.
        for (position, argument) in self.signatures[first].arguments[..index].iter().enumerate() {
            body.push(argument_converter(self.site, argument, position)?);
        }

        let value = format!("HandleValue::from_raw(args.get({index}))");
        let mut has_fallback = false;
        for branch in branches {
            let condition = match branch.test {
                BranchTest::Undefined => format!("{value}.get().is_undefined()"),
                BranchTest::NullOrUndefined => format!("{value}.get().is_null_or_undefined()"),
                BranchTest::Unwrap => {
                    body.push(Fragment::if_then(
                        &format!("{value}.get().is_object()"),
                        self.unwrap_attempts(index, &value, &branch.candidates)?,
                    ));
                    continue;
                },
                BranchTest::ArrayLike => {
                    format!("{value}.get().is_object() && is_array_like(*cx, {value})")
                },
                BranchTest::Object => format!("{value}.get().is_object()"),
                BranchTest::String => format!("{value}.get().is_string()"),
                BranchTest::Number => format!("{value}.get().is_number()"),
                BranchTest::Boolean => format!("{value}.get().is_boolean()"),
                BranchTest::Fallback => {
                    has_fallback = true;
                    body.push(self.call(branch, index)?);
                    continue;
                },
            };
            body.push(Fragment::if_then(&condition, self.call(branch, index)?));
        }
        if !has_fallback {
            body.push(Fragment::text(
                "throw_type_error(*cx, \"Could not convert JavaScript argument\");",
            ));
            body.push(Fragment::text("return false;"));
        }
        Ok(body)
    }

    fn call(&self, branch: &Branch, index: usize) -> Result<Fragment> {
        let signature = &self.signatures[branch.candidates[0]];
        per_signature_call(self.site, signature, index)
    }

    /// One labelled block per candidate; a failed unwrap breaks out of it.
    fn unwrap_attempts(&self, index: usize, value: &str, candidates: &[usize]) -> Result<Fragment> {
        let mut attempts = Fragment::lines([]);
        for &candidate in candidates {
            let signature = &self.signatures[candidate];
            let argument = &signature.arguments[index.min(signature.arguments.len() - 1)];
            // A variadic list is converted as a whole by the call; here only
            // the first element has to unwrap.
            let (decl_name, start) = if argument.variadic {
                ("first".to_owned(), index)
            } else {
                (format!("arg{index}"), index + 1)
            };
            let cc = ConversionContext::new(
                format!("Argument {} of {}", index + 1, self.site.qualified_name),
                self.site.location,
            )
            .with_failure("break '_block;")
            .definitely_object();
            let mut info = type_to_native(self.site.ctx, &argument.ty, &cc)?;
            if argument.optional && !argument.variadic {
                info = info.optional()?;
            }
            let mut attempt = Fragment::lines([instantiate_conversion(&info, value, &decl_name)]);
            attempt.push(per_signature_call(self.site, signature, start)?);
            attempts.push(Fragment::block("'_block: ", attempt, ""));
        }
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{Argument, Interface};

    fn signature(arguments: Vec<Argument>) -> Signature {
        Signature::new(IdlType::undefined(), arguments)
    }

    fn definitions() -> Definitions {
        let mut definitions = Definitions::default();
        for (name, parent) in [("Node", None), ("Element", Some("Node")), ("NodeList", None)] {
            definitions.add_interface(Interface {
                name: name.to_owned(),
                parent: parent.map(str::to_owned),
                ..Default::default()
            });
        }
        definitions
    }

    fn plan(definitions: &Definitions, signatures: &[Signature]) -> Result<DispatchPlan> {
        OverloadSet::new(definitions, "Test.f", signatures, &Location::default()).plan()
    }

    #[test]
    fn strings_are_classified_before_coercion() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new("value", IdlType::dom_string())]),
            signature(vec![Argument::new("value", IdlType::long())]),
        ];
        let plan = plan(&definitions, &signatures).unwrap();
        assert_eq!(plan.select(1, &[ValueClass::String]), Selection::Call(0));
        assert_eq!(plan.select(1, &[ValueClass::Number]), Selection::Call(1));
        // Neither a string nor a number: coerced to a string.
        assert_eq!(plan.select(1, &[ValueClass::Boolean]), Selection::Call(0));
        assert_eq!(plan.select(0, &[]), Selection::NotEnoughArguments);
    }

    #[test]
    fn null_reaches_the_nullable_interface() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new("node", IdlType::interface("Node").nullable())]),
            signature(vec![Argument::new("values", IdlType::sequence(IdlType::long()))]),
        ];
        let plan = plan(&definitions, &signatures).unwrap();
        assert_eq!(plan.select(1, &[ValueClass::Null]), Selection::Call(0));
        assert_eq!(plan.select(1, &[ValueClass::ArrayLike]), Selection::Call(1));
        assert_eq!(
            plan.select(1, &[ValueClass::platform_object("Element")]),
            Selection::Call(0)
        );
        assert_eq!(plan.select(1, &[ValueClass::Number]), Selection::NoMatchingOverload);
    }

    #[test]
    fn first_successful_unwrap_wins_over_array_likeness() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new("list", IdlType::interface("NodeList"))]),
            signature(vec![Argument::new("values", IdlType::sequence(IdlType::interface("Node")))]),
        ];
        let plan = plan(&definitions, &signatures).unwrap();
        let node_list = ValueClass::PlatformObject {
            interface: "NodeList".to_owned(),
            array_like: true,
        };
        assert_eq!(plan.select(1, &[node_list]), Selection::Call(0));
        let collection = ValueClass::PlatformObject {
            interface: "HTMLCollection".to_owned(),
            array_like: true,
        };
        assert_eq!(plan.select(1, &[collection]), Selection::Call(1));
    }

    #[test]
    fn array_buffer_views_reject_plain_buffers() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new(
                "view",
                IdlType::buffer_source(BufferSourceType::ArrayBufferView),
            )]),
            signature(vec![Argument::new("text", IdlType::dom_string())]),
        ];
        let plan = plan(&definitions, &signatures).unwrap();
        let buffer = ValueClass::BufferSource;
        assert_eq!(plan.select(1, &[buffer(BufferSourceType::Uint8Array)]), Selection::Call(0));
        assert_eq!(plan.select(1, &[buffer(BufferSourceType::DataView)]), Selection::Call(0));
        // Not a view, so it is coerced to a string.
        assert_eq!(plan.select(1, &[buffer(BufferSourceType::ArrayBuffer)]), Selection::Call(1));
    }

    #[test]
    fn argument_counts_select_the_case() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new("a", IdlType::long())]),
            signature(vec![
                Argument::new("a", IdlType::long()),
                Argument::new("b", IdlType::dom_string()),
                Argument::new("c", IdlType::dom_string()).optional(),
            ]),
        ];
        let location = Location::default();
        let set = OverloadSet::new(&definitions, "Test.f", &signatures, &location);
        assert_eq!(set.allowed_argument_counts().into_iter().collect::<Vec<_>>(), [1, 2, 3]);
        let plan = set.plan().unwrap();
        assert_eq!(plan.cases[0].dispatch, CaseDispatch::Single(0));
        assert_eq!(plan.cases[1].dispatch, CaseDispatch::FallThrough);
        assert_eq!(plan.cases[2].dispatch, CaseDispatch::Single(1));
        // Extra arguments are ignored.
        assert_eq!(plan.select(7, &[]), Selection::Call(1));
    }

    #[test]
    fn variadic_tails_match_any_longer_count() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new("nodes", IdlType::interface("Node")).variadic()]),
            signature(vec![Argument::new("text", IdlType::dom_string())]),
        ];
        let location = Location::default();
        let set = OverloadSet::new(&definitions, "Test.f", &signatures, &location);
        assert_eq!(set.signatures_for_argc(0), [0]);
        assert_eq!(set.signatures_for_argc(1), [0, 1]);
        let plan = set.plan().unwrap();
        assert_eq!(plan.select(0, &[]), Selection::Call(0));
        assert_eq!(
            plan.select(1, &[ValueClass::platform_object("Node")]),
            Selection::Call(0)
        );
        assert_eq!(plan.select(1, &[ValueClass::String]), Selection::Call(1));
    }

    #[test]
    fn indistinguishable_signatures_are_rejected() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new("value", IdlType::long())]),
            signature(vec![Argument::new("value", IdlType::double())]),
        ];
        assert!(matches!(
            plan(&definitions, &signatures),
            Err(Error::AmbiguousOverload { argc: 1, .. })
        ));
    }

    #[test]
    fn unions_of_primitives_cannot_distinguish() {
        let definitions = definitions();
        let signatures = [
            signature(vec![Argument::new(
                "value",
                IdlType::union(vec![IdlType::interface("Node"), IdlType::long()]),
            )]),
            signature(vec![Argument::new("value", IdlType::dom_string())]),
        ];
        assert!(matches!(
            plan(&definitions, &signatures),
            Err(Error::UnsupportedUnionOverload { .. })
        ));
    }
}
