/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Argument conversion and the call into native code for one signature.

use crate::Context;
use crate::conversions::{
    ConversionContext, MemberKind, Rooting, instantiate_conversion, native_to_type, return_type,
    returns_via_out_param, type_to_native,
};
use crate::descriptor::{Descriptor, MemberPolicy};
use crate::error::Result;
use crate::fragment::{Fragment, fill};
use crate::idl::{Argument, IdlType, Location, Signature, TypeKind};

pub const RETURN_VALUE: &str = "MutableHandleValue::from_raw(args.rval())";

/// Everything about a member that the code calling into native needs.
#[derive(Clone)]
pub struct CallSite<'a> {
    pub ctx: Context<'a>,
    pub descriptor: &'a Descriptor,
    /// `Interface.member`, for error messages.
    pub qualified_name: String,
    /// The Rust method implementing the member.
    pub native_name: String,
    pub is_static: bool,
    /// Attribute setters have no return value slot.
    pub is_setter: bool,
    pub policy: MemberPolicy,
    pub location: &'a Location,
}

impl<'a> CallSite<'a> {
    pub fn new(
        ctx: Context<'a>,
        descriptor: &'a Descriptor,
        member: &str,
        native_name: String,
        policy: MemberPolicy,
        location: &'a Location,
    ) -> CallSite<'a> {
        CallSite {
            ctx,
            descriptor,
            qualified_name: format!("{}.{member}", descriptor.interface),
            native_name,
            is_static: false,
            is_setter: false,
            policy,
            location,
        }
    }

    pub fn static_member(mut self) -> CallSite<'a> {
        self.is_static = true;
        self
    }

    pub fn setter(mut self) -> CallSite<'a> {
        self.is_setter = true;
        self
    }

    fn argument_source(&self, index: usize) -> String {
        format!("Argument {} of {}", index + 1, self.qualified_name)
    }
}

/// The Rust method name of an IDL member: `appendChild` becomes `AppendChild`.
pub fn native_method_name(member: &str) -> String {
    let mut chars = member.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// `if argc < N` guard for the single-signature case.
pub fn argument_count_check(qualified_name: &str, required: usize) -> Fragment {
    if required == 0 {
        return Fragment::empty();
    }
    Fragment::if_then(
        &format!("argc < {required}"),
        Fragment::lines([
            Fragment::text(not_enough_arguments(qualified_name)),
            Fragment::text("return false;"),
        ]),
    )
}

pub fn not_enough_arguments(qualified_name: &str) -> String {
    format!(
        "throw_type_error(*cx, {:?});",
        format!("Not enough arguments to \"{qualified_name}\".")
    )
}

/// Declares `arg{index}` from the incoming arguments.
pub fn argument_converter(site: &CallSite<'_>, argument: &Argument, index: usize) -> Result<Fragment> {
    let cc = ConversionContext::new(site.argument_source(index), site.location)
        .with_default(argument.default.clone());
    if argument.variadic {
        return variadic_converter(site, argument, index, cc.member(MemberKind::Variadic));
    }
    let mut info = type_to_native(site.ctx, &argument.ty, &cc)?;
    if argument.optional {
        info = info.optional()?;
    }
    Ok(instantiate_conversion(
        &info,
        &format!("HandleValue::from_raw(args.get({index}))"),
        &format!("arg{index}"),
    ))
}

fn variadic_converter(
    site: &CallSite<'_>,
    argument: &Argument,
    index: usize,
    cc: ConversionContext,
) -> Result<Fragment> {
    let info = type_to_native(site.ctx, &argument.ty, &cc)?;
    let name = format!("arg{index}");
    let slot = instantiate_conversion(
        &info,
        "HandleValue::from_raw(args.get(variadic_arg))",
        "slot",
    );
    let init = if info.rooting == Rooting::RootedVec {
        format!("rooted_vec!(let mut {name});")
    } else {
        format!("let mut {name} = Vec::new();")
    };
    let push = format!("{name}.push(slot);");
    let subtract = if index == 0 {
        String::new()
    } else {
        format!(" - {index}")
    };
    let body = fill(
        "
        ${init}
        if argc > ${index} {
            ${name}.reserve(cmp::min(argc as usize${subtract}, ${max}));
            for variadic_arg in ${index}..argc {
                $*{slot}
                ${push}
            }
        }
        ",
        &[
            ("init", &init),
            ("index", &index.to_string()),
            ("name", &name),
            ("subtract", &subtract),
            ("max", &site.ctx.config.max_variadic_preallocation.to_string()),
            ("slot", &slot.render()),
            ("push", &push),
        ],
    )?;
    Ok(Fragment::text(body.trim_end()))
}

/// The expression passing `arg{index}` to the native method.
pub fn process_arg(argument: &Argument, info_rooting: Rooting, index: usize) -> String {
    let name = format!("arg{index}");
    if info_rooting == Rooting::Rooted {
        return format!("{name}.handle()");
    }
    if argument.variadic {
        return match info_rooting {
            Rooting::RootedVec => format!("&{name}"),
            _ => name,
        };
    }
    match &argument.ty.kind {
        TypeKind::Interface { .. } => {
            if argument.ty.nullable || (argument.optional && argument.default.is_none()) {
                format!("{name}.as_deref()")
            } else {
                format!("&{name}")
            }
        },
        TypeKind::Promise { .. } => format!("&{name}"),
        TypeKind::Dictionary { .. } if !argument.ty.nullable => format!("&{name}"),
        _ => name,
    }
}

/// Whether the native method takes the `JSContext`.
fn needs_cx(ctx: Context<'_>, signature: &Signature) -> bool {
    let involves_gc_things = |ty: &IdlType| ctx.traces.type_needs_tracing(ty) || ty.is_promise();
    involves_gc_things(&signature.return_type) ||
        signature
            .arguments
            .iter()
            .any(|argument| involves_gc_things(&argument.ty))
}

/// Converts the arguments from `start` on, calls the native method and
/// converts its result; the emitted code returns from the entry point.
pub fn per_signature_call(site: &CallSite<'_>, signature: &Signature, start: usize) -> Result<Fragment> {
    let mut code = Fragment::lines([]);
    let mut passed = Vec::with_capacity(signature.arguments.len() + 2);
    for (index, argument) in signature.arguments.iter().enumerate() {
        let cc = ConversionContext::new(site.argument_source(index), site.location);
        let member = if argument.variadic {
            MemberKind::Variadic
        } else {
            MemberKind::Argument
        };
        let rooting = type_to_native(site.ctx, &argument.ty, &cc.member(member))?.rooting;
        if index >= start {
            code.push(argument_converter(site, argument, index)?);
        }
        passed.push(process_arg(argument, rooting, index));
    }
    if needs_cx(site.ctx, signature) {
        passed.insert(0, "cx".to_owned());
    }
    code.push(call_generator(site, &signature.return_type, passed)?);
    Ok(code)
}

/// The native call itself, its error handling and the conversion of the
/// result into `args.rval()`.
pub fn call_generator(site: &CallSite<'_>, return_ty: &IdlType, mut passed: Vec<String>) -> Result<Fragment> {
    let mut code = Fragment::lines([]);
    let out_param = returns_via_out_param(return_ty);
    if out_param {
        code.push(Fragment::text("rooted!(in(*cx) let mut retval: JSVal);"));
        passed.push("retval.handle_mut()".to_owned());
    }
    if site.policy.can_gc {
        passed.push("CanGc::note()".to_owned());
    }

    let receiver = if site.is_static {
        passed.insert(0, "&global".to_owned());
        code.push(Fragment::text(
            "let global = GlobalScope::from_object(args.callee());",
        ));
        format!("{}::{}", site.descriptor.native_type, site.native_name)
    } else {
        format!("this.{}", site.native_name)
    };
    let native_type = return_type(site.ctx, return_ty, site.policy.throws, site.location)?;
    let call = Fragment::text(format!(
        "let result: {native_type} = {receiver}({});",
        passed.join(", ")
    ));
    if site.policy.ce_reactions {
        code.push(Fragment::lines([
            Fragment::text("push_new_element_queue();"),
            call,
            Fragment::text("pop_current_element_queue(CanGc::note());"),
        ]));
    } else {
        code.push(call);
    }

    if site.policy.throws {
        let success = return_type(site.ctx, return_ty, false, site.location)?;
        code.push(Fragment::text(fill(
            "
            let result: ${success} = match result {
                Ok(result) => result,
                Err(e) => {
                    let global = GlobalScope::from_context(*cx, InRealm::Already(&AlreadyInRealm::assert_for_cx(cx)));
                    throw_dom_exception(cx, &global, e, CanGc::note());
                    return false;
                },
            };
            ",
            &[("success", success.as_str())],
        )?.trim_end()));
    }

    if site.is_setter {
        code.push(Fragment::text("return true;"));
        return Ok(code);
    }
    let result = if out_param { "retval.handle()" } else { "result" };
    code.push(native_to_type(return_ty, result, RETURN_VALUE, None, "return true;"));
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_are_capitalised() {
        assert_eq!(native_method_name("appendChild"), "AppendChild");
        assert_eq!(native_method_name(""), "");
    }

    #[test]
    fn argument_count_message_names_the_operation() {
        let check = argument_count_check("Node.appendChild", 1).render();
        assert_eq!(
            check,
            "if argc < 1 {\n    throw_type_error(*cx, \"Not enough arguments to \\\"Node.appendChild\\\".\");\n    return false;\n}"
        );
        assert!(argument_count_check("Node.normalize", 0).is_empty());
    }

    #[test]
    fn interfaces_are_passed_by_reference() {
        let plain = Argument::new("node", IdlType::interface("Node"));
        assert_eq!(process_arg(&plain, Rooting::None, 0), "&arg0");
        let optional = Argument::new("node", IdlType::interface("Node")).optional();
        assert_eq!(process_arg(&optional, Rooting::None, 1), "arg1.as_deref()");
        let object = Argument::new("object", IdlType::object());
        assert_eq!(process_arg(&object, Rooting::Rooted, 2), "arg2.handle()");
        let count = Argument::new("count", IdlType::long());
        assert_eq!(process_arg(&count, Rooting::None, 3), "arg3");
    }

    #[test]
    fn variadic_interfaces_are_lent_as_a_slice() {
        let nodes = Argument::new("nodes", IdlType::interface("Node")).variadic();
        assert_eq!(process_arg(&nodes, Rooting::RootedVec, 0), "&arg0");
        let nullable = Argument::new("nodes", IdlType::interface("Node").nullable()).variadic();
        assert_eq!(process_arg(&nullable, Rooting::None, 0), "arg0");
    }
}
