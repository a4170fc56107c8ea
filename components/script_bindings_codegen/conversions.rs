/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Conversions between script values and native values.
//!
//! [`type_to_native`] produces a [`ConversionInfo`]: an expression template that
//! turns `${val}` (a `HandleValue`) into the declared native type, plus the
//! default value and storage requirements. [`native_to_type`] goes the other way.
//!
//! Generated conversion code has two ways to fail. The *failure code* is used
//! when the value has the wrong shape and may be overridden by overload
//! resolution to try the next candidate. The *exception code* is used when a
//! script exception is already pending (e.g. `toString` threw) and always runs,
//! whatever the failure code is.

use std::fmt;

use crate::Context;
use crate::descriptor::InterfaceStorage;
use crate::dictionary::dictionary_has_required_members;
use crate::enums::enum_value_name;
use crate::error::{Error, Result};
use crate::fragment::{Fragment, Template, fill};
use crate::idl::{
    BufferSourceType, DefaultValue, IdlType, Location, PrimitiveType, StringType, TypeFlags,
    TypeKind,
};
use crate::unions::{union_type_name, union_variant_name};

/// A native Rust type as written in generated code.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NativeType(String);

impl NativeType {
    pub fn new(name: impl Into<String>) -> NativeType {
        NativeType(name.into())
    }

    pub fn unit() -> NativeType {
        NativeType::new("()")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unit(&self) -> bool {
        self.0 == "()"
    }

    fn wrap(self, outer: &str) -> NativeType {
        NativeType(format!("{outer}<{}>", self.0))
    }

    pub fn option(self) -> NativeType {
        self.wrap("Option")
    }

    pub fn vec(self) -> NativeType {
        self.wrap("Vec")
    }

    pub fn traced_box(self) -> NativeType {
        self.wrap("RootedTraceableBox")
    }

    pub fn heap(self) -> NativeType {
        self.wrap("Heap")
    }

    pub fn rc(self) -> NativeType {
        self.wrap("Rc")
    }

    pub fn fallible(self) -> NativeType {
        self.wrap("Fallible")
    }

    pub fn record(self, key: StringType) -> NativeType {
        NativeType(format!("Record<{}, {}>", key.native_type(), self.0))
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the converted value is going to live.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MemberKind {
    /// A local passed to a native method.
    #[default]
    Argument,
    /// One element of a variadic argument list.
    Variadic,
    /// A field of a dictionary.
    Dictionary,
    /// An element of a sequence.
    Sequence,
    /// A value of a record.
    Record,
    /// The payload of a union variant.
    Union,
    /// The value returned by a callback.
    CallbackReturn,
}

impl MemberKind {
    /// Members of heap-allocated structures that must be traced in place.
    fn is_heap_member(self) -> bool {
        matches!(self, MemberKind::Dictionary | MemberKind::Union)
    }
}

/// What happens when a string does not name a value of the expected enum.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EnumLookup {
    /// Throw a `TypeError`.
    #[default]
    Hard,
    /// Run the failure code.
    Soft,
}

/// The storage a converted value needs before native code may use it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Rooting {
    #[default]
    None,
    /// Declared with `rooted!` and passed on as a handle.
    Rooted,
    /// Declared with `auto_root!` (typed arrays).
    AutoRooted,
    /// Pushed into a `rooted_vec!`, which keeps it alive.
    RootedVec,
    /// The declared type is already a `RootedTraceableBox`.
    Traced,
}

/// The environment one conversion is generated in.
#[derive(Clone, Debug)]
pub struct ConversionContext {
    pub definitely_object: bool,
    pub member: MemberKind,
    pub default: Option<DefaultValue>,
    /// Run when the value has the wrong shape; `None` throws a `TypeError`.
    pub failure_code: Option<String>,
    /// Run when a script exception is pending.
    pub exception_code: String,
    /// Describes the value in error messages, e.g. `Argument 1 of Node.appendChild`.
    pub source: String,
    pub enum_lookup: EnumLookup,
    pub location: Location,
}

impl ConversionContext {
    pub fn new(source: impl Into<String>, location: &Location) -> ConversionContext {
        ConversionContext {
            definitely_object: false,
            member: MemberKind::Argument,
            default: None,
            failure_code: None,
            exception_code: "return false;".to_owned(),
            source: source.into(),
            enum_lookup: EnumLookup::Hard,
            location: location.clone(),
        }
    }

    pub fn member(mut self, member: MemberKind) -> ConversionContext {
        self.member = member;
        self
    }

    pub fn with_default(mut self, default: Option<DefaultValue>) -> ConversionContext {
        self.default = default;
        self
    }

    pub fn with_failure(mut self, failure_code: impl Into<String>) -> ConversionContext {
        self.failure_code = Some(failure_code.into());
        self
    }

    pub fn with_exception(mut self, exception_code: impl Into<String>) -> ConversionContext {
        self.exception_code = exception_code.into();
        self
    }

    pub fn definitely_object(mut self) -> ConversionContext {
        self.definitely_object = true;
        self
    }

    pub fn soft_enum(mut self) -> ConversionContext {
        self.enum_lookup = EnumLookup::Soft;
        self
    }

    /// The failure code, or a `TypeError` followed by the exception code.
    fn fail_or_propagate(&self, throw: &str) -> String {
        match &self.failure_code {
            Some(failure_code) => failure_code.clone(),
            None => format!("{throw}\n{}", self.exception_code),
        }
    }

    fn fail_with_message(&self, message: &str) -> String {
        self.fail_or_propagate(&throw_type_error(message))
    }

    fn element(&self, member: MemberKind) -> ConversionContext {
        ConversionContext {
            definitely_object: false,
            member,
            default: None,
            failure_code: None,
            exception_code: self.exception_code.clone(),
            source: self.source.clone(),
            enum_lookup: EnumLookup::Hard,
            location: self.location.clone(),
        }
    }

    fn unsupported_default(&self, default: &DefaultValue, reason: &'static str) -> Error {
        Error::UnsupportedDefault {
            target: self.source.clone(),
            value: default.to_string(),
            reason,
            location: self.location.clone(),
        }
    }
}

/// The result of converting one IDL type from a script value.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionInfo {
    pub template: Template,
    /// The default value expression, present iff a default was given.
    pub default: Option<String>,
    /// `None` for `undefined`.
    pub decl_type: Option<NativeType>,
    pub rooting: Rooting,
}

impl ConversionInfo {
    fn new(template: &str, decl_type: NativeType) -> Result<ConversionInfo> {
        Ok(ConversionInfo {
            template: Template::parse(template)?,
            default: None,
            decl_type: Some(decl_type),
            rooting: Rooting::None,
        })
    }

    pub fn needs_rooting(&self) -> bool {
        self.rooting != Rooting::None
    }

    /// Turns the conversion of an optional argument without a default into one
    /// producing `Option<T>`.
    pub fn optional(self) -> Result<ConversionInfo> {
        if self.default.is_some() {
            return Ok(self);
        }
        if self.rooting == Rooting::Rooted {
            // A rooted object cannot be an `Option`; absence is a null handle.
            return Ok(ConversionInfo {
                default: Some("ptr::null_mut()".to_owned()),
                ..self
            });
        }
        Ok(ConversionInfo {
            template: self.template.map(|template| format!("Some({template})"))?,
            default: Some("None".to_owned()),
            decl_type: self.decl_type.map(NativeType::option),
            rooting: self.rooting,
        })
    }
}

pub fn throw_type_error(message: &str) -> String {
    format!("throw_type_error(*cx, {message:?});")
}

/// The behaviour argument passed to `FromJSValConvertible::from_jsval`.
pub fn conversion_config(ty: &IdlType) -> String {
    match &ty.kind {
        TypeKind::Primitive { primitive } if primitive.is_integer() => {
            if ty.flags.contains(TypeFlags::CLAMP) {
                "ConversionBehavior::Clamp".to_owned()
            } else if ty.flags.contains(TypeFlags::ENFORCE_RANGE) {
                "ConversionBehavior::EnforceRange".to_owned()
            } else {
                "ConversionBehavior::Default".to_owned()
            }
        },
        TypeKind::String {
            string: StringType::DomString,
        } => {
            if ty.flags.contains(TypeFlags::LEGACY_NULL_TO_EMPTY_STRING) {
                "StringificationBehavior::Empty".to_owned()
            } else {
                "StringificationBehavior::Default".to_owned()
            }
        },
        TypeKind::Sequence { element } => conversion_config(element),
        TypeKind::Record { value, .. } => conversion_config(value),
        _ => "()".to_owned(),
    }
}

fn check_flags(ty: &IdlType, cc: &ConversionContext) -> Result<()> {
    let range = TypeFlags::CLAMP | TypeFlags::ENFORCE_RANGE;
    let is_integer = matches!(&ty.kind, TypeKind::Primitive { primitive } if primitive.is_integer());
    if ty.flags.contains(range) || (ty.flags.intersects(range) && !is_integer) {
        return Err(Error::ConflictingRangePolicy {
            target: cc.source.clone(),
            location: cc.location.clone(),
        });
    }
    let as_null = TypeFlags::TREAT_NON_CALLABLE_AS_NULL | TypeFlags::TREAT_NON_OBJECT_AS_NULL;
    if ty.flags.intersects(as_null) && !ty.nullable {
        return Err(Error::NonNullableTreatAsNull {
            target: cc.source.clone(),
            location: cc.location.clone(),
        });
    }
    Ok(())
}

/// `match FromJSValConvertible::from_jsval(...)` with both failure paths.
fn from_jsval_template(config: &str, cc: &ConversionContext) -> Result<String> {
    let failure = cc.fail_or_propagate("throw_type_error(*cx, &error);");
    let template = fill(
        "
        match FromJSValConvertible::from_jsval(*cx, $${val}, ${config}) {
            Ok(ConversionResult::Success(value)) => value,
            Ok(ConversionResult::Failure(error)) => {
                $*{failure}
            },
            _ => {
                $*{exception}
            },
        }
        ",
        &[
            ("config", config),
            ("failure", &failure),
            ("exception", &cc.exception_code),
        ],
    )?;
    Ok(template.trim_end().to_owned())
}

/// Null and undefined become `None`; everything else goes through `template`.
fn wrap_nullable(template: &str) -> String {
    Fragment::if_else(
        "${val}.get().is_null_or_undefined()",
        Fragment::text("None"),
        Fragment::text(format!("Some({template})")),
    )
    .render()
}

/// Guards `body` with an object check. `null_value` adds a branch for null
/// and undefined.
fn wrap_object_template(body: &str, null_value: Option<&str>, cc: &ConversionContext) -> String {
    if cc.definitely_object {
        return body.to_owned();
    }
    let mut branches = Fragment::lines([
        Fragment::text("if ${val}.get().is_object() {"),
        Fragment::text(body).indented(),
    ]);
    if let Some(null_value) = null_value {
        branches.push(Fragment::text(
            "} else if ${val}.get().is_null_or_undefined() {",
        ));
        branches.push(Fragment::text(null_value).indented());
    }
    let not_object = cc.fail_with_message(&format!("{} is not an object.", cc.source));
    branches.push(Fragment::text("} else {"));
    branches.push(Fragment::text(not_object).indented());
    branches.push(Fragment::text("}"));
    branches.render()
}

/// Whether an argument of this type is boxed for tracing rather than relying
/// on the caller's roots.
fn traced_argument(ctx: Context<'_>, ty: &IdlType, cc: &ConversionContext) -> bool {
    cc.member == MemberKind::Argument && ctx.traces.type_needs_tracing(ty)
}

/// Produces the conversion of a script value to `ty`.
pub fn type_to_native(
    ctx: Context<'_>,
    ty: &IdlType,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    check_flags(ty, cc)?;
    let mut info = match &ty.kind {
        TypeKind::Primitive { primitive } => primitive_conversion(ty, *primitive, cc)?,
        TypeKind::String { string } => string_conversion(ty, *string, cc)?,
        TypeKind::Enum { name } => enum_conversion(ctx, ty, name, cc)?,
        TypeKind::Sequence { element } => container_conversion(ctx, ty, element, None, cc)?,
        TypeKind::Record { key, value } => container_conversion(ctx, ty, value, Some(*key), cc)?,
        TypeKind::Union { .. } => union_conversion(ctx, ty, cc)?,
        TypeKind::Dictionary { name } => dictionary_conversion(ctx, ty, name, cc)?,
        TypeKind::Interface { name } => interface_conversion(ctx, ty, name, cc)?,
        TypeKind::Callback { name } => callback_conversion(ctx, ty, name, cc)?,
        TypeKind::Promise { .. } => promise_conversion(ty, cc)?,
        TypeKind::BufferSource { buffer } => buffer_source_conversion(ty, *buffer, cc)?,
        TypeKind::Object => object_conversion(ty, cc)?,
        TypeKind::Any => any_conversion(cc)?,
        TypeKind::Undefined => {
            return Ok(ConversionInfo {
                template: Template::default(),
                default: None,
                decl_type: None,
                rooting: Rooting::None,
            });
        },
    };
    if let Some(default) = &cc.default {
        info.default = Some(default_value(ctx, ty, default, cc)?);
    }
    Ok(info)
}

fn primitive_conversion(
    ty: &IdlType,
    primitive: PrimitiveType,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let template = from_jsval_template(&conversion_config(ty), cc)?;
    let decl_type = NativeType::new(primitive.native_type());
    if ty.nullable {
        return ConversionInfo::new(&wrap_nullable(&template), decl_type.option());
    }
    ConversionInfo::new(&template, decl_type)
}

fn string_conversion(
    ty: &IdlType,
    string: StringType,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let template = from_jsval_template(&conversion_config(ty), cc)?;
    let decl_type = NativeType::new(string.native_type());
    if ty.nullable {
        return ConversionInfo::new(&wrap_nullable(&template), decl_type.option());
    }
    ConversionInfo::new(&template, decl_type)
}

fn enum_conversion(
    ctx: Context<'_>,
    ty: &IdlType,
    name: &str,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    ctx.enumeration(name, &cc.location)?;
    let invalid = match cc.enum_lookup {
        EnumLookup::Soft => cc.fail_or_propagate("throw_type_error(*cx, &error);"),
        EnumLookup::Hard => format!("throw_type_error(*cx, &error);\n{}", cc.exception_code),
    };
    let template = fill(
        "
        match FromJSValConvertible::from_jsval(*cx, $${val}, ()) {
            Err(_) => {
                $*{exception}
            },
            Ok(ConversionResult::Success(value)) => value,
            Ok(ConversionResult::Failure(error)) => {
                $*{invalid}
            },
        }
        ",
        &[("exception", &cc.exception_code), ("invalid", &invalid)],
    )?;
    let template = template.trim_end();
    let decl_type = NativeType::new(name);
    if ty.nullable {
        return ConversionInfo::new(&wrap_nullable(template), decl_type.option());
    }
    ConversionInfo::new(template, decl_type)
}

/// Sequences and records: the runtime converts the elements, so only the
/// element's declared type is needed here.
fn container_conversion(
    ctx: Context<'_>,
    ty: &IdlType,
    element: &IdlType,
    key: Option<StringType>,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let member = if key.is_some() {
        MemberKind::Record
    } else {
        MemberKind::Sequence
    };
    let inner = type_to_native(ctx, element, &cc.element(member))?;
    let element_type = inner.decl_type.unwrap_or_else(NativeType::unit);
    let mut decl_type = match key {
        Some(key) => element_type.record(key),
        None => element_type.vec(),
    };
    let mut template = from_jsval_template(&conversion_config(ty), cc)?;
    let mut rooting = Rooting::None;
    if traced_argument(ctx, ty, cc) {
        decl_type = decl_type.traced_box();
        template = format!("RootedTraceableBox::new({template})");
        rooting = Rooting::Traced;
    }
    if ty.nullable {
        decl_type = decl_type.option();
        template = wrap_nullable(&template);
    }
    let mut info = ConversionInfo::new(&template, decl_type)?;
    info.rooting = rooting;
    Ok(info)
}

fn union_conversion(
    ctx: Context<'_>,
    ty: &IdlType,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let mut decl_type = NativeType::new(format!("UnionTypes::{}", union_type_name(ty)));
    let mut template = from_jsval_template("()", cc)?;
    let mut rooting = Rooting::None;
    if traced_argument(ctx, ty, cc) {
        decl_type = decl_type.traced_box();
        template = format!("RootedTraceableBox::new({template})");
        rooting = Rooting::Traced;
    }
    if ty.includes_nullable() {
        decl_type = decl_type.option();
        template = wrap_nullable(&template);
    }
    let mut info = ConversionInfo::new(&template, decl_type)?;
    info.rooting = rooting;
    Ok(info)
}

fn dictionary_conversion(
    ctx: Context<'_>,
    ty: &IdlType,
    name: &str,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    ctx.dictionary(name, &cc.location)?;
    let mut decl_type = NativeType::new(name);
    let mut rooting = Rooting::None;
    if ctx.traces.dictionary_needs_tracing(name) {
        decl_type = decl_type.traced_box();
        rooting = Rooting::Traced;
    }
    // Dictionaries are the last resort of overload resolution, so a
    // malformed one always throws.
    let template = fill(
        "
        match FromJSValConvertible::from_jsval(*cx, $${val}, ()) {
            Ok(ConversionResult::Success(dictionary)) => dictionary,
            Ok(ConversionResult::Failure(error)) => {
                throw_type_error(*cx, &error);
                $*{exception}
            },
            _ => {
                $*{exception}
            },
        }
        ",
        &[("exception", &cc.exception_code)],
    )?;
    let mut template = template.trim_end().to_owned();
    if ty.nullable {
        decl_type = decl_type.option();
        template = wrap_nullable(&template);
    }
    let mut info = ConversionInfo::new(&template, decl_type)?;
    info.rooting = rooting;
    Ok(info)
}

fn interface_conversion(
    ctx: Context<'_>,
    ty: &IdlType,
    name: &str,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let descriptor = ctx.descriptor(name, &cc.location)?;
    let storage = interface_storage(cc.member, ty.nullable);
    let mut decl_type = NativeType::new(descriptor.storage_type(storage));
    let failure = cc.fail_with_message(&format!(
        "{} does not implement interface {}.",
        cc.source, name
    ));
    let unwrap = fill(
        "
        match ${unwrap} {
            Ok(val) => val,
            Err(()) => {
                $*{failure}
            },
        }
        ",
        &[
            ("unwrap", &descriptor.unwrap_expression()),
            ("failure", &failure),
        ],
    )?;
    let mut unwrap = unwrap.trim_end().to_owned();
    if storage == InterfaceStorage::VariadicElement {
        unwrap = format!("Dom::from_ref(&*{unwrap})");
    }
    let template = if ty.nullable {
        decl_type = decl_type.option();
        wrap_object_template(&format!("Some({unwrap})"), Some("None"), cc)
    } else {
        wrap_object_template(&unwrap, None, cc)
    };
    let mut info = ConversionInfo::new(&template, decl_type)?;
    if storage == InterfaceStorage::VariadicElement {
        info.rooting = Rooting::RootedVec;
    }
    Ok(info)
}

/// Non-nullable variadic elements go into a rooted vector; everything else
/// holds its own root.
fn interface_storage(member: MemberKind, nullable: bool) -> InterfaceStorage {
    match member {
        MemberKind::Variadic if !nullable => InterfaceStorage::VariadicElement,
        MemberKind::Argument | MemberKind::Variadic => InterfaceStorage::Argument,
        _ => InterfaceStorage::Inline,
    }
}

fn callback_conversion(
    ctx: Context<'_>,
    ty: &IdlType,
    name: &str,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let callback = ctx.callback(name, &cc.location)?;
    let mut decl_type = NativeType::new(name).rc();
    let construct = format!("{name}::new(SafeJSContext::from_ptr(*cx), ${{val}}.get().to_object())");
    if ty.nullable {
        decl_type = decl_type.option();
    }
    let some = |expression: &str| {
        if ty.nullable {
            format!("Some({expression})")
        } else {
            expression.to_owned()
        }
    };

    if ty.flags.contains(TypeFlags::TREAT_NON_OBJECT_AS_NULL) {
        let template = if cc.definitely_object {
            some(&construct)
        } else {
            Fragment::if_else(
                "${val}.get().is_object()",
                Fragment::text(some(&construct)),
                Fragment::text("None"),
            )
            .render()
        };
        return ConversionInfo::new(&template, decl_type);
    }

    let body = if callback.kind == crate::idl::CallbackKind::Interface {
        some(&construct)
    } else {
        let not_callable = if ty.flags.contains(TypeFlags::TREAT_NON_CALLABLE_AS_NULL) {
            "None".to_owned()
        } else {
            cc.fail_with_message(&format!("{} is not callable.", cc.source))
        };
        Fragment::if_else(
            "IsCallable(${val}.get().to_object())",
            Fragment::text(some(&construct)),
            Fragment::text(not_callable),
        )
        .render()
    };
    let null_value = ty.nullable.then_some("None");
    ConversionInfo::new(&wrap_object_template(&body, null_value, cc), decl_type)
}

fn promise_conversion(ty: &IdlType, cc: &ConversionContext) -> Result<ConversionInfo> {
    let template = fill(
        "
        {
            // Resolve in the current global, wrapping the value into its realm.
            rooted!(in(*cx) let global_object = CurrentGlobalOrNull(*cx));
            let promise_global = GlobalScope::from_object_maybe_wrapped(global_object.handle().get(), *cx);
            rooted!(in(*cx) let mut value_to_resolve = $${val}.get());
            if !JS_WrapValue(*cx, value_to_resolve.handle_mut()) {
                $*{exception}
            }
            Promise::new_resolved(&promise_global, cx, value_to_resolve.handle(), CanGc::note())
        }
        ",
        &[("exception", &cc.exception_code)],
    )?;
    let template = template.trim_end();
    let decl_type = NativeType::new("Promise").rc();
    if ty.nullable {
        return ConversionInfo::new(&wrap_nullable(template), decl_type.option());
    }
    ConversionInfo::new(template, decl_type)
}

fn buffer_source_conversion(
    ty: &IdlType,
    buffer: BufferSourceType,
    cc: &ConversionContext,
) -> Result<ConversionInfo> {
    let name = buffer.name();
    let in_argument = matches!(cc.member, MemberKind::Argument | MemberKind::Variadic);
    let (mut decl_type, unwrap, value, rooting) = if in_argument {
        (
            NativeType::new(format!("typedarray::{name}")),
            format!("typedarray::{name}::from(${{val}}.get().to_object())"),
            "val",
            Rooting::AutoRooted,
        )
    } else {
        (
            NativeType::new(format!("typedarray::Heap{name}")).traced_box(),
            format!("typedarray::Heap{name}::from(${{val}}.get().to_object())"),
            "RootedTraceableBox::new(val)",
            Rooting::Traced,
        )
    };
    let failure = cc.fail_with_message(&format!("{} is not a typed array.", cc.source));
    let body = fill(
        "
        match ${unwrap} {
            Ok(val) => ${value},
            Err(()) => {
                $*{failure}
            },
        }
        ",
        &[("unwrap", &unwrap), ("value", value), ("failure", &failure)],
    )?;
    let body = body.trim_end();
    let template = if ty.nullable {
        decl_type = decl_type.option();
        wrap_object_template(&format!("Some({body})"), Some("None"), cc)
    } else {
        wrap_object_template(body, None, cc)
    };
    let mut info = ConversionInfo::new(&template, decl_type)?;
    info.rooting = rooting;
    Ok(info)
}

fn object_conversion(ty: &IdlType, cc: &ConversionContext) -> Result<ConversionInfo> {
    let null_value = ty.nullable.then_some("ptr::null_mut()");
    let template = wrap_object_template("${val}.get().to_object()", null_value, cc);
    if cc.member.is_heap_member() {
        let mut info = ConversionInfo::new(
            &format!("RootedTraceableBox::from_box(Heap::boxed({template}))"),
            NativeType::new("*mut JSObject").heap().traced_box(),
        )?;
        info.rooting = Rooting::Traced;
        return Ok(info);
    }
    let mut info = ConversionInfo::new(&template, NativeType::new("*mut JSObject"))?;
    if cc.member == MemberKind::Argument {
        info.rooting = Rooting::Rooted;
    }
    Ok(info)
}

fn any_conversion(cc: &ConversionContext) -> Result<ConversionInfo> {
    match cc.member {
        MemberKind::Argument | MemberKind::Variadic => {
            ConversionInfo::new("${val}", NativeType::new("HandleValue"))
        },
        MemberKind::Dictionary | MemberKind::Union => {
            let mut info = ConversionInfo::new(
                "RootedTraceableBox::from_box(Heap::boxed(${val}.get()))",
                NativeType::new("JSVal").heap().traced_box(),
            )?;
            info.rooting = Rooting::Traced;
            Ok(info)
        },
        MemberKind::Sequence | MemberKind::Record | MemberKind::CallbackReturn => {
            ConversionInfo::new("${val}.get()", NativeType::new("JSVal"))
        },
    }
}

/// The native expression for an IDL default value of `ty`.
fn default_value(
    ctx: Context<'_>,
    ty: &IdlType,
    default: &DefaultValue,
    cc: &ConversionContext,
) -> Result<String> {
    match (&ty.kind, default) {
        (TypeKind::Any, DefaultValue::Null | DefaultValue::Undefined) => {
            return Ok(any_default(default, cc.member));
        },
        (TypeKind::Any, _) => {
            return Err(cc.unsupported_default(default, "only null and undefined are supported for any"));
        },
        (TypeKind::Object, DefaultValue::Null) if ty.nullable => {
            return Ok("ptr::null_mut()".to_owned());
        },
        (TypeKind::Dictionary { name }, DefaultValue::Null | DefaultValue::Undefined)
            if !ty.nullable =>
        {
            return dictionary_default(ctx, name, default, cc);
        },
        (_, DefaultValue::Null) if ty.includes_nullable() => return Ok("None".to_owned()),
        (_, DefaultValue::Null) => {
            return Err(cc.unsupported_default(default, "the type is not nullable"));
        },
        _ => {},
    }

    let value = match (&ty.kind, default) {
        (TypeKind::Primitive { primitive }, _) => primitive_default(*primitive, default, cc)?,
        (TypeKind::String { string }, DefaultValue::String(value)) => {
            string_default(*string, value, default, cc)?
        },
        (TypeKind::Enum { name }, DefaultValue::String(value)) => {
            let enumeration = ctx.enumeration(name, &cc.location)?;
            if !enumeration.values.contains(value) {
                return Err(cc.unsupported_default(default, "not a value of the enumeration"));
            }
            format!("{name}::{}", enum_value_name(enumeration, value)?)
        },
        (TypeKind::Sequence { .. }, DefaultValue::EmptySequence) => {
            if traced_argument(ctx, ty, cc) {
                "RootedTraceableBox::new(Vec::new())".to_owned()
            } else {
                "Vec::new()".to_owned()
            }
        },
        (TypeKind::Dictionary { name }, DefaultValue::EmptyDictionary) => {
            dictionary_default(ctx, name, default, cc)?
        },
        (TypeKind::Union { .. }, _) => union_default(ctx, ty, default, cc)?,
        _ => return Err(cc.unsupported_default(default, "not supported for this type")),
    };
    if ty.nullable || (ty.is_union() && ty.includes_nullable()) {
        return Ok(format!("Some({value})"));
    }
    Ok(value)
}

fn any_default(default: &DefaultValue, member: MemberKind) -> String {
    let null = matches!(default, DefaultValue::Null);
    match member {
        MemberKind::Argument | MemberKind::Variadic => {
            if null { "HandleValue::null()" } else { "HandleValue::undefined()" }.to_owned()
        },
        MemberKind::Dictionary | MemberKind::Union => format!(
            "RootedTraceableBox::from_box(Heap::boxed({}))",
            if null { "NullValue()" } else { "UndefinedValue()" }
        ),
        _ => if null { "NullValue()" } else { "UndefinedValue()" }.to_owned(),
    }
}

fn dictionary_default(
    ctx: Context<'_>,
    name: &str,
    default: &DefaultValue,
    cc: &ConversionContext,
) -> Result<String> {
    let dictionary = ctx.dictionary(name, &cc.location)?;
    if dictionary_has_required_members(ctx.definitions, dictionary)? {
        return Err(cc.unsupported_default(default, "the dictionary has required members"));
    }
    if ctx.traces.dictionary_needs_tracing(name) {
        return Ok(format!("RootedTraceableBox::new({name}::empty())"));
    }
    Ok(format!("{name}::empty()"))
}

fn primitive_default(
    primitive: PrimitiveType,
    default: &DefaultValue,
    cc: &ConversionContext,
) -> Result<String> {
    match default {
        DefaultValue::Boolean(value) if primitive == PrimitiveType::Boolean => Ok(value.to_string()),
        DefaultValue::Integer(value) if primitive.is_integer() => {
            let in_range = primitive
                .integer_range()
                .is_some_and(|(min, max)| (min..=max).contains(&i128::from(*value)));
            if !in_range {
                return Err(cc.unsupported_default(default, "out of range for the type"));
            }
            Ok(value.to_string())
        },
        DefaultValue::Integer(value) if primitive.is_float() => {
            Ok(float_literal(primitive, *value as f64))
        },
        DefaultValue::Float(value) if primitive.is_float() => {
            if primitive.is_restricted_float() && !value.is_finite() {
                return Err(cc.unsupported_default(default, "restricted floats must be finite"));
            }
            Ok(float_literal(primitive, *value))
        },
        _ => Err(cc.unsupported_default(default, "does not match the type")),
    }
}

fn float_literal(primitive: PrimitiveType, value: f64) -> String {
    let scalar = primitive.scalar_type();
    let literal = if value.is_nan() {
        format!("{scalar}::NAN")
    } else if value == f64::INFINITY {
        format!("{scalar}::INFINITY")
    } else if value == f64::NEG_INFINITY {
        format!("{scalar}::NEG_INFINITY")
    } else {
        format!("{value:?}")
    };
    if primitive.is_restricted_float() {
        return format!("Finite::wrap({literal})");
    }
    literal
}

fn string_default(
    string: StringType,
    value: &str,
    default: &DefaultValue,
    cc: &ConversionContext,
) -> Result<String> {
    Ok(match string {
        StringType::DomString if value.is_empty() => "DOMString::new()".to_owned(),
        StringType::DomString => format!("DOMString::from({value:?})"),
        StringType::UsvString => format!("USVString({value:?}.to_owned())"),
        StringType::ByteString => {
            if value.chars().any(|c| u32::from(c) > 0xFF) {
                return Err(cc.unsupported_default(default, "byte strings only hold code points up to U+00FF"));
            }
            if value.is_ascii() {
                format!("ByteString::new(b{value:?}.to_vec())")
            } else {
                let bytes: Vec<String> = value
                    .chars()
                    .map(|c| format!("0x{:02x}", u32::from(c)))
                    .collect();
                format!("ByteString::new(vec![{}])", bytes.join(", "))
            }
        },
    })
}

fn union_default(
    ctx: Context<'_>,
    ty: &IdlType,
    default: &DefaultValue,
    cc: &ConversionContext,
) -> Result<String> {
    let members = ty.flattened_members();
    let find = |predicate: fn(&IdlType) -> bool| members.iter().copied().find(|member| predicate(member));
    let member = match default {
        DefaultValue::Boolean(_) => find(IdlType::is_boolean),
        DefaultValue::String(_) => find(IdlType::is_string).or_else(|| find(IdlType::is_enum)),
        DefaultValue::EmptyDictionary => find(IdlType::is_dictionary),
        _ => {
            return Err(cc.unsupported_default(
                default,
                "union defaults are limited to null, booleans, strings and empty dictionaries",
            ));
        },
    };
    let Some(member) = member else {
        return Err(cc.unsupported_default(default, "no union member accepts it"));
    };
    let inner = default_value(ctx, &member.inner(), default, &cc.element(MemberKind::Union))?;
    Ok(format!(
        "UnionTypes::{}::{}({inner})",
        union_type_name(ty),
        union_variant_name(member)
    ))
}

/// Declares `decl_name` holding the converted value of `val`, substituting the
/// default when the value is undefined.
pub fn instantiate_conversion(info: &ConversionInfo, val: &str, decl_name: &str) -> Fragment {
    let Some(decl_type) = &info.decl_type else {
        return Fragment::empty();
    };
    let conversion = info.template.substitute(val);
    let value = match &info.default {
        Some(default) => Fragment::if_else(
            &format!("{val}.get().is_undefined()"),
            Fragment::text(default.as_str()),
            Fragment::text(conversion),
        )
        .render(),
        None => conversion,
    };
    match info.rooting {
        Rooting::Rooted => Fragment::text(format!("rooted!(in(*cx) let {decl_name} = {value});")),
        Rooting::AutoRooted => Fragment::lines([
            Fragment::text(format!("let {decl_name}: {decl_type} = {value};")),
            Fragment::text(format!("auto_root!(in(*cx) let {decl_name} = {decl_name});")),
        ]),
        Rooting::None | Rooting::Traced | Rooting::RootedVec => {
            Fragment::text(format!("let {decl_name}: {decl_type} = {value};"))
        },
    }
}

/// Writes `result` into `destination` and then runs `on_success`.
pub fn native_to_type(
    ty: &IdlType,
    result: &str,
    destination: &str,
    pre: Option<Fragment>,
    on_success: &str,
) -> Fragment {
    let write = if ty.is_undefined() {
        format!("{destination}.set(UndefinedValue());")
    } else {
        format!("({result}).to_jsval(*cx, {destination});")
    };
    Fragment::lines(
        pre.into_iter()
            .chain([Fragment::text(write), Fragment::text(on_success)]),
    )
}

/// Whether native code hands the value back through a `MutableHandleValue`
/// out-parameter instead of returning it.
pub fn returns_via_out_param(ty: &IdlType) -> bool {
    ty.is_any()
}

/// The type a native method returns for `ty`, wrapped in `Fallible` when the
/// method may throw.
pub fn return_type(
    ctx: Context<'_>,
    ty: &IdlType,
    throws: bool,
    location: &Location,
) -> Result<NativeType> {
    let native = native_return_type(ctx, ty, false, location)?;
    Ok(if throws { native.fallible() } else { native })
}

fn native_return_type(
    ctx: Context<'_>,
    ty: &IdlType,
    nested: bool,
    location: &Location,
) -> Result<NativeType> {
    let native = match &ty.kind {
        TypeKind::Undefined => return Ok(NativeType::unit()),
        TypeKind::Any if nested => return Ok(NativeType::new("JSVal")),
        TypeKind::Any => return Ok(NativeType::unit()),
        TypeKind::Primitive { primitive } => NativeType::new(primitive.native_type()),
        TypeKind::String { string } => NativeType::new(string.native_type()),
        TypeKind::Enum { name } => NativeType::new(name.as_str()),
        TypeKind::Interface { name } => {
            NativeType::new(ctx.descriptor(name, location)?.return_type())
        },
        TypeKind::Object => NativeType::new("NonNull<JSObject>"),
        TypeKind::Sequence { element } => native_return_type(ctx, element, true, location)?.vec(),
        TypeKind::Record { key, value } => {
            native_return_type(ctx, value, true, location)?.record(*key)
        },
        TypeKind::Union { .. } => NativeType::new(format!("UnionTypes::{}", union_type_name(ty))),
        TypeKind::Dictionary { name } => {
            let native = NativeType::new(name.as_str());
            if ctx.traces.dictionary_needs_tracing(name) {
                native.traced_box()
            } else {
                native
            }
        },
        TypeKind::Callback { name } => NativeType::new(name.as_str()).rc(),
        TypeKind::Promise { .. } => NativeType::new("Promise").rc(),
        TypeKind::BufferSource { buffer } => {
            NativeType::new(format!("typedarray::Heap{}", buffer.name())).traced_box()
        },
    };
    if ty.includes_nullable() {
        return Ok(native.option());
    }
    Ok(native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodegenConfig;
    use crate::descriptor::DescriptorTable;
    use crate::idl::{
        Callback, CallbackKind, Definitions, Dictionary, DictionaryMember, Enum, Interface,
    };
    use crate::traceability::TraceAnalysis;

    struct Fixture {
        definitions: Definitions,
        descriptors: DescriptorTable,
        traces: TraceAnalysis,
        config: CodegenConfig,
    }

    impl Fixture {
        fn new() -> Fixture {
            let mut definitions = Definitions::default();
            definitions.add_interface(Interface {
                name: "Node".to_owned(),
                ..Default::default()
            });
            definitions.add_enum(Enum {
                name: "Mode".to_owned(),
                values: vec!["open".to_owned(), "closed".to_owned()],
                ..Default::default()
            });
            definitions.add_dictionary(Dictionary {
                name: "Options".to_owned(),
                members: vec![DictionaryMember::new("capture", IdlType::boolean())],
                ..Default::default()
            });
            definitions.add_dictionary(Dictionary {
                name: "Required".to_owned(),
                members: vec![DictionaryMember::new("id", IdlType::long()).required()],
                ..Default::default()
            });
            definitions.add_callback(Callback {
                name: "Listener".to_owned(),
                kind: CallbackKind::Function,
                ..Default::default()
            });
            let config = CodegenConfig::default();
            let descriptors = DescriptorTable::from_config(&config, &definitions);
            let traces = TraceAnalysis::analyse(&definitions).unwrap();
            Fixture {
                definitions,
                descriptors,
                traces,
                config,
            }
        }

        fn context(&self) -> Context<'_> {
            Context {
                definitions: &self.definitions,
                descriptors: &self.descriptors,
                traces: &self.traces,
                config: &self.config,
            }
        }
    }

    fn cc() -> ConversionContext {
        ConversionContext::new("Argument 1 of Test.f", &Location::new("Test.webidl", 1))
    }

    #[test]
    fn nullable_types_branch_on_null_first() {
        let fixture = Fixture::new();
        let info = type_to_native(fixture.context(), &IdlType::long().nullable(), &cc()).unwrap();
        let template = info.template.to_string();
        assert!(template.starts_with("if ${val}.get().is_null_or_undefined() {\n    None\n}"));
        assert_eq!(info.decl_type, Some(NativeType::new("Option<i32>")));
    }

    #[test]
    fn pending_exceptions_ignore_the_failure_code() {
        let fixture = Fixture::new();
        let cc = cc().with_failure("break '_block;").with_exception("return false;");
        let info = type_to_native(fixture.context(), &IdlType::dom_string(), &cc).unwrap();
        let template = info.template.to_string();
        assert!(template.contains("Ok(ConversionResult::Failure(error)) => {\n        break '_block;"));
        assert!(template.contains("_ => {\n        return false;\n    },"));
    }

    #[test]
    fn range_policy_reaches_the_runtime() {
        let fixture = Fixture::new();
        let clamped = IdlType::primitive(PrimitiveType::Octet).with_flags(TypeFlags::CLAMP);
        let info = type_to_native(fixture.context(), &clamped, &cc()).unwrap();
        assert!(info.template.to_string().contains("ConversionBehavior::Clamp"));

        let both = clamped.with_flags(TypeFlags::ENFORCE_RANGE);
        assert!(matches!(
            type_to_native(fixture.context(), &both, &cc()),
            Err(Error::ConflictingRangePolicy { .. })
        ));
    }

    #[test]
    fn interfaces_unwrap_through_the_descriptor() {
        let fixture = Fixture::new();
        let info = type_to_native(fixture.context(), &IdlType::interface("Node"), &cc()).unwrap();
        let template = info.template.to_string();
        assert!(template.contains("root_from_handlevalue::<Node>(${val}, *cx)"));
        assert!(template.contains("does not implement interface Node."));
        assert_eq!(info.decl_type, Some(NativeType::new("DomRoot<Node>")));
        assert_eq!(info.rooting, Rooting::None);
    }

    #[test]
    fn dictionary_members_hold_their_own_root() {
        let fixture = Fixture::new();
        let member = cc().member(MemberKind::Dictionary);
        let info = type_to_native(fixture.context(), &IdlType::interface("Node"), &member).unwrap();
        assert_eq!(info.decl_type, Some(NativeType::new("DomRoot<Node>")));
        assert!(!info.template.to_string().contains("Dom::from_ref"));
    }

    #[test]
    fn variadic_interfaces_are_kept_alive_by_a_rooted_vec() {
        let fixture = Fixture::new();
        let variadic = cc().member(MemberKind::Variadic);
        let info = type_to_native(fixture.context(), &IdlType::interface("Node"), &variadic).unwrap();
        assert_eq!(info.decl_type, Some(NativeType::new("Dom<Node>")));
        assert_eq!(info.rooting, Rooting::RootedVec);
        assert!(info.template.to_string().contains("Dom::from_ref(&*match root_from_handlevalue::<Node>"));

        let nullable = IdlType::interface("Node").nullable();
        let info = type_to_native(fixture.context(), &nullable, &variadic).unwrap();
        assert_eq!(info.decl_type, Some(NativeType::new("Option<DomRoot<Node>>")));
        assert_eq!(info.rooting, Rooting::None);
    }

    #[test]
    fn soft_enum_lookup_uses_the_failure_code() {
        let fixture = Fixture::new();
        let soft = cc().soft_enum().with_failure("break '_block;");
        let info = type_to_native(fixture.context(), &IdlType::enumeration("Mode"), &soft).unwrap();
        assert!(info.template.to_string().contains("break '_block;"));

        let hard = cc().with_failure("break '_block;");
        let info = type_to_native(fixture.context(), &IdlType::enumeration("Mode"), &hard).unwrap();
        assert!(!info.template.to_string().contains("break '_block;"));
    }

    #[test]
    fn defaults_are_typed() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let with_default = |ty: IdlType, default: DefaultValue| {
            type_to_native(ctx, &ty, &cc().with_default(Some(default))).map(|info| info.default)
        };
        assert_eq!(
            with_default(IdlType::enumeration("Mode"), DefaultValue::String("closed".into())),
            Ok(Some("Mode::Closed".to_owned()))
        );
        assert_eq!(
            with_default(IdlType::double(), DefaultValue::Integer(1)),
            Ok(Some("Finite::wrap(1.0)".to_owned()))
        );
        assert_eq!(
            with_default(IdlType::dictionary("Options"), DefaultValue::EmptyDictionary),
            Ok(Some("Options::empty()".to_owned()))
        );
        assert!(with_default(IdlType::dictionary("Required"), DefaultValue::EmptyDictionary).is_err());
        assert!(with_default(
            IdlType::primitive(PrimitiveType::Octet),
            DefaultValue::Integer(256)
        )
        .is_err());
    }

    #[test]
    fn union_defaults_pick_the_matching_member() {
        let fixture = Fixture::new();
        let union = IdlType::union(vec![IdlType::boolean(), IdlType::dictionary("Options")]);
        let info = type_to_native(
            fixture.context(),
            &union,
            &cc().with_default(Some(DefaultValue::Boolean(true))),
        )
        .unwrap();
        assert_eq!(
            info.default.as_deref(),
            Some("UnionTypes::BooleanOrOptions::Boolean(true)")
        );
        assert!(type_to_native(
            fixture.context(),
            &union,
            &cc().with_default(Some(DefaultValue::Integer(3))),
        )
        .is_err());
    }

    #[test]
    fn non_callable_as_null_requires_nullable() {
        let fixture = Fixture::new();
        let callback = IdlType::callback("Listener").with_flags(TypeFlags::TREAT_NON_CALLABLE_AS_NULL);
        assert!(matches!(
            type_to_native(fixture.context(), &callback, &cc()),
            Err(Error::NonNullableTreatAsNull { .. })
        ));
        let info = type_to_native(fixture.context(), &callback.nullable(), &cc()).unwrap();
        let template = info.template.to_string();
        assert!(template.contains("IsCallable(${val}.get().to_object())"));
        assert!(!template.contains("is not callable"));
    }

    #[test]
    fn object_arguments_are_rooted() {
        let fixture = Fixture::new();
        let info = type_to_native(fixture.context(), &IdlType::object(), &cc()).unwrap();
        assert!(info.needs_rooting());
        let declaration = instantiate_conversion(&info, "HandleValue::from_raw(args.get(0))", "arg0");
        assert!(declaration.render().starts_with("rooted!(in(*cx) let arg0 = if "));

        let member = cc().member(MemberKind::Dictionary);
        let info = type_to_native(fixture.context(), &IdlType::object(), &member).unwrap();
        assert_eq!(
            info.decl_type,
            Some(NativeType::new("RootedTraceableBox<Heap<*mut JSObject>>"))
        );
    }

    #[test]
    fn instantiation_inserts_the_default_branch() {
        let fixture = Fixture::new();
        let info = type_to_native(
            fixture.context(),
            &IdlType::boolean(),
            &cc().with_default(Some(DefaultValue::Boolean(false))),
        )
        .unwrap();
        let declaration = instantiate_conversion(&info, "value", "flag").render();
        assert!(declaration.starts_with("let flag: bool = if value.get().is_undefined() {\n    false\n} else {"));
    }

    #[test]
    fn return_types_follow_fallibility() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let location = Location::default();
        assert_eq!(
            return_type(ctx, &IdlType::interface("Node").nullable(), true, &location)
                .unwrap()
                .as_str(),
            "Fallible<Option<DomRoot<Node>>>"
        );
        assert_eq!(
            return_type(ctx, &IdlType::sequence(IdlType::any()), false, &location)
                .unwrap()
                .as_str(),
            "Vec<JSVal>"
        );
    }
}
