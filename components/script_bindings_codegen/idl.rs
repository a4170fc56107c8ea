/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The resolved WebIDL tree consumed by the generators.
//!
//! Parsing happens elsewhere; these types only carry what code generation needs.
//! They deserialize from the JSON dump produced by the IDL front end.

use std::fmt;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Where a construct was declared.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: &str, line: u32) -> Location {
        Location {
            file: file.to_owned(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            return write!(f, "<unknown>:{}", self.line);
        }
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Octet,
    Short,
    UnsignedShort,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    UnrestrictedFloat,
    Double,
    UnrestrictedDouble,
}

impl PrimitiveType {
    pub fn native_type(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "bool",
            PrimitiveType::Byte => "i8",
            PrimitiveType::Octet => "u8",
            PrimitiveType::Short => "i16",
            PrimitiveType::UnsignedShort => "u16",
            PrimitiveType::Long => "i32",
            PrimitiveType::UnsignedLong => "u32",
            PrimitiveType::LongLong => "i64",
            PrimitiveType::UnsignedLongLong => "u64",
            PrimitiveType::Float => "Finite<f32>",
            PrimitiveType::UnrestrictedFloat => "f32",
            PrimitiveType::Double => "Finite<f64>",
            PrimitiveType::UnrestrictedDouble => "f64",
        }
    }

    /// The bare Rust scalar, without the `Finite` wrapper.
    pub fn scalar_type(self) -> &'static str {
        match self {
            PrimitiveType::Float => "f32",
            PrimitiveType::Double => "f64",
            other => other.native_type(),
        }
    }

    pub fn is_integer(self) -> bool {
        self.integer_range().is_some()
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            PrimitiveType::Float |
                PrimitiveType::UnrestrictedFloat |
                PrimitiveType::Double |
                PrimitiveType::UnrestrictedDouble
        )
    }

    /// Restricted floats reject NaN and the infinities.
    pub fn is_restricted_float(self) -> bool {
        matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    pub fn integer_range(self) -> Option<(i128, i128)> {
        let range = match self {
            PrimitiveType::Byte => (i8::MIN as i128, i8::MAX as i128),
            PrimitiveType::Octet => (0, u8::MAX as i128),
            PrimitiveType::Short => (i16::MIN as i128, i16::MAX as i128),
            PrimitiveType::UnsignedShort => (0, u16::MAX as i128),
            PrimitiveType::Long => (i32::MIN as i128, i32::MAX as i128),
            PrimitiveType::UnsignedLong => (0, u32::MAX as i128),
            PrimitiveType::LongLong => (i64::MIN as i128, i64::MAX as i128),
            PrimitiveType::UnsignedLongLong => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Octet => "octet",
            PrimitiveType::Short => "short",
            PrimitiveType::UnsignedShort => "unsigned short",
            PrimitiveType::Long => "long",
            PrimitiveType::UnsignedLong => "unsigned long",
            PrimitiveType::LongLong => "long long",
            PrimitiveType::UnsignedLongLong => "unsigned long long",
            PrimitiveType::Float => "float",
            PrimitiveType::UnrestrictedFloat => "unrestricted float",
            PrimitiveType::Double => "double",
            PrimitiveType::UnrestrictedDouble => "unrestricted double",
        })
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StringType {
    DomString,
    UsvString,
    ByteString,
}

impl StringType {
    pub fn native_type(self) -> &'static str {
        match self {
            StringType::DomString => "DOMString",
            StringType::UsvString => "USVString",
            StringType::ByteString => "ByteString",
        }
    }

    fn variant_name(self) -> &'static str {
        match self {
            StringType::DomString => "String",
            StringType::UsvString => "USVString",
            StringType::ByteString => "ByteString",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, strum::IntoStaticStr)]
pub enum BufferSourceType {
    ArrayBuffer,
    ArrayBufferView,
    DataView,
    Int8Array,
    Uint8Array,
    Uint8ClampedArray,
    Int16Array,
    Uint16Array,
    Int32Array,
    Uint32Array,
    Float32Array,
    Float64Array,
}

impl BufferSourceType {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

bitflags! {
    /// Extended attributes that change how a value of a type is converted.
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
    pub struct TypeFlags: u8 {
        /// `[EnforceRange]`: out-of-range integers throw.
        const ENFORCE_RANGE = 1 << 0;
        /// `[Clamp]`: out-of-range integers saturate.
        const CLAMP = 1 << 1;
        /// `[LegacyNullToEmptyString]`
        const LEGACY_NULL_TO_EMPTY_STRING = 1 << 2;
        /// `[LegacyTreatNonObjectAsNull]` on callback functions.
        const TREAT_NON_OBJECT_AS_NULL = 1 << 3;
        /// Non-callable values of a nullable callback type become null.
        const TREAT_NON_CALLABLE_AS_NULL = 1 << 4;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
    pub struct MemberFlags: u8 {
        const THROWS = 1 << 0;
        const CE_REACTIONS = 1 << 1;
        /// `[LegacyUnforgeable]`
        const UNFORGEABLE = 1 << 2;
        const CROSS_ORIGIN_READABLE = 1 << 3;
        const CROSS_ORIGIN_WRITABLE = 1 << 4;
        const CROSS_ORIGIN_CALLABLE = 1 << 5;
        const CAN_GC = 1 << 6;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
    pub struct InterfaceFlags: u8 {
        const LEGACY_UNENUMERABLE_NAMED_PROPERTIES = 1 << 0;
        const LEGACY_OVERRIDE_BUILTINS = 1 << 1;
        const GLOBAL = 1 << 2;
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Primitive { primitive: PrimitiveType },
    String { string: StringType },
    Sequence { element: Box<IdlType> },
    Record { key: StringType, value: Box<IdlType> },
    Union { members: Vec<IdlType> },
    Dictionary { name: String },
    Interface { name: String },
    Enum { name: String },
    /// A callback function or callback interface.
    Callback { name: String },
    Promise { resolved: Box<IdlType> },
    Any,
    Object,
    BufferSource { buffer: BufferSourceType },
    Undefined,
}

/// The WebIDL distinguishability categories.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeCategory {
    Undefined,
    Boolean,
    Numeric,
    String,
    Object,
    InterfaceLike,
    CallbackFunction,
    DictionaryLike,
    SequenceLike,
    Promise,
    Any,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct IdlType {
    #[serde(flatten)]
    pub kind: TypeKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub flags: TypeFlags,
}

impl IdlType {
    pub fn new(kind: TypeKind) -> IdlType {
        IdlType {
            kind,
            nullable: false,
            flags: TypeFlags::empty(),
        }
    }

    pub fn primitive(primitive: PrimitiveType) -> IdlType {
        IdlType::new(TypeKind::Primitive { primitive })
    }

    pub fn boolean() -> IdlType {
        IdlType::primitive(PrimitiveType::Boolean)
    }

    pub fn long() -> IdlType {
        IdlType::primitive(PrimitiveType::Long)
    }

    pub fn unsigned_long() -> IdlType {
        IdlType::primitive(PrimitiveType::UnsignedLong)
    }

    pub fn double() -> IdlType {
        IdlType::primitive(PrimitiveType::Double)
    }

    pub fn string(string: StringType) -> IdlType {
        IdlType::new(TypeKind::String { string })
    }

    pub fn dom_string() -> IdlType {
        IdlType::string(StringType::DomString)
    }

    pub fn sequence(element: IdlType) -> IdlType {
        IdlType::new(TypeKind::Sequence {
            element: Box::new(element),
        })
    }

    pub fn record(key: StringType, value: IdlType) -> IdlType {
        IdlType::new(TypeKind::Record {
            key,
            value: Box::new(value),
        })
    }

    pub fn union(members: Vec<IdlType>) -> IdlType {
        IdlType::new(TypeKind::Union { members })
    }

    pub fn dictionary(name: &str) -> IdlType {
        IdlType::new(TypeKind::Dictionary {
            name: name.to_owned(),
        })
    }

    pub fn interface(name: &str) -> IdlType {
        IdlType::new(TypeKind::Interface {
            name: name.to_owned(),
        })
    }

    pub fn enumeration(name: &str) -> IdlType {
        IdlType::new(TypeKind::Enum {
            name: name.to_owned(),
        })
    }

    pub fn callback(name: &str) -> IdlType {
        IdlType::new(TypeKind::Callback {
            name: name.to_owned(),
        })
    }

    pub fn promise(resolved: IdlType) -> IdlType {
        IdlType::new(TypeKind::Promise {
            resolved: Box::new(resolved),
        })
    }

    pub fn any() -> IdlType {
        IdlType::new(TypeKind::Any)
    }

    pub fn object() -> IdlType {
        IdlType::new(TypeKind::Object)
    }

    pub fn buffer_source(buffer: BufferSourceType) -> IdlType {
        IdlType::new(TypeKind::BufferSource { buffer })
    }

    pub fn undefined() -> IdlType {
        IdlType::new(TypeKind::Undefined)
    }

    pub fn nullable(mut self) -> IdlType {
        self.nullable = true;
        self
    }

    pub fn with_flags(mut self, flags: TypeFlags) -> IdlType {
        self.flags |= flags;
        self
    }

    /// The same type with nullability removed.
    pub fn inner(&self) -> IdlType {
        IdlType {
            nullable: false,
            ..self.clone()
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, TypeKind::Undefined)
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any)
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive { .. })
    }

    pub fn is_boolean(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Primitive {
                primitive: PrimitiveType::Boolean
            }
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_primitive() && !self.is_boolean()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, TypeKind::String { .. })
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum { .. })
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, TypeKind::Sequence { .. })
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, TypeKind::Record { .. })
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union { .. })
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.kind, TypeKind::Dictionary { .. })
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface { .. })
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.kind, TypeKind::Callback { .. })
    }

    pub fn is_promise(&self) -> bool {
        matches!(self.kind, TypeKind::Promise { .. })
    }

    pub fn is_buffer_source(&self) -> bool {
        matches!(self.kind, TypeKind::BufferSource { .. })
    }

    /// The members of a union with nested unions expanded; `[self]` otherwise.
    pub fn flattened_members(&self) -> Vec<&IdlType> {
        match &self.kind {
            TypeKind::Union { members } => members
                .iter()
                .flat_map(IdlType::flattened_members)
                .collect(),
            _ => vec![self],
        }
    }

    /// Whether null is a valid value, either directly or through a nullable
    /// union member.
    pub fn includes_nullable(&self) -> bool {
        self.nullable ||
            match &self.kind {
                TypeKind::Union { members } => members.iter().any(IdlType::includes_nullable),
                _ => false,
            }
    }

    pub fn category(&self, definitions: &Definitions) -> TypeCategory {
        match &self.kind {
            TypeKind::Undefined => TypeCategory::Undefined,
            TypeKind::Primitive {
                primitive: PrimitiveType::Boolean,
            } => TypeCategory::Boolean,
            TypeKind::Primitive { .. } => TypeCategory::Numeric,
            TypeKind::String { .. } | TypeKind::Enum { .. } => TypeCategory::String,
            TypeKind::Object => TypeCategory::Object,
            TypeKind::Interface { .. } | TypeKind::BufferSource { .. } => {
                TypeCategory::InterfaceLike
            },
            TypeKind::Callback { name } => match definitions.callbacks.get(name) {
                Some(callback) if callback.kind == CallbackKind::Interface => {
                    TypeCategory::DictionaryLike
                },
                _ => TypeCategory::CallbackFunction,
            },
            TypeKind::Dictionary { .. } | TypeKind::Record { .. } => TypeCategory::DictionaryLike,
            TypeKind::Sequence { .. } => TypeCategory::SequenceLike,
            TypeKind::Promise { .. } => TypeCategory::Promise,
            TypeKind::Any => TypeCategory::Any,
            // A union's category is that of its members; callers flatten first.
            TypeKind::Union { .. } => TypeCategory::Object,
        }
    }

    fn includes_dictionary_like(&self, definitions: &Definitions) -> bool {
        self.flattened_members()
            .iter()
            .any(|member| member.category(definitions) == TypeCategory::DictionaryLike)
    }

    /// <https://webidl.spec.whatwg.org/#dfn-distinguishable>
    pub fn is_distinguishable_from(&self, other: &IdlType, definitions: &Definitions) -> bool {
        if self.includes_nullable() &&
            (other.includes_nullable() || other.includes_dictionary_like(definitions))
        {
            return false;
        }
        if other.includes_nullable() && self.includes_dictionary_like(definitions) {
            return false;
        }
        let theirs = other.flattened_members();
        self.flattened_members().iter().all(|ours| {
            theirs
                .iter()
                .all(|theirs| categories_distinguishable(ours, theirs, definitions))
        })
    }

    /// The name used for union variants and union type names.
    pub fn variant_name(&self) -> String {
        let name = match &self.kind {
            TypeKind::Primitive { primitive } => <&str>::from(*primitive).to_owned(),
            TypeKind::String { string } => string.variant_name().to_owned(),
            TypeKind::Sequence { element } => format!("{}Sequence", element.variant_name()),
            TypeKind::Record { key, value } => {
                format!("{}{}Record", key.variant_name(), value.variant_name())
            },
            TypeKind::Union { members } => members
                .iter()
                .map(IdlType::variant_name)
                .collect::<Vec<_>>()
                .join("Or"),
            TypeKind::Dictionary { name } |
            TypeKind::Interface { name } |
            TypeKind::Enum { name } |
            TypeKind::Callback { name } => name.clone(),
            TypeKind::Promise { .. } => "Promise".to_owned(),
            TypeKind::Any => "Any".to_owned(),
            TypeKind::Object => "Object".to_owned(),
            TypeKind::BufferSource { buffer } => buffer.name().to_owned(),
            TypeKind::Undefined => "Undefined".to_owned(),
        };
        if self.nullable {
            return format!("{name}OrNull");
        }
        name
    }
}

impl fmt::Display for IdlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Primitive { primitive } => write!(f, "{primitive}")?,
            TypeKind::String { string } => f.write_str(match string {
                StringType::DomString => "DOMString",
                StringType::UsvString => "USVString",
                StringType::ByteString => "ByteString",
            })?,
            TypeKind::Sequence { element } => write!(f, "sequence<{element}>")?,
            TypeKind::Record { key, value } => {
                write!(f, "record<{}, {value}>", IdlType::string(*key))?
            },
            TypeKind::Union { members } => {
                let members: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "({})", members.join(" or "))?
            },
            TypeKind::Dictionary { name } |
            TypeKind::Interface { name } |
            TypeKind::Enum { name } |
            TypeKind::Callback { name } => f.write_str(name)?,
            TypeKind::Promise { resolved } => write!(f, "Promise<{resolved}>")?,
            TypeKind::Any => f.write_str("any")?,
            TypeKind::Object => f.write_str("object")?,
            TypeKind::BufferSource { buffer } => f.write_str(buffer.name())?,
            TypeKind::Undefined => f.write_str("undefined")?,
        }
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

fn interface_like_name(ty: &IdlType) -> Option<&str> {
    match &ty.kind {
        TypeKind::Interface { name } => Some(name),
        TypeKind::BufferSource { buffer } => Some(buffer.name()),
        _ => None,
    }
}

fn categories_distinguishable(a: &IdlType, b: &IdlType, definitions: &Definitions) -> bool {
    use TypeCategory::*;
    match (a.category(definitions), b.category(definitions)) {
        (Any, _) | (_, Any) | (Promise, _) | (_, Promise) => false,
        (InterfaceLike, InterfaceLike) => {
            match (interface_like_name(a), interface_like_name(b)) {
                (Some(a), Some(b)) => {
                    a != b && !definitions.inherits_from(a, b) && !definitions.inherits_from(b, a)
                },
                _ => false,
            }
        },
        (x, y) if x == y => false,
        (Undefined, DictionaryLike) | (DictionaryLike, Undefined) => false,
        (Object, InterfaceLike | CallbackFunction | DictionaryLike | SequenceLike) |
        (InterfaceLike | CallbackFunction | DictionaryLike | SequenceLike, Object) => false,
        (CallbackFunction, DictionaryLike) | (DictionaryLike, CallbackFunction) => false,
        _ => true,
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    Null,
    Undefined,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// `[]`
    EmptySequence,
    /// `{}`
    EmptyDictionary,
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Null => f.write_str("null"),
            DefaultValue::Undefined => f.write_str("undefined"),
            DefaultValue::Boolean(value) => write!(f, "{value}"),
            DefaultValue::Integer(value) => write!(f, "{value}"),
            DefaultValue::Float(value) => write!(f, "{value}"),
            DefaultValue::String(value) => write!(f, "{value:?}"),
            DefaultValue::EmptySequence => f.write_str("[]"),
            DefaultValue::EmptyDictionary => f.write_str("{}"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

impl Argument {
    pub fn new(name: &str, ty: IdlType) -> Argument {
        Argument {
            name: name.to_owned(),
            ty,
            optional: false,
            variadic: false,
            default: None,
        }
    }

    pub fn optional(mut self) -> Argument {
        self.optional = true;
        self
    }

    pub fn variadic(mut self) -> Argument {
        self.optional = true;
        self.variadic = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Argument {
        self.optional = true;
        self.default = Some(default);
        self
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Signature {
    #[serde(default = "IdlType::undefined")]
    pub return_type: IdlType,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

impl Signature {
    pub fn new(return_type: IdlType, arguments: Vec<Argument>) -> Signature {
        Signature {
            return_type,
            arguments,
        }
    }

    /// The number of leading arguments that must be supplied.
    pub fn required_argument_count(&self) -> usize {
        self.arguments
            .iter()
            .rposition(|argument| !argument.optional)
            .map_or(0, |position| position + 1)
    }

    pub fn is_variadic(&self) -> bool {
        self.arguments.last().is_some_and(|argument| argument.variadic)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Operation {
    pub name: String,
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub flags: MemberFlags,
    #[serde(default)]
    pub location: Location,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub flags: MemberFlags,
    #[serde(default)]
    pub location: Location,
}

/// An indexed or named getter, setter or deleter.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SpecialOperation {
    pub signature: Signature,
    #[serde(default)]
    pub flags: MemberFlags,
    #[serde(default)]
    pub location: Location,
}

impl SpecialOperation {
    /// The type a getter produces or a setter accepts.
    pub fn value_type(&self) -> &IdlType {
        if self.signature.return_type.is_undefined() {
            if let Some(value) = self.signature.arguments.get(1) {
                return &value.ty;
            }
        }
        &self.signature.return_type
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Interface {
    pub name: String,
    pub parent: Option<String>,
    pub operations: Vec<Operation>,
    pub attributes: Vec<Attribute>,
    pub indexed_getter: Option<SpecialOperation>,
    pub indexed_setter: Option<SpecialOperation>,
    pub named_getter: Option<SpecialOperation>,
    pub named_setter: Option<SpecialOperation>,
    pub named_deleter: Option<SpecialOperation>,
    pub flags: InterfaceFlags,
    pub location: Location,
}

impl Interface {
    pub fn supports_indexed_properties(&self) -> bool {
        self.indexed_getter.is_some()
    }

    pub fn supports_named_properties(&self) -> bool {
        self.named_getter.is_some()
    }

    /// Interfaces with indexed or named properties are backed by a proxy.
    pub fn is_legacy_platform_object(&self) -> bool {
        (self.supports_indexed_properties() || self.supports_named_properties()) &&
            !self.flags.contains(InterfaceFlags::GLOBAL)
    }

    pub fn has_unforgeable_members(&self) -> bool {
        self.operations
            .iter()
            .any(|operation| operation.flags.contains(MemberFlags::UNFORGEABLE)) ||
            self.attributes
                .iter()
                .any(|attribute| attribute.flags.contains(MemberFlags::UNFORGEABLE))
    }

    /// Attributes readable and operations callable across origins.
    pub fn cross_origin_members(&self) -> (Vec<&Attribute>, Vec<&Operation>) {
        let cross_origin = MemberFlags::CROSS_ORIGIN_READABLE |
            MemberFlags::CROSS_ORIGIN_WRITABLE |
            MemberFlags::CROSS_ORIGIN_CALLABLE;
        (
            self.attributes
                .iter()
                .filter(|attribute| attribute.flags.intersects(cross_origin))
                .collect(),
            self.operations
                .iter()
                .filter(|operation| operation.flags.intersects(cross_origin))
                .collect(),
        )
    }

    pub fn is_maybe_cross_origin(&self) -> bool {
        let (attributes, operations) = self.cross_origin_members();
        !attributes.is_empty() || !operations.is_empty()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DictionaryMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

impl DictionaryMember {
    pub fn new(name: &str, ty: IdlType) -> DictionaryMember {
        DictionaryMember {
            name: name.to_owned(),
            ty,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> DictionaryMember {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> DictionaryMember {
        self.default = Some(default);
        self
    }

    pub fn is_optional(&self) -> bool {
        !self.required
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dictionary {
    pub name: String,
    pub parent: Option<String>,
    pub members: Vec<DictionaryMember>,
    pub location: Location,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Enum {
    pub name: String,
    pub values: Vec<String>,
    pub location: Location,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    #[default]
    Function,
    Interface,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CallbackOperation {
    pub name: String,
    pub signature: Signature,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Callback {
    pub name: String,
    pub kind: CallbackKind,
    pub operations: Vec<CallbackOperation>,
    pub location: Location,
}

impl Callback {
    /// A callback interface with exactly one operation also accepts a bare
    /// callable.
    pub fn is_single_operation(&self) -> bool {
        self.kind == CallbackKind::Interface && self.operations.len() == 1
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct DefinitionList {
    interfaces: Vec<Interface>,
    dictionaries: Vec<Dictionary>,
    enums: Vec<Enum>,
    callbacks: Vec<Callback>,
}

/// All definitions of one generation run, keyed by name in declaration order.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "DefinitionList")]
pub struct Definitions {
    pub interfaces: IndexMap<String, Interface>,
    pub dictionaries: IndexMap<String, Dictionary>,
    pub enums: IndexMap<String, Enum>,
    pub callbacks: IndexMap<String, Callback>,
}

impl From<DefinitionList> for Definitions {
    fn from(list: DefinitionList) -> Definitions {
        let mut definitions = Definitions::default();
        list.interfaces
            .into_iter()
            .for_each(|interface| definitions.add_interface(interface));
        list.dictionaries
            .into_iter()
            .for_each(|dictionary| definitions.add_dictionary(dictionary));
        list.enums
            .into_iter()
            .for_each(|enumeration| definitions.add_enum(enumeration));
        list.callbacks
            .into_iter()
            .for_each(|callback| definitions.add_callback(callback));
        definitions
    }
}

impl Definitions {
    pub fn add_interface(&mut self, interface: Interface) {
        self.interfaces.insert(interface.name.clone(), interface);
    }

    pub fn add_dictionary(&mut self, dictionary: Dictionary) {
        self.dictionaries.insert(dictionary.name.clone(), dictionary);
    }

    pub fn add_enum(&mut self, enumeration: Enum) {
        self.enums.insert(enumeration.name.clone(), enumeration);
    }

    pub fn add_callback(&mut self, callback: Callback) {
        self.callbacks.insert(callback.name.clone(), callback);
    }

    fn lookup<'a, T>(
        map: &'a IndexMap<String, T>,
        kind: &'static str,
        name: &str,
        location: &Location,
    ) -> Result<&'a T> {
        map.get(name).ok_or_else(|| Error::UnknownDefinition {
            kind,
            name: name.to_owned(),
            location: location.clone(),
        })
    }

    pub fn interface(&self, name: &str, location: &Location) -> Result<&Interface> {
        Definitions::lookup(&self.interfaces, "interface", name, location)
    }

    pub fn dictionary(&self, name: &str, location: &Location) -> Result<&Dictionary> {
        Definitions::lookup(&self.dictionaries, "dictionary", name, location)
    }

    pub fn enumeration(&self, name: &str, location: &Location) -> Result<&Enum> {
        Definitions::lookup(&self.enums, "enum", name, location)
    }

    pub fn callback(&self, name: &str, location: &Location) -> Result<&Callback> {
        Definitions::lookup(&self.callbacks, "callback", name, location)
    }

    /// Whether interface `child` has `ancestor` somewhere up its parent chain.
    pub fn inherits_from(&self, child: &str, ancestor: &str) -> bool {
        let mut current = self
            .interfaces
            .get(child)
            .and_then(|interface| interface.parent.as_deref());
        let mut steps = 0;
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.interfaces.len() {
                return false;
            }
            current = self
                .interfaces
                .get(name)
                .and_then(|interface| interface.parent.as_deref());
        }
        false
    }

    /// Checks the structural rules every argument list must follow.
    pub fn validate(&self) -> Result<()> {
        let interface_signatures = self.interfaces.values().flat_map(|interface| {
            interface.operations.iter().flat_map(move |operation| {
                operation.signatures.iter().map(move |signature| {
                    (
                        format!("{}.{}", interface.name, operation.name),
                        signature,
                        &operation.location,
                    )
                })
            })
        });
        let callback_signatures = self.callbacks.values().flat_map(|callback| {
            callback.operations.iter().map(move |operation| {
                (
                    format!("{}.{}", callback.name, operation.name),
                    &operation.signature,
                    &callback.location,
                )
            })
        });

        for (operation, signature, location) in interface_signatures.chain(callback_signatures) {
            validate_signature(&operation, signature, location)?;
        }
        Ok(())
    }
}

fn validate_signature(operation: &str, signature: &Signature, location: &Location) -> Result<()> {
    let count = signature.arguments.len();
    let mut seen_optional = false;
    for (index, argument) in signature.arguments.iter().enumerate() {
        if argument.variadic && index + 1 != count {
            return Err(Error::MisplacedVariadic {
                operation: operation.to_owned(),
                argument: argument.name.clone(),
                location: location.clone(),
            });
        }
        if !argument.optional && seen_optional {
            return Err(Error::RequiredAfterOptional {
                operation: operation.to_owned(),
                argument: argument.name.clone(),
                location: location.clone(),
            });
        }
        seen_optional |= argument.optional;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Definitions {
        let mut definitions = Definitions::default();
        definitions.add_interface(Interface {
            name: "Node".to_owned(),
            ..Default::default()
        });
        definitions.add_interface(Interface {
            name: "Element".to_owned(),
            parent: Some("Node".to_owned()),
            ..Default::default()
        });
        definitions.add_interface(Interface {
            name: "Blob".to_owned(),
            ..Default::default()
        });
        definitions.add_dictionary(Dictionary {
            name: "Init".to_owned(),
            ..Default::default()
        });
        definitions
    }

    #[test]
    fn strings_and_numbers_are_distinguishable() {
        let definitions = definitions();
        assert!(IdlType::dom_string().is_distinguishable_from(&IdlType::long(), &definitions));
        assert!(!IdlType::long().is_distinguishable_from(&IdlType::double(), &definitions));
    }

    #[test]
    fn related_interfaces_are_not_distinguishable() {
        let definitions = definitions();
        let node = IdlType::interface("Node");
        assert!(!node.is_distinguishable_from(&IdlType::interface("Element"), &definitions));
        assert!(node.is_distinguishable_from(&IdlType::interface("Blob"), &definitions));
    }

    #[test]
    fn nullable_and_dictionary_clash() {
        let definitions = definitions();
        let nullable = IdlType::interface("Node").nullable();
        assert!(!nullable.is_distinguishable_from(&IdlType::dictionary("Init"), &definitions));
        assert!(!nullable.is_distinguishable_from(&IdlType::long().nullable(), &definitions));
        assert!(nullable.is_distinguishable_from(&IdlType::long(), &definitions));
    }

    #[test]
    fn object_clashes_with_object_like_types() {
        let definitions = definitions();
        let object = IdlType::object();
        assert!(!object.is_distinguishable_from(&IdlType::sequence(IdlType::long()), &definitions));
        assert!(!object.is_distinguishable_from(&IdlType::interface("Node"), &definitions));
        assert!(object.is_distinguishable_from(&IdlType::dom_string(), &definitions));
    }

    #[test]
    fn unions_compare_member_wise() {
        let definitions = definitions();
        let union = IdlType::union(vec![IdlType::interface("Node"), IdlType::long()]);
        assert!(union.is_distinguishable_from(&IdlType::dom_string(), &definitions));
        assert!(!union.is_distinguishable_from(&IdlType::double(), &definitions));
    }

    #[test]
    fn required_argument_count_ignores_trailing_optionals() {
        let signature = Signature::new(
            IdlType::undefined(),
            vec![
                Argument::new("a", IdlType::long()),
                Argument::new("b", IdlType::long()).optional(),
                Argument::new("c", IdlType::long()).variadic(),
            ],
        );
        assert_eq!(signature.required_argument_count(), 1);
        assert!(signature.is_variadic());
    }

    #[test]
    fn variant_names_follow_union_naming() {
        let union = IdlType::union(vec![
            IdlType::sequence(IdlType::long()),
            IdlType::dom_string().nullable(),
        ]);
        assert_eq!(union.variant_name(), "LongSequenceOrStringOrNull");
    }

    #[test]
    fn validation_rejects_required_after_optional() {
        let mut definitions = definitions();
        definitions.add_interface(Interface {
            name: "Bad".to_owned(),
            operations: vec![Operation {
                name: "f".to_owned(),
                signatures: vec![Signature::new(
                    IdlType::undefined(),
                    vec![
                        Argument::new("a", IdlType::long()).optional(),
                        Argument::new("b", IdlType::long()),
                    ],
                )],
                is_static: false,
                flags: MemberFlags::empty(),
                location: Location::new("Bad.webidl", 3),
            }],
            ..Default::default()
        });
        assert!(matches!(
            definitions.validate(),
            Err(Error::RequiredAfterOptional { .. })
        ));
    }
}
