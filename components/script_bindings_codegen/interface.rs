/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The unit of one interface: JIT entry points for its operations and
//! attributes, their `JSJitInfo`, the member spec tables, the class hooks and,
//! for legacy platform objects, the proxy traps.

use crate::Context;
use crate::call::{CallSite, native_method_name, per_signature_call};
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::fragment::{Fragment, fill};
use crate::idl::{
    Argument, Attribute, IdlType, Interface, MemberFlags, Operation, PrimitiveType, Signature,
    TypeKind,
};
use crate::overload::OverloadRenderer;
use crate::proxy::ProxyGenerator;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EntryKind {
    Method,
    Getter,
    Setter,
    /// Static members are plain `JSNative`s.
    Static,
}

impl EntryKind {
    fn parameters(self) -> &'static str {
        match self {
            EntryKind::Method => {
                "cx: *mut RawJSContext,\n_obj: RawHandleObject,\nthis: *mut libc::c_void,\nargs: *const JSJitMethodCallArgs,"
            },
            EntryKind::Getter => {
                "cx: *mut RawJSContext,\n_obj: RawHandleObject,\nthis: *mut libc::c_void,\nargs: JSJitGetterCallArgs,"
            },
            EntryKind::Setter => {
                "cx: *mut RawJSContext,\n_obj: RawHandleObject,\nthis: *mut libc::c_void,\nargs: JSJitSetterCallArgs,"
            },
            EntryKind::Static => "cx: *mut RawJSContext,\nargc: libc::c_uint,\nvp: *mut JSVal,",
        }
    }
}

/// The `JSValueType` the JIT may assume for a member's result.
fn jit_return_type(ty: &IdlType) -> &'static str {
    if ty.nullable {
        return "JSVAL_TYPE_UNKNOWN";
    }
    match &ty.kind {
        TypeKind::Undefined => "JSVAL_TYPE_UNDEFINED",
        TypeKind::Primitive {
            primitive: PrimitiveType::Boolean,
        } => "JSVAL_TYPE_BOOLEAN",
        TypeKind::Primitive { primitive } => match primitive.integer_range() {
            Some((min, max)) if min >= i32::MIN as i128 && max <= i32::MAX as i128 => {
                "JSVAL_TYPE_INT32"
            },
            _ => "JSVAL_TYPE_DOUBLE",
        },
        TypeKind::String { .. } | TypeKind::Enum { .. } => "JSVAL_TYPE_STRING",
        TypeKind::Interface { .. } |
        TypeKind::Dictionary { .. } |
        TypeKind::Sequence { .. } |
        TypeKind::Record { .. } |
        TypeKind::Object |
        TypeKind::Promise { .. } |
        TypeKind::Callback { .. } => "JSVAL_TYPE_OBJECT",
        _ => "JSVAL_TYPE_UNKNOWN",
    }
}

/// `c"name".as_ptr()`
fn c_string(name: &str) -> String {
    format!("c{name:?}.as_ptr()")
}

pub struct InterfaceGenerator<'a> {
    ctx: Context<'a>,
    interface: &'a Interface,
    descriptor: &'a Descriptor,
    proxy: Option<ProxyGenerator<'a>>,
}

impl<'a> InterfaceGenerator<'a> {
    pub fn new(ctx: Context<'a>, interface: &'a Interface) -> Result<InterfaceGenerator<'a>> {
        let descriptor = ctx.descriptor(&interface.name, &interface.location)?;
        let proxy = if descriptor.proxy {
            Some(ProxyGenerator::new(ctx, interface, descriptor)?)
        } else {
            None
        };
        Ok(InterfaceGenerator {
            ctx,
            interface,
            descriptor,
            proxy,
        })
    }

    /// Number of ancestors, used for the DOM class checks in `JSJitInfo`.
    fn depth(&self) -> usize {
        let interfaces = &self.ctx.definitions.interfaces;
        let mut depth = 0;
        let mut current = self.interface.parent.as_deref();
        while let Some(parent) = current {
            depth += 1;
            if depth > interfaces.len() {
                break;
            }
            current = interfaces
                .get(parent)
                .and_then(|interface| interface.parent.as_deref());
        }
        depth
    }

    fn entry_point(&self, name: &str, kind: EntryKind, body: Fragment) -> Result<String> {
        let prologue = match kind {
            EntryKind::Static => {
                "let args = CallArgs::from_vp(vp, argc);\nlet cx = SafeJSContext::from_ptr(cx);"
                    .to_owned()
            },
            EntryKind::Method => format!(
                "let cx = SafeJSContext::from_ptr(cx);\nlet this = &*(this as *const {});\nlet args = &*args;\nlet argc = args.argc_;",
                self.descriptor.native_type
            ),
            EntryKind::Getter | EntryKind::Setter => format!(
                "let cx = SafeJSContext::from_ptr(cx);\nlet this = &*(this as *const {});",
                self.descriptor.native_type
            ),
        };
        fill(
            "
            unsafe extern \"C\" fn ${name}(
                $*{parameters}
            ) -> bool {
                let mut result = false;
                wrap_panic(&mut || result = (|| {
                    $*{prologue}
                    $*{body}
                })());
                result
            }
            ",
            &[
                ("name", name),
                ("parameters", kind.parameters()),
                ("prologue", &prologue),
                ("body", &body.render()),
            ],
        )
    }

    fn jit_info(
        &self,
        name: &str,
        op_type: &str,
        entry: &str,
        return_ty: &IdlType,
        infallible: bool,
    ) -> Result<String> {
        let field = op_type.to_ascii_lowercase();
        let protoid = format!("PrototypeList::ID::{} as u16", self.interface.name);
        let depth = self.depth().to_string();
        let bitfield = format!(
            "JSJitInfo_OpType::{op_type} as u8,\nJSJitInfo_AliasSet::AliasEverything as u8,\nJSValueType::{} as u8,\n{infallible},\nfalse,\nfalse,\nfalse,\nfalse,\nfalse,\n0,",
            jit_return_type(return_ty)
        );
        fill(
            "
            static ${name}: ThreadUnsafeOnceLock<JSJitInfo> = ThreadUnsafeOnceLock::new();

            fn init_${name}() {
                ${name}.set(JSJitInfo {
                    __bindgen_anon_1: JSJitInfo__bindgen_ty_1 {
                        ${field}: Some(${entry}),
                    },
                    __bindgen_anon_2: JSJitInfo__bindgen_ty_2 {
                        protoID: ${protoid},
                    },
                    __bindgen_anon_3: JSJitInfo__bindgen_ty_3 { depth: ${depth} },
                    _bitfield_align_1: [],
                    _bitfield_1: __BindgenBitfieldUnit::new(
                        new_jsjitinfo_bitfield_1!(
                            $*{bitfield}
                        )
                        .to_ne_bytes(),
                    ),
                });
            }
            ",
            &[
                ("name", name),
                ("field", &field),
                ("entry", entry),
                ("protoid", &protoid),
                ("depth", &depth),
                ("bitfield", &bitfield),
            ],
        )
    }

    fn method(&self, operation: &Operation, statics: &mut Vec<String>) -> Result<String> {
        let policy = self
            .descriptor
            .member_policy(&operation.name, operation.flags);
        let mut site = CallSite::new(
            self.ctx,
            self.descriptor,
            &operation.name,
            native_method_name(&operation.name),
            policy,
            &operation.location,
        );
        if operation.is_static {
            site = site.static_member();
        }
        let body = OverloadRenderer::new(&site, &operation.signatures).render()?;
        if operation.is_static {
            return self.entry_point(&operation.name, EntryKind::Static, body);
        }
        let info = format!("{}_methodinfo", operation.name);
        // Overloads may disagree on their return type.
        let return_ty = match operation.signatures.as_slice() {
            [signature] => signature.return_type.clone(),
            _ => IdlType::any(),
        };
        statics.push(format!("init_{info}();"));
        Ok([
            self.entry_point(&operation.name, EntryKind::Method, body)?,
            self.jit_info(&info, "Method", &operation.name, &return_ty, !policy.throws)?,
        ]
        .join("\n"))
    }

    fn getter(&self, attribute: &Attribute, statics: &mut Vec<String>) -> Result<String> {
        let policy = self
            .descriptor
            .member_policy(&attribute.name, attribute.flags);
        let mut site = CallSite::new(
            self.ctx,
            self.descriptor,
            &attribute.name,
            native_method_name(&attribute.name),
            policy,
            &attribute.location,
        );
        if attribute.is_static {
            site = site.static_member();
        }
        let body = per_signature_call(&site, &Signature::new(attribute.ty.clone(), vec![]), 0)?;
        let entry = format!("get_{}", attribute.name);
        if attribute.is_static {
            return self.entry_point(&entry, EntryKind::Static, body);
        }
        let info = format!("{}_getterinfo", attribute.name);
        statics.push(format!("init_{info}();"));
        Ok([
            self.entry_point(&entry, EntryKind::Getter, body)?,
            self.jit_info(&info, "Getter", &entry, &attribute.ty, !policy.throws)?,
        ]
        .join("\n"))
    }

    fn setter(&self, attribute: &Attribute, statics: &mut Vec<String>) -> Result<String> {
        let policy = self
            .descriptor
            .member_policy(&attribute.name, attribute.flags);
        let mut site = CallSite::new(
            self.ctx,
            self.descriptor,
            &attribute.name,
            format!("Set{}", native_method_name(&attribute.name)),
            policy,
            &attribute.location,
        )
        .setter();
        if attribute.is_static {
            site = site.static_member();
        }
        let signature = Signature::new(
            IdlType::undefined(),
            vec![Argument::new(&attribute.name, attribute.ty.clone())],
        );
        let body = per_signature_call(&site, &signature, 0)?;
        let entry = format!("set_{}", attribute.name);
        if attribute.is_static {
            return self.entry_point(&entry, EntryKind::Static, body);
        }
        let info = format!("{}_setterinfo", attribute.name);
        statics.push(format!("init_{info}();"));
        Ok([
            self.entry_point(&entry, EntryKind::Setter, body)?,
            self.jit_info(&info, "Setter", &entry, &IdlType::undefined(), !policy.throws)?,
        ]
        .join("\n"))
    }

    fn property_flags(flags: MemberFlags, readonly: bool) -> String {
        let mut names = vec!["JSPROP_ENUMERATE"];
        if flags.contains(MemberFlags::UNFORGEABLE) {
            names.push("JSPROP_PERMANENT");
            if readonly {
                names.push("JSPROP_READONLY");
            }
        }
        names.join(" | ")
    }

    fn function_spec(operation: &Operation) -> String {
        let nargs = operation
            .signatures
            .iter()
            .map(Signature::required_argument_count)
            .min()
            .unwrap_or(0);
        let call = if operation.is_static {
            format!("op: Some({}), info: ptr::null()", operation.name)
        } else {
            format!(
                "op: Some(generic_method::<false>), info: unsafe {{ {}_methodinfo.get() }}",
                operation.name
            )
        };
        format!(
            "JSFunctionSpec {{\n    name: JSPropertySpec_Name {{ string_: {} }},\n    call: JSNativeWrapper {{ {call} }},\n    nargs: {nargs},\n    flags: ({}) as u16,\n    selfHostedName: ptr::null(),\n}},",
            c_string(&operation.name),
            InterfaceGenerator::property_flags(operation.flags, true),
        )
    }

    fn property_spec(attribute: &Attribute, getter: bool, setter: bool) -> String {
        let accessor = |present: bool, prefix: &str, generic: &str, kind: &str| {
            if !present {
                return "JSNativeWrapper { op: None, info: ptr::null() }".to_owned();
            }
            if attribute.is_static {
                format!("JSNativeWrapper {{ op: Some({prefix}_{}), info: ptr::null() }}", attribute.name)
            } else {
                format!(
                    "JSNativeWrapper {{ op: Some({generic}), info: unsafe {{ {}_{kind}info.get() }} }}",
                    attribute.name
                )
            }
        };
        let getter = accessor(getter, "get", "generic_getter::<false>", "getter");
        let setter = accessor(setter, "set", "generic_setter", "setter");
        format!(
            "JSPropertySpec {{\n    name: JSPropertySpec_Name {{ string_: {} }},\n    attributes_: ({}) as u8,\n    kind_: JSPropertySpec_Kind::NativeAccessor,\n    u: JSPropertySpec_AccessorsOrValue {{\n        accessors: JSPropertySpec_AccessorsOrValue_Accessors {{\n            getter: JSPropertySpec_Accessor {{ native: {getter} }},\n            setter: JSPropertySpec_Accessor {{ native: {setter} }},\n        }},\n    }},\n}},",
            c_string(&attribute.name),
            InterfaceGenerator::property_flags(attribute.flags, attribute.readonly),
        )
    }

    /// A `ThreadUnsafeOnceLock` table of specs, terminated by `ZERO`.
    fn spec_table(name: &str, spec_type: &str, specs: Vec<String>) -> Result<Option<String>> {
        if specs.is_empty() {
            return Ok(None);
        }
        fill(
            "
            static ${name}: ThreadUnsafeOnceLock<&'static [${spec_type}]> = ThreadUnsafeOnceLock::new();

            fn init_${name}() {
                ${name}.set(Box::leak(Box::new([
                    $*{specs}
                    ${spec_type}::ZERO,
                ])));
            }
            ",
            &[("name", name), ("spec_type", spec_type), ("specs", &specs.join("\n"))],
        )
        .map(Some)
    }

    fn spec_tables(&self, statics: &mut Vec<String>) -> Result<Vec<String>> {
        let (static_operations, operations): (Vec<_>, Vec<_>) = self
            .interface
            .operations
            .iter()
            .partition(|operation| operation.is_static);
        let (static_attributes, attributes): (Vec<_>, Vec<_>) = self
            .interface
            .attributes
            .iter()
            .partition(|attribute| attribute.is_static);
        let attribute_specs = |attributes: Vec<&Attribute>| {
            attributes
                .into_iter()
                .map(|attribute| Self::property_spec(attribute, true, !attribute.readonly))
                .collect()
        };
        let function_specs = |operations: Vec<&Operation>| {
            operations.into_iter().map(Self::function_spec).collect()
        };

        let mut tables = vec![
            ("sMethods", "JSFunctionSpec", function_specs(operations)),
            ("sStaticMethods", "JSFunctionSpec", function_specs(static_operations)),
            ("sAttributes", "JSPropertySpec", attribute_specs(attributes)),
            ("sStaticAttributes", "JSPropertySpec", attribute_specs(static_attributes)),
        ];
        let cross_origin = self.interface.is_maybe_cross_origin();
        if cross_origin {
            let (attributes, operations) = self.interface.cross_origin_members();
            let attributes = attributes
                .into_iter()
                .map(|attribute| {
                    Self::property_spec(
                        attribute,
                        attribute.flags.contains(MemberFlags::CROSS_ORIGIN_READABLE),
                        attribute.flags.contains(MemberFlags::CROSS_ORIGIN_WRITABLE),
                    )
                })
                .collect();
            tables.push(("sCrossOriginAttributes", "JSPropertySpec", attributes));
            tables.push(("sCrossOriginMethods", "JSFunctionSpec", function_specs(operations)));
        }

        let mut code = Vec::new();
        for (name, spec_type, specs) in tables {
            let table = match Self::spec_table(name, spec_type, specs)? {
                Some(table) => table,
                // Both halves of the cross-origin allow-list always exist.
                None if name.starts_with("sCrossOrigin") => fill(
                    "
                    static ${name}: ThreadUnsafeOnceLock<&'static [${spec_type}]> = ThreadUnsafeOnceLock::new();

                    fn init_${name}() {
                        ${name}.set(&[${spec_type}::ZERO]);
                    }
                    ",
                    &[("name", name), ("spec_type", spec_type)],
                )?,
                None => continue,
            };
            statics.push(format!("init_{name}();"));
            code.push(table);
        }
        if cross_origin {
            code.push(
                "static CROSS_ORIGIN_PROPERTIES: ThreadUnsafeOnceLock<CrossOriginProperties> =\n    ThreadUnsafeOnceLock::new();\n\nfn init_cross_origin_properties() {\n    CROSS_ORIGIN_PROPERTIES.set(CrossOriginProperties {\n        attributes: unsafe { *sCrossOriginAttributes.get() },\n        methods: unsafe { *sCrossOriginMethods.get() },\n    });\n}\n"
                    .to_owned(),
            );
            statics.push("init_cross_origin_properties();".to_owned());
        }
        Ok(code)
    }

    fn class_hooks(&self) -> Result<String> {
        fill(
            "
            unsafe extern \"C\" fn _finalize(_cx: *mut GCContext, obj: *mut JSObject) {
                wrap_panic(&mut || {
                    let this = native_from_object_static::<${native}>(obj).unwrap();
                    finalize_common(this);
                })
            }

            unsafe extern \"C\" fn _trace(trc: *mut JSTracer, obj: *mut JSObject) {
                wrap_panic(&mut || {
                    let this = native_from_object_static::<${native}>(obj).unwrap();
                    if this.is_null() {
                        // GC during obj creation.
                        return;
                    }
                    (*this).trace(trc);
                })
            }
            ",
            &[("native", &self.descriptor.native_type)],
        )
    }

    pub fn generate(&self) -> Result<String> {
        debug!("generating interface {}", self.interface.name);
        let mut statics = Vec::new();
        let mut units = Vec::new();
        for operation in &self.interface.operations {
            units.push(self.method(operation, &mut statics)?);
        }
        for attribute in &self.interface.attributes {
            units.push(self.getter(attribute, &mut statics)?);
            if !attribute.readonly {
                units.push(self.setter(attribute, &mut statics)?);
            }
        }
        units.extend(self.spec_tables(&mut statics)?);
        units.push(self.class_hooks()?);
        if let Some(proxy) = &self.proxy {
            units.push(proxy.generate()?);
            units.push(
                "pub(crate) fn proxy_handler() -> *const libc::c_void {\n    unsafe { CreateProxyHandler(&PROXY_TRAPS, ptr::null()) }\n}\n"
                    .to_owned(),
            );
        }
        units.push(fill(
            "
            /// Fills the lazily initialised statics; must run before the
            /// interface objects are created.
            pub(crate) fn init_statics() {
                $*{statics}
            }
            ",
            &[("statics", &statics.join("\n"))],
        )?);
        Ok(units.join("\n"))
    }
}
