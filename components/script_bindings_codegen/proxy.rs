/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Proxy traps for legacy platform objects, the interfaces with indexed or
//! named properties.
//!
//! [`TrapPlan`] describes, per trap, which stages run and in which order. The
//! emitter renders it and the `evaluate`-style methods replay it against an
//! [`ObjectState`], so that the trap semantics can be checked directly.

use crate::Context;
use crate::call::process_arg;
use crate::conversions::{ConversionContext, instantiate_conversion, type_to_native};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::fragment::{Fragment, fill};
use crate::idl::{Argument, Interface, InterfaceFlags, SpecialOperation};

/// A property key as seen by a trap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropertyKey {
    Index(u32),
    Name(String),
    Symbol,
}

/// The properties a platform object currently exposes.
#[derive(Clone, Debug, Default)]
pub struct ObjectState {
    /// Supported indices are `0..length`.
    pub length: u32,
    /// Supported property names, in order.
    pub names: Vec<String>,
    /// Own properties of the expando object.
    pub expandos: Vec<String>,
    /// Properties found on the prototype chain.
    pub prototype: Vec<String>,
}

/// Where `getOwnPropertyDescriptor` finds a property.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lookup {
    Indexed { writable: bool },
    Named { writable: bool, enumerable: bool },
    Expando,
    Absent,
}

/// What `defineProperty` does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Definition {
    IndexedSetter,
    NamedSetter,
    /// Defining fails with the given error.
    Failed(DefineFailure),
    /// Defined on the expando object.
    Expando,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DefineFailure {
    NoIndexedSetter,
    NoNamedSetter,
}

impl DefineFailure {
    /// The `ObjectOpResult` method reporting the failure.
    pub fn op_result(self) -> &'static str {
        match self {
            DefineFailure::NoIndexedSetter => "failNoIndexedSetter",
            DefineFailure::NoNamedSetter => "failNoNamedSetter",
        }
    }
}

/// One step of the `delete` trap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deletion {
    NamedDeleter,
    /// `proxyhandler::delete`, which removes the property from the expando
    /// object.
    Expando,
}

/// Where the `get` trap takes the value from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GetSource {
    Indexed,
    Expando,
    Prototype,
    Named,
    Undefined,
}

/// The stages of every trap of one interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrapPlan {
    pub indexed_getter: bool,
    pub indexed_setter: bool,
    pub named_getter: bool,
    pub named_setter: bool,
    pub named_deleter: bool,
    /// `[LegacyOverrideBuiltIns]`: named properties shadow the prototype.
    pub override_builtins: bool,
    /// `[LegacyUnenumerableNamedProperties]`
    pub unenumerable_named: bool,
    /// Every trap starts with a same-origin check.
    pub cross_origin: bool,
}

impl TrapPlan {
    pub fn new(interface: &Interface, descriptor: &Descriptor) -> Result<TrapPlan> {
        if interface.named_deleter.is_some() && interface.has_unforgeable_members() {
            return Err(Error::DeleterOnUnforgeable {
                interface: interface.name.clone(),
                location: interface.location.clone(),
            });
        }
        Ok(TrapPlan {
            indexed_getter: interface.indexed_getter.is_some(),
            indexed_setter: interface.indexed_setter.is_some(),
            named_getter: interface.named_getter.is_some(),
            named_setter: interface.named_setter.is_some(),
            named_deleter: interface.named_deleter.is_some(),
            override_builtins: descriptor.override_builtins,
            unenumerable_named: interface
                .flags
                .contains(InterfaceFlags::LEGACY_UNENUMERABLE_NAMED_PROPERTIES),
            cross_origin: interface.is_maybe_cross_origin(),
        })
    }

    /// The key as a property name, if named properties see it at all. Array
    /// indices belong to the indexed stage when there is one.
    fn name<'k>(&self, key: &'k PropertyKey) -> Option<std::borrow::Cow<'k, str>> {
        match key {
            PropertyKey::Name(name) => Some(name.as_str().into()),
            PropertyKey::Index(index) if !self.indexed_getter => Some(index.to_string().into()),
            _ => None,
        }
    }

    fn named_visible(&self, name: &str, state: &ObjectState) -> bool {
        self.named_getter &&
            state.names.iter().any(|supported| supported == name) &&
            (self.override_builtins || !state.prototype.iter().any(|shadow| shadow == name))
    }

    fn expando(key: &PropertyKey, state: &ObjectState) -> bool {
        match key {
            PropertyKey::Index(index) => state.expandos.contains(&index.to_string()),
            PropertyKey::Name(name) => state.expandos.contains(name),
            PropertyKey::Symbol => false,
        }
    }

    pub fn get_own_property(&self, key: &PropertyKey, state: &ObjectState) -> Lookup {
        if let (PropertyKey::Index(index), true) = (key, self.indexed_getter) {
            if *index < state.length {
                return Lookup::Indexed {
                    writable: self.indexed_setter,
                };
            }
        }
        if let Some(name) = self.name(key) {
            if self.named_visible(&name, state) {
                return Lookup::Named {
                    writable: self.named_setter,
                    enumerable: !self.unenumerable_named,
                };
            }
        }
        if Self::expando(key, state) {
            return Lookup::Expando;
        }
        Lookup::Absent
    }

    pub fn has_own(&self, key: &PropertyKey, state: &ObjectState) -> bool {
        if let (PropertyKey::Index(index), true) = (key, self.indexed_getter) {
            return *index < state.length;
        }
        self.get_own_property(key, state) != Lookup::Absent
    }

    pub fn define_property(&self, key: &PropertyKey, state: &ObjectState) -> Definition {
        if let (PropertyKey::Index(_), true) = (key, self.indexed_getter) {
            return if self.indexed_setter {
                Definition::IndexedSetter
            } else {
                Definition::Failed(DefineFailure::NoIndexedSetter)
            };
        }
        if let Some(name) = self.name(key) {
            if self.named_setter {
                return Definition::NamedSetter;
            }
            if self.named_getter && state.names.iter().any(|supported| *supported == *name) {
                return Definition::Failed(DefineFailure::NoNamedSetter);
            }
        }
        Definition::Expando
    }

    /// The steps `delete` runs, in order. The named deleter never ends the
    /// trap.
    pub fn delete(&self, key: &PropertyKey) -> Vec<Deletion> {
        let mut steps = Vec::with_capacity(2);
        if self.named_deleter && self.name(key).is_some() {
            steps.push(Deletion::NamedDeleter);
        }
        steps.push(Deletion::Expando);
        steps
    }

    pub fn get(&self, key: &PropertyKey, state: &ObjectState) -> GetSource {
        if let (PropertyKey::Index(index), true) = (key, self.indexed_getter) {
            // An unsupported index is not forwarded to the expando object.
            if *index < state.length {
                return GetSource::Indexed;
            }
        } else if Self::expando(key, state) {
            return GetSource::Expando;
        }
        let named = self
            .name(key)
            .is_some_and(|name| self.named_getter && state.names.iter().any(|n| *n == *name));
        if named && self.override_builtins {
            return GetSource::Named;
        }
        let on_prototype = match key {
            PropertyKey::Index(index) => state.prototype.contains(&index.to_string()),
            PropertyKey::Name(name) => state.prototype.contains(name),
            PropertyKey::Symbol => false,
        };
        if on_prototype {
            return GetSource::Prototype;
        }
        if named {
            return GetSource::Named;
        }
        GetSource::Undefined
    }

    /// `ownPropertyKeys`: indices, then names, then expandos.
    pub fn own_property_keys(&self, state: &ObjectState) -> Vec<String> {
        let mut keys = Vec::new();
        if self.indexed_getter {
            keys.extend((0..state.length).map(|index| index.to_string()));
        }
        if self.named_getter {
            keys.extend(state.names.iter().cloned());
        }
        keys.extend(state.expandos.iter().cloned());
        keys
    }

    /// `getOwnEnumerablePropertyKeys`, which skips unenumerable names.
    pub fn own_enumerable_property_keys(&self, state: &ObjectState) -> Vec<String> {
        let mut keys = Vec::new();
        if self.indexed_getter {
            keys.extend((0..state.length).map(|index| index.to_string()));
        }
        if self.named_getter && !self.unenumerable_named {
            keys.extend(state.names.iter().cloned());
        }
        keys.extend(state.expandos.iter().cloned());
        keys
    }
}

/// Emits the traps and the `ProxyTraps` table of a proxy-backed interface.
pub struct ProxyGenerator<'a> {
    ctx: Context<'a>,
    interface: &'a Interface,
    descriptor: &'a Descriptor,
    plan: TrapPlan,
}

impl<'a> ProxyGenerator<'a> {
    pub fn new(
        ctx: Context<'a>,
        interface: &'a Interface,
        descriptor: &'a Descriptor,
    ) -> Result<ProxyGenerator<'a>> {
        Ok(ProxyGenerator {
            ctx,
            interface,
            descriptor,
            plan: TrapPlan::new(interface, descriptor)?,
        })
    }

    pub fn plan(&self) -> &TrapPlan {
        &self.plan
    }

    /// Calls a special operation, turning a thrown error into a pending
    /// exception.
    fn special_call(&self, special: &SpecialOperation, method: &str, arguments: &str) -> Result<String> {
        let policy = self.descriptor.member_policy(method, special.flags);
        let mut arguments = arguments.to_owned();
        if policy.can_gc {
            arguments.push_str(", CanGc::note()");
        }
        let call = format!("this.{method}({arguments})");
        if !policy.throws {
            return Ok(format!("let result = {call};"));
        }
        fill(
            "
            let result = match ${call} {
                Ok(result) => result,
                Err(e) => {
                    let global = GlobalScope::from_context(*cx, InRealm::Already(&AlreadyInRealm::assert_for_cx(cx)));
                    throw_dom_exception(cx, &global, e, CanGc::note());
                    return false;
                },
            };
            ",
            &[("call", &call)],
        )
        .map(|code| code.trim_end().to_owned())
    }

    /// Converts the descriptor's value for a setter and calls it.
    fn setter_call(&self, special: &SpecialOperation, method: &str, key: &str) -> Result<Fragment> {
        let ty = special.value_type();
        let cc = ConversionContext::new(
            format!("Value being assigned to {}", self.interface.name),
            &special.location,
        );
        let info = type_to_native(self.ctx, ty, &cc)?;
        let argument = Argument::new("value", ty.clone());
        Ok(Fragment::lines([
            Fragment::text("rooted!(in(*cx) let value = (*desc.ptr).value_);"),
            instantiate_conversion(&info, "value.handle()", "arg1"),
            Fragment::text(self.special_call(
                special,
                method,
                &format!("{key}, {}", process_arg(&argument, info.rooting, 1)),
            )?),
        ]))
    }

    fn unwrap_this() -> Fragment {
        Fragment::lines([
            Fragment::text("let this = UnwrapProxy(proxy);"),
            Fragment::text("let this = &*this;"),
        ])
    }

    /// Prefix of every trap: the cross-origin path, then entering the realm.
    fn origin_check(&self, cross_origin: &str) -> Fragment {
        if !self.plan.cross_origin {
            return Fragment::empty();
        }
        Fragment::lines([
            Fragment::if_then(
                "!proxyhandler::is_platform_object_same_origin(cx, proxy)",
                Fragment::text(cross_origin),
            ),
            Fragment::text("// Safe to enter the Realm of proxy now."),
            Fragment::text("let _ac = JSAutoRealm::new(*cx, proxy.get());"),
        ])
    }

    /// Whether named properties apply to `id`, with the prototype shadowing
    /// check unless built-ins are overridden.
    fn named_condition(&self) -> String {
        if self.plan.indexed_getter {
            "index.is_none() && ((*id.ptr).is_string() || (*id.ptr).is_int())".to_owned()
        } else {
            "(*id.ptr).is_string() || (*id.ptr).is_int()".to_owned()
        }
    }

    fn named_guarded(&self, body: Fragment) -> Fragment {
        let lookup = Fragment::block(
            "if let Some(name) = jsid_to_string(*cx, Handle::from_raw(id)) ",
            Fragment::lines([Self::unwrap_this(), body]),
            "",
        );
        let guarded = if self.plan.override_builtins {
            lookup
        } else {
            Fragment::lines([
                Fragment::text("let mut has_on_proto = false;"),
                Fragment::if_then(
                    "!has_property_on_prototype(*cx, Handle::from_raw(proxy), Handle::from_raw(id), &mut has_on_proto)",
                    Fragment::text("return false;"),
                ),
                Fragment::if_then("!has_on_proto", lookup),
            ])
        };
        Fragment::if_then(&self.named_condition(), guarded)
    }

    fn expando_lookup(&self, found: &str) -> Fragment {
        Fragment::lines([
            Fragment::text("rooted!(in(*cx) let mut expando = ptr::null_mut::<JSObject>());"),
            Fragment::text("get_expando_object(proxy, expando.handle_mut());"),
            Fragment::if_then("!expando.is_null()", Fragment::text(found)),
        ])
    }

    fn get_own_property_descriptor(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "if !proxyhandler::cross_origin_get_own_property_helper(cx, proxy, CROSS_ORIGIN_PROPERTIES.get(), id, desc, &mut *is_none) {\n    return false;\n}\nif *is_none {\n    return proxyhandler::cross_origin_property_fallback(cx, proxy, id, desc, &mut *is_none);\n}\nreturn true;",
        )]);
        body.push(Fragment::text("let index = get_array_index_from_id(Handle::from_raw(id));"));
        if let Some(getter) = &self.interface.indexed_getter {
            let attrs = if self.plan.indexed_setter {
                "JSPROP_ENUMERATE"
            } else {
                "JSPROP_ENUMERATE | JSPROP_READONLY"
            };
            body.push(Fragment::if_then(
                "let Some(index) = index",
                Fragment::lines([
                    Self::unwrap_this(),
                    Fragment::text(self.special_call(getter, "IndexedGetter", "index")?),
                    describe_result(attrs),
                ]),
            ));
        }
        if let Some(getter) = &self.interface.named_getter {
            let mut attrs = Vec::new();
            if !self.plan.unenumerable_named {
                attrs.push("JSPROP_ENUMERATE");
            }
            if !self.plan.named_setter {
                attrs.push("JSPROP_READONLY");
            }
            let attrs = if attrs.is_empty() {
                "0".to_owned()
            } else {
                attrs.join(" | ")
            };
            body.push(self.named_guarded(Fragment::lines([
                Fragment::text(self.special_call(getter, "NamedGetter", "name")?),
                describe_result(&attrs),
            ])));
        }
        body.push(self.expando_lookup(
            "if !JS_GetOwnPropertyDescriptorById(*cx, expando.handle().into(), id, desc, is_none) {\n    return false;\n}\nif !*is_none {\n    // Pretend the property lives on the wrapper.\n    return true;\n}",
        ));
        body.push(Fragment::text("*is_none = true;\ntrue"));
        self.trap(
            "getOwnPropertyDescriptor",
            "id: RawHandleId,\ndesc: RawMutableHandle<PropertyDescriptor>,\nis_none: *mut bool,",
            body,
        )
    }

    fn define_property(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "return proxyhandler::report_cross_origin_denial(cx, id, \"define\");",
        )]);
        body.push(Fragment::text("let index = get_array_index_from_id(Handle::from_raw(id));"));
        if let Some(setter) = &self.interface.indexed_setter {
            body.push(Fragment::if_then(
                "let Some(index) = index",
                Fragment::lines([
                    Self::unwrap_this(),
                    self.setter_call(setter, "IndexedSetter", "index")?,
                    Fragment::text("return (*opresult).succeed();"),
                ]),
            ));
        } else if self.plan.indexed_getter {
            body.push(Fragment::if_then(
                "index.is_some()",
                Fragment::text(format!(
                    "return (*opresult).{}();",
                    DefineFailure::NoIndexedSetter.op_result()
                )),
            ));
        }
        let name_lookup = |inner: Fragment| {
            Fragment::if_then(
                &self.named_condition(),
                Fragment::block(
                    "if let Some(name) = jsid_to_string(*cx, Handle::from_raw(id)) ",
                    Fragment::lines([Self::unwrap_this(), inner]),
                    "",
                ),
            )
        };
        if let Some(setter) = &self.interface.named_setter {
            body.push(name_lookup(Fragment::lines([
                self.setter_call(setter, "NamedSetter", "name")?,
                Fragment::text("return (*opresult).succeed();"),
            ])));
        } else if let Some(getter) = &self.interface.named_getter {
            body.push(name_lookup(Fragment::lines([
                Fragment::text(self.special_call(getter, "NamedGetter", "name")?),
                Fragment::if_then(
                    "result.is_some()",
                    Fragment::text(format!(
                        "return (*opresult).{}();",
                        DefineFailure::NoNamedSetter.op_result()
                    )),
                ),
            ])));
        }
        body.push(Fragment::text(
            "proxyhandler::define_property(*cx, proxy, id, desc, opresult)",
        ));
        self.trap(
            "defineProperty",
            "id: RawHandleId,\ndesc: RawHandle<PropertyDescriptor>,\nopresult: *mut ObjectOpResult,",
            body,
        )
    }

    fn delete(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "return proxyhandler::report_cross_origin_denial(cx, id, \"delete\");",
        )]);
        if let Some(deleter) = &self.interface.named_deleter {
            if self.plan.indexed_getter {
                body.push(Fragment::text("let index = get_array_index_from_id(Handle::from_raw(id));"));
            }
            body.push(Fragment::if_then(
                &self.named_condition(),
                Fragment::block(
                    "if let Some(name) = jsid_to_string(*cx, Handle::from_raw(id)) ",
                    Fragment::lines([
                        Self::unwrap_this(),
                        Fragment::text(self.special_call(deleter, "NamedDeleter", "name")?),
                    ]),
                    "",
                ),
            ));
        }
        body.push(Fragment::text("proxyhandler::delete(*cx, proxy, id, res)"));
        self.trap("delete", "id: RawHandleId,\nres: *mut ObjectOpResult,", body)
    }

    fn key_listing(&self, include_names: bool, flags: &str) -> Fragment {
        let mut body = Fragment::lines([Fragment::text("let unwrapped_proxy = UnwrapProxy(proxy);")]);
        if self.plan.indexed_getter {
            body.push(Fragment::block(
                "for i in 0..(*unwrapped_proxy).Length() ",
                Fragment::text(
                    "rooted!(in(*cx) let mut rooted_jsid: jsid);\nint_to_jsid(i as i32, rooted_jsid.handle_mut());\nAppendToIdVector(props, rooted_jsid.handle());",
                ),
                "",
            ));
        }
        if include_names && self.plan.named_getter {
            body.push(Fragment::block(
                "for name in (*unwrapped_proxy).SupportedPropertyNames() ",
                Fragment::text(
                    "let cstring = CString::new(String::from(name)).unwrap();\nlet jsstring = JS_AtomizeAndPinString(*cx, cstring.as_ptr());\nrooted!(in(*cx) let rooted = jsstring);\nrooted!(in(*cx) let mut rooted_jsid: jsid);\nRUST_INTERNED_STRING_TO_JSID(*cx, rooted.handle().get(), rooted_jsid.handle_mut());\nAppendToIdVector(props, rooted_jsid.handle());",
                ),
                "",
            ));
        }
        body.push(Fragment::text(
            "rooted!(in(*cx) let mut expando = ptr::null_mut::<JSObject>());\nget_expando_object(proxy, expando.handle_mut());",
        ));
        body.push(Fragment::if_then(
            &format!("!expando.is_null() &&\n    !GetPropertyKeys(*cx, expando.handle(), {flags}, props)"),
            Fragment::text("return false;"),
        ));
        body.push(Fragment::text("true"));
        body
    }

    fn own_property_keys(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "return proxyhandler::cross_origin_own_property_keys(cx, proxy, CROSS_ORIGIN_PROPERTIES.get(), props);",
        )]);
        body.push(self.key_listing(true, "JSITER_OWNONLY | JSITER_HIDDEN | JSITER_SYMBOLS"));
        self.trap("own_property_keys", "props: RawMutableHandleIdVector,", body)
    }

    fn own_enumerable_property_keys(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "// Cross-origin objects have no enumerable properties.\nreturn true;",
        )]);
        body.push(self.key_listing(!self.plan.unenumerable_named, "JSITER_OWNONLY"));
        self.trap("getOwnEnumerablePropertyKeys", "props: RawMutableHandleIdVector,", body)
    }

    fn has_own(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "return proxyhandler::cross_origin_has_own(cx, proxy, CROSS_ORIGIN_PROPERTIES.get(), id, bp);",
        )]);
        body.push(Fragment::text("let index = get_array_index_from_id(Handle::from_raw(id));"));
        if let Some(getter) = &self.interface.indexed_getter {
            body.push(Fragment::if_then(
                "let Some(index) = index",
                Fragment::lines([
                    Self::unwrap_this(),
                    Fragment::text(self.special_call(getter, "IndexedGetter", "index")?),
                    Fragment::text("*bp = result.is_some();"),
                    Fragment::text("return true;"),
                ]),
            ));
        }
        if let Some(getter) = &self.interface.named_getter {
            body.push(self.named_guarded(Fragment::lines([
                Fragment::text(self.special_call(getter, "NamedGetter", "name")?),
                Fragment::text("*bp = result.is_some();"),
                Fragment::if_then("*bp", Fragment::text("return true;")),
            ])));
        }
        body.push(self.expando_lookup(
            "let ok = JS_HasPropertyById(*cx, expando.handle().into(), id, bp);\nif !ok || *bp {\n    return ok;\n}",
        ));
        body.push(Fragment::text("*bp = false;\ntrue"));
        self.trap("hasOwn", "id: RawHandleId,\nbp: *mut bool,", body)
    }

    fn get(&self) -> Result<String> {
        let mut body = Fragment::lines([self.origin_check(
            "return proxyhandler::cross_origin_get(cx, proxy, receiver, id, vp);",
        )]);
        body.push(Fragment::text(
            "let proxy_lt = Handle::from_raw(proxy);\nlet vp_lt = MutableHandle::from_raw(vp);\nlet id_lt = Handle::from_raw(id);\nlet receiver_lt = Handle::from_raw(receiver);",
        ));
        let expando = Fragment::lines([
            Fragment::text("rooted!(in(*cx) let mut expando = ptr::null_mut::<JSObject>());"),
            Fragment::text("get_expando_object(proxy, expando.handle_mut());"),
            Fragment::if_then(
                "!expando.is_null()",
                Fragment::text(
                    "let mut has_prop = false;\nif !JS_HasPropertyById(*cx, expando.handle().into(), id, &mut has_prop) {\n    return false;\n}\nif has_prop {\n    return JS_ForwardGetPropertyTo(*cx, expando.handle().into(), id, receiver, vp);\n}",
                ),
            ),
        ]);
        body.push(Fragment::text("let index = get_array_index_from_id(id_lt);"));
        match &self.interface.indexed_getter {
            Some(getter) => body.push(Fragment::if_else(
                "let Some(index) = index",
                Fragment::lines([
                    Self::unwrap_this(),
                    Fragment::text(self.special_call(getter, "IndexedGetter", "index")?),
                    Fragment::if_then(
                        "let Some(result) = result",
                        Fragment::text("result.to_jsval(*cx, vp_lt);\nreturn true;"),
                    ),
                    Fragment::text("// An unsupported index is not forwarded to the expando object."),
                ]),
                expando,
            )),
            None => body.push(expando),
        }

        let named = match &self.interface.named_getter {
            Some(getter) => Fragment::if_then(
                "id_lt.is_string()",
                Fragment::block(
                    "if let Some(name) = jsid_to_string(*cx, id_lt) ",
                    Fragment::lines([
                        Self::unwrap_this(),
                        Fragment::text(self.special_call(getter, "NamedGetter", "name")?),
                        Fragment::if_then(
                            "let Some(result) = result",
                            Fragment::text("result.to_jsval(*cx, vp_lt);\nreturn true;"),
                        ),
                    ]),
                    "",
                ),
            ),
            None => Fragment::empty(),
        };
        let prototype = Fragment::lines([
            Fragment::text("let mut found = false;"),
            Fragment::if_then(
                "!get_property_on_prototype(*cx, proxy_lt, receiver_lt, id_lt, &mut found, vp_lt)",
                Fragment::text("return false;"),
            ),
            Fragment::if_then("found", Fragment::text("return true;")),
        ]);
        if self.plan.override_builtins {
            body.push(named);
            body.push(prototype);
        } else {
            body.push(prototype);
            body.push(named);
        }
        body.push(Fragment::text("vp.set(UndefinedValue());\ntrue"));
        self.trap(
            "get",
            "receiver: RawHandleValue,\nid: RawHandleId,\nvp: RawMutableHandleValue,",
            body,
        )
    }

    fn class_name(&self) -> Result<String> {
        fill(
            "
            unsafe extern \"C\" fn className(_cx: *mut RawJSContext, _proxy: RawHandleObject) -> *const libc::c_char {
                c${name}.as_ptr()
            }
            ",
            &[("name", &format!("{:?}", self.interface.name))],
        )
    }

    fn trap(&self, name: &str, parameters: &str, body: Fragment) -> Result<String> {
        fill(
            "
            unsafe extern \"C\" fn ${name}(
                cx: *mut RawJSContext,
                proxy: RawHandleObject,
                $*{parameters}
            ) -> bool {
                let cx = SafeJSContext::from_ptr(cx);
                $*{body}
            }
            ",
            &[("name", name), ("parameters", parameters), ("body", &body.render())],
        )
    }

    fn traps_table(&self) -> Result<String> {
        let (get_prototype, set, set_prototype) = if self.plan.cross_origin {
            (
                "Some(proxyhandler::maybe_cross_origin_get_prototype_if_ordinary_rawcx)",
                "Some(proxyhandler::maybe_cross_origin_set_rawcx)",
                "Some(proxyhandler::maybe_cross_origin_set_prototype_rawcx)",
            )
        } else {
            ("Some(proxyhandler::get_prototype_if_ordinary)", "None", "None")
        };
        fill(
            "
            pub(crate) static PROXY_TRAPS: ProxyTraps = ProxyTraps {
                enter: None,
                getOwnPropertyDescriptor: Some(getOwnPropertyDescriptor),
                defineProperty: Some(defineProperty),
                ownPropertyKeys: Some(own_property_keys),
                delete_: Some(delete),
                enumerate: None,
                getPrototypeIfOrdinary: ${get_prototype},
                getPrototype: None,
                setPrototype: ${set_prototype},
                setImmutablePrototype: None,
                preventExtensions: Some(proxyhandler::prevent_extensions),
                isExtensible: Some(proxyhandler::is_extensible),
                has: None,
                get: Some(get),
                set: ${set},
                call: None,
                construct: None,
                hasOwn: Some(hasOwn),
                getOwnEnumerablePropertyKeys: Some(getOwnEnumerablePropertyKeys),
                nativeCall: None,
                objectClassIs: None,
                className: Some(className),
                fun_toString: None,
                boxedValue_unbox: None,
                defaultValue: None,
                trace: Some(_trace),
                finalize: Some(_finalize),
                objectMoved: None,
                isCallable: None,
                isConstructor: None,
            };
            ",
            &[
                ("get_prototype", get_prototype),
                ("set", set),
                ("set_prototype", set_prototype),
            ],
        )
    }

    pub fn generate(&self) -> Result<String> {
        debug!("generating proxy traps for {}", self.interface.name);
        trace!("{}: {:?}", self.interface.name, self.plan);
        let unwrap = fill(
            "
            unsafe fn UnwrapProxy(obj: RawHandleObject) -> *const ${native} {
                let mut slot = UndefinedValue();
                GetProxyReservedSlot(obj.get(), 0, &mut slot);
                slot.to_private() as *const ${native}
            }
            ",
            &[("native", &self.descriptor.native_type)],
        )?;
        let traps = [
            unwrap,
            self.get_own_property_descriptor()?,
            self.define_property()?,
            self.delete()?,
            self.own_property_keys()?,
            self.own_enumerable_property_keys()?,
            self.has_own()?,
            self.get()?,
            self.class_name()?,
            self.traps_table()?,
        ];
        Ok(traps.join("\n"))
    }
}

/// Writes `result`, if any, into the property descriptor.
fn describe_result(attrs: &str) -> Fragment {
    Fragment::if_then(
        "let Some(result) = result",
        Fragment::text(format!(
            "rooted!(in(*cx) let mut result_root = UndefinedValue());\nresult.to_jsval(*cx, result_root.handle_mut());\nset_property_descriptor(\n    MutableHandle::from_raw(desc),\n    result_root.handle(),\n    ({attrs}) as u32,\n    &mut *is_none,\n);\nreturn true;"
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BindingsGenerator;
    use crate::config::CodegenConfig;
    use crate::idl::{Definitions, IdlType, MemberFlags, Operation, Signature};

    fn getter(ty: IdlType, key: IdlType) -> Option<SpecialOperation> {
        Some(SpecialOperation {
            signature: Signature::new(ty, vec![Argument::new("key", key)]),
            flags: MemberFlags::empty(),
            location: Default::default(),
        })
    }

    fn collection() -> Interface {
        Interface {
            name: "HTMLCollection".to_owned(),
            indexed_getter: getter(IdlType::interface("Element").nullable(), IdlType::unsigned_long()),
            named_getter: getter(IdlType::interface("Element").nullable(), IdlType::dom_string()),
            ..Default::default()
        }
    }

    fn plan(interface: &Interface) -> TrapPlan {
        TrapPlan::new(interface, &Descriptor::new(interface, None)).unwrap()
    }

    fn storage() -> Interface {
        Interface {
            name: "Storage".to_owned(),
            named_getter: getter(IdlType::dom_string().nullable(), IdlType::dom_string()),
            named_deleter: getter(IdlType::undefined(), IdlType::dom_string()),
            ..Default::default()
        }
    }

    /// The rendered traps of `interface`.
    fn render(interface: Interface) -> String {
        let name = interface.name.clone();
        let mut definitions = Definitions::default();
        definitions.add_interface(Interface {
            name: "Element".to_owned(),
            ..Default::default()
        });
        definitions.add_interface(interface);
        let generator = BindingsGenerator::new(definitions, CodegenConfig::default()).unwrap();
        let ctx = generator.context();
        let interface = &ctx.definitions.interfaces[&name];
        let descriptor = ctx.descriptor(&name, &interface.location).unwrap();
        ProxyGenerator::new(ctx, interface, descriptor)
            .unwrap()
            .generate()
            .unwrap()
    }

    /// The text of one trap function.
    fn trap<'a>(code: &'a str, name: &str) -> &'a str {
        let header = format!("unsafe extern \"C\" fn {name}(");
        let start = code.find(&header).unwrap();
        let rest = &code[start + header.len()..];
        let end = rest
            .find("unsafe extern \"C\" fn ")
            .map_or(code.len(), |end| start + header.len() + end);
        &code[start..end]
    }

    /// Asserts that `parts` occur in `text` in the given order.
    fn assert_in_order(text: &str, parts: &[&str]) {
        let mut from = 0;
        for part in parts {
            match text[from..].find(part) {
                Some(offset) => from += offset + part.len(),
                None => panic!("{part:?} missing or out of order in:\n{text}"),
            }
        }
    }

    fn state() -> ObjectState {
        ObjectState {
            length: 2,
            names: vec!["a".to_owned(), "b".to_owned()],
            expandos: vec!["custom".to_owned()],
            prototype: vec!["item".to_owned()],
        }
    }

    #[test]
    fn indexed_getter_without_setter_rejects_definitions() {
        let plan = plan(&collection());
        let state = state();
        assert_eq!(
            plan.define_property(&PropertyKey::Index(0), &state),
            Definition::Failed(DefineFailure::NoIndexedSetter)
        );
        assert_eq!(
            plan.get_own_property(&PropertyKey::Index(0), &state),
            Lookup::Indexed { writable: false }
        );
        assert_eq!(plan.get_own_property(&PropertyKey::Index(5), &state), Lookup::Absent);
        assert!(!plan.has_own(&PropertyKey::Index(5), &state));
    }

    #[test]
    fn keys_are_indices_then_names_then_expandos() {
        let plan = plan(&collection());
        assert_eq!(plan.own_property_keys(&state()), ["0", "1", "a", "b", "custom"]);
    }

    #[test]
    fn unenumerable_names_are_still_own_keys() {
        let mut interface = collection();
        interface.flags |= InterfaceFlags::LEGACY_UNENUMERABLE_NAMED_PROPERTIES;
        let plan = plan(&interface);
        let state = state();
        assert_eq!(plan.own_property_keys(&state), ["0", "1", "a", "b", "custom"]);
        assert_eq!(plan.own_enumerable_property_keys(&state), ["0", "1", "custom"]);
        assert_eq!(
            plan.get_own_property(&PropertyKey::Name("a".to_owned()), &state),
            Lookup::Named {
                writable: false,
                enumerable: false
            }
        );
    }

    #[test]
    fn prototype_properties_shadow_names_unless_overridden() {
        let mut state = state();
        state.names.push("item".to_owned());
        let item = PropertyKey::Name("item".to_owned());

        let mut interface = collection();
        assert_eq!(plan(&interface).get_own_property(&item, &state), Lookup::Absent);
        assert_eq!(plan(&interface).get(&item, &state), GetSource::Prototype);

        interface.flags |= InterfaceFlags::LEGACY_OVERRIDE_BUILTINS;
        assert!(matches!(
            plan(&interface).get_own_property(&item, &state),
            Lookup::Named { .. }
        ));
        assert_eq!(plan(&interface).get(&item, &state), GetSource::Named);
    }

    #[test]
    fn named_definitions_fail_without_a_setter() {
        let plan = plan(&collection());
        let state = state();
        assert_eq!(
            plan.define_property(&PropertyKey::Name("a".to_owned()), &state),
            Definition::Failed(DefineFailure::NoNamedSetter)
        );
        assert_eq!(
            plan.define_property(&PropertyKey::Name("fresh".to_owned()), &state),
            Definition::Expando
        );
    }

    #[test]
    fn named_deleter_falls_through_to_the_expando_object() {
        let with_deleter = plan(&storage());
        assert_eq!(
            with_deleter.delete(&PropertyKey::Name("key".to_owned())),
            [Deletion::NamedDeleter, Deletion::Expando]
        );
        assert_eq!(with_deleter.delete(&PropertyKey::Symbol), [Deletion::Expando]);
        let without_deleter = plan(&collection());
        assert_eq!(without_deleter.delete(&PropertyKey::Index(0)), [Deletion::Expando]);

        let code = render(storage());
        let delete = trap(&code, "delete");
        assert_in_order(delete, &[
            "if (*id.ptr).is_string() || (*id.ptr).is_int() {",
            "let result = this.NamedDeleter(name);",
            "proxyhandler::delete(*cx, proxy, id, res)",
        ]);
        assert!(!delete.contains("succeed()"));
    }

    #[test]
    fn rendered_definitions_refuse_supported_properties_without_setters() {
        let code = render(collection());
        let define = trap(&code, "defineProperty");
        assert_in_order(define, &[
            "if index.is_some() {",
            "return (*opresult).failNoIndexedSetter();",
            "if index.is_none() && ((*id.ptr).is_string() || (*id.ptr).is_int()) {",
            "let result = this.NamedGetter(name);",
            "return (*opresult).failNoNamedSetter();",
            "proxyhandler::define_property(*cx, proxy, id, desc, opresult)",
        ]);
    }

    #[test]
    fn rendered_descriptors_follow_the_lookup_order() {
        let mut interface = collection();
        interface.flags |= InterfaceFlags::LEGACY_UNENUMERABLE_NAMED_PROPERTIES;
        let code = render(interface);
        let descriptor = trap(&code, "getOwnPropertyDescriptor");
        assert_in_order(descriptor, &[
            "let result = this.IndexedGetter(index);",
            "(JSPROP_ENUMERATE | JSPROP_READONLY) as u32",
            "has_property_on_prototype(",
            "let result = this.NamedGetter(name);",
            "(JSPROP_READONLY) as u32",
            "JS_GetOwnPropertyDescriptorById(",
            "*is_none = true;",
        ]);
    }

    #[test]
    fn rendered_get_consults_the_prototype_before_names() {
        let code = render(collection());
        assert_in_order(trap(&code, "get"), &[
            "let result = this.IndexedGetter(index);",
            "// An unsupported index is not forwarded to the expando object.",
            "JS_ForwardGetPropertyTo(",
            "get_property_on_prototype(",
            "let result = this.NamedGetter(name);",
            "vp.set(UndefinedValue());",
        ]);

        let mut interface = collection();
        interface.flags |= InterfaceFlags::LEGACY_OVERRIDE_BUILTINS;
        let code = render(interface);
        assert_in_order(trap(&code, "get"), &[
            "let result = this.NamedGetter(name);",
            "get_property_on_prototype(",
        ]);
    }

    #[test]
    fn rendered_key_listing_matches_the_plan() {
        let mut interface = collection();
        interface.flags |= InterfaceFlags::LEGACY_UNENUMERABLE_NAMED_PROPERTIES;
        let code = render(interface);
        assert_in_order(trap(&code, "own_property_keys"), &[
            "(*unwrapped_proxy).Length()",
            "(*unwrapped_proxy).SupportedPropertyNames()",
            "GetPropertyKeys(*cx, expando.handle(), JSITER_OWNONLY | JSITER_HIDDEN | JSITER_SYMBOLS, props)",
        ]);
        let enumerable = trap(&code, "getOwnEnumerablePropertyKeys");
        assert_in_order(enumerable, &[
            "(*unwrapped_proxy).Length()",
            "GetPropertyKeys(*cx, expando.handle(), JSITER_OWNONLY, props)",
        ]);
        assert!(!enumerable.contains("SupportedPropertyNames()"));
    }

    #[test]
    fn deleters_cannot_coexist_with_unforgeable_members() {
        let mut interface = collection();
        interface.named_deleter = getter(IdlType::undefined(), IdlType::dom_string());
        interface.operations.push(Operation {
            name: "item".to_owned(),
            signatures: vec![Signature::new(IdlType::undefined(), vec![])],
            is_static: false,
            flags: MemberFlags::UNFORGEABLE,
            location: Default::default(),
        });
        assert!(matches!(
            TrapPlan::new(&interface, &Descriptor::new(&interface, None)),
            Err(Error::DeleterOnUnforgeable { .. })
        ));
    }
}
