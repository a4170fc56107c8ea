/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Callback functions and callback interfaces: a wrapper around the script
//! object with one method per operation that native code can call.

use itertools::Itertools;

use crate::Context;
use crate::conversions::{
    ConversionContext, MemberKind, instantiate_conversion, native_to_type, return_type,
    type_to_native,
};
use crate::dictionary::member_field_name;
use crate::error::Result;
use crate::fragment::{Fragment, fill};
use crate::idl::{Argument, Callback, CallbackKind, IdlType, Signature, TypeKind};

pub struct CallbackGenerator<'a> {
    ctx: Context<'a>,
    callback: &'a Callback,
}

/// One callable operation of the callback.
struct CallbackMethod<'a> {
    /// The Rust method name.
    name: String,
    /// The property holding the function, for callback interfaces.
    property: Option<&'a str>,
    signature: &'a Signature,
}

impl<'a> CallbackGenerator<'a> {
    pub fn new(ctx: Context<'a>, callback: &'a Callback) -> CallbackGenerator<'a> {
        CallbackGenerator { ctx, callback }
    }

    fn methods(&self) -> Vec<CallbackMethod<'a>> {
        match self.callback.kind {
            CallbackKind::Function => self
                .callback
                .operations
                .first()
                .map(|operation| CallbackMethod {
                    name: "Call".to_owned(),
                    property: None,
                    signature: &operation.signature,
                })
                .into_iter()
                .collect(),
            CallbackKind::Interface => self
                .callback
                .operations
                .iter()
                .map(|operation| CallbackMethod {
                    name: crate::call::native_method_name(&operation.name),
                    property: Some(operation.name.as_str()),
                    signature: &operation.signature,
                })
                .collect(),
        }
    }

    /// The native type native code passes for `argument`.
    fn argument_type(&self, argument: &Argument) -> Result<String> {
        let ty = &argument.ty;
        let base = match &ty.kind {
            TypeKind::Interface { name } => {
                let native = &self.ctx.descriptor(name, &self.callback.location)?.native_type;
                if ty.nullable {
                    format!("Option<&{native}>")
                } else {
                    format!("&{native}")
                }
            },
            TypeKind::Any => "HandleValue".to_owned(),
            TypeKind::Object => "*mut JSObject".to_owned(),
            TypeKind::Dictionary { .. } if !ty.nullable => {
                format!("&{}", return_type(self.ctx, ty, false, &self.callback.location)?)
            },
            _ => return_type(self.ctx, ty, false, &self.callback.location)?.to_string(),
        };
        Ok(if argument.variadic {
            format!("Vec<{base}>")
        } else if argument.optional && argument.default.is_none() {
            format!("Option<{base}>")
        } else {
            base
        })
    }

    fn result_type(&self, ty: &IdlType) -> Result<String> {
        if ty.is_any() {
            return Ok("JSVal".to_owned());
        }
        Ok(return_type(self.ctx, ty, false, &self.callback.location)?.to_string())
    }

    /// Converts argument `index` into `argv`. Omitted trailing optional
    /// arguments shrink `argc` instead of passing undefined.
    fn argument_conversion(&self, argument: &Argument, index: usize) -> Result<String> {
        let name = member_field_name(&argument.name);
        let (value, slot) = if argument.variadic {
            (format!("{name}[idx]"), format!("{index} + idx"))
        } else {
            (name.clone(), index.to_string())
        };
        let store = fill(
            "
            {
                let arg = &mut argv[${slot}];
                *arg = Heap::default();
                arg.set(argv_root.get());
            }
            ",
            &[("slot", &slot)],
        )?;
        let conversion = native_to_type(
            &argument.ty,
            &value,
            "argv_root.handle_mut()",
            Some(Fragment::text(
                "rooted!(in(*cx) let mut argv_root = UndefinedValue());",
            )),
            store.trim_end(),
        )
        .render();

        if argument.variadic {
            return fill(
                "
                for idx in 0..${name}.len() {
                    $*{conversion}
                }
                ",
                &[("name", &name), ("conversion", &conversion)],
            );
        }
        if argument.optional && argument.default.is_none() {
            return fill(
                "
                if let Some(${name}) = ${name} {
                    $*{conversion}
                } else if argc == ${next} {
                    // The trailing argument was omitted.
                    argc -= 1;
                } else {
                    argv[${index}].set(UndefinedValue());
                }
                ",
                &[
                    ("name", &name),
                    ("conversion", &conversion),
                    ("next", &(index + 1).to_string()),
                    ("index", &index.to_string()),
                ],
            );
        }
        Ok(conversion + "\n")
    }

    fn method(&self, method: &CallbackMethod<'_>) -> Result<String> {
        let signature = method.signature;
        let arguments = &signature.arguments;
        let parameters = arguments
            .iter()
            .map(|argument| {
                Ok(format!(
                    "{}: {}",
                    member_field_name(&argument.name),
                    self.argument_type(argument)?
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let names = arguments
            .iter()
            .map(|argument| member_field_name(&argument.name))
            .collect::<Vec<_>>();
        let result_type = self.result_type(&signature.return_type)?;

        let fixed = if signature.is_variadic() {
            arguments.len() - 1
        } else {
            arguments.len()
        };
        let argc = match arguments.last() {
            Some(last) if last.variadic => {
                format!("{fixed} + {}.len()", member_field_name(&last.name))
            },
            _ => fixed.to_string(),
        };
        let conversions: String = arguments
            .iter()
            .enumerate()
            .rev()
            .map(|(index, argument)| self.argument_conversion(argument, index))
            .collect::<Result<Vec<_>>>()?
            .concat();

        let get_property = method.property.map(|property| {
            format!("self.parent.get_callable_property(cx, {property:?})?")
        });
        let (callable, this) = match (&get_property, self.callback.is_single_operation()) {
            (None, _) => (
                "rooted!(in(*cx) let callable = ObjectValue(self.callback()));".to_owned(),
                "aThisObj.get()",
            ),
            (Some(get_property), true) => (
                Fragment::lines([
                    Fragment::text("let isCallable = IsCallable(self.callback());"),
                    Fragment::text("rooted!(in(*cx) let callable ="),
                    Fragment::if_else(
                        "isCallable",
                        Fragment::text("ObjectValue(self.callback())"),
                        Fragment::text(get_property.as_str()),
                    )
                    .indented(),
                    Fragment::text(");"),
                ])
                .render(),
                "if isCallable { aThisObj.get() } else { self.callback() }",
            ),
            (Some(get_property), false) => (
                format!("rooted!(in(*cx) let callable = {get_property});"),
                "self.callback()",
            ),
        };

        let cc = ConversionContext::new(
            format!("Return value of {}", self.callback.name),
            &self.callback.location,
        )
        .member(MemberKind::CallbackReturn)
        .with_exception("return Err(JSFailed);");
        let info = type_to_native(self.ctx, &signature.return_type, &cc)?;
        let result = if info.decl_type.is_some() {
            Fragment::lines([
                instantiate_conversion(&info, "rval.handle()", "ret"),
                Fragment::text("Ok(ret)"),
            ])
        } else {
            Fragment::text("Ok(())")
        };

        let argument_list = names.iter().map(|name| format!("{name}, ")).join("");
        let parameter_list = parameters.iter().map(|parameter| format!("{parameter}, ")).join("");
        fill(
            "
            pub fn ${name}_<T: ThisReflector>(
                &self,
                thisObj: &T,
                ${parameter_list}aExceptionHandling: ExceptionHandling,
            ) -> Fallible<${result_type}> {
                let s = CallSetup::new(self, aExceptionHandling);
                rooted!(in(*s.get_context()) let mut thisObjJS = ptr::null_mut::<JSObject>());
                wrap_call_this_object(s.get_context(), thisObj, thisObjJS.handle_mut());
                if thisObjJS.is_null() {
                    return Err(JSFailed);
                }
                unsafe { self.${name}(s.get_context(), thisObjJS.handle(), ${argument_list}) }
            }

            pub fn ${name}__(
                &self,
                ${parameter_list}aExceptionHandling: ExceptionHandling,
            ) -> Fallible<${result_type}> {
                let s = CallSetup::new(self, aExceptionHandling);
                rooted!(in(*s.get_context()) let thisObjJS = ptr::null_mut::<JSObject>());
                unsafe { self.${name}(s.get_context(), thisObjJS.handle(), ${argument_list}) }
            }

            unsafe fn ${name}(
                &self,
                cx: SafeJSContext,
                aThisObj: HandleObject,
                ${parameter_list}
            ) -> Fallible<${result_type}> {
                rooted!(in(*cx) let mut rval = UndefinedValue());
                rooted_vec!(let mut argv);
                let mut argc = ${argc};
                argv.extend((0..argc).map(|_| Heap::default()));
                $*{conversions}
                $*{callable}
                rooted!(in(*cx) let rootedThis = ${this});
                let ok = JS_CallFunctionValue(
                    *cx,
                    rootedThis.handle(),
                    callable.handle(),
                    &HandleValueArray {
                        length_: argc as ::libc::size_t,
                        elements_: argv.as_ptr() as *const JSVal,
                    },
                    rval.handle_mut(),
                );
                maybe_resume_unwind();
                if !ok {
                    return Err(JSFailed);
                }
                $*{result}
            }
            ",
            &[
                ("name", &method.name),
                ("parameter_list", &parameter_list),
                ("argument_list", argument_list.trim_end_matches(", ")),
                ("result_type", &result_type),
                ("argc", &argc),
                ("conversions", &conversions),
                ("callable", &callable),
                ("this", this),
                ("result", &result.render()),
            ],
        )
    }

    pub fn generate(&self) -> Result<String> {
        let name = self.callback.name.as_str();
        debug!("generating callback {name}");
        let parent = match self.callback.kind {
            CallbackKind::Function => "CallbackFunction",
            CallbackKind::Interface => "CallbackInterface",
        };
        let methods = self
            .methods()
            .iter()
            .map(|method| self.method(method))
            .collect::<Result<Vec<_>>>()?
            .join("\n");

        fill(
            "
            #[derive(JSTraceable, PartialEq)]
            #[cfg_attr(crown, allow(crown::unrooted_must_root))]
            pub struct ${name} {
                pub parent: ${parent},
            }

            impl ${name} {
                pub unsafe fn new(aCx: SafeJSContext, aCallback: *mut JSObject) -> Rc<${name}> {
                    let mut ret = Rc::new(${name} {
                        parent: ${parent}::new(),
                    });
                    // The callback must not move once initialised.
                    match Rc::get_mut(&mut ret) {
                        Some(ref mut callback) => callback.parent.init(aCx, aCallback),
                        None => unreachable!(),
                    };
                    ret
                }

                $*{methods}
            }

            impl CallbackContainer for ${name} {
                unsafe fn new(cx: SafeJSContext, callback: *mut JSObject) -> Rc<${name}> {
                    ${name}::new(cx, callback)
                }

                fn callback_holder(&self) -> &CallbackObject {
                    self.parent.callback_holder()
                }
            }

            impl ToJSValConvertible for ${name} {
                unsafe fn to_jsval(&self, cx: *mut RawJSContext, rval: MutableHandleValue) {
                    self.callback().to_jsval(cx, rval);
                }
            }
            ",
            &[("name", name), ("parent", parent), ("methods", &methods)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodegenConfig;
    use crate::idl::{CallbackOperation, Definitions, Interface};
    use crate::BindingsGenerator;

    fn generate(callback: Callback) -> String {
        let mut definitions = Definitions::default();
        definitions.add_interface(Interface {
            name: "Event".to_owned(),
            ..Default::default()
        });
        let name = callback.name.clone();
        definitions.add_callback(callback);
        let generator = BindingsGenerator::new(definitions, CodegenConfig::default()).unwrap();
        generator.generate_callback(&name).unwrap()
    }

    fn operation(name: &str, signature: Signature) -> CallbackOperation {
        CallbackOperation {
            name: name.to_owned(),
            signature,
        }
    }

    #[test]
    fn omitted_trailing_arguments_shrink_argc() {
        let code = generate(Callback {
            name: "Handler".to_owned(),
            kind: CallbackKind::Function,
            operations: vec![operation(
                "call",
                Signature::new(
                    IdlType::boolean(),
                    vec![
                        Argument::new("event", IdlType::interface("Event")),
                        Argument::new("detail", IdlType::long()).optional(),
                    ],
                ),
            )],
            ..Default::default()
        });
        let detail = code.find("if let Some(detail) = detail {").unwrap();
        let event = code.find("(event).to_jsval(*cx, argv_root.handle_mut());").unwrap();
        assert!(detail < event, "arguments are converted back to front");
        assert!(code.contains("} else if argc == 2 {\n            // The trailing argument was omitted.\n            argc -= 1;"));
        assert!(code.contains("rooted!(in(*cx) let callable = ObjectValue(self.callback()));"));
        assert!(code.contains("event: &Event, detail: Option<i32>, "));
        assert!(code.contains(") -> Fallible<bool> {"));
    }

    #[test]
    fn single_operation_interfaces_may_be_plain_functions() {
        let code = generate(Callback {
            name: "NodeFilter".to_owned(),
            kind: CallbackKind::Interface,
            operations: vec![operation(
                "acceptNode",
                Signature::new(IdlType::unsigned_long(), vec![]),
            )],
            ..Default::default()
        });
        assert!(code.contains("let isCallable = IsCallable(self.callback());"));
        assert!(code.contains("self.parent.get_callable_property(cx, \"acceptNode\")?"));
        assert!(code.contains("rooted!(in(*cx) let rootedThis = if isCallable { aThisObj.get() } else { self.callback() });"));
        assert!(code.contains("pub fn AcceptNode_<T: ThisReflector>("));
    }

    #[test]
    fn variadic_arguments_extend_argc() {
        let code = generate(Callback {
            name: "Logger".to_owned(),
            kind: CallbackKind::Function,
            operations: vec![operation(
                "call",
                Signature::new(
                    IdlType::undefined(),
                    vec![Argument::new("values", IdlType::any()).variadic()],
                ),
            )],
            ..Default::default()
        });
        assert!(code.contains("let mut argc = 0 + values.len();"));
        assert!(code.contains("for idx in 0..values.len() {"));
        assert!(code.contains("let arg = &mut argv[0 + idx];"));
        assert!(code.contains("values: Vec<HandleValue>, "));
        assert!(code.contains("Ok(())"));
    }
}
