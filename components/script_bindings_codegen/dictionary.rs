/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dictionaries: a struct with one field per member and an embedded parent,
//! decoded from and encoded to plain script objects.

use itertools::Itertools;

use crate::Context;
use crate::conversions::{ConversionContext, MemberKind, type_to_native};
use crate::error::Result;
use crate::fragment::fill;
use crate::idl::{DefaultValue, Definitions, Dictionary, DictionaryMember};

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "yield",
];

/// Whether `dictionary` or any of its ancestors has a required member.
pub fn dictionary_has_required_members(
    definitions: &Definitions,
    dictionary: &Dictionary,
) -> Result<bool> {
    if dictionary.members.iter().any(|member| member.required) {
        return Ok(true);
    }
    match &dictionary.parent {
        Some(parent) => {
            let parent = definitions.dictionary(parent, &dictionary.location)?;
            dictionary_has_required_members(definitions, parent)
        },
        None => Ok(false),
    }
}

/// The struct field holding `member`.
pub fn member_field_name(member: &str) -> String {
    if RUST_KEYWORDS.contains(&member) {
        format!("{member}_")
    } else {
        member.to_owned()
    }
}

struct MemberCode {
    field: String,
    decl_type: String,
    conversion: String,
    /// What an absent member decodes to.
    default: String,
    /// Absent members are skipped when encoding.
    optional_without_default: bool,
}

pub struct DictionaryGenerator<'a> {
    ctx: Context<'a>,
    dictionary: &'a Dictionary,
    needs_tracing: bool,
    members: Vec<(&'a DictionaryMember, MemberCode)>,
}

impl<'a> DictionaryGenerator<'a> {
    pub fn new(ctx: Context<'a>, dictionary: &'a Dictionary) -> Result<Self> {
        if let Some(parent) = &dictionary.parent {
            ctx.dictionary(parent, &dictionary.location)?;
        }
        let members = dictionary
            .members
            .iter()
            .map(|member| Ok((member, Self::member_code(ctx, dictionary, member)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(DictionaryGenerator {
            ctx,
            dictionary,
            needs_tracing: ctx.traces.dictionary_needs_tracing(&dictionary.name),
            members,
        })
    }

    fn member_code(
        ctx: Context<'_>,
        dictionary: &Dictionary,
        member: &DictionaryMember,
    ) -> Result<MemberCode> {
        let mut default = member.default.clone();
        if member.required && default.is_some() {
            warn!(
                "{}: ignoring the default of required member {}.{}",
                dictionary.location, dictionary.name, member.name
            );
            default = None;
        }
        // An absent `any` member is undefined rather than `None`.
        if member.ty.is_any() && !member.required && default.is_none() {
            default = Some(DefaultValue::Undefined);
        }
        let cc = ConversionContext::new(
            format!("'{}' member of {}", member.name, dictionary.name),
            &dictionary.location,
        )
        .member(MemberKind::Dictionary)
        .with_default(default.clone())
        .with_exception("return Err(());");

        let mut info = type_to_native(ctx, &member.ty, &cc)?;
        let optional_without_default = !member.required && default.is_none();
        if optional_without_default {
            info = info.optional()?;
        }
        let missing = format!(
            "throw_type_error(*cx, {:?});\nreturn Err(());",
            format!("Missing required member \"{}\".", member.name)
        );
        let default = if member.required {
            missing
        } else {
            info.default.clone().unwrap_or_else(|| "None".to_owned())
        };
        Ok(MemberCode {
            field: member_field_name(&member.name),
            decl_type: info
                .decl_type
                .as_ref()
                .map_or_else(|| "()".to_owned(), ToString::to_string),
            conversion: info.template.substitute("rval.handle()"),
            default,
            optional_without_default,
        })
    }

    fn fields(&self) -> String {
        let parent = self
            .dictionary
            .parent
            .as_ref()
            .map(|parent| format!("pub parent: {parent},"));
        parent
            .into_iter()
            .chain(
                self.members
                    .iter()
                    .map(|(_, code)| format!("pub {}: {},", code.field, code.decl_type)),
            )
            .join("\n")
    }

    fn decoders(&self) -> Result<String> {
        let parent = self.dictionary.parent.as_ref().map(|parent| {
            fill(
                "
                parent: match ${parent}::new(cx, val)? {
                    ConversionResult::Success(parent) => parent,
                    ConversionResult::Failure(error) => return Ok(ConversionResult::Failure(error)),
                },
                ",
                &[("parent", parent)],
            )
        });
        let members = self.members.iter().map(|(member, code)| {
            fill(
                "
                ${field}: {
                    rooted!(in(*cx) let mut rval = UndefinedValue());
                    if get_dictionary_property(*cx, object.handle(), ${name}, rval.handle_mut(), CanGc::note())? &&
                        !rval.is_undefined()
                    {
                        $*{conversion}
                    } else {
                        $*{default}
                    }
                },
                ",
                &[
                    ("field", &code.field),
                    ("name", &format!("{:?}", member.name)),
                    ("conversion", &code.conversion),
                    ("default", &code.default),
                ],
            )
        });
        Ok(parent
            .into_iter()
            .chain(members)
            .collect::<Result<Vec<_>>>()?
            .concat())
    }

    fn encoders(&self) -> Result<String> {
        let parent = self
            .dictionary
            .parent
            .as_ref()
            .map(|_| Ok("self.parent.to_jsobject(cx, obj.reborrow());\n".to_owned()));
        let members = self.members.iter().map(|(member, code)| {
            let write = fill(
                "
                rooted!(in(cx) let mut ${field}_js = UndefinedValue());
                ${field}.to_jsval(cx, ${field}_js.handle_mut());
                set_dictionary_property(cx, obj.handle(), ${name}, ${field}_js.handle()).unwrap();
                ",
                &[
                    ("field", &code.field),
                    ("name", &format!("{:?}", member.name)),
                ],
            )?;
            if code.optional_without_default {
                fill(
                    "
                    if let Some(ref ${field}) = self.${field} {
                        $*{write}
                    }
                    ",
                    &[("field", &code.field), ("write", &write)],
                )
            } else {
                Ok(format!("let {0} = &self.{0};\n{write}", code.field))
            }
        });
        Ok(parent
            .into_iter()
            .chain(members)
            .collect::<Result<Vec<_>>>()?
            .concat())
    }

    /// `empty()`, unless some member (here or in an ancestor) is required.
    fn empty(&self) -> Result<Option<String>> {
        if dictionary_has_required_members(self.ctx.definitions, self.dictionary)? {
            return Ok(None);
        }
        let parent = self
            .dictionary
            .parent
            .as_ref()
            .map(|parent| format!("parent: {parent}::empty(),"));
        let fields = parent
            .into_iter()
            .chain(self.members.iter().map(|(_, code)| {
                format!("{}: {},", code.field, code.default)
            }))
            .join("\n");
        fill(
            "
            pub fn empty() -> Self {
                Self {
                    $*{fields}
                }
            }

            ",
            &[("fields", &fields)],
        )
        .map(Some)
    }

    pub fn generate(&self) -> Result<String> {
        let name = self.dictionary.name.as_str();
        debug!("generating dictionary {name}");
        let (derive, from_jsval_type, from_jsval_body) = if self.needs_tracing {
            (
                "#[derive(JSTraceable)]\n#[cfg_attr(crown, crown::unrooted_must_root_lint::must_root)]",
                format!("RootedTraceableBox<{name}>"),
                fill(
                    "
                    match ${name}::new(SafeJSContext::from_ptr(cx), value)? {
                        ConversionResult::Success(dictionary) => {
                            Ok(ConversionResult::Success(RootedTraceableBox::new(dictionary)))
                        },
                        ConversionResult::Failure(error) => Ok(ConversionResult::Failure(error)),
                    }
                    ",
                    &[("name", name)],
                )?,
            )
        } else {
            (
                "#[derive(JSTraceable)]",
                name.to_owned(),
                format!("{name}::new(SafeJSContext::from_ptr(cx), value)"),
            )
        };

        fill(
            "
            ${derive}
            pub struct ${name} {
                $*{fields}
            }

            impl ${name} {
                $*{empty}
                pub fn new(cx: SafeJSContext, val: HandleValue) -> Result<ConversionResult<${name}>, ()> {
                    unsafe {
                        let object = if val.get().is_null_or_undefined() {
                            ptr::null_mut()
                        } else if val.get().is_object() {
                            val.get().to_object()
                        } else {
                            return Ok(ConversionResult::Failure(\"Value is not an object.\".into()));
                        };
                        rooted!(in(*cx) let object = object);
                        let dictionary = ${name} {
                            $*{decoders}
                        };
                        Ok(ConversionResult::Success(dictionary))
                    }
                }

                pub(crate) unsafe fn to_jsobject(&self, cx: *mut RawJSContext, mut obj: MutableHandleObject) {
                    $*{encoders}
                }
            }

            impl FromJSValConvertible for ${from_jsval_type} {
                type Config = ();
                unsafe fn from_jsval(
                    cx: *mut RawJSContext,
                    value: HandleValue,
                    _option: (),
                ) -> Result<ConversionResult<${from_jsval_type}>, ()> {
                    $*{from_jsval_body}
                }
            }

            impl ToJSValConvertible for ${name} {
                unsafe fn to_jsval(&self, cx: *mut RawJSContext, mut rval: MutableHandleValue) {
                    rooted!(in(cx) let mut obj = JS_NewObject(cx, ptr::null()));
                    self.to_jsobject(cx, obj.handle_mut());
                    rval.set(ObjectOrNullValue(obj.get()))
                }
            }
            ",
            &[
                ("derive", derive),
                ("name", name),
                ("fields", &self.fields()),
                ("empty", self.empty()?.as_deref().unwrap_or_default()),
                ("decoders", &self.decoders()?),
                ("encoders", &self.encoders()?),
                ("from_jsval_type", &from_jsval_type),
                ("from_jsval_body", &from_jsval_body),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodegenConfig;
    use crate::idl::IdlType;
    use crate::{BindingsGenerator, Error};

    fn generator(dictionaries: Vec<Dictionary>) -> BindingsGenerator {
        let mut definitions = Definitions::default();
        for dictionary in dictionaries {
            definitions.add_dictionary(dictionary);
        }
        BindingsGenerator::new(definitions, CodegenConfig::default()).unwrap()
    }

    fn dictionary(name: &str, parent: Option<&str>, members: Vec<DictionaryMember>) -> Dictionary {
        Dictionary {
            name: name.to_owned(),
            parent: parent.map(str::to_owned),
            members,
            ..Default::default()
        }
    }

    #[test]
    fn required_members_are_found_through_parents() {
        let generator = generator(vec![
            dictionary("Base", None, vec![DictionaryMember::new("id", IdlType::long()).required()]),
            dictionary("Derived", Some("Base"), vec![]),
            dictionary("Loose", None, vec![DictionaryMember::new("id", IdlType::long())]),
        ]);
        let definitions = generator.definitions();
        let has_required = |name| {
            dictionary_has_required_members(
                definitions,
                definitions.dictionaries.get(name).unwrap(),
            )
            .unwrap()
        };
        assert!(has_required("Base"));
        assert!(has_required("Derived"));
        assert!(!has_required("Loose"));
    }

    #[test]
    fn missing_required_member_throws() {
        let generator = generator(vec![dictionary(
            "Init",
            None,
            vec![DictionaryMember::new("id", IdlType::long()).required()],
        )]);
        let code = generator.generate_dictionary("Init").unwrap();
        assert!(code.contains(r#"throw_type_error(*cx, "Missing required member \"id\".");"#));
        assert!(!code.contains("pub fn empty()"));
    }

    #[test]
    fn parent_is_decoded_before_members() {
        let generator = generator(vec![
            dictionary("Base", None, vec![DictionaryMember::new("flag", IdlType::boolean())]),
            dictionary(
                "Derived",
                Some("Base"),
                vec![DictionaryMember::new("count", IdlType::long()).with_default(DefaultValue::Integer(3))],
            ),
        ]);
        let code = generator.generate_dictionary("Derived").unwrap();
        let parent = code.find("parent: match Base::new(cx, val)?").unwrap();
        let member = code.find("count: {").unwrap();
        assert!(parent < member);
        assert!(code.contains("pub parent: Base,\n    pub count: i32,"));
        assert!(code.contains("parent: Base::empty(),\n            count: 3,"));
        assert!(code.contains("self.parent.to_jsobject(cx, obj.reborrow());"));
    }

    #[test]
    fn absent_optional_members_are_not_encoded() {
        let generator = generator(vec![dictionary(
            "Options",
            None,
            vec![
                DictionaryMember::new("type", IdlType::dom_string()),
                DictionaryMember::new("once", IdlType::boolean()).with_default(DefaultValue::Boolean(false)),
            ],
        )]);
        let code = generator.generate_dictionary("Options").unwrap();
        assert!(code.contains("pub type_: Option<DOMString>,"));
        assert!(code.contains("if let Some(ref type_) = self.type_ {"));
        assert!(code.contains("let once = &self.once;"));
        assert!(code.contains("type_: None,\n            once: false,"));
    }

    #[test]
    fn traced_dictionaries_are_boxed() {
        let generator = generator(vec![dictionary(
            "Detail",
            None,
            vec![DictionaryMember::new("detail", IdlType::any())],
        )]);
        let code = generator.generate_dictionary("Detail").unwrap();
        assert!(code.contains("crown::unrooted_must_root_lint::must_root"));
        assert!(code.contains("impl FromJSValConvertible for RootedTraceableBox<Detail> {"));
        assert!(code.contains("pub detail: RootedTraceableBox<Heap<JSVal>>,"));
    }

    #[test]
    fn unknown_parents_are_reported() {
        let generator = generator(vec![dictionary("Orphan", Some("Missing"), vec![])]);
        assert!(matches!(
            generator.generate_dictionary("Orphan"),
            Err(Error::UnknownDefinition { .. })
        ));
    }
}
