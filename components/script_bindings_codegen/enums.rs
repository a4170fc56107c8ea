/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Enumerations: a Rust enum plus a `FooValues` module holding the value table
//! and the conversions.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::CodegenConfig;
use crate::error::{Error, Result};
use crate::fragment::fill;
use crate::idl::Enum;

/// The Rust variant name of an enum value.
///
/// The empty string becomes `_empty`; characters outside `[0-9A-Za-z_]` become
/// `_`; a leading digit gets a `_` prefix. Names that could collide with the
/// ones produced here are rejected.
pub fn enum_value_name(enumeration: &Enum, value: &str) -> Result<String> {
    static INVALID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]").unwrap());
    static RESERVED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(_[A-Z]|__)").unwrap());

    let invalid = |reason| Error::InvalidEnumValue {
        enumeration: enumeration.name.clone(),
        value: value.to_owned(),
        reason,
        location: enumeration.location.clone(),
    };

    if value.chars().any(|c| !(' '..='~').contains(&c)) {
        return Err(invalid("contains non-ASCII characters"));
    }
    if value.is_empty() {
        return Ok("_empty".to_owned());
    }
    let mut name = String::with_capacity(value.len() + 1);
    if value.starts_with(|c: char| c.is_ascii_digit()) {
        name.push('_');
    }
    name.push_str(&INVALID.replace_all(value, "_"));
    if RESERVED.is_match(&name) {
        return Err(invalid("is reserved"));
    }
    if name == "_empty" {
        return Err(invalid("collides with the name used for the empty string"));
    }

    let mut chars = name.chars();
    Ok(match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => name,
    })
}

/// The variant names of every value, in declaration order.
pub fn enum_variant_names(enumeration: &Enum) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    enumeration
        .values
        .iter()
        .map(|value| {
            let name = enum_value_name(enumeration, value)?;
            if !seen.insert(name.clone()) {
                return Err(Error::InvalidEnumValue {
                    enumeration: enumeration.name.clone(),
                    value: value.clone(),
                    reason: "maps to the same variant as an earlier value",
                    location: enumeration.location.clone(),
                });
            }
            Ok(name)
        })
        .collect()
}

pub fn generate_enum(enumeration: &Enum, config: &CodegenConfig) -> Result<String> {
    debug!("generating enum {}", enumeration.name);
    let names = enum_variant_names(enumeration)?;
    let name = enumeration.name.as_str();

    let variants: String = names.iter().map(|variant| format!("{variant},\n")).collect();
    let pairs: String = enumeration
        .values
        .iter()
        .zip(&names)
        .map(|(value, variant)| format!("({value:?}, super::{name}::{variant}),\n"))
        .collect();
    let invalid = format!("'{{}}' is not a valid enum value for enumeration '{name}'.");

    fill(
        "
        #[repr(usize)]
        #[derive(Clone, Copy, Debug, Eq, JSTraceable, MallocSizeOf, PartialEq)]
        pub enum ${name} {
            $*{variants}
        }

        pub mod ${name}Values {
            use js::conversions::{ConversionResult, FromJSValConvertible, ToJSValConvertible};
            use js::jsapi::JSContext;
            use js::rust::{HandleValue, MutableHandleValue};

            use ${utils}::find_enum_value;

            pub(crate) const pairs: &[(&str, super::${name})] = &[
                $*{pairs}
            ];

            impl super::${name} {
                pub fn as_str(&self) -> &'static str {
                    pairs[*self as usize].0
                }
            }

            impl Default for super::${name} {
                fn default() -> super::${name} {
                    pairs[0].1
                }
            }

            impl std::str::FromStr for super::${name} {
                type Err = ();

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    pairs
                        .iter()
                        .find(|&&(key, _)| s == key)
                        .map(|&(_, value)| value)
                        .ok_or(())
                }
            }

            impl ToJSValConvertible for super::${name} {
                unsafe fn to_jsval(&self, cx: *mut JSContext, rval: MutableHandleValue) {
                    pairs[*self as usize].0.to_jsval(cx, rval);
                }
            }

            impl FromJSValConvertible for super::${name} {
                type Config = ();
                unsafe fn from_jsval(
                    cx: *mut JSContext,
                    value: HandleValue,
                    _option: (),
                ) -> Result<ConversionResult<super::${name}>, ()> {
                    match find_enum_value(cx, value, pairs) {
                        Err(_) => Err(()),
                        Ok((None, search)) => Ok(ConversionResult::Failure(
                            format!(${invalid}, search).into(),
                        )),
                        Ok((Some(&value), _)) => Ok(ConversionResult::Success(value)),
                    }
                }
            }
        }
        ",
        &[
            ("name", name),
            ("variants", &variants),
            ("pairs", &pairs),
            ("invalid", &format!("{invalid:?}")),
            ("utils", &config.runtime_path("utils")),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enumeration(values: &[&str]) -> Enum {
        Enum {
            name: "Mode".to_owned(),
            values: values.iter().map(|value| value.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn value_names_are_sanitised() {
        let mode = enumeration(&[]);
        assert_eq!(enum_value_name(&mode, "open").unwrap(), "Open");
        assert_eq!(enum_value_name(&mode, "").unwrap(), "_empty");
        assert_eq!(enum_value_name(&mode, "2d").unwrap(), "_2d");
        assert_eq!(enum_value_name(&mode, "no-cors").unwrap(), "No_cors");
    }

    #[test]
    fn reserved_and_non_ascii_values_are_rejected() {
        let mode = enumeration(&[]);
        assert!(enum_value_name(&mode, "_Private").is_err());
        assert!(enum_value_name(&mode, "__proto").is_err());
        assert!(enum_value_name(&mode, "_empty").is_err());
        assert!(enum_value_name(&mode, "caf\u{e9}").is_err());
    }

    #[test]
    fn colliding_values_are_rejected() {
        assert!(enum_variant_names(&enumeration(&["a-b", "a_b"])).is_err());
    }

    #[test]
    fn value_table_keeps_declaration_order() {
        let code = generate_enum(&enumeration(&["open", "closed"]), &CodegenConfig::default()).unwrap();
        assert!(code.contains("pub enum Mode {\n    Open,\n    Closed,\n}"));
        assert!(code.contains("(\"open\", super::Mode::Open),\n        (\"closed\", super::Mode::Closed),"));
        assert!(code.contains("is not a valid enum value for enumeration 'Mode'."));
        assert!(code.contains("use crate::utils::find_enum_value;"));
    }
}
