/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Generation-time errors.
//!
//! These describe malformed or unsupported IDL input. They abort generation of
//! the offending unit and never appear in generated code; failures of the
//! *generated* program are expressed as code fragments instead.

use crate::idl::Location;

/// Convenient type alias of Result type for the code generator.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned while generating bindings.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// Two or more signatures of an operation cannot be told apart for some
    /// argument count.
    #[error("{location}: signatures of '{operation}' taking {argc} arguments are not distinguishable")]
    AmbiguousOverload {
        operation: String,
        argc: usize,
        location: Location,
    },
    /// A union with non-object members sits at a distinguishing index.
    #[error(
        "{location}: no support for unions with non-object members as the distinguishing \
         argument of '{operation}'"
    )]
    UnsupportedUnionOverload { operation: String, location: Location },
    /// A named deleter on an interface that also has unforgeable members.
    #[error("{location}: interface '{interface}' combines a named deleter with unforgeable members")]
    DeleterOnUnforgeable { interface: String, location: Location },
    #[error("{location}: enum value \"{value}\" of '{enumeration}' {reason}")]
    InvalidEnumValue {
        enumeration: String,
        value: String,
        reason: &'static str,
        location: Location,
    },
    #[error("{location}: unsupported default value {value} for {target}: {reason}")]
    UnsupportedDefault {
        target: String,
        value: String,
        reason: &'static str,
        location: Location,
    },
    #[error("{location}: unknown {kind} '{name}'")]
    UnknownDefinition {
        kind: &'static str,
        name: String,
        location: Location,
    },
    #[error("{location}: union '{union}' {reason}")]
    InvalidUnion {
        union: String,
        reason: &'static str,
        location: Location,
    },
    #[error("{location}: treating non-callable values as null requires a nullable callback ({target})")]
    NonNullableTreatAsNull { target: String, location: Location },
    #[error("{location}: [Clamp] and [EnforceRange] are exclusive and only apply to integers ({target})")]
    ConflictingRangePolicy { target: String, location: Location },
    #[error("{location}: dictionary '{dictionary}' inherits from itself")]
    DictionaryCycle { dictionary: String, location: Location },
    #[error("{location}: variadic argument '{argument}' of '{operation}' must be the last one")]
    MisplacedVariadic {
        operation: String,
        argument: String,
        location: Location,
    },
    #[error("{location}: required argument '{argument}' of '{operation}' follows an optional one")]
    RequiredAfterOptional {
        operation: String,
        argument: String,
        location: Location,
    },
    #[error("unknown placeholder '{placeholder}' in code template")]
    UnknownPlaceholder { placeholder: String },
}
