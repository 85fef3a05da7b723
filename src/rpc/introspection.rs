//! Built-in introspection methods
//!
//! Every server answers `system.listMethods` and `system.methodSignature`.
//! Both are registered ahead of user methods and cannot be replaced.

use super::server::MethodTable;
use super::signature::{MethodSignature, Signature};
use super::value::{TypeTag, Value};
use crate::error::RpcError;

pub const LIST_METHODS: &str = "system.listMethods";
pub const METHOD_SIGNATURE: &str = "system.methodSignature";

pub(crate) fn builtin_positional(name: &str) -> Option<Signature> {
    match name {
        LIST_METHODS => Some(Signature::new(TypeTag::Array, [])),
        METHOD_SIGNATURE => Some(Signature::new(TypeTag::Array, [TypeTag::String])),
        _ => None,
    }
}

/// Signature of a built-in method, known to clients without a round trip
#[must_use]
pub fn builtin_signature(name: &str) -> Option<MethodSignature> {
    builtin_positional(name).map(MethodSignature::from)
}

/// Every registered name, built-ins first, in registration order
pub(crate) fn list_methods(table: &MethodTable) -> Value {
    table.names().map(Value::from).collect::<Vec<_>>().into()
}

/// The published signature of the named method
///
/// `[return, params...]` for a single positional signature, a list of those
/// for several, and `[struct]` for named arguments.
pub(crate) fn method_signature(table: &MethodTable, args: &[Value]) -> Result<Value, RpcError> {
    let name = match args {
        [Value::String(name)] => name,
        _ => {
            return Err(RpcError::BadRequest(format!(
                "{METHOD_SIGNATURE} takes one string argument"
            )))
        }
    };
    table
        .signature(name)
        .map(MethodSignature::to_wire)
        .ok_or_else(|| RpcError::UnsupportedMethod(name.clone()))
}
