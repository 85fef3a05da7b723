//! Method signatures
//!
//! A method declares its arguments one of two ways:
//!
//! - positionally, as one or more `[return_type, param_types...]`
//!   alternatives; a call is accepted when it matches any of them
//! - by name, as a single struct argument whose members are either required
//!   (declared by type) or optional (declared by default value)
//!
//! The same validation runs on both sides of the wire. The client checks
//! arguments before sending anything; the server checks them again after
//! decoding, and checks each return value before encoding it.

use super::value::{TypeTag, Value};
use crate::error::RpcError;
use std::collections::BTreeMap;
use std::fmt;

/// One positional contract: `[return, params...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub returns: TypeTag,
    pub params: Vec<TypeTag>,
}

impl Signature {
    pub fn new(returns: TypeTag, params: impl IntoIterator<Item = TypeTag>) -> Self {
        Self {
            returns,
            params: params.into_iter().collect(),
        }
    }

    /// `[return, params...]` as tag names
    #[must_use]
    pub fn to_wire(&self) -> Value {
        std::iter::once(self.returns)
            .chain(self.params.iter().copied())
            .map(|tag| Value::from(tag.as_str()))
            .collect::<Vec<_>>()
            .into()
    }

    /// Parse one `[return, params...]` array
    ///
    /// # Errors
    ///
    /// [`RpcError::BadResponse`] if the value is not a non-empty array of
    /// known type names.
    pub fn from_wire(value: &Value) -> Result<Self, RpcError> {
        let items = value
            .as_array()
            .ok_or_else(|| RpcError::BadResponse(format!("signature is a {}, not an array", value.type_tag())))?;
        let mut tags = items.iter().map(|item| {
            item.as_str()
                .ok_or_else(|| RpcError::BadResponse("signature entry is not a string".to_owned()))?
                .parse::<TypeTag>()
                .map_err(|e| RpcError::BadResponse(e.to_string()))
        });
        let returns = tags
            .next()
            .ok_or_else(|| RpcError::BadResponse("signature is empty".to_owned()))??;
        let params = tags.collect::<Result<Vec<_>, _>>()?;
        Ok(Self { returns, params })
    }

    fn accepts(&self, args: &[Value]) -> bool {
        args.len() == self.params.len()
            && self.params.iter().zip(args).all(|(tag, arg)| arg.type_tag() == *tag)
    }

    /// Check argument count and wire types
    ///
    /// # Errors
    ///
    /// [`RpcError::BadRequest`] naming the first mismatch.
    pub fn validate_args(&self, method: &str, args: &[Value]) -> Result<(), RpcError> {
        if args.len() != self.params.len() {
            return Err(RpcError::BadRequest(format!(
                "{method} takes {} argument(s), {} given",
                self.params.len(),
                args.len()
            )));
        }
        for (index, (expected, arg)) in self.params.iter().zip(args).enumerate() {
            if arg.type_tag() != *expected {
                return Err(RpcError::BadRequest(format!(
                    "{method} argument {index} must be {expected}, got {}",
                    arg.type_tag()
                )));
            }
        }
        Ok(())
    }

    /// Check a return value against the declared return type
    ///
    /// # Errors
    ///
    /// [`RpcError::BadResponse`] on mismatch.
    pub fn validate_return(&self, method: &str, value: &Value) -> Result<(), RpcError> {
        if value.type_tag() == self.returns {
            Ok(())
        } else {
            Err(RpcError::BadResponse(format!(
                "{method} must return {}, returned {}",
                self.returns,
                value.type_tag()
            )))
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.returns)?;
        for param in &self.params {
            write!(f, ", {param}")?;
        }
        f.write_str("]")
    }
}

/// One member of a [`NamedSignature`]
#[derive(Debug, Clone, PartialEq)]
pub enum NamedParam {
    /// Must be present with this type
    Required(TypeTag),
    /// May be omitted; filled with this value, and its type when present
    Optional(Value),
}

impl NamedParam {
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            NamedParam::Required(tag) => *tag,
            NamedParam::Optional(default) => default.type_tag(),
        }
    }
}

/// Struct members by name
///
/// ```rust,ignore
/// let pow = NamedSignature::new().required("base", TypeTag::Int).optional("exponent", 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedSignature {
    fields: BTreeMap<String, NamedParam>,
}

impl NamedSignature {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(mut self, name: impl Into<String>, tag: TypeTag) -> Self {
        self.fields.insert(name.into(), NamedParam::Required(tag));
        self
    }

    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), NamedParam::Optional(default.into()));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NamedParam> {
        self.fields.get(name)
    }

    /// Members in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &NamedParam)> {
        self.fields.iter().map(|(name, param)| (name.as_str(), param))
    }

    /// A struct mapping required members to their type name and optional
    /// members to their default
    #[must_use]
    pub fn to_wire(&self) -> Value {
        self.fields
            .iter()
            .map(|(name, param)| {
                let value = match param {
                    NamedParam::Required(tag) => Value::from(tag.as_str()),
                    NamedParam::Optional(default) => default.clone(),
                };
                (name.clone(), value)
            })
            .collect::<BTreeMap<_, _>>()
            .into()
    }

    /// Inverse of [`NamedSignature::to_wire`]
    ///
    /// A string member naming a type is read as required; anything else is
    /// an optional member's default.
    ///
    /// # Errors
    ///
    /// [`RpcError::BadResponse`] if the value is not a struct.
    pub fn from_wire(value: &Value) -> Result<Self, RpcError> {
        let members = value.as_struct().ok_or_else(|| {
            RpcError::BadResponse(format!("named signature is a {}, not a struct", value.type_tag()))
        })?;
        let fields = members
            .iter()
            .map(|(name, member)| {
                let param = match member.as_str().map(str::parse::<TypeTag>) {
                    Some(Ok(tag)) => NamedParam::Required(tag),
                    _ => NamedParam::Optional(member.clone()),
                };
                (name.clone(), param)
            })
            .collect();
        Ok(Self { fields })
    }

    fn check(&self, members: &BTreeMap<String, Value>) -> Result<(), String> {
        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|(name, param)| {
                matches!(param, NamedParam::Required(_)) && !members.contains_key(name.as_str())
            })
            .map(|(name, _)| name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required member(s) {}", missing.join(", ")));
        }
        for (name, param) in &self.fields {
            if let Some(member) = members.get(name) {
                if member.type_tag() != param.type_tag() {
                    return Err(format!(
                        "member {name} must be {}, got {}",
                        param.type_tag(),
                        member.type_tag()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Add the default of every optional member that is absent
    pub fn fill_defaults(&self, members: &mut BTreeMap<String, Value>) {
        for (name, param) in &self.fields {
            if let NamedParam::Optional(default) = param {
                members
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }

    /// The struct carried by a named call; no arguments is an empty struct
    ///
    /// # Errors
    ///
    /// [`RpcError::BadRequest`] unless `args` is empty or one struct.
    pub fn members<'a>(
        method: &str,
        args: &'a [Value],
    ) -> Result<std::borrow::Cow<'a, BTreeMap<String, Value>>, RpcError> {
        match args {
            [] => Ok(std::borrow::Cow::Owned(BTreeMap::new())),
            [Value::Struct(members)] => Ok(std::borrow::Cow::Borrowed(members)),
            _ => Err(RpcError::BadRequest(format!(
                "{method} takes a single struct of named arguments"
            ))),
        }
    }

    /// Check a named call's arguments
    ///
    /// # Errors
    ///
    /// [`RpcError::BadRequest`] for a wrong shape, a missing required
    /// member, or a member of the wrong type.
    pub fn validate_args(&self, method: &str, args: &[Value]) -> Result<(), RpcError> {
        let members = Self::members(method, args)?;
        self.check(&members)
            .map_err(|reason| RpcError::BadRequest(format!("{method}: {reason}")))
    }

    /// Check a struct return value
    ///
    /// # Errors
    ///
    /// [`RpcError::BadResponse`] if the value is not a struct or violates
    /// the members.
    pub fn validate_return(&self, method: &str, value: &Value) -> Result<(), RpcError> {
        let members = value.as_struct().ok_or_else(|| {
            RpcError::BadResponse(format!("{method} must return a struct, returned {}", value.type_tag()))
        })?;
        self.check(members)
            .map_err(|reason| RpcError::BadResponse(format!("{method} returned a bad struct: {reason}")))
    }
}

impl fmt::Display for NamedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (name, param)) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match param {
                NamedParam::Required(tag) => write!(f, "{name}: {tag}")?,
                NamedParam::Optional(default) => write!(f, "{name} = {default}")?,
            }
        }
        f.write_str("}")
    }
}

/// Everything a client needs to validate calls to one method
///
/// This is what `system.methodSignature` publishes:
///
/// | Variant | Wire form |
/// |---|---|
/// | one positional alternative | `[return, params...]` |
/// | several | `[[return, params...], ...]` |
/// | named | `[{member: type name or default, ...}]` |
#[derive(Debug, Clone, PartialEq)]
pub enum MethodSignature {
    Positional(Vec<Signature>),
    Named(NamedSignature),
}

impl From<Signature> for MethodSignature {
    fn from(signature: Signature) -> Self {
        MethodSignature::Positional(vec![signature])
    }
}

impl From<NamedSignature> for MethodSignature {
    fn from(signature: NamedSignature) -> Self {
        MethodSignature::Named(signature)
    }
}

impl MethodSignature {
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            MethodSignature::Positional(alternatives) => match alternatives.as_slice() {
                [single] => single.to_wire(),
                many => Value::Array(many.iter().map(Signature::to_wire).collect()),
            },
            MethodSignature::Named(named) => Value::Array(vec![named.to_wire()]),
        }
    }

    /// Parse the value returned by `system.methodSignature`
    ///
    /// # Errors
    ///
    /// [`RpcError::BadResponse`] if the value has none of the three shapes.
    pub fn from_wire(value: &Value) -> Result<Self, RpcError> {
        match value.as_array() {
            Some([named @ Value::Struct(_)]) => {
                NamedSignature::from_wire(named).map(MethodSignature::Named)
            }
            Some(items @ [Value::Array(_), ..]) => items
                .iter()
                .map(Signature::from_wire)
                .collect::<Result<Vec<_>, _>>()
                .map(MethodSignature::Positional),
            _ => Signature::from_wire(value).map(MethodSignature::from),
        }
    }

    /// Check `args`; a positional match returns the alternative it matched
    ///
    /// # Errors
    ///
    /// [`RpcError::BadRequest`] when no alternative accepts the arguments.
    pub fn validate_args(&self, method: &str, args: &[Value]) -> Result<Option<&Signature>, RpcError> {
        match self {
            MethodSignature::Positional(alternatives) => match alternatives.as_slice() {
                [single] => single.validate_args(method, args).map(|()| Some(single)),
                many => many
                    .iter()
                    .find(|signature| signature.accepts(args))
                    .map(Some)
                    .ok_or_else(|| {
                        let given: Vec<&str> = args.iter().map(|a| a.type_tag().as_str()).collect();
                        let accepted: Vec<String> = many
                            .iter()
                            .map(|s| {
                                let tags: Vec<&str> = s.params.iter().map(|t| t.as_str()).collect();
                                format!("({})", tags.join(", "))
                            })
                            .collect();
                        RpcError::BadRequest(format!(
                            "{method} requires arguments of one of {}, got ({})",
                            accepted.join(" or "),
                            given.join(", ")
                        ))
                    }),
            },
            MethodSignature::Named(named) => named.validate_args(method, args).map(|()| None),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSignature::Positional(alternatives) => {
                for (index, signature) in alternatives.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{signature}")?;
                }
                Ok(())
            }
            MethodSignature::Named(named) => write!(f, "{named}"),
        }
    }
}
