//! XML-RPC wire codec
//!
//! Encoding writes the document directly into a `String`, escaping text with
//! `quick_xml::escape`. Decoding pulls `quick_xml` events into a small element
//! tree and then walks the tree, so structural errors ("no `methodName`") and
//! well-formedness errors ("unclosed tag") surface the same way.
//!
//! Decode failures are reported as [`RpcError::MalformedRequest`] for calls and
//! [`RpcError::BadResponse`] for responses.

use super::value::{TypeTag, Value, DATETIME_FORMAT};
use crate::error::RpcError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

const XML_DECL: &str = "<?xml version=\"1.0\"?>";

/// Deepest element nesting a document may have
///
/// Each array or struct level costs three elements (`value`, `array`,
/// `data`), so this allows about forty levels of nested values.
pub const MAX_NESTING_DEPTH: usize = 128;

/// An in-band RPC error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    /// The request body could not be parsed
    pub const PARSE_ERROR: i32 = -32700;
    /// Argument count or types do not match the signature
    pub const INVALID_REQUEST: i32 = -32600;
    /// No method with the requested name
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// The server produced a value that violates its own signature
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Generic application failure
    pub const APPLICATION_ERROR: i32 = -32500;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&RpcError> for Fault {
    /// Server side: the fault a failed call is reported as
    fn from(err: &RpcError) -> Self {
        match err {
            RpcError::Fault(fault) => fault.clone(),
            RpcError::MalformedRequest(msg) => Fault::new(Fault::PARSE_ERROR, msg.as_str()),
            RpcError::BadRequest(msg) => Fault::new(Fault::INVALID_REQUEST, msg.as_str()),
            RpcError::UnsupportedMethod(msg) => Fault::new(Fault::METHOD_NOT_FOUND, msg.as_str()),
            RpcError::BadResponse(msg) => Fault::new(Fault::INTERNAL_ERROR, msg.as_str()),
            other => Fault::new(Fault::APPLICATION_ERROR, other.to_string()),
        }
    }
}

impl From<Fault> for RpcError {
    /// Client side: the typed error a received fault is raised as
    fn from(fault: Fault) -> Self {
        match fault.code {
            Fault::METHOD_NOT_FOUND => RpcError::UnsupportedMethod(fault.message),
            Fault::INVALID_REQUEST => RpcError::BadRequest(fault.message),
            Fault::PARSE_ERROR => RpcError::MalformedRequest(fault.message),
            Fault::INTERNAL_ERROR => RpcError::BadResponse(fault.message),
            _ => RpcError::Fault(fault),
        }
    }
}

/// A decoded `methodCall`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }
}

/// A decoded `methodResponse`: exactly one value or one fault
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Fault),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn push_tagged(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(n) => push_tagged(out, "int", &n.to_string()),
        Value::Double(n) => push_tagged(out, "double", &n.to_string()),
        Value::String(s) => push_tagged(out, "string", &escape(s.as_str())),
        Value::Boolean(b) => push_tagged(out, "boolean", if *b { "1" } else { "0" }),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member>");
                push_tagged(out, "name", &escape(name.as_str()));
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Base64(bytes) => push_tagged(out, "base64", &STANDARD.encode(bytes)),
        Value::DateTime(dt) => push_tagged(
            out,
            TypeTag::DateTime.as_str(),
            &dt.format(DATETIME_FORMAT).to_string(),
        ),
    }
    out.push_str("</value>");
}

/// Serialize a call to an XML-RPC `methodCall` document
///
/// Non-finite doubles have no wire form; check [`Value::is_finite`] first.
/// [`RpcClient`](super::RpcClient) and [`RpcServer`](super::RpcServer) do.
#[must_use]
pub fn encode_call(call: &MethodCall) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(XML_DECL);
    out.push_str("<methodCall>");
    push_tagged(&mut out, "methodName", &escape(call.method_name.as_str()));
    out.push_str("<params>");
    for param in &call.params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Serialize a response to an XML-RPC `methodResponse` document
#[must_use]
pub fn encode_response(response: &MethodResponse) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(XML_DECL);
    out.push_str("<methodResponse>");
    match response {
        MethodResponse::Success(value) => {
            out.push_str("<params><param>");
            encode_value(&mut out, value);
            out.push_str("</param></params>");
        }
        MethodResponse::Fault(fault) => {
            let mut members = BTreeMap::new();
            members.insert("faultCode".to_owned(), Value::Int(i64::from(fault.code)));
            members.insert("faultString".to_owned(), Value::String(fault.message.clone()));
            out.push_str("<fault>");
            encode_value(&mut out, &Value::Struct(members));
            out.push_str("</fault>");
        }
    }
    out.push_str("</methodResponse>");
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Element, String> {
        self.child(name)
            .ok_or_else(|| format!("<{}> is missing <{}>", self.name, name))
    }
}

fn parse_document(input: &[u8]) -> Result<Element, String> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    fn attach(
        stack: &mut [Element],
        root: &mut Option<Element>,
        element: Element,
    ) -> Result<(), String> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
            Ok(())
        } else if root.is_some() {
            Err("document has more than one root element".to_owned())
        } else {
            *root = Some(element);
            Ok(())
        }
    }

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("{e} at byte {}", reader.buffer_position()))?
        {
            Event::Start(start) => {
                if stack.len() >= MAX_NESTING_DEPTH {
                    return Err(format!(
                        "document nests deeper than {MAX_NESTING_DEPTH} elements"
                    ));
                }
                stack.push(Element {
                    name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                    ..Element::default()
                });
            }
            Event::Empty(empty) => {
                let element = Element {
                    name: String::from_utf8_lossy(empty.name().as_ref()).into_owned(),
                    ..Element::default()
                };
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or("unexpected closing tag")?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err("text outside of the root element".to_owned()),
                }
            }
            Event::CData(data) => {
                let bytes = data.into_inner();
                let text = std::str::from_utf8(&bytes).map_err(|e| e.to_string())?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(format!("unexpected end of document inside <{}>", open.name));
    }
    root.ok_or_else(|| "empty document".to_owned())
}

fn decode_value(value: &Element) -> Result<Value, String> {
    let typed = match value.children.as_slice() {
        [] => return Ok(Value::String(value.text.clone())),
        [typed] => typed,
        _ => return Err("<value> holds more than one element".to_owned()),
    };
    let text = typed.text.as_str();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("invalid int '{text}': {e}")),
        "double" => match text.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Value::Double(n)),
            Ok(_) => Err(format!("non-finite double '{text}'")),
            Err(e) => Err(format!("invalid double '{text}': {e}")),
        },
        "string" => Ok(Value::String(text.to_owned())),
        "boolean" => match text.trim() {
            "1" => Ok(Value::Boolean(true)),
            "0" => Ok(Value::Boolean(false)),
            other => Err(format!("invalid boolean '{other}'")),
        },
        "array" => typed
            .require("data")?
            .children
            .iter()
            .filter(|c| c.name == "value")
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.require("name")?.text.clone();
                let member_value = decode_value(member.require("value")?)?;
                members.insert(name, member_value);
            }
            Ok(Value::Struct(members))
        }
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact.as_bytes())
                .map(Value::Base64)
                .map_err(|e| format!("invalid base64: {e}"))
        }
        "dateTime.iso8601" => NaiveDateTime::parse_from_str(text.trim(), DATETIME_FORMAT)
            .map(Value::DateTime)
            .map_err(|e| format!("invalid dateTime.iso8601 '{text}': {e}")),
        other => Err(format!("unrecognized value type <{other}>")),
    }
}

fn decode_params(root: &Element) -> Result<Vec<Value>, String> {
    let Some(params) = root.child("params") else {
        return Ok(Vec::new());
    };
    params
        .children
        .iter()
        .filter(|c| c.name == "param")
        .map(|param| decode_value(param.require("value")?))
        .collect()
}

fn parse_call(body: &[u8]) -> Result<MethodCall, String> {
    let root = parse_document(body)?;
    if root.name != "methodCall" {
        return Err(format!("expected <methodCall>, found <{}>", root.name));
    }
    let method_name = root.require("methodName")?.text.trim().to_owned();
    if method_name.is_empty() {
        return Err("<methodName> is empty".to_owned());
    }
    Ok(MethodCall {
        method_name,
        params: decode_params(&root)?,
    })
}

fn parse_fault(fault: &Element) -> Result<Fault, String> {
    let value = decode_value(fault.require("value")?)?;
    let members = value.as_struct().ok_or("fault value is not a struct")?;
    let code = members
        .get("faultCode")
        .and_then(Value::as_i64)
        .ok_or("fault has no integer faultCode")?;
    let message = members
        .get("faultString")
        .and_then(Value::as_str)
        .ok_or("fault has no faultString")?;
    let code = i32::try_from(code).map_err(|_| format!("faultCode {code} out of range"))?;
    Ok(Fault::new(code, message))
}

fn parse_response(body: &[u8]) -> Result<MethodResponse, String> {
    let root = parse_document(body)?;
    if root.name != "methodResponse" {
        return Err(format!("expected <methodResponse>, found <{}>", root.name));
    }
    match (root.child("params"), root.child("fault")) {
        (Some(_), Some(_)) => Err("response carries both params and a fault".to_owned()),
        (None, Some(fault)) => parse_fault(fault).map(MethodResponse::Fault),
        (Some(_), None) => {
            let mut values = decode_params(&root)?;
            if values.len() != 1 {
                return Err(format!("response carries {} values, expected 1", values.len()));
            }
            Ok(MethodResponse::Success(values.remove(0)))
        }
        (None, None) => Err("response carries neither params nor a fault".to_owned()),
    }
}

/// Parse a `methodCall` document
///
/// # Errors
///
/// [`RpcError::MalformedRequest`] when the document is not well-formed, the
/// root is not `methodCall`, `methodName` is missing, or a value is invalid.
pub fn decode_call(body: &[u8]) -> Result<MethodCall, RpcError> {
    parse_call(body).map_err(RpcError::MalformedRequest)
}

/// Parse a `methodResponse` document
///
/// # Errors
///
/// [`RpcError::BadResponse`] for anything that is not exactly one value or
/// one well-formed fault.
pub fn decode_response(body: &[u8]) -> Result<MethodResponse, RpcError> {
    parse_response(body).map_err(RpcError::BadResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn round_trip(value: Value) {
        let call = MethodCall::new("echo", vec![value.clone()]);
        let decoded = decode_call(encode_call(&call).as_bytes()).unwrap();
        assert_eq!(decoded.params, vec![value]);
    }

    #[test]
    fn test_every_tag_survives_the_wire() {
        let dt = NaiveDate::from_ymd_opt(1998, 7, 17)
            .unwrap()
            .and_hms_opt(14, 8, 55)
            .unwrap();
        let mut members = BTreeMap::new();
        members.insert("a".to_owned(), Value::Int(1));
        members.insert("b & c".to_owned(), Value::Array(vec![Value::Boolean(false)]));

        round_trip(Value::Int(-42));
        round_trip(Value::Double(2.5));
        round_trip(Value::String("<tag> & \"quotes\"".to_owned()));
        round_trip(Value::Boolean(true));
        round_trip(Value::Array(vec![Value::Int(1), Value::from("two")]));
        round_trip(Value::Struct(members));
        round_trip(Value::Base64(vec![0, 1, 2, 255]));
        round_trip(Value::DateTime(dt));
    }

    #[test]
    fn test_datetime_wire_format() {
        let dt = NaiveDate::from_ymd_opt(1998, 7, 17)
            .unwrap()
            .and_hms_opt(14, 8, 55)
            .unwrap();
        let xml = encode_call(&MethodCall::new("t", vec![Value::DateTime(dt)]));
        assert!(xml.contains("<dateTime.iso8601>19980717T14:08:55</dateTime.iso8601>"));
    }

    #[test]
    fn test_decode_accepts_integer_aliases_and_untyped_strings() {
        let body = br#"<?xml version="1.0"?>
            <methodCall>
              <methodName>sample.add</methodName>
              <params>
                <param><value><i4>41</i4></value></param>
                <param><value><i8>9000000000</i8></value></param>
                <param><value>plain text</value></param>
              </params>
            </methodCall>"#;
        let call = decode_call(body).unwrap();
        assert_eq!(call.method_name, "sample.add");
        assert_eq!(
            call.params,
            vec![
                Value::Int(41),
                Value::Int(9_000_000_000),
                Value::String("plain text".to_owned())
            ]
        );
    }

    #[test]
    fn test_missing_params_is_empty_argument_list() {
        let body = b"<methodCall><methodName>system.listMethods</methodName></methodCall>";
        let call = decode_call(body).unwrap();
        assert!(call.params.is_empty());
    }

    #[test]
    fn test_malformed_calls() {
        let cases: [&[u8]; 5] = [
            b"<methodCall><methodName>x</methodName>",
            b"<notACall><methodName>x</methodName></notACall>",
            b"<methodCall><params/></methodCall>",
            b"<methodCall><methodName>x</methodName><params><param><value><float>1</float></value></param></params></methodCall>",
            b"",
        ];
        for body in cases {
            let err = decode_call(body).unwrap_err();
            assert!(
                matches!(err, RpcError::MalformedRequest(_)),
                "unexpected {err:?} for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_fault_response() {
        let response = MethodResponse::Fault(Fault::new(Fault::METHOD_NOT_FOUND, "no such method"));
        let xml = encode_response(&response);
        assert!(xml.contains("<fault>"));
        assert!(!xml.contains("<params>"));
        assert_eq!(decode_response(xml.as_bytes()).unwrap(), response);
    }

    #[test]
    fn test_success_response() {
        let response = MethodResponse::Success(Value::Int(5));
        let xml = encode_response(&response);
        assert!(!xml.contains("<fault>"));
        assert_eq!(decode_response(xml.as_bytes()).unwrap(), response);
    }

    #[test]
    fn test_malformed_response_is_bad_response() {
        let err = decode_response(b"<methodResponse></methodResponse>").unwrap_err();
        assert!(matches!(err, RpcError::BadResponse(_)));
        let err = decode_response(b"not xml at all <").unwrap_err();
        assert!(matches!(err, RpcError::BadResponse(_)));
    }

    #[test]
    fn test_fault_code_mapping() {
        let err: RpcError = Fault::new(Fault::INVALID_REQUEST, "x").into();
        assert!(matches!(err, RpcError::BadRequest(_)));
        let err: RpcError = Fault::new(4, "custom").into();
        assert_eq!(err, RpcError::Fault(Fault::new(4, "custom")));
        assert_eq!(
            Fault::from(&RpcError::UnsupportedMethod("m".into())).code,
            Fault::METHOD_NOT_FOUND
        );
    }

    fn nested_call(levels: usize) -> String {
        let mut body = String::from("<methodCall><methodName>deep</methodName><params><param>");
        body.push_str(&"<value><array><data>".repeat(levels));
        body.push_str("<value><int>1</int></value>");
        body.push_str(&"</data></array></value>".repeat(levels));
        body.push_str("</param></params></methodCall>");
        body
    }

    #[test]
    fn test_deeply_nested_call_is_rejected() {
        let err = decode_call(nested_call(10_000).as_bytes()).unwrap_err();
        match err {
            RpcError::MalformedRequest(msg) => assert!(msg.contains("nests deeper"), "{msg}"),
            other => panic!("expected MalformedRequest, got {other:?}"),
        }

        let mut response = String::from("<methodResponse><params><param>");
        response.push_str(&"<value><struct><member><name>k</name>".repeat(10_000));
        let err = decode_response(response.as_bytes()).unwrap_err();
        assert!(matches!(err, RpcError::BadResponse(_)));
    }

    #[test]
    fn test_reasonable_nesting_still_decodes() {
        let call = decode_call(nested_call(30).as_bytes()).unwrap();
        let mut value = &call.params[0];
        let mut levels = 0;
        while let Value::Array(items) = value {
            value = &items[0];
            levels += 1;
        }
        assert_eq!(levels, 30);
        assert_eq!(value, &Value::Int(1));
    }

    #[test]
    fn test_non_finite_double_is_rejected() {
        for text in ["NaN", "inf", "-infinity"] {
            let body = format!(
                "<methodCall><methodName>x</methodName><params><param><value><double>{text}</double></value></param></params></methodCall>"
            );
            assert!(
                matches!(decode_call(body.as_bytes()), Err(RpcError::MalformedRequest(_))),
                "{text}"
            );
        }
    }
}
