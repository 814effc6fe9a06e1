//! JSON-RPC 2.0 wire types and the message codec.
//!
//! Requests are always encoded with a string `id`. Inbound messages decode
//! into a single [`Envelope`] type whose optional fields decide whether the
//! message is a call response, a subscription notification, or neither.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use uuid::Uuid;

use crate::error::TransportError;
use crate::methods::VM_EXECUTION_ERROR_CODE;

/// The only protocol version spoken on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC parameter value.
pub type RpcParam = Value;

/// Generate a fresh correlation id.
///
/// Random 63-bit value rendered as lowercase hex. Unique among outstanding
/// calls in practice; no global uniqueness is promised.
pub fn new_id() -> String {
    let bits = (Uuid::new_v4().as_u128() >> 65) as u64;
    format!("{bits:x}")
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<RpcParam>,
    pub id: String,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<RpcParam>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Create a request under a freshly generated id.
    pub fn with_new_id(method: impl Into<String>, params: Vec<RpcParam>) -> Self {
        Self::new(new_id(), method, params)
    }

    /// Serialize into the wire's object form.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Encode `method`, `params` and `id` as one wire request.
pub fn encode(method: &str, params: &[RpcParam], id: &str) -> Result<Vec<u8>, TransportError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        jsonrpc: &'a str,
        method: &'a str,
        params: &'a [RpcParam],
        id: &'a str,
    }
    Ok(serde_json::to_vec(&Borrowed {
        jsonrpc: JSONRPC_VERSION,
        method,
        params,
        id,
    })?)
}

/// Encode an ordered sequence of requests as one wire batch (JSON array).
pub fn encode_batch(requests: &[JsonRpcRequest]) -> Result<Vec<u8>, TransportError> {
    Ok(serde_json::to_vec(requests)?)
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Human-readable rendering of `data`: strings verbatim, other JSON as text.
    pub fn details(&self) -> String {
        match &self.data {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// What an inbound message turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Answer to a call; carries a usable `id` and no `method`.
    Response,
    /// Server push; carries a `method` and no `id`.
    Notification,
    /// Neither of the above. Logged and dropped by consumers.
    Unrecognized,
}

/// A decoded inbound message.
///
/// `result` distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(Value::Null)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// The exact bytes this envelope was decoded from.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// The correlation id, if it is usable for matching.
    ///
    /// Empty strings and ids that look like object/array literals are not.
    pub fn valid_id(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) if !s.is_empty() && !s.starts_with(['{', '[']) => {
                Some(s.clone())
            }
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn id_is_empty(&self) -> bool {
        match &self.id {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    fn method_name(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }

    pub fn is_response(&self) -> bool {
        self.valid_id().is_some() && self.method_name().is_empty() && self.params.is_none()
    }

    pub fn is_notification(&self) -> bool {
        self.id_is_empty() && !self.method_name().is_empty()
    }

    /// Classify the envelope. At most one of response/notification holds.
    pub fn kind(&self) -> MessageKind {
        if self.is_response() {
            MessageKind::Response
        } else if self.is_notification() {
            MessageKind::Notification
        } else {
            MessageKind::Unrecognized
        }
    }

    /// Parse the `{subscription, result}` params of a notification.
    pub fn notification(&self) -> Result<Notification, TransportError> {
        let params = self
            .params
            .clone()
            .ok_or_else(|| TransportError::Protocol("notification without params".into()))?;
        let notification: Notification = serde_json::from_value(params)
            .map_err(|e| TransportError::Protocol(format!("invalid subscription message: {e}")))?;
        if notification.subscription.is_empty() {
            return Err(TransportError::Protocol("notification without subscription id".into()));
        }
        Ok(notification)
    }

    /// Turn the envelope into its result value, translating node errors.
    ///
    /// A `null` result is [`TransportError::NilResult`]; error code
    /// `-32015` is [`TransportError::VmExecution`].
    pub fn into_result(self) -> Result<Value, TransportError> {
        if matches!(self.result, Some(Value::Null)) {
            return Err(TransportError::NilResult);
        }
        if let Some(err) = self.error {
            if err.code == VM_EXECUTION_ERROR_CODE {
                return Err(TransportError::VmExecution {
                    code: err.code,
                    details: err.details(),
                });
            }
            return Err(TransportError::Rpc(err));
        }
        self.result.ok_or_else(|| {
            TransportError::Protocol("response carries neither result nor error".into())
        })
    }

    /// [`into_result`](Self::into_result), then deserialize into `T`.
    pub fn decode_result<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        let value = self.into_result()?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Classify a decoded envelope.
pub fn classify(envelope: &Envelope) -> MessageKind {
    envelope.kind()
}

/// Decode a single structured object, keeping the original bytes.
pub fn decode(bytes: &[u8]) -> Result<Envelope, TransportError> {
    let mut envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| TransportError::Protocol(format!("decode rpc message: {e}")))?;
    envelope.raw = bytes.to_vec();
    Ok(envelope)
}

/// Decode a batch payload, preserving wire array order.
///
/// A lone object (some nodes answer a whole batch with one error) decodes
/// to a single-element vector.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Envelope>, TransportError> {
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first != Some(&b'[') {
        return decode(bytes).map(|env| vec![env]);
    }
    let elements: Vec<&RawValue> = serde_json::from_slice(bytes)
        .map_err(|e| TransportError::Protocol(format!("decode rpc batch: {e}")))?;
    elements
        .into_iter()
        .map(|raw| decode(raw.get().as_bytes()))
        .collect()
}

/// Server-issued subscription id (distinct namespace from call ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Params of a subscription notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub subscription: String,
    #[serde(default)]
    pub result: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_decode_round_trip() {
        let params = vec![json!("0xabc"), json!(true)];
        let bytes = encode("eth_getBlockByNumber", &params, "7f").unwrap();
        let back: JsonRpcRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.jsonrpc, "2.0");
        assert_eq!(back.method, "eth_getBlockByNumber");
        assert_eq!(back.params, params);
        assert_eq!(back.id, "7f");
    }

    #[test]
    fn request_serialization_shape() {
        let req = JsonRpcRequest::new("1", "eth_blockNumber", vec![]);
        let json = String::from_utf8(req.encode().unwrap()).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"params\":[]"));
        assert!(json.contains("\"id\":\"1\""));
    }

    #[test]
    fn batch_encodes_as_array_in_order() {
        let reqs = vec![
            JsonRpcRequest::new("a", "m1", vec![]),
            JsonRpcRequest::new("b", "m2", vec![]),
        ];
        let v: Value = serde_json::from_slice(&encode_batch(&reqs).unwrap()).unwrap();
        assert_eq!(v[0]["id"], "a");
        assert_eq!(v[1]["method"], "m2");
    }

    #[test]
    fn new_ids_are_hex_and_distinct() {
        let a = new_id();
        let b = new_id();
        assert!(!a.is_empty());
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn classify_response() {
        let env = decode(br#"{"jsonrpc":"2.0","id":"1","result":"0x1"}"#).unwrap();
        assert_eq!(classify(&env), MessageKind::Response);
        assert_eq!(env.valid_id().as_deref(), Some("1"));
    }

    #[test]
    fn classify_notification() {
        let env = decode(
            br#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xs","result":{"number":"0x1"}}}"#,
        )
        .unwrap();
        assert_eq!(env.kind(), MessageKind::Notification);
        let n = env.notification().unwrap();
        assert_eq!(n.subscription, "0xs");
        assert_eq!(n.result["number"], "0x1");
    }

    #[test]
    fn classify_unrecognized() {
        // object-literal id
        let env = decode(br#"{"jsonrpc":"2.0","id":"{x}","result":1}"#).unwrap();
        assert_eq!(env.kind(), MessageKind::Unrecognized);
        // both id and method
        let env = decode(br#"{"jsonrpc":"2.0","id":"1","method":"foo"}"#).unwrap();
        assert_eq!(env.kind(), MessageKind::Unrecognized);
        // nothing at all
        let env = decode(br#"{"jsonrpc":"2.0"}"#).unwrap();
        assert_eq!(env.kind(), MessageKind::Unrecognized);
    }

    #[test]
    fn null_result_is_nil() {
        let env = decode(br#"{"jsonrpc":"2.0","id":"1","result":null}"#).unwrap();
        assert!(matches!(env.into_result(), Err(TransportError::NilResult)));
    }

    #[test]
    fn absent_result_is_protocol_error() {
        let env = decode(br#"{"jsonrpc":"2.0","id":"1"}"#).unwrap();
        assert!(matches!(env.into_result(), Err(TransportError::Protocol(_))));
    }

    #[test]
    fn vm_execution_error_code() {
        let env = decode(
            br#"{"jsonrpc":"2.0","id":"1","error":{"code":-32015,"message":"VM execution error.","data":"Reverted 0x08c3"}}"#,
        )
        .unwrap();
        match env.into_result() {
            Err(TransportError::VmExecution { code, details }) => {
                assert_eq!(code, -32015);
                assert_eq!(details, "Reverted 0x08c3");
            }
            other => panic!("expected VmExecution, got {other:?}"),
        }
    }

    #[test]
    fn generic_rpc_error() {
        let env = decode(
            br#"{"jsonrpc":"2.0","id":"1","error":{"code":-32000,"message":"execution reverted"}}"#,
        )
        .unwrap();
        match env.into_result() {
            Err(TransportError::Rpc(e)) => {
                assert_eq!(e.code, -32000);
                assert_eq!(e.message, "execution reverted");
                assert!(e.data.is_none());
            }
            other => panic!("expected Rpc, got {other:?}"),
        }
    }

    #[test]
    fn decode_result_into_type() {
        let env = decode(br#"{"jsonrpc":"2.0","id":"1","result":["0x1","0x2"]}"#).unwrap();
        let v: Vec<String> = env.decode_result().unwrap();
        assert_eq!(v, vec!["0x1".to_string(), "0x2".to_string()]);
    }

    #[test]
    fn decode_keeps_raw_bytes() {
        let raw = br#"{"jsonrpc":"2.0","id":"1","result":"0x1"}"#;
        assert_eq!(decode(raw).unwrap().raw, raw.to_vec());
    }

    #[test]
    fn decode_batch_preserves_order() {
        let raw = br#"[{"jsonrpc":"2.0","id":"b","result":2},{"jsonrpc":"2.0","id":"a","result":1}]"#;
        let envs = decode_batch(raw).unwrap();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0].valid_id().as_deref(), Some("b"));
        assert_eq!(envs[1].valid_id().as_deref(), Some("a"));
        assert_eq!(envs[1].raw, br#"{"jsonrpc":"2.0","id":"a","result":1}"#.to_vec());
    }

    #[test]
    fn decode_batch_accepts_single_object() {
        let envs = decode_batch(b" {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":1}").unwrap();
        assert_eq!(envs.len(), 1);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(TransportError::Protocol(_))));
        assert!(decode_batch(b"[1,").is_err());
    }
}
