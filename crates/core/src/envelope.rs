//! Result envelopes: the wire shape of RPC responses.
//!
//! The default encoding is a JSON object `{"Trace", "Error", "Result"}`. An
//! application may install a [`MarshalHook`] to swap the encoding without
//! touching dispatch.

use erased_serde::Serialize as ErasedSerialize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Custom envelope encoder: `(trace, result, error) -> envelope`.
///
/// The payload arrives unconverted, so the hook may use any serde format.
pub type MarshalHook =
    Arc<dyn Fn(&str, &dyn ErasedSerialize, &str) -> Result<ProtocolMarshal, String> + Send + Sync>;

/// Decoded default envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Trace id of the originating call
    #[serde(rename = "Trace", alias = "trace", default)]
    pub trace: String,
    /// Error string; empty on success
    #[serde(rename = "Error", alias = "error", default)]
    pub error: String,
    /// Result payload
    #[serde(rename = "Result", alias = "result", default)]
    pub result: Value,
}

impl ResultEnvelope {
    /// Whether the envelope reports a failed call
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Borrowed form of [`ResultEnvelope`] used by the default encoder
#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "Trace")]
    trace: &'a str,
    #[serde(rename = "Error")]
    error: &'a str,
    #[serde(rename = "Result")]
    result: &'a T,
}

/// Opaque encoded envelope
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ProtocolMarshal {
    data: Vec<u8>,
}

impl ProtocolMarshal {
    /// Wraps already encoded bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the envelope, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Whether the envelope carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes bytes produced by the default encoder
    pub fn decode(&self) -> serde_json::Result<ResultEnvelope> {
        serde_json::from_slice(&self.data)
    }
}

impl fmt::Debug for ProtocolMarshal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolMarshal")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Builds result envelopes, delegating to a hook when one is installed
#[derive(Clone, Default)]
pub struct EnvelopeBuilder {
    hook: Option<MarshalHook>,
}

impl EnvelopeBuilder {
    /// A builder using the default JSON encoding
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder delegating every envelope to `hook`
    pub fn with_hook(hook: MarshalHook) -> Self {
        Self { hook: Some(hook) }
    }

    /// Whether a custom encoder is installed
    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Encodes `(trace, result, error)`.
    ///
    /// Never panics; a payload that cannot be serialized yields the build
    /// error string instead of an envelope.
    pub fn build<T>(&self, trace: &str, result: &T, error: &str) -> Result<ProtocolMarshal, String>
    where
        T: Serialize,
    {
        if let Some(hook) = &self.hook {
            return hook(trace, result, error);
        }

        let envelope = EnvelopeRef {
            trace,
            error,
            result,
        };
        serde_json::to_vec(&envelope)
            .map(ProtocolMarshal::new)
            .map_err(|e| e.to_string())
    }
}

impl fmt::Debug for EnvelopeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeBuilder")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
