use courier_core::CapabilityRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::EncryptedEnvelope;

/// Address of the shared system clock object.
pub const CLOCK_OBJECT_ID: &str = "0x6";

/// A single Move function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub type_arguments: Vec<String>,
    /// Object ids as strings, pure values as JSON.
    pub arguments: Vec<Value>,
}

impl MoveCall {
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

/// Encode bytes as a JSON array for `vector<u8>` arguments.
pub fn bytes_arg(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

/// `{package}::api::send_message(channel, cap, ciphertext, nonce, key_version, clock)`
pub fn send_message_call(package: &str, cap: &CapabilityRef, envelope: &EncryptedEnvelope) -> MoveCall {
    MoveCall {
        package: package.to_string(),
        module: "api".into(),
        function: "send_message".into(),
        type_arguments: Vec::new(),
        arguments: vec![
            Value::from(cap.channel_id.as_str()),
            Value::from(cap.object_id.as_str()),
            bytes_arg(&envelope.ciphertext),
            bytes_arg(&envelope.nonce),
            Value::from(envelope.key_version.to_string()),
            Value::from(CLOCK_OBJECT_ID),
        ],
    }
}
