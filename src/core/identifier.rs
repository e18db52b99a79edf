use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ssi::dids::DIDBuf;

/// A DID held by the agent, together with the keys that can act for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub did: String,
    #[serde(default)]
    pub keys: Vec<KeyRef>,
}

/// Reference to a key managed by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    /// Key id, usually a DID URL such as `did:key:z...#z...`.
    pub kid: String,
    pub key_type: KeyType,
}

impl Identifier {
    pub fn new(did: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, kid: impl Into<String>, key_type: KeyType) -> Self {
        self.keys.push(KeyRef {
            kid: kid.into(),
            key_type,
        });
        self
    }

    /// Key types this identifier can sign with.
    pub fn supported_key_types(&self) -> Vec<&KeyType> {
        self.keys.iter().map(|key| &key.key_type).collect()
    }

    /// The key used for authentication proofs.
    pub fn authentication_key(&self) -> Option<&KeyRef> {
        self.keys.first()
    }

    /// DID method name, e.g. `key` for `did:key:z...`.
    pub fn method(&self) -> Option<String> {
        DIDBuf::from_string(self.did.clone())
            .ok()
            .map(|did| did.method_name().to_owned())
    }
}

/// Whether `value` is a syntactically valid DID.
pub fn is_did(value: &str) -> bool {
    value.starts_with("did:") && DIDBuf::from_string(value.to_owned()).is_ok()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Secp256r1,
    Secp256k1,
    Ed25519,
    X25519,
    #[serde(rename = "RSA")]
    Rsa,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    Key,
    Jwk,
    Ebsi,
    Web,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for DidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DidMethod::Key => "key",
            DidMethod::Jwk => "jwk",
            DidMethod::Ebsi => "ebsi",
            DidMethod::Web => "web",
            DidMethod::Other(other) => other,
        }
        .fmt(f)
    }
}

/// Encoding of the public key inside a `did:key`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyCodec {
    #[serde(rename = "jwk_jcs-pub")]
    JwkJcsPub,
    #[serde(rename = "multicodec")]
    Multicodec,
}

/// Request to materialize a new identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIdentifierRequest {
    pub method: DidMethod,
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<KeyCodec>,
}

/// Identity-management collaborator.
///
/// Implementations own DID resolution, key storage and persistence. Duplicate
/// creation for the same method and key material must be handled here.
#[async_trait]
pub trait IdentifierManager {
    /// Look up an identifier managed by the agent.
    ///
    /// Returns `Ok(None)` when the agent does not manage `did`.
    async fn resolve_identifier(&self, did: &str) -> Result<Option<Identifier>>;

    /// Create and persist a new identifier.
    async fn create_identifier(&self, request: &CreateIdentifierRequest) -> Result<Identifier>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_detection() {
        assert!(is_did("did:example:123"));
        assert!(is_did("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"));
        assert!(!is_did("https://verifier.example.com"));
        assert!(!is_did("did:"));
    }

    #[test]
    fn method_name() {
        let identifier = Identifier::new("did:ebsi:zfEmvX5twhXjQJiCWsukvQA");
        assert_eq!(identifier.method().as_deref(), Some("ebsi"));
    }

    #[test]
    fn create_request_wire_format() {
        let request = CreateIdentifierRequest {
            method: DidMethod::Key,
            key_type: KeyType::Secp256r1,
            codec: Some(KeyCodec::JwkJcsPub),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "method": "key",
                "key_type": "Secp256r1",
                "codec": "jwk_jcs-pub"
            })
        );
    }
}
