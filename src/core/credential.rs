use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::credential_format::{jwt_claims, CredentialFormat};

/// A held verifiable credential in its original representation.
///
/// For JWT formats the payload is the compact serialization (a JSON string),
/// for JSON-LD formats it is the credential object itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub format: CredentialFormat,
    pub payload: Json,
}

impl Credential {
    pub fn new(format: CredentialFormat, payload: Json) -> Self {
        Self { format, payload }
    }

    pub fn jwt(compact: impl Into<String>) -> Self {
        Self::new(CredentialFormat::JwtVc, Json::String(compact.into()))
    }

    pub fn ldp(document: Json) -> Self {
        Self::new(CredentialFormat::LdpVc, document)
    }

    /// Decode the credential into the format independent view.
    pub fn to_uniform(&self) -> Result<UniformCredential> {
        let document = (self.format.capabilities().decode)(&self.payload)
            .with_context(|| format!("unable to decode {} credential", self.format.designation()))?;
        let mut uniform = UniformCredential::from_document(document)?;

        if let Json::String(jwt) = &self.payload {
            uniform.envelope = Some(Json::Object(jwt_claims(jwt)?));
        }

        Ok(uniform)
    }
}

/// Format independent view of a credential, following the W3C data model.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformCredential {
    pub issuer: Option<String>,
    pub types: Vec<String>,
    pub credential_subject: Vec<Json>,
    pub expiration_date: Option<OffsetDateTime>,
    /// The whole decoded credential, used for claim path evaluation.
    pub document: Json,
    /// JWT claim set wrapping the credential, for JWT formats.
    pub envelope: Option<Json>,
}

impl UniformCredential {
    pub fn from_document(document: Json) -> Result<Self> {
        let issuer = match document.get("issuer") {
            Some(Json::String(issuer)) => Some(issuer.clone()),
            Some(Json::Object(issuer)) => issuer
                .get("id")
                .and_then(Json::as_str)
                .map(ToOwned::to_owned),
            _ => None,
        };

        let types = match document.get("type") {
            Some(Json::String(t)) => vec![t.clone()],
            Some(Json::Array(types)) => types
                .iter()
                .filter_map(Json::as_str)
                .map(ToOwned::to_owned)
                .collect(),
            _ => Vec::new(),
        };

        let credential_subject = match document.get("credentialSubject") {
            Some(Json::Array(subjects)) => subjects.clone(),
            Some(subject) => vec![subject.clone()],
            None => Vec::new(),
        };

        let expiration_date = document
            .get("expirationDate")
            .or_else(|| document.get("validUntil"))
            .and_then(Json::as_str)
            .map(|date| {
                OffsetDateTime::parse(date, &Rfc3339)
                    .with_context(|| format!("invalid expiration date '{date}'"))
            })
            .transpose()?;

        Ok(Self {
            issuer,
            types,
            credential_subject,
            expiration_date,
            document,
            envelope: None,
        })
    }

    /// Documents that constraint paths are evaluated against: the credential
    /// itself and, for JWT formats, the enclosing claim set (`$.vc...`).
    pub fn claim_documents(&self) -> impl Iterator<Item = &Json> {
        std::iter::once(&self.document).chain(self.envelope.as_ref())
    }

    /// The `id` of the first credential subject, which names the holder.
    pub fn holder(&self) -> Option<&str> {
        self.credential_subject
            .first()
            .and_then(|subject| subject.get("id"))
            .and_then(Json::as_str)
    }

    /// A credential without expiration date never expires; otherwise it must
    /// expire strictly after `now`.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expiration_date.map_or(true, |exp| exp > now)
    }
}

/// Criteria passed to the credential store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialFilter {
    /// Only credentials carrying all of these types.
    pub types: Vec<String>,
    /// Only credentials bound to this subject DID.
    pub subject: Option<String>,
}

/// Credential storage collaborator.
#[async_trait]
pub trait CredentialStore {
    async fn lookup_credentials(&self, filter: &CredentialFilter) -> Result<Vec<Credential>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn uniform_view_of_ldp_credential() {
        let credential = Credential::ldp(json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "IDCardCredential"],
            "issuer": { "id": "did:web:issuer.example.com" },
            "expirationDate": "2030-01-01T00:00:00Z",
            "credentialSubject": [{ "id": "did:key:holder" }, { "id": "did:key:other" }]
        }));

        let uniform = credential.to_uniform().unwrap();

        assert_eq!(uniform.issuer.as_deref(), Some("did:web:issuer.example.com"));
        assert_eq!(uniform.types, ["VerifiableCredential", "IDCardCredential"]);
        assert_eq!(uniform.holder(), Some("did:key:holder"));
        assert!(uniform.is_valid_at(datetime!(2029-12-31 23:59:59 UTC)));
        assert!(!uniform.is_valid_at(datetime!(2030-01-01 00:00:00 UTC)));
    }

    #[test]
    fn missing_expiration_never_expires() {
        let uniform = Credential::ldp(json!({ "credentialSubject": {} }))
            .to_uniform()
            .unwrap();
        assert!(uniform.is_valid_at(datetime!(2999-01-01 00:00:00 UTC)));
    }

    #[test]
    fn invalid_expiration_is_an_error() {
        let credential = Credential::ldp(json!({ "expirationDate": "tomorrow" }));
        assert!(credential.to_uniform().is_err());
    }
}
