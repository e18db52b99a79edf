#![allow(dead_code)]

use std::{collections::HashMap, sync::Mutex};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use http::{Request, Response, StatusCode};
use oid4vp_op_auth::{
    config::Config,
    core::{
        credential::{Credential, CredentialFilter, CredentialStore},
        identifier::{CreateIdentifierRequest, Identifier, IdentifierManager, KeyRef, KeyType},
        util::AsyncHttpClient,
    },
    holder::{
        attestation::{AttestationAuthRequest, AttestationIssuer, AttestationResponse},
        proof::ProofOptions,
        verifiable_presentation_builder::{PresentationSigner, SignedPresentation},
    },
    session::MemoryStore,
    wallet::Wallet,
};
use serde_json::{json, Value as Json};
use tracing_subscriber::EnvFilter;

pub const HOLDER_DID: &str = "did:key:z2dmzD81cgPx8Vki7JbuuMmFYrWPgYoytykUZ3eyqht1j9Kbrbi";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A second identifier of the agent, subject of unrelated credentials.
pub const OTHER_DID: &str = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK";

pub fn holder() -> Identifier {
    Identifier::new(HOLDER_DID).with_key(format!("{HOLDER_DID}#keys-1"), KeyType::Secp256r1)
}

pub fn other_holder() -> Identifier {
    Identifier::new(OTHER_DID).with_key(format!("{OTHER_DID}#keys-1"), KeyType::Ed25519)
}

/// Unsigned compact JWT carrying `vc`.
pub fn jwt_vc(vc: Json, exp: Option<i64>) -> Credential {
    let mut claims = json!({ "iss": "did:ebsi:issuer", "sub": HOLDER_DID, "vc": vc });
    if let Some(exp) = exp {
        claims["exp"] = json!(exp);
    }
    let header = BASE64_URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","typ":"JWT"}"#);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
    Credential::jwt(format!("{header}.{payload}.c2lnbmF0dXJl"))
}

pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Answers requests from canned routes, keyed by url without query.
#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    pub fn route(self, url: &str, status: StatusCode, body: impl Into<String>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_owned(), (status, body.into()));
        self
    }

    pub fn requests_to(&self, url: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.uri.split('?').next() == Some(url))
            .map(|r| r.body.clone())
            .collect()
    }
}

#[async_trait]
impl AsyncHttpClient for MockHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let uri = request.uri().to_string();
        let key = uri.split('?').next().unwrap_or_default().to_owned();

        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method().to_string(),
            uri: uri.clone(),
            content_type: request
                .headers()
                .get("Content-Type")
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned),
            body: String::from_utf8_lossy(request.body()).into_owned(),
        });

        let Some((status, body)) = self.routes.lock().unwrap().get(&key).cloned() else {
            bail!("connection refused: {uri}")
        };

        Response::builder()
            .status(status)
            .body(body.into_bytes())
            .context("failed to build response")
    }
}

#[derive(Default)]
pub struct MockIdentifiers {
    pub known: Vec<Identifier>,
    pub created: Mutex<Vec<CreateIdentifierRequest>>,
}

#[async_trait]
impl IdentifierManager for MockIdentifiers {
    async fn resolve_identifier(&self, did: &str) -> Result<Option<Identifier>> {
        Ok(self.known.iter().find(|i| i.did == did).cloned())
    }

    async fn create_identifier(&self, request: &CreateIdentifierRequest) -> Result<Identifier> {
        self.created.lock().unwrap().push(request.clone());
        Ok(holder())
    }
}

#[derive(Default)]
pub struct MockCredentials(pub Vec<Credential>);

#[async_trait]
impl CredentialStore for MockCredentials {
    async fn lookup_credentials(&self, _filter: &CredentialFilter) -> Result<Vec<Credential>> {
        Ok(self.0.clone())
    }
}

pub struct SignCall {
    pub presentation: Json,
    pub kid: String,
    pub proof: ProofOptions,
}

/// Produces an unsigned JWT of the presentation.
#[derive(Default)]
pub struct MockSigner {
    pub calls: Mutex<Vec<SignCall>>,
}

#[async_trait]
impl PresentationSigner for MockSigner {
    async fn sign_presentation(
        &self,
        presentation: &Json,
        key: &KeyRef,
        proof: &ProofOptions,
    ) -> Result<SignedPresentation> {
        self.calls.lock().unwrap().push(SignCall {
            presentation: presentation.clone(),
            kid: key.kid.clone(),
            proof: proof.clone(),
        });

        let claims = json!({
            "iss": presentation["holder"],
            "aud": proof.domain,
            "nonce": proof.challenge,
            "vp": presentation,
        });
        Ok(SignedPresentation::Jwt(format!(
            "eyJhbGciOiJFUzI1NiJ9.{}.c2lnbmF0dXJl",
            BASE64_URL_SAFE_NO_PAD.encode(claims.to_string())
        )))
    }
}

/// Issues `credential` if any, otherwise never answers.
#[derive(Default)]
pub struct MockIssuer {
    pub credential: Option<Credential>,
    pub requests: Mutex<Vec<AttestationAuthRequest>>,
}

#[async_trait]
impl AttestationIssuer for MockIssuer {
    async fn request_attestation(
        &self,
        request: &AttestationAuthRequest,
    ) -> oid4vp_op_auth::Result<AttestationResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.credential {
            Some(credential) => Ok(AttestationResponse {
                credentials: vec![credential.clone()],
            }),
            None => std::future::pending().await,
        }
    }
}

pub struct HolderWallet {
    pub config: Config,
    pub http_client: MockHttpClient,
    pub identifiers: MockIdentifiers,
    pub credentials: MockCredentials,
    pub signer: MockSigner,
    pub attestation: MockIssuer,
    pub sessions: MemoryStore,
}

impl HolderWallet {
    pub fn new(http_client: MockHttpClient) -> Self {
        init_tracing();

        Self {
            config: Config::from_json(
                r#"{ "environment": "conformance", "discovery": { "backoff_ms": 10 } }"#,
            )
            .unwrap(),
            http_client,
            identifiers: MockIdentifiers {
                known: vec![holder()],
                ..Default::default()
            },
            credentials: MockCredentials::default(),
            signer: MockSigner::default(),
            attestation: MockIssuer::default(),
            sessions: MemoryStore::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Vec<Credential>) -> Self {
        self.credentials = MockCredentials(credentials);
        self
    }

    pub fn knowing(mut self, identifier: Identifier) -> Self {
        self.identifiers.known.push(identifier);
        self
    }

    pub fn with_attestation(mut self, credential: Credential) -> Self {
        self.attestation.credential = Some(credential);
        self
    }
}

#[async_trait]
impl Wallet for HolderWallet {
    type HttpClient = MockHttpClient;
    type Identifiers = MockIdentifiers;
    type Credentials = MockCredentials;
    type Signer = MockSigner;
    type Attestation = MockIssuer;
    type Sessions = MemoryStore;

    fn config(&self) -> &Config {
        &self.config
    }

    fn http_client(&self) -> &Self::HttpClient {
        &self.http_client
    }

    fn identifiers(&self) -> &Self::Identifiers {
        &self.identifiers
    }

    fn credentials(&self) -> &Self::Credentials {
        &self.credentials
    }

    fn signer(&self) -> &Self::Signer {
        &self.signer
    }

    fn attestation_issuer(&self) -> &Self::Attestation {
        &self.attestation
    }

    fn sessions(&self) -> &Self::Sessions {
        &self.sessions
    }
}
