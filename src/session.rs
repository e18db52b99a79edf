use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::prelude::*;
use rand::RngCore;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::core::{
    authorization_request::{
        parameters::{Nonce, SupportedVersion},
        AuthorizationRequestObject,
    },
    identifier::Identifier,
    presentation_definition::PresentationDefinitionWithLocation,
};
use crate::error::Error;

/// What the engine is told about an interaction when it is registered.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The request of the relying party. Absent for the token exchange,
    /// which is initiated by the holder.
    pub authorization_request: Option<AuthorizationRequestObject>,
    /// Definitions obtained out of band, appended to those of the request.
    pub presentation_definitions: Vec<PresentationDefinitionWithLocation>,
    /// Identifiers of the agent the relying party is known to support.
    pub supported_identifiers: Vec<Identifier>,
    /// Overrides the versions detected from the request.
    pub versions: Option<Vec<SupportedVersion>>,
    /// Overrides the `iss` of the request.
    pub issuer: Option<String>,
}

/// Per interaction correlation object.
///
/// Immutable once created, except for the single use of its nonce.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub nonce: Nonce,
    pub authorization_request: Option<AuthorizationRequestObject>,
    pub presentation_definitions: Vec<PresentationDefinitionWithLocation>,
    pub supported_identifiers: Vec<Identifier>,
    pub versions: Vec<SupportedVersion>,
    pub issuer: Option<String>,
    nonce_consumed: AtomicBool,
}

impl Session {
    pub fn new(context: RequestContext) -> Result<Self> {
        let RequestContext {
            authorization_request,
            presentation_definitions,
            supported_identifiers,
            versions,
            issuer,
        } = context;

        let mut definitions = match &authorization_request {
            Some(request) => request.presentation_definitions()?,
            None => Vec::new(),
        };
        definitions.extend(presentation_definitions);

        let nonce = authorization_request
            .as_ref()
            .and_then(|request| request.nonce().cloned())
            .unwrap_or_else(random_nonce);

        let versions = versions.unwrap_or_else(|| match &authorization_request {
            Some(request) => request.versions(),
            None => vec![SupportedVersion::SIOPv2D11],
        });

        let issuer = issuer.or_else(|| {
            authorization_request
                .as_ref()
                .and_then(|request| request.iss().map(ToOwned::to_owned))
        });

        Ok(Self {
            id: Uuid::new_v4(),
            nonce,
            authorization_request,
            presentation_definitions: definitions,
            supported_identifiers,
            versions,
            issuer,
            nonce_consumed: AtomicBool::new(false),
        })
    }

    /// Bind the nonce to a presentation. Succeeds once per session.
    pub fn take_nonce(&self) -> crate::Result<&Nonce> {
        self.nonce_consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::NonceConsumed(self.id))?;
        Ok(&self.nonce)
    }

    pub fn is_nonce_consumed(&self) -> bool {
        self.nonce_consumed.load(Ordering::Acquire)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.authorization_request
            .as_ref()
            .and_then(AuthorizationRequestObject::client_id)
    }

    pub fn aud(&self) -> Option<&str> {
        self.authorization_request
            .as_ref()
            .and_then(AuthorizationRequestObject::aud)
    }

    pub fn redirect_uri(&self) -> Option<&url::Url> {
        self.authorization_request
            .as_ref()
            .and_then(AuthorizationRequestObject::redirect_uri)
    }
}

fn random_nonce() -> Nonce {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Nonce(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Session registration collaborator.
#[async_trait]
pub trait SessionRegistry: Debug {
    /// Create and store a session for a new interaction.
    async fn register_session(&self, context: RequestContext) -> Result<Arc<Session>>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Arc<Session>>>;

    async fn remove_session(&self, id: Uuid) -> Result<()>;
}

/// A local in-memory registry. Not for production use!
///
/// # Warning
/// This in-memory registry should only be used for test purposes, it will not work for a distributed
/// deployment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<BTreeMap<Uuid, Arc<Session>>>>,
}

#[async_trait]
impl SessionRegistry for MemoryStore {
    async fn register_session(&self, context: RequestContext) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(context)?);
        debug!(session = %session.id, "registered session");
        self.store.lock().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Arc<Session>>> {
        Ok(self.store.lock().await.get(&id).cloned())
    }

    async fn remove_session(&self, id: Uuid) -> Result<()> {
        if self.store.lock().await.remove(&id).is_some() {
            return Ok(());
        }

        bail!("session not found")
    }
}
