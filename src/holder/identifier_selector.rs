use tracing::{debug, info, warn};

use crate::config::{Config, RestrictedProvider};
use crate::core::credential::Credential;
use crate::core::identifier::{is_did, Identifier, IdentifierManager};
use crate::error::Error;
use crate::session::Session;

/// Optional inputs that refine the identifier choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionHints {
    /// Subject DID of the credentials about to be presented.
    pub holder_did: Option<String>,
}

impl SelectionHints {
    pub fn holder(did: impl Into<String>) -> Self {
        Self {
            holder_did: Some(did.into()),
        }
    }

    /// Hints from the subject of the first credential to be presented.
    pub fn from_presented(credentials: &[Credential]) -> Self {
        credentials
            .first()
            .and_then(|credential| credential.to_uniform().ok())
            .and_then(|uniform| uniform.holder().map(Self::holder))
            .unwrap_or_default()
    }
}

/// The restricted provider the session's relying party belongs to, if any.
///
/// `client_id` and `redirect_uri` are inspected, `aud` only when both are absent.
fn restricted_provider<'a>(
    session: &Session,
    config: &'a Config,
) -> Option<&'a RestrictedProvider> {
    let mut hints: Vec<&str> = session
        .client_id()
        .into_iter()
        .chain(session.redirect_uri().map(url::Url::as_str))
        .collect();
    if hints.is_empty() {
        hints.extend(session.aud());
    }

    config
        .restricted_providers
        .iter()
        .find(|provider| hints.iter().any(|hint| provider.matches(hint)))
}

/// Choose the DID the response is made with.
pub async fn select_identifier<I: IdentifierManager + ?Sized>(
    session: &Session,
    hints: &SelectionHints,
    identifiers: &I,
    config: &Config,
) -> crate::Result<Identifier> {
    let mut candidates = session.supported_identifiers.clone();
    if candidates.is_empty() {
        return Err(Error::NoIdentifier);
    }

    if let Some(provider) = restricted_provider(session, config) {
        candidates.retain(|identifier| provider.allows(&identifier.did));

        if candidates.is_empty() {
            info!(
                session = %session.id,
                provider = %provider.domain_pattern,
                method = %provider.create.method,
                "no identifier accepted by the relying party, creating one"
            );
            let created = identifiers.create_identifier(&provider.create).await?;
            candidates.push(created);
        }
    }

    if let Some(aud) = session.aud().filter(|aud| is_did(aud)) {
        return match candidates.iter().find(|identifier| identifier.did == aud) {
            Some(identifier) => {
                debug!(session = %session.id, did = %aud, "identifier selected by audience");
                Ok(identifier.clone())
            }
            None => Err(Error::AudienceMismatch {
                aud: aud.to_owned(),
                candidates: candidates.into_iter().map(|i| i.did).collect(),
            }),
        };
    }

    if let Some(holder) = &hints.holder_did {
        match identifiers.resolve_identifier(holder).await {
            Ok(Some(resolved)) if candidates.iter().any(|c| c.did == resolved.did) => {
                debug!(
                    session = %session.id,
                    did = %resolved.did,
                    "identifier selected by credential holder"
                );
                return Ok(resolved);
            }
            Ok(Some(_)) => warn!(
                session = %session.id,
                did = %holder,
                "credential holder is not supported by the relying party, using the first identifier"
            ),
            Ok(None) => warn!(
                session = %session.id,
                did = %holder,
                "credential holder is not an identifier of the agent, using the first identifier"
            ),
            Err(e) => warn!(
                session = %session.id,
                did = %holder,
                "unable to resolve credential holder, using the first identifier: {e:#}"
            ),
        }
    }

    // Never empty: checked on entry, refilled on creation.
    candidates.into_iter().next().ok_or(Error::NoIdentifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::core::authorization_request::AuthorizationRequestObject;
    use crate::core::identifier::{CreateIdentifierRequest, KeyType};
    use crate::session::RequestContext;

    #[derive(Default)]
    struct Identifiers {
        known: Vec<Identifier>,
        created: Mutex<Vec<CreateIdentifierRequest>>,
    }

    #[async_trait]
    impl IdentifierManager for Identifiers {
        async fn resolve_identifier(&self, did: &str) -> anyhow::Result<Option<Identifier>> {
            if did == "did:key:broken" {
                return Err(anyhow!("resolver offline"));
            }
            Ok(self.known.iter().find(|i| i.did == did).cloned())
        }

        async fn create_identifier(
            &self,
            request: &CreateIdentifierRequest,
        ) -> anyhow::Result<Identifier> {
            self.created.lock().unwrap().push(request.clone());
            Ok(Identifier::new("did:key:zCreated")
                .with_key("did:key:zCreated#0", KeyType::Secp256r1))
        }
    }

    fn session(request: serde_json::Value, dids: &[&str]) -> Session {
        Session::new(RequestContext {
            authorization_request: Some(AuthorizationRequestObject::try_from(request).unwrap()),
            supported_identifiers: dids.iter().map(|did| Identifier::new(*did)).collect(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn no_identifier() {
        let session = session(json!({}), &[]);
        let err = select_identifier(
            &session,
            &Default::default(),
            &Identifiers::default(),
            &Config::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NoIdentifier));
    }

    #[tokio::test]
    async fn audience_must_be_a_candidate() {
        let identifiers = Identifiers::default();
        let config = Config::default();

        let selected = select_identifier(
            &session(
                json!({ "aud": "did:example:123" }),
                &["did:example:000", "did:example:123"],
            ),
            &Default::default(),
            &identifiers,
            &config,
        )
        .await
        .unwrap();
        assert_eq!(selected.did, "did:example:123");

        let err = select_identifier(
            &session(json!({ "aud": "did:example:000" }), &["did:example:123"]),
            &Default::default(),
            &identifiers,
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::AudienceMismatch { ref aud, ref candidates }
                if aud == "did:example:000" && candidates == &["did:example:123"]
        ));
    }

    #[tokio::test]
    async fn restricted_provider_creates_missing_identifier() {
        let identifiers = Identifiers::default();
        let selected = select_identifier(
            &session(
                json!({ "client_id": "https://api-conformance.ebsi.eu/conformance/v3/auth-mock" }),
                &["did:web:example.com"],
            ),
            &Default::default(),
            &identifiers,
            &Config::default(),
        )
        .await
        .unwrap();

        assert_eq!(selected.did, "did:key:zCreated");
        assert_eq!(
            *identifiers.created.lock().unwrap(),
            [RestrictedProvider::ebsi().create]
        );
    }

    #[tokio::test]
    async fn restricted_provider_keeps_allowed_methods() {
        let identifiers = Identifiers::default();
        let selected = select_identifier(
            &session(
                json!({ "redirect_uri": "https://api-pilot.ebsi.eu/authorisation/v4/direct_post" }),
                &["did:web:example.com", "did:ebsi:zfEmvX5twhXjQJiCWsukvQA"],
            ),
            &Default::default(),
            &identifiers,
            &Config::default(),
        )
        .await
        .unwrap();

        assert_eq!(selected.did, "did:ebsi:zfEmvX5twhXjQJiCWsukvQA");
        assert!(identifiers.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn holder_preference_and_fallback() {
        let holder =
            Identifier::new("did:key:holder").with_key("did:key:holder#0", KeyType::Ed25519);
        let identifiers = Identifiers {
            known: vec![holder.clone()],
            ..Default::default()
        };
        let session = session(json!({}), &["did:key:first", "did:key:holder"]);
        let config = Config::default();

        let hints = SelectionHints::holder("did:key:holder");
        let selected = select_identifier(&session, &hints, &identifiers, &config)
            .await
            .unwrap();
        assert_eq!(selected, holder);

        for hint in ["did:key:unknown", "did:key:broken"] {
            let hints = SelectionHints::holder(hint);
            let selected = select_identifier(&session, &hints, &identifiers, &config)
                .await
                .unwrap();
            assert_eq!(selected.did, "did:key:first");
        }
    }
}
