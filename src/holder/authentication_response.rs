use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::core::{
    credential::{Credential, CredentialFilter, CredentialStore},
    presentation_definition::PresentationDefinitionWithLocation,
    response::{
        deliver_authorization_response,
        parameters::{AuthenticationResponsePayload, ResponseSignerOpts},
    },
};
use crate::error::Error;
use crate::session::{Session, SessionRegistry};
use crate::wallet::Wallet;

use super::{
    identifier_selector::{select_identifier, SelectionHints},
    matcher::{filter, filter_against_all, FilterResult},
    proof::ProofOptions,
    verifiable_presentation_builder::build,
};

/// Kind of relying party connection a response is sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "SIOPv2+OpenID4VP")]
    SiopV2OpenId4Vp,
    #[serde(rename = "OpenID4VCI")]
    OpenId4Vci,
    #[serde(rename = "DIDComm")]
    DidComm,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::SiopV2OpenId4Vp => write!(f, "SIOPv2+OpenID4VP"),
            ConnectionType::OpenId4Vci => write!(f, "OpenID4VCI"),
            ConnectionType::DidComm => write!(f, "DIDComm"),
        }
    }
}

/// Credentials the user picked for one definition of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsWithDefinition {
    pub definition: PresentationDefinitionWithLocation,
    pub credentials: Vec<Credential>,
}

#[derive(Debug, Clone)]
pub struct AuthorizationResponseArgs {
    pub session_id: Uuid,
    pub connection_type: ConnectionType,
    /// When absent, held credentials are looked up and filtered against every
    /// definition of the session.
    pub credentials_with_definitions: Option<Vec<CredentialsWithDefinition>>,
}

impl AuthorizationResponseArgs {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            connection_type: ConnectionType::SiopV2OpenId4Vp,
            credentials_with_definitions: None,
        }
    }

    pub fn with_credentials(
        mut self,
        credentials_with_definitions: Vec<CredentialsWithDefinition>,
    ) -> Self {
        self.credentials_with_definitions = Some(credentials_with_definitions);
        self
    }
}

/// Answer the authorization request of a registered session with a direct response.
///
/// The session is removed once the response has been dispatched.
pub async fn send_authorization_response<W: Wallet + ?Sized>(
    wallet: &W,
    args: AuthorizationResponseArgs,
) -> crate::Result<Option<Url>> {
    if args.connection_type != ConnectionType::SiopV2OpenId4Vp {
        return Err(anyhow!("connection type {} is not supported", args.connection_type).into());
    }

    let session = wallet
        .sessions()
        .get_session(args.session_id)
        .await?
        .ok_or_else(|| anyhow!("session {} not found", args.session_id))?;
    let return_uri = session
        .authorization_request
        .as_ref()
        .and_then(|request| request.return_uri())
        .cloned()
        .ok_or_else(|| anyhow!("session {} has no response_uri or redirect_uri", session.id))?;

    let payload = if session.presentation_definitions.is_empty() {
        id_token_only_payload(wallet, &session).await?
    } else {
        presentation_payload(wallet, &session, args.credentials_with_definitions).await?
    };

    let delivered =
        deliver_authorization_response(wallet.http_client(), &return_uri, &payload).await;
    let removed = wallet.sessions().remove_session(session.id).await;

    let redirection = delivered?;
    removed?;
    Ok(redirection.map(|redirection| redirection.redirect_uri))
}

async fn id_token_only_payload<W: Wallet + ?Sized>(
    wallet: &W,
    session: &Session,
) -> crate::Result<AuthenticationResponsePayload> {
    let identifier = select_identifier(
        session,
        &SelectionHints::default(),
        wallet.identifiers(),
        wallet.config(),
    )
    .await?;
    info!(session = %session.id, did = %identifier.did, "responding without presentation");

    Ok(AuthenticationResponsePayload {
        verifiable_presentations: Vec::new(),
        presentation_submission: None,
        response_signer_opts: ResponseSignerOpts {
            kid: identifier.authentication_key().map(|key| key.kid.clone()),
            did: identifier.did,
        },
    })
}

async fn presentation_payload<W: Wallet + ?Sized>(
    wallet: &W,
    session: &Session,
    supplied: Option<Vec<CredentialsWithDefinition>>,
) -> crate::Result<AuthenticationResponsePayload> {
    let now = OffsetDateTime::now_utc();

    let (definitions, results) = match supplied {
        Some(supplied) => {
            let results = supplied
                .iter()
                .map(|pick| filter(&pick.definition.definition, &pick.credentials, now))
                .collect::<Vec<_>>();
            let definitions = supplied.into_iter().map(|pick| pick.definition).collect();
            (definitions, results)
        }
        None => {
            let held = wallet
                .credentials()
                .lookup_credentials(&CredentialFilter::default())
                .await?;
            let results = filter_against_all(&session.presentation_definitions, &held, now);
            (session.presentation_definitions.clone(), results)
        }
    };

    let (definition, result) = single_presentation(definitions, results)?;

    let hints = SelectionHints::from_presented(&result.filtered_credentials);
    let identifier =
        select_identifier(session, &hints, wallet.identifiers(), wallet.config()).await?;

    let proof = ProofOptions::for_session(session, now - wallet.config().created_backdate())?;
    debug!(
        session = %session.id,
        domain = %proof.domain,
        challenge = %proof.challenge,
        "proof options assembled"
    );

    let built = build(
        &definition.definition,
        &result,
        &identifier,
        proof,
        wallet.signer(),
    )
    .await?;

    Ok(AuthenticationResponsePayload {
        verifiable_presentations: vec![built.signed.into()],
        presentation_submission: Some(built.presentation_submission),
        response_signer_opts: ResponseSignerOpts {
            kid: identifier.authentication_key().map(|key| key.kid.clone()),
            did: identifier.did,
        },
    })
}

/// A response carries exactly one presentation.
fn single_presentation(
    definitions: Vec<PresentationDefinitionWithLocation>,
    results: Vec<FilterResult>,
) -> crate::Result<(PresentationDefinitionWithLocation, FilterResult)> {
    if results.len() != 1 {
        return Err(Error::PresentationCount(results.len()));
    }

    definitions
        .into_iter()
        .zip(results)
        .next()
        .ok_or(Error::PresentationCount(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::core::presentation_definition::PresentationDefinition;

    #[test]
    fn connection_type_names() {
        assert_eq!(
            serde_json::to_value(ConnectionType::SiopV2OpenId4Vp).unwrap(),
            json!("SIOPv2+OpenID4VP")
        );
        assert_eq!(ConnectionType::DidComm.to_string(), "DIDComm");
    }

    #[test]
    fn more_than_one_presentation_is_refused() {
        let definitions: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|id| {
                PresentationDefinitionWithLocation::top_level(PresentationDefinition::informational(
                    id.into(),
                ))
            })
            .collect();
        let results = definitions
            .iter()
            .map(|d| filter(&d.definition, &[], OffsetDateTime::now_utc()))
            .collect();

        let err = single_presentation(definitions, results).unwrap_err();
        assert!(matches!(err, Error::PresentationCount(2)));

        let err = single_presentation(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::PresentationCount(0)));
    }
}
