use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::{
    credential::{Credential, CredentialFilter, CredentialStore},
    identifier::Identifier,
    metadata::{fetch_presentation_definition, fetch_well_known_metadata, WellKnownOpts},
    presentation_definition::PresentationDefinition,
    response::{
        parameters::{TokenRequest, TokenResponse},
        request_access_token,
    },
};
use crate::error::Error;
use crate::session::{RequestContext, Session, SessionRegistry};
use crate::wallet::Wallet;

use super::{
    attestation::bootstrap_attestation,
    identifier_selector::{select_identifier, SelectionHints},
    matcher::{filter, FilterResult},
    proof::ProofOptions,
    verifiable_presentation_builder::build,
};

/// Steps of a token exchange, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    RequestReceived,
    IdentifierSelected,
    DefinitionResolved,
    AttestationBootstrapping,
    CredentialsFiltered,
    PresentationBuilt,
    TokenRequested,
    TokenGranted,
    Failed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::RequestReceived => "request received",
            ExchangeState::IdentifierSelected => "identifier selected",
            ExchangeState::DefinitionResolved => "definition resolved",
            ExchangeState::AttestationBootstrapping => "attestation bootstrapping",
            ExchangeState::CredentialsFiltered => "credentials filtered",
            ExchangeState::PresentationBuilt => "presentation built",
            ExchangeState::TokenRequested => "token requested",
            ExchangeState::TokenGranted => "token granted",
            ExchangeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A failed token exchange.
#[derive(Debug, thiserror::Error)]
#[error("token exchange failed at step '{step}': {source}")]
pub struct ExchangeError {
    /// The last state reached before the failure.
    pub step: ExchangeState,
    /// Every state visited, ending with [ExchangeState::Failed].
    pub history: Vec<ExchangeState>,
    #[source]
    pub source: Error,
}

/// Records the states an exchange goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeTracker {
    history: Vec<ExchangeState>,
}

impl Default for ExchangeTracker {
    fn default() -> Self {
        Self {
            history: vec![ExchangeState::RequestReceived],
        }
    }
}

impl ExchangeTracker {
    pub fn state(&self) -> ExchangeState {
        self.history
            .last()
            .copied()
            .unwrap_or(ExchangeState::RequestReceived)
    }

    pub fn history(&self) -> &[ExchangeState] {
        &self.history
    }

    fn advance(&mut self, next: ExchangeState) {
        debug!(from = %self.state(), to = %next, "token exchange advanced");
        self.history.push(next);
    }

    fn fail(mut self, source: Error) -> ExchangeError {
        let step = self.state();
        warn!(%step, "token exchange failed: {source}");
        self.history.push(ExchangeState::Failed);
        ExchangeError {
            step,
            history: self.history,
            source,
        }
    }
}

/// Outcome of a successful token exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenResult {
    pub access_token_response: TokenResponse,
    pub scope: String,
    pub identifier: Identifier,
    /// Every state visited, ending with [ExchangeState::TokenGranted].
    pub history: Vec<ExchangeState>,
}

/// Inputs of [get_access_token].
#[derive(Debug, Clone)]
pub struct AccessTokenArgs {
    /// Provider scope, without the `openid` prefix.
    pub scope: String,
    pub supported_identifiers: Vec<Identifier>,
    /// Candidate credentials. Looked up in the credential store when absent.
    pub credentials: Option<Vec<Credential>>,
    /// Presented as is, without looking for held credentials or bootstrapping.
    pub attestation_credential: Option<Credential>,
    /// Issuer asked for the attestation. The configured mock issuer when absent.
    pub credential_issuer: Option<Url>,
    pub redirect_uri: Option<Url>,
    pub well_known: WellKnownOpts,
}

impl AccessTokenArgs {
    pub fn new(scope: impl Into<String>, supported_identifiers: Vec<Identifier>) -> Self {
        Self {
            scope: scope.into(),
            supported_identifiers,
            credentials: None,
            attestation_credential: None,
            credential_issuer: None,
            redirect_uri: None,
            well_known: WellKnownOpts::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Vec<Credential>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_attestation_credential(mut self, credential: Credential) -> Self {
        self.attestation_credential = Some(credential);
        self
    }

    pub fn with_credential_issuer(mut self, credential_issuer: Url) -> Self {
        self.credential_issuer = Some(credential_issuer);
        self
    }
}

/// Exchange a presentation for an access token at the authorization server of the
/// configured environment.
///
/// The exchange runs in its own session, removed once the token endpoint has answered.
pub async fn get_access_token<W: Wallet + ?Sized>(
    wallet: &W,
    args: AccessTokenArgs,
) -> Result<AccessTokenResult, ExchangeError> {
    let mut tracker = ExchangeTracker::default();

    match run(wallet, &args, &mut tracker).await {
        Ok((access_token_response, identifier)) => {
            tracker.advance(ExchangeState::TokenGranted);
            Ok(AccessTokenResult {
                access_token_response,
                scope: args.scope,
                identifier,
                history: tracker.history,
            })
        }
        Err(e) => Err(tracker.fail(e)),
    }
}

async fn run<W: Wallet + ?Sized>(
    wallet: &W,
    args: &AccessTokenArgs,
    tracker: &mut ExchangeTracker,
) -> crate::Result<(TokenResponse, Identifier)> {
    let session = wallet
        .sessions()
        .register_session(RequestContext {
            supported_identifiers: args.supported_identifiers.clone(),
            ..Default::default()
        })
        .await?;

    let exchanged = exchange(wallet, args, &session, tracker).await;
    let removed = wallet.sessions().remove_session(session.id).await;

    let exchanged = exchanged?;
    removed?;
    Ok(exchanged)
}

async fn exchange<W: Wallet + ?Sized>(
    wallet: &W,
    args: &AccessTokenArgs,
    session: &Session,
    tracker: &mut ExchangeTracker,
) -> crate::Result<(TokenResponse, Identifier)> {
    let config = wallet.config();
    let http_client = wallet.http_client();

    let mut identifier =
        select_identifier(session, &SelectionHints::default(), wallet.identifiers(), config)
            .await?;
    tracker.advance(ExchangeState::IdentifierSelected);

    let metadata = fetch_well_known_metadata(
        http_client,
        &config.well_known_base()?,
        &args.well_known,
        &config.discovery,
    )
    .await?;
    let definition =
        fetch_presentation_definition(http_client, &metadata, &args.scope, &config.discovery)
            .await?;
    tracker.advance(ExchangeState::DefinitionResolved);

    let now = OffsetDateTime::now_utc();
    let filter_result = match &args.attestation_credential {
        _ if !definition.has_input_descriptors() => filter(&definition, &[], now),
        Some(attestation) => filter(&definition, std::slice::from_ref(attestation), now),
        None => {
            let held = match &args.credentials {
                Some(credentials) => credentials.clone(),
                None => {
                    wallet
                        .credentials()
                        .lookup_credentials(&CredentialFilter::default())
                        .await?
                }
            };
            let result = filter(&definition, &held, now);

            if result.is_present() {
                result
            } else {
                tracker.advance(ExchangeState::AttestationBootstrapping);
                bootstrapped(wallet, args, &identifier, &definition, result, now).await?
            }
        }
    };
    tracker.advance(ExchangeState::CredentialsFiltered);

    let hints = SelectionHints::from_presented(&filter_result.filtered_credentials);
    if hints.holder_did.as_deref().is_some_and(|holder| holder != identifier.did) {
        identifier = select_identifier(session, &hints, wallet.identifiers(), config).await?;
        debug!(did = %identifier.did, "identifier bound to the presented credential holder");
    }

    let challenge = session.take_nonce()?.0.clone();
    let proof = ProofOptions::new(
        now - config.created_backdate(),
        metadata.issuer.clone(),
        challenge,
    );
    let built = build(&definition, &filter_result, &identifier, proof, wallet.signer()).await?;
    tracker.advance(ExchangeState::PresentationBuilt);

    let token_request = TokenRequest::new(
        &args.scope,
        &built.signed.to_vp_token(),
        &built.presentation_submission,
    )?;
    tracker.advance(ExchangeState::TokenRequested);
    let token_response =
        request_access_token(http_client, metadata.token_endpoint()?, &token_request).await?;

    info!(scope = %args.scope, did = %identifier.did, "access token obtained");
    Ok((token_response, identifier))
}

async fn bootstrapped<W: Wallet + ?Sized>(
    wallet: &W,
    args: &AccessTokenArgs,
    identifier: &Identifier,
    definition: &PresentationDefinition,
    held_result: FilterResult,
    now: OffsetDateTime,
) -> crate::Result<FilterResult> {
    info!(
        definition = %definition.id(),
        unmatched = ?held_result.unmatched_descriptors,
        "no held credential satisfies the definition, bootstrapping an attestation"
    );

    let attestation = bootstrap_attestation(
        wallet.attestation_issuer(),
        args.credential_issuer.as_ref(),
        identifier,
        args.redirect_uri.as_ref(),
        wallet.config(),
    )
    .await?;

    Ok(filter(definition, std::slice::from_ref(&attestation), now))
}
