use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::Config;
use crate::core::{
    authorization_request::AuthorizationRequestObject,
    credential::CredentialStore,
    identifier::{Identifier, IdentifierManager},
    util::AsyncHttpClient,
};
use crate::holder::{
    attestation::AttestationIssuer,
    authentication_response::{self, AuthorizationResponseArgs},
    token_exchange::{self, AccessTokenArgs, AccessTokenResult, ExchangeError},
    verifiable_presentation_builder::PresentationSigner,
};
use crate::session::{RequestContext, Session, SessionRegistry};

/// The holder agent: its collaborators and configuration.
///
/// The protocol flows are provided; implementors only wire the collaborators.
#[async_trait]
pub trait Wallet: Sync {
    type HttpClient: AsyncHttpClient + Send + Sync;
    type Identifiers: IdentifierManager + Send + Sync;
    type Credentials: CredentialStore + Send + Sync;
    type Signer: PresentationSigner + Send + Sync;
    type Attestation: AttestationIssuer + Send + Sync;
    type Sessions: SessionRegistry + Send + Sync;

    fn config(&self) -> &Config;
    fn http_client(&self) -> &Self::HttpClient;
    fn identifiers(&self) -> &Self::Identifiers;
    fn credentials(&self) -> &Self::Credentials;
    fn signer(&self) -> &Self::Signer;
    fn attestation_issuer(&self) -> &Self::Attestation;
    fn sessions(&self) -> &Self::Sessions;

    /// Register a session for a received authorization request, fetching the
    /// presentation definition passed by reference, if any.
    async fn register_request(
        &self,
        request: AuthorizationRequestObject,
        supported_identifiers: Vec<Identifier>,
    ) -> crate::Result<Arc<Session>> {
        let presentation_definitions: Vec<_> = request
            .resolve_presentation_definitions(self.http_client())
            .await?
            .into_iter()
            .skip(request.presentation_definitions()?.len())
            .collect();

        let session = self
            .sessions()
            .register_session(RequestContext {
                authorization_request: Some(request),
                presentation_definitions,
                supported_identifiers,
                ..Default::default()
            })
            .await?;
        Ok(session)
    }

    /// Answer the request of a registered session with a direct authorization response.
    ///
    /// Returns where the relying party asks the user to be redirected, if anywhere.
    async fn send_authorization_response(
        &self,
        args: AuthorizationResponseArgs,
    ) -> crate::Result<Option<Url>> {
        authentication_response::send_authorization_response(self, args).await
    }

    /// Obtain an access token from the authorization server of the configured
    /// environment, presenting credentials for `args.scope`.
    async fn get_access_token(
        &self,
        args: AccessTokenArgs,
    ) -> Result<AccessTokenResult, ExchangeError> {
        token_exchange::get_access_token(self, args).await
    }
}
