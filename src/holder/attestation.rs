use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::core::{
    credential::Credential, credential_format::CredentialFormat, identifier::Identifier,
    util::with_retries,
};
use crate::error::Error;

/// Credential type of the attestation that onboards a holder.
pub const ATTESTATION_CREDENTIAL_TYPE: &str = "VerifiableAuthorisationToOnboard";

/// Authorization request asking a credential issuer for an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationAuthRequest {
    pub credential_issuer: Url,
    pub credential_type: String,
    pub formats: Vec<CredentialFormat>,
    /// The holder DID, acting as client of the issuer.
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
}

impl AttestationAuthRequest {
    pub fn new(credential_issuer: Url, identifier: &Identifier) -> Self {
        Self {
            credential_issuer,
            credential_type: ATTESTATION_CREDENTIAL_TYPE.into(),
            formats: vec![CredentialFormat::JwtVc],
            client_id: identifier.did.clone(),
            redirect_uri: None,
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    /// Authorization endpoint url of the issuer, `{credential_issuer}/authorize?...`.
    pub fn to_url(&self) -> anyhow::Result<Url> {
        let authorization_details = json!([{
            "type": "openid_credential",
            "format": self.formats.first().map(|f| f.designation().to_string()),
            "types": ["VerifiableCredential", "VerifiableAttestation", self.credential_type],
            "locations": [self.credential_issuer.as_str()]
        }]);

        let mut url = self.credential_issuer.clone();
        url.path_segments_mut()
            .map_err(|_| {
                anyhow!(
                    "credential issuer '{}' cannot be a base",
                    self.credential_issuer
                )
            })?
            .pop_if_empty()
            .push("authorize");

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("scope", "openid")
                .append_pair("client_id", &self.client_id)
                .append_pair(
                    "authorization_details",
                    &serde_json::to_string(&authorization_details)
                        .context("unable to serialize authorization_details")?,
                );
            if let Some(redirect_uri) = &self.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri.as_str());
            }
        }

        Ok(url)
    }
}

/// Credentials issued in answer to an [AttestationAuthRequest].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub credentials: Vec<Credential>,
}

/// Credential issuer collaborator running the issuance protocol.
///
/// Implementations report network failures as [Error::Transport] so that the
/// bootstrap may be retried.
#[async_trait]
pub trait AttestationIssuer {
    async fn request_attestation(
        &self,
        request: &AttestationAuthRequest,
    ) -> crate::Result<AttestationResponse>;
}

/// Obtain an attestation credential for `identifier`.
///
/// Each attempt waits at most the configured attestation timeout. Timeouts,
/// empty responses and transport failures are retried within the attestation
/// retry budget.
pub async fn bootstrap_attestation<A: AttestationIssuer + ?Sized>(
    attestation_issuer: &A,
    credential_issuer: Option<&Url>,
    identifier: &Identifier,
    redirect_uri: Option<&Url>,
    config: &Config,
) -> crate::Result<Credential> {
    let credential_issuer = match credential_issuer {
        Some(issuer) => issuer.clone(),
        None => config.default_attestation_issuer()?,
    };
    let timeout = config.attestation_timeout();

    let credential_issuer = &credential_issuer;
    with_retries(&config.attestation.retry, "attestation bootstrap", |attempt| async move {
        let mut request = AttestationAuthRequest::new(credential_issuer.clone(), identifier);
        if let Some(redirect_uri) = redirect_uri {
            request = request.with_redirect_uri(redirect_uri.clone());
        }

        info!(
            issuer = %credential_issuer,
            holder = %identifier.did,
            attempt,
            "requesting attestation credential"
        );
        let response =
            tokio::time::timeout(timeout, attestation_issuer.request_attestation(&request))
                .await
                .map_err(|_| Error::AttestationTimeout(timeout))??;

        response
            .credentials
            .into_iter()
            .next()
            .ok_or_else(|| Error::AttestationEmpty {
                issuer: credential_issuer.clone(),
            })
    })
    .await
}
