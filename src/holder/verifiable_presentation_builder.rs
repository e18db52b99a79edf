use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use tracing::debug;

use crate::core::{
    credential::Credential,
    identifier::{Identifier, KeyRef},
    presentation_definition::PresentationDefinition,
    presentation_submission::PresentationSubmission,
    response::parameters::VpToken,
};
use crate::error::Error;

use super::matcher::{FilterResult, FilterStatus};
use super::proof::ProofOptions;

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";

/// Signature suite collaborator.
#[async_trait]
pub trait PresentationSigner {
    /// Sign `presentation` with `key`, embedding the proof parameters.
    async fn sign_presentation(
        &self,
        presentation: &Json,
        key: &KeyRef,
        proof: &ProofOptions,
    ) -> Result<SignedPresentation>;
}

/// A signed presentation as produced by the signature suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignedPresentation {
    /// Compact JWT.
    Jwt(String),
    /// JSON-LD presentation with an embedded proof.
    Ldp(Map<String, Json>),
}

impl SignedPresentation {
    pub fn to_vp_token(&self) -> VpToken {
        match self {
            SignedPresentation::Jwt(jwt) => VpToken::Jwt(jwt.clone()),
            SignedPresentation::Ldp(map) => VpToken::Ldp(map.clone()),
        }
    }
}

impl From<SignedPresentation> for Json {
    fn from(value: SignedPresentation) -> Self {
        match value {
            SignedPresentation::Jwt(jwt) => Json::String(jwt),
            SignedPresentation::Ldp(map) => Json::Object(map),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifiablePresentationBuilderOptions {
    pub holder: String,
    pub credentials: Vec<Credential>,
    /// Build a presentation without credentials, for definitions without
    /// input descriptors.
    pub force_no_credentials_in_vp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiablePresentationBuilder(Map<String, Json>);

impl From<VerifiablePresentationBuilder> for Json {
    fn from(builder: VerifiablePresentationBuilder) -> Self {
        Json::Object(builder.0)
    }
}

impl Default for VerifiablePresentationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifiablePresentationBuilder {
    /// Returns a presentation builder with the W3C context and type set.
    pub fn new() -> Self {
        let mut obj = Map::new();
        obj.insert("@context".into(), json!([CREDENTIALS_V1_CONTEXT]));
        obj.insert("type".into(), json!([VERIFIABLE_PRESENTATION_TYPE]));
        Self(obj)
    }

    /// Returns an unsigned presentation from options.
    ///
    /// Credentials are embedded in their original representation, in order.
    pub fn from_options(options: VerifiablePresentationBuilderOptions) -> Json {
        let credentials = if options.force_no_credentials_in_vp {
            Vec::new()
        } else {
            options.credentials
        };

        credentials
            .into_iter()
            .fold(Self::new().set_holder(options.holder), |builder, credential| {
                builder.add_credential(credential)
            })
            .with_empty_credentials()
            .build()
    }

    /// Set the holder of the presentation, the DID the proof is made with.
    pub fn set_holder(mut self, holder: String) -> Self {
        self.0.insert("holder".into(), Json::String(holder));
        self
    }

    /// Append a credential to `verifiableCredential`.
    pub fn add_credential(mut self, credential: Credential) -> Self {
        if let Json::Array(credentials) = self
            .0
            .entry("verifiableCredential")
            .or_insert_with(|| Json::Array(Vec::new()))
        {
            credentials.push(credential.payload);
        }
        self
    }

    fn with_empty_credentials(mut self) -> Self {
        self.0
            .entry("verifiableCredential")
            .or_insert_with(|| Json::Array(Vec::new()));
        self
    }

    pub fn build(self) -> Json {
        self.into()
    }
}

/// A presentation built for one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPresentation {
    pub presentation: Json,
    pub signed: SignedPresentation,
    pub presentation_submission: PresentationSubmission,
    pub proof: ProofOptions,
    pub force_no_credentials_in_vp: bool,
}

impl BuiltPresentation {
    pub fn holder(&self) -> Option<&str> {
        self.presentation.get("holder").and_then(Json::as_str)
    }
}

/// Build and sign the presentation answering `definition` with the credentials of `filter_result`.
///
/// The holder is the DID of `identifier` and the proof is made with its authentication key.
pub async fn build<S: PresentationSigner + ?Sized>(
    definition: &PresentationDefinition,
    filter_result: &FilterResult,
    identifier: &Identifier,
    proof: ProofOptions,
    signer: &S,
) -> crate::Result<BuiltPresentation> {
    if filter_result.definition_id != *definition.id() {
        return Err(anyhow!(
            "credentials were filtered against '{}', not '{}'",
            filter_result.definition_id,
            definition.id()
        )
        .into());
    }

    let force_no_credentials_in_vp =
        !definition.has_input_descriptors() || filter_result.status == FilterStatus::Informational;

    if !force_no_credentials_in_vp && filter_result.status == FilterStatus::Absent {
        return Err(Error::DefinitionUnsatisfied {
            definition_id: definition.id().clone(),
            descriptors: filter_result.unmatched_descriptors.clone(),
        });
    }

    let key = identifier
        .authentication_key()
        .ok_or_else(|| Error::MissingKey(identifier.did.clone()))?;
    let proof = match proof.verification_method {
        Some(_) => proof,
        None => proof.with_verification_method(key.kid.clone()),
    };

    let presentation =
        VerifiablePresentationBuilder::from_options(VerifiablePresentationBuilderOptions {
            holder: identifier.did.clone(),
            credentials: filter_result.filtered_credentials.clone(),
            force_no_credentials_in_vp,
        });

    let presentation_submission = if force_no_credentials_in_vp {
        PresentationSubmission::empty(definition.id().clone())
    } else {
        filter_result.to_submission()
    };

    debug!(
        holder = %identifier.did,
        definition = %definition.id(),
        credentials = filter_result.filtered_credentials.len(),
        force_no_credentials_in_vp,
        "signing presentation"
    );
    let signed = signer.sign_presentation(&presentation, key, &proof).await?;

    Ok(BuiltPresentation {
        presentation,
        signed,
        presentation_submission,
        proof,
        force_no_credentials_in_vp,
    })
}
