use std::fmt;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::info;
use url::Url;

use crate::config::RetryConfig;

use super::{
    presentation_definition::PresentationDefinition,
    util::{get_json, with_retries, AsyncHttpClient},
};

/// Deployment of the provider APIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Pilot,
    Conformance,
}

impl Environment {
    pub fn api_base(&self) -> anyhow::Result<Url> {
        format!("https://api-{self}.ebsi.eu/")
            .parse()
            .context("invalid api base url")
    }

    /// The mock credential issuer offered by the environment, if any.
    pub fn mock_issuer(&self) -> Option<Url> {
        self.api_base()
            .ok()?
            .join("conformance/v3/issuer-mock")
            .ok()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Pilot => "pilot",
            Environment::Conformance => "conformance",
        }
        .fmt(f)
    }
}

/// Provider API hosting a discovery document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiSystem {
    #[default]
    Authorisation,
    Conformance,
}

impl fmt::Display for ApiSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiSystem::Authorisation => "authorisation",
            ApiSystem::Conformance => "conformance",
        }
        .fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WellKnownKind {
    #[default]
    OpenidConfiguration,
    OpenidCredentialIssuer,
}

impl fmt::Display for WellKnownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WellKnownKind::OpenidConfiguration => "openid-configuration",
            WellKnownKind::OpenidCredentialIssuer => "openid-credential-issuer",
        }
        .fmt(f)
    }
}

/// Location of a discovery document: `{base}{system}/{version}/.well-known/{kind}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellKnownOpts {
    pub system: ApiSystem,
    pub version: String,
    pub kind: WellKnownKind,
}

impl Default for WellKnownOpts {
    fn default() -> Self {
        Self {
            system: ApiSystem::Authorisation,
            version: "v4".into(),
            kind: WellKnownKind::OpenidConfiguration,
        }
    }
}

impl WellKnownOpts {
    pub fn url(&self, base: &Url) -> anyhow::Result<Url> {
        base.join(&format!(
            "{}/{}/.well-known/{}",
            self.system, self.version, self.kind
        ))
        .context("unable to build well-known url")
    }
}

/// OpenID provider metadata of an authorization server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl ProviderMetadata {
    pub fn presentation_definition_endpoint(&self) -> anyhow::Result<&Url> {
        self.presentation_definition_endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("'{}' has no presentation_definition_endpoint", self.issuer))
    }

    pub fn token_endpoint(&self) -> anyhow::Result<&Url> {
        self.token_endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("'{}' has no token_endpoint", self.issuer))
    }

    pub fn jwks_uri(&self) -> anyhow::Result<&Url> {
        self.jwks_uri
            .as_ref()
            .ok_or_else(|| anyhow!("'{}' has no jwks_uri", self.issuer))
    }
}

/// A JSON Web Key Set, keys are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Json>,
}

/// Fetch the discovery document of a provider API.
pub async fn fetch_well_known_metadata<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    base: &Url,
    opts: &WellKnownOpts,
    retry: &RetryConfig,
) -> crate::Result<ProviderMetadata> {
    let url = opts.url(base)?;
    let metadata: ProviderMetadata = with_retries(retry, "well-known metadata", |_| {
        get_json(http_client, &url, "well-known metadata")
    })
    .await?;
    info!(issuer = %metadata.issuer, %url, "discovered provider metadata");
    Ok(metadata)
}

/// Fetch the presentation definition the provider requires for `scope`.
pub async fn fetch_presentation_definition<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    metadata: &ProviderMetadata,
    scope: &str,
    retry: &RetryConfig,
) -> crate::Result<PresentationDefinition> {
    let mut url = metadata.presentation_definition_endpoint()?.clone();
    url.set_query(Some(&format!("scope=openid%20{scope}")));

    let definition: PresentationDefinition = with_retries(retry, "presentation definition", |_| {
        get_json(http_client, &url, "presentation definition")
    })
    .await?;
    info!(
        definition = %definition.id(),
        scope,
        descriptors = definition.input_descriptors().len(),
        "resolved presentation definition"
    );
    Ok(definition)
}

/// Fetch the key set of the authorization server.
pub async fn fetch_jwks<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    metadata: &ProviderMetadata,
    retry: &RetryConfig,
) -> crate::Result<JwkSet> {
    let url = metadata.jwks_uri()?.clone();
    with_retries(retry, "jwks", |_| get_json(http_client, &url, "jwks")).await
}
