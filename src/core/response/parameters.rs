use crate::core::object::TypedParameter;
use crate::core::presentation_submission::PresentationSubmission;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// OpenID Connect for Verifiable Presentations specification defines `vp_token` parameter:
///
/// > JSON String or JSON object that MUST contain a single Verifiable Presentation.
/// >
/// > Each Verifiable Presentation MUST be represented as a JSON string
/// > or a JSON object depending on a format.
///
/// A JWT presentation is carried as its compact serialization, a JSON-LD presentation as the
/// presentation object.
///
/// See: [OpenID.VP#section-6.1-2.2](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6.1-2.2)
#[derive(Debug, Clone, PartialEq)]
pub enum VpToken {
    Jwt(String),
    Ldp(Map<String, Json>),
}

impl TypedParameter for VpToken {
    const KEY: &'static str = "vp_token";
}

impl TryFrom<Json> for VpToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::String(s) => Ok(Self::Jwt(s)),
            Json::Object(map) => Ok(Self::Ldp(map)),
            _ => Err(Error::msg("Invalid vp_token")),
        }
    }
}

impl From<VpToken> for Json {
    fn from(value: VpToken) -> Self {
        match value {
            VpToken::Jwt(s) => Json::String(s),
            VpToken::Ldp(map) => Json::Object(map),
        }
    }
}

impl VpToken {
    /// Value of the `vp_token` form parameter.
    pub fn to_form_value(&self) -> Result<String, Error> {
        match self {
            VpToken::Jwt(jwt) => Ok(jwt.clone()),
            VpToken::Ldp(map) => serde_json::to_string(map).context("unable to serialize vp_token"),
        }
    }
}

const VP_TOKEN_GRANT: &str = "vp_token";

/// Form body of an access token request authenticated by a presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub scope: String,
    pub vp_token: String,
    /// The presentation submission, serialized as JSON.
    pub presentation_submission: String,
}

impl TokenRequest {
    /// `scope` is the provider scope without the `openid` prefix.
    pub fn new(
        scope: &str,
        vp_token: &VpToken,
        presentation_submission: &PresentationSubmission,
    ) -> Result<Self, Error> {
        Ok(Self {
            grant_type: VP_TOKEN_GRANT.into(),
            scope: format!("openid {scope}"),
            vp_token: vp_token.to_form_value()?,
            presentation_submission: serde_json::to_string(presentation_submission)
                .context("unable to serialize presentation_submission")?,
        })
    }

    pub fn to_form(&self) -> Result<String, Error> {
        serde_urlencoded::to_string(self).context("unable to encode token request")
    }
}

/// A successful token endpoint response. Only `access_token` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Key material the relying party should expect the response to be signed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSignerOpts {
    pub did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Body of a direct authorization response.
///
/// Presentations and submission are absent when the request carried no presentation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponsePayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verifiable_presentations: Vec<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,
    pub response_signer_opts: ResponseSignerOpts,
}
