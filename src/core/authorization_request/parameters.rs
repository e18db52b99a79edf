use std::fmt;

use crate::core::object::TypedParameter;
use anyhow::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl TypedParameter for ClientId {
    const KEY: &'static str = "client_id";
}

impl TryFrom<Json> for ClientId {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<ClientId> for Json {
    fn from(value: ClientId) -> Self {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(pub String);

impl TypedParameter for Nonce {
    const KEY: &'static str = "nonce";
}

impl TryFrom<Json> for Nonce {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Nonce> for Json {
    fn from(value: Nonce) -> Self {
        Json::String(value.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `aud` of a signed request object: the party the request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audience(pub String);

impl TypedParameter for Audience {
    const KEY: &'static str = "aud";
}

impl TryFrom<Json> for Audience {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Audience> for Json {
    fn from(value: Audience) -> Json {
        Json::String(value.0)
    }
}

/// `iss` of a signed request object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuer(pub String);

impl TypedParameter for Issuer {
    const KEY: &'static str = "iss";
}

impl TryFrom<Json> for Issuer {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Issuer> for Json {
    fn from(value: Issuer) -> Json {
        Json::String(value.0)
    }
}

/// `redirect_uri` field in the Authorization Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUri(pub Url);

impl TypedParameter for RedirectUri {
    const KEY: &'static str = "redirect_uri";
}

impl From<RedirectUri> for Json {
    fn from(cmu: RedirectUri) -> Self {
        cmu.0.to_string().into()
    }
}

impl TryFrom<Json> for RedirectUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(RedirectUri)?)
    }
}

/// `response_uri` field in the Authorization Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseUri(pub Url);

impl TypedParameter for ResponseUri {
    const KEY: &'static str = "response_uri";
}

impl From<ResponseUri> for Json {
    fn from(cmu: ResponseUri) -> Self {
        cmu.0.to_string().into()
    }
}

impl TryFrom<Json> for ResponseUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(ResponseUri)?)
    }
}

#[derive(Debug, Clone)]
pub struct PresentationDefinitionUri(pub Url);

impl TypedParameter for PresentationDefinitionUri {
    const KEY: &'static str = "presentation_definition_uri";
}

impl TryFrom<Json> for PresentationDefinitionUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(Self)?)
    }
}

impl From<PresentationDefinitionUri> for Json {
    fn from(value: PresentationDefinitionUri) -> Self {
        value.0.to_string().into()
    }
}

/// `claims` of a SIOPv2 request; older drafts nest the presentation definition
/// under `vp_token`.
#[derive(Debug, Clone, Default)]
pub struct Claims(pub Json);

impl TypedParameter for Claims {
    const KEY: &'static str = "claims";
}

impl TryFrom<Json> for Claims {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::Object(_) => Ok(Self(value)),
            _ => Err(anyhow::anyhow!("'claims' must be an object")),
        }
    }
}

impl From<Claims> for Json {
    fn from(value: Claims) -> Self {
        value.0
    }
}

impl Claims {
    pub fn vp_token_presentation_definition(&self) -> Option<&Json> {
        self.0.get("vp_token")?.get("presentation_definition")
    }
}

const SIOPV2_D11: &str = "SIOPv2_D11";
const SIOPV2_D12_OID4VP_D18: &str = "SIOPv2_D12_OID4VP_D18";
const JWT_VC_PRESENTATION_PROFILE_V1: &str = "JWT_VC_PRESENTATION_PROFILE_v1";

/// Protocol drafts a request can be interpreted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SupportedVersion {
    #[serde(rename = "SIOPv2_D11")]
    SIOPv2D11,
    #[serde(rename = "SIOPv2_D12_OID4VP_D18")]
    SIOPv2D12OID4VPD18,
    #[serde(rename = "JWT_VC_PRESENTATION_PROFILE_v1")]
    JwtVcPresentationProfileV1,
}

impl fmt::Display for SupportedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportedVersion::SIOPv2D11 => SIOPV2_D11,
            SupportedVersion::SIOPv2D12OID4VPD18 => SIOPV2_D12_OID4VP_D18,
            SupportedVersion::JwtVcPresentationProfileV1 => JWT_VC_PRESENTATION_PROFILE_V1,
        }
        .fmt(f)
    }
}
