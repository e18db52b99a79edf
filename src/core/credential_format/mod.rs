use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

const FORMAT_JWT: &str = "jwt";
const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";
const FORMAT_LDP: &str = "ldp";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_LDP_VP: &str = "ldp_vp";

/// A Json object of claim formats.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// Claim format payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    /// This variant is primarily used for `jwt_vc_json` and `jwt_vp_json`
    /// claim presentation algorithm types supported by a wallet.
    #[serde(rename = "alg_values_supported")]
    AlgValuesSupported(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// The claim format designation type is used in the input description object to specify the format of the claim.
///
/// Registry of claim format type: https://identity.foundation/claim-format-registry/#registry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormatDesignation {
    /// JSON Web Token as defined by RFC7519, submitted as a JWT encoded string.
    Jwt,

    /// W3C Verifiable Credential secured as a JWT.
    JwtVc,

    /// See [JwtVc](JwtVc) for more information.
    JwtVp,

    JwtVcJson,

    JwtVpJson,

    /// The format is a Linked-Data Proof that will be submitted as an object.
    Ldp,

    /// W3C Verifiable Credential secured with a Linked Data Proof.
    LdpVc,

    /// See [LdpVc](LdpVc) for more information.
    LdpVp,

    /// Other claim format designations not covered by the above.
    ///
    /// The value of this variant is the name of the claim format designation.
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT => Self::Jwt,
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            FORMAT_LDP => Self::Ldp,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_LDP_VP => Self::LdpVp,
            _ => Self::Other(name.into_owned()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Jwt => FORMAT_JWT,
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::Ldp => FORMAT_LDP,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::LdpVp => FORMAT_LDP_VP,
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

/// Credential representations understood by the engine.
///
/// The set is closed: every format has an entry in the [FormatCapabilities]
/// table returned by [CredentialFormat::capabilities].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialFormat {
    /// Compact JWT, `vc` claim holding the credential.
    #[serde(rename = "jwt_vc")]
    JwtVc,
    /// Compact JWT, registered under the OID4VP `jwt_vc_json` name.
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,
    /// JSON-LD credential with an embedded proof.
    #[serde(rename = "ldp_vc")]
    LdpVc,
}

/// Format specific operations, resolved once per credential.
pub struct FormatCapabilities {
    /// Designation written into descriptor maps.
    pub designation: ClaimFormatDesignation,
    /// Designations that an input descriptor `format` may use to accept this format.
    pub accepted_by: &'static [&'static str],
    /// Turn the raw payload into a W3C data model JSON object.
    pub decode: fn(&Json) -> Result<Json>,
}

static JWT_VC: FormatCapabilities = FormatCapabilities {
    designation: ClaimFormatDesignation::JwtVc,
    accepted_by: &[FORMAT_JWT, FORMAT_JWT_VC, FORMAT_JWT_VC_JSON],
    decode: decode_jwt_vc,
};

static JWT_VC_JSON: FormatCapabilities = FormatCapabilities {
    designation: ClaimFormatDesignation::JwtVcJson,
    accepted_by: &[FORMAT_JWT, FORMAT_JWT_VC, FORMAT_JWT_VC_JSON],
    decode: decode_jwt_vc,
};

static LDP_VC: FormatCapabilities = FormatCapabilities {
    designation: ClaimFormatDesignation::LdpVc,
    accepted_by: &[FORMAT_LDP, FORMAT_LDP_VC],
    decode: decode_ldp_vc,
};

impl CredentialFormat {
    pub fn capabilities(&self) -> &'static FormatCapabilities {
        match self {
            CredentialFormat::JwtVc => &JWT_VC,
            CredentialFormat::JwtVcJson => &JWT_VC_JSON,
            CredentialFormat::LdpVc => &LDP_VC,
        }
    }

    pub fn designation(&self) -> ClaimFormatDesignation {
        self.capabilities().designation.clone()
    }

    /// Whether an input descriptor restricted to `formats` accepts this format.
    ///
    /// An empty map accepts every format.
    pub fn is_accepted_by(&self, formats: &ClaimFormatMap) -> bool {
        formats.is_empty()
            || formats.keys().any(|designation| {
                self.capabilities()
                    .accepted_by
                    .contains(&designation.to_string().as_str())
            })
    }
}

/// Decode the payload segment of a compact JWT VC and lift the registered
/// claims into the W3C data model.
fn decode_jwt_vc(payload: &Json) -> Result<Json> {
    let jwt = payload
        .as_str()
        .context("JWT credential payload must be a string")?;
    let claims = jwt_claims(jwt)?;

    let mut vc = match claims.get("vc") {
        Some(Json::Object(vc)) => vc.clone(),
        Some(_) => bail!("'vc' claim is not an object"),
        None => bail!("JWT credential is missing the 'vc' claim"),
    };

    if let Some(iss) = claims.get("iss") {
        vc.entry("issuer").or_insert_with(|| iss.clone());
    }
    if let Some(Json::Number(exp)) = claims.get("exp") {
        if let Some(exp) = exp
            .as_i64()
            .and_then(|exp| time::OffsetDateTime::from_unix_timestamp(exp).ok())
            .and_then(|exp| {
                exp.format(&time::format_description::well_known::Rfc3339)
                    .ok()
            })
        {
            vc.insert("expirationDate".into(), Json::String(exp));
        }
    }
    if let Some(Json::String(sub)) = claims.get("sub") {
        if let Some(Json::Object(subject)) = vc.get_mut("credentialSubject") {
            subject
                .entry("id")
                .or_insert_with(|| Json::String(sub.clone()));
        }
    }

    Ok(Json::Object(vc))
}

fn decode_ldp_vc(payload: &Json) -> Result<Json> {
    match payload {
        Json::Object(_) => Ok(payload.clone()),
        _ => bail!("JSON-LD credential payload must be an object"),
    }
}

/// Return the decoded claim set of a compact JWT, without verifying it.
pub(crate) fn jwt_claims(jwt: &str) -> Result<Map<String, Json>> {
    ssi::claims::jwt::decode_unverified::<Map<String, Json>>(jwt)
        .context("unable to decode JWT credential claims")
}
