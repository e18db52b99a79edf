use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::{SELF_ISSUED_V2, SELF_ISSUED_V2_OPENID_VC};
use crate::core::authorization_request::parameters::SupportedVersion;
use crate::session::Session;

/// Proof purpose of a presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "proofPurpose", rename_all = "camelCase")]
pub enum PurposeKind {
    /// No binding to a relying party.
    #[serde(rename = "assertionMethod")]
    Assertion,
    /// Bound to a relying party by domain and/or challenge.
    Authentication {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        challenge: Option<String>,
    },
}

impl PurposeKind {
    pub fn from_parts(challenge: Option<&str>, domain: Option<&str>) -> Self {
        match (challenge, domain) {
            (None, None) => PurposeKind::Assertion,
            (challenge, domain) => PurposeKind::Authentication {
                domain: domain.map(ToOwned::to_owned),
                challenge: challenge.map(ToOwned::to_owned),
            },
        }
    }
}

/// Parameters binding a presentation proof to one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOptions {
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub domain: String,
    pub challenge: String,
    pub verification_method: Option<String>,
    pub purpose: PurposeKind,
}

impl ProofOptions {
    pub fn new(created: OffsetDateTime, domain: String, challenge: String) -> Self {
        let purpose = PurposeKind::from_parts(Some(&challenge), Some(&domain));
        Self {
            created,
            domain,
            challenge,
            verification_method: None,
            purpose,
        }
    }

    /// Options for answering `session`: consumes its nonce.
    pub fn for_session(session: &Session, created: OffsetDateTime) -> crate::Result<Self> {
        let challenge = session.take_nonce()?.0.clone();
        Ok(Self::new(created, resolve_domain(session), challenge))
    }

    pub fn with_verification_method(mut self, kid: impl Into<String>) -> Self {
        self.verification_method = Some(kid.into());
        self
    }
}

/// Domain a presentation is bound to: the client id, else the request issuer,
/// else the self-issued origin of the protocol version.
pub fn resolve_domain(session: &Session) -> String {
    session
        .client_id()
        .or(session.issuer.as_deref())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| {
            if session
                .versions
                .contains(&SupportedVersion::JwtVcPresentationProfileV1)
            {
                SELF_ISSUED_V2_OPENID_VC.into()
            } else {
                SELF_ISSUED_V2.into()
            }
        })
}
