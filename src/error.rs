use std::time::Duration;

use http::StatusCode;
use url::Url;
use uuid::Uuid;

/// Errors surfaced by the holder response engine.
///
/// Collaborators report failures as [anyhow::Error]; these are folded into
/// [Error::Other] unless they describe a transport failure, in which case
/// [Error::Transport] is used so that the caller may retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No identifier is available that the relying party supports.
    #[error("no DID methods found in agent that are supported by the relying party")]
    NoIdentifier,

    /// The relying party addressed a DID that the agent does not hold.
    #[error("the aud DID {aud} is not in the supported identifiers {candidates:?}")]
    AudienceMismatch {
        aud: String,
        candidates: Vec<String>,
    },

    /// The attestation issuer did not answer in time.
    #[error("no attestation credential received within {0:?}")]
    AttestationTimeout(Duration),

    /// The attestation issuer answered without any credential.
    #[error("attestation response from {issuer} did not contain any credential")]
    AttestationEmpty { issuer: Url },

    /// Required input descriptors have no matching credential, and no
    /// attestation bootstrap path exists.
    #[error("presentation definition '{definition_id}' cannot be satisfied, no credential matches input descriptors {descriptors:?}")]
    DefinitionUnsatisfied {
        definition_id: String,
        descriptors: Vec<String>,
    },

    /// The token endpoint did not issue an access token.
    ///
    /// The raw response body is preserved.
    #[error("token endpoint responded without an access token (status: {status}): {body}")]
    AccessToken { status: StatusCode, body: String },

    /// The direct authorization response could not be delivered.
    #[error("authorization response delivery failed (status: {status:?}): {body}")]
    ResponseDelivery {
        status: Option<StatusCode>,
        body: String,
    },

    /// The session nonce was already bound to a presentation.
    #[error("nonce of session {0} has already been consumed")]
    NonceConsumed(Uuid),

    /// Exactly one verifiable presentation is supported per response.
    #[error("only one verifiable presentation supported for now, got {0}")]
    PresentationCount(usize),

    /// The identifier has no key usable for authentication.
    #[error("identifier {0} has no authentication key")]
    MissingKey(String),

    /// A network call failed before any response was received.
    #[error("transport failure: {0:#}")]
    Transport(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the failure may disappear when the same step is retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::AttestationTimeout(_) | Error::AttestationEmpty { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
