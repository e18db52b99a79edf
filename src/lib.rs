//! This library provides the holder side of [SIOPv2] and [OpenID for Verifiable Presentations],
//! with [DIF Presentation Exchange] definitions.
//!
//! [SIOPv2]: <https://openid.net/specs/openid-connect-self-issued-v2-1_0.html>
//! [OpenID for Verifiable Presentations]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//! [DIF Presentation Exchange]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>
//!
//! # Wallet Usage
//!
//! The engine is driven through the [`Wallet`] trait. An implementation wires the
//! collaborators the engine consults: HTTP transport, identifier management,
//! credential storage, the signature suite, the attestation issuer and the
//! session registry.
//!
//! ```ignore
//! use oid4vp_op_auth::config::Config;
//! use oid4vp_op_auth::core::util::ReqwestClient;
//! use oid4vp_op_auth::session::MemoryStore;
//! use oid4vp_op_auth::wallet::Wallet;
//!
//! struct MyWallet {
//!     config: Config,
//!     http_client: ReqwestClient,
//!     identifiers: MyIdentifiers,
//!     credentials: MyCredentials,
//!     signer: MySigner,
//!     attestation: MyIssuerClient,
//!     sessions: MemoryStore,
//! }
//!
//! impl Wallet for MyWallet {
//!     type HttpClient = ReqwestClient;
//!     type Identifiers = MyIdentifiers;
//!     type Credentials = MyCredentials;
//!     type Signer = MySigner;
//!     type Attestation = MyIssuerClient;
//!     type Sessions = MemoryStore;
//!
//!     fn config(&self) -> &Config {
//!         &self.config
//!     }
//!
//!     // ...
//! }
//!
//! // A relying party request, e.g. scanned from a QR code.
//! let request = AuthorizationRequestObject::from_url(&request_url)?;
//! let session = wallet.register_request(request, identifiers).await?;
//!
//! // Present matching credentials and follow the redirection, if any.
//! let redirect = wallet
//!     .send_authorization_response(AuthorizationResponseArgs::new(session.id))
//!     .await?;
//!
//! // Or obtain an access token from the authorization server of the environment.
//! let token = wallet
//!     .get_access_token(AccessTokenArgs::new("didr_invite", identifiers))
//!     .await?;
//! ```
//!
//! [`Wallet`]: crate::wallet::Wallet
//!
//! # Protocol Overview
//!
//! 1. *Session*: a received request is registered as a [`Session`], which owns
//!    the nonce the presentation is bound to.
//! 2. *Identifier selection*: [`select_identifier`] picks the DID to answer with.
//! 3. *Matching*: [`filter`] matches held credentials against each input descriptor.
//! 4. *Attestation bootstrap*: for the token exchange, a missing credential may be
//!    obtained from a credential issuer with [`bootstrap_attestation`].
//! 5. *Presentation*: [`build`] assembles and signs the presentation with its submission.
//! 6. *Dispatch*: the response is posted directly to the relying party, or exchanged
//!    for an access token at the token endpoint.
//!
//! [`Session`]: crate::session::Session
//! [`select_identifier`]: crate::holder::identifier_selector::select_identifier
//! [`filter`]: crate::holder::matcher::filter
//! [`bootstrap_attestation`]: crate::holder::attestation::bootstrap_attestation
//! [`build`]: crate::holder::verifiable_presentation_builder::build
//!
//! # Credential Formats
//!
//! - **JWT VC** (`jwt_vc`, `jwt_vc_json`): W3C Verifiable Credentials secured with JWT
//! - **LDP VC** (`ldp_vc`): W3C Verifiable Credentials with Linked Data Proofs
//!
//! Format identifiers and handling are defined in the [`core::credential_format`] module.
//!
//! [`core::credential_format`]: crate::core::credential_format
pub mod config;
pub mod contacts;
pub mod core;
pub mod error;
pub mod holder;
pub mod session;
pub mod utils;
pub mod wallet;

pub use error::{Error, Result};
pub use serde_json_path::JsonPath;
