use std::time::Duration;

use http::StatusCode;
use oid4vp_op_auth::{
    core::credential::Credential,
    holder::token_exchange::{AccessTokenArgs, ExchangeState},
    wallet::Wallet,
    Error,
};
use serde_json::{json, Value as Json};
use time::OffsetDateTime;

mod holder_wallet;

use holder_wallet::{
    holder, jwt_vc, other_holder, HolderWallet, MockHttpClient, HOLDER_DID, OTHER_DID,
};

const WELL_KNOWN: &str =
    "https://api-conformance.ebsi.eu/authorisation/v4/.well-known/openid-configuration";
const DEFINITION_ENDPOINT: &str =
    "https://api-conformance.ebsi.eu/authorisation/v4/presentation-definitions";
const TOKEN_ENDPOINT: &str = "https://api-conformance.ebsi.eu/authorisation/v4/token";
const ISSUER: &str = "https://api-conformance.ebsi.eu/authorisation/v4";

fn metadata() -> String {
    json!({
        "issuer": ISSUER,
        "authorization_endpoint": format!("{ISSUER}/authorize"),
        "presentation_definition_endpoint": DEFINITION_ENDPOINT,
        "token_endpoint": TOKEN_ENDPOINT,
        "jwks_uri": format!("{ISSUER}/jwks"),
        "scopes_supported": ["openid", "didr_invite", "didr_write"]
    })
    .to_string()
}

fn onboarding_definition() -> String {
    json!({
        "id": "didr_invite_presentation",
        "format": { "jwt_vp": { "alg": ["ES256"] } },
        "input_descriptors": [{
            "id": "didr_invite_credential",
            "format": { "jwt_vc": { "alg": ["ES256"] } },
            "constraints": {
                "fields": [{
                    "path": ["$.vc.type"],
                    "filter": {
                        "type": "array",
                        "contains": { "const": "VerifiableAuthorisationToOnboard" }
                    }
                }]
            }
        }]
    })
    .to_string()
}

fn attestation() -> Credential {
    jwt_vc(
        json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": [
                "VerifiableCredential",
                "VerifiableAttestation",
                "VerifiableAuthorisationToOnboard"
            ],
            "issuer": "did:ebsi:zZeKyEJfUTGwajhNyNX928z",
            "credentialSubject": { "id": HOLDER_DID }
        }),
        None,
    )
}

fn token_granted() -> String {
    json!({
        "access_token": "eyJhbGciOiJFUzI1NiJ9.eyJzY29wZSI6Im9wZW5pZCBkaWRyX2ludml0ZSJ9.c2ln",
        "token_type": "Bearer",
        "expires_in": 7200,
        "scope": "openid didr_invite",
        "id_token": "eyJhbGciOiJFUzI1NiJ9.e30.c2ln"
    })
    .to_string()
}

fn provider(definition: String, token: (StatusCode, String)) -> MockHttpClient {
    MockHttpClient::default()
        .route(WELL_KNOWN, StatusCode::OK, metadata())
        .route(DEFINITION_ENDPOINT, StatusCode::OK, definition)
        .route(TOKEN_ENDPOINT, token.0, token.1)
}

fn token_form(wallet: &HolderWallet) -> Vec<(String, String)> {
    let bodies = wallet.http_client.requests_to(TOKEN_ENDPOINT);
    assert_eq!(bodies.len(), 1);
    serde_urlencoded::from_str(&bodies[0]).unwrap()
}

fn form_value<'a>(form: &'a [(String, String)], key: &str) -> &'a str {
    form.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap()
}

#[tokio::test]
async fn held_credential_is_exchanged_for_a_token() {
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::OK, token_granted()),
    ))
    .with_credentials(vec![attestation()]);

    let before = OffsetDateTime::now_utc();
    let result = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", vec![holder()]))
        .await
        .unwrap();
    let after = OffsetDateTime::now_utc();

    assert_eq!(result.scope, "didr_invite");
    assert_eq!(result.identifier.did, HOLDER_DID);
    assert_eq!(
        result.access_token_response.token_type.as_deref(),
        Some("Bearer")
    );
    assert_eq!(result.access_token_response.expires_in, Some(7200));

    let definition_requests = wallet.http_client.requests.lock().unwrap();
    let definition_request = definition_requests
        .iter()
        .find(|r| r.uri.starts_with(DEFINITION_ENDPOINT))
        .unwrap();
    assert_eq!(definition_request.method, "GET");
    assert!(definition_request.uri.ends_with("?scope=openid%20didr_invite"));
    let token_request = definition_requests
        .iter()
        .find(|r| r.uri == TOKEN_ENDPOINT)
        .unwrap();
    assert_eq!(
        token_request.content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    drop(definition_requests);

    let form = token_form(&wallet);
    assert_eq!(form_value(&form, "grant_type"), "vp_token");
    assert_eq!(form_value(&form, "scope"), "openid didr_invite");
    assert!(form_value(&form, "vp_token").starts_with("eyJ"));
    let submission: Json =
        serde_json::from_str(form_value(&form, "presentation_submission")).unwrap();
    assert_eq!(submission["definition_id"], "didr_invite_presentation");
    assert_eq!(
        submission["descriptor_map"],
        json!([{
            "id": "didr_invite_credential",
            "format": "jwt_vc",
            "path": "$.verifiableCredential[0]"
        }])
    );

    let calls = wallet.signer.calls.lock().unwrap();
    assert_eq!(calls[0].proof.domain, ISSUER);
    assert_eq!(calls[0].presentation["holder"], HOLDER_DID);
    let backdate = time::Duration::seconds(120);
    assert!(calls[0].proof.created >= before - backdate);
    assert!(calls[0].proof.created <= after - backdate);

    assert!(wallet.attestation.requests.lock().unwrap().is_empty());
    assert_eq!(
        result.history,
        [
            ExchangeState::RequestReceived,
            ExchangeState::IdentifierSelected,
            ExchangeState::DefinitionResolved,
            ExchangeState::CredentialsFiltered,
            ExchangeState::PresentationBuilt,
            ExchangeState::TokenRequested,
            ExchangeState::TokenGranted,
        ]
    );
}

#[tokio::test]
async fn presentation_holder_is_the_attestation_subject() {
    let unrelated = jwt_vc(
        json!({
            "type": ["VerifiableCredential", "LibraryCard"],
            "credentialSubject": { "id": OTHER_DID }
        }),
        None,
    );
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::OK, token_granted()),
    ))
    .knowing(other_holder());

    let args = AccessTokenArgs::new("didr_invite", vec![other_holder(), holder()])
        .with_credentials(vec![unrelated, attestation()]);
    let result = wallet.get_access_token(args).await.unwrap();

    assert_eq!(result.identifier.did, HOLDER_DID);
    let calls = wallet.signer.calls.lock().unwrap();
    assert_eq!(calls[0].presentation["holder"], HOLDER_DID);
    assert_eq!(calls[0].kid, format!("{HOLDER_DID}#keys-1"));
    assert_eq!(
        calls[0].presentation["verifiableCredential"],
        json!([attestation().payload])
    );
}

#[tokio::test]
async fn bare_access_token_is_accepted() {
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::OK, r#"{"access_token":"abc"}"#.to_owned()),
    ))
    .with_credentials(vec![attestation()]);

    let result = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", vec![holder()]))
        .await
        .unwrap();

    assert_eq!(result.access_token_response.access_token, "abc");
    assert!(result.access_token_response.token_type.is_none());
    assert_eq!(result.history.last(), Some(&ExchangeState::TokenGranted));
}

#[tokio::test]
async fn missing_credential_is_bootstrapped() {
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::OK, token_granted()),
    ))
    .with_attestation(attestation());

    let result = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", vec![holder()]))
        .await
        .unwrap();
    assert_eq!(result.identifier.did, HOLDER_DID);

    let requests = wallet.attestation.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].credential_issuer.as_str(),
        "https://api-conformance.ebsi.eu/conformance/v3/issuer-mock"
    );
    assert_eq!(requests[0].client_id, HOLDER_DID);
    assert_eq!(requests[0].credential_type, "VerifiableAuthorisationToOnboard");

    let calls = wallet.signer.calls.lock().unwrap();
    assert_eq!(
        calls[0].presentation["verifiableCredential"],
        json!([attestation().payload])
    );
}

#[tokio::test(start_paused = true)]
async fn bootstrap_timeout_fails_the_exchange() {
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::OK, token_granted()),
    ));

    let err = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", vec![holder()]))
        .await
        .unwrap_err();

    assert!(matches!(err.source, Error::AttestationTimeout(d) if d == Duration::from_secs(30)));
    assert_eq!(err.step, ExchangeState::AttestationBootstrapping);
    assert_eq!(err.history.last(), Some(&ExchangeState::Failed));
    assert!(!err.history.contains(&ExchangeState::TokenGranted));

    assert_eq!(wallet.attestation.requests.lock().unwrap().len(), 3);
    assert!(wallet.http_client.requests_to(TOKEN_ENDPOINT).is_empty());
    assert!(wallet.signer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_grant_is_reported_verbatim() {
    let refusal = r#"{"error":"invalid_grant","error_description":"Invalid VP token"}"#;
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::BAD_REQUEST, refusal.to_owned()),
    ))
    .with_credentials(vec![attestation()]);

    let err = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", vec![holder()]))
        .await
        .unwrap_err();

    match &err.source {
        Error::AccessToken { status, body } => {
            assert_eq!(*status, StatusCode::BAD_REQUEST);
            assert_eq!(body, refusal);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.step, ExchangeState::TokenRequested);
    assert_eq!(
        err.history,
        [
            ExchangeState::RequestReceived,
            ExchangeState::IdentifierSelected,
            ExchangeState::DefinitionResolved,
            ExchangeState::CredentialsFiltered,
            ExchangeState::PresentationBuilt,
            ExchangeState::TokenRequested,
            ExchangeState::Failed,
        ]
    );
}

#[tokio::test]
async fn zero_descriptor_definition_needs_no_credentials() {
    let wallet = HolderWallet::new(provider(
        json!({ "id": "openid_presentation", "input_descriptors": [] }).to_string(),
        (StatusCode::OK, token_granted()),
    ));

    wallet
        .get_access_token(AccessTokenArgs::new("openid", vec![holder()]))
        .await
        .unwrap();

    let form = token_form(&wallet);
    let submission: Json =
        serde_json::from_str(form_value(&form, "presentation_submission")).unwrap();
    assert_eq!(submission["definition_id"], "openid_presentation");
    assert_eq!(submission["descriptor_map"], json!([]));

    let calls = wallet.signer.calls.lock().unwrap();
    assert_eq!(calls[0].presentation["verifiableCredential"], json!([]));
    assert!(wallet.attestation.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn supplied_attestation_skips_lookup_and_bootstrap() {
    let wallet = HolderWallet::new(provider(
        onboarding_definition(),
        (StatusCode::OK, token_granted()),
    ));

    let args = AccessTokenArgs::new("didr_invite", vec![holder()])
        .with_attestation_credential(attestation());
    wallet.get_access_token(args).await.unwrap();

    assert!(wallet.attestation.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_provider_is_retried_then_reported() {
    let wallet = HolderWallet::new(MockHttpClient::default());

    let err = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", vec![holder()]))
        .await
        .unwrap_err();

    assert!(matches!(err.source, Error::Transport(_)));
    assert_eq!(err.step, ExchangeState::IdentifierSelected);
    assert_eq!(wallet.http_client.requests_to(WELL_KNOWN).len(), 3);
}

#[tokio::test]
async fn no_identifier_fails_before_discovery() {
    let wallet = HolderWallet::new(MockHttpClient::default());

    let err = wallet
        .get_access_token(AccessTokenArgs::new("didr_invite", Vec::new()))
        .await
        .unwrap_err();

    assert!(matches!(err.source, Error::NoIdentifier));
    assert_eq!(
        err.history,
        [ExchangeState::RequestReceived, ExchangeState::Failed]
    );
    assert!(wallet.http_client.requests.lock().unwrap().is_empty());
}
