use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;

use self::parameters::{AuthenticationResponsePayload, TokenRequest, TokenResponse};

use super::util::{base_request, send, AsyncHttpClient};

pub mod parameters;

/// Redirection the relying party asks for after accepting a direct response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRedirection {
    pub redirect_uri: Url,
}

/// POST a direct authorization response as JSON.
///
/// An empty body is an acknowledgement without redirection. Delivery failures are not retried.
pub async fn deliver_authorization_response<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    return_uri: &Url,
    payload: &AuthenticationResponsePayload,
) -> crate::Result<Option<PostRedirection>> {
    let body = serde_json::to_vec(payload).context("unable to serialize authorization response")?;
    let request = base_request()
        .method("POST")
        .uri(return_uri.as_str())
        .header("Content-Type", "application/json")
        .body(body)
        .context("failed to build authorization response request")?;

    let response = send(http_client, request).await?;
    let status = response.status();

    let Ok(body) = String::from_utf8(response.into_body()) else {
        return Err(Error::ResponseDelivery {
            status: Some(status),
            body: "response body is not valid UTF-8".into(),
        });
    };

    if !status.is_success() {
        warn!(%return_uri, %status, "relying party rejected the authorization response");
        return Err(Error::ResponseDelivery {
            status: Some(status),
            body,
        });
    }

    if body.trim().is_empty() {
        info!(%return_uri, "authorization response accepted");
        return Ok(None);
    }

    match serde_json::from_str::<PostRedirection>(&body) {
        Ok(redirection) => {
            info!(
                %return_uri,
                redirect_uri = %redirection.redirect_uri,
                "authorization response accepted"
            );
            Ok(Some(redirection))
        }
        Err(_) => Err(Error::ResponseDelivery {
            status: Some(status),
            body,
        }),
    }
}

/// POST the form encoded token request. Any answer without an access token is an
/// [Error::AccessToken] carrying the body as received.
pub async fn request_access_token<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    token_endpoint: &Url,
    token_request: &TokenRequest,
) -> crate::Result<TokenResponse> {
    let request = base_request()
        .method("POST")
        .uri(token_endpoint.as_str())
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(token_request.to_form()?.into_bytes())
        .context("failed to build token request")?;

    debug!(%token_endpoint, scope = %token_request.scope, "requesting access token");
    let response = send(http_client, request).await?;
    let status = response.status();
    let body = String::from_utf8_lossy(response.body()).into_owned();

    let granted = serde_json::from_str::<Json>(&body)
        .ok()
        .filter(|json| json.get("access_token").is_some())
        .and_then(|json| serde_json::from_value::<TokenResponse>(json).ok());

    match granted {
        Some(token_response) => {
            info!(%token_endpoint, %status, "access token granted");
            Ok(token_response)
        }
        _ => {
            warn!(%token_endpoint, %status, "token request refused");
            Err(Error::AccessToken { status, body })
        }
    }
}
