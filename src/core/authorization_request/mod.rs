use std::ops::Deref;

use anyhow::{anyhow, Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use self::parameters::{
    Audience, ClientId, Claims, Issuer, Nonce, PresentationDefinitionUri, RedirectUri,
    ResponseUri, SupportedVersion,
};

use super::{
    object::{ParsingErrorContext, TypedParameter, UntypedObject},
    presentation_definition::{
        PresentationDefinition, PresentationDefinitionLocation, PresentationDefinitionWithLocation,
    },
    util::{get_json, AsyncHttpClient},
};

pub mod parameters;

/// An authorization request of a relying party, after its transport framing
/// (QR code, request URI, JWT signature) has been handled.
///
/// Every member is kept; the ones the engine relies on are parsed eagerly so
/// that a malformed request is rejected on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "UntypedObject", into = "UntypedObject")]
pub struct AuthorizationRequestObject(
    UntypedObject,
    Option<ClientId>,
    Option<RedirectUri>,
    Option<ResponseUri>,
    Option<Nonce>,
);

fn optional<T: TypedParameter>(value: &UntypedObject) -> Result<Option<T>> {
    value.get::<T>().map(|v| v.parsing_error()).transpose()
}

impl AuthorizationRequestObject {
    /// Parse from urlencoded query parameters, e.g. `openid://?client_id=...&nonce=...`.
    ///
    /// Parameters holding a JSON object or array (`presentation_definition`,
    /// `claims`, `client_metadata`) are decoded.
    pub fn from_query_params(query_params: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query_params)
            .context("unable to parse Authorization Request from query params")?;

        let object: Map<String, Json> = pairs
            .into_iter()
            .map(|(key, value)| {
                let value = match value.trim_start().chars().next() {
                    Some('{') | Some('[') => serde_json::from_str(&value)
                        .with_context(|| format!("'{key}' is not valid JSON"))?,
                    _ => Json::String(value),
                };
                Ok((key, value))
            })
            .collect::<Result<_>>()?;

        UntypedObject(object).try_into()
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let query = url
            .query()
            .ok_or(anyhow!("missing query params in Authorization Request uri"))?;
        Self::from_query_params(query)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.1.as_ref().map(|c| c.0.as_str())
    }

    pub fn redirect_uri(&self) -> Option<&Url> {
        self.2.as_ref().map(|r| &r.0)
    }

    pub fn response_uri(&self) -> Option<&Url> {
        self.3.as_ref().map(|r| &r.0)
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        self.4.as_ref()
    }

    pub fn aud(&self) -> Option<&str> {
        self.0.get_str(Audience::KEY)
    }

    pub fn iss(&self) -> Option<&str> {
        self.0.get_str(Issuer::KEY)
    }

    /// Uri to submit the response at.
    ///
    /// AKA [ResponseUri] or [RedirectUri], the former taking precedence.
    pub fn return_uri(&self) -> Option<&Url> {
        self.response_uri().or(self.redirect_uri())
    }

    /// Presentation definitions passed by value, with where they were found.
    pub fn presentation_definitions(&self) -> Result<Vec<PresentationDefinitionWithLocation>> {
        let mut definitions = Vec::new();

        if let Some(definition) = optional::<PresentationDefinition>(&self.0)? {
            definitions.push(PresentationDefinitionWithLocation::top_level(definition));
        }

        if let Some(claims) = optional::<Claims>(&self.0)? {
            if let Some(nested) = claims.vp_token_presentation_definition() {
                let definition = PresentationDefinition::try_from(nested.clone())
                    .context("'claims.vp_token.presentation_definition' could not be parsed")?;
                definitions.push(PresentationDefinitionWithLocation {
                    definition,
                    location: PresentationDefinitionLocation::ClaimsVpToken,
                });
            }
        }

        Ok(definitions)
    }

    /// All presentation definitions of the request, fetching the one passed by reference.
    pub async fn resolve_presentation_definitions<H: AsyncHttpClient + ?Sized>(
        &self,
        http_client: &H,
    ) -> crate::Result<Vec<PresentationDefinitionWithLocation>> {
        let mut definitions = self.presentation_definitions()?;

        if let Some(by_reference) = optional::<PresentationDefinitionUri>(&self.0)? {
            let definition: PresentationDefinition =
                get_json(http_client, &by_reference.0, "presentation definition").await?;
            definitions.push(PresentationDefinitionWithLocation::top_level(definition));
        }

        Ok(definitions)
    }

    /// Protocol drafts the request can be answered under.
    pub fn versions(&self) -> Vec<SupportedVersion> {
        let nested = self
            .0
            .get::<Claims>()
            .and_then(Result::ok)
            .is_some_and(|claims| claims.vp_token_presentation_definition().is_some());

        if nested {
            vec![SupportedVersion::SIOPv2D11]
        } else {
            vec![SupportedVersion::SIOPv2D12OID4VPD18]
        }
    }
}

impl From<AuthorizationRequestObject> for UntypedObject {
    fn from(value: AuthorizationRequestObject) -> Self {
        let mut inner = value.0;
        if let Some(client_id) = value.1 {
            inner.insert(client_id);
        }
        if let Some(redirect_uri) = value.2 {
            inner.insert(redirect_uri);
        }
        if let Some(response_uri) = value.3 {
            inner.insert(response_uri);
        }
        if let Some(nonce) = value.4 {
            inner.insert(nonce);
        }
        inner
    }
}

impl TryFrom<UntypedObject> for AuthorizationRequestObject {
    type Error = Error;

    fn try_from(value: UntypedObject) -> std::result::Result<Self, Self::Error> {
        let client_id = optional(&value)?;
        let redirect_uri = optional(&value)?;
        let response_uri = optional(&value)?;
        let nonce = optional(&value)?;

        Ok(Self(value, client_id, redirect_uri, response_uri, nonce))
    }
}

impl TryFrom<Json> for AuthorizationRequestObject {
    type Error = Error;

    fn try_from(value: Json) -> std::result::Result<Self, Self::Error> {
        serde_json::from_value::<UntypedObject>(value)
            .context("authorization request must be a JSON object")?
            .try_into()
    }
}

impl Deref for AuthorizationRequestObject {
    type Target = UntypedObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn parse_from_query_params() {
        let query = serde_urlencoded::to_string([
            ("client_id", "https://api-conformance.ebsi.eu/conformance/v3/auth-mock"),
            (
                "redirect_uri",
                "https://api-conformance.ebsi.eu/conformance/v3/auth-mock/direct_post",
            ),
            ("nonce", "n-0S6_WzA2Mj"),
            (
                "presentation_definition",
                r#"{"id":"holder-wallet-qualification-presentation","input_descriptors":[]}"#,
            ),
        ])
        .unwrap();

        let request = AuthorizationRequestObject::from_query_params(&query).unwrap();

        assert_eq!(
            request.client_id(),
            Some("https://api-conformance.ebsi.eu/conformance/v3/auth-mock")
        );
        assert_eq!(request.nonce().unwrap().0, "n-0S6_WzA2Mj");
        assert_eq!(
            request.return_uri().unwrap().path(),
            "/conformance/v3/auth-mock/direct_post"
        );

        let definitions = request.presentation_definitions().unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(
            definitions[0].location,
            PresentationDefinitionLocation::TopLevelPresentationDef
        );
        assert_eq!(request.versions(), [SupportedVersion::SIOPv2D12OID4VPD18]);
    }

    #[test]
    fn response_uri_takes_precedence() {
        let request = AuthorizationRequestObject::try_from(json!({
            "redirect_uri": "https://rp.example.com/redirect",
            "response_uri": "https://rp.example.com/response"
        }))
        .unwrap();

        assert_eq!(
            request.return_uri().unwrap().as_str(),
            "https://rp.example.com/response"
        );
    }

    #[test]
    fn nested_definition_in_claims() {
        let request = AuthorizationRequestObject::try_from(json!({
            "aud": "did:example:123",
            "iss": "did:example:rp",
            "claims": {
                "vp_token": {
                    "presentation_definition": { "id": "nested", "input_descriptors": [] }
                }
            }
        }))
        .unwrap();

        let definitions = request.presentation_definitions().unwrap();
        assert_eq!(definitions[0].definition.id(), "nested");
        assert_eq!(
            definitions[0].location,
            PresentationDefinitionLocation::ClaimsVpToken
        );
        assert_eq!(request.aud(), Some("did:example:123"));
        assert_eq!(request.iss(), Some("did:example:rp"));
        assert_eq!(request.versions(), [SupportedVersion::SIOPv2D11]);
    }

    #[test]
    fn malformed_members_are_rejected() {
        let err = AuthorizationRequestObject::try_from(json!({ "redirect_uri": "not a url" }))
            .unwrap_err();
        assert_eq!(err.to_string(), "'redirect_uri' could not be parsed");
    }
}
