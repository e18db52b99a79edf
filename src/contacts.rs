use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An identity a contact is known by, e.g. the client id of a relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactIdentity {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub display_name: String,
    pub identities: Vec<ContactIdentity>,
}

/// Contact management collaborator.
#[async_trait]
pub trait ContactStore {
    /// Contacts having an identity with `correlation_id`.
    async fn find_contacts(&self, correlation_id: &str) -> Result<Vec<Contact>>;
}

/// Display name of the contact known by `correlation_id`.
pub async fn translate_correlation_id_to_name<C: ContactStore + ?Sized>(
    contacts: &C,
    correlation_id: &str,
) -> crate::Result<String> {
    let found = contacts.find_contacts(correlation_id).await?;

    found
        .into_iter()
        .next()
        .map(|contact| contact.display_name)
        .ok_or_else(|| anyhow!("unable to find contact for correlation id {correlation_id}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Contacts(Vec<Contact>);

    #[async_trait]
    impl ContactStore for Contacts {
        async fn find_contacts(&self, correlation_id: &str) -> Result<Vec<Contact>> {
            Ok(self
                .0
                .iter()
                .filter(|c| c.identities.iter().any(|i| i.correlation_id == correlation_id))
                .cloned()
                .collect())
        }
    }

    fn contacts() -> Contacts {
        Contacts(vec![Contact {
            display_name: "Relying Party".into(),
            identities: vec![ContactIdentity {
                correlation_id: "https://rp.example.com".into(),
                alias: None,
            }],
        }])
    }

    #[tokio::test]
    async fn known_correlation_id() {
        let name = translate_correlation_id_to_name(&contacts(), "https://rp.example.com")
            .await
            .unwrap();
        assert_eq!(name, "Relying Party");
    }

    #[tokio::test]
    async fn unknown_correlation_id() {
        let err = translate_correlation_id_to_name(&contacts(), "did:example:unknown")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did:example:unknown"));
    }
}
