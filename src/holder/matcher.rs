use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::core::{
    credential::{Credential, UniformCredential},
    presentation_definition::{PresentationDefinition, PresentationDefinitionWithLocation},
    presentation_submission::{DescriptorMap, PresentationSubmission},
};

/// Whether the required credentials of a definition are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStatus {
    /// Every input descriptor has a matching credential.
    Present,
    /// At least one input descriptor has no matching credential.
    Absent,
    /// The definition has no input descriptors, nothing is to be presented.
    #[serde(rename = "info")]
    Informational,
}

/// Outcome of matching held credentials against one presentation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub definition_id: String,
    pub filtered_credentials: Vec<Credential>,
    /// `(input descriptor id, index into filtered_credentials)`, in descriptor order.
    pub submission_mapping: Vec<(String, usize)>,
    pub status: FilterStatus,
    pub unmatched_descriptors: Vec<String>,
}

impl FilterResult {
    fn informational(definition_id: String) -> Self {
        Self {
            definition_id,
            filtered_credentials: Vec::new(),
            submission_mapping: Vec::new(),
            status: FilterStatus::Informational,
            unmatched_descriptors: Vec::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.status == FilterStatus::Present
    }

    /// Presentation submission for a presentation embedding `filtered_credentials`
    /// in order, as `$.verifiableCredential[i]`.
    pub fn to_submission(&self) -> PresentationSubmission {
        if self.status == FilterStatus::Informational {
            return PresentationSubmission::empty(self.definition_id.clone());
        }

        let descriptor_map = self
            .submission_mapping
            .iter()
            .filter_map(|(descriptor_id, index)| {
                let credential = self.filtered_credentials.get(*index)?;
                Some(DescriptorMap::new(
                    descriptor_id.as_str(),
                    credential.format.designation(),
                    format!("$.verifiableCredential[{index}]"),
                ))
            })
            .collect();

        PresentationSubmission::new(
            uuid::Uuid::new_v4(),
            self.definition_id.clone(),
            descriptor_map,
        )
    }
}

/// Match `credentials` against the input descriptors of `definition`.
///
/// Descriptors are visited in declaration order and take the first
/// satisfying, unexpired credential in candidate order. Credentials that
/// cannot be decoded are skipped.
pub fn filter(
    definition: &PresentationDefinition,
    credentials: &[Credential],
    now: OffsetDateTime,
) -> FilterResult {
    if !definition.has_input_descriptors() {
        debug!(definition = %definition.id(), "definition has no input descriptors");
        return FilterResult::informational(definition.id().clone());
    }

    let candidates: Vec<(usize, &Credential, UniformCredential)> = credentials
        .iter()
        .enumerate()
        .filter_map(|(index, credential)| match credential.to_uniform() {
            Ok(uniform) => Some((index, credential, uniform)),
            Err(e) => {
                warn!(index, "skipping credential: {e:#}");
                None
            }
        })
        .filter(|(_, _, uniform)| uniform.is_valid_at(now))
        .collect();

    let mut filtered_credentials = Vec::new();
    // candidate index -> filtered index
    let mut selected: HashMap<usize, usize> = HashMap::new();
    let mut submission_mapping = Vec::new();
    let mut unmatched_descriptors = Vec::new();

    for descriptor in definition.input_descriptors() {
        let matching = candidates.iter().find(|(_, credential, uniform)| {
            descriptor.is_satisfied_by(credential.format, uniform)
        });

        match matching {
            Some((index, credential, _)) => {
                let position = *selected.entry(*index).or_insert_with(|| {
                    filtered_credentials.push((*credential).clone());
                    filtered_credentials.len() - 1
                });
                submission_mapping.push((descriptor.id().to_owned(), position));
            }
            None => unmatched_descriptors.push(descriptor.id().to_owned()),
        }
    }

    let status = if unmatched_descriptors.is_empty() {
        FilterStatus::Present
    } else {
        FilterStatus::Absent
    };

    debug!(
        definition = %definition.id(),
        matched = submission_mapping.len(),
        unmatched = unmatched_descriptors.len(),
        "filtered credentials"
    );

    FilterResult {
        definition_id: definition.id().clone(),
        filtered_credentials,
        submission_mapping,
        status,
        unmatched_descriptors,
    }
}

/// [filter] applied to every definition of a session, in order.
pub fn filter_against_all(
    definitions: &[PresentationDefinitionWithLocation],
    credentials: &[Credential],
    now: OffsetDateTime,
) -> Vec<FilterResult> {
    definitions
        .iter()
        .map(|with_location| filter(&with_location.definition, credentials, now))
        .collect()
}
