//! The holder side of an exchange, from identifier selection to dispatch.

pub mod attestation;
pub mod authentication_response;
pub mod identifier_selector;
pub mod matcher;
pub mod proof;
pub mod token_exchange;
pub mod verifiable_presentation_builder;
