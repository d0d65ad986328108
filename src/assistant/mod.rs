//! Boundary to the generative-AI collaborator.
//!
//! Everything here is pure: [`config`] resolves a credential into a client
//! configuration, [`protocol`] builds request payloads and parses responses.
//! The actual network round-trip happens in the shell via the HTTP
//! capability, so the whole flow is testable against canned bodies.

mod config;
mod protocol;

pub use self::config::{AssistantConfig, AssistantConfigBuilder, AssistantError};
pub use self::protocol::{
    chat_request, classification_request, illustration_request, nearby_points_request,
    parse_chat_reply, parse_classification, parse_illustration, parse_nearby_points,
    PreparedRequest,
};
