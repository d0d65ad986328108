//! Request builders and fail-closed response parsers for the assistant's
//! `generateContent` wire format.
//!
//! Builders return a [`PreparedRequest`] the update loop hands to the HTTP
//! capability; parsers accept the raw response body. A classification
//! response that does not decode into the complete result shape yields
//! `None` — never a partially-typed object.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::config::{AssistantConfig, AssistantError};
use crate::geo::{extract_latlng, LatLng};
use crate::model::{
    BinType, ChatMessage, ChatRole, CollectionPoint, Illustration, ImpactEstimate, QueryInput,
    SortingResult,
};

const CLASSIFY_SYSTEM_PROMPT: &str = "You are a household waste-sorting expert. \
    Always answer in pure JSON. Bins: YELLOW, GLASS, GENERAL, COMPOST, \
    DROP_OFF_CENTER, TAKE_BACK_POINT. If you cannot identify the item, return \
    an empty JSON object.";

/// A fully assembled HTTP call: URL, headers (credential included) and
/// JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

// --- Wire types (serialize) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// --- Wire types (deserialize) ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<WireContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    maps: Option<MapsChunk>,
}

#[derive(Debug, Deserialize)]
struct MapsChunk {
    title: Option<String>,
    uri: Option<String>,
}

/// The classification payload the model is asked to produce. Mirrors the
/// response schema sent with the request; anything that does not decode
/// into this shape is "no result".
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SortingPayload {
    #[serde(default)]
    item_name: String,
    #[serde(default)]
    bin: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    is_recyclable: bool,
    #[serde(default)]
    tips: Vec<String>,
    zero_waste_alternative: Option<String>,
    impact: Option<ImpactEstimate>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

fn endpoint(config: &AssistantConfig, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        config.api_base(),
        model
    )
}

fn prepared(
    config: &AssistantConfig,
    model: &str,
    request: &GenerateContentRequest,
) -> Result<PreparedRequest, AssistantError> {
    let body = serde_json::to_vec(request).map_err(|e| AssistantError::Encode(e.to_string()))?;
    Ok(PreparedRequest {
        url: endpoint(config, model),
        headers: vec![
            ("Content-Type".into(), "application/json".into()),
            ("x-goog-api-key".into(), config.expose_key().into()),
        ],
        body,
    })
}

fn user_text(text: impl Into<String>) -> WireContent {
    WireContent {
        role: Some("user".into()),
        parts: vec![WirePart {
            text: Some(text.into()),
            inline_data: None,
        }],
    }
}

fn classification_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "itemName": { "type": "STRING" },
            "bin": {
                "type": "STRING",
                "enum": ["YELLOW", "GLASS", "GENERAL", "COMPOST", "DROP_OFF_CENTER", "TAKE_BACK_POINT"]
            },
            "explanation": { "type": "STRING" },
            "tips": { "type": "ARRAY", "items": { "type": "STRING" } },
            "isRecyclable": { "type": "BOOLEAN" },
            "zeroWasteAlternative": { "type": "STRING" },
            "impact": {
                "type": "OBJECT",
                "properties": {
                    "co2SavedG": { "type": "NUMBER" },
                    "waterSavedL": { "type": "NUMBER" },
                    "energySaved": { "type": "STRING" }
                }
            },
            "followUpQuestions": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["itemName", "bin", "explanation", "tips", "isRecyclable"]
    })
}

/// Build the primary classification call for a text or photo query.
pub fn classification_request(
    config: &AssistantConfig,
    input: &QueryInput,
) -> Result<PreparedRequest, AssistantError> {
    let contents = match input {
        QueryInput::Text(query) => vec![user_text(format!(
            "Current sorting instructions for this item: \"{}\".",
            query.trim()
        ))],
        QueryInput::Photo { mime_type, data } => vec![WireContent {
            role: Some("user".into()),
            parts: vec![
                WirePart {
                    text: None,
                    inline_data: Some(WireInlineData {
                        mime_type: mime_type.clone(),
                        data: BASE64.encode(data),
                    }),
                },
                WirePart {
                    text: Some(
                        "Identify this waste item precisely and give the sorting instructions."
                            .into(),
                    ),
                    inline_data: None,
                },
            ],
        }],
    };

    let request = GenerateContentRequest {
        contents,
        system_instruction: Some(WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(CLASSIFY_SYSTEM_PROMPT.into()),
                inline_data: None,
            }],
        }),
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".into()),
            response_schema: Some(classification_schema()),
            temperature: config.temperature(),
        }),
        tools: None,
        tool_config: None,
    };

    prepared(config, config.classify_model(), &request)
}

/// Build the place-grounding call for nearby collection points.
pub fn nearby_points_request(
    config: &AssistantConfig,
    bin: BinType,
    item_name: &str,
    position: LatLng,
) -> Result<PreparedRequest, AssistantError> {
    let request = GenerateContentRequest {
        contents: vec![user_text(format!(
            "Collection points accepting {} ({}) near lat:{}, lng:{}.",
            bin.label(),
            item_name,
            position.lat(),
            position.lng()
        ))],
        system_instruction: None,
        generation_config: None,
        tools: Some(vec![json!({ "googleMaps": {} })]),
        tool_config: Some(json!({
            "retrievalConfig": {
                "latLng": { "latitude": position.lat(), "longitude": position.lng() }
            }
        })),
    };

    prepared(config, config.grounding_model(), &request)
}

/// Build the illustration call for a classified item.
pub fn illustration_request(
    config: &AssistantConfig,
    item_name: &str,
) -> Result<PreparedRequest, AssistantError> {
    let request = GenerateContentRequest {
        contents: vec![user_text(format!(
            "A clean 3D isometric icon of {item_name} on a solid white background, high quality."
        ))],
        system_instruction: None,
        generation_config: None,
        tools: None,
        tool_config: None,
    };

    prepared(config, config.image_model(), &request)
}

/// Build a follow-up chat turn. The classified item is the session
/// context; `transcript` carries the prior turns, `message` the new one.
pub fn chat_request(
    config: &AssistantConfig,
    result: &SortingResult,
    transcript: &[ChatMessage],
    message: &str,
) -> Result<PreparedRequest, AssistantError> {
    let mut contents: Vec<WireContent> = transcript
        .iter()
        .map(|m| WireContent {
            role: Some(
                match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                }
                .into(),
            ),
            parts: vec![WirePart {
                text: Some(m.text.clone()),
                inline_data: None,
            }],
        })
        .collect();
    contents.push(user_text(message));

    let request = GenerateContentRequest {
        contents,
        system_instruction: Some(WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(format!(
                    "You are a waste-sorting assistant. The user just sorted \
                     \"{}\" into: {}. Answer their follow-up questions briefly \
                     and concretely.",
                    result.item_name,
                    result.bin.label()
                )),
                inline_data: None,
            }],
        }),
        generation_config: Some(GenerationConfig {
            response_mime_type: None,
            response_schema: None,
            temperature: config.temperature(),
        }),
        tools: None,
        tool_config: None,
    };

    prepared(config, config.classify_model(), &request)
}

fn first_text(response: &GenerateContentResponse) -> Option<&str> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .find_map(|p| p.text.as_deref())
}

// Models occasionally wrap JSON in a markdown fence despite the response
// MIME type; strip it before decoding.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

/// Decode a classification response. Fails closed: any response that does
/// not carry a complete, well-typed result is `None`.
#[must_use]
pub fn parse_classification(body: &[u8]) -> Option<SortingResult> {
    let response: GenerateContentResponse = serde_json::from_slice(body).ok()?;
    let text = first_text(&response)?;
    let payload: SortingPayload = serde_json::from_str(strip_fence(text)).ok()?;

    if payload.item_name.trim().is_empty() {
        debug!("classification payload has no item name, treating as no-match");
        return None;
    }
    let bin = BinType::from_wire(&payload.bin)?;

    Some(SortingResult {
        item_name: payload.item_name.trim().to_owned(),
        bin,
        explanation: payload.explanation,
        is_recyclable: payload.is_recyclable,
        tips: payload.tips,
        zero_waste_alternative: payload
            .zero_waste_alternative
            .filter(|s| !s.trim().is_empty()),
        impact: payload.impact,
        illustration: None,
        nearby_points: Vec::new(),
        follow_up_questions: payload.follow_up_questions,
    })
}

/// Decode a place-grounding response into collection points. An empty
/// list is a valid outcome; so is any malformed body. Points without a
/// URI are dropped, points without an extractable coordinate are kept.
#[must_use]
pub fn parse_nearby_points(body: &[u8]) -> Vec<CollectionPoint> {
    let Ok(response) = serde_json::from_slice::<GenerateContentResponse>(body) else {
        return Vec::new();
    };

    let Some(metadata) = response
        .candidates
        .first()
        .and_then(|c| c.grounding_metadata.as_ref())
    else {
        return Vec::new();
    };

    metadata
        .grounding_chunks
        .iter()
        .filter_map(|chunk| {
            let maps = chunk.maps.as_ref()?;
            let uri = maps.uri.as_deref()?.trim();
            if uri.is_empty() {
                return None;
            }
            Some(CollectionPoint {
                name: maps
                    .title
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or("Collection point")
                    .to_owned(),
                uri: uri.to_owned(),
                position: extract_latlng(uri),
            })
        })
        .collect()
}

/// Decode an illustration response: the first inline-image part, if any.
#[must_use]
pub fn parse_illustration(body: &[u8]) -> Option<Illustration> {
    let response: GenerateContentResponse = serde_json::from_slice(body).ok()?;
    let inline = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .find_map(|p| p.inline_data.as_ref())?;

    let data = BASE64.decode(inline.data.as_bytes()).ok()?;
    if data.is_empty() {
        return None;
    }
    Some(Illustration {
        mime_type: inline.mime_type.clone(),
        data,
    })
}

/// Decode a chat reply: the first non-empty text part.
#[must_use]
pub fn parse_chat_reply(body: &[u8]) -> Option<String> {
    let response: GenerateContentResponse = serde_json::from_slice(body).ok()?;
    let text = first_text(&response)?.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_owned())
}
