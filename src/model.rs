use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assistant::AssistantConfig;
use crate::geo::LatLng;
use crate::history::{PointsTally, SortingHistory};
use crate::map_view::MapViewState;
use crate::{AppError, Tunables};

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(ms)
    }
}

/// Disposal destination for a classified item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinType {
    Yellow,
    Glass,
    General,
    Compost,
    DropOffCenter,
    TakeBackPoint,
}

impl BinType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yellow => "YELLOW",
            Self::Glass => "GLASS",
            Self::General => "GENERAL",
            Self::Compost => "COMPOST",
            Self::DropOffCenter => "DROP_OFF_CENTER",
            Self::TakeBackPoint => "TAKE_BACK_POINT",
        }
    }

    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YELLOW" => Some(Self::Yellow),
            "GLASS" => Some(Self::Glass),
            "GENERAL" => Some(Self::General),
            "COMPOST" => Some(Self::Compost),
            "DROP_OFF_CENTER" | "DROP-OFF-CENTER" => Some(Self::DropOffCenter),
            "TAKE_BACK_POINT" | "TAKE-BACK-POINT" => Some(Self::TakeBackPoint),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yellow => "Yellow bin",
            Self::Glass => "Glass bin",
            Self::General => "General waste",
            Self::Compost => "Compost",
            Self::DropOffCenter => "Drop-off center",
            Self::TakeBackPoint => "Take-back point",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Yellow => "Packaging, plastics & paper",
            Self::Glass => "Bottles, jars & flasks",
            Self::General => "Non-recyclable household waste",
            Self::Compost => "Food & garden waste",
            Self::DropOffCenter => "Bulky, rubble & hazardous items",
            Self::TakeBackPoint => "Batteries, bulbs, textile (retail bins)",
        }
    }
}

impl fmt::Display for BinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Estimated savings when the item is sorted correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEstimate {
    pub co2_saved_g: f64,
    pub water_saved_l: f64,
    pub energy_saved: String,
}

/// A place where the classified item can be disposed of.
///
/// A point without a URI is unusable and is filtered out at the parse
/// boundary; a point without a position stays in the list (usable for the
/// textual listing and outbound link) but is never plotted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPoint {
    pub name: String,
    pub uri: String,
    pub position: Option<LatLng>,
}

impl CollectionPoint {
    #[must_use]
    pub fn is_plottable(&self) -> bool {
        self.position.is_some()
    }
}

/// Generated illustration for a result, kept as raw raster bytes.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Illustration {
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

// Redact the payload; illustrations can be hundreds of kilobytes.
impl fmt::Debug for Illustration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Illustration")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Outcome of classifying one item. Created once per successful
/// classification; the illustration and nearby-point fields are patched in
/// later by background enrichments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortingResult {
    pub item_name: String,
    pub bin: BinType,
    pub explanation: String,
    pub is_recyclable: bool,
    pub tips: Vec<String>,
    pub zero_waste_alternative: Option<String>,
    pub impact: Option<ImpactEstimate>,
    pub illustration: Option<Illustration>,
    pub nearby_points: Vec<CollectionPoint>,
    pub follow_up_questions: Vec<String>,
}

/// A past classification, kept for quick re-query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: UnixTimeMs,
    pub item_name: String,
    pub bin: BinType,
}

impl HistoryItem {
    #[must_use]
    pub fn new(item_name: impl Into<String>, bin: BinType, at: UnixTimeMs) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: at,
            item_name: item_name.into(),
            bin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// One classification query. A voice query arrives as its transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryInput {
    Text(String),
    Photo {
        mime_type: String,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl QueryInput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.trim().is_empty(),
            Self::Photo { data, .. } => data.is_empty(),
        }
    }
}

/// Primary flow state. States are mutually exclusive; the chat sub-state
/// lives in [`ChatPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    CameraCapture,
    Classifying,
    Classified,
}

/// Follow-up conversation sub-state. A send while a reply is outstanding
/// is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatPhase {
    #[default]
    Ready,
    AwaitingReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocationState {
    #[default]
    Unknown,
    Requesting,
    Known,
    PermissionDenied,
    TimedOut,
    Unavailable,
}

#[derive(Default)]
pub struct Model {
    pub tunables: Tunables,
    pub assistant: Option<AssistantConfig>,

    pub phase: Phase,
    pub query: String,
    pub result: Option<SortingResult>,

    pub chat_phase: ChatPhase,
    pub chat_transcript: Vec<ChatMessage>,

    pub location: Option<LatLng>,
    pub location_state: LocationState,

    pub history: SortingHistory,
    pub points: PointsTally,

    pub map: MapViewState,

    pub active_error: Option<AppError>,
}

impl Model {
    #[must_use]
    pub fn new(tunables: Tunables) -> Self {
        Self {
            tunables,
            ..Self::default()
        }
    }

    pub fn set_error(&mut self, error: AppError) {
        tracing::warn!(code = error.code(), "surfacing error: {error}");
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    /// True when `item_name` still identifies the displayed result.
    /// Enrichment patches apply only in that case; stale responses are
    /// dropped silently.
    #[must_use]
    pub fn is_current_result(&self, item_name: &str) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.item_name == item_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_type_wire_round_trip() {
        for bin in [
            BinType::Yellow,
            BinType::Glass,
            BinType::General,
            BinType::Compost,
            BinType::DropOffCenter,
            BinType::TakeBackPoint,
        ] {
            assert_eq!(BinType::from_wire(bin.as_str()), Some(bin));
        }
    }

    #[test]
    fn test_bin_type_wire_is_lenient_about_case() {
        assert_eq!(BinType::from_wire("yellow"), Some(BinType::Yellow));
        assert_eq!(
            BinType::from_wire(" take_back_point "),
            Some(BinType::TakeBackPoint)
        );
        assert_eq!(BinType::from_wire("TRASH"), None);
    }

    #[test]
    fn test_bin_type_serde_uses_wire_names() {
        let json = serde_json::to_string(&BinType::DropOffCenter).unwrap();
        assert_eq!(json, "\"DROP_OFF_CENTER\"");
        let back: BinType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BinType::DropOffCenter);
    }

    #[test]
    fn test_query_input_emptiness() {
        assert!(QueryInput::Text("   ".into()).is_empty());
        assert!(!QueryInput::Text("capsule".into()).is_empty());
        assert!(QueryInput::Photo {
            mime_type: "image/jpeg".into(),
            data: vec![],
        }
        .is_empty());
    }

    #[test]
    fn test_illustration_debug_is_redacted() {
        let ill = Illustration {
            mime_type: "image/png".into(),
            data: vec![0u8; 4096],
        };
        let rendered = format!("{ill:?}");
        assert!(rendered.contains("4096"));
        assert!(!rendered.contains("[0,"));
    }

    #[test]
    fn test_is_current_result_guard() {
        let mut model = Model::default();
        assert!(!model.is_current_result("Capsule"));

        model.result = Some(SortingResult {
            item_name: "Capsule".into(),
            bin: BinType::TakeBackPoint,
            explanation: "take it back".into(),
            is_recyclable: true,
            tips: vec![],
            zero_waste_alternative: None,
            impact: None,
            illustration: None,
            nearby_points: vec![],
            follow_up_questions: vec![],
        });
        assert!(model.is_current_result("Capsule"));
        assert!(!model.is_current_result("Cardboard"));
    }
}
