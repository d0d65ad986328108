use serde::{Deserialize, Serialize};

use crate::capabilities::{CameraResult, HttpResult, KvResult, LocationResult};
use crate::model::QueryInput;

/// Everything that can happen to the app: user intents from the shell and
/// capability responses. Large variants are boxed to keep the enum small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Lifecycle
    AppStarted,
    AssistantKeySubmitted { api_key: String },

    // Persistence responses
    HistoryLoaded(Box<KvResult>),
    PointsLoaded(Box<KvResult>),
    ProfileSaved(Box<KvResult>),

    // Geolocation
    LocationRequested,
    LocationResponse(Box<LocationResult>),

    // Classification flow
    QueryChanged { text: String },
    QuerySubmitted(Box<QueryInput>),
    SuggestionPicked { label: String },
    HistoryReplayRequested { id: String },
    ClassificationResponse(Box<HttpResult>),
    IllustrationResponse { for_item: String, result: Box<HttpResult> },
    NearbyPointsResponse { for_item: String, result: Box<HttpResult> },
    ResetRequested,

    // Camera flow
    CameraOpenRequested,
    CameraShutterPressed,
    CameraCancelled,
    CameraResponse(Box<CameraResult>),

    // Follow-up chat
    ChatMessageSubmitted { text: String },
    ChatReplyResponse { for_item: String, result: Box<HttpResult> },

    // Map synchronization
    ActivePointSelected { index: usize },
    MapViewSettled { lat: f64, lng: f64, user_initiated: bool },
    SearchAreaRequested,
    SearchAreaResponse(Box<HttpResult>),
    SearchPromptDismissed,

    ErrorDismissed,
}

impl Event {
    /// Stable name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AppStarted => "app_started",
            Self::AssistantKeySubmitted { .. } => "assistant_key_submitted",
            Self::HistoryLoaded(_) => "history_loaded",
            Self::PointsLoaded(_) => "points_loaded",
            Self::ProfileSaved(_) => "profile_saved",
            Self::LocationRequested => "location_requested",
            Self::LocationResponse(_) => "location_response",
            Self::QueryChanged { .. } => "query_changed",
            Self::QuerySubmitted(_) => "query_submitted",
            Self::SuggestionPicked { .. } => "suggestion_picked",
            Self::HistoryReplayRequested { .. } => "history_replay_requested",
            Self::ClassificationResponse(_) => "classification_response",
            Self::IllustrationResponse { .. } => "illustration_response",
            Self::NearbyPointsResponse { .. } => "nearby_points_response",
            Self::ResetRequested => "reset_requested",
            Self::CameraOpenRequested => "camera_open_requested",
            Self::CameraShutterPressed => "camera_shutter_pressed",
            Self::CameraCancelled => "camera_cancelled",
            Self::CameraResponse(_) => "camera_response",
            Self::ChatMessageSubmitted { .. } => "chat_message_submitted",
            Self::ChatReplyResponse { .. } => "chat_reply_response",
            Self::ActivePointSelected { .. } => "active_point_selected",
            Self::MapViewSettled { .. } => "map_view_settled",
            Self::SearchAreaRequested => "search_area_requested",
            Self::SearchAreaResponse(_) => "search_area_response",
            Self::SearchPromptDismissed => "search_prompt_dismissed",
            Self::ErrorDismissed => "error_dismissed",
        }
    }

    /// True for events that originate from a user action rather than a
    /// capability response.
    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::AssistantKeySubmitted { .. }
                | Self::QueryChanged { .. }
                | Self::QuerySubmitted(_)
                | Self::SuggestionPicked { .. }
                | Self::HistoryReplayRequested { .. }
                | Self::ResetRequested
                | Self::CameraOpenRequested
                | Self::CameraShutterPressed
                | Self::CameraCancelled
                | Self::ChatMessageSubmitted { .. }
                | Self::ActivePointSelected { .. }
                | Self::SearchAreaRequested
                | Self::SearchPromptDismissed
                | Self::ErrorDismissed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_size_is_reasonable() {
        // Boxing keeps capability-response variants small.
        let size = std::mem::size_of::<Event>();
        assert!(
            size <= 64,
            "Event enum is {size} bytes, box more variants"
        );
    }

    #[test]
    fn test_user_initiated_classification() {
        assert!(Event::SearchAreaRequested.is_user_initiated());
        assert!(!Event::AppStarted.is_user_initiated());
        assert!(!Event::ClassificationResponse(Box::new(Err(
            crate::capabilities::HttpError::Timeout
        )))
        .is_user_initiated());
    }
}
