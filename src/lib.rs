#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod assistant;
pub mod capabilities;
pub mod event;
pub mod geo;
pub mod history;
pub mod image_prep;
pub mod map_view;
pub mod model;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::Event;
pub use model::Model;

use history::LevelThreshold;

pub const HISTORY_STORAGE_KEY: &str = "ecotri.history.v1";
pub const POINTS_STORAGE_KEY: &str = "ecotri.points.v1";

pub const DEFAULT_HISTORY_CAP: usize = 5;
pub const DEFAULT_MAX_COLLECTION_POINTS: usize = 8;
pub const DEFAULT_POINTS_PER_SORT: u64 = 10;
pub const DEFAULT_LOCATION_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAP_ZOOM: f64 = 14.0;
pub const DEFAULT_FIT_MAX_ZOOM: f64 = 16.0;
pub const DEFAULT_FIT_PADDING: f64 = 0.15;
pub const CLASSIFY_TIMEOUT_MS: u64 = 60_000;
pub const ENRICHMENT_TIMEOUT_MS: u64 = 45_000;
pub const CHAT_TIMEOUT_MS: u64 = 45_000;

/// Home-screen query shortcuts.
pub const SUGGESTIONS: &[(&str, &str)] = &[
    ("Coffee capsule", "☕️"),
    ("Batteries", "🔋"),
    ("Cardboard", "📦"),
    ("Clothes", "👕"),
];

/// Thresholds and caps the source varied across revisions; they are
/// configuration, not invariants. `Model::new` takes a `Tunables`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    pub history_cap: usize,
    pub max_collection_points: usize,
    pub points_per_sort: u64,
    pub location_timeout_ms: u64,
    pub default_zoom: f64,
    pub fit_max_zoom: f64,
    pub fit_padding: f64,
    pub levels: Vec<LevelThreshold>,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            max_collection_points: DEFAULT_MAX_COLLECTION_POINTS,
            points_per_sort: DEFAULT_POINTS_PER_SORT,
            location_timeout_ms: DEFAULT_LOCATION_TIMEOUT_MS,
            default_zoom: DEFAULT_MAP_ZOOM,
            fit_max_zoom: DEFAULT_FIT_MAX_ZOOM,
            fit_padding: DEFAULT_FIT_PADDING,
            levels: vec![
                LevelThreshold::new(0, "Sorting beginner", "🌱"),
                LevelThreshold::new(50, "Apprentice", "♻️"),
                LevelThreshold::new(150, "Confirmed sorter", "🗑️"),
                LevelThreshold::new(400, "Expert", "🌍"),
                LevelThreshold::new(1_000, "Eco hero", "🏆"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotConfigured,
    NoMatch,
    Network,
    Timeout,
    LocationPermissionDenied,
    LocationTimeout,
    Location,
    CameraPermissionDenied,
    Camera,
    ImageProcessing,
    Storage,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::NoMatch => "NO_MATCH",
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::LocationPermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::LocationTimeout => "LOCATION_TIMEOUT",
            Self::Location => "LOCATION_ERROR",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::Camera => "CAMERA_ERROR",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network
            | Self::Timeout
            | Self::NoMatch
            | Self::LocationTimeout
            | Self::Location
            | Self::Camera
            | Self::Storage => ErrorSeverity::Transient,

            Self::Validation
            | Self::NotConfigured
            | Self::LocationPermissionDenied
            | Self::CameraPermissionDenied
            | Self::ImageProcessing => ErrorSeverity::Permanent,

            Self::Internal => ErrorSeverity::Fatal,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::Timeout
                | Self::NoMatch
                | Self::LocationTimeout
                | Self::Location
                | Self::Camera
                | Self::Storage
        )
    }
}

/// One surfaced failure. None of these is fatal to the session; the user
/// can always retry or switch input modes.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("[{}] {message}", .kind.code())]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotConfigured => {
                "The sorting assistant is not configured. Connect your API key to enable analysis."
                    .into()
            }
            ErrorKind::NoMatch => {
                "Could not identify this item. Try again with a simpler name.".into()
            }
            ErrorKind::Network => {
                "Something went wrong. Check your connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::LocationPermissionDenied => {
                "Location access is needed to find collection points nearby. Enable location permissions in your device settings."
                    .into()
            }
            ErrorKind::LocationTimeout => {
                "Could not determine your position in time. Please try again.".into()
            }
            ErrorKind::Location => {
                "Unable to determine your location. Check your GPS settings.".into()
            }
            ErrorKind::CameraPermissionDenied => {
                "Camera access was denied. Enable camera permissions in your device settings."
                    .into()
            }
            ErrorKind::Camera => "Camera error. Close and reopen the camera.".into(),
            ErrorKind::ImageProcessing => {
                "Unable to process this photo. Try a different shot.".into()
            }
            ErrorKind::Storage => "Could not save your progress on this device.".into(),
            ErrorKind::Internal => "An unexpected error occurred. Please try again.".into(),
        }
    }
}

impl From<assistant::AssistantError> for AppError {
    fn from(e: assistant::AssistantError) -> Self {
        match e {
            assistant::AssistantError::NotConfigured => {
                Self::new(ErrorKind::NotConfigured, e.to_string())
            }
            assistant::AssistantError::Encode(_) => Self::new(ErrorKind::Internal, e.to_string()),
        }
    }
}

impl From<image_prep::ImagePrepError> for AppError {
    fn from(e: image_prep::ImagePrepError) -> Self {
        Self::new(ErrorKind::ImageProcessing, e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

// --- View model ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub message: String,
    pub error_code: String,
    pub is_retryable: bool,
    /// Drives the dedicated "reconfigure access" affordance.
    pub needs_configuration: bool,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            error_code: e.code().to_string(),
            is_retryable: e.is_retryable(),
            needs_configuration: e.kind == ErrorKind::NotConfigured,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionView {
    pub label: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntryView {
    pub id: String,
    pub item_name: String,
    pub bin: model::BinType,
    pub bin_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultView {
    pub item_name: String,
    pub bin: model::BinType,
    pub bin_label: String,
    pub bin_description: String,
    pub explanation: String,
    pub is_recyclable: bool,
    pub tips: Vec<String>,
    pub zero_waste_alternative: Option<String>,
    pub impact: Option<model::ImpactEstimate>,
    pub illustration: Option<model::Illustration>,
    pub follow_up_questions: Vec<String>,
}

impl From<&model::SortingResult> for ResultView {
    fn from(r: &model::SortingResult) -> Self {
        Self {
            item_name: r.item_name.clone(),
            bin: r.bin,
            bin_label: r.bin.label().into(),
            bin_description: r.bin.description().into(),
            explanation: r.explanation.clone(),
            is_recyclable: r.is_recyclable,
            tips: r.tips.clone(),
            zero_waste_alternative: r.zero_waste_alternative.clone(),
            impact: r.impact.clone(),
            illustration: r.illustration.clone(),
            follow_up_questions: r.follow_up_questions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointListItemView {
    pub name: String,
    pub uri: String,
    pub is_active: bool,
    pub is_plottable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapViewModel {
    pub anchor: Option<geo::LatLng>,
    pub markers: Vec<map_view::Marker>,
    pub viewport: map_view::ViewportDirective,
    pub search_prompt: Option<geo::LatLng>,
    pub is_searching_area: bool,
    pub no_points_found: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatViewModel {
    pub transcript: Vec<model::ChatMessage>,
    pub awaiting_reply: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Screen {
    NotConfigured,
    Home {
        query: String,
        suggestions: Vec<SuggestionView>,
        history: Vec<HistoryEntryView>,
    },
    CameraCapture,
    Classifying,
    Result {
        result: ResultView,
        points_list: Vec<PointListItemView>,
        map: MapViewModel,
        chat: ChatViewModel,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub screen: Screen,
    pub error: Option<UserFacingError>,
    pub points: u64,
    pub grade: history::Grade,
}

pub mod app {
    use std::time::Duration;

    use tracing::{debug, warn};

    use super::*;
    use crate::assistant::{self as proto, AssistantConfig, PreparedRequest};
    use crate::capabilities::{
        CameraOutput, CaptureConfig, HttpError, HttpResult, KvError, KvOutput, LocationConfig,
        LocationError,
    };
    use crate::geo::LatLng;
    use crate::history::grade_for;
    use crate::model::{
        ChatMessage, ChatPhase, CollectionPoint, LocationState, Phase, QueryInput, SortingResult,
        UnixTimeMs,
    };

    #[derive(Default)]
    pub struct App;

    impl App {
        fn send_assistant_request<F>(
            caps: &Capabilities,
            request: PreparedRequest,
            timeout_ms: u64,
            make_event: F,
        ) where
            F: FnOnce(HttpResult) -> Event + Send + 'static,
        {
            caps.http
                .post(request.url)
                .headers(request.headers)
                .timeout(Duration::from_millis(timeout_ms))
                .body(request.body)
                .send(make_event);
        }

        /// Fire-and-forget persistence of history and points. A write
        /// failure is logged via `ProfileSaved`, never surfaced.
        fn persist_profile(model: &Model, caps: &Capabilities) {
            match serde_json::to_vec(&model.history) {
                Ok(bytes) => caps.kv.set(HISTORY_STORAGE_KEY, bytes, |r| {
                    Event::ProfileSaved(Box::new(r))
                }),
                Err(e) => warn!("failed to serialize history: {e}"),
            }
            match serde_json::to_vec(&model.points.value()) {
                Ok(bytes) => caps.kv.set(POINTS_STORAGE_KEY, bytes, |r| {
                    Event::ProfileSaved(Box::new(r))
                }),
                Err(e) => warn!("failed to serialize points: {e}"),
            }
        }

        fn release_camera(caps: &Capabilities) {
            caps.camera
                .stop_stream(|r| Event::CameraResponse(Box::new(r)));
        }

        fn request_enrichments(
            result: &SortingResult,
            config: &AssistantConfig,
            location: Option<LatLng>,
            caps: &Capabilities,
        ) {
            match proto::illustration_request(config, &result.item_name) {
                Ok(request) => {
                    let for_item = result.item_name.clone();
                    Self::send_assistant_request(caps, request, ENRICHMENT_TIMEOUT_MS, move |r| {
                        Event::IllustrationResponse {
                            for_item,
                            result: Box::new(r),
                        }
                    });
                }
                Err(e) => warn!("skipping illustration request: {e}"),
            }

            // No known position means the lookup is not attempted at all;
            // the location error (if any) was surfaced separately.
            let Some(position) = location else { return };
            match proto::nearby_points_request(config, result.bin, &result.item_name, position) {
                Ok(request) => {
                    let for_item = result.item_name.clone();
                    Self::send_assistant_request(caps, request, ENRICHMENT_TIMEOUT_MS, move |r| {
                        Event::NearbyPointsResponse {
                            for_item,
                            result: Box::new(r),
                        }
                    });
                }
                Err(e) => warn!("skipping nearby-points request: {e}"),
            }
        }

        fn handle_classification_response(
            &self,
            result: HttpResult,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match result {
                Ok(response) if response.is_success() => {
                    match proto::parse_classification(&response.body) {
                        Some(result) => self.classification_succeeded(result, model, caps),
                        None => {
                            model.phase = Phase::Idle;
                            model.set_error(AppError::new(
                                ErrorKind::NoMatch,
                                "assistant could not identify the item",
                            ));
                        }
                    }
                }
                Ok(response) if response.status == 401 || response.status == 403 => {
                    model.phase = Phase::Idle;
                    model.set_error(AppError::new(
                        ErrorKind::NotConfigured,
                        format!("assistant rejected credential (HTTP {})", response.status),
                    ));
                }
                Ok(response) => {
                    model.phase = Phase::Idle;
                    model.set_error(AppError::new(
                        ErrorKind::Network,
                        format!("assistant returned HTTP {}", response.status),
                    ));
                }
                Err(HttpError::Timeout) => {
                    model.phase = Phase::Idle;
                    model.set_error(AppError::new(ErrorKind::Timeout, "classification timed out"));
                }
                Err(e) => {
                    model.phase = Phase::Idle;
                    model.set_error(AppError::new(ErrorKind::Network, e.to_string()));
                }
            }
        }

        fn classification_succeeded(
            &self,
            result: SortingResult,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            debug!(item = %result.item_name, bin = result.bin.as_str(), "classified");

            model.phase = Phase::Classified;
            model.chat_transcript.clear();
            model.chat_phase = ChatPhase::Ready;
            model.map.reset();

            model.history.record(
                &result.item_name,
                result.bin,
                UnixTimeMs::now(),
                model.tunables.history_cap,
            );
            model.points.add(model.tunables.points_per_sort);
            Self::persist_profile(model, caps);

            if let Some(config) = &model.assistant {
                Self::request_enrichments(&result, config, model.location, caps);
            }

            model.result = Some(result);
        }

        fn current_points(model: &Model) -> Vec<CollectionPoint> {
            model
                .result
                .as_ref()
                .map(|r| r.nearby_points.clone())
                .unwrap_or_default()
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            debug!(event = event.name(), "handling event");

            match event {
                Event::AppStarted => {
                    caps.kv
                        .get(HISTORY_STORAGE_KEY, |r| Event::HistoryLoaded(Box::new(r)));
                    caps.kv
                        .get(POINTS_STORAGE_KEY, |r| Event::PointsLoaded(Box::new(r)));
                    self.update(Event::LocationRequested, model, caps);
                    caps.render.render();
                }

                Event::AssistantKeySubmitted { api_key } => {
                    match AssistantConfig::new(api_key) {
                        Ok(config) => {
                            model.assistant = Some(config);
                            model.clear_error();
                        }
                        Err(e) => model.set_error(e.into()),
                    }
                    caps.render.render();
                }

                Event::HistoryLoaded(result) => {
                    match *result {
                        Ok(KvOutput::Value(bytes)) => match serde_json::from_slice(&bytes) {
                            Ok(history) => model.history = history,
                            Err(e) => warn!("discarding stored history: {e}"),
                        },
                        Ok(KvOutput::Written) | Err(KvError::NotFound) => {}
                        Err(e) => warn!("loading history failed: {e}"),
                    }
                    caps.render.render();
                }

                Event::PointsLoaded(result) => {
                    match *result {
                        Ok(KvOutput::Value(bytes)) => match serde_json::from_slice::<u64>(&bytes) {
                            Ok(points) => model.points = crate::history::PointsTally::new(points),
                            Err(e) => warn!("discarding stored points: {e}"),
                        },
                        Ok(KvOutput::Written) | Err(KvError::NotFound) => {}
                        Err(e) => warn!("loading points failed: {e}"),
                    }
                    caps.render.render();
                }

                Event::ProfileSaved(result) => {
                    if let Err(e) = *result {
                        warn!("persisting profile failed: {e}");
                    }
                }

                Event::LocationRequested => {
                    model.location_state = LocationState::Requesting;
                    let config = LocationConfig::default()
                        .with_timeout_ms(model.tunables.location_timeout_ms);
                    caps.location
                        .get_current(config, |r| Event::LocationResponse(Box::new(r)));
                }

                Event::LocationResponse(result) => {
                    match *result {
                        Ok(position) => match LatLng::new(position.lat, position.lng) {
                            Ok(coord) => {
                                model.location = Some(coord);
                                model.location_state = LocationState::Known;
                                model.map.initialize(coord, &model.tunables);
                            }
                            Err(e) => {
                                model.location_state = LocationState::Unavailable;
                                model.set_error(AppError::new(ErrorKind::Location, e.to_string()));
                            }
                        },
                        Err(LocationError::PermissionDenied) => {
                            model.location_state = LocationState::PermissionDenied;
                            model.set_error(AppError::new(
                                ErrorKind::LocationPermissionDenied,
                                "location permission denied",
                            ));
                        }
                        Err(LocationError::Timeout { timeout_ms }) => {
                            model.location_state = LocationState::TimedOut;
                            model.set_error(AppError::new(
                                ErrorKind::LocationTimeout,
                                format!("location request timed out after {timeout_ms}ms"),
                            ));
                        }
                        Err(LocationError::Unavailable { reason }) => {
                            model.location_state = LocationState::Unavailable;
                            model.set_error(AppError::new(ErrorKind::Location, reason));
                        }
                    }
                    caps.render.render();
                }

                Event::QueryChanged { text } => {
                    model.query = text;
                    caps.render.render();
                }

                Event::SuggestionPicked { label } => {
                    model.query = label.clone();
                    self.update(
                        Event::QuerySubmitted(Box::new(QueryInput::Text(label))),
                        model,
                        caps,
                    );
                }

                Event::HistoryReplayRequested { id } => {
                    let Some(entry) = model.history.find(&id) else {
                        return;
                    };
                    let name = entry.item_name.clone();
                    model.query = name.clone();
                    self.update(
                        Event::QuerySubmitted(Box::new(QueryInput::Text(name))),
                        model,
                        caps,
                    );
                }

                Event::QuerySubmitted(input) => {
                    // Empty query: a no-op, not an error.
                    if input.is_empty() || model.phase == Phase::Classifying {
                        return;
                    }
                    let Some(config) = model.assistant.clone() else {
                        model.set_error(AppError::new(
                            ErrorKind::NotConfigured,
                            "assistant credential missing",
                        ));
                        caps.render.render();
                        return;
                    };

                    model.clear_error();
                    model.phase = Phase::Classifying;

                    match proto::classification_request(&config, &input) {
                        Ok(request) => {
                            Self::send_assistant_request(caps, request, CLASSIFY_TIMEOUT_MS, |r| {
                                Event::ClassificationResponse(Box::new(r))
                            });
                        }
                        Err(e) => {
                            model.phase = Phase::Idle;
                            model.set_error(e.into());
                        }
                    }
                    caps.render.render();
                }

                Event::ClassificationResponse(result) => {
                    // A reset while the call was in flight stops listening.
                    if model.phase != Phase::Classifying {
                        return;
                    }
                    self.handle_classification_response(*result, model, caps);
                    caps.render.render();
                }

                Event::IllustrationResponse { for_item, result } => {
                    if !model.is_current_result(&for_item) {
                        return;
                    }
                    let Ok(response) = *result else { return };
                    if !response.is_success() {
                        return;
                    }
                    if let Some(illustration) = proto::parse_illustration(&response.body) {
                        if let Some(r) = model.result.as_mut() {
                            r.illustration = Some(illustration);
                            caps.render.render();
                        }
                    }
                }

                Event::NearbyPointsResponse { for_item, result } => {
                    if !model.is_current_result(&for_item) {
                        return;
                    }
                    let Ok(response) = *result else { return };
                    if !response.is_success() {
                        return;
                    }
                    let mut points = proto::parse_nearby_points(&response.body);
                    if points.is_empty() {
                        return;
                    }
                    points.truncate(model.tunables.max_collection_points);
                    if let Some(r) = model.result.as_mut() {
                        r.nearby_points = points.clone();
                    }
                    model.map.sync(&points, 0, model.location, &model.tunables);
                    caps.render.render();
                }

                Event::ActivePointSelected { index } => {
                    let points = Self::current_points(model);
                    if points.is_empty() {
                        return;
                    }
                    model
                        .map
                        .sync(&points, index, model.location, &model.tunables);
                    caps.render.render();
                }

                Event::MapViewSettled {
                    lat,
                    lng,
                    user_initiated,
                } => {
                    if let Ok(center) = LatLng::new(lat, lng) {
                        model.map.view_settled(center, user_initiated);
                        caps.render.render();
                    }
                }

                Event::SearchAreaRequested => {
                    let Some(result) = model.result.as_ref() else {
                        return;
                    };
                    let (bin, item_name) = (result.bin, result.item_name.clone());
                    let Some(config) = model.assistant.clone() else {
                        return;
                    };
                    let Some(center) = model.map.begin_area_search() else {
                        return;
                    };

                    match proto::nearby_points_request(&config, bin, &item_name, center) {
                        Ok(request) => {
                            Self::send_assistant_request(
                                caps,
                                request,
                                ENRICHMENT_TIMEOUT_MS,
                                |r| Event::SearchAreaResponse(Box::new(r)),
                            );
                        }
                        Err(e) => {
                            warn!("area search request failed to build: {e}");
                            let empty = Self::current_points(model).is_empty();
                            model.map.finish_area_search(empty);
                        }
                    }
                    caps.render.render();
                }

                Event::SearchAreaResponse(result) => {
                    let incoming = match *result {
                        Ok(response) if response.is_success() => {
                            proto::parse_nearby_points(&response.body)
                        }
                        Ok(response) => {
                            warn!("area search returned HTTP {}", response.status);
                            Vec::new()
                        }
                        Err(e) => {
                            warn!("area search failed: {e}");
                            Vec::new()
                        }
                    };

                    let existing = Self::current_points(model);
                    let merged = crate::map_view::merge_points(
                        &existing,
                        incoming,
                        model.tunables.max_collection_points,
                    );

                    if let Some(r) = model.result.as_mut() {
                        r.nearby_points = merged.clone();
                    }
                    model.map.finish_area_search(merged.is_empty());
                    model.map.sync(&merged, 0, model.location, &model.tunables);
                    caps.render.render();
                }

                Event::SearchPromptDismissed => {
                    model.map.dismiss_search_prompt();
                    caps.render.render();
                }

                Event::ResetRequested => {
                    let was_capturing = model.phase == Phase::CameraCapture;

                    model.phase = Phase::Idle;
                    model.result = None;
                    model.query.clear();
                    model.chat_transcript.clear();
                    model.chat_phase = ChatPhase::Ready;
                    model.map.reset();
                    model.clear_error();

                    if let Some(location) = model.location {
                        model.map.initialize(location, &model.tunables);
                    }
                    if was_capturing {
                        Self::release_camera(caps);
                    }
                    caps.render.render();
                }

                Event::CameraOpenRequested => {
                    if matches!(model.phase, Phase::Classifying | Phase::CameraCapture) {
                        return;
                    }
                    model.clear_error();
                    model.phase = Phase::CameraCapture;
                    caps.camera.open(CaptureConfig::default(), |r| {
                        Event::CameraResponse(Box::new(r))
                    });
                    caps.render.render();
                }

                Event::CameraShutterPressed => {
                    if model.phase != Phase::CameraCapture {
                        return;
                    }
                    caps.camera
                        .capture(|r| Event::CameraResponse(Box::new(r)));
                }

                Event::CameraCancelled => {
                    if model.phase != Phase::CameraCapture {
                        return;
                    }
                    model.phase = Phase::Idle;
                    Self::release_camera(caps);
                    caps.render.render();
                }

                Event::CameraResponse(result) => match *result {
                    Ok(CameraOutput::Opened) => {
                        // A stream that opened after the user already left
                        // the capture view must be released immediately.
                        if model.phase != Phase::CameraCapture {
                            Self::release_camera(caps);
                            return;
                        }
                        caps.render.render();
                    }
                    Ok(CameraOutput::Photo(photo)) => {
                        // Release the device before anything else; no exit
                        // path may leave the stream open.
                        Self::release_camera(caps);
                        if model.phase != Phase::CameraCapture {
                            return;
                        }
                        model.phase = Phase::Idle;

                        match image_prep::prepare_for_upload(&photo.data) {
                            Ok(prepared) => {
                                self.update(
                                    Event::QuerySubmitted(Box::new(QueryInput::Photo {
                                        mime_type: prepared.mime_type.into(),
                                        data: prepared.data,
                                    })),
                                    model,
                                    caps,
                                );
                            }
                            Err(e) => {
                                model.set_error(e.into());
                                caps.render.render();
                            }
                        }
                    }
                    Ok(CameraOutput::Cancelled) => {
                        Self::release_camera(caps);
                        if model.phase != Phase::CameraCapture {
                            return;
                        }
                        model.phase = Phase::Idle;
                        caps.render.render();
                    }
                    Ok(CameraOutput::Stopped) => {}
                    Err(e) => {
                        if model.phase == Phase::CameraCapture {
                            model.phase = Phase::Idle;
                        }
                        Self::release_camera(caps);
                        let kind = if e.is_permission_error() {
                            ErrorKind::CameraPermissionDenied
                        } else {
                            ErrorKind::Camera
                        };
                        model.set_error(AppError::new(kind, e.to_string()));
                        caps.render.render();
                    }
                },

                Event::ChatMessageSubmitted { text } => {
                    let text = text.trim().to_owned();
                    if text.is_empty() {
                        return;
                    }
                    // Busy gate: one outstanding reply at a time, a second
                    // send is a no-op rather than a queue.
                    if model.chat_phase == ChatPhase::AwaitingReply {
                        return;
                    }
                    let Some(result) = model.result.clone() else {
                        return;
                    };
                    let Some(config) = model.assistant.as_ref() else {
                        return;
                    };

                    match proto::chat_request(config, &result, &model.chat_transcript, &text) {
                        Ok(request) => {
                            model.chat_transcript.push(ChatMessage::user(text));
                            model.chat_phase = ChatPhase::AwaitingReply;
                            let for_item = result.item_name.clone();
                            Self::send_assistant_request(caps, request, CHAT_TIMEOUT_MS, move |r| {
                                Event::ChatReplyResponse {
                                    for_item,
                                    result: Box::new(r),
                                }
                            });
                        }
                        Err(e) => {
                            warn!("chat request failed to build: {e}");
                            model.chat_transcript.push(ChatMessage::user(text));
                            model
                                .chat_transcript
                                .push(ChatMessage::assistant(CHAT_RETRY_MESSAGE));
                        }
                    }
                    caps.render.render();
                }

                Event::ChatReplyResponse { for_item, result } => {
                    if !model.is_current_result(&for_item) {
                        return;
                    }
                    model.chat_phase = ChatPhase::Ready;

                    let reply = match *result {
                        Ok(response) if response.is_success() => {
                            proto::parse_chat_reply(&response.body)
                        }
                        _ => None,
                    };
                    // Chat failures stay inside the transcript so the
                    // conversation remains usable.
                    model.chat_transcript.push(ChatMessage::assistant(
                        reply.unwrap_or_else(|| CHAT_RETRY_MESSAGE.into()),
                    ));
                    caps.render.render();
                }

                Event::ErrorDismissed => {
                    model.clear_error();
                    caps.render.render();
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let screen = if model.assistant.is_none() {
                Screen::NotConfigured
            } else {
                match (model.phase, &model.result) {
                    (Phase::CameraCapture, _) => Screen::CameraCapture,
                    (Phase::Classifying, _) => Screen::Classifying,
                    (Phase::Classified, Some(result)) => {
                        let points_list = result
                            .nearby_points
                            .iter()
                            .enumerate()
                            .map(|(i, p)| PointListItemView {
                                name: p.name.clone(),
                                uri: p.uri.clone(),
                                is_active: i == model.map.active_index(),
                                is_plottable: p.is_plottable(),
                            })
                            .collect();

                        Screen::Result {
                            result: ResultView::from(result),
                            points_list,
                            map: MapViewModel {
                                anchor: model.map.anchor(),
                                markers: model.map.markers().to_vec(),
                                viewport: model.map.viewport(),
                                search_prompt: model.map.search_prompt(),
                                is_searching_area: model.map.is_searching_area(),
                                no_points_found: model.map.no_points_found(),
                            },
                            chat: ChatViewModel {
                                transcript: model.chat_transcript.clone(),
                                awaiting_reply: model.chat_phase == ChatPhase::AwaitingReply,
                            },
                        }
                    }
                    _ => Screen::Home {
                        query: model.query.clone(),
                        suggestions: SUGGESTIONS
                            .iter()
                            .map(|(label, icon)| SuggestionView {
                                label: (*label).into(),
                                icon: (*icon).into(),
                            })
                            .collect(),
                        history: model
                            .history
                            .entries()
                            .iter()
                            .map(|e| HistoryEntryView {
                                id: e.id.clone(),
                                item_name: e.item_name.clone(),
                                bin: e.bin,
                                bin_label: e.bin.label().into(),
                            })
                            .collect(),
                    },
                }
            };

            ViewModel {
                screen,
                error: model.active_error.as_ref().map(UserFacingError::from),
                points: model.points.value(),
                grade: grade_for(model.points.value(), &model.tunables.levels),
            }
        }
    }

    const CHAT_RETRY_MESSAGE: &str = "Sorry, I could not answer that. Please try again.";
}

#[cfg(test)]
mod tests {
    use super::*;

    mod error_tests {
        use super::*;

        #[test]
        fn test_error_codes_are_distinct() {
            let kinds = [
                ErrorKind::Validation,
                ErrorKind::NotConfigured,
                ErrorKind::NoMatch,
                ErrorKind::Network,
                ErrorKind::Timeout,
                ErrorKind::LocationPermissionDenied,
                ErrorKind::LocationTimeout,
                ErrorKind::Location,
                ErrorKind::CameraPermissionDenied,
                ErrorKind::Camera,
                ErrorKind::ImageProcessing,
                ErrorKind::Storage,
                ErrorKind::Internal,
            ];
            let mut codes: Vec<_> = kinds.iter().map(|k| k.code()).collect();
            codes.sort_unstable();
            codes.dedup();
            assert_eq!(codes.len(), kinds.len());
        }

        #[test]
        fn test_permission_and_connectivity_messages_differ() {
            let permission =
                AppError::new(ErrorKind::LocationPermissionDenied, "denied").user_facing_message();
            let connectivity = AppError::new(ErrorKind::Network, "down").user_facing_message();
            assert_ne!(permission, connectivity);
            assert!(permission.contains("permission"));
        }

        #[test]
        fn test_not_configured_drives_reconfigure_affordance() {
            let error = AppError::new(ErrorKind::NotConfigured, "missing key");
            let facing = UserFacingError::from(&error);
            assert!(facing.needs_configuration);
            assert!(!facing.is_retryable);

            let generic = AppError::new(ErrorKind::Network, "down");
            assert!(!UserFacingError::from(&generic).needs_configuration);
        }

        #[test]
        fn test_no_match_suggests_rephrasing() {
            let message = AppError::new(ErrorKind::NoMatch, "x").user_facing_message();
            assert!(message.to_lowercase().contains("try again"));
        }
    }

    mod tunables_tests {
        use super::*;

        #[test]
        fn test_defaults_match_documented_values() {
            let t = Tunables::default();
            assert_eq!(t.history_cap, 5);
            assert_eq!(t.max_collection_points, 8);
            assert_eq!(t.points_per_sort, 10);
            assert_eq!(t.location_timeout_ms, 15_000);
        }

        #[test]
        fn test_level_table_is_sorted_and_starts_at_zero() {
            let t = Tunables::default();
            assert_eq!(t.levels.first().unwrap().min_points, 0);
            assert!(t
                .levels
                .windows(2)
                .all(|w| w[0].min_points < w[1].min_points));
        }
    }
}
