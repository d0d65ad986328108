//! Typed capability boundaries. Every side effect of the core — network,
//! storage, geolocation, camera, rendering — crosses one of these.

mod camera;
mod http;
mod kv;
mod location;

pub use self::camera::{
    Camera, CameraError, CameraFacing, CameraOperation, CameraOutput, CameraResult, CaptureConfig,
    CapturedPhoto,
};
pub use self::http::{
    Http, HttpError, HttpMethod, HttpOperation, HttpRequest, HttpResponse, HttpResult,
    RequestBuilder,
};
pub use self::kv::{KeyValue, KvError, KvOperation, KvOutput, KvResult};
// The Effect derive names each variant after the field type's last path
// segment; alias KeyValue to Kv so the generated variant is `Effect::Kv`.
use self::kv::KeyValue as Kv;
pub use self::location::{
    Location, LocationConfig, LocationError, LocationOperation, LocationResult, Position,
};

pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

pub type AppHttp = Http<Event>;
pub type AppKv = KeyValue<Event>;
pub type AppRender = Render<Event>;
pub type AppLocation = Location<Event>;
pub type AppCamera = Camera<Event>;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Storage error: {0}")]
    Kv(#[from] KvError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
}

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: Kv<Event>,
    pub render: Render<Event>,
    pub location: Location<Event>,
    pub camera: Camera<Event>,
}
