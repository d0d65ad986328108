use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LOCATION_TIMEOUT_MS: u64 = 15_000;
pub const MAX_LOCATION_TIMEOUT_MS: u64 = 120_000;

/// One-shot geolocation capability. The request is permission-gated on
/// the shell side; the three failure reasons stay distinguishable so the
/// core can surface distinct messages for each.
#[derive(Clone)]
pub struct Location<E> {
    context: CapabilityContext<LocationOperation, E>,
}

impl<Ev> Capability<Ev> for Location<Ev> {
    type Operation = LocationOperation;
    type MappedSelf<MappedEv> = Location<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Location::new(self.context.map_event(f))
    }
}

impl<E> Location<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<LocationOperation, E>) -> Self {
        Self { context }
    }

    pub fn get_current<F>(&self, config: LocationConfig, callback: F)
    where
        F: FnOnce(LocationResult) -> E + Send + 'static,
    {
        let config = config.validated();
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context
                .request_from_shell(LocationOperation::GetCurrent { config })
                .await;
            context.update_app(callback(response));
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationOperation {
    GetCurrent { config: LocationConfig },
}

impl Operation for LocationOperation {
    type Output = LocationResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub timeout_ms: u64,
    pub high_accuracy: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_LOCATION_TIMEOUT_MS,
            high_accuracy: false,
        }
    }
}

impl LocationConfig {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    pub fn validated(mut self) -> Self {
        self.timeout_ms = self.timeout_ms.clamp(1_000, MAX_LOCATION_TIMEOUT_MS);
        self
    }
}

/// Raw position as reported by the platform; validated into a `LatLng`
/// by the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
}

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("location unavailable: {reason}")]
    Unavailable { reason: String },
}

pub type LocationResult = Result<Position, LocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation_clamps_timeout() {
        let config = LocationConfig::default().with_timeout_ms(1).validated();
        assert_eq!(config.timeout_ms, 1_000);

        let config = LocationConfig::default()
            .with_timeout_ms(10_000_000)
            .validated();
        assert_eq!(config.timeout_ms, MAX_LOCATION_TIMEOUT_MS);
    }

    #[test]
    fn test_failure_reasons_are_distinguishable() {
        let denied = LocationError::PermissionDenied;
        let timeout = LocationError::Timeout { timeout_ms: 15_000 };
        let other = LocationError::Unavailable {
            reason: "no GPS fix".into(),
        };
        assert_ne!(denied, timeout);
        assert_ne!(timeout, other);
        assert_ne!(denied, other);
    }
}
