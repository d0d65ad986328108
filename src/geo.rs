use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Lower bound for a fitted viewport; anything below this shows half the planet.
pub const MIN_FIT_ZOOM: f64 = 2.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Latitude {0} is out of valid range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is out of valid range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Coordinate value is not finite (NaN or Infinity)")]
    NonFinite,
}

/// Validated, NaN-safe coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    lat: f64,
    lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    #[must_use]
    pub const fn lat(self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lng(self) -> f64 {
        self.lng
    }

    #[must_use]
    pub const fn as_tuple(self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        haversine_distance(self, other)
    }
}

impl TryFrom<(f64, f64)> for LatLng {
    type Error = CoordinateError;

    fn try_from((lat, lng): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(lat, lng)
    }
}

#[must_use]
pub fn haversine_distance(p1: LatLng, p2: LatLng) -> f64 {
    const EPSILON: f64 = 1e-10;

    if (p1.lat - p2.lat).abs() < EPSILON && (p1.lng - p2.lng).abs() < EPSILON {
        return 0.0;
    }

    let lat1_rad = p1.lat.to_radians();
    let lat2_rad = p2.lat.to_radians();
    let delta_lat = (p2.lat - p1.lat).to_radians();
    let delta_lng = (p2.lng - p1.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().asin();
    let result = EARTH_RADIUS_M * c;

    if result.is_finite() {
        result
    } else {
        f64::MAX
    }
}

/// Axis-aligned bounding region over one or more coordinates.
///
/// Longitude is treated as a plain interval; collection points are always
/// within a few kilometres of the user, so antimeridian wrapping is not a
/// case this app can produce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    min_lat: f64,
    min_lng: f64,
    max_lat: f64,
    max_lng: f64,
}

impl GeoBounds {
    #[must_use]
    pub fn from_point(p: LatLng) -> Self {
        Self {
            min_lat: p.lat(),
            min_lng: p.lng(),
            max_lat: p.lat(),
            max_lng: p.lng(),
        }
    }

    pub fn extend(&mut self, p: LatLng) {
        self.min_lat = self.min_lat.min(p.lat());
        self.min_lng = self.min_lng.min(p.lng());
        self.max_lat = self.max_lat.max(p.lat());
        self.max_lng = self.max_lng.max(p.lng());
    }

    #[must_use]
    pub fn containing(points: impl IntoIterator<Item = LatLng>) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bounds = Self::from_point(iter.next()?);
        for p in iter {
            bounds.extend(p);
        }
        Some(bounds)
    }

    #[must_use]
    pub fn contains(&self, p: LatLng) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.lat())
            && (self.min_lng..=self.max_lng).contains(&p.lng())
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        // Midpoint of a valid bounds is always a valid coordinate.
        LatLng {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lng: (self.min_lng + self.max_lng) / 2.0,
        }
    }

    #[must_use]
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    #[must_use]
    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// Expand both spans by `fraction` on each side, clamped to the valid
    /// coordinate domain.
    #[must_use]
    pub fn padded(&self, fraction: f64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        let lat_pad = self.lat_span() * fraction;
        let lng_pad = self.lng_span() * fraction;
        Self {
            min_lat: (self.min_lat - lat_pad).max(-90.0),
            min_lng: (self.min_lng - lng_pad).max(-180.0),
            max_lat: (self.max_lat + lat_pad).min(90.0),
            max_lng: (self.max_lng + lng_pad).min(180.0),
        }
    }

    /// Web-mercator zoom level at which this region fits in a single square
    /// viewport, clamped to `[MIN_FIT_ZOOM, max_zoom]` so a degenerate
    /// single-point region does not over-zoom.
    #[must_use]
    pub fn zoom_to_fit(&self, max_zoom: f64) -> f64 {
        let span = self.lat_span().max(self.lng_span());
        if span <= f64::EPSILON {
            return max_zoom;
        }
        let zoom = (360.0 / span).log2().floor();
        zoom.clamp(MIN_FIT_ZOOM, max_zoom)
    }
}

// Place-URI coordinate conventions, tried in order. The upstream place
// lookup returns opaque map links in several shapes; extraction is
// best-effort and a miss means "cannot be plotted", never an error.
static AT_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)").expect("valid @ regex"));
static PATH_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(-?\d+\.\d+)[,/](-?\d+\.\d+)(?:[/?#]|$)").expect("valid path pair regex")
});
static BARE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$").expect("valid pair regex")
});

/// Recover an embedded latitude/longitude from an opaque place URI.
///
/// Conventions, in order: an `@lat,lng` segment, an explicit
/// latitude/longitude query-parameter pair, a `lat,lng` comma pair inside a
/// single query parameter (`q`, `query`, `ll`, `center`, `destination`),
/// and finally a path-segment pair. Returns the first convention that
/// yields an in-range pair.
#[must_use]
pub fn extract_latlng(uri: &str) -> Option<LatLng> {
    if let Some(p) = capture_pair(&AT_PAIR, uri) {
        return Some(p);
    }

    if let Ok(url) = Url::parse(uri) {
        if let Some(p) = from_query_params(&url) {
            return Some(p);
        }
        if let Some(p) = capture_pair(&PATH_PAIR, url.path()) {
            return Some(p);
        }
    } else if let Some(p) = capture_pair(&PATH_PAIR, uri) {
        // Not a parseable URL; still try the path convention on the raw text.
        return Some(p);
    }

    None
}

fn capture_pair(re: &Regex, haystack: &str) -> Option<LatLng> {
    let caps = re.captures(haystack)?;
    parse_pair(caps.get(1)?.as_str(), caps.get(2)?.as_str())
}

fn parse_pair(lat: &str, lng: &str) -> Option<LatLng> {
    let lat: f64 = lat.parse().ok()?;
    let lng: f64 = lng.parse().ok()?;
    LatLng::new(lat, lng).ok()
}

fn from_query_params(url: &Url) -> Option<LatLng> {
    let mut lat: Option<String> = None;
    let mut lng: Option<String> = None;

    for (key, value) in url.query_pairs() {
        match key.to_ascii_lowercase().as_str() {
            "lat" | "latitude" => lat = Some(value.into_owned()),
            "lng" | "lon" | "longitude" => lng = Some(value.into_owned()),
            "q" | "query" | "ll" | "center" | "destination" => {
                if let Some(caps) = BARE_PAIR.captures(&value) {
                    if let Some(p) = parse_pair(&caps[1], &caps[2]) {
                        return Some(p);
                    }
                }
            }
            _ => {}
        }
    }

    parse_pair(lat.as_deref()?, lng.as_deref()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latlng_rejects_out_of_range() {
        assert!(matches!(
            LatLng::new(91.0, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(_))
        ));
        assert!(matches!(
            LatLng::new(0.0, -181.0),
            Err(CoordinateError::LongitudeOutOfRange(_))
        ));
        assert!(matches!(
            LatLng::new(f64::NAN, 0.0),
            Err(CoordinateError::NonFinite)
        ));
        assert!(matches!(
            LatLng::new(0.0, f64::INFINITY),
            Err(CoordinateError::NonFinite)
        ));
    }

    #[test]
    fn test_latlng_accepts_boundaries() {
        assert!(LatLng::new(90.0, 180.0).is_ok());
        assert!(LatLng::new(-90.0, -180.0).is_ok());
        assert!(LatLng::new(48.8566, 2.3522).is_ok());
    }

    #[test]
    fn test_haversine_same_point() {
        let p = LatLng::new(48.8566, 2.3522).unwrap();
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_haversine_paris_lyon() {
        let paris = LatLng::new(48.8566, 2.3522).unwrap();
        let lyon = LatLng::new(45.7640, 4.8357).unwrap();
        let d = haversine_distance(paris, lyon);
        assert!((d - 391_000.0).abs() < 10_000.0, "got {d}");
    }

    #[test]
    fn test_bounds_contains_all_inputs() {
        let points = [
            LatLng::new(48.85, 2.35).unwrap(),
            LatLng::new(48.86, 2.30).unwrap(),
            LatLng::new(48.80, 2.40).unwrap(),
        ];
        let bounds = GeoBounds::containing(points).unwrap();
        for p in points {
            assert!(bounds.contains(p));
        }
        assert!(bounds.padded(0.15).contains(bounds.center()));
    }

    #[test]
    fn test_bounds_zoom_clamped() {
        let single = GeoBounds::from_point(LatLng::new(48.85, 2.35).unwrap());
        assert_eq!(single.zoom_to_fit(16.0), 16.0);

        let mut wide = GeoBounds::from_point(LatLng::new(-60.0, -170.0).unwrap());
        wide.extend(LatLng::new(60.0, 170.0).unwrap());
        assert_eq!(wide.zoom_to_fit(16.0), MIN_FIT_ZOOM);
    }

    #[test]
    fn test_extract_at_segment() {
        let p = extract_latlng("https://maps.google.com/maps/place/X/@48.8566,2.3522,15z").unwrap();
        assert!((p.lat() - 48.8566).abs() < 1e-9);
        assert!((p.lng() - 2.3522).abs() < 1e-9);
    }

    #[test]
    fn test_extract_query_param_pair() {
        let p = extract_latlng("https://example.com/place?latitude=45.764&longitude=4.8357")
            .unwrap();
        assert!((p.lat() - 45.764).abs() < 1e-9);
        assert!((p.lng() - 4.8357).abs() < 1e-9);
    }

    #[test]
    fn test_extract_single_param_pair() {
        let p = extract_latlng("https://maps.example.com/?q=43.2965,5.3698").unwrap();
        assert!((p.lat() - 43.2965).abs() < 1e-9);

        let encoded = extract_latlng("https://maps.example.com/?q=43.2965%2C5.3698").unwrap();
        assert_eq!(encoded, p);
    }

    #[test]
    fn test_extract_path_segments() {
        let p = extract_latlng("https://osm.example.org/node/47.2184/-1.5536").unwrap();
        assert!((p.lat() - 47.2184).abs() < 1e-9);
        assert!((p.lng() + 1.5536).abs() < 1e-9);
    }

    #[test]
    fn test_extract_rejects_out_of_range_pair() {
        assert!(extract_latlng("https://maps.example.com/@123.0,456.0,15z").is_none());
    }

    #[test]
    fn test_extract_none_for_plain_uri() {
        assert!(extract_latlng("https://maps.google.com/?cid=12345").is_none());
        assert!(extract_latlng("not a uri at all").is_none());
        assert!(extract_latlng("").is_none());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Round-trip: a URI built with a known pair must extract the
            // same pair, for every supported convention.
            #[test]
            fn at_segment_round_trips(
                lat in -89.0f64..89.0,
                lng in -179.0f64..179.0,
            ) {
                let uri = format!("https://maps.google.com/maps/@{lat:.6},{lng:.6},15z");
                let p = extract_latlng(&uri).expect("pair must extract");
                prop_assert!((p.lat() - lat).abs() < 1e-5);
                prop_assert!((p.lng() - lng).abs() < 1e-5);
            }

            #[test]
            fn query_params_round_trip(
                lat in -89.0f64..89.0,
                lng in -179.0f64..179.0,
            ) {
                let uri = format!("https://example.com/p?lat={lat:.6}&lng={lng:.6}");
                let p = extract_latlng(&uri).expect("pair must extract");
                prop_assert!((p.lat() - lat).abs() < 1e-5);
                prop_assert!((p.lng() - lng).abs() < 1e-5);
            }

            #[test]
            fn extraction_never_panics(s in "\\PC*") {
                let _ = extract_latlng(&s);
            }
        }
    }
}
