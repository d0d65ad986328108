//! Map synchronization: keeps the marker set, the active selection and the
//! viewport consistent with the current collection-point list, and owns the
//! manual "search this area" affordance.

use serde::{Deserialize, Serialize};

use crate::geo::{GeoBounds, LatLng};
use crate::model::CollectionPoint;
use crate::Tunables;

/// One plotted point of interest. Exactly one marker is active at a time;
/// only the active marker has its detail callout open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub uri: String,
    pub label: String,
    pub position: LatLng,
    pub is_active: bool,
    pub callout_open: bool,
}

/// Instruction for the shell's map widget after a state change.
///
/// `PanTo` deliberately carries no zoom: re-centering on a newly selected
/// point must not change the zoom level, so repeated selection changes do
/// not disorient the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ViewportDirective {
    Unchanged,
    CenterOn { center: LatLng, zoom: f64 },
    FitBounds { bounds: GeoBounds, max_zoom: f64 },
    PanTo { center: LatLng },
}

impl Default for ViewportDirective {
    fn default() -> Self {
        Self::Unchanged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapViewState {
    markers: Vec<Marker>,
    active_index: usize,
    anchor: Option<LatLng>,
    viewport: ViewportDirective,
    fitted_once: bool,
    search_prompt: Option<LatLng>,
    searching_area: bool,
    no_points_found: bool,
}

impl MapViewState {
    /// First mount: center on the user at the default zoom.
    pub fn initialize(&mut self, user: LatLng, tunables: &Tunables) {
        self.anchor = Some(user);
        self.viewport = ViewportDirective::CenterOn {
            center: user,
            zoom: tunables.default_zoom,
        };
    }

    /// Rebuild the marker set from `{points, active_index}`.
    ///
    /// All previous markers are dropped and one marker is added per point
    /// with a resolvable position; the rest of the list stays usable for
    /// the textual listing only. The user anchor is carried even when zero
    /// points are plottable.
    ///
    /// Viewport: the first non-empty population with the initial selection
    /// fits the user plus every plottable point; afterwards a selection
    /// change pans to the active point without touching zoom.
    pub fn sync(
        &mut self,
        points: &[CollectionPoint],
        active_index: usize,
        user: Option<LatLng>,
        tunables: &Tunables,
    ) {
        let previous_active = self.active_index;
        let active_index = if points.is_empty() {
            0
        } else {
            active_index.min(points.len() - 1)
        };

        if let Some(user) = user {
            self.anchor = Some(user);
        }

        self.markers = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let position = p.position?;
                let is_active = i == active_index;
                Some(Marker {
                    uri: p.uri.clone(),
                    label: p.name.clone(),
                    position,
                    is_active,
                    callout_open: is_active,
                })
            })
            .collect();

        self.active_index = active_index;
        // A fresh point set supersedes any pending manual search.
        self.search_prompt = None;

        let active_position = points
            .get(active_index)
            .and_then(|p| p.position);

        self.viewport = if !self.fitted_once && !points.is_empty() {
            self.fitted_once = true;
            if active_index == 0 {
                self.fit_directive(user, tunables)
            } else {
                match active_position {
                    Some(center) => ViewportDirective::PanTo { center },
                    None => self.fit_directive(user, tunables),
                }
            }
        } else if active_index != previous_active {
            match active_position {
                Some(center) => ViewportDirective::PanTo { center },
                None => ViewportDirective::Unchanged,
            }
        } else {
            ViewportDirective::Unchanged
        };
    }

    fn fit_directive(&self, user: Option<LatLng>, tunables: &Tunables) -> ViewportDirective {
        let coords = user
            .into_iter()
            .chain(self.markers.iter().map(|m| m.position));

        match GeoBounds::containing(coords) {
            Some(bounds) => ViewportDirective::FitBounds {
                bounds: bounds.padded(tunables.fit_padding),
                max_zoom: tunables.fit_max_zoom,
            },
            None => ViewportDirective::Unchanged,
        }
    }

    /// The user dragged or zoomed the map themselves and the view settled:
    /// surface the transient "search in this area" affordance at the
    /// settled center. Programmatic settles are ignored.
    pub fn view_settled(&mut self, center: LatLng, user_initiated: bool) {
        if user_initiated && !self.searching_area {
            self.search_prompt = Some(center);
        }
    }

    pub fn dismiss_search_prompt(&mut self) {
        self.search_prompt = None;
    }

    /// Consume the prompt and enter the searching state. Returns the
    /// center to hand to the place-lookup collaborator.
    pub fn begin_area_search(&mut self) -> Option<LatLng> {
        let center = self.search_prompt.take()?;
        self.searching_area = true;
        self.no_points_found = false;
        Some(center)
    }

    /// A manual area search completed; `merged_is_empty` drives the
    /// neutral "no points found here" state instead of a silently empty
    /// map.
    pub fn finish_area_search(&mut self, merged_is_empty: bool) {
        self.searching_area = false;
        self.no_points_found = merged_is_empty;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    #[must_use]
    pub fn anchor(&self) -> Option<LatLng> {
        self.anchor
    }

    #[must_use]
    pub fn viewport(&self) -> ViewportDirective {
        self.viewport
    }

    #[must_use]
    pub fn search_prompt(&self) -> Option<LatLng> {
        self.search_prompt
    }

    #[must_use]
    pub fn is_searching_area(&self) -> bool {
        self.searching_area
    }

    #[must_use]
    pub fn no_points_found(&self) -> bool {
        self.no_points_found
    }
}

/// Merge newly returned points into the existing list: existing entries
/// keep their order, duplicates (by place URI) are dropped, and the
/// combined list is capped.
#[must_use]
pub fn merge_points(
    existing: &[CollectionPoint],
    incoming: Vec<CollectionPoint>,
    cap: usize,
) -> Vec<CollectionPoint> {
    let mut merged: Vec<CollectionPoint> = existing.to_vec();
    for point in incoming {
        if merged.len() >= cap {
            break;
        }
        if merged.iter().any(|p| p.uri == point.uri) {
            continue;
        }
        merged.push(point);
    }
    merged.truncate(cap);
    merged
}
