use crux_core::testing::AppTester;
use ecotri_core::capabilities::{HttpResponse, Position};
use ecotri_core::map_view::ViewportDirective;
use ecotri_core::model::QueryInput;
use ecotri_core::{App, Effect, Event, Model};
use serde_json::json;

fn app() -> AppTester<App, Effect> {
    AppTester::default()
}

fn classified_model() -> (AppTester<App, Effect>, Model) {
    let app = app();
    let mut model = Model::default();

    app.update(
        Event::AssistantKeySubmitted {
            api_key: "AIza-test-key-123456".into(),
        },
        &mut model,
    );
    app.update(
        Event::LocationResponse(Box::new(Ok(Position {
            lat: 48.8566,
            lng: 2.3522,
            accuracy_m: None,
        }))),
        &mut model,
    );
    app.update(
        Event::QuerySubmitted(Box::new(QueryInput::Text("batteries".into()))),
        &mut model,
    );

    let payload = json!({
        "itemName": "Batteries",
        "bin": "TAKE_BACK_POINT",
        "explanation": "Retail take-back bins accept household batteries.",
        "tips": [],
        "isRecyclable": true
    })
    .to_string();
    let body = serde_json::to_vec(&json!({
        "candidates": [{ "content": { "parts": [{ "text": payload }] } }]
    }))
    .unwrap();
    app.update(
        Event::ClassificationResponse(Box::new(Ok(HttpResponse { status: 200, body }))),
        &mut model,
    );

    (app, model)
}

fn grounding_body(uris: &[(&str, &str)]) -> Vec<u8> {
    let chunks: Vec<_> = uris
        .iter()
        .map(|(title, uri)| json!({ "maps": { "title": title, "uri": uri } }))
        .collect();
    serde_json::to_vec(&json!({
        "candidates": [{ "groundingMetadata": { "groundingChunks": chunks } }]
    }))
    .unwrap()
}

fn nearby(app: &AppTester<App, Effect>, model: &mut Model, uris: &[(&str, &str)]) {
    app.update(
        Event::NearbyPointsResponse {
            for_item: "Batteries".into(),
            result: Box::new(Ok(HttpResponse {
                status: 200,
                body: grounding_body(uris),
            })),
        },
        model,
    );
}

const POINTS: &[(&str, &str)] = &[
    ("Supermarket A", "https://maps.example.com/a/@48.857,2.352,15z"),
    ("Supermarket B", "https://maps.example.com/b/@48.860,2.340,15z"),
    ("Town hall", "https://maps.example.com/c/@48.850,2.360,15z"),
    ("Listing only", "https://maps.example.com/d?cid=42"),
];

#[test]
fn first_point_set_fits_user_and_points() {
    let (app, mut model) = classified_model();
    nearby(&app, &mut model, POINTS);

    let result = model.result.as_ref().unwrap();
    assert_eq!(result.nearby_points.len(), 4);

    // Three plottable markers; the listing-only point is skipped.
    assert_eq!(model.map.markers().len(), 3);
    assert!(model.map.anchor().is_some());

    let ViewportDirective::FitBounds { bounds, .. } = model.map.viewport() else {
        panic!("expected first population to fit, got {:?}", model.map.viewport());
    };
    assert!(bounds.contains(model.location.unwrap()));
    for marker in model.map.markers() {
        assert!(bounds.contains(marker.position));
    }
}

#[test]
fn selecting_a_point_pans_and_keeps_one_active() {
    let (app, mut model) = classified_model();
    nearby(&app, &mut model, POINTS);

    let update = app.update(Event::ActivePointSelected { index: 2 }, &mut model);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));

    assert_eq!(model.map.active_index(), 2);
    assert_eq!(
        model.map.markers().iter().filter(|m| m.is_active).count(),
        1
    );
    let active = model.map.markers().iter().find(|m| m.is_active).unwrap();
    assert!(active.callout_open);
    assert!(matches!(
        model.map.viewport(),
        ViewportDirective::PanTo { center } if center == active.position
    ));

    // Re-selecting the same index changes nothing.
    let markers_before = model.map.markers().to_vec();
    app.update(Event::ActivePointSelected { index: 2 }, &mut model);
    assert_eq!(model.map.markers(), markers_before.as_slice());
    assert_eq!(model.map.viewport(), ViewportDirective::Unchanged);
}

#[test]
fn manual_pan_surfaces_search_affordance() {
    let (app, mut model) = classified_model();
    nearby(&app, &mut model, POINTS);

    app.update(
        Event::MapViewSettled {
            lat: 48.90,
            lng: 2.40,
            user_initiated: false,
        },
        &mut model,
    );
    assert!(model.map.search_prompt().is_none());

    app.update(
        Event::MapViewSettled {
            lat: 48.90,
            lng: 2.40,
            user_initiated: true,
        },
        &mut model,
    );
    let prompt = model.map.search_prompt().expect("prompt visible");
    assert!((prompt.lat() - 48.90).abs() < 1e-9);

    app.update(Event::SearchPromptDismissed, &mut model);
    assert!(model.map.search_prompt().is_none());
}

#[test]
fn area_search_merges_dedupes_caps_and_resets_active() {
    let (app, mut model) = classified_model();
    nearby(&app, &mut model, POINTS);
    app.update(Event::ActivePointSelected { index: 2 }, &mut model);

    app.update(
        Event::MapViewSettled {
            lat: 48.90,
            lng: 2.40,
            user_initiated: true,
        },
        &mut model,
    );
    let update = app.update(Event::SearchAreaRequested, &mut model);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert!(model.map.is_searching_area());
    assert!(model.map.search_prompt().is_none());

    // Six results, two of which duplicate existing URIs.
    let incoming: Vec<(&str, &str)> = vec![
        ("Supermarket A", "https://maps.example.com/a/@48.857,2.352,15z"),
        ("Town hall", "https://maps.example.com/c/@48.850,2.360,15z"),
        ("New 1", "https://maps.example.com/e/@48.901,2.401,15z"),
        ("New 2", "https://maps.example.com/f/@48.902,2.402,15z"),
        ("New 3", "https://maps.example.com/g/@48.903,2.403,15z"),
        ("New 4", "https://maps.example.com/h/@48.904,2.404,15z"),
    ];
    app.update(
        Event::SearchAreaResponse(Box::new(Ok(HttpResponse {
            status: 200,
            body: grounding_body(&incoming),
        }))),
        &mut model,
    );

    let points = &model.result.as_ref().unwrap().nearby_points;
    assert_eq!(points.len(), 8);

    let mut uris: Vec<_> = points.iter().map(|p| p.uri.clone()).collect();
    uris.sort();
    uris.dedup();
    assert_eq!(uris.len(), 8);

    // Active selection resets to the first entry.
    assert_eq!(model.map.active_index(), 0);
    assert!(!model.map.is_searching_area());
    assert!(!model.map.no_points_found());
}

#[test]
fn empty_area_search_shows_neutral_state() {
    let (app, mut model) = classified_model();
    // No initial nearby points at all.
    app.update(
        Event::MapViewSettled {
            lat: 48.90,
            lng: 2.40,
            user_initiated: true,
        },
        &mut model,
    );
    app.update(Event::SearchAreaRequested, &mut model);
    app.update(
        Event::SearchAreaResponse(Box::new(Ok(HttpResponse {
            status: 200,
            body: grounding_body(&[]),
        }))),
        &mut model,
    );

    assert!(model.result.as_ref().unwrap().nearby_points.is_empty());
    assert!(model.map.no_points_found());
    assert!(model.map.markers().is_empty());
    // The user anchor is still there for the map to render.
    assert!(model.map.anchor().is_some());
}

#[test]
fn failed_area_search_keeps_existing_points() {
    let (app, mut model) = classified_model();
    nearby(&app, &mut model, POINTS);

    app.update(
        Event::MapViewSettled {
            lat: 48.90,
            lng: 2.40,
            user_initiated: true,
        },
        &mut model,
    );
    app.update(Event::SearchAreaRequested, &mut model);
    app.update(
        Event::SearchAreaResponse(Box::new(Err(
            ecotri_core::capabilities::HttpError::Timeout,
        ))),
        &mut model,
    );

    assert_eq!(model.result.as_ref().unwrap().nearby_points.len(), 4);
    assert!(!model.map.is_searching_area());
    assert!(!model.map.no_points_found());
}

#[test]
fn empty_nearby_response_leaves_field_absent() {
    let (app, mut model) = classified_model();
    nearby(&app, &mut model, &[]);

    assert!(model.result.as_ref().unwrap().nearby_points.is_empty());
    assert!(model.map.markers().is_empty());
}
