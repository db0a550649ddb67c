//! End-to-end kernel tests over the deterministic fake engine.

mod common;

use std::f64::consts::PI;
use std::sync::atomic::Ordering;

use serde_json::json;

use common::{build_harness, test_config, TestHarness};
use geogov::audit::AuditStatus;
use geogov::types::{GeoJson, QueryRequest, QueryResponse, ResultValue, VerificationStatus};

fn point_sf() -> GeoJson {
    json!({"type": "Point", "coordinates": [-122.42, 37.77]})
}

fn buffer_request(geometry: GeoJson, distance: f64) -> QueryRequest {
    QueryRequest {
        operation: Some("buffer".to_string()),
        geometry: Some(geometry),
        distance: Some(distance),
        units: Some("meters".to_string()),
        ..Default::default()
    }
}

fn area_request(geometry: GeoJson) -> QueryRequest {
    QueryRequest {
        operation: Some("area".to_string()),
        geometry: Some(geometry),
        units: Some("square_meters".to_string()),
        ..Default::default()
    }
}

fn result_geometry(response: &QueryResponse) -> GeoJson {
    match &response.result.as_ref().expect("result present").value {
        ResultValue::Geometry(g) => g.clone(),
        other => panic!("expected geometry result, got {:?}", other),
    }
}

fn result_scalar(response: &QueryResponse) -> f64 {
    match &response.result.as_ref().expect("result present").value {
        ResultValue::Scalar(v) => *v,
        other => panic!("expected scalar result, got {:?}", other),
    }
}

#[tokio::test]
async fn buffer_produces_polygon_with_geodesic_area() {
    let TestHarness { kernel, audit, .. } = build_harness(test_config());

    let response = kernel.execute(buffer_request(point_sf(), 500.0)).await;
    assert_eq!(response.status, "completed", "{:?}", response.error);
    assert_eq!(
        response.verification_status,
        Some(VerificationStatus::Verified)
    );
    assert_eq!(
        response.evidence.as_ref().map(|e| e.engine.as_str()),
        Some("fake:memory")
    );

    let polygon = result_geometry(&response);
    assert_eq!(polygon["type"], "Polygon");

    let area_response = kernel.execute(area_request(polygon)).await;
    assert_eq!(area_response.status, "completed");
    let area = result_scalar(&area_response);
    let expected = PI * 500.0 * 500.0;
    assert!(
        (area - expected).abs() / expected < 0.02,
        "area {} vs expected {}",
        area,
        expected
    );

    assert_eq!(audit.len(), 2);
    assert!(audit
        .recent(10)
        .iter()
        .all(|r| r.status == AuditStatus::Success));
}

#[tokio::test]
async fn repeated_buffering_never_shrinks_area() {
    let TestHarness { kernel, .. } = build_harness(test_config());

    let first = kernel.execute(buffer_request(point_sf(), 500.0)).await;
    let polygon_1 = result_geometry(&first);
    let area_1 = result_scalar(&kernel.execute(area_request(polygon_1.clone())).await);

    let second = kernel.execute(buffer_request(polygon_1, 100.0)).await;
    assert_eq!(second.status, "completed");
    let polygon_2 = result_geometry(&second);
    let area_2 = result_scalar(&kernel.execute(area_request(polygon_2)).await);

    assert!(area_2 >= area_1, "area shrank: {} -> {}", area_1, area_2);
}

#[tokio::test]
async fn neighbor_order_is_independent_of_storage_crs() {
    let TestHarness { kernel, .. } = build_harness(test_config());

    let request_for = |dataset: &str| QueryRequest {
        operation: Some("nearest-neighbors".to_string()),
        geometry: Some(point_sf()),
        dataset: Some(dataset.to_string()),
        limit: Some(5),
        credential: Some("member-key".to_string()),
        ..Default::default()
    };

    let ordered_ids = |response: &QueryResponse| -> Vec<String> {
        match &response.result.as_ref().expect("result").value {
            ResultValue::Features(features) => {
                let distances: Vec<f64> =
                    features.iter().filter_map(|f| f.distance_meters).collect();
                assert!(
                    distances.windows(2).all(|w| w[0] <= w[1]),
                    "distances not ascending: {:?}",
                    distances
                );
                features.iter().map(|f| f.id.clone()).collect()
            }
            other => panic!("expected features, got {:?}", other),
        }
    };

    let native = kernel.execute(request_for("data.features")).await;
    assert_eq!(native.status, "completed", "{:?}", native.error);
    let mercator = kernel.execute(request_for("data.features_mercator")).await;
    assert_eq!(mercator.status, "completed");

    let native_ids = ordered_ids(&native);
    assert_eq!(native_ids.len(), 5);
    assert_eq!(native_ids, ordered_ids(&mercator));

    // Only the attributed dataset verifies fully.
    assert_eq!(
        native.verification_status,
        Some(VerificationStatus::Verified)
    );
    assert_eq!(
        mercator.verification_status,
        Some(VerificationStatus::Unverified)
    );
    assert_eq!(
        mercator.evidence.as_ref().map(|e| e.datasets.clone()),
        Some(vec!["data.features_mercator".to_string()])
    );
}

#[tokio::test]
async fn invalid_planner_distance_never_reaches_the_pool() {
    let TestHarness {
        kernel,
        audit,
        stats,
    } = build_harness(test_config());

    // The stub planner echoes the embedded object, so the resolver sees a
    // buffer candidate with a non-numeric distance.
    let prompt = format!(
        "buffer this by abc meters {}",
        json!({
            "operation": "buffer",
            "geometry": point_sf(),
            "distance": "abc",
            "units": "meters",
        })
    );
    let response = kernel
        .execute(QueryRequest {
            prompt: Some(prompt),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status, "error");
    assert_eq!(response.error.as_ref().unwrap().kind, "validation_error");
    assert_eq!(stats.connects.load(Ordering::SeqCst), 0);
    assert_eq!(stats.calls.load(Ordering::SeqCst), 0);

    let records = audit.recent(10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Failure);
    let reference = records[0].prompt_reference.as_deref().unwrap();
    assert!(reference.starts_with("redacted:sha256:"));
    assert!(!reference.contains("meters"));
}

#[tokio::test]
async fn sixty_first_request_in_window_is_rate_limited() {
    let mut config = test_config();
    config.gateway.rate_limit_requests = 60;
    config.gateway.rate_limit_window_seconds = 60;
    let TestHarness { kernel, audit, .. } = build_harness(config);

    for i in 0..60 {
        let response = kernel.execute(area_request(point_sf())).await;
        assert_eq!(response.status, "completed", "request {} limited early", i);
    }

    let limited = kernel.execute(area_request(point_sf())).await;
    assert_eq!(limited.status, "error");
    let error = limited.error.unwrap();
    assert_eq!(error.kind, "rate_limited");
    // Continuous refill: the next token is at most one window away.
    let retry_after = error.retry_after_seconds.unwrap();
    assert!(
        (1..=60).contains(&retry_after),
        "retry_after {} outside window",
        retry_after
    );

    assert_eq!(audit.len(), 61);
}

#[tokio::test]
async fn unknown_credential_is_unauthenticated_and_audited_hashed() {
    let TestHarness { kernel, audit, .. } = build_harness(test_config());

    let response = kernel
        .execute(QueryRequest {
            credential: Some("nope-key".to_string()),
            ..area_request(point_sf())
        })
        .await;

    assert_eq!(response.status, "error");
    assert_eq!(response.error.as_ref().unwrap().kind, "unauthenticated");

    let records = audit.recent(10);
    assert_eq!(records.len(), 1);
    assert!(records[0].identity_fingerprint.starts_with("sha256:"));
    let serialized = serde_json::to_string(&records[0]).unwrap();
    assert!(!serialized.contains("nope-key"));
}

#[tokio::test]
async fn default_deny_blocks_public_nearest_neighbors() {
    let TestHarness { kernel, stats, .. } = build_harness(test_config());

    let response = kernel
        .execute(QueryRequest {
            operation: Some("nearest-neighbors".to_string()),
            geometry: Some(point_sf()),
            dataset: Some("data.features".to_string()),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status, "error");
    let error = response.error.unwrap();
    assert_eq!(error.kind, "unauthorized");
    // Generic phrasing: no hint about which check failed.
    assert_eq!(error.message, "Insufficient permissions for this operation.");
    assert_eq!(stats.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_load_respects_pool_bound() {
    let mut config = test_config();
    config.pool.max_connections = 2;
    let TestHarness {
        kernel,
        audit,
        stats,
    } = build_harness(config);
    stats.sleep_ms.store(30, Ordering::SeqCst);

    let requests = (0..10).map(|_| kernel.execute(buffer_request(point_sf(), 100.0)));
    for response in futures::future::join_all(requests).await {
        assert_eq!(response.status, "completed", "{:?}", response.error);
    }

    assert!(stats.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(audit.len(), 10);
}

#[tokio::test]
async fn deadline_cancels_releases_pool_and_still_audits() {
    let mut config = test_config();
    config.request_deadline_ms = 50;
    let TestHarness {
        kernel,
        audit,
        stats,
    } = build_harness(config);
    stats.sleep_ms.store(500, Ordering::SeqCst);

    let response = kernel.execute(buffer_request(point_sf(), 100.0)).await;
    assert_eq!(response.status, "error");
    assert_eq!(response.error.as_ref().unwrap().kind, "timeout");

    let records = audit.recent(10);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind, Some("timeout"));

    // The cancelled request released its connection; the pool is usable.
    let health = kernel.health();
    assert_eq!(health.pool_available, health.pool_size);
    stats.sleep_ms.store(0, Ordering::SeqCst);
    let retry = kernel.execute(buffer_request(point_sf(), 100.0)).await;
    assert_eq!(retry.status, "completed");
}

#[tokio::test]
async fn every_outcome_leaves_exactly_one_audit_record() {
    let TestHarness { kernel, audit, .. } = build_harness(test_config());

    // Success.
    kernel.execute(area_request(point_sf())).await;
    // Validation failure (missing geometry).
    kernel
        .execute(QueryRequest {
            operation: Some("area".to_string()),
            ..Default::default()
        })
        .await;
    // Unauthorized.
    kernel
        .execute(QueryRequest {
            operation: Some("nearest-neighbors".to_string()),
            geometry: Some(point_sf()),
            dataset: Some("data.features".to_string()),
            ..Default::default()
        })
        .await;
    // Unauthenticated.
    kernel
        .execute(QueryRequest {
            credential: Some("bogus".to_string()),
            ..area_request(point_sf())
        })
        .await;
    // Neither operation nor prompt.
    kernel.execute(QueryRequest::default()).await;

    assert_eq!(audit.len(), 5);
}

#[tokio::test]
async fn disjoint_intersection_returns_null_geometry() {
    let TestHarness { kernel, .. } = build_harness(test_config());

    let square = |offset: f64| -> GeoJson {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [offset, 0.0], [offset + 1.0, 0.0],
                [offset + 1.0, 1.0], [offset, 1.0], [offset, 0.0]
            ]]
        })
    };

    let response = kernel
        .execute(QueryRequest {
            operation: Some("intersection".to_string()),
            geometry: Some(square(0.0)),
            geometry_b: Some(square(10.0)),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status, "completed");
    match &response.result.as_ref().unwrap().value {
        ResultValue::Geometry(g) => assert!(g.is_null()),
        other => panic!("expected geometry, got {:?}", other),
    }
}

#[tokio::test]
async fn natural_language_path_resolves_and_executes() {
    let TestHarness { kernel, stats, .. } = build_harness(test_config());

    // Stub keyword table resolves this to a 500 m buffer.
    let response = kernel
        .execute(QueryRequest {
            prompt: Some("buffer the point please".to_string()),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status, "completed", "{:?}", response.error);
    assert_eq!(
        response.operation,
        Some(geogov::types::OperationName::Buffer)
    );
    assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
    let polygon = result_geometry(&response);
    assert_eq!(polygon["type"], "Polygon");
}

#[tokio::test]
async fn transform_reprojects_through_the_engine() {
    let TestHarness { kernel, .. } = build_harness(test_config());

    let response = kernel
        .execute(QueryRequest {
            operation: Some("transform-crs".to_string()),
            geometry: Some(point_sf()),
            from_epsg: Some(4326),
            to_epsg: Some(3857),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status, "completed");
    assert_eq!(response.result.as_ref().unwrap().crs_used, 3857);
    let projected = result_geometry(&response);
    let x = projected["coordinates"][0].as_f64().unwrap();
    // -122.42 degrees is about -13.6 million meters in web mercator.
    assert!((x + 13_627_665.0).abs() < 10_000.0, "x was {}", x);
}
