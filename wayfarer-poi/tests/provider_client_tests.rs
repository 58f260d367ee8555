// Provider client normalization tests
//
// Canned provider responses served from a local mock server; verifies each
// client's wire-format handling and its mapping of transport failures onto
// the typed provider errors.

use httpmock::prelude::*;
use wayfarer_poi::models::Source;
use wayfarer_poi::services::{GeoapifyClient, OpenTripMapClient};
use wayfarer_poi::types::{LocationResolver, ProviderError, SourceFetcher, SourceQuery};

fn query() -> SourceQuery {
    SourceQuery {
        latitude: 48.8584,
        longitude: 2.2945,
        radius_meters: 2_000,
        categories: vec![],
        limit: 10,
    }
}

fn opentripmap(server: &MockServer) -> OpenTripMapClient {
    OpenTripMapClient::new("test-key".into())
        .unwrap()
        .with_base_url(server.base_url())
}

fn geoapify(server: &MockServer) -> GeoapifyClient {
    GeoapifyClient::new("test-key".into())
        .unwrap()
        .with_base_url(server.base_url())
}

// ------------------------------------------------------------------------
// OpenTripMap
// ------------------------------------------------------------------------

#[tokio::test]
async fn opentripmap_normalizes_radius_response() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/en/places/radius")
            .query_param("format", "json")
            .query_param("apikey", "test-key");
        then.status(200).json_body(serde_json::json!([
            {
                "xid": "W12345",
                "name": "Champ de Mars",
                "kinds": "gardens_and_parks,urban_environment",
                "rate": 7,
                "dist": 210.5,
                "point": {"lat": 48.8556, "lon": 2.2986}
            },
            {
                // Unnamed feature: dropped during normalization
                "xid": "N999",
                "name": "",
                "kinds": "other",
                "point": {"lat": 48.85, "lon": 2.29}
            }
        ]));
    });

    let pois = opentripmap(&server).fetch(&query()).await.unwrap();
    mock.assert();

    assert_eq!(pois.len(), 1);
    assert_eq!(pois[0].id, "W12345");
    assert_eq!(pois[0].source, Source::Opentripmap);
    assert_eq!(
        pois[0].categories,
        vec!["gardens_and_parks", "urban_environment"]
    );
    assert_eq!(pois[0].coordinates(), Some((48.8556, 2.2986)));
    assert_eq!(pois[0].extra.get("rate"), Some(&serde_json::json!(7)));
}

#[tokio::test]
async fn opentripmap_maps_http_status_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/en/places/radius");
        then.status(429);
    });

    match opentripmap(&server).fetch(&query()).await {
        Err(ProviderError::Http(429)) => {}
        other => panic!("expected Http(429), got {:?}", other),
    }
}

#[tokio::test]
async fn opentripmap_maps_malformed_payloads() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/en/places/radius");
        then.status(200)
            .header("content-type", "application/json")
            .body("{\"not\": \"an array\"");
    });

    assert!(matches!(
        opentripmap(&server).fetch(&query()).await,
        Err(ProviderError::Parse(_))
    ));
}

#[tokio::test]
async fn opentripmap_forwards_categories_as_kinds() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/en/places/radius")
            .query_param("kinds", "museums,gardens_and_parks");
        then.status(200).json_body(serde_json::json!([]));
    });

    let mut q = query();
    q.categories = vec!["museums".into(), "gardens_and_parks".into()];
    let pois = opentripmap(&server).fetch(&q).await.unwrap();

    mock.assert();
    assert!(pois.is_empty());
}

// ------------------------------------------------------------------------
// Geoapify
// ------------------------------------------------------------------------

#[tokio::test]
async fn geoapify_normalizes_feature_collection() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/places")
            .query_param("apiKey", "test-key");
        then.status(200).json_body(serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {
                        "place_id": "51abc",
                        "name": "Pont Neuf",
                        "lat": 48.857,
                        "lon": 2.341,
                        "categories": ["tourism.sights"],
                        "city": "Paris"
                    },
                    "geometry": {"type": "Point", "coordinates": [2.341, 48.857]}
                }
            ]
        }));
    });

    let pois = geoapify(&server).fetch(&query()).await.unwrap();
    mock.assert();

    assert_eq!(pois.len(), 1);
    assert_eq!(pois[0].id, "51abc");
    assert_eq!(pois[0].source, Source::Geoapify);
    assert_eq!(pois[0].extra.get("city"), Some(&serde_json::json!("Paris")));
}

#[tokio::test]
async fn geoapify_geocodes_place_names() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/geocode/search")
            .query_param("text", "eiffel tower")
            .query_param("limit", "1");
        then.status(200).json_body(serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"lat": 48.8584, "lon": 2.2945, "formatted": "Eiffel Tower, Paris"}
                }
            ]
        }));
    });

    let resolved = geoapify(&server)
        .resolve("eiffel tower")
        .await
        .unwrap()
        .expect("should resolve");
    mock.assert();

    assert!((resolved.latitude - 48.8584).abs() < 1e-9);
    assert!((resolved.longitude - 2.2945).abs() < 1e-9);
}

#[tokio::test]
async fn geoapify_geocode_no_match_is_none() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/geocode/search");
        then.status(200)
            .json_body(serde_json::json!({"type": "FeatureCollection", "features": []}));
    });

    let resolved = geoapify(&server).resolve("zzzzzz").await.unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn geoapify_maps_http_status_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v2/places");
        then.status(401);
    });

    assert!(matches!(
        geoapify(&server).fetch(&query()).await,
        Err(ProviderError::Http(401))
    ));
}
