//! Geoapify API client
//!
//! Secondary external POI provider (Places API), and the production
//! implementation of the location resolution collaborator (Geocoding API).
//! Both endpoints speak GeoJSON feature collections.

use crate::models::{Poi, Source};
use crate::services::opentripmap_client::map_transport_error;
use crate::types::{
    LocationResolver, ProviderError, ResolvedLocation, SourceFetcher, SourceQuery,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const GEOAPIFY_BASE_URL: &str = "https://api.geoapify.com";
const USER_AGENT: &str = "Wayfarer/0.1.0 (https://github.com/wayfarer/wayfarer)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
struct Feature {
    properties: GfProperties,
}

/// Feature properties; anything not modeled is kept as passthrough
#[derive(Debug, Clone, Deserialize)]
struct GfProperties {
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Geoapify API client
pub struct GeoapifyClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeoapifyClient {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: GEOAPIFY_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different server (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_features(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<Feature>, ProviderError> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(status.as_u16()));
        }

        let collection: FeatureCollection = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(collection.features)
    }

    fn normalize(feature: Feature) -> Option<Poi> {
        let props = feature.properties;
        let name = props.name?;
        if name.trim().is_empty() {
            return None;
        }

        Some(Poi {
            id: props
                .place_id
                .unwrap_or_else(|| format!("gf:{}", name.to_lowercase().replace(' ', "-"))),
            name,
            latitude: props.lat,
            longitude: props.lon,
            source: Source::Geoapify,
            categories: props.categories,
            extra: props.extra,
        })
    }
}

#[async_trait]
impl SourceFetcher for GeoapifyClient {
    fn source(&self) -> Source {
        Source::Geoapify
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Poi>, ProviderError> {
        let url = format!("{}/v2/places", self.base_url);
        let mut params = vec![
            (
                "filter",
                format!(
                    "circle:{},{},{}",
                    query.longitude, query.latitude, query.radius_meters
                ),
            ),
            ("limit", query.limit.to_string()),
            ("apiKey", self.api_key.clone()),
        ];
        if !query.categories.is_empty() {
            params.push(("categories", query.categories.join(",")));
        }

        let features = self.get_features(&url, &params).await?;
        let total = features.len();
        let pois: Vec<Poi> = features.into_iter().filter_map(Self::normalize).collect();
        tracing::debug!(total, named = pois.len(), "Geoapify places search complete");
        Ok(pois)
    }
}

#[async_trait]
impl LocationResolver for GeoapifyClient {
    async fn resolve(&self, place: &str) -> Result<Option<ResolvedLocation>, ProviderError> {
        let url = format!("{}/v1/geocode/search", self.base_url);
        let params = [
            ("text", place.to_string()),
            ("limit", "1".to_string()),
            ("apiKey", self.api_key.clone()),
        ];

        let features = self.get_features(&url, &params).await?;
        let resolved = features.into_iter().find_map(|feature| {
            let props = feature.properties;
            Some(ResolvedLocation {
                latitude: props.lat?,
                longitude: props.lon?,
            })
        });

        match &resolved {
            Some(location) => tracing::debug!(
                place,
                lat = location.latitude,
                lon = location.longitude,
                "Resolved place name"
            ),
            None => tracing::debug!(place, "Geocoder returned no match"),
        }
        Ok(resolved)
    }
}
