//! OpenTripMap API client
//!
//! Primary external POI provider. Wraps the `/places/radius` search and
//! normalizes its records; admission control lives in the orchestrator.

use crate::models::{Poi, Source};
use crate::types::{ProviderError, SourceFetcher, SourceQuery};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const OPENTRIPMAP_BASE_URL: &str = "https://api.opentripmap.com/0.1";
const USER_AGENT: &str = "Wayfarer/0.1.0 (https://github.com/wayfarer/wayfarer)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One place from the radius search (`format=json`)
#[derive(Debug, Clone, Deserialize)]
struct OtmPlace {
    xid: String,
    #[serde(default)]
    name: String,
    /// Comma-separated category tags
    #[serde(default)]
    kinds: String,
    point: Option<OtmPoint>,
    #[serde(default)]
    rate: Option<serde_json::Value>,
    #[serde(default)]
    dist: Option<f64>,
    #[serde(default)]
    wikidata: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OtmPoint {
    lat: f64,
    lon: f64,
}

/// OpenTripMap API client
pub struct OpenTripMapClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenTripMapClient {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: OPENTRIPMAP_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different server (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn normalize(place: OtmPlace) -> Option<Poi> {
        // Unnamed map features are useless for display and poison name-based
        // duplicate detection, drop them during normalization.
        if place.name.trim().is_empty() {
            return None;
        }

        let categories: Vec<String> = place
            .kinds
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        let mut extra = serde_json::Map::new();
        if let Some(rate) = place.rate {
            extra.insert("rate".into(), rate);
        }
        if let Some(dist) = place.dist {
            extra.insert("dist".into(), dist.into());
        }
        if let Some(wikidata) = place.wikidata {
            extra.insert("wikidata".into(), wikidata.into());
        }

        Some(Poi {
            id: place.xid,
            name: place.name,
            latitude: place.point.as_ref().map(|p| p.lat),
            longitude: place.point.as_ref().map(|p| p.lon),
            source: Source::Opentripmap,
            categories,
            extra,
        })
    }
}

#[async_trait]
impl SourceFetcher for OpenTripMapClient {
    fn source(&self) -> Source {
        Source::Opentripmap
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Poi>, ProviderError> {
        let url = format!("{}/en/places/radius", self.base_url);
        let mut request = self
            .http_client
            .get(&url)
            .query(&[
                ("radius", query.radius_meters.to_string()),
                ("lat", query.latitude.to_string()),
                ("lon", query.longitude.to_string()),
                ("limit", query.limit.to_string()),
                ("format", "json".to_string()),
                ("apikey", self.api_key.clone()),
            ]);
        if !query.categories.is_empty() {
            request = request.query(&[("kinds", query.categories.join(","))]);
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(status.as_u16()));
        }

        let places: Vec<OtmPlace> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let total = places.len();
        let pois: Vec<Poi> = places.into_iter().filter_map(Self::normalize).collect();
        tracing::debug!(
            total,
            named = pois.len(),
            "OpenTripMap radius search complete"
        );
        Ok(pois)
    }
}

/// Map reqwest transport failures onto the provider error taxonomy
pub(crate) fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(error.to_string())
    }
}
