//! Remote JSON geolocation lookups

use super::{GeoError, GeoResolver};
use reqwest::blocking::Client;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://www.geoplugin.net/json.gp?ip={ip}";
pub const DEFAULT_PLACE_FIELD: &str = "geoplugin_city";

/// Resolves place names with one GET per lookup
///
/// `{ip}` in the endpoint template is replaced with the peer address.
pub struct HttpGeoResolver {
    client: Client,
    endpoint: String,
    place_field: String,
}

impl HttpGeoResolver {
    pub fn new(endpoint: &str, place_field: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpGeoResolver {
            client,
            endpoint: endpoint.to_string(),
            place_field: place_field.to_string(),
        })
    }

    /// geoplugin endpoint with a 3 second timeout
    pub fn geoplugin() -> Result<Self, GeoError> {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_PLACE_FIELD, Duration::from_secs(3))
    }

    fn url_for(&self, ip: &IpAddr) -> String {
        self.endpoint.replace("{ip}", &ip.to_string())
    }
}

impl GeoResolver for HttpGeoResolver {
    fn resolve(&self, ip: &IpAddr) -> Result<String, GeoError> {
        let url = self.url_for(ip);
        log::debug!("Resolving {} via {}", ip, url);

        let response = self.client.get(&url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status(status.as_u16()));
        }

        let body: Value = serde_json::from_str(&response.text()?)?;
        extract_place(&body, &self.place_field)
    }
}

/// Pull a string field out of a lookup response
///
/// An empty string is a valid answer (the service knows the address but not
/// its city); only a missing or non-string field is an error.
pub fn extract_place(body: &Value, field: &str) -> Result<String, GeoError> {
    match body.get(field) {
        Some(Value::String(place)) => Ok(place.trim().to_string()),
        _ => Err(GeoError::MissingField(field.to_string())),
    }
}
