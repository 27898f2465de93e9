//! IP geolocation collaborators
//!
//! The city fence needs a coarse place name for each peer address. Two
//! resolvers are provided: [`HttpGeoResolver`] queries a remote JSON
//! endpoint (geoplugin by default) and [`MaxMindResolver`] reads a local
//! GeoLite2-City database. Both report failures as [`GeoError`] so the
//! engine can turn them into an explicit decision.

pub mod http;

pub use http::HttpGeoResolver;

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("Database file not found: {0}")]
    FileNotFound(String),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Not an IP address: {0:?}")]
    InvalidAddress(String),

    #[error("No place name available for {0}")]
    NoPlace(IpAddr),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lookup endpoint returned status {0}")]
    Status(u16),

    #[error("Invalid lookup response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Lookup response has no usable '{0}' field")]
    MissingField(String),
}

/// Maps a peer address to a place name
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, ip: &IpAddr) -> Result<String, GeoError>;
}

/// City lookups against a MaxMind GeoLite2-City database
///
/// ```ignore
/// use loginfence::geolocation::{GeoResolver, MaxMindResolver};
///
/// let resolver = MaxMindResolver::new("GeoLite2-City.mmdb")?;
/// let city = resolver.resolve(&"8.8.8.8".parse()?)?;
/// ```
pub struct MaxMindResolver {
    reader: Arc<Reader<Vec<u8>>>,
    language: String,
}

impl MaxMindResolver {
    /// Open a GeoLite2-City database file
    ///
    /// # Errors
    ///
    /// Returns an error if the database file is missing or invalid.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(MaxMindResolver {
            reader: Arc::new(reader),
            language: "en".to_string(),
        })
    }

    /// Use city names in another language (database locale code)
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }
}

impl GeoResolver for MaxMindResolver {
    fn resolve(&self, ip: &IpAddr) -> Result<String, GeoError> {
        let city: geoip2::City = self.reader.lookup(*ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })?;

        city.city
            .and_then(|c| c.names)
            .and_then(|names| names.get(self.language.as_str()).copied())
            .filter(|name| !name.trim().is_empty())
            .map(String::from)
            .ok_or(GeoError::NoPlace(*ip))
    }
}

impl Clone for MaxMindResolver {
    fn clone(&self) -> Self {
        MaxMindResolver {
            reader: Arc::clone(&self.reader),
            language: self.language.clone(),
        }
    }
}
