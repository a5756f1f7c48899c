use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::error::{Result, UpdateCheckError};

/// Base URL of the public storefront lookup service.
pub const DEFAULT_BASE_URL: &str = "https://itunes.apple.com";

/// Path of the lookup endpoint, relative to the base URL.
pub const LOOKUP_PATH: &str = "lookup";

/// Supplies the running application's version at check time.
pub type VersionProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Configuration for the UpdateChecker.
#[derive(Clone)]
pub struct UpdateCheckerConfig {
    /// The storefront's numeric identifier for the application.
    pub app_id: u64,
    /// Optional timeout applied to the whole lookup request.
    pub timeout: Option<Duration>,
    pub(crate) version_provider: VersionProvider,
    pub(crate) runtime: Option<Handle>,
    /// Base URL for the lookup service (for testing). Defaults to "https://itunes.apple.com".
    pub(crate) base_url: String,
}

impl UpdateCheckerConfig {
    /// Creates a new config for the given application identifier.
    ///
    /// `current_version` is the version of the running application, usually
    /// `env!("CARGO_PKG_VERSION")` from the host crate.
    pub fn new(app_id: u64, current_version: impl Into<String>) -> Self {
        let current_version = current_version.into();
        Self {
            app_id,
            timeout: None,
            version_provider: Arc::new(move || current_version.clone()),
            runtime: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Sets a custom base URL (for testing).
    #[doc(hidden)]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Reads the current version from `provider` on every check instead of a fixed string.
    pub fn version_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.version_provider = Arc::new(provider);
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the runtime that background checks are spawned on.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

impl fmt::Debug for UpdateCheckerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCheckerConfig")
            .field("app_id", &self.app_id)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// An application record returned by the lookup service.
///
/// Only `version` is required. A known field whose value has an unexpected
/// shape is left as `None` and kept, as returned, in `extra`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// The published version (e.g., "2.10.1").
    pub version: String,
    /// The storefront identifier.
    pub track_id: Option<u64>,
    /// The application name.
    pub track_name: Option<String>,
    /// The platform bundle identifier.
    pub bundle_id: Option<String>,
    /// The URL to the application's storefront page.
    pub track_view_url: Option<String>,
    /// Notes for the published version.
    pub release_notes: Option<String>,
    /// When the published version was released.
    pub current_version_release_date: Option<DateTime<Utc>>,
    /// The oldest OS version the published build runs on.
    pub minimum_os_version: Option<String>,
    /// The name of the seller shown on the storefront page.
    pub seller_name: Option<String>,
    /// Every other field of the record, as returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppInfo {
    /// Builds an AppInfo from one entry of the lookup `results` list.
    pub(crate) fn from_record(record: Value) -> Result<Self> {
        let Value::Object(mut record) = record else {
            return Err(UpdateCheckError::MalformedResponse(
                "result is not an object".to_string(),
            ));
        };

        let version = match record.remove("version") {
            Some(Value::String(version)) => version,
            _ => {
                return Err(UpdateCheckError::MalformedResponse(
                    "result has no version string".to_string(),
                ))
            }
        };

        Ok(Self {
            version,
            track_id: take_field(&mut record, "trackId"),
            track_name: take_field(&mut record, "trackName"),
            bundle_id: take_field(&mut record, "bundleId"),
            track_view_url: take_field(&mut record, "trackViewUrl"),
            release_notes: take_field(&mut record, "releaseNotes"),
            current_version_release_date: take_field(&mut record, "currentVersionReleaseDate"),
            minimum_os_version: take_field(&mut record, "minimumOsVersion"),
            seller_name: take_field(&mut record, "sellerName"),
            extra: record,
        })
    }
}

/// Removes `key` from `record` if it converts to `T`; otherwise leaves it in place.
fn take_field<T: DeserializeOwned>(record: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = record.get(key)?;
    if value.is_null() {
        record.remove(key);
        return None;
    }
    let parsed = T::deserialize(value).ok()?;
    record.remove(key);
    Some(parsed)
}

/// The result of a successful update check.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    /// The published application record.
    pub app_info: AppInfo,
    /// Whether the published version is strictly newer than the running one.
    pub update_available: bool,
}

/// Internal structure for the lookup API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LookupResponse {
    pub result_count: u64,
    /// Entries are kept raw; only the first one is interpreted.
    pub results: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = UpdateCheckerConfig::new(284882215, "1.2.3")
            .timeout(Duration::from_secs(5))
            .base_url("http://localhost:8080");

        assert_eq!(config.app_id, 284882215);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!((config.version_provider)(), "1.2.3");
        assert!(config.runtime.is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config = UpdateCheckerConfig::new(1, "1.0");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_version_provider_override() {
        let config = UpdateCheckerConfig::new(1, "1.0").version_provider(|| "3.4".to_string());
        assert_eq!((config.version_provider)(), "3.4");
    }

    #[test]
    fn test_app_info_keeps_unknown_fields() {
        let info = AppInfo::from_record(serde_json::json!({
            "version": "4.2",
            "trackId": 284882215,
            "trackName": "Example",
            "currentVersionReleaseDate": "2024-03-15T10:00:00Z",
            "averageUserRating": 4.5,
            "kind": "software"
        }))
        .unwrap();

        assert_eq!(info.version, "4.2");
        assert_eq!(info.track_id, Some(284882215));
        assert_eq!(info.track_name.as_deref(), Some("Example"));
        assert!(info.current_version_release_date.is_some());
        assert!(info.bundle_id.is_none());
        assert_eq!(info.extra["kind"], "software");
        assert_eq!(info.extra["averageUserRating"], 4.5);
        assert!(!info.extra.contains_key("version"));
        assert!(!info.extra.contains_key("trackId"));
    }

    #[test]
    fn test_app_info_tolerates_unexpected_field_shapes() {
        let info = AppInfo::from_record(serde_json::json!({
            "version": "2.1",
            "trackId": "284882215",
            "currentVersionReleaseDate": "2024-03-15",
            "sellerName": null,
            "trackName": "Example"
        }))
        .unwrap();

        assert_eq!(info.version, "2.1");
        assert!(info.track_id.is_none());
        assert!(info.current_version_release_date.is_none());
        assert!(info.seller_name.is_none());
        assert_eq!(info.track_name.as_deref(), Some("Example"));
        assert_eq!(info.extra["trackId"], "284882215");
        assert_eq!(info.extra["currentVersionReleaseDate"], "2024-03-15");
        assert!(!info.extra.contains_key("sellerName"));
    }

    #[test]
    fn test_app_info_requires_version_string() {
        let records = [
            serde_json::json!({ "trackName": "No version" }),
            serde_json::json!({ "version": 2.1 }),
            serde_json::json!({ "version": null }),
            serde_json::json!("2.1"),
        ];
        for record in records {
            let err = AppInfo::from_record(record).unwrap_err();
            assert!(matches!(err, UpdateCheckError::MalformedResponse(_)));
        }
    }

    #[test]
    fn test_app_info_serializes_flat() {
        let info = AppInfo::from_record(serde_json::json!({
            "version": "1.0",
            "trackName": "Example",
            "kind": "software"
        }))
        .unwrap();

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["trackName"], "Example");
        assert_eq!(value["kind"], "software");
    }
}
