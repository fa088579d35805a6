//! Local-search geocoding for facilities missing from the open data.
//!
//! One GET per facility name, scoped to the configured locality and
//! industry codes and sorted by match quality. The API never echoes the
//! query, so the caller's name is attached to every returned record.
//!
//! A response without the expected `ResultInfo` / `Feature` / `Geometry`
//! structure is an [`IngestError::UpstreamProtocol`] error: it means the API
//! contract changed, and the whole result set is untrustworthy.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::output::GeoRecord;
use crate::pipeline::fetch::Fetcher;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    result_info: Option<ResultInfo>,
    feature: Option<Vec<Feature>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultInfo {
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Geometry {
    /// `"longitude,latitude"`.
    coordinates: Option<String>,
}

/// Look up `facility_name` and return one record per search hit.
///
/// A search with no hits yields a single [`GeoRecord::no_match`] record.
///
/// # Errors
/// - [`IngestError::InvalidFacilityName`] when the name is blank
/// - [`IngestError::MissingCredential`] when no application ID is configured
/// - [`IngestError::UpstreamProtocol`] when the response shape is unexpected
pub async fn geocode(
    fetcher: &Fetcher,
    config: &IngestConfig,
    facility_name: &str,
) -> Result<Vec<GeoRecord>, IngestError> {
    if facility_name.trim().is_empty() {
        return Err(IngestError::InvalidFacilityName);
    }
    let app_id = config.require_app_id()?;
    let url = build_query_url(config, app_id, facility_name)?;

    debug!("Geocoding '{}'", facility_name);
    let body = fetcher.json(url.as_str()).await?;
    let records = parse_response(&body, facility_name)?;
    info!("Geocoded '{}': {} result(s)", facility_name, records.len());
    Ok(records)
}

/// Search URL with every parameter form-urlencoded.
pub fn build_query_url(
    config: &IngestConfig,
    app_id: &str,
    facility_name: &str,
) -> Result<Url, IngestError> {
    Url::parse_with_params(
        &config.geocoder_endpoint,
        &[
            ("appid", app_id),
            ("query", facility_name),
            ("ac", config.area_code.as_str()),
            ("gc", config.industry_code.as_str()),
            ("sort", "-match"),
            ("detail", "simple"),
            ("output", "json"),
        ],
    )
    .map_err(|e| IngestError::InvalidConfig(format!("geocoder endpoint: {e}")))
}

/// Decode a search response body.
pub fn parse_response(body: &[u8], facility_name: &str) -> Result<Vec<GeoRecord>, IngestError> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|e| protocol(format!("invalid JSON: {e}")))?;

    let count = response
        .result_info
        .and_then(|info| info.count)
        .ok_or_else(|| protocol("missing ResultInfo.Count"))?;
    if count == 0 {
        return Ok(vec![GeoRecord::no_match(facility_name)]);
    }

    let features = response.feature.ok_or_else(|| protocol("missing Feature"))?;
    features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| -> Result<GeoRecord, IngestError> {
            let coordinates = feature
                .geometry
                .and_then(|g| g.coordinates)
                .ok_or_else(|| protocol(format!("missing Feature[{i}].Geometry.Coordinates")))?;
            let (longitude, latitude) = parse_coordinates(&coordinates)
                .ok_or_else(|| protocol(format!("unparseable coordinates '{coordinates}'")))?;
            Ok(GeoRecord {
                facility_name: facility_name.to_string(),
                latitude,
                longitude,
            })
        })
        .collect()
}

/// `"lon,lat"` → `(lon, lat)`.
fn parse_coordinates(text: &str) -> Option<(f64, f64)> {
    let (lon, lat) = text.split_once(',')?;
    let lon: f64 = lon.trim().parse().ok()?;
    let lat: f64 = lat.trim().parse().ok()?;
    (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
}

fn protocol(detail: impl Into<String>) -> IngestError {
    IngestError::UpstreamProtocol {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ONE_HIT: &str = r#"{
        "ResultInfo": {"Count": 1, "Total": 1, "Start": 1, "Status": 200, "Description": "", "Copyright": "", "Latency": 0.017},
        "Feature": [
            {
                "Id": "20130710667",
                "Gid": "",
                "Name": "市立旭川病院",
                "Geometry": {"Type": "point", "Coordinates": "142.365976388889,43.778422777778"},
                "Category": []
            }
        ]
    }"#;

    #[test]
    fn one_hit_gets_caller_name() {
        let records = parse_response(ONE_HIT.as_bytes(), "市立旭川病院").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].facility_name, "市立旭川病院");
        assert_eq!(records[0].longitude, 142.365976388889);
        assert_eq!(records[0].latitude, 43.778422777778);
    }

    #[test]
    fn zero_hits_yield_origin_placeholder() {
        let body = br#"{"ResultInfo": {"Count": 0, "Total": 0}}"#;
        let records = parse_response(body, "森山病院").unwrap();
        assert_eq!(records, vec![GeoRecord::no_match("森山病院")]);
    }

    #[test]
    fn every_feature_is_returned() {
        let body = br#"{"ResultInfo": {"Count": 2}, "Feature": [
            {"Geometry": {"Coordinates": "142.1,43.1"}},
            {"Geometry": {"Coordinates": "142.2,43.2"}}
        ]}"#;
        let records = parse_response(body, "旭川赤十字病院").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].latitude, 43.2);
    }

    #[test]
    fn missing_structure_is_protocol_error() {
        let cases: [&[u8]; 5] = [
            b"not json",
            br#"{"Feature": []}"#,
            br#"{"ResultInfo": {"Count": 1}}"#,
            br#"{"ResultInfo": {"Count": 1}, "Feature": [{"Name": "x"}]}"#,
            br#"{"ResultInfo": {"Count": 1}, "Feature": [{"Geometry": {"Coordinates": "142.3"}}]}"#,
        ];
        for body in cases {
            let err = parse_response(body, "市立旭川病院").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UpstreamProtocol, "got: {err}");
        }
    }

    #[test]
    fn query_url_carries_fixed_codes() {
        let config = IngestConfig::default();
        let url = build_query_url(&config, "dj00key", "ＪＡ 旭川厚生病院&").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("appid"), Some("dj00key"));
        assert_eq!(get("query"), Some("ＪＡ 旭川厚生病院&"));
        assert_eq!(get("ac"), Some("01204"));
        assert_eq!(get("gc"), Some("0401"));
        assert_eq!(get("sort"), Some("-match"));
        assert_eq!(get("detail"), Some("simple"));
        assert_eq!(get("output"), Some("json"));
        assert!(!url.as_str().contains("旭川"), "query must be percent-encoded: {url}");
    }

    #[tokio::test]
    async fn blank_name_rejected_before_fetch() {
        let config = IngestConfig::builder().geocoder_app_id("dj00key").build().unwrap();
        let fetcher = Fetcher::new(&config).unwrap();
        let err = geocode(&fetcher, &config, "  ").await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidFacilityName));
    }

    #[tokio::test]
    async fn missing_credential_rejected_before_fetch() {
        let config = IngestConfig::default();
        let fetcher = Fetcher::new(&config).unwrap();
        let err = geocode(&fetcher, &config, "市立旭川病院").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
