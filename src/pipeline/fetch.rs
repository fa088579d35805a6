//! Source fetching: one GET per call, returned in the shape the caller needs.
//!
//! There is no retry and no backoff; a failed fetch aborts the extractor that
//! asked for it and retry policy belongs to whoever drives the pipeline.
//! Character encodings are always supplied by the caller because the sources
//! use legacy code pages they do not declare reliably.

use crate::config::IngestConfig;
use crate::error::IngestError;
use encoding_rs::Encoding;
use reqwest::header::USER_AGENT;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info};

/// Whether a request should present itself as a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProfile {
    /// Send the configured browser user agent (HTML page, spreadsheet).
    Browser,
    /// Send no user agent override (open-data CSV, geocoder JSON).
    Default,
}

/// HTTP client shared by every fetch in one ingestion run.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    browser_user_agent: String,
    timeout_secs: u64,
}

impl Fetcher {
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            browser_user_agent: config.browser_user_agent.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Raw response body.
    pub async fn bytes(&self, url: &str, profile: ClientProfile) -> Result<Vec<u8>, IngestError> {
        debug!("GET {} ({:?})", url, profile);

        let mut request = self.client.get(url);
        if profile == ClientProfile::Browser {
            request = request.header(USER_AGENT, &self.browser_user_agent);
        }

        let response = request.send().await.map_err(|e| self.transport_error(url, e))?;

        if !response.status().is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    /// HTML page decoded with the declared encoding.
    pub async fn html(&self, url: &str, encoding: &str) -> Result<String, IngestError> {
        let bytes = self.bytes(url, ClientProfile::Browser).await?;
        decode(url, &bytes, encoding)
    }

    /// Delimited text decoded with the declared encoding.
    pub async fn text(&self, url: &str, encoding: &str) -> Result<String, IngestError> {
        let bytes = self.bytes(url, ClientProfile::Default).await?;
        decode(url, &bytes, encoding)
    }

    /// Spreadsheet binary, ready for a workbook reader.
    pub async fn spreadsheet(&self, url: &str) -> Result<Cursor<Vec<u8>>, IngestError> {
        let bytes = self.bytes(url, ClientProfile::Browser).await?;
        Ok(Cursor::new(bytes))
    }

    /// JSON response body, not yet parsed.
    pub async fn json(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        self.bytes(url, ClientProfile::Default).await
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> IngestError {
        if e.is_timeout() {
            IngestError::FetchTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            IngestError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Look up a decoder by label.
///
/// WHATWG labels are accepted as-is. `cp932`, the name most Japanese tooling
/// uses for Windows-31J, is not a WHATWG label and is mapped to Shift_JIS
/// (which in `encoding_rs` is the Windows-31J superset).
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding, IngestError> {
    let trimmed = label.trim();
    let lookup = if trimmed.eq_ignore_ascii_case("cp932") {
        "windows-31j"
    } else {
        trimmed
    };
    Encoding::for_label(lookup.as_bytes()).ok_or_else(|| IngestError::UnknownEncoding {
        label: label.to_string(),
    })
}

/// Decode `bytes` strictly: malformed input is a structural error rather
/// than silently replaced with U+FFFD.
pub fn decode(url: &str, bytes: &[u8], label: &str) -> Result<String, IngestError> {
    let encoding = encoding_for_label(label)?;
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(IngestError::DecodeFailed {
            url: url.to_string(),
            encoding: encoding.name().to_string(),
        });
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::SHIFT_JIS;

    #[test]
    fn cp932_maps_to_shift_jis() {
        assert_eq!(encoding_for_label("cp932").unwrap(), SHIFT_JIS);
        assert_eq!(encoding_for_label("CP932").unwrap(), SHIFT_JIS);
        assert_eq!(encoding_for_label("shift_jis").unwrap(), SHIFT_JIS);
        assert_eq!(encoding_for_label("utf-8").unwrap(), encoding_rs::UTF_8);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = encoding_for_label("cp99999").unwrap_err();
        assert!(matches!(err, IngestError::UnknownEncoding { .. }));
    }

    #[test]
    fn decode_shift_jis_round_trip() {
        let (bytes, _, _) = SHIFT_JIS.encode("旭川市,市立旭川病院");
        let text = decode("http://fixture/a.csv", &bytes, "cp932").unwrap();
        assert_eq!(text, "旭川市,市立旭川病院");
    }

    #[test]
    fn decode_rejects_malformed_bytes() {
        let err = decode("http://fixture/a.csv", &[0x82, 0xff, 0xfe], "cp932").unwrap_err();
        assert!(matches!(err, IngestError::DecodeFailed { .. }));
    }

    #[test]
    fn fetcher_builds_from_default_config() {
        let config = IngestConfig::default();
        assert!(Fetcher::new(&config).is_ok());
    }
}
