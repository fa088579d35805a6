//! Configuration types for the ingestion pipeline.
//!
//! Every source-specific constant (URLs, locality, code pages, sheet name,
//! column layouts, geocoder codes) lives in [`IngestConfig`], built via its
//! [`IngestConfigBuilder`]. Defaults describe the Hokkaido fever-outpatient
//! sources for Asahikawa.

use crate::error::IngestError;
use crate::layout::{OpendataLayout, SheetLayout};
use crate::pipeline::fetch::encoding_for_label;
use crate::progress::ProgressCallback;
use std::fmt;

/// Prefectural page listing the per-region outpatient spreadsheets.
pub const OUTPATIENTS_PAGE_URL: &str = "https://www.pref.hokkaido.lg.jp/hf/kst/youkou.html";

/// Host that relative links on the outpatient page resolve against.
pub const OUTPATIENTS_ORIGIN: &str = "https://www.pref.hokkaido.lg.jp";

/// Open data: hospitals in Hokkaido with coordinates.
pub const HOSPITAL_OPENDATA_URL: &str = concat!(
    "https://www.harp.lg.jp/opendata/dataset/1243/resource/4967/",
    "01_%E7%97%85%E9%99%A2_%E5%8C%97%E6%B5%B7%E9%81%93_%E7%B7%AF%E5%BA%A6%E7%B5%8C%E5%BA%A6%E4%BB%98%E3%81%8D.csv"
);

/// Open data: clinics in Hokkaido with coordinates.
pub const CLINIC_OPENDATA_URL: &str = concat!(
    "https://www.harp.lg.jp/opendata/dataset/1243/resource/4968/",
    "02_%E8%A8%BA%E7%99%82%E6%89%80_%E5%8C%97%E6%B5%B7%E9%81%93_%E7%B7%AF%E5%BA%A6%E7%B5%8C%E5%BA%A6%E4%BB%98%E3%81%8D.csv"
);

/// Local-search endpoint of the geocoding API.
pub const GEOCODER_ENDPOINT: &str = "https://map.yahooapis.jp/search/local/V1/localSearch";

/// Environment variable holding the geocoder application ID.
pub const GEOCODER_APP_ID_VAR: &str = "YOLP_APP_ID";

/// Configuration for an ingestion run.
///
/// Built via [`IngestConfig::builder()`], [`IngestConfig::from_env()`] or
/// [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use outpatients_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .target_city("旭川市")
///     .timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.sheet_name, "Sheet1");
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// HTML page that links the current-period spreadsheets.
    pub outpatients_page_url: String,

    /// Origin that relative spreadsheet links are resolved against.
    pub origin: String,

    /// Token the link's image caption must contain. Default: `旭川`.
    pub caption_token: String,

    /// File extension a spreadsheet link must end with. Default: `.xlsx`.
    pub spreadsheet_extension: String,

    /// Character encoding of the HTML page. Default: `utf-8`.
    pub html_encoding: String,

    /// Worksheet holding the facility table. Default: `Sheet1`.
    pub sheet_name: String,

    /// Leading title/header rows to skip. Default: 3.
    pub header_rows: usize,

    /// Column layout of the facility table.
    pub sheet_layout: SheetLayout,

    /// Open-data CSV of hospitals.
    pub hospital_csv_url: String,

    /// Open-data CSV of clinics.
    pub clinic_csv_url: String,

    /// Character encoding of the open-data CSVs. Default: `cp932`.
    ///
    /// The portal serves Windows-31J without declaring it, so the label is
    /// always supplied here and never sniffed from the response.
    pub csv_encoding: String,

    /// Column layout of the open-data CSVs.
    pub opendata_layout: OpendataLayout,

    /// Municipality kept from the open data (exact match). Default: `旭川市`.
    pub target_city: String,

    /// Geocoding search endpoint.
    pub geocoder_endpoint: String,

    /// Geocoder application ID. Only required when the geocoder is called.
    pub geocoder_app_id: Option<String>,

    /// Locality (`ac`) code sent to the geocoder. Default: `01204` (Asahikawa).
    pub area_code: String,

    /// Industry (`gc`) code sent to the geocoder. Default: `0401` (hospitals).
    pub industry_code: String,

    /// User agent sent with HTML and spreadsheet fetches; some origins reject
    /// clients that do not look like a browser. Default: `Mozilla/5.0`.
    pub browser_user_agent: String,

    /// Per-request timeout in seconds. Default: 120.
    pub timeout_secs: u64,

    /// Optional stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            outpatients_page_url: OUTPATIENTS_PAGE_URL.to_string(),
            origin: OUTPATIENTS_ORIGIN.to_string(),
            caption_token: "旭川".to_string(),
            spreadsheet_extension: ".xlsx".to_string(),
            html_encoding: "utf-8".to_string(),
            sheet_name: "Sheet1".to_string(),
            header_rows: 3,
            sheet_layout: SheetLayout::default(),
            hospital_csv_url: HOSPITAL_OPENDATA_URL.to_string(),
            clinic_csv_url: CLINIC_OPENDATA_URL.to_string(),
            csv_encoding: "cp932".to_string(),
            opendata_layout: OpendataLayout::default(),
            target_city: "旭川市".to_string(),
            geocoder_endpoint: GEOCODER_ENDPOINT.to_string(),
            geocoder_app_id: None,
            area_code: "01204".to_string(),
            industry_code: "0401".to_string(),
            browser_user_agent: "Mozilla/5.0".to_string(),
            timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("outpatients_page_url", &self.outpatients_page_url)
            .field("origin", &self.origin)
            .field("caption_token", &self.caption_token)
            .field("spreadsheet_extension", &self.spreadsheet_extension)
            .field("sheet_name", &self.sheet_name)
            .field("header_rows", &self.header_rows)
            .field("hospital_csv_url", &self.hospital_csv_url)
            .field("clinic_csv_url", &self.clinic_csv_url)
            .field("csv_encoding", &self.csv_encoding)
            .field("target_city", &self.target_city)
            .field("geocoder_endpoint", &self.geocoder_endpoint)
            .field(
                "geocoder_app_id",
                &self.geocoder_app_id.as_ref().map(|_| "<redacted>"),
            )
            .field("area_code", &self.area_code)
            .field("industry_code", &self.industry_code)
            .field("timeout_secs", &self.timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration with the geocoder credential taken from the
    /// environment (a `.env` file in the working directory is honoured).
    pub fn from_env() -> Result<Self, IngestError> {
        dotenvy::dotenv().ok();
        let mut builder = Self::builder();
        if let Ok(app_id) = std::env::var(GEOCODER_APP_ID_VAR) {
            if !app_id.trim().is_empty() {
                builder = builder.geocoder_app_id(app_id.trim());
            }
        }
        builder.build()
    }

    /// The geocoder credential, or a configuration error when unset.
    pub fn require_app_id(&self) -> Result<&str, IngestError> {
        self.geocoder_app_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| IngestError::MissingCredential {
                var: GEOCODER_APP_ID_VAR.to_string(),
            })
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn outpatients_page_url(mut self, url: impl Into<String>) -> Self {
        self.config.outpatients_page_url = url.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.origin = origin.into();
        self
    }

    pub fn caption_token(mut self, token: impl Into<String>) -> Self {
        self.config.caption_token = token.into();
        self
    }

    pub fn spreadsheet_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.spreadsheet_extension = ext.into();
        self
    }

    pub fn html_encoding(mut self, label: impl Into<String>) -> Self {
        self.config.html_encoding = label.into();
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.config.sheet_name = name.into();
        self
    }

    pub fn header_rows(mut self, n: usize) -> Self {
        self.config.header_rows = n;
        self
    }

    pub fn sheet_layout(mut self, layout: SheetLayout) -> Self {
        self.config.sheet_layout = layout;
        self
    }

    pub fn hospital_csv_url(mut self, url: impl Into<String>) -> Self {
        self.config.hospital_csv_url = url.into();
        self
    }

    pub fn clinic_csv_url(mut self, url: impl Into<String>) -> Self {
        self.config.clinic_csv_url = url.into();
        self
    }

    pub fn csv_encoding(mut self, label: impl Into<String>) -> Self {
        self.config.csv_encoding = label.into();
        self
    }

    pub fn opendata_layout(mut self, layout: OpendataLayout) -> Self {
        self.config.opendata_layout = layout;
        self
    }

    pub fn target_city(mut self, city: impl Into<String>) -> Self {
        self.config.target_city = city.into();
        self
    }

    pub fn geocoder_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.geocoder_endpoint = url.into();
        self
    }

    pub fn geocoder_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.geocoder_app_id = Some(app_id.into());
        self
    }

    pub fn area_code(mut self, code: impl Into<String>) -> Self {
        self.config.area_code = code.into();
        self
    }

    pub fn industry_code(mut self, code: impl Into<String>) -> Self {
        self.config.industry_code = code.into();
        self
    }

    pub fn browser_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.browser_user_agent = ua.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        for (name, url) in [
            ("outpatients_page_url", &c.outpatients_page_url),
            ("origin", &c.origin),
            ("hospital_csv_url", &c.hospital_csv_url),
            ("clinic_csv_url", &c.clinic_csv_url),
            ("geocoder_endpoint", &c.geocoder_endpoint),
        ] {
            if url::Url::parse(url).is_err() {
                return Err(IngestError::InvalidConfig(format!(
                    "{name} is not an absolute URL: '{url}'"
                )));
            }
        }
        if c.caption_token.is_empty() {
            return Err(IngestError::InvalidConfig(
                "caption token must not be empty".into(),
            ));
        }
        if c.target_city.is_empty() {
            return Err(IngestError::InvalidConfig(
                "target city must not be empty".into(),
            ));
        }
        if c.timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "timeout must be ≥ 1 second".into(),
            ));
        }
        encoding_for_label(&c.csv_encoding)?;
        encoding_for_label(&c.html_encoding)?;
        c.sheet_layout.validate()?;
        c.opendata_layout.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_build() {
        let config = IngestConfig::builder().build().unwrap();
        assert_eq!(config.header_rows, 3);
        assert_eq!(config.target_city, "旭川市");
        assert_eq!(config.opendata_layout.field_count, 37);
        assert!(config.geocoder_app_id.is_none());
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = IngestConfig::builder().timeout_secs(0).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn relative_url_rejected() {
        let err = IngestConfig::builder()
            .hospital_csv_url("/opendata/hospitals.csv")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("hospital_csv_url"), "got: {err}");
    }

    #[test]
    fn unknown_encoding_rejected() {
        let err = IngestConfig::builder()
            .csv_encoding("klingon-8")
            .build()
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownEncoding { .. }));
    }

    #[test]
    fn missing_app_id_is_configuration_error() {
        let config = IngestConfig::default();
        let err = config.require_app_id().unwrap_err();
        assert!(matches!(err, IngestError::MissingCredential { ref var } if var == "YOLP_APP_ID"));
    }

    #[test]
    fn debug_redacts_app_id() {
        let config = IngestConfig::builder()
            .geocoder_app_id("dj00secret")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("dj00secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
