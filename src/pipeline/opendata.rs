//! Prefectural medical-institution open data → [`GeoRecord`]s.
//!
//! The CSV is Windows-31J encoded with one header row and a fixed 37-column
//! schema. Rows are kept only for the target municipality; anything that
//! does not fit the schema is dropped and reported in
//! [`Extraction::skipped`].

use crate::config::IngestConfig;
use crate::error::{IngestError, SkipReason};
use crate::layout::OpendataLayout;
use crate::output::{Extraction, GeoRecord, SkippedRow};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::normalize::normalize_row;
use tracing::{debug, info};

/// Download one open-data CSV and extract the target city's coordinates.
pub async fn extract(
    fetcher: &Fetcher,
    url: &str,
    config: &IngestConfig,
) -> Result<Extraction<GeoRecord>, IngestError> {
    let text = fetcher.text(url, &config.csv_encoding).await?;
    let extraction = parse_csv(&text, &config.opendata_layout, &config.target_city)?;
    info!(
        "Extracted {} locations from {} ({} rows skipped)",
        extraction.records.len(),
        url,
        extraction.skipped.len()
    );
    Ok(extraction)
}

/// Parse decoded CSV text. The first record is always treated as a header.
///
/// # Errors
/// [`IngestError::InvalidConfig`] when `layout` addresses a column outside
/// its own schema, [`IngestError::MalformedCsv`] when the text is not CSV.
pub fn parse_csv(
    text: &str,
    layout: &OpendataLayout,
    target_city: &str,
) -> Result<Extraction<GeoRecord>, IngestError> {
    layout.validate()?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut extraction = Extraction::default();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| IngestError::MalformedCsv {
            detail: e.to_string(),
        })?;
        if index == 0 {
            continue;
        }
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);

        let fields: Vec<&str> = record.iter().collect();
        match location_from_row(&fields, layout, target_city) {
            Ok(geo) => extraction.records.push(geo),
            Err(reason) => {
                debug!("Skipping CSV line {}: {}", line, reason);
                extraction.skipped.push(SkippedRow { row: line, reason });
            }
        }
    }
    Ok(extraction)
}

/// Map one raw CSV row to a record.
pub fn location_from_row(
    fields: &[&str],
    layout: &OpendataLayout,
    target_city: &str,
) -> Result<GeoRecord, SkipReason> {
    if fields.len() != layout.field_count {
        return Err(SkipReason::FieldCount {
            expected: layout.field_count,
            found: fields.len(),
        });
    }
    let row = normalize_row(fields);
    let cell = |i: usize| {
        row.get(i).map(String::as_str).ok_or(SkipReason::FieldCount {
            expected: i + 1,
            found: row.len(),
        })
    };

    let city = cell(layout.city)?;
    if city != target_city {
        return Err(SkipReason::OutsideLocality {
            city: city.to_string(),
        });
    }

    Ok(GeoRecord {
        facility_name: cell(layout.facility_name)?.replace(' ', ""),
        latitude: coordinate("latitude", cell(layout.latitude)?)?,
        longitude: coordinate("longitude", cell(layout.longitude)?)?,
    })
}

fn coordinate(field: &str, value: &str) -> Result<f64, SkipReason> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SkipReason::BadCoordinate {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "都道府県コード又は市区町村コード,No,都道府県名,振興局,市町村,名称,名称_カナ,医療機関の種類,郵便番号,所在地,方書,緯度,経度,電話番号,内線番号,FAX番号,法人番号,開設者氏名,管理者氏名,指定年月日,登録理由,指定期間開始,医療機関コード,診療曜日,診療開始時間,診療終了時間,診療日時特記事項,時間外における対応,診療科目,病床数,療養病床,特定機能,現存・休止,URL,備考,緯度経度出典,データ作成日";

    fn row(city: &str, name: &str, lat: &str, lon: &str) -> String {
        format!(
            "010006,287,北海道,上川総合振興局,{city},{name},,病院,070-0029,{city}金星町１丁目,,{lat},{lon},0166-24-3181,,,,旭川市,石井　良直,昭32. 7. 1,新規,平29. 7. 1,2910997,,,,,,内;外;耳い,481,,,現存,,,地理院地図,2022-11-23"
        )
    }

    fn fixture() -> String {
        [
            HEADER.to_string(),
            row("旭川市", "市立旭川病院", "43.778144", "142.365952"),
            row("札幌市", "市立札幌病院", "43.07099935", "141.3346474"),
            row("旭川市", "旭川赤十字病院", "43.769637", "142.348394"),
            row("旭川市", "ＪＡ北海道厚生連　旭川厚生病院", "43.758732", "142.384931"),
        ]
        .join("\n")
    }

    #[test]
    fn fixture_rows_have_schema_width() {
        assert_eq!(HEADER.split(',').count(), 37);
        assert_eq!(row("a", "b", "1", "2").split(',').count(), 37);
    }

    #[test]
    fn keeps_target_city_rows() {
        let e = parse_csv(&fixture(), &OpendataLayout::default(), "旭川市").unwrap();
        assert_eq!(
            e.records,
            vec![
                GeoRecord {
                    facility_name: "市立旭川病院".into(),
                    latitude: 43.778144,
                    longitude: 142.365952,
                },
                GeoRecord {
                    facility_name: "旭川赤十字病院".into(),
                    latitude: 43.769637,
                    longitude: 142.348394,
                },
                GeoRecord {
                    facility_name: "JA北海道厚生連旭川厚生病院".into(),
                    latitude: 43.758732,
                    longitude: 142.384931,
                },
            ]
        );
        assert_eq!(
            e.skipped,
            vec![SkippedRow {
                row: 3,
                reason: SkipReason::OutsideLocality {
                    city: "札幌市".into()
                },
            }]
        );
    }

    #[test]
    fn short_row_dropped_without_error() {
        let text = format!("{HEADER}\n旭川市,市立旭川病院,43.7,142.3\n{}", row("旭川市", "森山病院", "43.7", "142.3"));
        let e = parse_csv(&text, &OpendataLayout::default(), "旭川市").unwrap();
        assert_eq!(e.records.len(), 1);
        assert_eq!(e.records[0].facility_name, "森山病院");
        assert_eq!(
            e.skipped[0].reason,
            SkipReason::FieldCount {
                expected: 37,
                found: 4
            }
        );
    }

    #[test]
    fn unparseable_coordinate_dropped() {
        let text = [
            HEADER.to_string(),
            row("旭川市", "市立旭川病院", "不明", "142.365952"),
            row("旭川市", "旭川赤十字病院", "43.769637", ""),
            row("旭川市", "森山病院", "NaN", "142.3"),
        ]
        .join("\n");
        let e = parse_csv(&text, &OpendataLayout::default(), "旭川市").unwrap();
        assert!(e.records.is_empty());
        assert_eq!(e.skipped.len(), 3);
        assert!(matches!(
            &e.skipped[1].reason,
            SkipReason::BadCoordinate { field, .. } if field == "longitude"
        ));
    }

    #[test]
    fn full_width_coordinates_are_folded() {
        let text = [HEADER.to_string(), row("旭川市", "森山病院", "４３.７５", "１４２.３５")].join("\n");
        let e = parse_csv(&text, &OpendataLayout::default(), "旭川市").unwrap();
        assert_eq!(e.records[0].latitude, 43.75);
        assert_eq!(e.records[0].longitude, 142.35);
    }

    #[test]
    fn header_is_skipped_even_if_it_looks_like_data() {
        let text = [
            row("旭川市", "見出し病院", "1", "2"),
            row("旭川市", "市立旭川病院", "43.778144", "142.365952"),
        ]
        .join("\n");
        let e = parse_csv(&text, &OpendataLayout::default(), "旭川市").unwrap();
        assert_eq!(e.records.len(), 1);
        assert_eq!(e.records[0].facility_name, "市立旭川病院");
    }

    #[test]
    fn header_only_is_empty() {
        let e = parse_csv(HEADER, &OpendataLayout::default(), "旭川市").unwrap();
        assert_eq!(e.rows_seen(), 0);
        let e = parse_csv("", &OpendataLayout::default(), "旭川市").unwrap();
        assert_eq!(e.rows_seen(), 0);
    }

    #[test]
    fn locality_compare_is_exact() {
        let text = [HEADER.to_string(), row("旭川", "市立旭川病院", "43.7", "142.3")].join("\n");
        let e = parse_csv(&text, &OpendataLayout::default(), "旭川市").unwrap();
        assert!(e.records.is_empty());
    }

    #[test]
    fn out_of_schema_layout_is_rejected_not_indexed() {
        let layout = OpendataLayout {
            field_count: 5,
            city: 10,
            ..OpendataLayout::default()
        };
        let err = parse_csv(&fixture(), &layout, "旭川市").unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)), "got: {err}");

        let fields = ["a", "b", "c", "d", "e"];
        assert_eq!(
            location_from_row(&fields, &layout, "旭川市"),
            Err(SkipReason::FieldCount {
                expected: 11,
                found: 5
            })
        );
    }
}
