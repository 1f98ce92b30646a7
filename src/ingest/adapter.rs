//! Normalization of raw ABR records into the domain shape.

use chrono::NaiveDate;

use crate::ingest::xml::RawRecord;
use crate::models::{BusinessName, NewBusiness};

/// Entity type code marking an individual / sole trader.
const INDIVIDUAL: &str = "IND";

/// Fallback when the source carries no usable name at all.
const UNKNOWN_ENTITY: &str = "Unknown Entity";

/// The source encodes "not applicable" as this literal date.
const SENTINEL_DATE: &str = "19000101";

/// Normalize one raw record into an upsert-ready business.
///
/// Individuals get `entity_name` assembled from their given and family
/// names; everything else uses the main-entity name. Dates arrive as
/// `YYYYMMDD`; the sentinel and anything malformed both become `None`.
pub fn normalize(raw: RawRecord) -> NewBusiness {
    let is_individual = raw.entity_type_code.as_deref() == Some(INDIVIDUAL);

    let (entity_name, given_name, family_name) = if is_individual {
        let given_name = if raw.given_names.is_empty() {
            None
        } else {
            Some(raw.given_names.join(" "))
        };
        let family_name = raw.family_name.clone();
        let full: Vec<&str> = [given_name.as_deref(), family_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let entity_name = if full.is_empty() {
            UNKNOWN_ENTITY.to_string()
        } else {
            full.join(" ")
        };
        (entity_name, given_name, family_name)
    } else {
        let entity_name = raw
            .main_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_ENTITY.to_string());
        (entity_name, None, None)
    };

    NewBusiness {
        abn: raw.abn.unwrap_or_default(),
        abn_status: raw.abn_status.unwrap_or_default(),
        abn_status_from: parse_date(raw.abn_status_from.as_deref()),
        entity_type_code: raw.entity_type_code.unwrap_or_default(),
        entity_type_text: raw.entity_type_text,
        entity_name,
        given_name,
        family_name,
        state: raw.state,
        postcode: raw.postcode,
        gst_status: raw.gst_status,
        gst_from_date: parse_date(raw.gst_from.as_deref()),
        acn: raw.acn,
        record_last_updated: parse_date(raw.record_last_updated.as_deref()),
        other_names: raw
            .other_names
            .into_iter()
            .map(|n| BusinessName {
                name_type: n.name_type,
                name_text: n.name_text,
            })
            .collect(),
    }
}

/// Parse a `YYYYMMDD` date. The `19000101` sentinel and malformed strings
/// both normalize to `None`.
pub(crate) fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?.trim();
    if value.is_empty() || value == SENTINEL_DATE {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()
}
