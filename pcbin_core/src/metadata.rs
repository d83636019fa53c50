//! The metadata document stored, compressed, ahead of the records.
//!
//! Every table is a JSON object keyed by id. Absent values are omitted
//! rather than written as `null`, and non-finite coordinates are treated as
//! absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::codes::{CodeEntry, CodeTable};
use crate::error::{PcbinError, Result};
use crate::format::{DataSpec, RecordLayout};
use crate::outcodes::OutcodeTable;
use crate::source::{Domain, ReferenceTables};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcodeDoc {
    pub outcode: String,
    pub incode_count: u64,
}

/// One spatial group: administrative ids, deprivation index, coordinate
/// minimum and scale, and the group-local classification list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electoral_division: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_authority_district: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imd: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_scale: Option<f64>,
    /// Classification ids in the group's sorted code order; `None` where the
    /// code is missing from the reference table.
    #[serde(default)]
    pub urban_rural: Vec<Option<u32>>,
}

impl Location {
    pub fn domain_id(&self, domain: Domain) -> Option<u32> {
        match domain {
            Domain::Country => self.country,
            Domain::County => self.county,
            Domain::ElectoralDivision => self.electoral_division,
            Domain::LocalAuthorityDistrict => self.local_authority_district,
            Domain::UrbanRuralClassification => None,
        }
    }
}

/// Drop NaN and infinities.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// The serialized form of the metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDoc {
    pub data_spec: DataSpec,
    pub outcodes: BTreeMap<u32, OutcodeDoc>,
    pub incodes: BTreeMap<u32, CodeEntry>,
    pub locations: BTreeMap<u32, Location>,
    pub country: BTreeMap<u32, CodeEntry>,
    pub county: BTreeMap<u32, CodeEntry>,
    pub electoral_division: BTreeMap<u32, CodeEntry>,
    pub local_authority_district: BTreeMap<u32, CodeEntry>,
    pub urban_rural_classification: BTreeMap<u32, CodeEntry>,
}

impl MetadataDoc {
    fn domain(&self, domain: Domain) -> &BTreeMap<u32, CodeEntry> {
        match domain {
            Domain::Country => &self.country,
            Domain::County => &self.county,
            Domain::ElectoralDivision => &self.electoral_division,
            Domain::LocalAuthorityDistrict => &self.local_authority_district,
            Domain::UrbanRuralClassification => &self.urban_rural_classification,
        }
    }

    /// Serialize to JSON and compress with `codec`. Returns the raw JSON
    /// length alongside the compressed blob.
    pub fn encode(&self, codec: &dyn Codec) -> Result<(usize, Vec<u8>)> {
        let raw = serde_json::to_vec(self)?;
        let compressed = codec
            .compress(&raw)
            .map_err(|e| PcbinError::Codec(format!("{} compress: {e:#}", codec.name())))?;
        Ok((raw.len(), compressed))
    }

    pub fn decode(blob: &[u8], codec: &dyn Codec) -> Result<Self> {
        let raw = codec
            .decompress(blob)
            .map_err(|e| PcbinError::Codec(format!("{} decompress: {e:#}", codec.name())))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Keyed-by-id form of a code table.
pub fn table_to_doc(table: &CodeTable<String>) -> BTreeMap<u32, CodeEntry> {
    table.iter().map(|e| (e.id, e.clone())).collect()
}

/// Values of `map` in id order, checking the ids run `0..len`.
fn dense<T>(name: &str, map: BTreeMap<u32, T>) -> Result<Vec<T>> {
    map.into_iter()
        .enumerate()
        .map(|(ix, (id, value))| {
            if id as usize == ix {
                Ok(value)
            } else {
                Err(PcbinError::Malformed(format!("{name} ids are not contiguous at id {id}")))
            }
        })
        .collect()
}

fn table_from_doc(name: &str, map: &BTreeMap<u32, CodeEntry>) -> Result<CodeTable<String>> {
    let entries = dense(name, map.clone())?;
    let count = entries.len();
    let table = CodeTable::from_pairs(entries.into_iter().map(|e| (e.code, e.name)));
    if table.len() != count {
        return Err(PcbinError::Malformed(format!("{name} contains repeated codes")));
    }
    Ok(table)
}

/// Parsed metadata held by an open reader.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub data_spec: DataSpec,
    pub layout: RecordLayout,
    pub outcodes: OutcodeTable,
    pub incodes: CodeTable<String>,
    pub locations: Vec<Location>,
    pub references: ReferenceTables,
}

impl Metadata {
    pub fn from_document(doc: MetadataDoc) -> Result<Self> {
        let layout = RecordLayout::from_spec(&doc.data_spec)?;

        let mut outcodes = OutcodeTable::new();
        for oc in dense("outcodes", doc.outcodes.clone())? {
            outcodes.add(oc.outcode, oc.incode_count)?;
        }

        let mut references = ReferenceTables::default();
        for domain in Domain::ALL {
            *references.table_mut(domain) = table_from_doc(domain.name(), doc.domain(domain))?;
        }

        Ok(Self {
            layout,
            outcodes,
            incodes: table_from_doc("incodes", &doc.incodes)?,
            locations: dense("locations", doc.locations)?,
            references,
            data_spec: doc.data_spec,
        })
    }

    pub fn location(&self, id: u32) -> Option<&Location> {
        self.locations.get(id as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> MetadataDoc {
        let country = CodeTable::from_pairs([("S92000003".to_string(), Some("Scotland".to_string()))]);
        MetadataDoc {
            data_spec: DataSpec::current(),
            outcodes: BTreeMap::from([
                (0, OutcodeDoc { outcode: "AB1".into(), incode_count: 2 }),
                (1, OutcodeDoc { outcode: "AB10".into(), incode_count: 1 }),
            ]),
            incodes: table_to_doc(&CodeTable::from_pairs([("0AA".to_string(), None), ("1AB".to_string(), None)])),
            locations: BTreeMap::from([(
                0,
                Location {
                    country: Some(0),
                    lat: Some(57.1),
                    lat_scale: Some(0.01),
                    urban_rural: vec![Some(0), None],
                    ..Default::default()
                },
            )]),
            country: table_to_doc(&country),
            county: BTreeMap::new(),
            electoral_division: BTreeMap::new(),
            local_authority_district: BTreeMap::new(),
            urban_rural_classification: BTreeMap::new(),
        }
    }

    #[test]
    fn test_json_keys_and_omitted_nulls() {
        let json = serde_json::to_value(doc()).unwrap();
        assert_eq!(json["outcodes"]["1"]["outcode"], "AB10");
        assert_eq!(json["incodes"]["1"]["code"], "1AB");
        let location = json["locations"]["0"].as_object().unwrap();
        assert!(location.contains_key("lat"));
        assert!(!location.contains_key("lon"));
        assert!(!location.contains_key("county"));
        assert_eq!(json["data_spec"]["fields"][0]["name"], "incode_key");
        assert_eq!(json["data_spec"]["byte_length"], 6);
    }

    #[test]
    fn test_from_document_rebuilds_tables() {
        let text = serde_json::to_string(&doc()).unwrap();
        let parsed: MetadataDoc = serde_json::from_str(&text).unwrap();
        let meta = Metadata::from_document(parsed).unwrap();

        assert_eq!(meta.outcodes.get("AB10").unwrap().start, 2);
        assert_eq!(meta.incodes.get_id("1AB"), Some(1));
        assert_eq!(meta.references.country.entry(0).unwrap().name.as_deref(), Some("Scotland"));
        assert_eq!(meta.location(0).unwrap().urban_rural, vec![Some(0), None]);
        assert!(meta.location(1).is_none());
    }

    #[test]
    fn test_from_document_rejects_gaps() {
        let mut d = doc();
        let entry = d.incodes.remove(&1).unwrap();
        d.incodes.insert(5, entry);
        assert!(matches!(Metadata::from_document(d), Err(PcbinError::Malformed(_))));
    }

    #[test]
    fn test_finite() {
        assert_eq!(finite(Some(f64::NAN)), None);
        assert_eq!(finite(Some(f64::INFINITY)), None);
        assert_eq!(finite(Some(1.5)), Some(1.5));
    }
}
