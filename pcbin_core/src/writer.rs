use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::bits::bit_length;
use crate::codec::Codec;
use crate::codes::CodeTable;
use crate::error::{PcbinError, Result};
use crate::format::{
    encode_length_prefix, DataSpec, RecordField, RecordLayout, RecordPtr, INCODE_KEY_BITS, SPATIAL_KEY_BITS,
};
use crate::metadata::{finite, table_to_doc, Location, MetadataDoc, OutcodeDoc};
use crate::source::{PostcodeRow, PostcodeSource, ReferenceTables};
use crate::spatial::{SpatialIndex, SpatialKey};
use crate::symbols::{encode_incode, encode_outcode};

/// Build-time settings.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Stop reading source rows after this many (for test builds).
    pub max_rows: Option<usize>,
}

/// What a finished build wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub records: u64,
    pub skipped: u64,
    pub outcodes: usize,
    pub incodes: usize,
    pub locations: usize,
    pub metadata_raw_bytes: usize,
    pub metadata_compressed_bytes: usize,
}

/// Fail unless ids `0..count` fit in `bits` bits.
fn ensure_id_space(field: &'static str, count: usize, bits: u32) -> Result<()> {
    let max_id = count.saturating_sub(1) as u64;
    if bit_length(max_id) > bits {
        return Err(PcbinError::capacity(field, max_id, bits));
    }
    Ok(())
}

/// A fully planned binfile: the metadata document and every packed record
/// in on-disk order.
///
/// Planning runs entirely in memory, so a dataset that exceeds the format's
/// capacity is rejected before any output file is touched.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub metadata: MetadataDoc,
    records: Vec<u8>,
    record_count: u64,
    skipped: u64,
}

impl BuildPlan {
    pub fn new(references: &ReferenceTables, rows: &[PostcodeRow]) -> Result<Self> {
        // Rows whose postcode cannot be encoded never reach the tables.
        let mut skipped = 0u64;
        let mut valid: Vec<(u64, &PostcodeRow)> = Vec::with_capacity(rows.len());
        for row in rows {
            match encode_outcode(row.outcode()).and_then(|oc| encode_incode(row.incode()).map(|_| oc)) {
                Ok(encoded) => valid.push((encoded, row)),
                Err(e) => {
                    warn!(pcd = %row.pcd, error = %e, "skipping row");
                    skipped += 1;
                }
            }
        }

        // Incode ids follow sorted order; the reader's first probe relies on it.
        let sorted_incodes: BTreeSet<&str> = valid.iter().map(|(_, r)| r.incode()).collect();
        let incodes = CodeTable::from_pairs(sorted_incodes.into_iter().map(|c| (c.to_string(), None)));
        ensure_id_space(RecordField::IncodeKey.name(), incodes.len(), INCODE_KEY_BITS)?;

        // Outcode groups in ascending encoded order, rows in source order.
        let mut groups: BTreeMap<u64, (&str, Vec<&PostcodeRow>)> = BTreeMap::new();
        for &(encoded, row) in &valid {
            groups.entry(encoded).or_insert_with(|| (row.outcode(), Vec::new())).1.push(row);
        }

        let mut spatial = SpatialIndex::new();
        for &(_, row) in &valid {
            spatial.add(row);
        }
        ensure_id_space(RecordField::SpatialKey.name(), spatial.len(), SPATIAL_KEY_BITS)?;

        info!(
            rows = valid.len(),
            skipped,
            outcodes = groups.len(),
            incodes = incodes.len(),
            locations = spatial.len(),
            "indexed postcodes"
        );

        let layout = RecordLayout::current();
        let mut records = Vec::with_capacity(valid.len() * layout.byte_length());
        let mut outcodes = BTreeMap::new();
        for (id, (outcode, mut members)) in groups.into_values().enumerate() {
            members.sort_by_key(|r| incodes.get_id(r.incode()));
            for row in &members {
                records.extend(pack_row(&layout, &incodes, &spatial, row)?);
            }
            outcodes.insert(
                id as u32,
                OutcodeDoc {
                    outcode: outcode.to_string(),
                    incode_count: members.len() as u64,
                },
            );
        }

        let metadata = MetadataDoc {
            data_spec: DataSpec::current(),
            outcodes,
            incodes: table_to_doc(&incodes),
            locations: locations(references, &spatial),
            country: table_to_doc(&references.country),
            county: table_to_doc(&references.county),
            electoral_division: table_to_doc(&references.electoral_division),
            local_authority_district: table_to_doc(&references.local_authority_district),
            urban_rural_classification: table_to_doc(&references.urban_rural_classification),
        };

        Ok(Self {
            metadata,
            record_count: valid.len() as u64,
            records,
            skipped,
        })
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Packed records, `record_count * byte_length` bytes.
    pub fn records(&self) -> &[u8] {
        &self.records
    }
}

fn pack_row(
    layout: &RecordLayout,
    incodes: &CodeTable<String>,
    spatial: &SpatialIndex,
    row: &PostcodeRow,
) -> Result<Vec<u8>> {
    let missing = |what: &str| PcbinError::Malformed(format!("{what} for {} was not indexed", row.pcd));

    let incode_key = incodes.get_id(row.incode()).ok_or_else(|| missing("incode"))?;
    let spatial_key = spatial
        .id_of(&SpatialKey::from_row(row))
        .ok_or_else(|| missing("spatial key"))?;
    let group = spatial.group(spatial_key).ok_or_else(|| missing("spatial group"))?;
    let (latitude, longitude) = group.offsets(row);
    let urban_rural = group
        .urban_rural_index(&row.urban_rural_classification)
        .ok_or_else(|| missing("urban/rural classification"))?;

    let narrow = |field: RecordField, value: u64| {
        u32::try_from(value).map_err(|_| PcbinError::capacity(field.name(), value, layout.bits(field)))
    };
    layout.pack(&RecordPtr {
        incode_key,
        spatial_key,
        latitude: narrow(RecordField::Latitude, latitude)?,
        longitude: narrow(RecordField::Longitude, longitude)?,
        urban_rural: narrow(RecordField::UrbanRural, urban_rural as u64)?,
    })
}

fn locations(references: &ReferenceTables, spatial: &SpatialIndex) -> BTreeMap<u32, Location> {
    spatial
        .iter()
        .map(|(id, key, group)| {
            let location = Location {
                country: references.country.get_id(key.country.as_str()),
                county: references.county.get_id(key.county.as_str()),
                electoral_division: references.electoral_division.get_id(key.electoral_division.as_str()),
                local_authority_district: references
                    .local_authority_district
                    .get_id(key.local_authority_district.as_str()),
                imd: key.imd,
                lat: finite(group.lat_min()),
                lon: finite(group.lon_min()),
                lat_scale: finite(group.lat_scale()),
                lon_scale: finite(group.lon_scale()),
                urban_rural: group
                    .urban_rural()
                    .map(|c| references.urban_rural_classification.get_id(c))
                    .collect(),
            };
            (id, location)
        })
        .collect()
}

/// Writes a planned binfile.
///
/// # Format layout written
/// ```text
/// [u32 LE: compressed metadata length]
/// [compressed metadata document]
/// [RECORD 0] [RECORD 1] ... [RECORD N-1]   ← fixed byte_length each
/// ```
///
/// The output file is created on [`create`](Writer::create) and not removed
/// if a later step fails.
pub struct Writer {
    file: BufWriter<File>,
    codec: Box<dyn Codec>,
}

impl Writer {
    /// Create (or overwrite) the file at `path`.
    pub fn create(path: impl AsRef<Path>, codec: Box<dyn Codec>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: BufWriter::new(file),
            codec,
        })
    }

    /// Write the metadata prefix, the metadata blob and every record.
    pub fn finish(mut self, plan: &BuildPlan) -> Result<BuildSummary> {
        let (raw_len, blob) = plan.metadata.encode(self.codec.as_ref())?;
        info!(
            raw = raw_len,
            compressed = blob.len(),
            codec = self.codec.name(),
            "encoded metadata"
        );

        self.file.write_all(&encode_length_prefix(blob.len())?)?;
        self.file.write_all(&blob)?;
        self.file.write_all(plan.records())?;
        self.file.flush()?;

        info!(records = plan.record_count(), "wrote postcode records");
        Ok(BuildSummary {
            records: plan.record_count(),
            skipped: plan.skipped,
            outcodes: plan.metadata.outcodes.len(),
            incodes: plan.metadata.incodes.len(),
            locations: plan.metadata.locations.len(),
            metadata_raw_bytes: raw_len,
            metadata_compressed_bytes: blob.len(),
        })
    }
}

/// Read `source`, plan the file and write it to `destination`.
pub fn create_binfile(
    source: &mut dyn PostcodeSource,
    destination: impl AsRef<Path>,
    codec: Box<dyn Codec>,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    let references = source.references()?;
    let rows = source.rows(options.max_rows)?;
    info!(rows = rows.len(), "read postcode rows");

    let plan = BuildPlan::new(&references, &rows)?;
    Writer::create(destination, codec)?.finish(&plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::RECORD_SIZE;

    fn row(pcd: &str, lat: f64, lon: f64) -> PostcodeRow {
        PostcodeRow {
            pcd: pcd.into(),
            country: "E92000001".into(),
            urban_rural_classification: "A1".into(),
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }

    fn unpack_all(plan: &BuildPlan) -> Vec<RecordPtr> {
        let layout = RecordLayout::current();
        plan.records()
            .chunks(RECORD_SIZE)
            .map(|chunk| layout.unpack(chunk).unwrap())
            .collect()
    }

    #[test]
    fn test_outcodes_follow_encoded_order() {
        let rows = vec![
            row("A1 1AA", 51.0, -1.0),
            row("AB1 0AA", 51.0, -1.0),
            row("AA1 1AA", 51.0, -1.0),
        ];
        let plan = BuildPlan::new(&ReferenceTables::default(), &rows).unwrap();
        let order: Vec<&str> = plan.metadata.outcodes.values().map(|o| o.outcode.as_str()).collect();
        assert_eq!(order, vec!["AA1", "AB1", "A1"]);
    }

    #[test]
    fn test_rows_sorted_by_incode_within_outcode() {
        let rows = vec![
            row("AB1 2CD", 51.0, -1.0),
            row("AB1 0AA", 51.0, -1.0),
            row("AB1 0AB", 51.0, -1.0),
        ];
        let plan = BuildPlan::new(&ReferenceTables::default(), &rows).unwrap();
        let keys: Vec<u32> = unpack_all(&plan).iter().map(|p| p.incode_key).collect();
        assert_eq!(keys, vec![0, 1, 2]);
        assert_eq!(plan.metadata.incodes[&0].code, "0AA");
        assert_eq!(plan.metadata.incodes[&2].code, "2CD");
    }

    #[test]
    fn test_invalid_postcodes_are_skipped() {
        let rows = vec![row("AB1 0AA", 51.0, -1.0), row("AB10AA", 51.0, -1.0), row("ab1 0AA", 51.0, -1.0)];
        let plan = BuildPlan::new(&ReferenceTables::default(), &rows).unwrap();
        assert_eq!(plan.record_count(), 1);
        assert_eq!(plan.skipped, 2);
    }

    #[test]
    fn test_location_resolves_reference_ids() {
        let mut refs = ReferenceTables::default();
        refs.country.add("E92000001".into(), Some("England".into()));
        refs.urban_rural_classification.add("A1".into(), Some("Urban major conurbation".into()));

        let plan = BuildPlan::new(&refs, &[row("AB1 0AA", 51.0, -1.0)]).unwrap();
        let loc = &plan.metadata.locations[&0];
        assert_eq!(loc.country, Some(0));
        assert_eq!(loc.county, None);
        assert_eq!(loc.urban_rural, vec![Some(0)]);
        assert_eq!(loc.lat, Some(51.0));
        assert_eq!(loc.lat_scale, Some(0.0));
    }

    #[test]
    fn test_too_many_urban_rural_codes_aborts() {
        let rows: Vec<PostcodeRow> = (0..17)
            .map(|i| PostcodeRow {
                urban_rural_classification: format!("C{i:02}"),
                ..row(&format!("AB1 {}AA", i % 10), 51.0, -1.0)
            })
            .collect();
        let err = BuildPlan::new(&ReferenceTables::default(), &rows).unwrap_err();
        assert!(matches!(err, PcbinError::Capacity { field: "urban_rural", .. }));
    }

    #[test]
    fn test_id_space() {
        assert!(ensure_id_space("spatial_key", 65_536, 16).is_ok());
        assert!(ensure_id_space("spatial_key", 65_537, 16).is_err());
        assert!(ensure_id_space("incode_key", 0, 12).is_ok());
    }
}
