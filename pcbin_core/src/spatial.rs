//! Groups rows by administrative area and coarse coordinate cell, and
//! quantizes coordinates relative to each group's bounding box.

use std::collections::BTreeSet;

use crate::codes::CodeTable;
use crate::source::PostcodeRow;

/// Largest quantized coordinate offset.
pub const OFFSET_MAX: u64 = 255;

/// Administrative identity plus a 0.1 degree coordinate cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpatialKey {
    pub country: String,
    pub county: String,
    pub electoral_division: String,
    pub local_authority_district: String,
    pub imd: Option<i64>,
    pub x: Option<i64>,
    pub y: Option<i64>,
}

fn cell(value: Option<f64>) -> Option<i64> {
    value.filter(|v| v.is_finite()).map(|v| (v * 10.0).floor() as i64)
}

impl SpatialKey {
    pub fn from_row(row: &PostcodeRow) -> Self {
        Self {
            country: row.country.clone(),
            county: row.county.clone(),
            electoral_division: row.electoral_division.clone(),
            local_authority_district: row.local_authority_district.clone(),
            imd: row.imd,
            x: cell(row.latitude),
            y: cell(row.longitude),
        }
    }
}

/// The row's `(latitude, longitude)` if both are present and the latitude
/// is not a sentinel (the source marks unknown locations outside `(0, 90)`).
pub fn coordinates(row: &PostcodeRow) -> Option<(f64, f64)> {
    match (row.latitude, row.longitude) {
        (Some(lat), Some(lon)) if lat > 0.0 && lat < 90.0 && lon.is_finite() => Some((lat, lon)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Extent {
    min: f64,
    max: f64,
}

impl Extent {
    fn include(extent: &mut Option<Extent>, value: f64) {
        match extent {
            Some(e) => {
                e.min = e.min.min(value);
                e.max = e.max.max(value);
            }
            None => *extent = Some(Extent { min: value, max: value }),
        }
    }
}

/// Running coordinate extent and classification set of one spatial group.
#[derive(Debug, Clone, Default)]
pub struct SpatialGroup {
    lat: Option<Extent>,
    lon: Option<Extent>,
    urban_rural: BTreeSet<String>,
    members: usize,
}

impl SpatialGroup {
    pub fn append(&mut self, row: &PostcodeRow) {
        if let Some((lat, lon)) = coordinates(row) {
            Extent::include(&mut self.lat, lat);
            Extent::include(&mut self.lon, lon);
        }
        self.urban_rural.insert(row.urban_rural_classification.clone());
        self.members += 1;
    }

    pub fn members(&self) -> usize {
        self.members
    }

    pub fn lat_min(&self) -> Option<f64> {
        self.lat.map(|e| e.min)
    }

    pub fn lat_scale(&self) -> Option<f64> {
        self.lat.map(|e| e.max - e.min)
    }

    pub fn lon_min(&self) -> Option<f64> {
        self.lon.map(|e| e.min)
    }

    pub fn lon_scale(&self) -> Option<f64> {
        self.lon.map(|e| e.max - e.min)
    }

    /// Distinct classification codes in sorted order.
    pub fn urban_rural(&self) -> impl Iterator<Item = &str> {
        self.urban_rural.iter().map(String::as_str)
    }

    /// Position of `code` in [`urban_rural`](SpatialGroup::urban_rural).
    pub fn urban_rural_index(&self, code: &str) -> Option<usize> {
        self.urban_rural.iter().position(|c| c == code)
    }

    /// Quantized `(latitude, longitude)` offsets of a member row.
    pub fn offsets(&self, row: &PostcodeRow) -> (u64, u64) {
        match coordinates(row) {
            Some((lat, lon)) => (
                quantize(lat, self.lat_min(), self.lat_scale()),
                quantize(lon, self.lon_min(), self.lon_scale()),
            ),
            None => (0, 0),
        }
    }
}

/// `round((value - min) * 255 / scale)`; 0 when the group has no extent.
///
/// Values below `min` saturate to 0. Values past `min + scale` are returned
/// unclamped so the writer can reject them.
pub fn quantize(value: f64, min: Option<f64>, scale: Option<f64>) -> u64 {
    match (min, scale) {
        (Some(min), Some(scale)) if scale > 0.0 => {
            let q = ((value - min) * OFFSET_MAX as f64 / scale).round();
            if q <= 0.0 {
                0
            } else {
                q as u64
            }
        }
        _ => 0,
    }
}

pub fn dequantize(offset: u64, min: f64, scale: f64) -> f64 {
    offset as f64 * scale / OFFSET_MAX as f64 + min
}

/// Spatial keys registered in first-seen order, with one group per key.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    keys: CodeTable<SpatialKey>,
    groups: Vec<SpatialGroup>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `row` into its group, returning the group id.
    pub fn add(&mut self, row: &PostcodeRow) -> u32 {
        let id = self.keys.add(SpatialKey::from_row(row), None).id;
        if id as usize == self.groups.len() {
            self.groups.push(SpatialGroup::default());
        }
        self.groups[id as usize].append(row);
        id
    }

    pub fn id_of(&self, key: &SpatialKey) -> Option<u32> {
        self.keys.get_id(key)
    }

    pub fn group(&self, id: u32) -> Option<&SpatialGroup> {
        self.groups.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `(id, key, group)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SpatialKey, &SpatialGroup)> {
        self.keys.iter().zip(&self.groups).map(|(entry, group)| (entry.id, &entry.code, group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pcd: &str, lat: Option<f64>, lon: Option<f64>, urban_rural: &str) -> PostcodeRow {
        PostcodeRow {
            pcd: pcd.into(),
            country: "S92000003".into(),
            local_authority_district: "S12000033".into(),
            urban_rural_classification: urban_rural.into(),
            imd: Some(6808),
            latitude: lat,
            longitude: lon,
            ..Default::default()
        }
    }

    #[test]
    fn test_key_uses_coarse_cell() {
        let key = SpatialKey::from_row(&row("AB1 0AA", Some(57.10147), Some(-2.24285), "1"));
        assert_eq!(key.x, Some(571));
        assert_eq!(key.y, Some(-23));
        assert_eq!(SpatialKey::from_row(&row("AB1 0AA", None, None, "1")).x, None);
    }

    #[test]
    fn test_group_extent_ignores_sentinels() {
        let mut group = SpatialGroup::default();
        group.append(&row("AB1 0AA", Some(57.1), Some(-2.3), "3"));
        group.append(&row("AB1 0AB", Some(57.15), Some(-2.2), "1"));
        group.append(&row("AB1 0AD", Some(99.999999), Some(0.0), "1"));
        group.append(&row("AB1 0AE", None, Some(-2.25), "1"));

        assert_eq!(group.members(), 4);
        assert_eq!(group.lat_min(), Some(57.1));
        assert!((group.lat_scale().unwrap() - 0.05).abs() < 1e-9);
        assert_eq!(group.lon_min(), Some(-2.3));
        assert_eq!(group.urban_rural().collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(group.urban_rural_index("3"), Some(1));
        assert_eq!(group.urban_rural_index("7"), None);
    }

    #[test]
    fn test_offsets() {
        let mut group = SpatialGroup::default();
        let lo = row("AB1 0AA", Some(51.0), Some(-1.0), "1");
        let hi = row("AB1 0AB", Some(51.0001), Some(-0.9999), "1");
        group.append(&lo);
        group.append(&hi);
        assert_eq!(group.offsets(&lo), (0, 0));
        assert_eq!(group.offsets(&hi), (255, 255));
        assert_eq!(group.offsets(&row("AB1 0AD", None, None, "1")), (0, 0));
    }

    #[test]
    fn test_single_point_group_has_zero_scale() {
        let mut group = SpatialGroup::default();
        let only = row("AB1 0AA", Some(51.5), Some(-0.1), "1");
        group.append(&only);
        assert_eq!(group.lat_scale(), Some(0.0));
        assert_eq!(group.offsets(&only), (0, 0));
    }

    #[test]
    fn test_quantize_roundtrip_stays_in_range() {
        let (min, scale) = (51.0, 0.0001);
        for value in [51.0, 51.00003, 51.00007, 51.0001] {
            let q = quantize(value, Some(min), Some(scale));
            assert!(q <= OFFSET_MAX);
            let back = dequantize(q, min, scale);
            assert!(back >= min && back <= min + scale + 1e-12);
            assert!((back - value).abs() <= scale / OFFSET_MAX as f64 + 1e-12);
        }
        assert_eq!(quantize(51.2, Some(51.0), Some(0.1)), 510);
    }

    #[test]
    fn test_index_assigns_first_seen_ids() {
        let mut index = SpatialIndex::new();
        assert_eq!(index.add(&row("AB1 0AA", Some(57.10), Some(-2.24), "1")), 0);
        assert_eq!(index.add(&row("AB1 0AB", Some(51.5), Some(-0.1), "1")), 1);
        assert_eq!(index.add(&row("AB1 0AD", Some(57.11), Some(-2.21), "1")), 0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.group(0).unwrap().members(), 2);
        let ids: Vec<u32> = index.iter().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec![0, 1]);
    }
}
