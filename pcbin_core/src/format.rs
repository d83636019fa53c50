use serde::{Deserialize, Serialize};

use crate::bits::{BitContainer, MAX_BITS};
use crate::error::{PcbinError, Result};

/// Size of the little-endian `u32` metadata length prefix at offset 0.
pub const LENGTH_PREFIX_SIZE: u64 = 4;

// ── Current record layout ─────────────────────────────────────────────────
//
//   incode_key:12 | spatial_key:16 | latitude:8 | longitude:8 | urban_rural:4
//   = 48 bits = 6 bytes, big-endian, first field in the high bits

pub const INCODE_KEY_BITS: u32 = 12;
pub const SPATIAL_KEY_BITS: u32 = 16;
pub const LATITUDE_BITS: u32 = 8;
pub const LONGITUDE_BITS: u32 = 8;
pub const URBAN_RURAL_BITS: u32 = 4;

/// Bytes per record in the current layout.
pub const RECORD_SIZE: usize = 6;

/// Widest single field a record may declare.
const MAX_FIELD_BITS: u32 = u32::BITS;

/// One named field of the record layout, as stored in the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryField {
    pub name: String,
    pub bit_length: u32,
}

/// The record layout as stored in the metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSpec {
    pub byte_length: usize,
    pub fields: Vec<BinaryField>,
}

impl DataSpec {
    /// The layout written by this version of the writer.
    pub fn current() -> Self {
        let fields = RecordField::ALL
            .iter()
            .map(|&f| BinaryField {
                name: f.name().to_string(),
                bit_length: f.current_bits(),
            })
            .collect();
        Self {
            byte_length: RECORD_SIZE,
            fields,
        }
    }

    pub fn total_bits(&self) -> u32 {
        self.fields.iter().map(|f| f.bit_length).sum()
    }
}

/// The fields a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    IncodeKey,
    SpatialKey,
    Latitude,
    Longitude,
    UrbanRural,
}

impl RecordField {
    pub const ALL: [RecordField; 5] = [
        RecordField::IncodeKey,
        RecordField::SpatialKey,
        RecordField::Latitude,
        RecordField::Longitude,
        RecordField::UrbanRural,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RecordField::IncodeKey => "incode_key",
            RecordField::SpatialKey => "spatial_key",
            RecordField::Latitude => "latitude",
            RecordField::Longitude => "longitude",
            RecordField::UrbanRural => "urban_rural",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn current_bits(self) -> u32 {
        match self {
            RecordField::IncodeKey => INCODE_KEY_BITS,
            RecordField::SpatialKey => SPATIAL_KEY_BITS,
            RecordField::Latitude => LATITUDE_BITS,
            RecordField::Longitude => LONGITUDE_BITS,
            RecordField::UrbanRural => URBAN_RURAL_BITS,
        }
    }
}

/// Decoded fields of one on-disk record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordPtr {
    pub incode_key: u32,
    pub spatial_key: u32,
    pub latitude: u32,
    pub longitude: u32,
    pub urban_rural: u32,
}

impl RecordPtr {
    pub fn get(&self, field: RecordField) -> u32 {
        match field {
            RecordField::IncodeKey => self.incode_key,
            RecordField::SpatialKey => self.spatial_key,
            RecordField::Latitude => self.latitude,
            RecordField::Longitude => self.longitude,
            RecordField::UrbanRural => self.urban_rural,
        }
    }

    fn set(&mut self, field: RecordField, value: u32) {
        match field {
            RecordField::IncodeKey => self.incode_key = value,
            RecordField::SpatialKey => self.spatial_key = value,
            RecordField::Latitude => self.latitude = value,
            RecordField::Longitude => self.longitude = value,
            RecordField::UrbanRural => self.urban_rural = value,
        }
    }
}

/// A validated [`DataSpec`] ready to pack and unpack records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    byte_length: usize,
    fields: Vec<(RecordField, u32)>,
}

impl RecordLayout {
    pub fn current() -> Self {
        Self {
            byte_length: RECORD_SIZE,
            fields: RecordField::ALL.iter().map(|&f| (f, f.current_bits())).collect(),
        }
    }

    /// Check that `spec` names every record field exactly once and that
    /// the fields fit in `byte_length` bytes.
    pub fn from_spec(spec: &DataSpec) -> Result<Self> {
        let max_bytes = (MAX_BITS / 8) as usize;
        if spec.byte_length == 0 || spec.byte_length > max_bytes {
            return Err(PcbinError::Malformed(format!(
                "record byte length {} is outside 1..={max_bytes}",
                spec.byte_length
            )));
        }
        let mut fields = Vec::with_capacity(spec.fields.len());
        for f in &spec.fields {
            let field = RecordField::from_name(&f.name)
                .ok_or_else(|| PcbinError::Malformed(format!("unknown record field {:?}", f.name)))?;
            if fields.iter().any(|&(seen, _)| seen == field) {
                return Err(PcbinError::Malformed(format!("record field {:?} is repeated", f.name)));
            }
            if f.bit_length == 0 || f.bit_length > MAX_FIELD_BITS {
                return Err(PcbinError::Malformed(format!(
                    "record field {:?} has unsupported width {}",
                    f.name, f.bit_length
                )));
            }
            fields.push((field, f.bit_length));
        }
        if let Some(missing) = RecordField::ALL
            .into_iter()
            .find(|f| !fields.iter().any(|&(seen, _)| seen == *f))
        {
            return Err(PcbinError::Malformed(format!("record field {:?} is missing", missing.name())));
        }
        if spec.total_bits() as usize > spec.byte_length * 8 {
            return Err(PcbinError::Malformed(format!(
                "{} record bits do not fit in {} bytes",
                spec.total_bits(),
                spec.byte_length
            )));
        }
        Ok(Self {
            byte_length: spec.byte_length,
            fields,
        })
    }

    #[inline]
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn bits(&self, field: RecordField) -> u32 {
        self.fields
            .iter()
            .find(|&&(f, _)| f == field)
            .map_or(0, |&(_, bits)| bits)
    }

    /// Bit-pack `ptr` into `byte_length` big-endian bytes, failing if any
    /// field exceeds its width.
    pub fn pack(&self, ptr: &RecordPtr) -> Result<Vec<u8>> {
        let mut container = BitContainer::default();
        for &(field, bits) in &self.fields {
            container = container.push_field(field.name(), ptr.get(field) as u64, bits)?;
        }
        container.to_bytes(self.byte_length)
    }

    pub fn unpack(&self, bytes: &[u8]) -> Result<RecordPtr> {
        if bytes.len() != self.byte_length {
            return Err(PcbinError::Malformed(format!(
                "record is {} bytes, expected {}",
                bytes.len(),
                self.byte_length
            )));
        }
        let widths: Vec<u32> = self.fields.iter().map(|&(_, bits)| bits).collect();
        let (_, values) = BitContainer::from_bytes(bytes)?.parts(&widths);
        let mut ptr = RecordPtr::default();
        for (&(field, _), value) in self.fields.iter().zip(values) {
            // Field widths are capped at 32 bits by `from_spec`.
            ptr.set(field, value as u32);
        }
        Ok(ptr)
    }
}

/// Encode the metadata blob length prefix.
pub fn encode_length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE as usize]> {
    let len = u32::try_from(len).map_err(|_| PcbinError::capacity("metadata length", len as u64, u32::BITS))?;
    Ok(len.to_le_bytes())
}

pub fn decode_length_prefix(buf: [u8; LENGTH_PREFIX_SIZE as usize]) -> u32 {
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_layout_fits_record() {
        let spec = DataSpec::current();
        assert_eq!(spec.total_bits(), 48);
        assert_eq!(spec.byte_length, RECORD_SIZE);
        assert_eq!(RecordLayout::from_spec(&spec).unwrap(), RecordLayout::current());
    }

    #[test]
    fn test_pack_is_msb_first() {
        let layout = RecordLayout::current();
        let ptr = RecordPtr {
            incode_key: 0xABC,
            spatial_key: 0x1234,
            latitude: 0x56,
            longitude: 0x78,
            urban_rural: 0x9,
        };
        let bytes = layout.pack(&ptr).unwrap();
        assert_eq!(bytes, vec![0xAB, 0xC1, 0x23, 0x45, 0x67, 0x89]);
        assert_eq!(layout.unpack(&bytes).unwrap(), ptr);
    }

    #[test]
    fn test_pack_rejects_field_overflow() {
        let layout = RecordLayout::current();
        let ptr = RecordPtr {
            urban_rural: 16,
            ..Default::default()
        };
        let err = layout.pack(&ptr).unwrap_err();
        assert!(matches!(err, PcbinError::Capacity { field: "urban_rural", bits: 4, .. }));
    }

    #[test]
    fn test_from_spec_validates() {
        let mut spec = DataSpec::current();
        spec.byte_length = 5;
        assert!(RecordLayout::from_spec(&spec).is_err());

        let mut spec = DataSpec::current();
        spec.fields.pop();
        assert!(RecordLayout::from_spec(&spec).is_err());

        let mut spec = DataSpec::current();
        spec.fields[0].name = "postcode".into();
        assert!(RecordLayout::from_spec(&spec).is_err());
    }

    #[test]
    fn test_from_spec_honours_stored_widths() {
        let mut spec = DataSpec::current();
        spec.byte_length = 7;
        spec.fields[2].bit_length = 16;
        let layout = RecordLayout::from_spec(&spec).unwrap();
        assert_eq!(layout.bits(RecordField::Latitude), 16);
        let ptr = RecordPtr {
            latitude: 40_000,
            ..Default::default()
        };
        assert_eq!(layout.unpack(&layout.pack(&ptr).unwrap()).unwrap(), ptr);
    }

    #[test]
    fn test_length_prefix() {
        let buf = encode_length_prefix(300).unwrap();
        assert_eq!(buf, [44, 1, 0, 0]);
        assert_eq!(decode_length_prefix(buf), 300);
    }
}
