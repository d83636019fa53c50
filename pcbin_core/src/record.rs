use std::fmt;
use std::sync::Arc;

use crate::codes::CodeEntry;
use crate::format::RecordPtr;
use crate::metadata::{Location, Metadata};
use crate::outcodes::OutcodeRange;
use crate::source::Domain;
use crate::spatial::dequantize;

/// One decoded record, resolved against the file's metadata.
#[derive(Debug, Clone)]
pub struct Postcode {
    metadata: Arc<Metadata>,
    pos: u64,
    ptr: RecordPtr,
}

impl Postcode {
    pub(crate) fn new(metadata: Arc<Metadata>, pos: u64, ptr: RecordPtr) -> Self {
        Self { metadata, pos, ptr }
    }

    /// Record slot in the file.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn ptr(&self) -> &RecordPtr {
        &self.ptr
    }

    pub fn outcode(&self) -> Option<&OutcodeRange> {
        self.metadata.outcodes.find(self.pos)
    }

    pub fn incode(&self) -> Option<&str> {
        self.metadata.incodes.get_code(self.ptr.incode_key).map(String::as_str)
    }

    /// `"OUTCODE INCODE"`.
    pub fn pcd(&self) -> String {
        format!(
            "{} {}",
            self.outcode().map_or("?", |o| o.code.as_str()),
            self.incode().unwrap_or("?")
        )
    }

    pub fn location(&self) -> Option<&Location> {
        self.metadata.location(self.ptr.spatial_key)
    }

    pub fn imd(&self) -> Option<i64> {
        self.location().and_then(|l| l.imd)
    }

    fn resolve(&self, domain: Domain) -> Option<&CodeEntry> {
        let id = self.location()?.domain_id(domain)?;
        self.metadata.references.table(domain).entry(id)
    }

    pub fn country(&self) -> Option<&CodeEntry> {
        self.resolve(Domain::Country)
    }

    pub fn county(&self) -> Option<&CodeEntry> {
        self.resolve(Domain::County)
    }

    pub fn electoral_division(&self) -> Option<&CodeEntry> {
        self.resolve(Domain::ElectoralDivision)
    }

    pub fn local_authority_district(&self) -> Option<&CodeEntry> {
        self.resolve(Domain::LocalAuthorityDistrict)
    }

    pub fn urban_rural(&self) -> Option<&CodeEntry> {
        let id = (*self.location()?.urban_rural.get(self.ptr.urban_rural as usize)?)?;
        self.metadata.references.urban_rural_classification.entry(id)
    }

    pub fn latitude(&self) -> Option<f64> {
        let loc = self.location()?;
        Some(dequantize(self.ptr.latitude as u64, loc.lat?, loc.lat_scale?))
    }

    pub fn longitude(&self) -> Option<f64> {
        let loc = self.location()?;
        Some(dequantize(self.ptr.longitude as u64, loc.lon?, loc.lon_scale?))
    }

    /// Map search link for the record's coordinates.
    pub fn google(&self) -> Option<String> {
        Some(format!(
            "https://www.google.com/maps/search/{:.5},{:.5}/",
            self.latitude()?,
            self.longitude()?
        ))
    }
}

impl fmt::Display for Postcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Postcode({}): {}", self.pos, self.pcd())
    }
}
