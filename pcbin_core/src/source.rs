//! Input collaborators: reference-domain tables and postcode rows.
//!
//! Numeric row fields are parsed leniently: a value that is absent or does
//! not parse becomes `None` and never fails the read.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::info;

use crate::codes::CodeTable;
use crate::error::{PcbinError, Result};

/// Reference domains whose codes are shared by every location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Country,
    County,
    ElectoralDivision,
    LocalAuthorityDistrict,
    UrbanRuralClassification,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Country,
        Domain::County,
        Domain::ElectoralDivision,
        Domain::LocalAuthorityDistrict,
        Domain::UrbanRuralClassification,
    ];

    /// Key of the domain in the metadata document and its source file stem.
    pub fn name(self) -> &'static str {
        match self {
            Domain::Country => "country",
            Domain::County => "county",
            Domain::ElectoralDivision => "electoral_division",
            Domain::LocalAuthorityDistrict => "local_authority_district",
            Domain::UrbanRuralClassification => "urban_rural_classification",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The code->name tables for every [`Domain`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub country: CodeTable<String>,
    pub county: CodeTable<String>,
    pub electoral_division: CodeTable<String>,
    pub local_authority_district: CodeTable<String>,
    pub urban_rural_classification: CodeTable<String>,
}

impl ReferenceTables {
    pub fn table(&self, domain: Domain) -> &CodeTable<String> {
        match domain {
            Domain::Country => &self.country,
            Domain::County => &self.county,
            Domain::ElectoralDivision => &self.electoral_division,
            Domain::LocalAuthorityDistrict => &self.local_authority_district,
            Domain::UrbanRuralClassification => &self.urban_rural_classification,
        }
    }

    pub fn table_mut(&mut self, domain: Domain) -> &mut CodeTable<String> {
        match domain {
            Domain::Country => &mut self.country,
            Domain::County => &mut self.county,
            Domain::ElectoralDivision => &mut self.electoral_division,
            Domain::LocalAuthorityDistrict => &mut self.local_authority_district,
            Domain::UrbanRuralClassification => &mut self.urban_rural_classification,
        }
    }

    /// Append synthetic entries (e.g. pseudo-regions for offshore postcodes)
    /// after the entries read from the source.
    pub fn extend(&mut self, domain: Domain, extras: &[(&str, &str)]) {
        self.table_mut(domain)
            .extend(extras.iter().map(|&(code, name)| (code.to_string(), Some(name.to_string()))));
    }
}

/// One source row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PostcodeRow {
    pub pcd: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub country: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub county: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub electoral_division: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub local_authority_district: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub urban_rural_classification: String,
    #[serde(default, deserialize_with = "lenient")]
    pub imd: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub osgrid_east: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub osgrid_north: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub osgrid_quality: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub longitude: Option<f64>,
}

impl PostcodeRow {
    pub fn outcode(&self) -> &str {
        self.pcd.split_once(' ').map_or(self.pcd.as_str(), |(oc, _)| oc)
    }

    pub fn incode(&self) -> &str {
        self.pcd.split_once(' ').map_or("", |(_, ic)| ic.trim_start())
    }
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(parsed)
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Supplies the reference tables and rows a build consumes.
pub trait PostcodeSource {
    fn references(&mut self) -> Result<ReferenceTables>;

    /// Rows in source order, at most `max_rows` of them.
    fn rows(&mut self, max_rows: Option<usize>) -> Result<Vec<PostcodeRow>>;
}

/// A source over data already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub references: ReferenceTables,
    pub rows: Vec<PostcodeRow>,
}

impl MemorySource {
    pub fn new(references: ReferenceTables, rows: Vec<PostcodeRow>) -> Self {
        Self { references, rows }
    }
}

impl PostcodeSource for MemorySource {
    fn references(&mut self) -> Result<ReferenceTables> {
        Ok(self.references.clone())
    }

    fn rows(&mut self, max_rows: Option<usize>) -> Result<Vec<PostcodeRow>> {
        let n = max_rows.unwrap_or(self.rows.len()).min(self.rows.len());
        Ok(self.rows[..n].to_vec())
    }
}

/// Row file inside a [`JsonDirSource`] directory.
pub const ROWS_FILE: &str = "postcodes.jsonl";

/// A dataset directory: `postcodes.jsonl` with one JSON row per line, and a
/// `<domain>.json` array of `[code, name]` pairs per reference domain.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn read_domain(&self, domain: Domain) -> Result<CodeTable<String>> {
        let path = self.dir.join(format!("{}.json", domain.name()));
        if !path.exists() {
            return Ok(CodeTable::new());
        }
        let pairs: Vec<(String, Option<String>)> = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        Ok(CodeTable::from_pairs(pairs))
    }
}

impl PostcodeSource for JsonDirSource {
    fn references(&mut self) -> Result<ReferenceTables> {
        let mut tables = ReferenceTables::default();
        for domain in Domain::ALL {
            *tables.table_mut(domain) = self.read_domain(domain)?;
            info!(domain = %domain, entries = tables.table(domain).len(), "read reference table");
        }
        Ok(tables)
    }

    fn rows(&mut self, max_rows: Option<usize>) -> Result<Vec<PostcodeRow>> {
        let file = File::open(self.dir.join(ROWS_FILE))?;
        let mut rows = Vec::new();
        for (ix, line) in BufReader::new(file).lines().enumerate() {
            if max_rows.is_some_and(|max| rows.len() >= max) {
                break;
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line)
                .map_err(|e| PcbinError::Malformed(format!("{ROWS_FILE} line {}: {e}", ix + 1)))?;
            rows.push(row);
        }
        Ok(rows)
    }
}
