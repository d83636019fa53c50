use std::collections::HashMap;

use crate::error::{PcbinError, Result};

/// The slots occupied by one outcode: `start..=end`, `incode_count` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcodeRange {
    pub code: String,
    pub incode_count: u64,
    pub start: u64,
    pub end: u64,
}

impl OutcodeRange {
    #[inline]
    pub fn contains(&self, pos: u64) -> bool {
        self.start <= pos && pos <= self.end
    }
}

/// Outcode ranges laid out back to back in on-disk order.
///
/// Each outcode starts one slot after the previous one ends, so the ranges
/// partition `0..total()` without gaps or overlaps.
#[derive(Debug, Clone, Default)]
pub struct OutcodeTable {
    ranges: Vec<OutcodeRange>,
    index: HashMap<String, usize>,
}

impl OutcodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next outcode in on-disk order.
    pub fn add(&mut self, code: String, incode_count: u64) -> Result<&OutcodeRange> {
        if incode_count == 0 {
            return Err(PcbinError::Malformed(format!("outcode {code} has no incodes")));
        }
        if self.index.contains_key(&code) {
            return Err(PcbinError::Malformed(format!("outcode {code} is listed twice")));
        }
        let start = self.total();
        let range = OutcodeRange {
            code: code.clone(),
            incode_count,
            start,
            end: start + incode_count - 1,
        };
        self.index.insert(code, self.ranges.len());
        self.ranges.push(range);
        Ok(&self.ranges[self.ranges.len() - 1])
    }

    pub fn get(&self, code: &str) -> Option<&OutcodeRange> {
        self.index.get(code).map(|&ix| &self.ranges[ix])
    }

    /// The outcode owning record slot `pos`.
    pub fn find(&self, pos: u64) -> Option<&OutcodeRange> {
        let ix = self.ranges.partition_point(|r| r.start <= pos);
        ix.checked_sub(1)
            .map(|ix| &self.ranges[ix])
            .filter(|r| r.contains(pos))
    }

    /// Number of record slots covered.
    pub fn total(&self) -> u64 {
        self.ranges.last().map_or(0, |r| r.end + 1)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OutcodeRange> {
        self.ranges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> OutcodeTable {
        let mut t = OutcodeTable::new();
        t.add("AB1".into(), 3).unwrap();
        t.add("AB2".into(), 1).unwrap();
        t.add("B1".into(), 4).unwrap();
        t
    }

    #[test]
    fn test_ranges_are_cumulative() {
        let t = table();
        let spans: Vec<_> = t.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(spans, vec![(0, 2), (3, 3), (4, 7)]);
        assert_eq!(t.total(), 8);
    }

    #[test]
    fn test_find_by_position() {
        let t = table();
        assert_eq!(t.find(0).unwrap().code, "AB1");
        assert_eq!(t.find(2).unwrap().code, "AB1");
        assert_eq!(t.find(3).unwrap().code, "AB2");
        assert_eq!(t.find(7).unwrap().code, "B1");
        assert!(t.find(8).is_none());
    }

    #[test]
    fn test_rejects_empty_and_repeated() {
        let mut t = table();
        assert!(t.add("C1".into(), 0).is_err());
        assert!(t.add("AB1".into(), 2).is_err());
        assert_eq!(t.len(), 3);
    }
}
