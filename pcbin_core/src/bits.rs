use crate::error::{PcbinError, Result};

/// Widest container the format packs into a single integer.
pub const MAX_BITS: u32 = u64::BITS;

/// Immutable big-endian bit accumulator.
///
/// Fields are pushed most-significant first: every `push` shifts the
/// accumulated value left by the field width and ORs the new field into
/// the low bits. [`parts`](BitContainer::parts) undoes a sequence of pushes
/// given the widths in push order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitContainer(u64);

#[inline]
fn mask(bits: u32) -> u64 {
    if bits >= MAX_BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[inline]
fn shr(value: u64, bits: u32) -> u64 {
    if bits >= MAX_BITS {
        0
    } else {
        value >> bits
    }
}

/// Number of bits needed to represent `value` (0 needs 0 bits).
#[inline]
pub fn bit_length(value: u64) -> u32 {
    MAX_BITS - value.leading_zeros()
}

impl BitContainer {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Append `value` as a `bits`-wide field.
    pub fn push(self, value: u64, bits: u32) -> Result<Self> {
        self.push_field("bit field", value, bits)
    }

    /// Like [`push`](BitContainer::push), naming the field in the capacity
    /// error.
    pub fn push_field(self, field: &'static str, value: u64, bits: u32) -> Result<Self> {
        if bits > MAX_BITS || bit_length(value) > bits {
            return Err(PcbinError::capacity(field, value, bits));
        }
        // The accumulated value must survive the shift.
        if bit_length(self.0) + bits > MAX_BITS {
            return Err(PcbinError::capacity("bit container", self.0, MAX_BITS - bits));
        }
        let shifted = if bits == MAX_BITS { 0 } else { self.0 << bits };
        Ok(Self(shifted | (value & mask(bits))))
    }

    /// Split off the low `bits` bits: returns `(remaining, extracted)`.
    pub fn pop(self, bits: u32) -> (Self, u64) {
        (Self(shr(self.0, bits)), self.0 & mask(bits))
    }

    /// Recover fields pushed with `widths` (in push order).
    ///
    /// Returns the high-order remainder left over after removing every named
    /// field, and the field values in push order. The remainder is 0 when the
    /// container was built starting from an empty one.
    pub fn parts(self, widths: &[u32]) -> (u64, Vec<u64>) {
        let mut fields = vec![0u64; widths.len()];
        let mut rest = self;
        for (slot, &width) in fields.iter_mut().zip(widths).rev() {
            let (next, value) = rest.pop(width);
            *slot = value;
            rest = next;
        }
        (rest.0, fields)
    }

    /// Serialize to exactly `len` big-endian bytes.
    pub fn to_bytes(self, len: usize) -> Result<Vec<u8>> {
        let be = self.0.to_be_bytes();
        if len < be.len() && bit_length(self.0) as usize > len * 8 {
            return Err(PcbinError::capacity("byte encoding", self.0, (len * 8) as u32));
        }
        let mut out = vec![0u8; len];
        let n = len.min(be.len());
        out[len - n..].copy_from_slice(&be[be.len() - n..]);
        Ok(out)
    }

    /// Read a big-endian integer of at most 8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > be_width() {
            return Err(PcbinError::Malformed(format!(
                "{} byte field is wider than {} bytes",
                bytes.len(),
                be_width()
            )));
        }
        Ok(Self(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)))
    }
}

#[inline]
const fn be_width() -> usize {
    (MAX_BITS / 8) as usize
}

impl From<u64> for BitContainer {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl PartialEq<u64> for BitContainer {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push() {
        assert_eq!(BitContainer::new(1), 1);
        assert_eq!(BitContainer::new(1).push(0, 1).unwrap(), 2);
        assert_eq!(BitContainer::new(1).push(0, 5).unwrap(), 32);
        assert_eq!(BitContainer::new(1).push(0, 3).unwrap().push(0, 3).unwrap(), 64);
        assert_eq!(BitContainer::new(1).push(0, 3).unwrap().push(3, 3).unwrap(), 67);
    }

    #[test]
    fn test_pop_and_parts() {
        let (rest, low) = BitContainer::new(67).pop(6);
        assert_eq!((rest.value(), low), (1, 3));

        assert_eq!(BitContainer::new(67).parts(&[3, 3]), (1, vec![0, 3]));
        assert_eq!(BitContainer::new(67).parts(&[6]), (1, vec![3]));
    }

    #[test]
    fn test_push_rejects_oversized_value() {
        let err = BitContainer::default().push(256, 8).unwrap_err();
        assert!(matches!(err, PcbinError::Capacity { value: 256, bits: 8, .. }));
        assert!(BitContainer::default().push(255, 8).is_ok());
        assert!(BitContainer::default().push(1, 0).is_err());
    }

    #[test]
    fn test_push_rejects_container_overflow() {
        let full = BitContainer::new(u64::MAX >> 4);
        assert!(full.push(0, 4).is_ok());
        assert!(full.push(0, 5).is_err());
    }

    #[test]
    fn test_bytes_are_big_endian() {
        let c = BitContainer::new(0x0102_0304_0506);
        assert_eq!(c.to_bytes(6).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(c.to_bytes(8).unwrap(), vec![0, 0, 1, 2, 3, 4, 5, 6]);
        assert!(c.to_bytes(5).is_err());
        assert_eq!(BitContainer::from_bytes(&[1, 2, 3, 4, 5, 6]).unwrap(), c);
        assert!(BitContainer::from_bytes(&[0; 9]).is_err());
    }

    proptest! {
        #[test]
        fn parts_reproduces_pushes(fields in prop::collection::vec((any::<u64>(), 1u32..=12), 0..5)) {
            let fields: Vec<(u64, u32)> = fields
                .into_iter()
                .map(|(v, w)| (v & mask(w), w))
                .collect();
            let mut c = BitContainer::default();
            for &(v, w) in &fields {
                c = c.push(v, w).unwrap();
            }
            let widths: Vec<u32> = fields.iter().map(|&(_, w)| w).collect();
            let (rest, values) = c.parts(&widths);
            prop_assert_eq!(rest, 0);
            prop_assert_eq!(values, fields.iter().map(|&(v, _)| v).collect::<Vec<_>>());
        }
    }
}
