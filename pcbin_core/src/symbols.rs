//! Reversible mapping between postcode fragments and small integers.
//!
//! The alphabet is `A`-`Z` followed by `0`-`9`, indexed from 1 so that 0 can
//! stand for an absent character. Outcodes pack four 6-bit symbols, incodes
//! pack a literal digit followed by two 5-bit letter symbols.

use crate::bits::BitContainer;
use crate::error::{PcbinError, Result};

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Width of each outcode symbol after the leading one.
pub const OUTCODE_SYMBOL_BITS: u32 = 6;
/// Width of each incode letter symbol.
pub const INCODE_SYMBOL_BITS: u32 = 5;
/// Width an encoded incode occupies inside an encoded postcode.
pub const INCODE_BITS: u32 = 14;

const MAX_OUTCODE_LEN: usize = 4;
const MAX_INCODE_LEN: usize = 3;

/// Symbol code for `c`: its 1-based alphabet index, 0 when absent.
pub fn encode_char(c: Option<char>) -> Result<u64> {
    let Some(c) = c else { return Ok(0) };
    ALPHABET
        .iter()
        .position(|&a| a as char == c)
        .map(|ix| ix as u64 + 1)
        .ok_or_else(|| PcbinError::InvalidPostcode(format!("symbol {c:?} is not in the alphabet")))
}

/// Inverse of [`encode_char`]; 0 decodes to `None`.
pub fn decode_char(code: u64) -> Result<Option<char>> {
    match code {
        0 => Ok(None),
        1..=36 => Ok(Some(ALPHABET[code as usize - 1] as char)),
        _ => Err(PcbinError::Malformed(format!("symbol code {code} is out of range"))),
    }
}

fn push_decoded(out: &mut String, code: u64) -> Result<()> {
    if let Some(c) = decode_char(code)? {
        out.push(c);
    }
    Ok(())
}

/// Encode a 1-4 character, letter-led outcode.
///
/// The leading symbol sits in the high bits, followed by three 6-bit
/// symbols for characters 2-4 (0 for those missing).
pub fn encode_outcode(text: &str) -> Result<u64> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chars.len() > MAX_OUTCODE_LEN {
        return Err(PcbinError::InvalidPostcode(format!(
            "outcode {text:?} must be 1 to {MAX_OUTCODE_LEN} characters"
        )));
    }
    if !chars[0].is_ascii_uppercase() {
        return Err(PcbinError::InvalidPostcode(format!(
            "outcode {text:?} must start with a letter"
        )));
    }
    let mut container = BitContainer::new(encode_char(chars.first().copied())?);
    for ix in 1..MAX_OUTCODE_LEN {
        container = container.push(encode_char(chars.get(ix).copied())?, OUTCODE_SYMBOL_BITS)?;
    }
    Ok(container.value())
}

pub fn decode_outcode(value: u64) -> Result<String> {
    let (lead, rest) = BitContainer::new(value).parts(&[OUTCODE_SYMBOL_BITS; 3]);
    let mut out = String::with_capacity(MAX_OUTCODE_LEN);
    push_decoded(&mut out, lead)?;
    for code in rest {
        push_decoded(&mut out, code)?;
    }
    Ok(out)
}

/// Encode an incode: a literal digit, then up to two letters as 5-bit
/// symbols.
pub fn encode_incode(text: &str) -> Result<u64> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chars.len() > MAX_INCODE_LEN {
        return Err(PcbinError::InvalidPostcode(format!(
            "incode {text:?} must be 1 to {MAX_INCODE_LEN} characters"
        )));
    }
    let digit = chars[0]
        .to_digit(10)
        .ok_or_else(|| PcbinError::InvalidPostcode(format!("incode {text:?} must start with a digit")))?;
    let mut container = BitContainer::new(digit as u64);
    for ix in 1..MAX_INCODE_LEN {
        let c = chars.get(ix).copied();
        if c.is_some_and(|c| !c.is_ascii_uppercase()) {
            return Err(PcbinError::InvalidPostcode(format!(
                "incode {text:?} may only contain letters after the digit"
            )));
        }
        container = container.push(encode_char(c)?, INCODE_SYMBOL_BITS)?;
    }
    Ok(container.value())
}

pub fn decode_incode(value: u64) -> Result<String> {
    let (digit, letters) = BitContainer::new(value).parts(&[INCODE_SYMBOL_BITS; 2]);
    if digit > 9 {
        return Err(PcbinError::Malformed(format!("incode value {value} has no leading digit")));
    }
    let mut out = digit.to_string();
    for code in letters {
        push_decoded(&mut out, code)?;
    }
    Ok(out)
}

/// Split `"OUTCODE INCODE"` on the first space.
pub fn split_postcode(text: &str) -> Result<(&str, &str)> {
    text.trim()
        .split_once(' ')
        .map(|(outcode, incode)| (outcode, incode.trim_start()))
        .filter(|(outcode, incode)| !outcode.is_empty() && !incode.is_empty())
        .ok_or_else(|| PcbinError::InvalidPostcode(format!("{text:?} has no outcode/incode separator")))
}

/// Encode a full postcode as one integer: the outcode followed by the incode
/// in [`INCODE_BITS`] bits.
pub fn encode_postcode(text: &str) -> Result<u64> {
    let (outcode, incode) = split_postcode(text)?;
    let value = BitContainer::new(encode_outcode(outcode)?).push(encode_incode(incode)?, INCODE_BITS)?;
    Ok(value.value())
}

pub fn decode_postcode(value: u64) -> Result<String> {
    let (outcode, incode) = BitContainer::new(value).parts(&[INCODE_BITS]);
    Ok(format!("{} {}", decode_outcode(outcode)?, decode_incode(incode[0])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_char() {
        assert_eq!(encode_char(Some('A')).unwrap(), 1);
        assert_eq!(encode_char(Some('B')).unwrap(), 2);
        assert_eq!(encode_char(Some('Z')).unwrap(), 26);
        assert_eq!(encode_char(Some('0')).unwrap(), 27);
        assert_eq!(encode_char(Some('9')).unwrap(), 36);
        assert_eq!(encode_char(None).unwrap(), 0);
        assert!(encode_char(Some('a')).is_err());
        assert!(encode_char(Some('-')).is_err());
    }

    #[test]
    fn test_decode_char() {
        assert_eq!(decode_char(1).unwrap(), Some('A'));
        assert_eq!(decode_char(26).unwrap(), Some('Z'));
        assert_eq!(decode_char(36).unwrap(), Some('9'));
        assert_eq!(decode_char(0).unwrap(), None);
        assert!(decode_char(37).is_err());
    }

    #[test]
    fn test_roundtrip_outcode() {
        for oc in ["A1", "AA1", "AA1A", "WC1E", "N1", "N19", "SE17", "Z9", "Z9Z", "ZZ9Z", "B"] {
            assert_eq!(decode_outcode(encode_outcode(oc).unwrap()).unwrap(), oc);
        }
    }

    #[test]
    fn test_outcode_rejects_bad_text() {
        assert!(encode_outcode("").is_err());
        assert!(encode_outcode("1AB").is_err());
        assert!(encode_outcode("AB12C").is_err());
        assert!(encode_outcode("ab1").is_err());
    }

    #[test]
    fn test_outcode_order_is_letters_then_digits() {
        // Lexically "A1" < "AA", but digits encode after letters.
        assert!(encode_outcode("AA").unwrap() < encode_outcode("A1").unwrap());
        assert!(encode_outcode("AB1").unwrap() < encode_outcode("AB10").unwrap());
    }

    #[test]
    fn test_encode_incode() {
        assert_eq!(encode_incode("0AA").unwrap(), 33);
        assert_eq!(encode_incode("8AA").unwrap(), 8225);
        assert!(encode_incode("A0A").is_err());
        assert!(encode_incode("0A1").is_err());
        assert!(encode_incode("0AAA").is_err());
    }

    #[test]
    fn test_decode_incode() {
        assert_eq!(decode_incode(33).unwrap(), "0AA");
        assert_eq!(decode_incode(34).unwrap(), "0AB");
        assert_eq!(decode_incode(65).unwrap(), "0BA");
        assert_eq!(decode_incode(8225).unwrap(), "8AA");
        assert_eq!(decode_incode(10074).unwrap(), "9ZZ");
        assert_eq!(decode_incode(0).unwrap(), "0");
        assert!(decode_incode(10 << 10).is_err());
    }

    #[test]
    fn test_roundtrip_postcode() {
        for pc in ["AB1 0AA", "AB1 8AA", "N19 3SL", "SE1 7RU", "WC1A 6BT"] {
            let value = encode_postcode(pc).unwrap();
            assert_eq!(decode_postcode(value).unwrap(), pc);

            let bytes = BitContainer::new(value).to_bytes(5).unwrap();
            let back = BitContainer::from_bytes(&bytes).unwrap().value();
            assert_eq!(decode_postcode(back).unwrap(), pc);
        }
    }

    #[test]
    fn test_split_postcode() {
        assert_eq!(split_postcode("AB1 0AA").unwrap(), ("AB1", "0AA"));
        assert_eq!(split_postcode(" WC1A  6BT ").unwrap(), ("WC1A", "6BT"));
        assert!(split_postcode("AB10AA").is_err());
        assert!(split_postcode("AB1 ").is_err());
    }

    proptest! {
        #[test]
        fn outcode_roundtrips(oc in "[A-Z][A-Z0-9]{0,3}") {
            prop_assert_eq!(decode_outcode(encode_outcode(&oc).unwrap()).unwrap(), oc);
        }

        #[test]
        fn incode_roundtrips(ic in "[0-9][A-Z]{2}") {
            prop_assert_eq!(decode_incode(encode_incode(&ic).unwrap()).unwrap(), ic);
        }
    }
}
