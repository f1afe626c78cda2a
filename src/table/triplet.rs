use crate::{
    error::{Error, Result},
    huffman::{is_prefix_free, HuffmanCode},
    tables::{MAX_CODE_LENGTH, NUM_LITERALS, NUM_LIT_LEN},
};

/// An explicit code assignment for one literal.
///
/// `code` holds the code bits in the order they appear in the stream, first bit most
/// significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triplet {
    pub symbol: u8,
    pub code: u16,
    pub length: u8,
}

impl Triplet {
    pub fn new(symbol: u8, code: u16, length: u8) -> Self {
        Self {
            symbol,
            code,
            length,
        }
    }
}

/// Check a complete literal assignment and return the codes indexed by symbol.
pub(crate) fn validate_triplets(triplets: &[Triplet]) -> Result<[HuffmanCode; NUM_LIT_LEN]> {
    if triplets.len() != NUM_LITERALS {
        return Err(Error::InvalidSize("exactly 256 triplets are required"));
    }

    let mut seen = [false; NUM_LITERALS];
    let mut codes = [HuffmanCode::default(); NUM_LIT_LEN];
    for triplet in triplets {
        if triplet.length == 0 || triplet.length > MAX_CODE_LENGTH {
            return Err(Error::InvalidTriplet("code length must be in 1..=15"));
        }
        if u32::from(triplet.code) >> triplet.length != 0 {
            return Err(Error::InvalidTriplet("code has more bits than its length"));
        }
        let symbol = triplet.symbol as usize;
        if std::mem::replace(&mut seen[symbol], true) {
            return Err(Error::InvalidTriplet("symbol assigned twice"));
        }
        codes[symbol] = HuffmanCode::new(triplet.code, triplet.length);
    }

    if !is_prefix_free(&codes[..NUM_LITERALS]) {
        return Err(Error::InvalidTriplet("codes are not prefix-free"));
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Vec<Triplet> {
        (0..=255u8).map(|s| Triplet::new(s, u16::from(s), 8)).collect()
    }

    #[test]
    fn identity_mapping() {
        let codes = validate_triplets(&identity()).unwrap();
        assert_eq!(codes[7], HuffmanCode::new(7, 8));
        assert_eq!(codes[256].length, 0);
    }

    #[test]
    fn rejects_bad_lists() {
        let triplets = identity();
        assert!(matches!(
            validate_triplets(&triplets[..255]),
            Err(Error::InvalidSize(_))
        ));

        let mut duplicate = identity();
        duplicate[3].symbol = 4;
        assert!(matches!(
            validate_triplets(&duplicate),
            Err(Error::InvalidTriplet(_))
        ));

        let mut overlapping = identity();
        overlapping[0] = Triplet::new(0, 0, 7);
        assert!(matches!(
            validate_triplets(&overlapping),
            Err(Error::InvalidTriplet(_))
        ));

        let mut too_wide = identity();
        too_wide[9] = Triplet::new(9, 0x1ff, 8);
        assert!(matches!(
            validate_triplets(&too_wide),
            Err(Error::InvalidTriplet(_))
        ));
    }
}
