use crate::{
    error::{Error, Result},
    tables::{NUM_DIST, NUM_LIT_LEN},
};

/// Symbol frequencies for one DEFLATE block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    pub literal_lengths: [u32; NUM_LIT_LEN],
    pub distances: [u32; NUM_DIST],
    /// Must stay zero.
    pub reserved: [u32; 2],
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            literal_lengths: [0; NUM_LIT_LEN],
            distances: [0; NUM_DIST],
            reserved: [0; 2],
        }
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.reserved != [0; 2] {
            return Err(Error::ReservedHistogramField);
        }
        Ok(())
    }

    /// Replace every zero frequency with one, so that every symbol receives a code.
    pub fn patch_zeros(&mut self) {
        for f in self
            .literal_lengths
            .iter_mut()
            .chain(self.distances.iter_mut())
        {
            if *f == 0 {
                *f = 1;
            }
        }
    }

    /// Whether every slot holds a non-zero frequency.
    pub fn is_complete(&self) -> bool {
        self.literal_lengths
            .iter()
            .chain(&self.distances)
            .all(|&f| f > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patching() {
        let mut histogram = Histogram::new();
        histogram.literal_lengths[65] = 100;
        assert!(!histogram.is_complete());
        histogram.patch_zeros();
        assert!(histogram.is_complete());
        assert_eq!(histogram.literal_lengths[65], 100);
        assert_eq!(histogram.distances[29], 1);
    }

    #[test]
    fn reserved_fields() {
        let mut histogram = Histogram::new();
        assert!(histogram.validate().is_ok());
        histogram.reserved[1] = 3;
        assert!(matches!(
            histogram.validate(),
            Err(Error::ReservedHistogramField)
        ));
    }
}
