use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
};

use crate::options::ExecutionPath;

/// Which table layouts (software, hardware) and which table family (DEFLATE, Huffman-only) a
/// table supports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RepresentationFlags(u32);

impl RepresentationFlags {
    pub const SOFTWARE: Self = Self(1 << 0);
    pub const HARDWARE: Self = Self(1 << 1);
    pub const DEFLATE: Self = Self(1 << 2);
    pub const HUFFMAN_ONLY: Self = Self(1 << 3);

    const PATHS: Self = Self(Self::SOFTWARE.0 | Self::HARDWARE.0);
    const FAMILIES: Self = Self(Self::DEFLATE.0 | Self::HUFFMAN_ONLY.0);
    const ALL: Self = Self(Self::PATHS.0 | Self::FAMILIES.0);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `None` if unknown bits are set.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The software/hardware subset.
    pub const fn paths(self) -> Self {
        Self(self.0 & Self::PATHS.0)
    }

    /// The DEFLATE/Huffman-only subset.
    pub const fn family(self) -> Self {
        Self(self.0 & Self::FAMILIES.0)
    }

    pub(crate) fn for_path(path: ExecutionPath) -> Self {
        match path {
            ExecutionPath::Software => Self::SOFTWARE,
            ExecutionPath::Hardware => Self::HARDWARE,
            ExecutionPath::Auto => Self::PATHS,
        }
    }
}

impl BitOr for RepresentationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RepresentationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RepresentationFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for RepresentationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::SOFTWARE, "SOFTWARE"),
            (Self::HARDWARE, "HARDWARE"),
            (Self::DEFLATE, "DEFLATE"),
            (Self::HUFFMAN_ONLY, "HUFFMAN_ONLY"),
        ];
        let mut first = true;
        f.write_str("RepresentationFlags(")?;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str(")")
    }
}

/// A single execution-path layout of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Representation {
    Software,
    Hardware,
}

impl Representation {
    pub fn flag(self) -> RepresentationFlags {
        match self {
            Representation::Software => RepresentationFlags::SOFTWARE,
            Representation::Hardware => RepresentationFlags::HARDWARE,
        }
    }
}
