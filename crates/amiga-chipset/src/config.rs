//! Chipset configuration.
//!
//! A `ChipsetConfig` is consumed once at construction. The Agnus revision
//! determines the chip RAM window and the data-fetch window rules; the
//! video standard determines the frame geometry.

use serde::Serialize;

/// Agnus revision. Determines the addressable chip RAM range and whether
/// the original (OCS) or enhanced (ECS) data-fetch rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgnusRevision {
    /// OCS Agnus, 512 KB chip RAM.
    Agnus8367,
    /// ECS Agnus, 1 MB chip RAM.
    Agnus8372,
    /// ECS Agnus, 2 MB chip RAM.
    Agnus8375,
}

impl AgnusRevision {
    /// Address mask applied to every chip bus access.
    #[must_use]
    pub fn chip_ram_mask(self) -> u32 {
        match self {
            AgnusRevision::Agnus8367 => 0x07FFFF,
            AgnusRevision::Agnus8372 => 0x0FFFFF,
            AgnusRevision::Agnus8375 => 0x1FFFFF,
        }
    }

    /// Addressable chip RAM in KB.
    #[must_use]
    pub fn chip_ram_limit(self) -> u32 {
        match self {
            AgnusRevision::Agnus8367 => 512,
            AgnusRevision::Agnus8372 => 1024,
            AgnusRevision::Agnus8375 => 2048,
        }
    }

    /// True for the original chipset revision.
    #[must_use]
    pub fn is_ocs(self) -> bool {
        matches!(self, AgnusRevision::Agnus8367)
    }

    /// Identification bits reported in VPOSR bits 8-14.
    #[must_use]
    pub fn id_bits(self) -> u16 {
        match self {
            AgnusRevision::Agnus8367 => 0x00,
            AgnusRevision::Agnus8372 | AgnusRevision::Agnus8375 => 0x20,
        }
    }

    /// Mask applied to DDFSTRT/DDFSTOP writes. ECS resolves one extra bit.
    #[must_use]
    pub fn ddf_mask(self) -> u16 {
        if self.is_ocs() {
            0x00FC
        } else {
            0x00FE
        }
    }
}

/// Video standard. Determines the number of scanlines per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoStandard {
    Pal,
    Ntsc,
}

impl VideoStandard {
    /// Lines in a long (`lof` set) frame.
    #[must_use]
    pub fn lines_long(self) -> u16 {
        match self {
            VideoStandard::Pal => 313,
            VideoStandard::Ntsc => 263,
        }
    }

    /// Lines in a short frame.
    #[must_use]
    pub fn lines_short(self) -> u16 {
        match self {
            VideoStandard::Pal => 312,
            VideoStandard::Ntsc => 262,
        }
    }
}

/// Static configuration of the chipset core.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChipsetConfig {
    pub revision: AgnusRevision,
    pub standard: VideoStandard,
}

impl Default for ChipsetConfig {
    fn default() -> Self {
        Self {
            revision: AgnusRevision::Agnus8372,
            standard: VideoStandard::Pal,
        }
    }
}
