//! ROM identification: CRC-32 plus a small database mapping known
//! checksums to their mapper hardware and release region.
//!
//! The cartridge header carries no mapper information, so emulators
//! identify special hardware by checksum. Unknown ROMs fall back to
//! the Sega mapper and NTSC timing, which covers nearly everything.

use crate::sms::memory::MapperKind;
use crate::sms::timing::Region;

// ---------------------------------------------------------------------------
// CRC-32
// ---------------------------------------------------------------------------

/// CRC-32 lookup table (reflected polynomial 0xEDB88320).
/// Same algorithm as ZIP, PNG, and Ethernet.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// Compute the CRC-32 checksum of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc ^ 0xFFFF_FFFF
}

/// Strip the 512-byte header some dumping devices prepend. Real SMS
/// images are multiples of 16 KiB; an image sized an odd multiple of
/// 512 bytes carries the extra header.
pub fn strip_copier_header(mut rom: Vec<u8>) -> Vec<u8> {
    if (rom.len() / 512) & 1 != 0 && rom.len() >= 512 {
        rom.drain(..512);
    }
    rom
}

// ---------------------------------------------------------------------------
// Known-ROM database
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomInfo {
    pub mapper: MapperKind,
    pub region: Region,
}

struct DbEntry {
    crc32: u32,
    name: &'static str,
    mapper: MapperKind,
    region: Region,
}

static ROM_DATABASE: &[DbEntry] = &[
    DbEntry {
        crc32: 0xB519_E833,
        name: "Sonic the Hedgehog",
        mapper: MapperKind::Sega,
        region: Region::Ntsc,
    },
    DbEntry {
        crc32: 0x5B3B_922C,
        name: "Sonic the Hedgehog 2",
        mapper: MapperKind::Sega,
        region: Region::Pal,
    },
    DbEntry {
        crc32: 0xAED9_AAC4,
        name: "Alex Kidd in Miracle World",
        mapper: MapperKind::Sega,
        region: Region::Ntsc,
    },
    DbEntry {
        crc32: 0xA577_CE46,
        name: "Micro Machines",
        mapper: MapperKind::Codemasters,
        region: Region::Pal,
    },
    DbEntry {
        crc32: 0x2982_2980,
        name: "Cosmic Spacehead",
        mapper: MapperKind::Codemasters,
        region: Region::Pal,
    },
    DbEntry {
        crc32: 0xB966_4AE1,
        name: "Fantastic Dizzy",
        mapper: MapperKind::Codemasters,
        region: Region::Pal,
    },
];

/// Default for checksums not in the database.
pub const DEFAULT_INFO: RomInfo = RomInfo { mapper: MapperKind::Sega, region: Region::Ntsc };

/// Look up a checksum; `None` for unknown ROMs.
pub fn lookup(crc: u32) -> Option<RomInfo> {
    ROM_DATABASE.iter().find(|e| e.crc32 == crc).map(|e| {
        log::info!("ROM identified: {} ({:?}, {:?})", e.name, e.mapper, e.region);
        RomInfo { mapper: e.mapper, region: e.region }
    })
}

/// Look up a checksum, falling back to [`DEFAULT_INFO`].
pub fn identify(crc: u32) -> RomInfo {
    lookup(crc).unwrap_or(DEFAULT_INFO)
}
