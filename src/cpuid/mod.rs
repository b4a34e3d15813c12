/* cpuid/mod.rs
 *
 * Copyright 2023 Romeo Calota
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

pub use bits::{low_mask, PackedField};
pub use vendor::Vendor;

pub mod bits;
pub mod vendor;

pub const LEAF_VENDOR: u32 = 0x0;
pub const LEAF_DETERMINISTIC_CACHE: u32 = 0x4;
pub const LEAF_THERMAL_POWER: u32 = 0x6;
pub const LEAF_EXTENDED_TOPOLOGY: u32 = 0xB;
pub const LEAF_TSC_CRYSTAL: u32 = 0x15;
pub const LEAF_FREQUENCY: u32 = 0x16;
pub const LEAF_HYBRID: u32 = 0x1A;
pub const LEAF_EXTENDED_TOPOLOGY_V2: u32 = 0x1F;

pub const LEAF_EXTENDED_MAX: u32 = 0x8000_0000;
pub const LEAF_BRAND_FIRST: u32 = 0x8000_0002;
pub const LEAF_BRAND_LAST: u32 = 0x8000_0004;
pub const LEAF_AMD_L1_CACHE: u32 = 0x8000_0005;
pub const LEAF_AMD_L2_L3_CACHE: u32 = 0x8000_0006;

pub const BRAND_STRING_LEN: usize = 48;

pub type BrandString = arrayvec::ArrayString<BRAND_STRING_LEN>;

/// The four output words of one identification query.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CpuidWords {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl CpuidWords {
    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }
}

/// Source of identification query results.
///
/// Querying a leaf the processor does not implement is not an error: callers get whatever the
/// hardware returns (usually zeroes) and must treat implausible values as "feature absent".
pub trait CpuidSource {
    fn query(&self, leaf: u32, subleaf: u32) -> CpuidWords;

    fn max_basic_leaf(&self) -> u32 {
        self.query(LEAF_VENDOR, 0).eax
    }

    fn max_extended_leaf(&self) -> u32 {
        self.query(LEAF_EXTENDED_MAX, 0).eax
    }
}

impl<T: CpuidSource + ?Sized> CpuidSource for &T {
    fn query(&self, leaf: u32, subleaf: u32) -> CpuidWords {
        (**self).query(leaf, subleaf)
    }
}

/// Executes the instruction on whichever processor the calling thread currently runs on.
#[derive(Debug, Default, Copy, Clone)]
pub struct NativeCpuid;

impl CpuidSource for NativeCpuid {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn query(&self, leaf: u32, subleaf: u32) -> CpuidWords {
        use raw_cpuid::*;

        let x = cpuid!(leaf, subleaf);
        CpuidWords::new(x.eax, x.ebx, x.ecx, x.edx)
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    fn query(&self, _: u32, _: u32) -> CpuidWords {
        CpuidWords::default()
    }
}

/// Reads the 48 byte processor brand string, or an empty string when the extended leaves
/// are not implemented.
pub fn brand_string(cpuid: &dyn CpuidSource) -> BrandString {
    let mut result = BrandString::new();
    if cpuid.max_extended_leaf() < LEAF_BRAND_LAST {
        return result;
    }

    let mut raw = [0_u8; BRAND_STRING_LEN];
    for (i, leaf) in (LEAF_BRAND_FIRST..=LEAF_BRAND_LAST).enumerate() {
        let words = cpuid.query(leaf, 0);
        for (j, word) in [words.eax, words.ebx, words.ecx, words.edx].iter().enumerate() {
            let start = i * 16 + j * 4;
            raw[start..start + 4].copy_from_slice(&word.to_le_bytes());
        }
    }

    let len = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    for c in raw[..len].iter().map(|b| *b as char) {
        let c = if c.is_ascii() && !c.is_ascii_control() {
            c
        } else {
            '?'
        };
        if result.try_push(c).is_err() {
            break;
        }
    }

    let trimmed = result.trim();
    if trimmed.len() != result.len() {
        let mut copy = BrandString::new();
        copy.push_str(trimmed);
        result = copy;
    }

    result
}

/// Packs ASCII text into little-endian output words, four bytes per word.
#[cfg(test)]
pub fn ascii_words(text: &str) -> Vec<u32> {
    text.as_bytes()
        .chunks(4)
        .map(|chunk| {
            let mut bytes = [0_u8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(bytes)
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::FakeCpuid;
    use super::*;

    #[test]
    fn brand_string_is_reassembled_and_trimmed() {
        let cpuid = FakeCpuid::new().with_brand("  Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz");
        assert_eq!(
            brand_string(&cpuid).as_str(),
            "Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz"
        );
    }

    #[test]
    fn brand_string_requires_extended_leaves() {
        let mut cpuid = FakeCpuid::new().with_brand("AMD Ryzen 9 7950X 16-Core Processor");
        cpuid.set(LEAF_EXTENDED_MAX, 0, CpuidWords::new(0x8000_0001, 0, 0, 0));
        assert!(brand_string(&cpuid).is_empty());
    }

    #[test]
    fn max_leaves() {
        let cpuid = FakeCpuid::new()
            .with_vendor(0x20, "GenuineIntel")
            .with(LEAF_EXTENDED_MAX, 0, CpuidWords::new(0x8000_0008, 0, 0, 0));
        assert_eq!(cpuid.max_basic_leaf(), 0x20);
        assert_eq!(cpuid.max_extended_leaf(), 0x8000_0008);
    }

    #[test]
    fn native_query_does_not_panic() {
        let words = NativeCpuid.query(LEAF_VENDOR, 0);
        dbg!(words);
    }
}
