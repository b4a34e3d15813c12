/* cpuid/vendor.rs
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

use super::{CpuidSource, LEAF_VENDOR};

const SIGNATURE_INTEL: &[u8; 12] = b"GenuineIntel";
const SIGNATURE_AMD: &[u8; 12] = b"AuthenticAMD";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Vendor {
    Intel,
    Amd,
    Unknown,
}

impl Vendor {
    pub fn detect(cpuid: &dyn CpuidSource) -> Self {
        Self::from_signature(&signature(cpuid))
    }

    pub fn from_signature(signature: &[u8; 12]) -> Self {
        match signature {
            SIGNATURE_INTEL => Vendor::Intel,
            SIGNATURE_AMD => Vendor::Amd,
            _ => Vendor::Unknown,
        }
    }
}

/// Vendor signature from leaf 0, assembled from EBX, EDX, ECX in that order.
pub fn signature(cpuid: &dyn CpuidSource) -> [u8; 12] {
    let words = cpuid.query(LEAF_VENDOR, 0);

    let mut result = [0_u8; 12];
    for (i, word) in [words.ebx, words.edx, words.ecx].iter().enumerate() {
        result[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpuid::testing::FakeCpuid;

    #[test]
    fn detects_known_vendors() {
        let intel = FakeCpuid::new().with_vendor(0x16, "GenuineIntel");
        assert_eq!(Vendor::detect(&intel), Vendor::Intel);

        let amd = FakeCpuid::new().with_vendor(0x10, "AuthenticAMD");
        assert_eq!(Vendor::detect(&amd), Vendor::Amd);
    }

    #[test]
    fn word_order_matters() {
        // Same three words in EBX, ECX, EDX order must not match.
        let words = crate::cpuid::ascii_words("GenuineIntel");
        let swapped = FakeCpuid::new().with(
            LEAF_VENDOR,
            0,
            crate::cpuid::CpuidWords::new(0x16, words[0], words[1], words[2]),
        );
        assert_eq!(Vendor::detect(&swapped), Vendor::Unknown);
    }

    #[test]
    fn unknown_and_absent_signatures() {
        let hygon = FakeCpuid::new().with_vendor(0x0D, "HygonGenuine");
        assert_eq!(Vendor::detect(&hygon), Vendor::Unknown);
        assert_eq!(Vendor::detect(&FakeCpuid::new()), Vendor::Unknown);
    }
}
