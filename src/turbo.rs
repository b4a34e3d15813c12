/* turbo.rs
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

use crate::cpuid::{CpuidSource, PackedField, LEAF_FREQUENCY};

const FREQUENCY_MHZ: PackedField = PackedField::new(0, 16);

/// Turbo ceilings as advertised by the processor frequency leaf, in MHz.
///
/// These are read directly from the instruction and reported alongside the resolved clocks;
/// they do not participate in the frequency fallback chain.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TurboRatios {
    pub base_mhz: u32,
    pub max_single_core_mhz: u32,
    pub max_all_core_mhz: u32,
}

/// Returns `None` when the frequency leaf is beyond the maximum supported leaf.
pub fn read_turbo_ratios(cpuid: &dyn CpuidSource) -> Option<TurboRatios> {
    if cpuid.max_basic_leaf() < LEAF_FREQUENCY {
        return None;
    }

    let words = cpuid.query(LEAF_FREQUENCY, 0);
    Some(TurboRatios {
        base_mhz: FREQUENCY_MHZ.read(words.eax),
        max_single_core_mhz: FREQUENCY_MHZ.read(words.ebx),
        max_all_core_mhz: FREQUENCY_MHZ.read(words.ecx),
    })
}
