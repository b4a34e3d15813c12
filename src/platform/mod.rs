/* platform/mod.rs
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

pub use affinity::AffinityGuard;
pub use platform_impl::NativePlatform;

use crate::error::ProbeError;

mod affinity;

#[cfg(target_os = "linux")]
#[path = "linux/mod.rs"]
mod platform_impl;

#[cfg(not(target_os = "linux"))]
#[path = "unsupported.rs"]
mod platform_impl;

/// Enumerates physical cores and the logical processors that belong to each of them.
pub trait CoreRelationships {
    /// OS indices of the online logical processors, gathered from the processor sets of
    /// every physical core. Ascending, without duplicates. Indices need not be contiguous.
    fn logical_processors(&self) -> Result<Vec<usize>, ProbeError>;
}

/// Get/set primitive for the calling thread's processor affinity.
pub trait AffinityControl {
    type Mask: Clone + PartialEq + std::fmt::Debug;

    /// The affinity currently in effect for the calling thread.
    fn current_affinity(&self) -> Result<Self::Mask, ProbeError>;

    fn set_affinity(&self, mask: &Self::Mask) -> Result<(), ProbeError>;

    /// A mask selecting exactly one logical processor.
    fn single_processor(&self, cpu: usize) -> Result<Self::Mask, ProbeError>;

    /// Logical processor the calling thread is executing on right now, if the OS can tell.
    fn running_processor(&self) -> Option<usize>;
}

/// Firmware/management layer view of the nominal maximum clock.
pub trait NominalClockSource {
    fn max_clock_speed_mhz(&self) -> Result<u32, ProbeError>;
}

pub fn native() -> NativePlatform {
    NativePlatform::new()
}
