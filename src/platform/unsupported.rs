/* platform/unsupported.rs
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

use super::{AffinityControl, CoreRelationships, NominalClockSource};
use crate::error::ProbeError;

/// Targets without an affinity primitive. Topology enumeration and the nominal clock query
/// report "unsupported", which the probe treats as feature-absent.
#[derive(Debug, Default, Clone)]
pub struct NativePlatform;

impl NativePlatform {
    pub fn new() -> Self {
        Self
    }
}

impl CoreRelationships for NativePlatform {
    fn logical_processors(&self) -> Result<Vec<usize>, ProbeError> {
        Err(ProbeError::Unsupported("core relationship enumeration"))
    }
}

impl AffinityControl for NativePlatform {
    type Mask = ();

    fn current_affinity(&self) -> Result<(), ProbeError> {
        Err(ProbeError::Unsupported("thread affinity"))
    }

    fn set_affinity(&self, _: &()) -> Result<(), ProbeError> {
        Err(ProbeError::Unsupported("thread affinity"))
    }

    fn single_processor(&self, _: usize) -> Result<(), ProbeError> {
        Err(ProbeError::Unsupported("thread affinity"))
    }

    fn running_processor(&self) -> Option<usize> {
        None
    }
}

impl NominalClockSource for NativePlatform {
    fn max_clock_speed_mhz(&self) -> Result<u32, ProbeError> {
        Err(ProbeError::Unsupported("nominal clock query"))
    }
}
