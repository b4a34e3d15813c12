/* platform/affinity.rs
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

use super::AffinityControl;
use crate::error::ProbeError;
use crate::logging::critical;

/// Scoped ownership of the calling thread's affinity.
///
/// The affinity in effect when the guard is created is put back when the guard is dropped,
/// whichever way the owning scope is left.
pub struct AffinityGuard<'a, A: AffinityControl> {
    control: &'a A,
    saved: A::Mask,
}

impl<'a, A: AffinityControl> AffinityGuard<'a, A> {
    /// Fails when the current affinity cannot be read, since it could not be restored later.
    pub fn acquire(control: &'a A) -> Result<Self, ProbeError> {
        let saved = control.current_affinity()?;
        Ok(Self { control, saved })
    }

    /// Restricts the calling thread to exactly one logical processor.
    pub fn pin(&self, cpu: usize) -> Result<(), ProbeError> {
        let mask = self.control.single_processor(cpu)?;
        self.control.set_affinity(&mask).map_err(|e| match e {
            ProbeError::AffinityQuery(source) => ProbeError::Affinity { cpu, source },
            e => e,
        })
    }

    pub fn saved(&self) -> &A::Mask {
        &self.saved
    }
}

impl<A: AffinityControl> Drop for AffinityGuard<'_, A> {
    fn drop(&mut self) {
        if let Err(e) = self.control.set_affinity(&self.saved) {
            critical!(
                "CpuProbe::Affinity",
                "Failed to restore thread affinity to {:?}: {}",
                self.saved,
                e
            );
        }
    }
}
