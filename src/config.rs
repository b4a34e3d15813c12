/* config.rs
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

use std::time::Duration;

/// Maximum number of per-processor topology records kept in a single run.
pub const MAX_LOGICAL_PROCESSORS: usize = 256;

const SETTLE_DELAY: Duration = Duration::from_millis(1);
const SETTLE_TIMEOUT: Duration = Duration::from_millis(10);

/// Deterministic cache parameters leaf has at most this many subleaves worth probing.
const MAX_CACHE_SUBLEAVES: u32 = 32;
const MAX_TOPOLOGY_SUBLEAVES: u32 = 8;

/// Tunables for one discovery pass.
///
/// The probe takes no arguments and reads no configuration; these values only exist so that
/// the bounds are named in one place and tests can run without sleeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Capacity of the topology record list. Processors past this index are not enumerated.
    pub max_logical_processors: usize,
    /// Time given to the scheduler to migrate the thread after each affinity change.
    pub settle_delay: Duration,
    /// Upper bound on waiting for the running processor to match the requested one.
    pub settle_timeout: Duration,
    pub max_cache_subleaves: u32,
    pub max_topology_subleaves: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_logical_processors: MAX_LOGICAL_PROCESSORS,
            settle_delay: SETTLE_DELAY,
            settle_timeout: SETTLE_TIMEOUT,
            max_cache_subleaves: MAX_CACHE_SUBLEAVES,
            max_topology_subleaves: MAX_TOPOLOGY_SUBLEAVES,
        }
    }
}

#[cfg(test)]
impl ProbeConfig {
    pub fn without_delays() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            settle_timeout: Duration::ZERO,
            ..Default::default()
        }
    }
}
