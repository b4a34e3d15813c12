/* sharing.rs
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

use std::collections::BTreeSet;

use crate::cache::{CacheHierarchy, CacheLevelInfo};
use crate::topology::CoreTopologyRecord;

/// Cache instance each logical processor belongs to, for the levels that can be shared.
///
/// `None` means the level has no grouping, either because it was not detected or because
/// the number of processors sharing it is unknown.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ProcessorGroups {
    pub l1d: Option<u32>,
    pub l2: Option<u32>,
    pub l3: Option<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheSharingGroups {
    /// Parallel to the topology records.
    pub processors: Vec<ProcessorGroups>,
    pub l1d_instances: usize,
    pub l2_instances: usize,
    pub l3_instances: usize,
}

/// Number of low hardware id bits covered by one cache instance.
pub fn group_shift(cores_sharing: u32) -> u32 {
    if cores_sharing <= 1 {
        0
    } else {
        cores_sharing.ilog2()
    }
}

fn group_of(level: &CacheLevelInfo, hardware_id: u32) -> Option<u32> {
    if !level.is_detected() {
        return None;
    }

    match level.cores_sharing {
        Some(sharing) if sharing > 0 => Some(hardware_id >> group_shift(sharing)),
        _ => None,
    }
}

fn instances(groups: impl Iterator<Item = Option<u32>>) -> usize {
    groups.flatten().collect::<BTreeSet<_>>().len()
}

pub fn derive_groups(caches: &CacheHierarchy, records: &[CoreTopologyRecord]) -> CacheSharingGroups {
    let processors = records
        .iter()
        .map(|record| ProcessorGroups {
            l1d: group_of(&caches.l1d, record.hardware_id),
            l2: group_of(&caches.l2, record.hardware_id),
            l3: group_of(&caches.l3, record.hardware_id),
        })
        .collect::<Vec<_>>();

    CacheSharingGroups {
        l1d_instances: instances(processors.iter().map(|p| p.l1d)),
        l2_instances: instances(processors.iter().map(|p| p.l2)),
        l3_instances: instances(processors.iter().map(|p| p.l3)),
        processors,
    }
}
