/* topology.rs
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

use std::time::{Duration, Instant};

use crate::config::ProbeConfig;
use crate::cpuid::{
    low_mask, CpuidSource, PackedField, LEAF_EXTENDED_TOPOLOGY, LEAF_EXTENDED_TOPOLOGY_V2,
    LEAF_HYBRID,
};
use crate::logging::{debug, warning};
use crate::platform::{AffinityControl, AffinityGuard, CoreRelationships};

const SHIFT_WIDTH: PackedField = PackedField::new(0, 5);
const LOGICAL_PROCESSORS: PackedField = PackedField::new(0, 16);
const LEVEL_TYPE: PackedField = PackedField::new(8, 8);
const HYBRID_CORE_TYPE: PackedField = PackedField::new(24, 8);

const LEVEL_INVALID: u32 = 0;
const LEVEL_SMT: u32 = 1;
const LEVEL_CORE: u32 = 2;
const LEVEL_MODULE: u32 = 3;
const LEVEL_DIE: u32 = 5;

const CORE_TYPE_ATOM: u32 = 0x20;
const CORE_TYPE_CORE: u32 = 0x40;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum CoreType {
    #[default]
    Reserved,
    Performance,
    Efficiency,
    Other(u8),
}

impl CoreType {
    pub fn from_hybrid_code(code: u32) -> Self {
        match code {
            0 => Self::Reserved,
            CORE_TYPE_CORE => Self::Performance,
            CORE_TYPE_ATOM => Self::Efficiency,
            other => Self::Other(other as u8),
        }
    }

    /// Stable integer used in the report.
    pub fn report_code(self) -> u32 {
        match self {
            Self::Reserved => 0,
            Self::Performance => 1,
            Self::Efficiency => 2,
            Self::Other(_) => 3,
        }
    }
}

/// Identity of one enumerated logical processor.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CoreTopologyRecord {
    /// x2APIC id
    pub hardware_id: u32,
    pub core_type: CoreType,
    pub core_index: u32,
    /// OS index of the processor the record was read on
    pub logical_index: usize,
    pub package_id: u32,
    pub tile_id: u32,
    pub die_id: u32,
    pub module_id: u32,
}

/// The two versions of the extended topology leaf.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TopologyLeaf {
    Extended,
    ExtendedV2,
}

impl TopologyLeaf {
    pub fn leaf(self) -> u32 {
        match self {
            Self::Extended => LEAF_EXTENDED_TOPOLOGY,
            Self::ExtendedV2 => LEAF_EXTENDED_TOPOLOGY_V2,
        }
    }

    /// `None` when the processor implements neither version.
    pub fn select(cpuid: &dyn CpuidSource, max_leaf: u32) -> Option<Self> {
        if max_leaf >= LEAF_EXTENDED_TOPOLOGY_V2
            && LOGICAL_PROCESSORS.is_set(cpuid.query(LEAF_EXTENDED_TOPOLOGY_V2, 0).ebx)
        {
            Some(Self::ExtendedV2)
        } else if max_leaf >= LEAF_EXTENDED_TOPOLOGY {
            Some(Self::Extended)
        } else {
            None
        }
    }
}

/// Bit widths of the hardware id sub-fields, as reported by the topology leaf.
///
/// Each width is the number of low id bits that must be shifted out to get the id of the
/// next level up.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LevelWidths {
    pub smt: u32,
    pub core: u32,
    pub module: Option<u32>,
    pub die: Option<u32>,
}

impl LevelWidths {
    pub fn read(cpuid: &dyn CpuidSource, leaf: TopologyLeaf, max_subleaves: u32) -> Self {
        let mut result = Self::default();

        for subleaf in 0..max_subleaves {
            let words = cpuid.query(leaf.leaf(), subleaf);
            let width = SHIFT_WIDTH.read(words.eax);
            match LEVEL_TYPE.read(words.ecx) {
                LEVEL_INVALID => break,
                LEVEL_SMT => result.smt = width,
                LEVEL_CORE => result.core = width,
                LEVEL_MODULE => result.module = Some(width),
                LEVEL_DIE => result.die = Some(width),
                _ => {}
            }
        }

        result
    }

    fn below_die(&self) -> u32 {
        self.smt.max(self.core).max(self.module.unwrap_or(0))
    }

    pub fn decode(
        &self,
        logical_index: usize,
        hardware_id: u32,
        core_type: CoreType,
    ) -> CoreTopologyRecord {
        let id = hardware_id;
        let core_mask = low_mask(self.core) & !low_mask(self.smt);

        CoreTopologyRecord {
            hardware_id,
            core_type,
            core_index: (id & core_mask) >> self.smt,
            logical_index,
            package_id: id >> self.core,
            tile_id: self.die.map(|width| id >> width).unwrap_or(0),
            die_id: self
                .die
                .map(|width| (id & low_mask(width)) >> self.below_die())
                .unwrap_or(0),
            module_id: self
                .module
                .map(|width| (id & low_mask(width)) >> self.core)
                .unwrap_or(0),
        }
    }
}

/// Outcome of one enumeration pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Topology {
    /// `None` means the topology leaf is unsupported and nothing was enumerated.
    pub leaf: Option<TopologyLeaf>,
    /// Logical processors reported by the OS.
    pub processor_count: usize,
    pub records: Vec<CoreTopologyRecord>,
    /// More processors were available than the record capacity.
    pub truncated: bool,
}

/// Pins the calling thread to each logical processor in turn and reads its identity.
///
/// The thread affinity in effect on entry is restored before returning, on every path.
/// Processors that cannot be pinned, or that the thread does not migrate to in time, are
/// skipped.
pub fn enumerate<P>(cpuid: &dyn CpuidSource, platform: &P, config: &ProbeConfig) -> Topology
where
    P: CoreRelationships + AffinityControl,
{
    let max_leaf = cpuid.max_basic_leaf();
    let Some(leaf) = TopologyLeaf::select(cpuid, max_leaf) else {
        debug!(
            "CpuProbe::Topology",
            "Topology leaf not supported (max leaf {:#x})",
            max_leaf
        );
        return Topology::default();
    };

    let mut result = Topology {
        leaf: Some(leaf),
        ..Default::default()
    };

    let guard = match AffinityGuard::acquire(platform) {
        Ok(guard) => guard,
        Err(e) => {
            warning!(
                "CpuProbe::Topology",
                "Skipping topology enumeration, cannot save thread affinity: {}",
                e
            );
            return result;
        }
    };
    debug!(
        "CpuProbe::Topology",
        "Saved thread affinity {:?}, using leaf {:#x}",
        guard.saved(),
        leaf.leaf()
    );

    let processors = match platform.logical_processors() {
        Ok(processors) => processors,
        Err(e) => {
            warning!(
                "CpuProbe::Topology",
                "Failed to enumerate logical processors: {}",
                e
            );
            return result;
        }
    };
    result.processor_count = processors.len();

    for &lp in &processors {
        if result.records.len() >= config.max_logical_processors {
            warning!(
                "CpuProbe::Topology",
                "Only the first {} of {} logical processors are reported",
                config.max_logical_processors,
                result.processor_count
            );
            result.truncated = true;
            break;
        }

        if let Err(e) = guard.pin(lp) {
            debug!("CpuProbe::Topology", "Skipping processor {}: {}", lp, e);
            continue;
        }

        if !wait_for_migration(platform, lp, config.settle_delay, config.settle_timeout) {
            continue;
        }

        let hardware_id = cpuid.query(leaf.leaf(), 0).edx;
        let widths = LevelWidths::read(cpuid, leaf, config.max_topology_subleaves);
        let core_type = read_core_type(cpuid, max_leaf);

        result
            .records
            .push(widths.decode(lp, hardware_id, core_type));
    }

    result
}

/// Core type of whichever processor executes the query.
pub fn read_core_type(cpuid: &dyn CpuidSource, max_leaf: u32) -> CoreType {
    if max_leaf < LEAF_HYBRID {
        return CoreType::Reserved;
    }

    CoreType::from_hybrid_code(HYBRID_CORE_TYPE.read(cpuid.query(LEAF_HYBRID, 0).eax))
}

fn wait_for_migration<A: AffinityControl>(
    platform: &A,
    cpu: usize,
    delay: Duration,
    timeout: Duration,
) -> bool {
    std::thread::sleep(delay);

    let deadline = Instant::now() + timeout;
    loop {
        let running = match platform.running_processor() {
            // Nothing to check against, trust the pin
            None => return true,
            Some(running) if running == cpu => return true,
            Some(running) => running,
        };

        if Instant::now() >= deadline {
            warning!(
                "CpuProbe::Topology",
                "Thread still on processor {} after pinning to {}, skipping it",
                running,
                cpu
            );
            return false;
        }

        std::thread::sleep(delay);
    }
}
