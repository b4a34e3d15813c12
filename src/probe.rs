/* probe.rs
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

use crate::config::ProbeConfig;
use crate::cpuid::{brand_string, CpuidSource, Vendor};
use crate::logging::{debug, warning};
use crate::platform::{AffinityControl, CoreRelationships, NominalClockSource};
use crate::report::Report;
use crate::{cache, frequency, sharing, topology};

/// One discovery pass. Never fails: components that cannot run leave their part of the
/// report empty or zeroed.
pub fn discover<P>(cpuid: &dyn CpuidSource, platform: &P, config: &ProbeConfig) -> Report
where
    P: CoreRelationships + AffinityControl + NominalClockSource,
{
    let max_cpuid_leaf = cpuid.max_basic_leaf();
    let brand = brand_string(cpuid);
    let vendor = Vendor::detect(cpuid);
    debug!(
        "CpuProbe",
        "Vendor {:?}, max leaf {:#x}, brand '{}'",
        vendor,
        max_cpuid_leaf,
        brand
    );

    let frequency = frequency::resolve(cpuid, &brand, platform);
    let caches = cache::decode(cpuid, vendor, config);

    let topology = topology::enumerate(cpuid, platform, config);
    if topology.records.is_empty() {
        warning!("CpuProbe", "No logical processors could be enumerated");
    }

    let sharing = sharing::derive_groups(&caches, &topology.records);

    Report {
        frequency,
        brand,
        caches,
        max_cpuid_leaf,
        records: topology.records,
        sharing,
    }
}
