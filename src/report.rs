/* report.rs
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

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::cache::{CacheHierarchy, CacheLevelInfo, Inclusivity};
use crate::cpuid::BrandString;
use crate::frequency::FrequencyResult;
use crate::logging::critical;
use crate::sharing::{CacheSharingGroups, ProcessorGroups};
use crate::topology::CoreTopologyRecord;

pub const MSR_ACCESS: &str = "Not available (user-mode execution)";

const FALLBACK_JSON: &str = "{\"success\": false}";

/// Snapshot produced by one discovery pass.
#[derive(Debug, Default, Clone)]
pub struct Report {
    pub frequency: FrequencyResult,
    pub brand: BrandString,
    pub caches: CacheHierarchy,
    pub max_cpuid_leaf: u32,
    pub records: Vec<CoreTopologyRecord>,
    pub sharing: CacheSharingGroups,
}

#[derive(Serialize)]
struct ApicEntry {
    index: usize,
    apic: u32,
    core_type: u32,
    l1d_group: i64,
    l2_group: i64,
    l3_group: i64,
}

impl ApicEntry {
    fn new(record: &CoreTopologyRecord, groups: ProcessorGroups) -> Self {
        fn group_code(group: Option<u32>) -> i64 {
            group.map(i64::from).unwrap_or(-1)
        }

        Self {
            index: record.logical_index,
            apic: record.hardware_id,
            core_type: record.core_type.report_code(),
            l1d_group: group_code(groups.l1d),
            l2_group: group_code(groups.l2),
            l3_group: group_code(groups.l3),
        }
    }
}

#[derive(Serialize)]
struct CacheSharingSummary {
    l1d_instances: usize,
    l2_instances: usize,
    l3_instances: usize,
}

impl Report {
    pub fn num_logical_cores(&self) -> usize {
        self.records.len()
    }

    fn apic_entries(&self) -> Vec<ApicEntry> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let groups = self.sharing.processors.get(i).copied().unwrap_or_default();
                ApicEntry::new(record, groups)
            })
            .collect()
    }

    /// Pretty printed JSON. Serialization failures are logged and replaced by a minimal
    /// object that still carries `success: false`.
    pub fn to_json(&self) -> String {
        match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                critical!("CpuProbe::Report", "Failed to serialize report: {}", e);
                FALLBACK_JSON.to_owned()
            }
        }
    }
}

fn serialize_level<M: SerializeMap>(
    map: &mut M,
    prefix: &str,
    level: &CacheLevelInfo,
) -> Result<(), M::Error> {
    map.serialize_entry(&format!("{}_kb", prefix), &level.size_kb)?;
    if !level.is_detected() {
        return Ok(());
    }

    let cores_sharing = level.cores_sharing.map(i64::from).unwrap_or(-1);
    let inclusive: i32 = match level.inclusivity {
        Inclusivity::Inclusive => 1,
        Inclusivity::Exclusive => 0,
        Inclusivity::Unknown => -1,
    };

    map.serialize_entry(&format!("{}_assoc", prefix), &level.associativity)?;
    map.serialize_entry(&format!("{}_line", prefix), &level.line_size)?;
    map.serialize_entry(&format!("{}_partitions", prefix), &level.partitions)?;
    map.serialize_entry(&format!("{}_sets", prefix), &level.sets)?;
    map.serialize_entry(&format!("{}_cores_sharing", prefix), &cores_sharing)?;
    map.serialize_entry(&format!("{}_inclusive", prefix), &inclusive)?;

    Ok(())
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let frequency = &self.frequency;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("base_mhz", &frequency.base_mhz)?;
        map.serialize_entry("max_mhz", &frequency.max_mhz)?;
        map.serialize_entry("bus_mhz", &frequency.bus_mhz)?;
        map.serialize_entry("turbo_supported", &frequency.turbo_supported)?;
        if let Some(turbo) = &frequency.turbo {
            map.serialize_entry("cpuid_base_freq_mhz", &turbo.base_mhz)?;
            map.serialize_entry("cpuid_max_turbo_1c_mhz", &turbo.max_single_core_mhz)?;
            map.serialize_entry("cpuid_max_turbo_ac_mhz", &turbo.max_all_core_mhz)?;
        }
        map.serialize_entry("msr_access", MSR_ACCESS)?;
        map.serialize_entry("brand", self.brand.as_str())?;

        serialize_level(&mut map, "l1d", &self.caches.l1d)?;
        serialize_level(&mut map, "l1i", &self.caches.l1i)?;
        serialize_level(&mut map, "l2", &self.caches.l2)?;
        serialize_level(&mut map, "l3", &self.caches.l3)?;

        map.serialize_entry("max_cpuid_leaf", &self.max_cpuid_leaf)?;
        map.serialize_entry("num_logical_cores", &self.num_logical_cores())?;
        map.serialize_entry("apic_ids", &self.apic_entries())?;
        map.serialize_entry(
            "cache_sharing",
            &CacheSharingSummary {
                l1d_instances: self.sharing.l1d_instances,
                l2_instances: self.sharing.l2_instances,
                l3_instances: self.sharing.l3_instances,
            },
        )?;
        map.serialize_entry("success", &frequency.success)?;

        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::topology::CoreType;
    use crate::turbo::TurboRatios;

    fn sample() -> Report {
        let mut brand = BrandString::new();
        brand.push_str("Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz");

        Report {
            frequency: FrequencyResult {
                base_mhz: 3200,
                max_mhz: 4600,
                bus_mhz: 100,
                turbo_supported: true,
                success: true,
                turbo: None,
            },
            brand,
            caches: CacheHierarchy {
                l1d: CacheLevelInfo {
                    size_kb: 32,
                    associativity: 8,
                    line_size: 64,
                    partitions: 1,
                    sets: 64,
                    cores_sharing: Some(2),
                    inclusivity: Inclusivity::Exclusive,
                },
                l3: CacheLevelInfo {
                    size_kb: 12288,
                    cores_sharing: None,
                    inclusivity: Inclusivity::Unknown,
                    ..Default::default()
                },
                ..Default::default()
            },
            max_cpuid_leaf: 0x16,
            records: vec![
                CoreTopologyRecord {
                    hardware_id: 0,
                    logical_index: 0,
                    core_type: CoreType::Performance,
                    ..Default::default()
                },
                CoreTopologyRecord {
                    hardware_id: 1,
                    logical_index: 2,
                    ..Default::default()
                },
            ],
            sharing: CacheSharingGroups {
                processors: vec![
                    ProcessorGroups {
                        l1d: Some(0),
                        ..Default::default()
                    },
                    ProcessorGroups {
                        l1d: Some(0),
                        ..Default::default()
                    },
                ],
                l1d_instances: 1,
                l2_instances: 0,
                l3_instances: 0,
            },
        }
    }

    fn to_value(report: &Report) -> Value {
        serde_json::from_str(&report.to_json()).unwrap()
    }

    #[test]
    fn detail_fields_only_for_detected_levels() {
        let value = to_value(&sample());
        dbg!(&value);

        assert_eq!(value["l1d_kb"], 32);
        assert_eq!(value["l1d_assoc"], 8);
        assert_eq!(value["l1d_line"], 64);
        assert_eq!(value["l1d_partitions"], 1);
        assert_eq!(value["l1d_sets"], 64);
        assert_eq!(value["l1d_cores_sharing"], 2);
        assert_eq!(value["l1d_inclusive"], 0);

        assert_eq!(value["l1i_kb"], 0);
        assert!(value.get("l1i_assoc").is_none());
        assert!(value.get("l2_cores_sharing").is_none());

        assert_eq!(value["l3_kb"], 12288);
        assert_eq!(value["l3_cores_sharing"], -1);
        assert_eq!(value["l3_inclusive"], -1);
    }

    #[test]
    fn turbo_fields_follow_leaf_support() {
        let value = to_value(&sample());
        assert!(value.get("cpuid_base_freq_mhz").is_none());

        let mut report = sample();
        report.frequency.turbo = Some(TurboRatios {
            base_mhz: 3200,
            max_single_core_mhz: 4600,
            max_all_core_mhz: 4300,
        });
        let value = to_value(&report);
        assert_eq!(value["cpuid_base_freq_mhz"], 3200);
        assert_eq!(value["cpuid_max_turbo_1c_mhz"], 4600);
        assert_eq!(value["cpuid_max_turbo_ac_mhz"], 4300);
    }

    #[test]
    fn scalar_fields() {
        let value = to_value(&sample());
        assert_eq!(value["base_mhz"], 3200);
        assert_eq!(value["max_mhz"], 4600);
        assert_eq!(value["bus_mhz"], 100);
        assert_eq!(value["turbo_supported"], true);
        assert_eq!(value["msr_access"], MSR_ACCESS);
        assert_eq!(value["brand"], "Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz");
        assert_eq!(value["max_cpuid_leaf"], 0x16);
        assert_eq!(value["num_logical_cores"], 2);
        assert_eq!(value["success"], true);
    }

    #[test]
    fn apic_entries_and_sharing_summary() {
        let value = to_value(&sample());

        assert_eq!(
            value["apic_ids"],
            json!([
                { "index": 0, "apic": 0, "core_type": 1, "l1d_group": 0, "l2_group": -1, "l3_group": -1 },
                { "index": 2, "apic": 1, "core_type": 0, "l1d_group": 0, "l2_group": -1, "l3_group": -1 },
            ])
        );
        assert_eq!(
            value["cache_sharing"],
            json!({ "l1d_instances": 1, "l2_instances": 0, "l3_instances": 0 })
        );
    }

    #[test]
    fn keys_in_schema_order() {
        let mut report = sample();
        report.frequency.turbo = Some(TurboRatios::default());
        let json = report.to_json();

        let keys = [
            "base_mhz",
            "max_mhz",
            "bus_mhz",
            "turbo_supported",
            "cpuid_base_freq_mhz",
            "cpuid_max_turbo_1c_mhz",
            "cpuid_max_turbo_ac_mhz",
            "msr_access",
            "brand",
            "l1d_kb",
            "l1d_inclusive",
            "l1i_kb",
            "l2_kb",
            "l3_kb",
            "l3_inclusive",
            "max_cpuid_leaf",
            "num_logical_cores",
            "apic_ids",
            "cache_sharing",
            "success",
        ];
        let positions = keys
            .iter()
            .map(|key| json.find(&format!("\"{}\"", key)).unwrap())
            .collect::<Vec<_>>();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", json);
    }

    #[test]
    fn failed_resolution_is_in_band() {
        let mut report = sample();
        report.frequency = FrequencyResult::default();
        report.records.clear();
        report.sharing = CacheSharingGroups::default();

        let value = to_value(&report);
        assert_eq!(value["success"], false);
        assert_eq!(value["base_mhz"], 0);
        assert_eq!(value["apic_ids"], json!([]));
        assert_eq!(value["num_logical_cores"], 0);
    }
}
