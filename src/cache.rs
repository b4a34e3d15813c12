/* cache.rs
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
use crate::cpuid::{
    CpuidSource, PackedField, Vendor, LEAF_AMD_L1_CACHE, LEAF_AMD_L2_L3_CACHE,
    LEAF_DETERMINISTIC_CACHE,
};
use crate::logging::debug;

// Deterministic cache parameters, EAX
const CACHE_TYPE: PackedField = PackedField::new(0, 5);
const CACHE_LEVEL: PackedField = PackedField::new(5, 3);
const SHARING_WIDTH: PackedField = PackedField::new(14, 12);
// EBX, all stored as value - 1
const LINE_SIZE: PackedField = PackedField::new(0, 12);
const PARTITIONS: PackedField = PackedField::new(12, 10);
const WAYS: PackedField = PackedField::new(22, 10);
// ECX, stored as value - 1
const SETS: PackedField = PackedField::new(0, 32);
// EDX bit 1, inclusive of lower levels
const INCLUSIVE: PackedField = PackedField::new(1, 1);

const TYPE_NULL: u32 = 0;
const TYPE_DATA: u32 = 1;
const TYPE_INSTRUCTION: u32 = 2;
const TYPE_UNIFIED: u32 = 3;

// Extended cache leaves
const AMD_L1_SIZE_KB: PackedField = PackedField::new(24, 8);
const AMD_L2_SIZE_KB: PackedField = PackedField::new(16, 16);
const AMD_L3_SIZE_512KB: PackedField = PackedField::new(18, 14);

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Inclusivity {
    Inclusive,
    Exclusive,
    #[default]
    Unknown,
}

/// Geometry of one cache level. A `size_kb` of zero means "not detected".
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheLevelInfo {
    pub size_kb: u64,
    pub associativity: u64,
    pub line_size: u64,
    pub partitions: u64,
    pub sets: u64,
    /// Logical processors sharing one instance; `None` when the hardware does not say.
    pub cores_sharing: Option<u32>,
    pub inclusivity: Inclusivity,
}

impl CacheLevelInfo {
    pub fn is_detected(&self) -> bool {
        self.size_kb > 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheLevel {
    L1Data,
    L1Instruction,
    L2,
    L3,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheHierarchy {
    pub l1d: CacheLevelInfo,
    pub l1i: CacheLevelInfo,
    pub l2: CacheLevelInfo,
    pub l3: CacheLevelInfo,
}

impl CacheHierarchy {
    fn level_mut(&mut self, level: CacheLevel) -> &mut CacheLevelInfo {
        match level {
            CacheLevel::L1Data => &mut self.l1d,
            CacheLevel::L1Instruction => &mut self.l1i,
            CacheLevel::L2 => &mut self.l2,
            CacheLevel::L3 => &mut self.l3,
        }
    }

    /// Stores `info` unless the level was already filled. Returns whether it was stored.
    fn fill_once(&mut self, level: CacheLevel, info: CacheLevelInfo) -> bool {
        let target = self.level_mut(level);
        if target.is_detected() {
            return false;
        }

        *target = info;
        true
    }
}

/// Vendor specific way of reading the cache hierarchy.
pub trait CacheDecodeStrategy {
    fn name(&self) -> &'static str;

    fn decode(&self, cpuid: &dyn CpuidSource, config: &ProbeConfig) -> CacheHierarchy;
}

/// Deterministic cache parameters leaf, walked subleaf by subleaf.
pub struct DeterministicCacheLeaf;

impl CacheDecodeStrategy for DeterministicCacheLeaf {
    fn name(&self) -> &'static str {
        "deterministic cache parameters leaf"
    }

    fn decode(&self, cpuid: &dyn CpuidSource, config: &ProbeConfig) -> CacheHierarchy {
        let mut result = CacheHierarchy::default();
        if cpuid.max_basic_leaf() < LEAF_DETERMINISTIC_CACHE {
            return result;
        }

        for subleaf in 0..config.max_cache_subleaves {
            let words = cpuid.query(LEAF_DETERMINISTIC_CACHE, subleaf);

            let cache_type = CACHE_TYPE.read(words.eax);
            if cache_type == TYPE_NULL {
                break;
            }

            let level = match (cache_type, CACHE_LEVEL.read(words.eax)) {
                (TYPE_DATA, 1) | (TYPE_UNIFIED, 1) => CacheLevel::L1Data,
                (TYPE_INSTRUCTION, 1) => CacheLevel::L1Instruction,
                (TYPE_UNIFIED, 2) => CacheLevel::L2,
                (TYPE_UNIFIED, 3) => CacheLevel::L3,
                (t, l) => {
                    debug!(
                        "CpuProbe::Cache",
                        "Ignoring subleaf {}: type {} level {}",
                        subleaf,
                        t,
                        l
                    );
                    continue;
                }
            };

            let associativity = WAYS.read_minus_one(words.ebx);
            let partitions = PARTITIONS.read_minus_one(words.ebx);
            let line_size = LINE_SIZE.read_minus_one(words.ebx);
            let sets = SETS.read_minus_one(words.ecx);

            let info = CacheLevelInfo {
                size_kb: size_kb(associativity, partitions, line_size, sets),
                associativity,
                line_size,
                partitions,
                sets,
                cores_sharing: Some(cores_sharing(SHARING_WIDTH.read(words.eax))),
                inclusivity: if INCLUSIVE.is_set(words.edx) {
                    Inclusivity::Inclusive
                } else {
                    Inclusivity::Exclusive
                },
            };

            if !result.fill_once(level, info) {
                debug!(
                    "CpuProbe::Cache",
                    "Subleaf {} repeats {:?}, keeping the first entry",
                    subleaf,
                    level
                );
            }
        }

        result
    }
}

/// Fixed layout extended leaves. Sizes only; sharing and inclusivity stay unknown.
pub struct ExtendedCacheLeaves;

impl CacheDecodeStrategy for ExtendedCacheLeaves {
    fn name(&self) -> &'static str {
        "extended cache leaves"
    }

    fn decode(&self, cpuid: &dyn CpuidSource, _: &ProbeConfig) -> CacheHierarchy {
        fn size_only(size_kb: u32) -> CacheLevelInfo {
            CacheLevelInfo {
                size_kb: u64::from(size_kb),
                cores_sharing: None,
                inclusivity: Inclusivity::Unknown,
                ..Default::default()
            }
        }

        let mut result = CacheHierarchy::default();
        let max_extended_leaf = cpuid.max_extended_leaf();

        if max_extended_leaf >= LEAF_AMD_L1_CACHE {
            let l1 = cpuid.query(LEAF_AMD_L1_CACHE, 0);
            result.fill_once(CacheLevel::L1Data, size_only(AMD_L1_SIZE_KB.read(l1.ecx)));
            result.fill_once(
                CacheLevel::L1Instruction,
                size_only(AMD_L1_SIZE_KB.read(l1.edx)),
            );
        }

        if max_extended_leaf >= LEAF_AMD_L2_L3_CACHE {
            let l2_l3 = cpuid.query(LEAF_AMD_L2_L3_CACHE, 0);
            result.fill_once(CacheLevel::L2, size_only(AMD_L2_SIZE_KB.read(l2_l3.ecx)));
            result.fill_once(
                CacheLevel::L3,
                size_only(AMD_L3_SIZE_512KB.read(l2_l3.edx) * 512),
            );
        }

        result
    }
}

pub fn strategy_for(vendor: Vendor) -> Option<&'static dyn CacheDecodeStrategy> {
    match vendor {
        Vendor::Intel => Some(&DeterministicCacheLeaf),
        Vendor::Amd => Some(&ExtendedCacheLeaves),
        Vendor::Unknown => None,
    }
}

/// Decodes the cache hierarchy; an unknown vendor leaves every level undetected.
pub fn decode(cpuid: &dyn CpuidSource, vendor: Vendor, config: &ProbeConfig) -> CacheHierarchy {
    match strategy_for(vendor) {
        Some(strategy) => {
            debug!("CpuProbe::Cache", "Decoding caches from {}", strategy.name());
            strategy.decode(cpuid, config)
        }
        None => CacheHierarchy::default(),
    }
}

/// The largest encodable geometry is 2^64 bytes, so the product is taken in 128 bits.
pub fn size_kb(associativity: u64, partitions: u64, line_size: u64, sets: u64) -> u64 {
    (associativity as u128 * partitions as u128 * line_size as u128 * sets as u128 / 1024) as u64
}

/// Turns the sharing field into a processor count: two to the power of the number of
/// contiguous set bits counted from bit 0.
pub fn cores_sharing(sharing_field: u32) -> u32 {
    1 << (sharing_field & SHARING_WIDTH.mask()).trailing_ones()
}
