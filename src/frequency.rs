/* frequency.rs
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

use crate::cpuid::{
    CpuidSource, PackedField, LEAF_FREQUENCY, LEAF_THERMAL_POWER, LEAF_TSC_CRYSTAL,
};
use crate::logging::{debug, info};
use crate::platform::NominalClockSource;
use crate::turbo::{read_turbo_ratios, TurboRatios};

const FREQUENCY_MHZ: PackedField = PackedField::new(0, 16);
const TURBO_BOOST_AVAILABLE: PackedField = PackedField::new(1, 1);

/// Clock characteristics in MHz.
///
/// When `success` is false no strategy produced usable values and every `*_mhz` field is
/// zero; the zeroes are not measurements.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrequencyResult {
    pub base_mhz: u32,
    pub max_mhz: u32,
    pub bus_mhz: u32,
    pub turbo_supported: bool,
    pub success: bool,
    pub turbo: Option<TurboRatios>,
}

impl FrequencyResult {
    fn is_complete(&self) -> bool {
        self.base_mhz != 0 && self.max_mhz != 0
    }
}

/// Everything a strategy may consult.
pub struct FrequencyContext<'a> {
    pub cpuid: &'a dyn CpuidSource,
    pub max_leaf: u32,
    pub brand: &'a str,
    pub nominal: &'a dyn NominalClockSource,
}

/// One stage of the frequency fallback chain.
pub trait FrequencyStrategy {
    fn name(&self) -> &'static str;

    /// Whether this stage may run given the hardware and what earlier stages produced.
    fn is_applicable(&self, ctx: &FrequencyContext, current: &FrequencyResult) -> bool;

    /// Fills what it can into `result`; returns true if it reports success.
    fn apply(&self, ctx: &FrequencyContext, result: &mut FrequencyResult) -> bool;
}

/// Processor frequency information leaf: base, max and bus clock straight from hardware.
pub struct FrequencyLeaf;

impl FrequencyStrategy for FrequencyLeaf {
    fn name(&self) -> &'static str {
        "processor frequency leaf"
    }

    fn is_applicable(&self, ctx: &FrequencyContext, _: &FrequencyResult) -> bool {
        ctx.max_leaf >= LEAF_FREQUENCY
    }

    fn apply(&self, ctx: &FrequencyContext, result: &mut FrequencyResult) -> bool {
        let words = ctx.cpuid.query(LEAF_FREQUENCY, 0);
        result.base_mhz = FREQUENCY_MHZ.read(words.eax);
        result.max_mhz = FREQUENCY_MHZ.read(words.ebx);
        result.bus_mhz = FREQUENCY_MHZ.read(words.ecx);

        result.is_complete()
    }
}

/// Time stamp counter to core crystal clock ratio leaf.
pub struct CrystalClockRatio;

impl FrequencyStrategy for CrystalClockRatio {
    fn name(&self) -> &'static str {
        "crystal clock ratio"
    }

    fn is_applicable(&self, ctx: &FrequencyContext, _: &FrequencyResult) -> bool {
        ctx.max_leaf >= LEAF_TSC_CRYSTAL
    }

    fn apply(&self, ctx: &FrequencyContext, result: &mut FrequencyResult) -> bool {
        let words = ctx.cpuid.query(LEAF_TSC_CRYSTAL, 0);
        let (denominator, numerator, crystal_hz) = (words.eax, words.ebx, words.ecx);
        if denominator == 0 || numerator == 0 || crystal_hz == 0 {
            return false;
        }

        let crystal_mhz = crystal_hz as f64 / 1e6;
        let derived_base = crystal_mhz * (numerator as f64 / denominator as f64);

        if result.bus_mhz == 0 {
            result.bus_mhz = crystal_mhz.round() as u32;
        }

        if result.base_mhz == 0 && derived_base > 0. {
            result.base_mhz = derived_base.round() as u32;
            if result.max_mhz == 0 {
                // Conservative: the ratio only describes the base clock
                result.max_mhz = result.base_mhz;
            }
            return true;
        }

        false
    }
}

/// Rated clock printed in the brand string.
///
/// This is the marketing/nominal rating, not a measured ceiling, so it is used for whichever
/// of base and max is still missing.
pub struct BrandStringRating;

impl FrequencyStrategy for BrandStringRating {
    fn name(&self) -> &'static str {
        "brand string"
    }

    fn is_applicable(&self, _: &FrequencyContext, _: &FrequencyResult) -> bool {
        true
    }

    fn apply(&self, ctx: &FrequencyContext, result: &mut FrequencyResult) -> bool {
        let Some(mhz) = parse_brand_frequency(ctx.brand) else {
            return false;
        };

        if result.base_mhz == 0 {
            result.base_mhz = mhz;
        }
        if result.max_mhz == 0 {
            result.max_mhz = mhz;
        }

        true
    }
}

/// Nominal clock as reported by the firmware/management layer.
pub struct ManagementLayerClock;

impl FrequencyStrategy for ManagementLayerClock {
    fn name(&self) -> &'static str {
        "management layer"
    }

    fn is_applicable(&self, _: &FrequencyContext, current: &FrequencyResult) -> bool {
        current.max_mhz == 0
    }

    fn apply(&self, ctx: &FrequencyContext, result: &mut FrequencyResult) -> bool {
        let mhz = match ctx.nominal.max_clock_speed_mhz() {
            Ok(mhz) if mhz > 0 => mhz,
            Ok(_) => return false,
            Err(e) => {
                info!("CpuProbe::Frequency", "Nominal clock unavailable: {}", e);
                return false;
            }
        };

        result.max_mhz = mhz;
        if result.base_mhz == 0 {
            result.base_mhz = mhz;
        }

        true
    }
}

/// The fallback chain, in the order the stages are tried.
pub fn default_strategies() -> [&'static dyn FrequencyStrategy; 4] {
    [
        &FrequencyLeaf,
        &CrystalClockRatio,
        &BrandStringRating,
        &ManagementLayerClock,
    ]
}

/// Runs `strategies` in order; each runs only while base or max clock is still unknown.
pub fn resolve_with(ctx: &FrequencyContext, strategies: &[&dyn FrequencyStrategy]) -> FrequencyResult {
    let mut result = FrequencyResult::default();

    for strategy in strategies {
        if result.is_complete() {
            break;
        }
        if !strategy.is_applicable(ctx, &result) {
            debug!(
                "CpuProbe::Frequency",
                "Skipping '{}': not applicable",
                strategy.name()
            );
            continue;
        }

        if strategy.apply(ctx, &mut result) {
            debug!(
                "CpuProbe::Frequency",
                "'{}' produced base {} MHz, max {} MHz, bus {} MHz",
                strategy.name(),
                result.base_mhz,
                result.max_mhz,
                result.bus_mhz
            );
            result.success = true;
        }
    }

    if !result.success {
        result.base_mhz = 0;
        result.max_mhz = 0;
        result.bus_mhz = 0;
    }

    result.turbo_supported = turbo_supported(ctx.cpuid, ctx.max_leaf);
    result.turbo = read_turbo_ratios(ctx.cpuid);

    result
}

pub fn resolve(
    cpuid: &dyn CpuidSource,
    brand: &str,
    nominal: &dyn NominalClockSource,
) -> FrequencyResult {
    let ctx = FrequencyContext {
        cpuid,
        max_leaf: cpuid.max_basic_leaf(),
        brand,
        nominal,
    };

    resolve_with(&ctx, &default_strategies())
}

fn turbo_supported(cpuid: &dyn CpuidSource, max_leaf: u32) -> bool {
    max_leaf >= LEAF_THERMAL_POWER
        && TURBO_BOOST_AVAILABLE.is_set(cpuid.query(LEAF_THERMAL_POWER, 0).eax)
}

/// Extracts the rated clock from a brand string such as `... CPU @ 3.60GHz`.
///
/// Looks for the last `GHZ` token (falling back to `MHZ`), ignoring case, and reads the number
/// right before it. Returns the value in MHz rounded to the nearest integer.
pub fn parse_brand_frequency(brand: &str) -> Option<u32> {
    let upper = brand.to_ascii_uppercase();
    let (unit_pos, multiplier) = match upper.rfind("GHZ") {
        Some(pos) => (pos, 1000.),
        None => (upper.rfind("MHZ")?, 1.),
    };

    let before = upper[..unit_pos].trim_end_matches(' ').as_bytes();

    let mut start = before.len();
    let mut seen_dot = false;
    while start > 0 {
        match before[start - 1] {
            b'0'..=b'9' => {}
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        start -= 1;
    }

    let number = std::str::from_utf8(&before[start..]).ok()?;
    if !number.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let value = number.parse::<f64>().ok()?;
    if value <= 0. {
        return None;
    }

    let mhz = (value * multiplier).round();
    if mhz < 1. || mhz > u32::MAX as f64 {
        return None;
    }

    Some(mhz as u32)
}
