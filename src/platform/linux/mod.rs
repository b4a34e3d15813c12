/* platform/linux/mod.rs
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
use std::path::{Path, PathBuf};

use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use super::{AffinityControl, CoreRelationships, NominalClockSource};
use crate::error::ProbeError;
use crate::logging::debug;

const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

// `core_cpus_list` replaced `thread_siblings_list` in newer kernels; both list the logical
// processors of one physical core.
const CORE_CPUS_FILES: [&str; 2] = ["topology/core_cpus_list", "topology/thread_siblings_list"];
const MAX_FREQUENCY_FILES: [&str; 2] = ["cpufreq/cpuinfo_max_freq", "cpufreq/base_frequency"];

#[derive(Debug, Clone)]
pub struct NativePlatform {
    sysfs_root: PathBuf,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::with_sysfs_root(SYSFS_CPU_ROOT)
    }

    pub fn with_sysfs_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            sysfs_root: root.as_ref().to_path_buf(),
        }
    }

    fn read_first_of(dir: &Path, candidates: &[&str]) -> Result<(PathBuf, String), ProbeError> {
        let mut last_error = None;
        for candidate in candidates {
            let path = dir.join(candidate);
            match std::fs::read_to_string(&path) {
                Ok(content) => return Ok((path, content)),
                Err(e) => last_error = Some(ProbeError::io(path, e)),
            }
        }

        Err(last_error.unwrap_or_else(|| ProbeError::parse(dir, "no candidate files")))
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreRelationships for NativePlatform {
    fn logical_processors(&self) -> Result<Vec<usize>, ProbeError> {
        let entries = std::fs::read_dir(&self.sysfs_root)
            .map_err(|e| ProbeError::io(&self.sysfs_root, e))?;

        let mut cores = BTreeSet::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(
                        "CpuProbe::Platform",
                        "Could not read entry in '{}': {}",
                        self.sysfs_root.display(),
                        e
                    );
                    continue;
                }
            };

            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !is_cpu_dir_name(&file_name) {
                continue;
            }

            // Offline processors have no topology directory
            let (path, content) = match Self::read_first_of(&entry.path(), &CORE_CPUS_FILES) {
                Ok(found) => found,
                Err(e) => {
                    debug!("CpuProbe::Platform", "Skipping '{}': {}", file_name, e);
                    continue;
                }
            };

            let core = parse_cpu_list(&content)
                .ok_or_else(|| ProbeError::parse(&path, format!("bad cpu list {:?}", content)))?;
            cores.insert(core);
        }

        if cores.is_empty() {
            return Err(ProbeError::parse(
                &self.sysfs_root,
                "no processor topology found",
            ));
        }

        Ok(online_processors(cores.iter().map(|c| c.as_slice())))
    }
}

impl AffinityControl for NativePlatform {
    type Mask = CpuSet;

    fn current_affinity(&self) -> Result<CpuSet, ProbeError> {
        sched_getaffinity(Pid::from_raw(0)).map_err(|e| ProbeError::AffinityQuery(e.into()))
    }

    fn set_affinity(&self, mask: &CpuSet) -> Result<(), ProbeError> {
        sched_setaffinity(Pid::from_raw(0), mask).map_err(|e| ProbeError::AffinityQuery(e.into()))
    }

    fn single_processor(&self, cpu: usize) -> Result<CpuSet, ProbeError> {
        let mut set = CpuSet::new();
        set.set(cpu).map_err(|e| ProbeError::Affinity {
            cpu,
            source: e.into(),
        })?;
        Ok(set)
    }

    fn running_processor(&self) -> Option<usize> {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            None
        } else {
            Some(cpu as usize)
        }
    }
}

impl NominalClockSource for NativePlatform {
    fn max_clock_speed_mhz(&self) -> Result<u32, ProbeError> {
        let (path, content) =
            Self::read_first_of(&self.sysfs_root.join("cpu0"), &MAX_FREQUENCY_FILES)?;

        let khz = content
            .trim()
            .parse::<u64>()
            .map_err(|e| ProbeError::parse(&path, e.to_string()))?;
        let mhz = (khz + 500) / 1000;
        if mhz == 0 || mhz > u32::MAX as u64 {
            return Err(ProbeError::parse(&path, format!("implausible clock {} kHz", khz)));
        }

        Ok(mhz as u32)
    }
}

fn is_cpu_dir_name(name: &str) -> bool {
    name.strip_prefix("cpu")
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Parses the kernel's cpu list format, e.g. `0-3,8,10-11`.
pub fn parse_cpu_list(text: &str) -> Option<Vec<usize>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let mut result = vec![];
    for range in text.split(',') {
        match range.split_once('-') {
            Some((first, last)) => {
                let first = first.trim().parse::<usize>().ok()?;
                let last = last.trim().parse::<usize>().ok()?;
                if last < first {
                    return None;
                }
                result.extend(first..=last);
            }
            None => result.push(range.trim().parse().ok()?),
        }
    }

    result.sort_unstable();
    result.dedup();
    Some(result)
}

/// Union of the processor sets of every physical core, ascending.
pub fn online_processors<'a>(cores: impl Iterator<Item = &'a [usize]>) -> Vec<usize> {
    cores
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(name: &str) -> Self {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            let path = std::env::temp_dir().join(format!(
                "cpuid-topology-probe-{}-{}-{}",
                name,
                std::process::id(),
                nanos
            ));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn write(&self, relative: &str, content: &str) {
            let path = self.0.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn parses_cpu_lists() {
        assert_eq!(parse_cpu_list("0-3,8,10-11\n"), Some(vec![0, 1, 2, 3, 8, 10, 11]));
        assert_eq!(parse_cpu_list("5"), Some(vec![5]));
        assert_eq!(parse_cpu_list("1,0,1"), Some(vec![0, 1]));
        assert_eq!(parse_cpu_list(""), None);
        assert_eq!(parse_cpu_list("3-1"), None);
        assert_eq!(parse_cpu_list("a-b"), None);
    }

    #[test]
    fn cpu_dir_names() {
        assert!(is_cpu_dir_name("cpu0"));
        assert!(is_cpu_dir_name("cpu127"));
        assert!(!is_cpu_dir_name("cpu"));
        assert!(!is_cpu_dir_name("cpufreq"));
        assert!(!is_cpu_dir_name("cpuidle"));
    }

    #[test]
    fn lists_each_processor_once() {
        let scratch = ScratchDir::new("count");
        // Two SMT cores and one single-threaded core; siblings repeat the same list
        scratch.write("cpu0/topology/core_cpus_list", "0-1\n");
        scratch.write("cpu1/topology/core_cpus_list", "0-1\n");
        scratch.write("cpu2/topology/thread_siblings_list", "2,3\n");
        scratch.write("cpu3/topology/thread_siblings_list", "2-3\n");
        scratch.write("cpu4/topology/core_cpus_list", "4\n");
        // Offline processor without topology
        std::fs::create_dir_all(scratch.0.join("cpu5")).unwrap();
        std::fs::create_dir_all(scratch.0.join("cpufreq")).unwrap();

        let platform = NativePlatform::with_sysfs_root(&scratch.0);
        assert_eq!(platform.logical_processors().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn offline_processor_leaves_a_gap() {
        let scratch = ScratchDir::new("gap");
        scratch.write("cpu0/topology/core_cpus_list", "0\n");
        scratch.write("cpu2/topology/core_cpus_list", "2-3\n");
        scratch.write("cpu3/topology/core_cpus_list", "2-3\n");
        std::fs::create_dir_all(scratch.0.join("cpu1")).unwrap();

        let platform = NativePlatform::with_sysfs_root(&scratch.0);
        let processors = platform.logical_processors().unwrap();
        dbg!(&processors);
        assert_eq!(processors, vec![0, 2, 3]);
    }

    #[test]
    fn overlapping_core_sets_are_merged() {
        assert_eq!(
            online_processors([&[0, 4][..], &[1, 5], &[4, 0], &[7]].into_iter()),
            vec![0, 1, 4, 5, 7]
        );
        assert!(online_processors(std::iter::empty()).is_empty());
    }

    #[test]
    fn empty_tree_is_an_error() {
        let scratch = ScratchDir::new("empty");
        let platform = NativePlatform::with_sysfs_root(&scratch.0);
        assert!(platform.logical_processors().is_err());

        let missing = NativePlatform::with_sysfs_root(scratch.0.join("does-not-exist"));
        assert!(missing.logical_processors().is_err());
    }

    #[test]
    fn nominal_clock_from_cpufreq() {
        let scratch = ScratchDir::new("cpufreq");
        scratch.write("cpu0/cpufreq/base_frequency", "3600000\n");

        let platform = NativePlatform::with_sysfs_root(&scratch.0);
        assert_eq!(platform.max_clock_speed_mhz().unwrap(), 3600);

        scratch.write("cpu0/cpufreq/cpuinfo_max_freq", "4999600\n");
        assert_eq!(platform.max_clock_speed_mhz().unwrap(), 5000);

        scratch.write("cpu0/cpufreq/cpuinfo_max_freq", "garbage\n");
        assert!(platform.max_clock_speed_mhz().is_err());
    }

    #[test]
    fn live_affinity_round_trip() {
        let platform = NativePlatform::new();
        let before = match platform.current_affinity() {
            Ok(before) => before,
            Err(e) => {
                dbg!(e);
                return;
            }
        };

        platform.set_affinity(&before).unwrap();
        assert_eq!(platform.current_affinity().unwrap(), before);
        dbg!(platform.running_processor());
        dbg!(platform.logical_processors().ok());
    }
}
