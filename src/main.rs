/* main.rs
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

use config::ProbeConfig;
use cpuid::NativeCpuid;

mod cache;
mod config;
mod cpuid;
mod error;
mod frequency;
mod logging;
mod platform;
mod probe;
mod report;
mod sharing;
mod topology;
mod turbo;

fn main() {
    let platform = platform::native();
    let report = probe::discover(&NativeCpuid, &platform, &ProbeConfig::default());

    println!("{}", report.to_json());
}
