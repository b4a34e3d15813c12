/* error.rs
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

use std::path::PathBuf;

/// Failures reported by the OS collaborators.
///
/// Components never propagate these to their callers; they log them and fall back to an
/// empty or zeroed result.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data in '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("could not pin the calling thread to logical processor {cpu}: {source}")]
    Affinity {
        cpu: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("could not query or restore the calling thread's affinity: {0}")]
    AffinityQuery(#[source] std::io::Error),
    #[error("{0} is not supported on this platform")]
    #[cfg_attr(target_os = "linux", allow(dead_code))]
    Unsupported(&'static str),
}

impl ProbeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
