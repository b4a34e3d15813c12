/* logging.rs
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

use lazy_static::lazy_static;

// Standard output carries the JSON report, every level goes to standard error.

#[allow(unused)]
macro_rules! error {
    ($domain:literal, $($arg:tt)*) => {{
        $crate::logging::Logger::log($crate::logging::LogLevel::Error, $domain, format_args!($($arg)*));
    }}
}
#[allow(unused_imports)]
pub(crate) use error;

#[allow(unused)]
macro_rules! critical {
    ($domain:literal, $($arg:tt)*) => {{
        $crate::logging::Logger::log($crate::logging::LogLevel::Critical, $domain, format_args!($($arg)*));
    }}
}
pub(crate) use critical;

#[allow(unused)]
macro_rules! warning {
    ($domain:literal, $($arg:tt)*) => {{
        $crate::logging::Logger::log($crate::logging::LogLevel::Warning, $domain, format_args!($($arg)*));
    }}
}
pub(crate) use warning;

#[allow(unused)]
macro_rules! message {
    ($domain:literal, $($arg:tt)*) => {{
        $crate::logging::Logger::log($crate::logging::LogLevel::Message, $domain, format_args!($($arg)*));
    }}
}
#[allow(unused_imports)]
pub(crate) use message;

#[allow(unused)]
macro_rules! info {
    ($domain:literal, $($arg:tt)*) => {{
        $crate::logging::Logger::log($crate::logging::LogLevel::Info, $domain, format_args!($($arg)*));
    }}
}
pub(crate) use info;

#[allow(unused)]
macro_rules! debug {
    ($domain:literal, $($arg:tt)*) => {{
        $crate::logging::Logger::log($crate::logging::LogLevel::Debug, $domain, format_args!($($arg)*));
    }}
}
pub(crate) use debug;

macro_rules! now {
    () => {
        unsafe {
            let now = libc::time(std::ptr::null_mut());
            if now == -1 {
                std::mem::zeroed()
            } else {
                let tm = libc::localtime(&now);
                if tm.is_null() {
                    std::mem::zeroed()
                } else {
                    *tm
                }
            }
        }
    };
}

lazy_static! {
    static ref PID: u32 = unsafe { libc::getpid() } as _;
    static ref G_MESSAGES_DEBUG: Vec<std::sync::Arc<str>> = std::env::var("G_MESSAGES_DEBUG")
        .unwrap_or_default()
        .split(';')
        .filter(|s| !s.is_empty())
        .map(std::sync::Arc::<str>::from)
        .collect();
}

const F_COL_LIGHT_BLUE: &str = "\x1b[2;34m";
const F_RESET: &str = "\x1b[0m";

#[allow(dead_code)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Critical,
    Warning,
    Message,
    Info,
    Debug,
}

pub struct Logger;

impl Logger {
    pub fn log(level: LogLevel, domain: &str, args: std::fmt::Arguments<'_>) {
        if !Self::is_enabled(level, domain) {
            return;
        }

        let now: libc::tm = now!();
        eprintln!(
            "{}(cpuid-topology-probe:{}): {}-{}{}{}{}: {}{:02}:{:02}:{:02}.000{}: {}",
            if Self::is_severe(level) { "\n" } else { "" },
            *PID,
            domain,
            Self::log_level_to_color(level),
            Self::log_level_to_str(level),
            F_RESET,
            if Self::is_severe(level) { " **" } else { "" },
            F_COL_LIGHT_BLUE,
            now.tm_hour,
            now.tm_min,
            now.tm_sec,
            F_RESET,
            args
        );
    }

    fn is_enabled(level: LogLevel, domain: &str) -> bool {
        match level {
            LogLevel::Info | LogLevel::Debug => {
                G_MESSAGES_DEBUG.iter().any(|d| d.as_ref() == "all")
                    || G_MESSAGES_DEBUG.iter().any(|d| d.as_ref() == domain)
            }
            _ => true,
        }
    }

    const fn is_severe(level: LogLevel) -> bool {
        matches!(
            level,
            LogLevel::Error | LogLevel::Critical | LogLevel::Warning
        )
    }

    const fn log_level_to_str(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Warning => "WARNING",
            LogLevel::Message => "MESSAGE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    const fn log_level_to_color(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Error => "\x1b[1;31m",    /* red */
            LogLevel::Critical => "\x1b[1;35m", /* magenta */
            LogLevel::Warning => "\x1b[1;33m",  /* yellow */
            LogLevel::Message => "\x1b[1;32m",  /* green */
            LogLevel::Info => "\x1b[1;32m",     /* green */
            LogLevel::Debug => "\x1b[1;32m",    /* green */
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severe_levels_are_always_enabled() {
        for level in [LogLevel::Error, LogLevel::Critical, LogLevel::Warning] {
            assert!(Logger::is_severe(level));
            assert!(Logger::is_enabled(level, "CpuProbe::Test"));
        }
        assert!(!Logger::is_severe(LogLevel::Message));
        assert!(Logger::is_enabled(LogLevel::Message, "CpuProbe::Test"));
    }

    #[test]
    fn every_level_has_a_label() {
        assert_eq!(Logger::log_level_to_str(LogLevel::Error), "ERROR");
        assert_eq!(Logger::log_level_to_str(LogLevel::Message), "MESSAGE");

        error!("CpuProbe::Test", "error level {}", 1);
        message!("CpuProbe::Test", "message level {}", 2);
    }
}
