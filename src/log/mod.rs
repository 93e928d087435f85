//! Runtime-configurable diagnostics.
//!
//! Rollouts log through the `log` macros re-exported here. The volume grows with the level:
//! `info!` once per orchestration run, `debug!` once per rollout and for each generated
//! mobility trace, `trace!` for every processed event and random stream. Diagnostics are
//! separate from the results of a run, which live in the `Summary` and the `report` CSVs.
//!
//! Nothing is printed until a level is chosen:
//!
//! ```rust
//! use episim::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! set_log_level(LevelFilter::Debug);
//! // One line per event is too much for a full run.
//! set_module_filter("episim::rollout", LevelFilter::Info);
//! ```
//!
//! A module filter overrides the global level for every module below its path. With the
//! `logging` feature disabled the same functions only adjust `log::max_level()`.
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

pub use log::{debug, error, info, trace, warn, LevelFilter};
#[cfg(feature = "logging")]
use log4rs::Handle;

static LOG_FILTERS: LazyLock<Mutex<LogFilters>> = LazyLock::new(Mutex::default);

/// The installed filters. There is one global logger, so there is one `LogFilters`,
/// reached through `filters()`.
#[derive(Debug)]
pub(in crate::log) struct LogFilters {
    pub(in crate::log) global: LevelFilter,
    /// Ordered by module path so rebuilding the logger is reproducible.
    pub(in crate::log) modules: BTreeMap<String, LevelFilter>,

    #[cfg(feature = "logging")]
    handle: Option<Handle>,
}

impl Default for LogFilters {
    fn default() -> Self {
        Self {
            global: LevelFilter::Off,
            modules: BTreeMap::new(),

            #[cfg(feature = "logging")]
            handle: None,
        }
    }
}

impl LogFilters {
    fn update(&mut self, changed: bool) {
        if changed {
            self.install();
        }
    }

    fn set_global(&mut self, level: LevelFilter) {
        // The first call installs the logger even if the level is unchanged.
        let changed = self.global != level || !self.installed();
        self.global = level;
        self.update(changed);
    }

    fn set_modules<'a>(&mut self, filters: impl IntoIterator<Item = (&'a str, LevelFilter)>) {
        let mut changed = false;
        for (module, level) in filters {
            changed |= self.modules.insert(module.to_string(), level) != Some(level);
        }
        self.update(changed);
    }

    fn remove_module(&mut self, module: &str) {
        let changed = self.modules.remove(module).is_some();
        self.update(changed);
    }
}

/// Emits every message. Same as `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Same as `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Emits messages at `level` or more severe from modules without their own filter.
pub fn set_log_level(level: LevelFilter) {
    filters().set_global(level);
}

pub fn set_module_filter(module_path: &str, level: LevelFilter) {
    filters().set_modules([(module_path, level)]);
}

/// Installs several module filters while rebuilding the logger once.
pub fn set_module_filters(module_filters: &[(&str, LevelFilter)]) {
    filters().set_modules(module_filters.iter().copied());
}

/// The module falls back to the global level.
pub fn remove_module_filter(module_path: &str) {
    filters().remove_module(module_path);
}

fn filters() -> MutexGuard<'static, LogFilters> {
    // The filters are plain values, so a poisoned lock still holds a usable state.
    LOG_FILTERS.lock().unwrap_or_else(PoisonError::into_inner)
}
