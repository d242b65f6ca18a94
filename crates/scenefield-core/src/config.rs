#![forbid(unsafe_code)]

//! Graph-wide configuration.
//!
//! The active [`GraphConfig`] is thread-local, like the graph itself. Fields
//! read it when they are created (access checking) and passes read it when
//! they start (route events, tracing).
//!
//! Sources, in the order an application usually layers them:
//!
//! 1. [`GraphConfig::default`]
//! 2. A TOML document, with the `config-file` feature
//! 3. Environment variables via [`GraphConfig::from_env`]
//!
//! | variable                       | field               |
//! |--------------------------------|---------------------|
//! | `SCENEFIELD_ACCESS_CHECKS`     | `access_checks`     |
//! | `SCENEFIELD_ROUTE_EVENTS`      | `route_events`      |
//! | `SCENEFIELD_TRACE_PROPAGATION` | `trace_propagation` |

use std::cell::Cell;
use std::env;

use crate::error::ConfigError;
use crate::tick::Period;

thread_local! {
    static CURRENT: Cell<GraphConfig> = Cell::new(GraphConfig::default());
}

const ENV_ACCESS_CHECKS: &str = "SCENEFIELD_ACCESS_CHECKS";
const ENV_ROUTE_EVENTS: &str = "SCENEFIELD_ROUTE_EVENTS";
const ENV_TRACE_PROPAGATION: &str = "SCENEFIELD_TRACE_PROPAGATION";

/// Behaviour switches for the field graph on this thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// New fields enforce their access policy.
    pub access_checks: bool,
    /// `route` sends an event into the new destination.
    pub route_events: bool,
    /// Log every delivered event at `trace` level.
    pub trace_propagation: bool,
    /// Default update period for fields registered with an event sink.
    pub realtime_period: Period,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            access_checks: true,
            route_events: true,
            trace_propagation: false,
            realtime_period: Period::EveryTick,
        }
    }
}

impl GraphConfig {
    /// The configuration active on this thread.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Cell::get)
    }

    /// Make this the active configuration, returning the previous one.
    pub fn install(self) -> Self {
        CURRENT.with(|c| c.replace(self))
    }

    /// Install for the lifetime of the returned guard.
    pub fn scoped(self) -> ConfigGuard {
        ConfigGuard {
            previous: self.install(),
        }
    }

    /// Defaults overridden by `SCENEFIELD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let flag = |name: &str, current: bool| -> Result<bool, ConfigError> {
            match lookup(name) {
                Some(value) => parse_flag(name, &value),
                None => Ok(current),
            }
        };
        self.access_checks = flag(ENV_ACCESS_CHECKS, self.access_checks)?;
        self.route_events = flag(ENV_ROUTE_EVENTS, self.route_events)?;
        self.trace_propagation = flag(ENV_TRACE_PROPAGATION, self.trace_propagation)?;
        Ok(self)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    ///
    /// ```toml
    /// access_checks = true
    /// route_events = false
    /// realtime_period = { count = 2 }   # or "every-tick", or { millis = 16 }
    /// ```
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let doc: file::ConfigDoc =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(doc.into())
    }
}

fn parse_flag(variable: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            variable: variable.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Restores the previous configuration on drop.
#[must_use = "dropping the guard restores the previous configuration"]
#[derive(Debug)]
pub struct ConfigGuard {
    previous: GraphConfig,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        self.previous.install();
    }
}

#[cfg(feature = "config-file")]
mod file {
    use std::time::Duration;

    use serde::Deserialize;

    use super::GraphConfig;
    use crate::tick::Period;

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub(super) enum PeriodDoc {
        #[default]
        EveryTick,
        Count(u32),
        Millis(u64),
    }

    #[derive(Debug, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    pub(super) struct ConfigDoc {
        access_checks: bool,
        route_events: bool,
        trace_propagation: bool,
        realtime_period: PeriodDoc,
    }

    impl Default for ConfigDoc {
        fn default() -> Self {
            let base = GraphConfig::default();
            Self {
                access_checks: base.access_checks,
                route_events: base.route_events,
                trace_propagation: base.trace_propagation,
                realtime_period: PeriodDoc::EveryTick,
            }
        }
    }

    impl From<ConfigDoc> for GraphConfig {
        fn from(doc: ConfigDoc) -> Self {
            Self {
                access_checks: doc.access_checks,
                route_events: doc.route_events,
                trace_propagation: doc.trace_propagation,
                realtime_period: match doc.realtime_period {
                    PeriodDoc::EveryTick => Period::EveryTick,
                    PeriodDoc::Count(n) => Period::Count(n),
                    PeriodDoc::Millis(ms) => Period::Time(Duration::from_millis(ms)),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = GraphConfig::default();
        assert!(cfg.access_checks);
        assert!(cfg.route_events);
        assert!(!cfg.trace_propagation);
        assert_eq!(cfg.realtime_period, Period::EveryTick);
    }

    #[test]
    fn overrides_from_lookup() {
        let cfg = GraphConfig::default()
            .with_overrides(|name| (name == ENV_ROUTE_EVENTS).then(|| "off".to_string()))
            .unwrap();
        assert!(!cfg.route_events);
        assert!(cfg.access_checks);
    }

    #[test]
    fn bad_flag_is_an_error() {
        let err = GraphConfig::default()
            .with_overrides(|_| Some("maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { .. }));
    }

    #[test]
    fn scoped_install_restores() {
        let before = GraphConfig::current();
        {
            let _guard = GraphConfig {
                access_checks: false,
                ..before
            }
            .scoped();
            assert!(!GraphConfig::current().access_checks);
        }
        assert_eq!(GraphConfig::current(), before);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_document() {
        let cfg = GraphConfig::from_toml_str(
            "route_events = false\nrealtime_period = { count = 3 }\n",
        )
        .unwrap();
        assert!(!cfg.route_events);
        assert!(cfg.access_checks);
        assert_eq!(cfg.realtime_period, Period::Count(3));
        assert!(GraphConfig::from_toml_str("bogus = 1").is_err());
    }
}
