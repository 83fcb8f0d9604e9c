//! Engine detection.

use std::fmt;

/// Environment variable used to select an engine explicitly.
pub const ENGINE_ENV: &str = "UNISERVE_ENGINE";

/// The closed set of server engines this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    /// axum router served through `axum-server`.
    Axum,
    /// Raw hyper connections with streaming request bodies.
    Hyper,
    /// Hyper HTTP/1 connections bridged through push-style body events.
    Evented,
    /// Nothing usable was found.
    Unknown,
}

impl Runtime {
    /// Detect the active engine.
    ///
    /// Reads [`ENGINE_ENV`]; when unset, empty or `auto`, the first engine
    /// compiled into this build wins.
    pub fn detect() -> Self {
        let requested = std::env::var(ENGINE_ENV).ok();
        Self::resolve(requested.as_deref())
    }

    /// Resolve an optional engine name against the engines compiled in.
    pub fn resolve(requested: Option<&str>) -> Self {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());
        match requested {
            None => Self::available().first().copied().unwrap_or(Runtime::Unknown),
            Some(name) if name.eq_ignore_ascii_case("auto") => {
                Self::available().first().copied().unwrap_or(Runtime::Unknown)
            }
            Some(name) => {
                let runtime = Self::from_name(name);
                if Self::available().contains(&runtime) {
                    runtime
                } else {
                    Runtime::Unknown
                }
            }
        }
    }

    /// Parse an engine name. Unrecognized names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "axum" => Runtime::Axum,
            "hyper" => Runtime::Hyper,
            "evented" => Runtime::Evented,
            _ => Runtime::Unknown,
        }
    }

    /// Engines compiled into this build, in priority order.
    pub fn available() -> &'static [Runtime] {
        const ENGINES: &[Runtime] = &[
            #[cfg(feature = "engine-axum")]
            Runtime::Axum,
            #[cfg(feature = "engine-hyper")]
            Runtime::Hyper,
            #[cfg(feature = "engine-evented")]
            Runtime::Evented,
        ];
        ENGINES
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Axum => "axum",
            Runtime::Hyper => "hyper",
            Runtime::Evented => "evented",
            Runtime::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_picks_first_available() {
        assert_eq!(Runtime::resolve(None), Runtime::available()[0]);
        assert_eq!(Runtime::resolve(Some("")), Runtime::available()[0]);
        assert_eq!(Runtime::resolve(Some("AUTO")), Runtime::available()[0]);
    }

    #[test]
    fn explicit_names_are_case_insensitive() {
        assert_eq!(Runtime::resolve(Some("Hyper")), Runtime::Hyper);
        assert_eq!(Runtime::resolve(Some(" evented ")), Runtime::Evented);
        assert_eq!(Runtime::resolve(Some("axum")), Runtime::Axum);
    }

    #[test]
    fn unrecognized_engine_is_unknown() {
        assert_eq!(Runtime::resolve(Some("node")), Runtime::Unknown);
        assert_eq!(Runtime::from_name("deno"), Runtime::Unknown);
    }

    #[test]
    fn names_round_trip() {
        for runtime in Runtime::available() {
            assert_eq!(Runtime::from_name(runtime.as_str()), *runtime);
        }
    }
}
