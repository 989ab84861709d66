//! Process-wide configuration: the `serialize_execution` flag and the
//! default thread-pool size.
//!
//! A small layered configuration surface reduced to the handful of knobs
//! this engine actually has: a full profile-aware configuration system
//! would be scope creep for what is, functionally, two values.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Values contributed by an optional TOML file layer, underneath the
/// environment-variable layer.
#[derive(Default)]
struct FileLayer {
    serialize_execution: Option<bool>,
    default_pool_size: Option<usize>,
}

#[cfg(feature = "config_toml")]
mod file_layer {
    use super::FileLayer;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct RawFileLayer {
        serialize_execution: Option<bool>,
        default_pool_size: Option<usize>,
    }

    /// Loads the optional lowest-priority configuration layer from a TOML
    /// file.
    pub(super) fn load(path: &str) -> Result<FileLayer, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let raw: RawFileLayer = toml::from_str(&contents)?;
        Ok(FileLayer {
            serialize_execution: raw.serialize_execution,
            default_pool_size: raw.default_pool_size,
        })
    }
}

/// Process-wide scheduler configuration.
///
/// A single instance lives behind [`Configuration::global`]; there is
/// intentionally no per-engine configuration object, mirroring the base
/// spec's description of `serializeExecution` as "process-wide mutable
/// configuration."
pub struct Configuration {
    serialize_execution: AtomicBool,
    default_pool_size: AtomicUsize,
}

static GLOBAL: OnceLock<Configuration> = OnceLock::new();

impl Configuration {
    /// Returns the process-wide configuration, initializing it from the
    /// environment on first access.
    pub fn global() -> &'static Configuration {
        GLOBAL.get_or_init(Configuration::from_env)
    }

    fn from_env() -> Self {
        #[cfg(feature = "config_toml")]
        let file_layer = std::env::var("TUBELINE_CONFIG_FILE")
            .ok()
            .and_then(|path| match file_layer::load(&path) {
                Ok(layer) => Some(layer),
                Err(error) => {
                    tracing::warn!(path, %error, "tubeline.configuration.file_layer_ignored");
                    None
                }
            })
            .unwrap_or_default();
        #[cfg(not(feature = "config_toml"))]
        let file_layer = FileLayer::default();

        let serialize_execution = std::env::var("TUBELINE_SERIALIZE_EXECUTION")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .ok()
            .or(file_layer.serialize_execution)
            .unwrap_or(false);
        let default_pool_size = std::env::var("TUBELINE_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .or(file_layer.default_pool_size)
            .unwrap_or_else(num_cpus::get);
        Self {
            serialize_execution: AtomicBool::new(serialize_execution),
            default_pool_size: AtomicUsize::new(default_pool_size),
        }
    }

    /// Whether driving passes across all fibers of the process should be
    /// forced serial. Read once per driving pass.
    pub fn serialize_execution(&self) -> bool {
        self.serialize_execution.load(Ordering::Acquire)
    }

    /// Enables or disables the global serialization flag at runtime.
    pub fn set_serialize_execution(&self, enabled: bool) {
        self.serialize_execution.store(enabled, Ordering::Release);
    }

    /// The worker count `Engine` uses for its lazily created default pool.
    pub fn default_pool_size(&self) -> usize {
        self.default_pool_size.load(Ordering::Acquire)
    }

    pub fn set_default_pool_size(&self, size: usize) {
        self.default_pool_size
            .store(size.max(1), Ordering::Release);
    }
}

/// A process-wide lock used to serialize driving passes when
/// [`Configuration::serialize_execution`] is enabled.
///
/// Grounded on the base spec's `serializeExecution` note (§5): "each call
/// into `doRun` acquires this lock for its whole duration."
pub(crate) fn serialization_lock() -> &'static parking_lot::Mutex<()> {
    static LOCK: OnceLock<parking_lot::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| parking_lot::Mutex::new(()))
}
