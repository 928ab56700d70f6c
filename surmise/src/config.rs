//! Configuration types for controlling a property run.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{ErrorInfo, StoreError};
use crate::store::{DirectoryStore, ExampleStore};

/// Directory used when a store is enabled without an explicit path
pub const DEFAULT_STORE_DIR: &str = ".surmise/examples";

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `max_examples` must be > 0
    #[error("invalid max_examples: {0} (must be > 0)")]
    InvalidMaxExamples(usize),
    /// `max_rejections` must be > 0
    #[error("invalid max_rejections: {0} (must be > 0)")]
    InvalidMaxRejections(usize),
    /// `max_choices` must be > 0
    #[error("invalid max_choices: {0} (must be > 0)")]
    InvalidMaxChoices(usize),
    /// `target_ratio` must lie in `[0, 1)`
    #[error("invalid target_ratio: {0} (must be in [0, 1))")]
    InvalidTargetRatio(f64),
    /// An environment override could not be parsed
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Orders two errors of the same kind; `Ordering::Greater` vetoes replacing
/// the incumbent (second argument) with the candidate (first argument)
pub type ErrorComparator = Arc<dyn Fn(&ErrorInfo, &ErrorInfo) -> Ordering + Send + Sync>;

/// Where minimal examples are persisted between runs
#[derive(Clone, Default)]
pub enum StoreSetting {
    /// No persistence
    #[default]
    Disabled,
    /// JSON files under a directory
    Directory(PathBuf),
    /// A caller-provided backend
    Custom(Arc<dyn ExampleStore>),
}

impl fmt::Debug for StoreSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreSetting::Disabled => write!(f, "Disabled"),
            StoreSetting::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            StoreSetting::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Configuration for a single property run
#[derive(Clone)]
pub struct Config {
    /// Valid attempts to run before declaring a pass
    pub max_examples: usize,
    /// Consecutive invalid attempts tolerated before giving up
    pub max_rejections: usize,
    /// Cap on the length of any choice sequence
    pub max_choices: usize,
    /// Replay budget for the shrinker
    pub max_shrinks: usize,
    /// Master seed; `None` picks one from entropy
    pub seed: Option<u64>,
    /// Example persistence
    pub store: StoreSetting,
    /// The property is expected to fail
    pub broken: bool,
    /// Worker threads for exploration batches (0 = one per CPU)
    pub workers: usize,
    /// Chance that an exploration slot mutates the best-scoring sequence
    pub target_ratio: f64,
    /// Backtrace lines kept on captured errors
    pub max_trace_lines: usize,
    comparators: HashMap<String, ErrorComparator>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_examples: 100,
            max_rejections: 1000,
            max_choices: 10_000,
            max_shrinks: 5_000,
            seed: None,
            store: StoreSetting::Disabled,
            broken: false,
            workers: 1,
            target_ratio: 0.5,
            max_trace_lines: 16,
            comparators: HashMap::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.comparators.keys().collect();
        kinds.sort();
        f.debug_struct("Config")
            .field("max_examples", &self.max_examples)
            .field("max_rejections", &self.max_rejections)
            .field("max_choices", &self.max_choices)
            .field("max_shrinks", &self.max_shrinks)
            .field("seed", &self.seed)
            .field("store", &self.store)
            .field("broken", &self.broken)
            .field("workers", &self.workers)
            .field("target_ratio", &self.target_ratio)
            .field("max_trace_lines", &self.max_trace_lines)
            .field("comparators", &kinds)
            .finish()
    }
}

impl Config {
    /// Configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_examples(mut self, n: usize) -> Self {
        self.max_examples = n;
        self
    }

    pub fn max_rejections(mut self, n: usize) -> Self {
        self.max_rejections = n;
        self
    }

    pub fn max_choices(mut self, n: usize) -> Self {
        self.max_choices = n;
        self
    }

    pub fn max_shrinks(mut self, n: usize) -> Self {
        self.max_shrinks = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Persist examples as JSON files under `dir`
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store = StoreSetting::Directory(dir.into());
        self
    }

    /// Persist examples in a custom backend
    pub fn store(mut self, store: Arc<dyn ExampleStore>) -> Self {
        self.store = StoreSetting::Custom(store);
        self
    }

    pub fn no_store(mut self) -> Self {
        self.store = StoreSetting::Disabled;
        self
    }

    /// Mark the property as expected to fail
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn target_ratio(mut self, ratio: f64) -> Self {
        self.target_ratio = ratio;
        self
    }

    pub fn max_trace_lines(mut self, n: usize) -> Self {
        self.max_trace_lines = n;
        self
    }

    /// Register a comparator for errors whose kind is the type name of `E`
    pub fn prefer_errors<E: 'static>(
        self,
        comparator: impl Fn(&ErrorInfo, &ErrorInfo) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.prefer_error_kind(std::any::type_name::<E>(), comparator)
    }

    /// Register a comparator for errors of an explicit kind (e.g. `panic at src/lib.rs:10`)
    pub fn prefer_error_kind(
        mut self,
        kind: impl Into<String>,
        comparator: impl Fn(&ErrorInfo, &ErrorInfo) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparators.insert(kind.into(), Arc::new(comparator));
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_examples == 0 {
            return Err(ConfigError::InvalidMaxExamples(self.max_examples));
        }
        if self.max_rejections == 0 {
            return Err(ConfigError::InvalidMaxRejections(self.max_rejections));
        }
        if self.max_choices == 0 {
            return Err(ConfigError::InvalidMaxChoices(self.max_choices));
        }
        if !(0.0..1.0).contains(&self.target_ratio) {
            return Err(ConfigError::InvalidTargetRatio(self.target_ratio));
        }
        Ok(())
    }

    /// Overlay `SURMISE_SEED`, `SURMISE_MAX_EXAMPLES` and `SURMISE_STORE_DIR`
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|var| std::env::var(var).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("SURMISE_SEED") {
            let seed = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "SURMISE_SEED",
                value: value.clone(),
            })?;
            self.seed = Some(seed);
        }
        if let Some(value) = lookup("SURMISE_MAX_EXAMPLES") {
            let n = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "SURMISE_MAX_EXAMPLES",
                value: value.clone(),
            })?;
            self.max_examples = n;
        }
        if let Some(value) = lookup("SURMISE_STORE_DIR") {
            self.store = match value.trim() {
                "" | "off" | "none" => StoreSetting::Disabled,
                dir => StoreSetting::Directory(PathBuf::from(dir)),
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Number of exploration workers after resolving `0`
    pub fn resolved_workers(&self) -> usize {
        match self.workers {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    pub(crate) fn comparator(&self, kind: &str) -> Option<&ErrorComparator> {
        self.comparators.get(kind)
    }

    /// Open the configured store, if any
    pub(crate) fn open_store(&self) -> Result<Option<Arc<dyn ExampleStore>>, StoreError> {
        match &self.store {
            StoreSetting::Disabled => Ok(None),
            StoreSetting::Directory(dir) => Ok(Some(Arc::new(DirectoryStore::open(dir)?))),
            StoreSetting::Custom(store) => Ok(Some(Arc::clone(store))),
        }
    }
}

thread_local! {
    /// Per-thread default used by [`Property::new`](crate::Property::new)
    static DEFAULT_CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// The default configuration used by properties built on this thread
pub fn default_config() -> Config {
    DEFAULT_CONFIG.with(|config| config.borrow().clone())
}

/// Replace the default configuration for this thread
pub fn set_default_config(config: Config) -> Result<(), ConfigError> {
    config.validate()?;
    DEFAULT_CONFIG.with(|current| *current.borrow_mut() = config);
    Ok(())
}

/// Run `f` with `config` as the default, restoring the previous default afterwards
pub fn with_default_config<R>(config: Config, f: impl FnOnce() -> R) -> Result<R, ConfigError> {
    struct Restore(Option<Config>);

    impl Drop for Restore {
        fn drop(&mut self) {
            if let Some(previous) = self.0.take() {
                DEFAULT_CONFIG.with(|current| *current.borrow_mut() = previous);
            }
        }
    }

    config.validate()?;
    let previous = DEFAULT_CONFIG.with(|current| current.replace(config));
    let _restore = Restore(Some(previous));
    Ok(f())
}
