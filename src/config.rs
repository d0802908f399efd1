//! Engine-wide configuration (ambient stack: every knob the rest of the
//! engine needs that the spec leaves as a constant or a CLI flag lives
//! here, grounded on the teacher's `init.rs`/`sys.rs` style of bundling
//! storage parameters into one struct threaded through the database).

use std::path::PathBuf;

use crate::kernel_cache::DEFAULT_CAPACITY;
use crate::schema::DEFAULT_PAGE_SIZE;

/// Default cap on rows a single SELECT's output buffer holds (spec section
/// 4.7 point 2: "allocate output buffer sized to the worst case or a
/// configurable cap").
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory holding `tables/`, `kernels/`, and `compiled/` (spec
    /// section 6).
    pub base_dir: PathBuf,
    /// Default `page_size` for newly created tables.
    pub default_page_size: usize,
    /// Max rows a SELECT's result buffer holds before truncating the scan.
    pub max_results: usize,
    /// Max number of distinct kernel fingerprints cached in memory.
    pub kernel_cache_capacity: usize,
    /// Executable invoked to compile generated C source (spec section 4.6).
    pub cc_program: String,
    /// When a page fails to load mid-scan: `true` skips it with a warning,
    /// `false` fails the whole query (spec section 7 error propagation
    /// policy; wired to the CLI's `--tolerate-page-loss` flag).
    pub tolerate_page_loss: bool,
}

impl EngineConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            base_dir: base_dir.into(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_results: DEFAULT_MAX_RESULTS,
            kernel_cache_capacity: DEFAULT_CAPACITY,
            cc_program: "cc".to_string(),
            tolerate_page_loss: false,
        }
    }
}
