//! Dynamic loader (C3, spec section 4.3). Wraps `libloading` so resolved
//! function pointers never outlive the library they came from, and keeps a
//! reference count per path so a page or kernel currently in use by a
//! long-running scan is never unmapped out from under it (spec section 5).
//!
//! `libloading` itself is not part of the retrieval pack's dependency
//! stack, but it is the standard, idiomatic crate for exactly this
//! contract (open/resolve/close a shared object) in safe-ish Rust; see
//! `DESIGN.md`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use libloading::Library;
use log::{debug, trace};

use crate::error::{Error, Result};

/// An open shared library plus the ABI version it advertises. Dropping the
/// last `Arc<LoadedLibrary>` unmaps it (spec section 4.3: "closing past
/// zero unmaps").
pub struct LoadedLibrary {
    lib: Library,
    pub path: PathBuf,
    pub abi_version: u32,
}

impl LoadedLibrary {
    /// Resolve `symbol`, failing with `Error::LoadFailed` (reason
    /// `"missing symbol"`) if absent — spec section 4.3's `Missing`.
    ///
    /// # Safety
    /// The caller must know the true signature of `symbol` in the
    /// compiled artifact; a mismatched `T` is undefined behavior. Every
    /// symbol this engine resolves was generated by `pagegen`/`synth`
    /// moments earlier, so the signature is always known.
    pub unsafe fn resolve<T>(&self, symbol: &[u8]) -> Result<libloading::Symbol<'_, T>> {
        self.lib.get(symbol).map_err(|_| {
            Error::load_failed(&self.path, format!("missing symbol {}", String::from_utf8_lossy(symbol)))
        })
    }
}

impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        trace!("unloading {}", self.path.display());
    }
}

/// Process-local registry of open shared libraries, keyed by path. Holds
/// only weak references, so a library's lifetime is governed entirely by
/// how many `Arc<LoadedLibrary>` handles callers are still holding.
#[derive(Default)]
pub struct Loader {
    open: Mutex<HashMap<PathBuf, Weak<LoadedLibrary>>>,
}

impl Loader {
    pub fn new() -> Self {
        Loader { open: Mutex::new(HashMap::new()) }
    }

    /// Open (or reuse an already-open) shared library at `path`, verifying
    /// its `abi_version` data symbol equals `expected_abi` (spec section
    /// 4.3's `AbiMismatch`).
    pub fn open(&self, path: &Path, expected_abi: u32) -> Result<Arc<LoadedLibrary>> {
        let mut open = self.open.lock().unwrap();
        if let Some(weak) = open.get(path) {
            if let Some(existing) = weak.upgrade() {
                if existing.abi_version != expected_abi {
                    return Err(Error::AbiMismatch { expected: expected_abi, found: existing.abi_version });
                }
                return Ok(existing);
            }
        }
        debug!("loading {}", path.display());
        let lib = unsafe { Library::new(path) }
            .map_err(|e| Error::load_failed(path, format!("not found: {e}")))?;
        let abi_version: u32 = unsafe {
            let sym = lib
                .get::<*const u32>(b"abi_version\0")
                .map_err(|_| Error::load_failed(path, "missing symbol abi_version"))?;
            **sym
        };
        let loaded = Arc::new(LoadedLibrary { lib, path: path.to_path_buf(), abi_version });
        if abi_version != expected_abi {
            return Err(Error::AbiMismatch { expected: expected_abi, found: abi_version });
        }
        open.insert(path.to_path_buf(), Arc::downgrade(&loaded));
        Ok(loaded)
    }

    /// Drop the cache entry for `path` so the *next* `open` call reloads
    /// from disk rather than handing back a stale mapping, even if some
    /// caller still holds an `Arc` to the old one (spec section 4.2:
    /// "Atomicity ... open handles MUST remain valid until the next
    /// `load_page` call").
    pub fn invalidate(&self, path: &Path) {
        self.open.lock().unwrap().remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_shared_object, shared_object_extension};

    fn build_test_lib(dir: &Path, abi: u32) -> PathBuf {
        let src = dir.join("t.c");
        std::fs::write(&src, format!("unsigned int abi_version = {abi}u;\nint count(void){{return 0;}}\n")).unwrap();
        let out = dir.join(format!("t.{}", shared_object_extension()));
        compile_shared_object("cc", &src, &out).expect("test requires a working cc");
        out
    }

    #[test]
    #[ignore = "requires a host C compiler; exercised by integration tests in environments that have one"]
    fn abi_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = build_test_lib(dir.path(), 42);
        let loader = Loader::new();
        assert!(loader.open(&out, 42).is_ok());
        loader.invalidate(&out);
        assert!(matches!(loader.open(&out, 7), Err(Error::AbiMismatch { .. })));
    }
}
