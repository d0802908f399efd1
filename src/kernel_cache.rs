//! Kernel cache (C6, spec section 4.6): fingerprint -> compiled kernel,
//! at-most-one `cc` invocation per fingerprint for the life of the
//! process, LRU eviction with a configurable bound (default 128 entries).
//!
//! "At-most-one build" and "LRU eviction" look like they're in tension —
//! an evicted entry could in principle be asked for again. They're
//! reconciled the same way a build cache on disk usually is: the compiled
//! artifact's path is a pure function of the fingerprint, so before
//! invoking the compiler `get_or_build` checks whether that path already
//! exists on disk from an earlier (since-evicted) build and, if so, just
//! reloads it. Only a fingerprint's very first request ever shells out to
//! `cc`.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::compiler::{compile_shared_object, shared_object_extension};
use crate::error::Result;
use crate::fingerprint::{fingerprint_name, Fingerprint};
use crate::loader::{LoadedLibrary, Loader};
use crate::synth::{Kernel, ResultShape};

pub const DEFAULT_CAPACITY: usize = 128;

/// A cached, loaded kernel ready to be invoked by the executor.
pub struct KernelHandle {
    pub lib: Arc<LoadedLibrary>,
    pub symbol: String,
    pub result_shape: ResultShape,
}

pub struct KernelCache {
    loader: Arc<Loader>,
    cc_program: String,
    capacity: usize,
    entries: Mutex<HashMap<Fingerprint, Arc<KernelHandle>>>,
    order: Mutex<VecDeque<Fingerprint>>,
}

impl KernelCache {
    pub fn new(loader: Arc<Loader>, cc_program: impl Into<String>, capacity: usize) -> Self {
        KernelCache {
            loader,
            cc_program: cc_program.into(),
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn touch(&self, fp: Fingerprint) {
        let mut order = self.order.lock().unwrap();
        order.retain(|&f| f != fp);
        order.push_back(fp);
    }

    fn evict_if_needed(&self) {
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();
        while entries.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Return the cached/loaded kernel for `kernel.fingerprint`, compiling
    /// it (or reusing an on-disk artifact from a prior eviction) if this is
    /// the first time this process has seen that fingerprint. Source lands
    /// at `<base_dir>/kernels/<K>_<T>.src`, the compiled artifact at
    /// `<base_dir>/compiled/<K>_<T>.<ext>` (spec section 6).
    pub fn get_or_build(&self, kernel: &Kernel, table: &str, base_dir: &Path) -> Result<Arc<KernelHandle>> {
        if let Some(handle) = self.entries.lock().unwrap().get(&kernel.fingerprint).cloned() {
            self.touch(kernel.fingerprint);
            return Ok(handle);
        }

        let name = fingerprint_name(kernel.fingerprint);
        let kernels_dir = base_dir.join("kernels");
        let compiled_dir = base_dir.join("compiled");
        let src_path: PathBuf = kernels_dir.join(format!("{name}_{table}.src"));
        let so_path: PathBuf = compiled_dir.join(format!("{name}_{table}.{}", shared_object_extension()));

        if !so_path.exists() {
            std::fs::create_dir_all(&kernels_dir).map_err(|e| crate::error::Error::io(&kernels_dir, e))?;
            std::fs::create_dir_all(&compiled_dir).map_err(|e| crate::error::Error::io(&compiled_dir, e))?;
            std::fs::write(&src_path, &kernel.source)
                .map_err(|e| crate::error::Error::io(&src_path, e))?;
            debug!("building kernel {name} (fingerprint {:016x})", kernel.fingerprint);
            compile_shared_object(&self.cc_program, &src_path, &so_path)?;
        }

        let expected_abi = extract_abi_version(&kernel.source);
        let lib = self.loader.open(&so_path, expected_abi)?;
        let handle = Arc::new(KernelHandle {
            lib,
            symbol: kernel.symbol.clone(),
            result_shape: kernel.result_shape.clone(),
        });
        self.entries.lock().unwrap().insert(kernel.fingerprint, handle.clone());
        self.touch(kernel.fingerprint);
        self.evict_if_needed();
        Ok(handle)
    }

    /// Force the next `get_or_build` for any fingerprint rooted at this
    /// table to recompile, by dropping every cache entry and deleting the
    /// on-disk artifacts under `base_dir` matching `table`. Used when a
    /// referenced schema changes (spec section 4.6's `rebuild`); this
    /// version of the engine has no `ALTER`, so in practice this is only
    /// exercised by tests that simulate a schema change across process
    /// restarts.
    pub fn rebuild(&self, base_dir: &Path, table: &str) -> Result<()> {
        self.entries.lock().unwrap().clear();
        self.order.lock().unwrap().clear();
        for dir in [base_dir.join("kernels"), base_dir.join("compiled")] {
            if let Ok(read_dir) = std::fs::read_dir(&dir) {
                for entry in read_dir.flatten() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if name.contains(&format!("_{table}.")) {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pull the `abi_version = <N>u;` literal back out of generated source so
/// the loader can check it without re-parsing the schema. Cheaper than
/// threading the schema hash through every call site, and the literal was
/// just emitted by `codegen::abi_preamble` moments earlier so its shape is
/// fixed.
fn extract_abi_version(source: &str) -> u32 {
    source
        .lines()
        .find_map(|line| line.strip_prefix("unsigned int abi_version = "))
        .and_then(|rest| rest.trim_end_matches("u;").parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_abi_version_reads_preamble_literal() {
        let src = "unsigned int abi_version = 12345u;\nint x;\n";
        assert_eq!(extract_abi_version(src), 12345);
    }
}
