//! External compiler invocation (part of C3/C6, spec section 4.6): shells
//! out to a C compiler to turn generated source into a position-independent
//! shared object. This is the one genuinely blocking, synchronous
//! subprocess call in the engine (spec section 5: "process invocation of
//! the external compiler during kernel build ... blocking with no
//! timeout").

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

/// Compile `src_path` to the shared object at `out_path` using `cc_program`
/// (e.g. `"cc"`). Failure surfaces the compiler's stderr verbatim as
/// `Error::CompileFailed` (spec section 4.6).
pub fn compile_shared_object(cc_program: &str, src_path: &Path, out_path: &Path) -> Result<()> {
    debug!("compiling {} -> {}", src_path.display(), out_path.display());
    let output = Command::new(cc_program)
        .arg("-shared")
        .arg("-fPIC")
        .arg("-O2")
        .arg("-o")
        .arg(out_path)
        .arg(src_path)
        .output()
        .map_err(|e| Error::load_failed(src_path, format!("failed to invoke {cc_program}: {e}")))?;
    if !output.status.success() {
        return Err(Error::CompileFailed(String::from_utf8_lossy(&output.stderr).into_owned()));
    }
    Ok(())
}

/// Library filename extension for the host platform (spec section 6:
/// `<base_dir>/compiled/<T>Data_<N>.<ext>`).
pub fn shared_object_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_compiler_program_surfaces_load_failed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("x.c");
        std::fs::write(&src, "int f(void){return 0;}").unwrap();
        let out = dir.path().join("x.so");
        let err = compile_shared_object("definitely-not-a-real-compiler", &src, &out).unwrap_err();
        assert!(matches!(err, Error::LoadFailed { .. }));
    }
}
