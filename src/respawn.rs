//! SIGHUP re-exec: discover the running executable's own path, then
//! `execve` it again with the original argument vector.
//!
//! Grounded on `original_source/src/acl-helper.c`'s three-tier discovery
//! (`realpath(argv[0])`, then `/proc/self/exe`, then the loader's
//! auxiliary vector). If none succeed, hang-up handling is disabled rather
//! than failing outright (spec.md §9).

use std::ffi::CString;
use std::path::PathBuf;

/// Attempt to discover the absolute path to the currently running
/// executable, in the same preference order as the original.
pub fn discover_exe_path() -> Option<PathBuf> {
    if let Some(argv0) = std::env::args().next() {
        if let Ok(canon) = std::fs::canonicalize(&argv0) {
            return Some(canon);
        }
    }

    if let Ok(path) = std::fs::read_link("/proc/self/exe") {
        return Some(path);
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(path) = exe_path_from_auxv() {
            return Some(path);
        }
    }

    None
}

#[cfg(target_os = "linux")]
fn exe_path_from_auxv() -> Option<PathBuf> {
    // AT_EXECFN points at the filename used to invoke the process, as
    // recorded by the kernel in the ELF auxiliary vector.
    const AT_EXECFN: libc::c_ulong = 31;
    let ptr = unsafe { libc::getauxval(AT_EXECFN) };
    if ptr == 0 {
        return None;
    }
    let c_str = unsafe { std::ffi::CStr::from_ptr(ptr as *const libc::c_char) };
    let path = PathBuf::from(c_str.to_string_lossy().into_owned());
    std::fs::canonicalize(&path).ok().or(Some(path))
}

/// Re-execute the current process image in place with the original
/// argument vector. Only returns on failure (a successful `execve` never
/// returns to the caller).
pub fn reexec(exe_path: &PathBuf) -> std::io::Error {
    let exe = match CString::new(exe_path.as_os_str().to_string_lossy().into_owned()) {
        Ok(c) => c,
        Err(_) => return std::io::Error::new(std::io::ErrorKind::InvalidInput, "nul in exe path"),
    };

    let args: Vec<CString> = std::env::args()
        .map(|a| CString::new(a).unwrap_or_else(|_| CString::new("?").unwrap()))
        .collect();
    let mut argv: Vec<*const libc::c_char> = args.iter().map(|a| a.as_ptr()).collect();
    argv.push(std::ptr::null());

    unsafe {
        libc::execv(exe.as_ptr(), argv.as_ptr());
    }
    std::io::Error::last_os_error()
}
