use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable naming the native module explicitly.
pub(crate) const LIBRARY_PATH_VAR: &str = "MECAB_LIBRARY_PATH";
/// Environment variable naming the engine's resource file.
pub(crate) const RC_PATH_VAR: &str = "MECABRC";

/// Name → value lookup used to locate the engine installation.
pub(crate) trait SettingLookup {
    fn lookup(&self, name: &str) -> Option<OsString>;
}

/// Reads settings from the process environment.
pub(crate) struct EnvLookup;

impl SettingLookup for EnvLookup {
    fn lookup(&self, name: &str) -> Option<OsString> {
        env::var_os(name).filter(|value| !value.is_empty())
    }
}

pub(crate) fn default_module_name() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "libmecab.dll"
    }
    #[cfg(target_os = "macos")]
    {
        "libmecab.dylib"
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        "libmecab.so.2"
    }
}

/// Location of the module relative to the installation root.
fn module_relative_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("bin").join("libmecab.dll")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("lib").join("libmecab.dylib")
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        PathBuf::from("lib").join("libmecab.so")
    }
}

/// The resource file lives in `<root>/etc/mecabrc`; the module sits at a
/// fixed location under the same root.
pub(crate) fn library_path_from_rc(rc_path: &Path) -> Option<PathBuf> {
    let root = rc_path.parent()?.parent()?;
    Some(root.join(module_relative_path()))
}

/// Resolves the module path: explicit variable, then the resource file's
/// installation root, then the bare module name for the system loader.
pub(crate) fn resolve_library_path(lookup: &dyn SettingLookup) -> PathBuf {
    if let Some(path) = lookup.lookup(LIBRARY_PATH_VAR) {
        return PathBuf::from(path);
    }

    if let Some(rc_path) = lookup.lookup(RC_PATH_VAR) {
        match library_path_from_rc(Path::new(&rc_path)) {
            Some(path) if path.exists() => return path,
            Some(path) => debug!(
                path = %path.display(),
                "module not present next to resource file, falling back to system loader"
            ),
            None => debug!(
                rc = %Path::new(&rc_path).display(),
                "resource file path has no installation root"
            ),
        }
    }

    PathBuf::from(default_module_name())
}
