use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_float, c_int, c_long, c_short, c_uint, c_ushort, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use tracing::{debug, trace};

use crate::error::{MecabError, Result};

pub(crate) type MecabHandle = *mut c_void;

pub(crate) type FnMecabVersion = unsafe extern "C" fn() -> *const c_char;
pub(crate) type FnMecabNew = unsafe extern "C" fn(c_int, *mut *mut c_char) -> MecabHandle;
pub(crate) type FnMecabDestroy = unsafe extern "C" fn(MecabHandle);
pub(crate) type FnMecabSparseToNode2 =
    unsafe extern "C" fn(MecabHandle, *const c_char, usize) -> *const MecabNodeRaw;
pub(crate) type FnMecabDictionaryInfo =
    unsafe extern "C" fn(MecabHandle) -> *const MecabDictionaryInfoRaw;
pub(crate) type FnMecabStrerror = unsafe extern "C" fn(MecabHandle) -> *const c_char;

/// Layout of `mecab_dictionary_info_t`.
#[repr(C)]
#[allow(dead_code)]
pub(crate) struct MecabDictionaryInfoRaw {
    pub(crate) filename: *const c_char,
    pub(crate) charset: *const c_char,
    pub(crate) size: c_uint,
    pub(crate) dictionary_type: c_int,
    pub(crate) lsize: c_uint,
    pub(crate) rsize: c_uint,
    pub(crate) version: c_ushort,
    pub(crate) next: *mut MecabDictionaryInfoRaw,
}

/// Layout of `mecab_path_t`. Only ever reached through node pointers.
#[repr(C)]
#[allow(dead_code)]
pub(crate) struct MecabPathRaw {
    pub(crate) rnode: *mut MecabNodeRaw,
    pub(crate) rnext: *mut MecabPathRaw,
    pub(crate) lnode: *mut MecabNodeRaw,
    pub(crate) lnext: *mut MecabPathRaw,
    pub(crate) cost: c_int,
    pub(crate) prob: c_float,
}

/// Layout of `mecab_node_t`.
///
/// `surface` is not NUL-terminated: it points into the buffer that was
/// handed to `mecab_sparse_tonode2` and is `length` bytes long.
#[repr(C)]
#[allow(dead_code)]
pub(crate) struct MecabNodeRaw {
    pub(crate) prev: *mut MecabNodeRaw,
    pub(crate) next: *mut MecabNodeRaw,
    pub(crate) enext: *mut MecabNodeRaw,
    pub(crate) bnext: *mut MecabNodeRaw,
    pub(crate) rpath: *mut MecabPathRaw,
    pub(crate) lpath: *mut MecabPathRaw,
    pub(crate) surface: *const c_char,
    pub(crate) feature: *const c_char,
    pub(crate) id: c_uint,
    pub(crate) length: c_ushort,
    pub(crate) rlength: c_ushort,
    pub(crate) rc_attr: c_ushort,
    pub(crate) lc_attr: c_ushort,
    pub(crate) posid: c_ushort,
    pub(crate) char_type: u8,
    pub(crate) stat: u8,
    pub(crate) isbest: u8,
    pub(crate) alpha: c_float,
    pub(crate) beta: c_float,
    pub(crate) prob: c_float,
    pub(crate) wcost: c_short,
    pub(crate) cost: c_long,
}

/// Resolved MeCab entry points. Only constructed when every symbol resolved.
#[derive(Clone, Copy)]
pub(crate) struct MecabApi {
    pub(crate) mecab_version: FnMecabVersion,
    pub(crate) mecab_new: FnMecabNew,
    pub(crate) mecab_destroy: FnMecabDestroy,
    pub(crate) mecab_sparse_tonode2: FnMecabSparseToNode2,
    pub(crate) mecab_dictionary_info: FnMecabDictionaryInfo,
    pub(crate) mecab_strerror: FnMecabStrerror,
}

impl MecabApi {
    pub(crate) unsafe fn load(library: &DynamicLibrary) -> Result<Self> {
        Ok(Self {
            mecab_version: library.load_symbol("mecab_version")?,
            mecab_new: library.load_symbol("mecab_new")?,
            mecab_destroy: library.load_symbol("mecab_destroy")?,
            mecab_sparse_tonode2: library.load_symbol("mecab_sparse_tonode2")?,
            mecab_dictionary_info: library.load_symbol("mecab_dictionary_info")?,
            mecab_strerror: library.load_symbol("mecab_strerror")?,
        })
    }
}

/// A loaded module plus its function table.
///
/// Field order matters: the module is unloaded before the search-path
/// registration it may still resolve dependencies through is removed.
pub(crate) struct LoadedLibrary {
    pub(crate) api: MecabApi,
    _library: Option<DynamicLibrary>,
    _search_path: Option<SearchPathToken>,
}

impl LoadedLibrary {
    /// Loads the module at `path`, optionally registering its directory on
    /// the dependent-library search path first, and binds every entry point.
    ///
    /// Only absolute paths have a directory to register; bare names and
    /// relative paths go through the system loader's normal search.
    pub(crate) fn open(path: &Path, extend_search_path: bool) -> Result<Self> {
        let search_path = match search_directory(path) {
            Some(directory) if extend_search_path => Some(SearchPathToken::register(directory)?),
            None if extend_search_path => {
                trace!(
                    path = %path.display(),
                    "no absolute directory to register, using system search"
                );
                None
            }
            _ => None,
        };

        let library = DynamicLibrary::open(path, search_path.is_some())?;
        let api = unsafe { MecabApi::load(&library)? };
        debug!(path = %path.display(), "bound mecab entry points");

        Ok(Self {
            api,
            _library: Some(library),
            _search_path: search_path,
        })
    }

    /// Wraps an already-resolved table that is not backed by a loaded module.
    #[cfg(test)]
    pub(crate) fn from_api(api: MecabApi) -> Self {
        Self {
            api,
            _library: None,
            _search_path: None,
        }
    }

}

/// Directory of `path` when it can be registered: absolute and non-empty.
fn search_directory(path: &Path) -> Option<&Path> {
    if !path.is_absolute() {
        return None;
    }
    path.parent()
        .filter(|directory| !directory.as_os_str().is_empty())
}

#[derive(Debug)]
pub(crate) struct DynamicLibrary {
    handle: *mut c_void,
}

// SAFETY: a module handle is a process-global token; the platform loaders
// accept it from any thread.
unsafe impl Send for DynamicLibrary {}
unsafe impl Sync for DynamicLibrary {}

impl DynamicLibrary {
    pub(crate) fn open<P: AsRef<Path>>(path: P, use_search_dirs: bool) -> Result<Self> {
        let path_string = path.as_ref().to_string_lossy().to_string();
        let path_c = CString::new(path_string.clone())?;
        trace!(path = %path_string, "opening native module");
        let handle = unsafe { platform_open(path_c.as_ptr(), use_search_dirs) };
        if handle.is_null() {
            return Err(MecabError::Load(format!(
                "{} ({})",
                path_string,
                platform_last_error()
            )));
        }
        Ok(Self { handle })
    }

    pub(crate) unsafe fn load_symbol<T: Copy>(&self, symbol_name: &str) -> Result<T> {
        let symbol_c = CString::new(symbol_name)?;
        let symbol_ptr = platform_symbol(self.handle, symbol_c.as_ptr());
        if symbol_ptr.is_null() {
            return Err(MecabError::Binding(format!(
                "{} ({})",
                symbol_name,
                platform_last_error()
            )));
        }
        Ok(std::mem::transmute_copy::<*mut c_void, T>(&symbol_ptr))
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        unsafe {
            platform_close(self.handle);
        }
        self.handle = ptr::null_mut();
    }
}

/// Registration of one directory on the dependent-library search path.
/// Dropping the token removes the directory again.
#[derive(Debug)]
pub(crate) struct SearchPathToken {
    directory: PathBuf,
    #[cfg(target_os = "windows")]
    cookie: *mut c_void,
    #[cfg(target_os = "windows")]
    remove: FnRemoveDllDirectory,
}

// SAFETY: the cookie is an opaque value owned by the token; removal is
// valid from any thread.
unsafe impl Send for SearchPathToken {}
unsafe impl Sync for SearchPathToken {}

impl SearchPathToken {
    #[cfg(target_os = "windows")]
    pub(crate) fn register(directory: &Path) -> Result<Self> {
        use std::os::windows::ffi::OsStrExt;

        let (add, remove) = unsafe { resolve_dll_directory_api() }.ok_or_else(|| {
            MecabError::UnsupportedPlatform(
                "AddDllDirectory/RemoveDllDirectory are not available".to_string(),
            )
        })?;
        let wide: Vec<u16> = directory
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let cookie = unsafe { add(wide.as_ptr()) };
        if cookie.is_null() {
            return Err(MecabError::Load(format!(
                "could not add {} to the search path ({})",
                directory.display(),
                platform_last_error()
            )));
        }
        debug!(directory = %directory.display(), "registered library search directory");
        Ok(Self {
            directory: directory.to_path_buf(),
            cookie,
            remove,
        })
    }

    #[cfg(not(target_os = "windows"))]
    pub(crate) fn register(directory: &Path) -> Result<Self> {
        Err(MecabError::UnsupportedPlatform(format!(
            "cannot register {} as a library search directory at runtime on this platform",
            directory.display()
        )))
    }
}

impl Drop for SearchPathToken {
    fn drop(&mut self) {
        #[cfg(target_os = "windows")]
        unsafe {
            if !self.cookie.is_null() {
                let _ = (self.remove)(self.cookie);
                self.cookie = ptr::null_mut();
            }
        }
        trace!(directory = %self.directory.display(), "released library search directory");
    }
}

/// Returns the engine's last error message for `handle`, if it reports one.
pub(crate) fn read_mecab_error(api: &MecabApi, handle: MecabHandle) -> Option<String> {
    let message_ptr = unsafe { (api.mecab_strerror)(handle) };
    if message_ptr.is_null() {
        return None;
    }
    let message = unsafe { CStr::from_ptr(message_ptr) }
        .to_string_lossy()
        .trim()
        .to_string();
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

pub(crate) fn cstr_to_string(pointer: *const c_char) -> String {
    if pointer.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(pointer) }
        .to_string_lossy()
        .to_string()
}

/// Borrows the bytes of a NUL-terminated string, stopping after `max_len`
/// bytes if no terminator was found.
///
/// # Safety
/// `pointer` must be null or readable up to its terminator or `max_len`
/// bytes, whichever comes first, for the lifetime `'a`.
pub(crate) unsafe fn bounded_cstr_bytes<'a>(pointer: *const c_char, max_len: usize) -> &'a [u8] {
    if pointer.is_null() {
        return &[];
    }
    let bytes = pointer as *const u8;
    let mut len = 0usize;
    while len < max_len && *bytes.add(len) != 0 {
        len += 1;
    }
    std::slice::from_raw_parts(bytes, len)
}

/// Borrows exactly `len` bytes starting at `pointer`.
///
/// # Safety
/// `pointer` must be null or readable for `len` bytes for the lifetime `'a`.
pub(crate) unsafe fn counted_bytes<'a>(pointer: *const c_char, len: usize) -> &'a [u8] {
    if pointer.is_null() || len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(pointer as *const u8, len)
}

#[cfg(target_os = "windows")]
type FnAddDllDirectory = unsafe extern "system" fn(*const u16) -> *mut c_void;
#[cfg(target_os = "windows")]
type FnRemoveDllDirectory = unsafe extern "system" fn(*mut c_void) -> i32;

#[cfg(target_os = "windows")]
#[link(name = "kernel32")]
extern "system" {
    fn LoadLibraryA(lp_lib_file_name: *const c_char) -> *mut c_void;
    fn LoadLibraryExA(lp_lib_file_name: *const c_char, h_file: *mut c_void, flags: u32)
        -> *mut c_void;
    fn GetModuleHandleA(lp_module_name: *const c_char) -> *mut c_void;
    fn GetProcAddress(h_module: *mut c_void, lp_proc_name: *const c_char) -> *mut c_void;
    fn FreeLibrary(h_lib_module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}

#[cfg(target_os = "windows")]
unsafe fn resolve_dll_directory_api() -> Option<(FnAddDllDirectory, FnRemoveDllDirectory)> {
    let kernel32 = GetModuleHandleA(b"kernel32.dll\0".as_ptr() as *const c_char);
    if kernel32.is_null() {
        return None;
    }
    let add = GetProcAddress(kernel32, b"AddDllDirectory\0".as_ptr() as *const c_char);
    let remove = GetProcAddress(kernel32, b"RemoveDllDirectory\0".as_ptr() as *const c_char);
    if add.is_null() || remove.is_null() {
        return None;
    }
    Some((
        std::mem::transmute_copy::<*mut c_void, FnAddDllDirectory>(&add),
        std::mem::transmute_copy::<*mut c_void, FnRemoveDllDirectory>(&remove),
    ))
}

#[cfg(target_os = "windows")]
unsafe fn platform_open(path: *const c_char, use_search_dirs: bool) -> *mut c_void {
    const LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR: u32 = 0x0000_0100;
    const LOAD_LIBRARY_SEARCH_DEFAULT_DIRS: u32 = 0x0000_1000;
    if use_search_dirs {
        LoadLibraryExA(
            path,
            ptr::null_mut(),
            LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR | LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
        )
    } else {
        LoadLibraryA(path)
    }
}

#[cfg(target_os = "windows")]
unsafe fn platform_symbol(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    GetProcAddress(handle, symbol)
}

#[cfg(target_os = "windows")]
unsafe fn platform_close(handle: *mut c_void) {
    let _ = FreeLibrary(handle);
}

#[cfg(target_os = "windows")]
fn platform_last_error() -> String {
    format!("GetLastError={}", unsafe { GetLastError() })
}

#[cfg(target_os = "linux")]
#[link(name = "dl")]
extern "C" {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    fn dlclose(handle: *mut c_void) -> c_int;
    fn dlerror() -> *const c_char;
}

#[cfg(all(unix, not(target_os = "linux")))]
extern "C" {
    fn dlopen(filename: *const c_char, flags: c_int) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    fn dlclose(handle: *mut c_void) -> c_int;
    fn dlerror() -> *const c_char;
}

#[cfg(unix)]
unsafe fn platform_open(path: *const c_char, _use_search_dirs: bool) -> *mut c_void {
    const RTLD_NOW: c_int = 2;
    const RTLD_LOCAL: c_int = 0;
    dlopen(path, RTLD_NOW | RTLD_LOCAL)
}

#[cfg(unix)]
unsafe fn platform_symbol(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    dlsym(handle, symbol)
}

#[cfg(unix)]
unsafe fn platform_close(handle: *mut c_void) {
    let _ = dlclose(handle);
}

#[cfg(unix)]
fn platform_last_error() -> String {
    let pointer = unsafe { dlerror() };
    if pointer.is_null() {
        "unknown error".to_string()
    } else {
        let full = unsafe { CStr::from_ptr(pointer) }
            .to_string_lossy()
            .to_string();
        full.split(": tried:").next().unwrap_or(&full).to_string()
    }
}
