use std::cell::Cell;
use std::env;
use std::ffi::{CStr, CString, OsString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::{Mutex, OnceLock};

use crate::constants::{
    MECAB_BOS_NODE, MECAB_EON_NODE, MECAB_EOS_NODE, MECAB_NOR_NODE, MECAB_UNK_NODE,
};
use crate::native::{
    LoadedLibrary, MecabApi, MecabDictionaryInfoRaw, MecabHandle, MecabNodeRaw,
};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn set_env_var(key: &str, value: &str) {
    #[allow(unused_unsafe)]
    unsafe {
        env::set_var(key, value);
    }
}

fn remove_env_var(key: &str) {
    #[allow(unused_unsafe)]
    unsafe {
        env::remove_var(key);
    }
}

/// Runs a closure while holding a global environment lock and applying overrides.
pub(crate) fn with_env_vars<T>(overrides: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    let _guard = env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let backups: Vec<(&str, Option<OsString>)> = overrides
        .iter()
        .map(|(key, _)| (*key, env::var_os(key)))
        .collect();

    for (key, value) in overrides {
        match value {
            Some(value) => set_env_var(key, value),
            None => remove_env_var(key),
        }
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (key, value) in backups.into_iter().rev() {
        match value {
            Some(value) => {
                #[allow(unused_unsafe)]
                unsafe {
                    env::set_var(key, value);
                }
            }
            None => remove_env_var(key),
        }
    }

    match result {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

// In-process stand-in for the engine. Each test runs on its own thread, so
// call counters are thread-local.
thread_local! {
    static CREATE_CALLS: Cell<usize> = const { Cell::new(0) };
    static DESTROY_CALLS: Cell<usize> = const { Cell::new(0) };
    static ANALYZE_CALLS: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn create_calls() -> usize {
    CREATE_CALLS.with(Cell::get)
}

pub(crate) fn destroy_calls() -> usize {
    DESTROY_CALLS.with(Cell::get)
}

pub(crate) fn analyze_calls() -> usize {
    ANALYZE_CALLS.with(Cell::get)
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    counter.with(|value| value.set(value.get() + 1));
}

/// A word equal to this marker makes the fake analyze call fail.
pub(crate) const FAIL_WORD: &str = "!fail";
/// Same as [`FAIL_WORD`] but without an error message.
pub(crate) const SILENT_FAIL_WORD: &str = "!silent";
/// Produces an end-of-enumeration node, which the walker must reject.
pub(crate) const EON_WORD: &str = "!eon";

struct FakeEngine {
    _filename: CString,
    _charset: CString,
    _user_filename: CString,
    dictionaries: Vec<MecabDictionaryInfoRaw>,
    dictionary_queries: usize,
    forget_dictionaries: bool,
    nodes: Vec<MecabNodeRaw>,
    features: Vec<CString>,
    error: CString,
}

fn blank_node() -> MecabNodeRaw {
    // SAFETY: every field is a raw pointer, integer or float.
    unsafe { std::mem::zeroed() }
}

fn feature_for(word: &[u8]) -> (u8, CString) {
    let text = String::from_utf8_lossy(word).replace('\0', "");
    if word.first().map_or(false, u8::is_ascii_uppercase) {
        let feature = format!("名詞,固有名詞,{text}");
        (MECAB_UNK_NODE, CString::new(feature).unwrap_or_default())
    } else {
        let feature = format!("名詞,一般,*,*,*,*,{text},*,*");
        (MECAB_NOR_NODE, CString::new(feature).unwrap_or_default())
    }
}

impl FakeEngine {
    fn new(charset: &str, with_user_dictionary: bool, forget_dictionaries: bool) -> Box<Self> {
        let filename = CString::new("/fake/sys.dic").unwrap_or_default();
        let charset = CString::new(charset).unwrap_or_default();
        let user_filename = CString::new("/fake/user.dic").unwrap_or_default();
        let mut engine = Box::new(Self {
            dictionaries: Vec::with_capacity(2),
            dictionary_queries: 0,
            forget_dictionaries,
            _filename: filename,
            _charset: charset,
            _user_filename: user_filename,
            nodes: Vec::new(),
            features: Vec::new(),
            error: CString::default(),
        });

        let system = MecabDictionaryInfoRaw {
            filename: engine._filename.as_ptr(),
            charset: engine._charset.as_ptr(),
            size: 392_126,
            dictionary_type: 0,
            lsize: 1316,
            rsize: 1316,
            version: 102,
            next: ptr::null_mut(),
        };
        engine.dictionaries.push(system);
        if with_user_dictionary {
            let user = MecabDictionaryInfoRaw {
                filename: engine._user_filename.as_ptr(),
                charset: engine._charset.as_ptr(),
                size: 3,
                dictionary_type: 1,
                lsize: 1316,
                rsize: 1316,
                version: 102,
                next: ptr::null_mut(),
            };
            engine.dictionaries.push(user);
            // Within capacity, so the element addresses are stable.
            let user_ptr = unsafe { engine.dictionaries.as_mut_ptr().add(1) };
            engine.dictionaries[0].next = user_ptr;
        }
        engine
    }

    fn analyze(&mut self, input: *const c_char, len: usize) -> *const MecabNodeRaw {
        let bytes = unsafe { std::slice::from_raw_parts(input as *const u8, len) };
        self.nodes.clear();
        self.features.clear();
        self.error = CString::default();

        let bos_feature = CString::new("BOS/EOS,*,*,*,*,*,*,*,*").unwrap_or_default();
        self.features.push(bos_feature);

        let mut words: Vec<(usize, usize, usize)> = Vec::new();
        let mut cursor = 0usize;
        while cursor < bytes.len() {
            let word_start_with_space = cursor;
            while cursor < bytes.len() && bytes[cursor] == b' ' {
                cursor += 1;
            }
            if cursor == bytes.len() {
                break;
            }
            let start = cursor;
            while cursor < bytes.len() && bytes[cursor] != b' ' {
                cursor += 1;
            }
            words.push((word_start_with_space, start, cursor));
        }

        self.nodes.reserve_exact(words.len() + 2);
        let mut bos = blank_node();
        bos.stat = MECAB_BOS_NODE;
        bos.surface = input;
        bos.feature = self.features[0].as_ptr();
        self.nodes.push(bos);

        for (padded_start, start, end) in words {
            let word = &bytes[start..end];
            if word == FAIL_WORD.as_bytes() {
                self.error =
                    CString::new(format!("fake analysis failed at byte {start}")).unwrap_or_default();
                return ptr::null();
            }
            if word == SILENT_FAIL_WORD.as_bytes() {
                return ptr::null();
            }
            let (stat, feature) = if word == EON_WORD.as_bytes() {
                (MECAB_EON_NODE, CString::default())
            } else {
                feature_for(word)
            };
            self.features.push(feature);

            let mut node = blank_node();
            node.stat = stat;
            node.surface = unsafe { input.add(start) };
            node.length = (end - start) as u16;
            node.rlength = (end - padded_start) as u16;
            node.feature = self.features[self.features.len() - 1].as_ptr();
            self.nodes.push(node);
        }

        let mut eos = blank_node();
        eos.stat = MECAB_EOS_NODE;
        eos.surface = unsafe { input.add(len) };
        eos.feature = self.features[0].as_ptr();
        self.nodes.push(eos);

        let base = self.nodes.as_mut_ptr();
        let count = self.nodes.len();
        for index in 0..count {
            let node = unsafe { &mut *base.add(index) };
            node.id = index as u32;
            node.prev = if index == 0 {
                ptr::null_mut()
            } else {
                unsafe { base.add(index - 1) }
            };
            node.next = if index + 1 == count {
                ptr::null_mut()
            } else {
                unsafe { base.add(index + 1) }
            };
        }
        base
    }
}

unsafe extern "C" fn fake_version() -> *const c_char {
    b"0.996\0".as_ptr() as *const c_char
}

unsafe extern "C" fn fake_version_newer() -> *const c_char {
    b"0.998\0".as_ptr() as *const c_char
}

unsafe extern "C" fn fake_version_null() -> *const c_char {
    ptr::null()
}

/// Understands `--charset=NAME`, `--user-dic`, `--fail-create` and
/// `--forget-dic` (dictionary info is null after the first query).
unsafe extern "C" fn fake_new(argc: c_int, argv: *mut *mut c_char) -> MecabHandle {
    bump(&CREATE_CALLS);
    let mut charset = "UTF-8".to_string();
    let mut with_user_dictionary = false;
    let mut forget_dictionaries = false;
    for index in 1..argc.max(0) as usize {
        let arg = CStr::from_ptr(*argv.add(index)).to_string_lossy();
        if let Some(value) = arg.strip_prefix("--charset=") {
            charset = value.to_string();
        } else if arg == "--user-dic" {
            with_user_dictionary = true;
        } else if arg == "--forget-dic" {
            forget_dictionaries = true;
        } else if arg == "--fail-create" {
            return ptr::null_mut();
        }
    }
    let engine = FakeEngine::new(&charset, with_user_dictionary, forget_dictionaries);
    Box::into_raw(engine) as MecabHandle
}

unsafe extern "C" fn fake_destroy(handle: MecabHandle) {
    bump(&DESTROY_CALLS);
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut FakeEngine));
    }
}

unsafe extern "C" fn fake_sparse_tonode2(
    handle: MecabHandle,
    input: *const c_char,
    len: usize,
) -> *const MecabNodeRaw {
    bump(&ANALYZE_CALLS);
    if handle.is_null() || input.is_null() {
        return ptr::null();
    }
    (*(handle as *mut FakeEngine)).analyze(input, len)
}

unsafe extern "C" fn fake_dictionary_info(handle: MecabHandle) -> *const MecabDictionaryInfoRaw {
    if handle.is_null() {
        return ptr::null();
    }
    let engine = &mut *(handle as *mut FakeEngine);
    engine.dictionary_queries += 1;
    if engine.forget_dictionaries && engine.dictionary_queries > 1 {
        return ptr::null();
    }
    engine.dictionaries.as_ptr()
}

unsafe extern "C" fn fake_strerror(handle: MecabHandle) -> *const c_char {
    if handle.is_null() {
        return b"fake engine could not be created\0".as_ptr() as *const c_char;
    }
    (*(handle as *mut FakeEngine)).error.as_ptr()
}

pub(crate) fn fake_api() -> MecabApi {
    MecabApi {
        mecab_version: fake_version,
        mecab_new: fake_new,
        mecab_destroy: fake_destroy,
        mecab_sparse_tonode2: fake_sparse_tonode2,
        mecab_dictionary_info: fake_dictionary_info,
        mecab_strerror: fake_strerror,
    }
}

pub(crate) fn fake_api_with_newer_version() -> MecabApi {
    MecabApi {
        mecab_version: fake_version_newer,
        ..fake_api()
    }
}

pub(crate) fn fake_api_without_version() -> MecabApi {
    MecabApi {
        mecab_version: fake_version_null,
        ..fake_api()
    }
}

pub(crate) fn fake_loaded_library() -> LoadedLibrary {
    LoadedLibrary::from_api(fake_api())
}
