use std::ffi::CStr;
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tracing::{debug, trace, warn};

use crate::constants::{
    MAX_FEATURE_BYTES, MECAB_BOS_NODE, MECAB_EOS_NODE, MECAB_SUPPORTED_VERSION, UNKNOWN_VERSION,
};
use crate::discovery::{resolve_library_path, EnvLookup, SettingLookup};
use crate::error::{MecabError, Result};
use crate::handle::NativeContext;
use crate::model::{DictionaryInfo, Node, NodeStatus};
use crate::native::{
    bounded_cstr_bytes, counted_bytes, cstr_to_string, read_mecab_error, LoadedLibrary, MecabApi,
    MecabDictionaryInfoRaw, MecabNodeRaw,
};
use crate::types::{LoaderOptions, TaggerConfig};

static SHARED_LIBRARY: OnceLock<Result<MecabLibrary>> = OnceLock::new();
static SHARED_LIBRARY_LOCK: Mutex<()> = Mutex::new(());

const UTF8_CHARSET_PATTERN: &str = r"(?i)^utf-?8$";
static UTF8_CHARSET: OnceLock<Option<Regex>> = OnceLock::new();

/// Handle to a loaded MeCab module plus its resolved, version-checked
/// function table.
///
/// Cloning is cheap; every clone and every [`Tagger`] created from it keeps
/// the module loaded.
#[derive(Clone)]
pub struct MecabLibrary {
    inner: Arc<LoadedLibrary>,
}

impl MecabLibrary {
    /// Loads a MeCab module from an explicit path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_options(path, LoaderOptions::default())
    }

    /// Loads a MeCab module from an explicit path with loader options.
    pub fn load_with_options(path: impl AsRef<Path>, options: LoaderOptions) -> Result<Self> {
        let loaded = LoadedLibrary::open(path.as_ref(), options.extend_search_path)?;
        Self::from_loaded(loaded)
    }

    /// Returns the process-wide library, loading it on first use.
    ///
    /// The module is located through `MECAB_LIBRARY_PATH`, then `MECABRC`,
    /// then the platform's default module name. Initialization runs once;
    /// if it fails, every later call returns the same error.
    pub fn shared() -> Result<Self> {
        init_once(&SHARED_LIBRARY, &SHARED_LIBRARY_LOCK, || {
            Self::load_from_lookup(&EnvLookup)
        })
    }

    fn load_from_lookup(lookup: &dyn SettingLookup) -> Result<Self> {
        let path = resolve_library_path(lookup);
        debug!(path = %path.display(), "loading shared mecab library");
        Self::load(&path).map_err(|error| {
            warn!(%error, "mecab library initialization failed");
            error
        })
    }

    pub(crate) fn from_loaded(loaded: LoadedLibrary) -> Result<Self> {
        check_version(&loaded.api)?;
        Ok(Self {
            inner: Arc::new(loaded),
        })
    }

    /// Returns the engine version string.
    pub fn version(&self) -> String {
        read_version(&self.inner.api).unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    /// Creates a [`Tagger`] backed by this library.
    pub fn tagger(&self, config: &TaggerConfig) -> Result<Tagger> {
        Tagger::with_library(self, config)
    }
}

/// Builds the value in `cell` at most once. The check happens under `lock`,
/// later callers read the cell without locking.
fn init_once(
    cell: &OnceLock<Result<MecabLibrary>>,
    lock: &Mutex<()>,
    init: impl FnOnce() -> Result<MecabLibrary>,
) -> Result<MecabLibrary> {
    if let Some(result) = cell.get() {
        return result.clone();
    }
    let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    cell.get_or_init(init).clone()
}

fn read_version(api: &MecabApi) -> Option<String> {
    let pointer = unsafe { (api.mecab_version)() };
    if pointer.is_null() {
        return None;
    }
    Some(
        unsafe { CStr::from_ptr(pointer) }
            .to_string_lossy()
            .to_string(),
    )
}

fn check_version(api: &MecabApi) -> Result<()> {
    let actual = read_version(api).unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    if actual != MECAB_SUPPORTED_VERSION {
        warn!(%actual, expected = MECAB_SUPPORTED_VERSION, "mecab version rejected");
        return Err(MecabError::VersionMismatch {
            expected: MECAB_SUPPORTED_VERSION.to_string(),
            actual,
        });
    }
    trace!(version = %actual, "mecab version accepted");
    Ok(())
}

fn is_supported_charset(charset: &str) -> bool {
    let charset = charset.trim();
    match UTF8_CHARSET.get_or_init(|| Regex::new(UTF8_CHARSET_PATTERN).ok()) {
        Some(pattern) => pattern.is_match(charset),
        None => charset.eq_ignore_ascii_case("UTF-8"),
    }
}

/// A MeCab analyzer.
///
/// Owns one native context. [`Tagger::parse`] borrows the context for the
/// duration of the call; [`Tagger::close`] or dropping the tagger waits for
/// any call still in flight on another thread before the context is
/// destroyed. Calls on one tagger are serialized; use one tagger per thread
/// for parallel analysis.
pub struct Tagger {
    context: NativeContext,
    charset: String,
}

impl Tagger {
    /// Creates a tagger with [`TaggerConfig::default`] on the shared library.
    pub fn new() -> Result<Self> {
        Self::from_config(TaggerConfig::default())
    }

    /// Creates a tagger from a full [`TaggerConfig`].
    ///
    /// # Examples
    /// ```no_run
    /// use mecab_rs::{Tagger, TaggerConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = TaggerConfig::default()
    ///     .with_dictionary_dir("/var/lib/mecab/dic/ipadic-utf8");
    /// let tagger = Tagger::from_config(config)?;
    /// for node in tagger.parse("すもももももももものうち")? {
    ///     println!("{}\t{}", node.text(), node.part_of_speech());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: TaggerConfig) -> Result<Self> {
        let library = match &config.library_path {
            Some(path) => MecabLibrary::load_with_options(path, config.loader)?,
            None => MecabLibrary::shared()?,
        };
        Self::with_library(&library, &config)
    }

    /// Creates a tagger on an already loaded library.
    pub fn with_library(library: &MecabLibrary, config: &TaggerConfig) -> Result<Self> {
        let args = config.engine_args()?;
        let context = NativeContext::create(library.inner.clone(), &args)?;

        let charset = {
            let borrow = context.begin_use()?;
            let _calls = borrow.lock_calls();
            let info = unsafe { (borrow.api().mecab_dictionary_info)(borrow.raw()) };
            if info.is_null() {
                return Err(MecabError::Creation(
                    "mecab_dictionary_info returned a null pointer".to_string(),
                ));
            }
            cstr_to_string(unsafe { (*info).charset })
        };

        if !is_supported_charset(&charset) {
            warn!(%charset, "dictionary charset is not supported");
            return Err(MecabError::UnsupportedCharset(charset));
        }
        debug!(%charset, "tagger ready");

        Ok(Self { context, charset })
    }

    /// Charset declared by the system dictionary.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Analyzes `text` and returns its morphemes in order.
    ///
    /// Sentence boundary markers are not included. An empty input returns an
    /// empty vector without calling the engine.
    pub fn parse(&self, text: &str) -> Result<Vec<Node>> {
        if self.context.is_released() {
            return Err(MecabError::UseAfterRelease);
        }
        // The dictionary is UTF-8, so the input bytes are already encoded.
        let input = text.as_bytes();
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let borrow = self.context.begin_use()?;
        let _calls = borrow.lock_calls();
        let api = borrow.api();

        let head = unsafe {
            (api.mecab_sparse_tonode2)(borrow.raw(), input.as_ptr() as *const c_char, input.len())
        };
        if head.is_null() {
            let message = read_mecab_error(api, borrow.raw())
                .unwrap_or_else(|| "Unknown error.".to_string());
            warn!(%message, "mecab_sparse_tonode2 failed");
            return Err(MecabError::Analysis(message));
        }

        // SAFETY: `head` came from the call above; its nodes stay valid while
        // `input` is borrowed and the call lock is held.
        let graph = unsafe { NodeGraph::new(head, input) };
        collect_nodes(&graph)
    }

    /// Returns every dictionary the engine has loaded, system dictionary first.
    pub fn dictionaries(&self) -> Result<Vec<DictionaryInfo>> {
        let borrow = self.context.begin_use()?;
        let _calls = borrow.lock_calls();
        let mut current = unsafe { (borrow.api().mecab_dictionary_info)(borrow.raw()) };
        if current.is_null() {
            return Err(MecabError::Analysis(
                "mecab_dictionary_info returned a null pointer".to_string(),
            ));
        }

        let mut dictionaries = Vec::new();
        while !current.is_null() {
            let info: &MecabDictionaryInfoRaw = unsafe { &*current };
            dictionaries.push(DictionaryInfo {
                filename: cstr_to_string(info.filename),
                charset: cstr_to_string(info.charset),
                size: info.size,
                dictionary_type: info.dictionary_type.into(),
                lsize: info.lsize,
                rsize: info.rsize,
                version: info.version,
            });
            current = info.next;
        }
        Ok(dictionaries)
    }

    /// Releases the native context, waiting for in-flight calls first.
    /// Later calls fail with [`MecabError::UseAfterRelease`].
    pub fn close(&self) {
        self.context.release();
    }

    /// Returns whether [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.context.is_released()
    }
}

/// A node chain returned by one analyze call, bounded by the input buffer it
/// aliases.
struct NodeGraph<'buf> {
    head: *const MecabNodeRaw,
    _input: PhantomData<&'buf [u8]>,
}

impl<'buf> NodeGraph<'buf> {
    /// # Safety
    /// `head` must be the result of analyzing `input`, and the context that
    /// produced it must not be used again while the graph is alive.
    unsafe fn new(head: *const MecabNodeRaw, _input: &'buf [u8]) -> Self {
        Self {
            head,
            _input: PhantomData,
        }
    }

    fn iter(&self) -> NodeIter<'_> {
        NodeIter {
            current: self.head,
            _graph: PhantomData,
        }
    }
}

struct NodeIter<'g> {
    current: *const MecabNodeRaw,
    _graph: PhantomData<&'g MecabNodeRaw>,
}

impl<'g> Iterator for NodeIter<'g> {
    type Item = &'g MecabNodeRaw;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        let node = unsafe { &*self.current };
        self.current = node.next;
        Some(node)
    }
}

fn collect_nodes(graph: &NodeGraph<'_>) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for raw in graph.iter() {
        match raw.stat {
            MECAB_BOS_NODE | MECAB_EOS_NODE => continue,
            stat => {
                let status = NodeStatus::from_raw(stat).ok_or_else(|| {
                    MecabError::Analysis(format!("Unsupported node type: {stat}"))
                })?;
                nodes.push(owned_node(raw, status));
            }
        }
    }
    Ok(nodes)
}

fn owned_node(raw: &MecabNodeRaw, status: NodeStatus) -> Node {
    let surface = unsafe { counted_bytes(raw.surface, usize::from(raw.length)) };
    let feature = unsafe { bounded_cstr_bytes(raw.feature, MAX_FEATURE_BYTES) };
    Node::new(
        String::from_utf8_lossy(surface).into_owned(),
        String::from_utf8_lossy(feature).into_owned(),
        status,
    )
}
