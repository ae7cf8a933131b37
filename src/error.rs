/// Error type returned by mecab-rs public APIs.
///
/// Loading, binding and version errors are produced while the process-wide
/// function table is built; once that fails every later attempt reports the
/// same error, which is why the type is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MecabError {
    /// Native module could not be found or loaded.
    #[error("failed to load library: {0}")]
    Load(String),
    /// The platform lacks the loader capabilities that were requested.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    /// Required symbol could not be resolved from the library.
    #[error("failed to bind symbol: {0}")]
    Binding(String),
    /// The engine reported a version this crate does not support.
    #[error("unsupported mecab version: expected {expected}, found {actual}")]
    VersionMismatch {
        /// Version string this crate is built against.
        expected: String,
        /// Version string reported by the loaded engine.
        actual: String,
    },
    /// The dictionary declares a charset other than UTF-8.
    #[error("unsupported dictionary charset: {0}")]
    UnsupportedCharset(String),
    /// The engine failed to create an analysis context.
    #[error("failed to create tagger: {0}")]
    Creation(String),
    /// The analyze call failed or produced an unexpected graph.
    #[error("mecab analysis error: {0}")]
    Analysis(String),
    /// The tagger was used after its native context was released.
    #[error("tagger used after release")]
    UseAfterRelease,
    /// Rust string contained an interior `NUL` byte for C interop.
    #[error("string contains NUL byte at position {0}")]
    NulByte(usize),
    /// User-provided arguments were invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::ffi::NulError> for MecabError {
    fn from(value: std::ffi::NulError) -> Self {
        MecabError::NulByte(value.nul_position())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MecabError>;
