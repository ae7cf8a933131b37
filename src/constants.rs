//! Constants mirrored from the MeCab C API.

/// The only engine version whose structure layouts this crate knows.
pub const MECAB_SUPPORTED_VERSION: &str = "0.996";

/// Node status: normal node defined in the dictionary.
pub const MECAB_NOR_NODE: u8 = 0;
/// Node status: unknown node not defined in the dictionary.
pub const MECAB_UNK_NODE: u8 = 1;
/// Node status: virtual node representing the beginning of the sentence.
pub const MECAB_BOS_NODE: u8 = 2;
/// Node status: virtual node representing the end of the sentence.
pub const MECAB_EOS_NODE: u8 = 3;
/// Node status: virtual node representing the end of an N-best enumeration.
pub const MECAB_EON_NODE: u8 = 4;

/// Dictionary type: system dictionary.
pub const MECAB_SYS_DIC: i32 = 0;
/// Dictionary type: user dictionary.
pub const MECAB_USR_DIC: i32 = 1;
/// Dictionary type: unknown word dictionary.
pub const MECAB_UNK_DIC: i32 = 2;

/// Number of comma-separated fields in an IPADIC-style feature string.
pub const FEATURE_FIELD_COUNT: usize = 9;

/// Upper bound when scanning a feature string for its terminator.
pub(crate) const MAX_FEATURE_BYTES: usize = 1 << 16;

pub(crate) const UNKNOWN_VERSION: &str = "<unknown>";
