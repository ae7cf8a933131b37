use crate::constants::{
    FEATURE_FIELD_COUNT, MECAB_NOR_NODE, MECAB_SYS_DIC, MECAB_UNK_DIC, MECAB_UNK_NODE,
    MECAB_USR_DIC,
};

/// Classification of a lexical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Word found in a dictionary.
    Normal,
    /// Word synthesized by the unknown-word processor.
    Unknown,
}

impl NodeStatus {
    pub(crate) fn from_raw(stat: u8) -> Option<Self> {
        match stat {
            MECAB_NOR_NODE => Some(Self::Normal),
            MECAB_UNK_NODE => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One morpheme of an analysis result.
///
/// Owns all of its text; nothing here refers back to engine memory. The
/// nine named fields follow the IPADIC feature layout and are only filled
/// when the feature string has exactly nine comma-separated fields, with
/// `*` placeholders read as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    text: String,
    feature: String,
    status: NodeStatus,
    fields: [String; FEATURE_FIELD_COUNT],
}

impl Node {
    /// Builds a node, decomposing `feature` into its named fields.
    pub fn new(text: impl Into<String>, feature: impl Into<String>, status: NodeStatus) -> Self {
        let feature = feature.into();
        let fields = split_feature(&feature);
        Self {
            text: text.into(),
            feature,
            status,
            fields,
        }
    }

    /// Surface text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw feature string as reported by the dictionary.
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Whether the word came from a dictionary or the unknown-word processor.
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// All nine named fields in feature order.
    pub fn fields(&self) -> &[String; FEATURE_FIELD_COUNT] {
        &self.fields
    }

    /// Part of speech (品詞).
    pub fn part_of_speech(&self) -> &str {
        &self.fields[0]
    }

    /// First part-of-speech sub-classification.
    pub fn subclass1(&self) -> &str {
        &self.fields[1]
    }

    /// Second part-of-speech sub-classification.
    pub fn subclass2(&self) -> &str {
        &self.fields[2]
    }

    /// Third part-of-speech sub-classification.
    pub fn subclass3(&self) -> &str {
        &self.fields[3]
    }

    /// Conjugated form, the fifth feature column.
    pub fn conjugated_form(&self) -> &str {
        &self.fields[4]
    }

    /// Inflection type, the sixth feature column.
    pub fn inflection(&self) -> &str {
        &self.fields[5]
    }

    /// Dictionary base form.
    pub fn base_form(&self) -> &str {
        &self.fields[6]
    }

    /// Reading.
    pub fn reading(&self) -> &str {
        &self.fields[7]
    }

    /// Pronunciation.
    pub fn pronunciation(&self) -> &str {
        &self.fields[8]
    }
}

// Unknown-word features usually carry fewer fields; those end up empty too.
fn split_feature(feature: &str) -> [String; FEATURE_FIELD_COUNT] {
    let parts: Vec<&str> = feature.split(',').collect();
    if parts.len() != FEATURE_FIELD_COUNT {
        return Default::default();
    }
    let mut fields: [String; FEATURE_FIELD_COUNT] = Default::default();
    for (slot, part) in fields.iter_mut().zip(parts) {
        if part != "*" {
            *slot = part.to_string();
        }
    }
    fields
}

/// Kind of a loaded dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryType {
    /// System dictionary.
    System,
    /// User dictionary.
    User,
    /// Unknown-word definitions.
    Unknown,
    /// A value this crate does not recognize.
    Other(i32),
}

impl From<i32> for DictionaryType {
    fn from(value: i32) -> Self {
        match value {
            MECAB_SYS_DIC => Self::System,
            MECAB_USR_DIC => Self::User,
            MECAB_UNK_DIC => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

/// Owned snapshot of one entry of the engine's dictionary list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryInfo {
    /// Dictionary file name.
    pub filename: String,
    /// Declared charset, e.g. `UTF-8`.
    pub charset: String,
    /// Number of registered words.
    pub size: u32,
    /// Dictionary kind.
    pub dictionary_type: DictionaryType,
    /// Left context attribute count.
    pub lsize: u32,
    /// Right context attribute count.
    pub rsize: u32,
    /// Dictionary format version.
    pub version: u16,
}
