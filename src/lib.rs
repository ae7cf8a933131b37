#![deny(missing_docs)]

//! Rust bindings for the MeCab morphological analyzer.
//!
//! The engine is loaded at runtime from its shared library, so no MeCab
//! headers or link-time dependency are needed to build this crate. Only
//! MeCab 0.996 with a UTF-8 system dictionary is supported.
//!
//! ## Quick Start
//! ```no_run
//! use mecab_rs::Tagger;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tagger = Tagger::new()?;
//!     for node in tagger.parse("すもももももももものうち")? {
//!         println!("{}\t{}", node.text(), node.feature());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Loading Paths
//! 1. Shared library via [`Tagger::new`] or [`MecabLibrary::shared`]
//!   - Loaded once per process; a failed load is reported on every later call.
//! 2. Explicit setup via [`Tagger::from_config`] or [`MecabLibrary::load`]
//!   - For deployments with a fixed library path and dictionary.
//!
//! ```no_run
//! use mecab_rs::{MecabLibrary, TaggerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let library = MecabLibrary::load("/opt/mecab/lib/libmecab.so.2")?;
//!     let config = TaggerConfig::default()
//!         .with_dictionary_dir("/opt/mecab/lib/mecab/dic/ipadic")
//!         .add_user_dictionary("/opt/mecab/user.dic");
//!     let tagger = library.tagger(&config)?;
//!     let _nodes = tagger.parse("形態素解析の例")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Node Fields
//! [`Node::text`] is the exact slice of the input the morpheme covers;
//! concatenating the texts of all nodes gives back the input minus the
//! whitespace the engine skipped. The named feature fields are only filled
//! for IPADIC-style features with exactly nine columns.
//!
//! ## Environment Variables
//! - `MECAB_LIBRARY_PATH`: explicit dynamic library path.
//! - `MECABRC`: resource file; the library is looked up relative to it.

mod constants;
mod discovery;
mod error;
mod handle;
mod model;
mod native;
mod runtime;
mod types;

pub use constants::*;
pub use error::{MecabError, Result};
pub use model::{DictionaryInfo, DictionaryType, Node, NodeStatus};
pub use runtime::{MecabLibrary, Tagger};
pub use types::{LoaderOptions, TaggerConfig};

#[cfg(test)]
mod test_support;
