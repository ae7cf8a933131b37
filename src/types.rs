use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Controls how the native module is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Register the module's directory as a dependent-library search location
    /// before loading it. Only Windows provides this at runtime.
    pub extend_search_path: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            extend_search_path: cfg!(target_os = "windows"),
        }
    }
}

impl LoaderOptions {
    /// Sets whether the module directory is added to the search path.
    pub fn with_extend_search_path(mut self, extend_search_path: bool) -> Self {
        self.extend_search_path = extend_search_path;
        self
    }
}

/// Configuration used to construct a [`crate::Tagger`].
///
/// With every field left at its default the engine is created exactly as
/// `mecab_new(0, NULL)` would, reading its own resource file.
#[derive(Debug, Clone, Default)]
pub struct TaggerConfig {
    /// Explicit module path. When unset the process-wide library is used.
    pub library_path: Option<PathBuf>,
    /// Loader behaviour for an explicit `library_path`.
    pub loader: LoaderOptions,
    /// Resource file passed as `-r`.
    pub rc_file: Option<PathBuf>,
    /// System dictionary directory passed as `-d`.
    pub dictionary_dir: Option<PathBuf>,
    /// User dictionaries passed as a comma-joined `-u`.
    pub user_dictionaries: Vec<PathBuf>,
    /// Additional raw engine arguments, appended last.
    pub extra_args: Vec<String>,
}

impl TaggerConfig {
    /// Loads the module from `library_path` instead of the shared library.
    pub fn with_library_path(mut self, library_path: impl AsRef<Path>) -> Self {
        self.library_path = Some(library_path.as_ref().to_path_buf());
        self
    }

    /// Replaces the loader options.
    pub fn with_loader(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    /// Sets the engine resource file.
    pub fn with_rc_file(mut self, rc_file: impl AsRef<Path>) -> Self {
        self.rc_file = Some(rc_file.as_ref().to_path_buf());
        self
    }

    /// Sets the system dictionary directory.
    pub fn with_dictionary_dir(mut self, dictionary_dir: impl AsRef<Path>) -> Self {
        self.dictionary_dir = Some(dictionary_dir.as_ref().to_path_buf());
        self
    }

    /// Adds one user dictionary.
    pub fn add_user_dictionary(mut self, path: impl AsRef<Path>) -> Self {
        self.user_dictionaries.push(path.as_ref().to_path_buf());
        self
    }

    /// Appends one raw engine argument.
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Builds the argument vector handed to `mecab_new`. Empty when nothing
    /// is configured, so the engine sees `argc == 0`.
    pub(crate) fn engine_args(&self) -> Result<Vec<CString>> {
        let mut args: Vec<String> = Vec::new();
        if let Some(rc_file) = &self.rc_file {
            args.push("-r".to_string());
            args.push(rc_file.to_string_lossy().to_string());
        }
        if let Some(dictionary_dir) = &self.dictionary_dir {
            args.push("-d".to_string());
            args.push(dictionary_dir.to_string_lossy().to_string());
        }
        if !self.user_dictionaries.is_empty() {
            let joined = self
                .user_dictionaries
                .iter()
                .map(|path| path.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(",");
            args.push("-u".to_string());
            args.push(joined);
        }
        args.extend(self.extra_args.iter().cloned());

        if args.is_empty() {
            return Ok(Vec::new());
        }

        std::iter::once("mecab".to_string())
            .chain(args)
            .map(|arg| CString::new(arg).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod types_tests {
    use super::{LoaderOptions, TaggerConfig};
    use crate::MecabError;

    fn as_strings(config: &TaggerConfig) -> Vec<String> {
        config
            .engine_args()
            .expect("args should convert")
            .into_iter()
            .map(|arg| arg.into_string().expect("ascii arg"))
            .collect()
    }

    #[test]
    fn default_config_passes_no_arguments() {
        assert!(as_strings(&TaggerConfig::default()).is_empty());
    }

    #[test]
    fn configured_paths_become_engine_flags() {
        let config = TaggerConfig::default()
            .with_rc_file("/etc/mecabrc")
            .with_dictionary_dir("/var/lib/mecab/dic/ipadic-utf8")
            .add_user_dictionary("/tmp/a.dic")
            .add_user_dictionary("/tmp/b.dic")
            .add_arg("--cost-factor=700");
        assert_eq!(
            as_strings(&config),
            vec![
                "mecab",
                "-r",
                "/etc/mecabrc",
                "-d",
                "/var/lib/mecab/dic/ipadic-utf8",
                "-u",
                "/tmp/a.dic,/tmp/b.dic",
                "--cost-factor=700",
            ]
        );
    }

    #[test]
    fn interior_nul_in_argument_is_rejected() {
        let config = TaggerConfig::default().add_arg("bad\0arg");
        assert!(matches!(config.engine_args(), Err(MecabError::NulByte(3))));
    }

    #[test]
    fn loader_defaults_follow_platform_capability() {
        let options = LoaderOptions::default();
        assert_eq!(options.extend_search_path, cfg!(target_os = "windows"));
        assert!(options.with_extend_search_path(true).extend_search_path);
    }
}
