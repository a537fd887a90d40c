//! Compiler options

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::{Error, Result};

/// Opt levels below this skip constant folding
pub const FOLD_MIN_LEVEL: u8 = 3;
/// Opt levels below this skip function inlining
pub const INLINE_MIN_LEVEL: u8 = 5;

/// Options for one compilation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Bound on unrolled loop body copies for a whole unit, nested loops included
    pub max_loop_iterations: usize,
    /// Extra directories searched by `require`
    pub library_paths: Vec<PathBuf>,
    pub opt_level: u8,
    /// Prefix the output with a generated-file comment
    pub warning_banner: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1024,
            library_paths: Vec::new(),
            opt_level: 7,
            warning_banner: false,
        }
    }
}

impl CompileOptions {
    /// Defaults of the command line, which marks its output as generated
    pub fn cli_default() -> Self {
        Self {
            warning_banner: true,
            ..Self::default()
        }
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Io(format!("invalid options: {}", e)))
    }

    pub fn folding_enabled(&self) -> bool {
        self.opt_level >= FOLD_MIN_LEVEL
    }

    pub fn inlining_enabled(&self) -> bool {
        self.opt_level >= INLINE_MIN_LEVEL
    }

    /// Append the colon separated entries of a `JSLIB`-style variable
    pub fn extend_library_paths(&mut self, list: &str) {
        for entry in list.split(':').filter(|e| !e.is_empty()) {
            let path = PathBuf::from(entry);
            if !self.library_paths.contains(&path) {
                self.library_paths.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::default();
        assert_eq!(options.max_loop_iterations, 1024);
        assert!(options.folding_enabled());
        assert!(options.inlining_enabled());
    }

    #[test]
    fn test_cli_default_has_banner() {
        assert!(!CompileOptions::default().warning_banner);
        let cli = CompileOptions::cli_default();
        assert!(cli.warning_banner);
        assert_eq!(cli.max_loop_iterations, CompileOptions::default().max_loop_iterations);
    }

    #[test]
    fn test_partial_json() {
        let options = CompileOptions::from_json(r#"{ "opt_level": 4 }"#).unwrap();
        assert_eq!(options.opt_level, 4);
        assert_eq!(options.max_loop_iterations, 1024);
        assert!(options.folding_enabled());
        assert!(!options.inlining_enabled());
        assert!(CompileOptions::from_json(r#"{ "bogus": 1 }"#).is_err());
    }

    #[test]
    fn test_library_path_list() {
        let mut options = CompileOptions::default();
        options.extend_library_paths("/a:/b::/a");
        assert_eq!(options.library_paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
