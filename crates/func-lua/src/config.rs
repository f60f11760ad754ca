//! Loader configuration
//!
//! ```toml
//! optimistic = true
//! doc_comments = true
//! sandboxed = false
//! extensions = ["lua"]
//! libraries = ["scripts/math.lua", "scripts/strings.lua"]
//! ```

use crate::error::{FuncError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How script sources are loaded into typed functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncConfig {
    /// Report registration failures as warnings instead of aborting the load
    #[serde(default = "default_true")]
    pub optimistic: bool,

    /// Read documentation blocks as a source of argument types
    #[serde(default = "default_true")]
    pub doc_comments: bool,

    /// Restrict scripts to the table, string, math and utf8 libraries
    #[serde(default)]
    pub sandboxed: bool,

    /// File extensions picked up by directory discovery
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Script files loaded by `FunctionRegistry::load_configured`
    #[serde(default)]
    pub libraries: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["lua".to_string()]
}

impl Default for FuncConfig {
    fn default() -> Self {
        Self {
            optimistic: true,
            doc_comments: true,
            sandboxed: false,
            extensions: default_extensions(),
            libraries: Vec::new(),
        }
    }
}

impl FuncConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| FuncError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// Relative library paths are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&source)
            .map_err(|e| FuncError::Config(format!("{}: {}", path.display(), e)))?;

        if let Some(base) = path.parent() {
            for library in &mut config.libraries {
                if library.is_relative() {
                    *library = base.join(&*library);
                }
            }
        }
        Ok(config)
    }

    /// Whether discovery should pick up `path`
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}
