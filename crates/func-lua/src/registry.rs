//! Function registry
//!
//! Holds every loaded function by name. Readers clone an `Arc` snapshot and
//! never observe a partially loaded set: each load builds a complete new map
//! and swaps it in.

use crate::config::FuncConfig;
use crate::error::{FuncError, Result};
use crate::runtime::{load_library, LoadedLibrary};
use crate::signature::FunctionSignature;
use func_types::TypedValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

type Snapshot = Arc<BTreeMap<String, Arc<FunctionSignature>>>;

/// Outcome of one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Names registered by this load, in load order
    pub registered: Vec<String>,
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Registry of typed functions loaded from Lua sources
pub struct FunctionRegistry {
    config: FuncConfig,
    snapshot: RwLock<Snapshot>,
    /// Serializes writers so concurrent loads do not drop each other's functions
    writer: Mutex<()>,
}

impl FunctionRegistry {
    pub fn new(config: FuncConfig) -> Self {
        Self {
            config,
            snapshot: RwLock::new(Arc::new(BTreeMap::new())),
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &FuncConfig {
        &self.config
    }

    /// Current set of functions
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionSignature>> {
        self.snapshot().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Invoke a registered function by name
    pub fn invoke(&self, name: &str, args: Vec<TypedValue>) -> Result<TypedValue> {
        let function = self
            .get(name)
            .ok_or_else(|| FuncError::NotFound(name.to_string()))?;
        function.invoke(args)
    }

    /// Load one source and merge its functions into the registry
    pub fn load_source(&self, name: &str, source: &str) -> Result<LoadReport> {
        let library = load_library(name, source, &self.config)?;
        let mut report = LoadReport::default();
        self.commit(vec![library], false, &mut report);
        Ok(report)
    }

    /// Discover and load every accepted script file in a directory.
    ///
    /// Files are parsed in parallel, each on its own engine, and merged in
    /// path order. A missing directory loads nothing.
    pub async fn discover_from(&self, dir: impl AsRef<Path>) -> Result<LoadReport> {
        let dir = dir.as_ref();
        if !dir.exists() {
            debug!("Function directory does not exist: {}", dir.display());
            return Ok(LoadReport::default());
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.config.accepts(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut report = LoadReport::default();
        let libraries = self.load_files(paths, &mut report).await?;
        self.commit(libraries, false, &mut report);
        Ok(report)
    }

    /// Load the configured libraries, replacing everything registered before
    pub async fn load_configured(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let libraries = self
            .load_files(self.config.libraries.clone(), &mut report)
            .await?;
        self.commit(libraries, true, &mut report);
        Ok(report)
    }

    /// Remove every function
    pub fn clear(&self) {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(BTreeMap::new());
    }

    /// Read and parse files in parallel; results keep the order of `paths`.
    async fn load_files(
        &self,
        paths: Vec<PathBuf>,
        report: &mut LoadReport,
    ) -> Result<Vec<LoadedLibrary>> {
        let mut tasks = JoinSet::new();
        for (index, path) in paths.into_iter().enumerate() {
            let config = self.config.clone();
            tasks.spawn(async move {
                let result = load_file(&path, config).await;
                (index, path, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut libraries = Vec::with_capacity(results.len());
        for (_, path, result) in results {
            match result {
                Ok(library) => libraries.push(library),
                Err(e) if self.config.optimistic => {
                    report.warn(format!("Failed to load {}: {}", path.display(), e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(libraries)
    }

    /// Build the next snapshot and swap it in
    fn commit(&self, libraries: Vec<LoadedLibrary>, replace: bool, report: &mut LoadReport) {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        let mut next = if replace {
            BTreeMap::new()
        } else {
            (*self.snapshot()).clone()
        };

        for library in libraries {
            for warning in library.warnings {
                report.warnings.push(warning);
            }
            for function in library.functions {
                let name = function.name().to_string();
                if next.insert(name.clone(), function).is_some() {
                    report.warn(format!(
                        "Function '{}' from {} overrides an earlier definition",
                        name, library.name
                    ));
                }
                report.registered.push(name);
            }
        }

        info!("Function registry now holds {} functions", next.len());
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(next);
    }
}

async fn load_file(path: &Path, config: FuncConfig) -> Result<LoadedLibrary> {
    let source = tokio::fs::read_to_string(path).await?;
    let name = path.display().to_string();
    tokio::task::spawn_blocking(move || load_library(&name, &source, &config)).await?
}
