//! Script path resolution.
//!
//! A single script root holds the primary script and an optional debug
//! variant. The debug variant wins whenever it is present on disk.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// File name of the primary inference script.
pub const PRIMARY_SCRIPT: &str = "predict.py";

/// File name of the optional debug script.
pub const DEBUG_SCRIPT: &str = "debug_predict.py";

/// Existence check used to pick a script.
pub trait ScriptLocator: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// [`ScriptLocator`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsScriptLocator;

impl ScriptLocator for FsScriptLocator {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Candidate script paths under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    pub debug: PathBuf,
    pub primary: PathBuf,
}

/// The script chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSelection {
    pub path: PathBuf,
    pub is_debug: bool,
}

/// Resolved paths and their existence flags, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReport {
    pub script_path: PathBuf,
    pub debug_script_path: PathBuf,
    pub scripts_exist: ScriptsExist,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScriptsExist {
    pub original: bool,
    pub debug: bool,
}

impl ScriptPaths {
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            debug: root.join(DEBUG_SCRIPT),
            primary: root.join(PRIMARY_SCRIPT),
        }
    }

    /// Pick the debug script if it exists, otherwise the primary script.
    ///
    /// The primary script is returned even when it is missing; the interpreter
    /// then reports the problem through its exit status.
    pub fn select(&self, locator: &dyn ScriptLocator) -> ScriptSelection {
        if locator.exists(&self.debug) {
            ScriptSelection {
                path: self.debug.clone(),
                is_debug: true,
            }
        } else {
            ScriptSelection {
                path: self.primary.clone(),
                is_debug: false,
            }
        }
    }

    pub fn report(&self, locator: &dyn ScriptLocator) -> ScriptReport {
        ScriptReport {
            script_path: self.primary.clone(),
            debug_script_path: self.debug.clone(),
            scripts_exist: ScriptsExist {
                original: locator.exists(&self.primary),
                debug: locator.exists(&self.debug),
            },
        }
    }
}
