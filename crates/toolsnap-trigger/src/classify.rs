//! Tool classification for snapshot triggering.
//!
//! Snapshots only pay off around executions that can modify files, so
//! each tool name maps to a [`ToolProfile`]. Unknown tools are assumed
//! to modify files; a wasted snapshot is cheaper than a missed one.

use serde_json::Value;
use std::collections::HashMap;

/// How a tool interacts with the file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolProfile {
    /// Whether executions of this tool can modify files.
    pub modifies_files: bool,
    /// Argument keys naming the files a call is about to touch.
    pub target_args: Vec<String>,
}

impl ToolProfile {
    /// Profile for a tool that modifies files.
    pub fn modifying(target_args: &[&str]) -> Self {
        Self {
            modifies_files: true,
            target_args: target_args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Profile for a tool that never modifies files.
    pub fn read_only() -> Self {
        Self {
            modifies_files: false,
            target_args: Vec::new(),
        }
    }
}

/// Catalog mapping tool names to their profiles.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    profiles: HashMap<String, ToolProfile>,
    /// Applied to tools the catalog does not know.
    fallback: ToolProfile,
}

impl ToolCatalog {
    /// Empty catalog; every tool gets the modifying fallback.
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            fallback: ToolProfile::modifying(&[]),
        }
    }

    /// Catalog pre-populated with the common coding-assistant tools.
    ///
    /// File-path argument keys cover both camelCase and snake_case
    /// host conventions.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        let path_args = ["filePath", "file_path", "path"];

        for tool in ["write", "edit", "multiedit"] {
            catalog.insert(tool, ToolProfile::modifying(&path_args));
        }
        // These can touch arbitrary files the arguments don't name
        for tool in ["patch", "bash"] {
            catalog.insert(tool, ToolProfile::modifying(&[]));
        }
        for tool in ["read", "glob", "grep", "list", "search", "webfetch", "todo"] {
            catalog.insert(tool, ToolProfile::read_only());
        }

        catalog
    }

    /// Register or replace a profile.
    pub fn insert(&mut self, name: impl Into<String>, profile: ToolProfile) {
        self.profiles.insert(name.into(), profile);
    }

    /// Profile for a tool name, falling back for unknown tools.
    pub fn profile(&self, name: &str) -> &ToolProfile {
        self.profiles.get(name).unwrap_or(&self.fallback)
    }

    /// Whether executions of `name` can modify files.
    pub fn is_modifying(&self, name: &str) -> bool {
        self.profile(name).modifies_files
    }

    /// Extract the target paths a call declares in its arguments.
    ///
    /// String values are taken as-is; arrays contribute each string
    /// element. Duplicates are dropped, first occurrence wins.
    pub fn targets(&self, name: &str, arguments: &Value) -> Vec<String> {
        let mut targets = Vec::new();
        for key in &self.profile(name).target_args {
            match arguments.get(key) {
                Some(Value::String(path)) => push_unique(&mut targets, path),
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Some(path) = item.as_str() {
                            push_unique(&mut targets, path);
                        }
                    }
                }
                _ => {}
            }
        }
        targets
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn push_unique(targets: &mut Vec<String>, path: &str) {
    if !targets.iter().any(|t| t == path) {
        targets.push(path.to_string());
    }
}
