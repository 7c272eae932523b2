//! Request-path to script-location resolution.

use std::collections::HashMap;

/// Default extension appended under [`ScriptRoute::RootPath`].
pub const DEFAULT_EXTENSION: &str = ".js";

/// One of the two configured resolution strategies. Resolution is a pure
/// function of the request path.
#[derive(Debug, Clone)]
pub enum ScriptRoute {
    /// Resolved location = `root + request_path + extension`. An empty
    /// extension appends nothing.
    RootPath { root: String, extension: String },
    /// Static map from exact request path to a target location. A miss
    /// resolves to `None`; the worker then fails module resolution and the
    /// request surfaces as a 404.
    UrlMap(HashMap<String, String>),
}

impl ScriptRoute {
    pub fn root_path(root: impl Into<String>) -> Self {
        Self::RootPath {
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn resolve(&self, path: &str) -> Option<String> {
        match self {
            Self::RootPath { root, extension } => Some(format!("{root}{path}{extension}")),
            Self::UrlMap(map) => map.get(path).cloned(),
        }
    }
}
