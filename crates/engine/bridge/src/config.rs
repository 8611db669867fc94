//! Bridge configuration
//!
//! Loaded from KDL. Keys may sit at the top level or inside a `bridge` node:
//!
//! ```kdl
//! bridge {
//!     namespace "UE"
//!     max-reentry-depth 64
//!     strict-integers #true
//!     capture-traceback #true
//!     trace-marshalling #false
//! }
//! ```

use crate::{Error, Result};
use std::path::Path;

/// Runtime settings of a [`crate::ScriptRuntime`]
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Global table that `require` installs types into
    pub namespace: String,
    /// Nested calls through one function beyond this depth fail
    pub max_reentry_depth: usize,
    /// Out-of-range integers are a type mismatch instead of being truncated
    pub strict_integers: bool,
    /// Attach the Lua traceback to error reports
    pub capture_traceback: bool,
    /// Log every value crossing at trace level
    pub trace_marshalling: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: "UE".to_string(),
            max_reentry_depth: 64,
            strict_integers: true,
            capture_traceback: true,
            trace_marshalling: false,
        }
    }
}

impl BridgeConfig {
    /// Load from a KDL file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_kdl_str(&content)
    }

    /// Parse a KDL document; unknown keys are ignored, missing keys keep defaults
    pub fn from_kdl_str(content: &str) -> Result<Self> {
        let doc: kdl::KdlDocument = content.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            if node.name().value() == "bridge" {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        config.apply(child)?;
                    }
                }
            } else {
                config.apply(node)?;
            }
        }

        if config.namespace.is_empty() {
            return Err(Error::InvalidConfig("namespace must not be empty".into()));
        }
        if config.max_reentry_depth == 0 {
            return Err(Error::InvalidConfig(
                "max-reentry-depth must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    fn apply(&mut self, node: &kdl::KdlNode) -> Result<()> {
        let key = node.name().value();
        let Some(value) = node
            .entries()
            .iter()
            .find(|e| e.name().is_none())
            .map(|e| e.value())
        else {
            return Ok(());
        };

        match key {
            "namespace" => self.namespace = expect_string(key, value)?,
            "max-reentry-depth" => {
                let depth = expect_integer(key, value)?;
                self.max_reentry_depth = usize::try_from(depth)
                    .map_err(|_| Error::InvalidConfig(format!("{key}: {depth} is out of range")))?;
            }
            "strict-integers" => self.strict_integers = expect_bool(key, value)?,
            "capture-traceback" => self.capture_traceback = expect_bool(key, value)?,
            "trace-marshalling" => self.trace_marshalling = expect_bool(key, value)?,
            other => tracing::debug!("ignoring unknown bridge config key {}", other),
        }
        Ok(())
    }
}

fn expect_string(key: &str, value: &kdl::KdlValue) -> Result<String> {
    match value {
        kdl::KdlValue::String(s) => Ok(s.clone()),
        other => Err(Error::InvalidConfig(format!(
            "{key}: expected a string, got {other:?}"
        ))),
    }
}

fn expect_integer(key: &str, value: &kdl::KdlValue) -> Result<i128> {
    match value {
        kdl::KdlValue::Integer(i) => Ok(*i),
        other => Err(Error::InvalidConfig(format!(
            "{key}: expected an integer, got {other:?}"
        ))),
    }
}

fn expect_bool(key: &str, value: &kdl::KdlValue) -> Result<bool> {
    match value {
        kdl::KdlValue::Bool(b) => Ok(*b),
        other => Err(Error::InvalidConfig(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}
