//! Built-in tools
//!
//! A small set of file tools so tool subtasks have something to run
//! out of the box.

use crate::error::{Error, Result};
use crate::registry::ToolRegistry;
use crate::tool::{RiskLevel, Tool, ToolDefinition, ToolResult};
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Register every built-in tool rooted at `workspace`
pub fn register_builtins(registry: &mut ToolRegistry, workspace: impl Into<PathBuf>) {
    let workspace = workspace.into();
    registry.register(Arc::new(EchoTool::new()));
    registry.register(Arc::new(ReadFileTool::new(workspace.clone())));
    registry.register(Arc::new(WriteFileTool::new(workspace)));
}

/// Resolve `relative` inside `root`, rejecting absolute paths and `..`
fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::PermissionDenied(format!(
            "path '{relative}' escapes the workspace"
        )));
    }
    Ok(root.join(path))
}

fn str_arg<'a>(input: &'a Value, name: &str) -> Result<&'a str> {
    input[name]
        .as_str()
        .ok_or_else(|| Error::InvalidInput(format!("'{name}' must be a string")))
}

// ============================================================================
// echo
// ============================================================================

/// Returns its `text` argument
pub struct EchoTool {
    def: ToolDefinition,
}

impl EchoTool {
    /// Create the tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            def: ToolDefinition::new("echo", "Return the given text unchanged").with_parameters(
                json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
            ),
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        Ok(ToolResult::success(json!(str_arg(&input, "text")?), 0))
    }
}

// ============================================================================
// read_file
// ============================================================================

/// Reads a UTF-8 file under the workspace
pub struct ReadFileTool {
    def: ToolDefinition,
    root: PathBuf,
}

impl ReadFileTool {
    /// Create the tool rooted at `root`
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            def: ToolDefinition::new("read_file", "Read a text file from the workspace")
                .with_parameters(json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"]
                }))
                .with_risk_level(RiskLevel::Low),
            root,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let start = Instant::now();
        let path = resolve(&self.root, str_arg(&input, "path")?)?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(ToolResult::success(
            json!(content),
            start.elapsed().as_millis() as u64,
        ))
    }
}

// ============================================================================
// write_file
// ============================================================================

/// Writes a file under the workspace. High risk: needs approval.
pub struct WriteFileTool {
    def: ToolDefinition,
    root: PathBuf,
}

impl WriteFileTool {
    /// Create the tool rooted at `root`
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            def: ToolDefinition::new("write_file", "Write a text file in the workspace")
                .with_parameters(json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"}
                    },
                    "required": ["path", "content"]
                }))
                .with_risk_level(RiskLevel::High),
            root,
        }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let start = Instant::now();
        let path = resolve(&self.root, str_arg(&input, "path")?)?;
        let content = str_arg(&input, "content")?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(ToolResult::success(
            json!({"written": content.len()}),
            start.elapsed().as_millis() as u64,
        ))
    }
}
