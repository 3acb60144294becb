//! Sandboxed filesystem tool.
//!
//! Every path is resolved (symlinks followed for the existing prefix) and
//! checked against an allowlist and denylist of resolved prefixes before
//! any operation runs. Denials are error results, not panics.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::definition::{ToolParameter, ToolResult};
use crate::{Arguments, Tool, ToolKind};

const OPERATIONS: [&str; 7] = [
    "read_file",
    "write_file",
    "list_directory",
    "create_directory",
    "delete_file",
    "file_exists",
    "get_file_info",
];

/// Built-in tool for file and directory operations, sandboxed to a set of
/// allowed path prefixes (default: the user's home directory).
pub struct FilesystemTool {
    allowed_paths: Vec<PathBuf>,
    denied_paths: Vec<PathBuf>,
}

impl FilesystemTool {
    /// Create a tool sandboxed to the user's home directory.
    #[must_use]
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        Self::with_paths(vec![home], Vec::new())
    }

    /// Create a tool with explicit allow/deny prefixes. Prefixes are
    /// resolved at construction so symlinked configurations behave the
    /// same as their targets.
    #[must_use]
    pub fn with_paths(allowed_paths: Vec<PathBuf>, denied_paths: Vec<PathBuf>) -> Self {
        let resolve_all = |paths: Vec<PathBuf>| {
            paths
                .into_iter()
                .map(|p| resolve_path(&p).unwrap_or(p))
                .collect::<Vec<_>>()
        };
        let tool = Self {
            allowed_paths: resolve_all(allowed_paths),
            denied_paths: resolve_all(denied_paths),
        };
        tracing::info!(allowed = ?tool.allowed_paths, "initialized filesystem tool");
        tool
    }

    fn validate_path(&self, path: &str) -> Result<PathBuf, String> {
        let resolved = resolve_path(Path::new(path)).map_err(|e| format!("Invalid path: {e}"))?;

        if self.denied_paths.iter().any(|d| resolved.starts_with(d)) {
            return Err("Access denied: path is in denied location".into());
        }
        if !self.allowed_paths.iter().any(|a| resolved.starts_with(a)) {
            return Err("Access denied: path is outside allowed locations".into());
        }
        Ok(resolved)
    }
}

impl Default for FilesystemTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Perform filesystem operations like reading/writing files, \
         listing directories, and managing file metadata."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("operation", "string", "The filesystem operation to perform")
                .required(true)
                .enum_values(OPERATIONS.iter().map(|op| json!(op)).collect()),
            ToolParameter::new("path", "string", "Path to the file or directory").required(true),
            ToolParameter::new("content", "string", "Content to write (for write_file)"),
            ToolParameter::new(
                "create_parents",
                "boolean",
                "Create parent directories if they don't exist (for write_file and create_directory)",
            )
            .default_value(json!(false)),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> ToolResult {
        let operation = arguments
            .get("operation")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let resolved = match self.validate_path(path) {
            Ok(resolved) => resolved,
            Err(message) => return ToolResult::error(self.name(), message),
        };

        match operation.as_str() {
            "read_file" => read_file(&resolved).await,
            "write_file" => {
                let content = arguments
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let create_parents = arguments
                    .get("create_parents")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                write_file(&resolved, content, create_parents).await
            }
            "list_directory" => list_directory(&resolved).await,
            "create_directory" => {
                let create_parents = arguments
                    .get("create_parents")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                create_directory(&resolved, create_parents).await
            }
            "delete_file" => delete_file(&resolved).await,
            "file_exists" => file_exists(&resolved).await,
            "get_file_info" => get_file_info(&resolved).await,
            other => ToolResult::error(self.name(), format!("Unknown operation: {other}")),
        }
    }
}

/// Resolve a path, following symlinks for the part that exists. The
/// non-existent tail (e.g. a file about to be written) is appended to the
/// resolved ancestor.
fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(_) => {
            let parent = path.parent().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
            })?;
            let name = path.file_name().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
            })?;
            Ok(resolve_path(parent)?.join(name))
        }
    }
}

async fn read_file(path: &Path) -> ToolResult {
    if !path.exists() {
        return ToolResult::error("filesystem", format!("File not found: {}", path.display()));
    }
    if !path.is_file() {
        return ToolResult::error(
            "filesystem",
            format!("Path is not a file: {}", path.display()),
        );
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(content) => {
                let size = content.len();
                ToolResult::success("filesystem", json!(content))
                    .with_metadata("path", json!(path.display().to_string()))
                    .with_metadata("size", json!(size))
            }
            Err(from_utf8) => {
                let bytes = from_utf8.into_bytes();
                ToolResult::success(
                    "filesystem",
                    json!(format!("<binary file, {} bytes>", bytes.len())),
                )
                .with_metadata("path", json!(path.display().to_string()))
                .with_metadata("size", json!(bytes.len()))
                .with_metadata("binary", json!(true))
            }
        },
        Err(e) => ToolResult::error("filesystem", format!("Operation failed: {e}")),
    }
}

async fn write_file(path: &Path, content: &str, create_parents: bool) -> ToolResult {
    if let Some(parent) = path.parent() {
        if create_parents {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error("filesystem", format!("Operation failed: {e}"));
            }
        } else if !parent.exists() {
            return ToolResult::error(
                "filesystem",
                format!("Parent directory does not exist: {}", parent.display()),
            );
        }
    }

    match tokio::fs::write(path, content).await {
        Ok(()) => ToolResult::success(
            "filesystem",
            json!(format!("File written successfully: {}", path.display())),
        )
        .with_metadata("path", json!(path.display().to_string()))
        .with_metadata("size", json!(content.len())),
        Err(e) => ToolResult::error("filesystem", format!("Operation failed: {e}")),
    }
}

async fn list_directory(path: &Path) -> ToolResult {
    if !path.exists() {
        return ToolResult::error(
            "filesystem",
            format!("Directory not found: {}", path.display()),
        );
    }
    if !path.is_dir() {
        return ToolResult::error(
            "filesystem",
            format!("Path is not a directory: {}", path.display()),
        );
    }

    let mut read_dir = match tokio::fs::read_dir(path).await {
        Ok(read_dir) => read_dir,
        Err(e) => return ToolResult::error("filesystem", format!("Operation failed: {e}")),
    };

    let mut entries = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let entry_path = entry.path();
        let is_dir = entry_path.is_dir();
        let mut item = json!({
            "name": entry.file_name().to_string_lossy(),
            "type": if is_dir { "directory" } else { "file" },
            "path": entry_path.display().to_string(),
        });
        if !is_dir && let Ok(metadata) = entry.metadata().await {
            item["size"] = json!(metadata.len());
        }
        entries.push(item);
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    let count = entries.len();
    ToolResult::success("filesystem", Value::Array(entries))
        .with_metadata("path", json!(path.display().to_string()))
        .with_metadata("count", json!(count))
}

async fn create_directory(path: &Path, create_parents: bool) -> ToolResult {
    if path.exists() {
        return ToolResult::error(
            "filesystem",
            format!("Path already exists: {}", path.display()),
        );
    }
    let result = if create_parents {
        tokio::fs::create_dir_all(path).await
    } else {
        tokio::fs::create_dir(path).await
    };
    match result {
        Ok(()) => ToolResult::success(
            "filesystem",
            json!(format!("Directory created: {}", path.display())),
        )
        .with_metadata("path", json!(path.display().to_string())),
        Err(e) => ToolResult::error("filesystem", format!("Operation failed: {e}")),
    }
}

async fn delete_file(path: &Path) -> ToolResult {
    if !path.exists() {
        return ToolResult::error("filesystem", format!("File not found: {}", path.display()));
    }
    if path.is_dir() {
        return ToolResult::error(
            "filesystem",
            format!(
                "Cannot delete directory with delete_file operation: {}",
                path.display()
            ),
        );
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => ToolResult::success("filesystem", json!(format!("File deleted: {}", path.display())))
            .with_metadata("path", json!(path.display().to_string())),
        Err(e) => ToolResult::error("filesystem", format!("Operation failed: {e}")),
    }
}

async fn file_exists(path: &Path) -> ToolResult {
    let exists = path.exists();
    let file_type = if !exists {
        Value::Null
    } else if path.is_file() {
        json!("file")
    } else if path.is_dir() {
        json!("directory")
    } else {
        json!("symlink")
    };

    ToolResult::success("filesystem", json!(exists))
        .with_metadata("path", json!(path.display().to_string()))
        .with_metadata("exists", json!(exists))
        .with_metadata("type", file_type)
}

async fn get_file_info(path: &Path) -> ToolResult {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => {
            return ToolResult::error("filesystem", format!("File not found: {}", path.display()));
        }
    };

    let modified = metadata
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

    let mut info = json!({
        "path": path.display().to_string(),
        "name": path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        "type": if metadata.is_dir() { "directory" } else { "file" },
        "size": metadata.len(),
        "modified": modified,
    });

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        info["permissions"] = json!(format!("{:03o}", metadata.permissions().mode() & 0o777));
    }

    let metadata_map = info.as_object().cloned().unwrap_or_default();
    let mut result = ToolResult::success("filesystem", info);
    result.metadata = metadata_map;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn tool_for(dir: &TempDir) -> FilesystemTool {
        FilesystemTool::with_paths(vec![dir.path().to_path_buf()], Vec::new())
    }

    fn args(pairs: &[(&str, Value)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let file = dir.path().join("note.txt");

        let result = tool
            .execute(args(&[
                ("operation", json!("write_file")),
                ("path", json!(file.display().to_string())),
                ("content", json!("hello world")),
            ]))
            .await;
        assert!(result.is_success(), "write failed: {:?}", result.error);

        let result = tool
            .execute(args(&[
                ("operation", json!("read_file")),
                ("path", json!(file.display().to_string())),
            ]))
            .await;
        assert!(result.is_success());
        assert_eq!(result.output, Some(json!("hello world")));
    }

    #[tokio::test]
    async fn path_outside_allowlist_is_denied() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);

        let result = tool
            .execute(args(&[
                ("operation", json!("read_file")),
                ("path", json!("/etc/passwd")),
            ]))
            .await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().starts_with("Access denied"));
    }

    #[tokio::test]
    async fn denied_prefix_wins_over_allowed() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret");
        std::fs::create_dir(&secret).unwrap();
        let tool =
            FilesystemTool::with_paths(vec![dir.path().to_path_buf()], vec![secret.clone()]);

        let result = tool
            .execute(args(&[
                ("operation", json!("read_file")),
                ("path", json!(secret.join("key").display().to_string())),
            ]))
            .await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("denied location"));
    }

    #[tokio::test]
    async fn binary_read_returns_descriptor() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let file = dir.path().join("blob.bin");
        std::fs::write(&file, [0xFF, 0xFE, 0x00, 0x80]).unwrap();

        let result = tool
            .execute(args(&[
                ("operation", json!("read_file")),
                ("path", json!(file.display().to_string())),
            ]))
            .await;
        assert!(result.is_success());
        assert_eq!(result.output, Some(json!("<binary file, 4 bytes>")));
        assert_eq!(result.metadata["binary"], json!(true));
    }

    #[tokio::test]
    async fn write_without_parent_fails_unless_create_parents() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let nested = dir.path().join("a/b/c.txt");

        let result = tool
            .execute(args(&[
                ("operation", json!("write_file")),
                ("path", json!(nested.display().to_string())),
                ("content", json!("x")),
            ]))
            .await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("Parent directory"));

        let result = tool
            .execute(args(&[
                ("operation", json!("write_file")),
                ("path", json!(nested.display().to_string())),
                ("content", json!("x")),
                ("create_parents", json!(true)),
            ]))
            .await;
        assert!(result.is_success());
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn list_directory_sorted_with_types() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        std::fs::write(dir.path().join("b.txt"), "bb").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let result = tool
            .execute(args(&[
                ("operation", json!("list_directory")),
                ("path", json!(dir.path().display().to_string())),
            ]))
            .await;
        assert!(result.is_success());
        let entries = result.output.unwrap();
        assert_eq!(entries[0]["name"], "a");
        assert_eq!(entries[0]["type"], "directory");
        assert_eq!(entries[1]["name"], "b.txt");
        assert_eq!(entries[1]["size"], 2);
        assert_eq!(result.metadata["count"], json!(2));
    }

    #[tokio::test]
    async fn delete_file_refuses_directories() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let result = tool
            .execute(args(&[
                ("operation", json!("delete_file")),
                ("path", json!(sub.display().to_string())),
            ]))
            .await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("Cannot delete directory"));
        assert!(sub.exists());
    }

    #[tokio::test]
    async fn file_exists_reports_type() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let file = dir.path().join("here.txt");
        std::fs::write(&file, "x").unwrap();

        let result = tool
            .execute(args(&[
                ("operation", json!("file_exists")),
                ("path", json!(file.display().to_string())),
            ]))
            .await;
        assert_eq!(result.output, Some(json!(true)));
        assert_eq!(result.metadata["type"], json!("file"));

        let result = tool
            .execute(args(&[
                ("operation", json!("file_exists")),
                ("path", json!(dir.path().join("missing").display().to_string())),
            ]))
            .await;
        assert_eq!(result.output, Some(json!(false)));
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn get_file_info_reports_metadata() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let file = dir.path().join("info.txt");
        std::fs::write(&file, "12345").unwrap();

        let result = tool
            .execute(args(&[
                ("operation", json!("get_file_info")),
                ("path", json!(file.display().to_string())),
            ]))
            .await;
        assert!(result.is_success());
        let info = result.output.unwrap();
        assert_eq!(info["size"], 5);
        assert_eq!(info["type"], "file");
        assert_eq!(info["name"], "info.txt");
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let result = tool
            .execute(args(&[
                ("operation", json!("move_file")),
                ("path", json!(dir.path().display().to_string())),
            ]))
            .await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("Unknown operation"));
    }

    #[tokio::test]
    async fn create_directory_rejects_existing_path() {
        let dir = TempDir::new().unwrap();
        let tool = tool_for(&dir);
        let result = tool
            .execute(args(&[
                ("operation", json!("create_directory")),
                ("path", json!(dir.path().display().to_string())),
            ]))
            .await;
        assert!(result.is_error());
        assert!(result.error.as_deref().unwrap().contains("already exists"));
    }

    #[test]
    fn resolve_keeps_nonexistent_tail() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("not/yet/here.txt");
        let resolved = resolve_path(&target).unwrap();
        assert!(resolved.ends_with("not/yet/here.txt"));
    }
}
