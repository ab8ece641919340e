//! Filesystem tools -- read, write, and list files inside the workspace.
//!
//! Every path argument is resolved against the workspace root and rejected
//! if it would escape it, either lexically (e.g. `../../etc/passwd`) or
//! through a symlink inside the workspace that points elsewhere.  Relative
//! paths are taken relative to the root; absolute paths must already lie
//! inside it.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use clawdlocal_kernel::{Tool, ToolArgs, ToolError};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AdapterError, Result};

/// Maximum bytes returned per file read.
const MAX_FILE_READ_BYTES: usize = 256 * 1024;

/// Filesystem tools sandboxed to one workspace directory.
#[derive(Debug, Clone)]
pub struct FilesystemTools {
    root: PathBuf,
}

impl FilesystemTools {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The three filesystem tools, ready for registration.
    pub fn into_tools(self) -> Vec<Tool> {
        let fs = Arc::new(self);
        vec![
            Tool::new(
                "file_read",
                "Read the contents of a file from the workspace",
                json!({
                    "type": "object",
                    "properties": {
                        "filepath": { "type": "string", "description": "Path to the file to read" }
                    },
                    "required": ["filepath"]
                }),
                {
                    let fs = Arc::clone(&fs);
                    move |_ctx, args| {
                        let fs = Arc::clone(&fs);
                        async move { fs.file_read(&args).await.map_err(ToolError::from) }
                    }
                },
            ),
            Tool::new(
                "file_write",
                "Write content to a file in the workspace, creating parent directories",
                json!({
                    "type": "object",
                    "properties": {
                        "filepath": { "type": "string", "description": "Path to the file to write" },
                        "content": { "type": "string", "description": "Content to write to the file" }
                    },
                    "required": ["filepath", "content"]
                }),
                {
                    let fs = Arc::clone(&fs);
                    move |_ctx, args| {
                        let fs = Arc::clone(&fs);
                        async move { fs.file_write(&args).await.map_err(ToolError::from) }
                    }
                },
            ),
            Tool::new(
                "file_list",
                "List the contents of a workspace directory",
                json!({
                    "type": "object",
                    "properties": {
                        "dirpath": {
                            "type": "string",
                            "description": "Directory to list (default: the workspace root)"
                        }
                    }
                }),
                move |_ctx, args| {
                    let fs = Arc::clone(&fs);
                    async move { fs.file_list(&args).await.map_err(ToolError::from) }
                },
            ),
        ]
    }

    // -- Tool implementations ------------------------------------------------

    pub async fn file_read(&self, args: &ToolArgs) -> Result<Value> {
        let raw_path = require_str(args, "filepath", "file_read")?;
        let full_path = self.safe_resolve(raw_path)?;
        debug!(path = %full_path.display(), "reading file");

        let raw = tokio::fs::read_to_string(&full_path).await?;
        let size_bytes = raw.len();

        let (content, truncated) = if size_bytes > MAX_FILE_READ_BYTES {
            let mut end = MAX_FILE_READ_BYTES;
            while !raw.is_char_boundary(end) {
                end -= 1;
            }
            (raw[..end].to_owned(), true)
        } else {
            (raw, false)
        };

        Ok(json!({
            "path": full_path.display().to_string(),
            "content": content,
            "size_bytes": size_bytes,
            "truncated": truncated,
        }))
    }

    pub async fn file_write(&self, args: &ToolArgs) -> Result<Value> {
        let raw_path = require_str(args, "filepath", "file_write")?;
        let content = require_str(args, "content", "file_write")?;
        let full_path = self.safe_resolve(raw_path)?;
        debug!(path = %full_path.display(), bytes = content.len(), "writing file");

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        Ok(json!({
            "success": true,
            "path": full_path.display().to_string(),
            "size_bytes": content.len(),
            "message": format!("File written successfully to {raw_path}"),
        }))
    }

    pub async fn file_list(&self, args: &ToolArgs) -> Result<Value> {
        let raw_path = args
            .get("dirpath")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(".");
        let full_path = self.safe_resolve(raw_path)?;
        debug!(path = %full_path.display(), "listing directory");

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&full_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            // Entries that vanish mid-listing are skipped.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let modtime = meta
                .modified()
                .ok()
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string());

            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_dir": meta.is_dir(),
                "size": meta.len(),
                "modtime": modtime,
            }));
        }

        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(Value::Array(entries))
    }

    /// Resolve a user-supplied path and verify it stays under the root.
    ///
    /// The path is first normalized lexically, then symlinks in its longest
    /// existing prefix are resolved and the result is checked again.  The
    /// target itself may not exist yet.
    fn safe_resolve(&self, raw_path: &str) -> Result<PathBuf> {
        let root = self
            .root
            .canonicalize()
            .or_else(|_| std::path::absolute(&self.root))?;
        let root = normalize_path(&root);

        let candidate = Path::new(raw_path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        let normalized = normalize_path(&joined);

        if !normalized.starts_with(&root) {
            return Err(AdapterError::AccessDenied {
                path: normalized,
                root,
            });
        }

        let real = resolve_existing(&normalized)?;
        if !real.starts_with(&root) {
            return Err(AdapterError::AccessDenied { path: real, root });
        }
        Ok(real)
    }
}

/// Canonicalize the longest existing prefix of `path` and append the
/// remaining components unchanged.
fn resolve_existing(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut real) => {
                real.extend(missing.iter().rev());
                return Ok(real);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(e);
                };
                missing.push(name.to_owned());
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else if !matches!(components.last(), Some(Component::RootDir)) {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

fn require_str<'a>(args: &'a ToolArgs, field: &str, tool_name: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::invalid(tool_name, format!("missing or invalid '{field}' parameter")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => map,
            _ => panic!("test args must be an object"),
        }
    }

    #[test]
    fn normalize_path_resolves_parent_components() {
        let p = Path::new("/srv/workspace/sub/../other");
        assert_eq!(normalize_path(p), PathBuf::from("/srv/workspace/other"));
    }

    #[test]
    fn normalize_path_cannot_climb_above_root() {
        let p = Path::new("/../../etc/./passwd");
        assert_eq!(normalize_path(p), PathBuf::from("/etc/passwd"));
    }

    #[test]
    fn traversal_outside_workspace_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FilesystemTools::new(dir.path());

        let err = fs.safe_resolve("../../etc/passwd").unwrap_err();
        assert!(matches!(err, AdapterError::AccessDenied { .. }));
        assert!(err.to_string().contains("outside the workspace"));

        assert!(fs.safe_resolve("/etc/passwd").is_err());
    }

    #[test]
    fn absolute_path_inside_workspace_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let fs = FilesystemTools::new(&root);

        let inside = root.join("notes").join("a.txt");
        assert_eq!(fs.safe_resolve(inside.to_str().unwrap()).unwrap(), inside);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_out_of_the_workspace_is_denied() {
        let workspace = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "top secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), workspace.path().join("escape")).unwrap();
        let fs = FilesystemTools::new(workspace.path());

        let err = fs
            .file_read(&args(json!({"filepath": "escape/secret.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::AccessDenied { .. }));

        let err = fs
            .file_write(&args(json!({"filepath": "escape/planted.txt", "content": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::AccessDenied { .. }));
        assert!(!outside.path().join("planted.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_the_workspace_is_allowed() {
        let workspace = tempfile::tempdir().unwrap();
        let root = workspace.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();
        let fs = FilesystemTools::new(&root);

        assert_eq!(
            fs.safe_resolve("alias/new.txt").unwrap(),
            root.join("real").join("new.txt")
        );
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FilesystemTools::new(dir.path());

        let written = fs
            .file_write(&args(json!({"filepath": "deep/dir/hello.txt", "content": "hi there"})))
            .await
            .unwrap();
        assert_eq!(written["success"], true);

        let read = fs
            .file_read(&args(json!({"filepath": "deep/dir/hello.txt"})))
            .await
            .unwrap();
        assert_eq!(read["content"], "hi there");
        assert_eq!(read["truncated"], false);
    }

    #[tokio::test]
    async fn missing_parameter_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FilesystemTools::new(dir.path());

        let err = fs.file_write(&args(json!({"filepath": "x.txt"}))).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams { ref tool_name, .. } if tool_name == "file_write"));
    }

    #[tokio::test]
    async fn list_defaults_to_root_and_sorts_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let fs = FilesystemTools::new(dir.path());
        let listing = fs.file_list(&ToolArgs::new()).await.unwrap();
        let listing = listing.as_array().unwrap();

        let names: Vec<_> = listing.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
        assert_eq!(listing[1]["size"], 2);
        assert_eq!(listing[2]["is_dir"], true);
    }
}
