//! Filesystem strategies: read, write, copy, delete, scan

use async_trait::async_trait;

use crate::domain::{Task, TaskKind, TaskResult};

use super::{ExecContext, ExecError, Strategy};

/// Read a file's contents
pub struct FileReadStrategy;

#[async_trait]
impl Strategy for FileReadStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let path = task
            .param_str("file_path")
            .ok_or_else(|| ExecError::missing(TaskKind::FileRead, "file_path"))?;
        let full = ctx.resolve(path);

        println!("agent reading file: {}", full.display());

        let content = tokio::fs::read_to_string(&full).await?;
        Ok(TaskResult::success(content))
    }
}

/// Write (or append) content to a file, creating parent directories
pub struct FileWriteStrategy;

#[async_trait]
impl Strategy for FileWriteStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let path = task
            .param_str("file_path")
            .ok_or_else(|| ExecError::missing(TaskKind::FileWrite, "file_path"))?;
        let content = task
            .parameters
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExecError::missing(TaskKind::FileWrite, "content"))?;
        let append = task.param_bool("append");

        let full = ctx.resolve(path);
        let existed = full.exists();

        println!(
            "agent {} file: {}",
            if append { "appending to" } else { "writing" },
            full.display()
        );

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if append {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&full).await?;
            file.write_all(content.as_bytes()).await?;
        } else {
            tokio::fs::write(&full, content).await?;
        }

        let result = TaskResult::success(format!("wrote {} bytes to {}", content.len(), path));
        Ok(if existed {
            result.with_file_modified(path)
        } else {
            result.with_file_created(path)
        })
    }
}

/// Copy a file
pub struct FileCopyStrategy;

#[async_trait]
impl Strategy for FileCopyStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let source = task
            .param_str("source_path")
            .ok_or_else(|| ExecError::missing(TaskKind::FileCopy, "source_path"))?;
        let target = task
            .param_str("target_path")
            .ok_or_else(|| ExecError::missing(TaskKind::FileCopy, "target_path"))?;

        let source_full = ctx.resolve(source);
        let target_full = ctx.resolve(target);

        println!("agent copying file: {} -> {}", source_full.display(), target_full.display());

        if let Some(parent) = target_full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source_full, &target_full).await?;

        Ok(TaskResult::success(format!("copied {} bytes to {}", bytes, target)).with_file_created(target))
    }
}

/// Delete a file or an empty directory
pub struct FileDeleteStrategy;

#[async_trait]
impl Strategy for FileDeleteStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let path = task
            .param_str("file_path")
            .ok_or_else(|| ExecError::missing(TaskKind::FileDelete, "file_path"))?;
        let full = ctx.resolve(path);

        println!("agent deleting: {}", full.display());

        let meta = tokio::fs::metadata(&full).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&full).await?;
        } else {
            tokio::fs::remove_file(&full).await?;
        }

        Ok(TaskResult::success(format!("deleted {}", path)))
    }
}

/// List directory entries, optionally recursive, as an ordered path list
pub struct DirectoryScanStrategy;

#[async_trait]
impl Strategy for DirectoryScanStrategy {
    async fn execute(&self, task: &Task, ctx: &ExecContext) -> Result<TaskResult, ExecError> {
        let path = task
            .param_str("directory_path")
            .or_else(|| task.param_str("file_path"))
            .ok_or_else(|| ExecError::missing(TaskKind::DirectoryScan, "directory_path"))?;
        let recursive = task.param_bool("recursive");

        let full = ctx.resolve(path);

        println!(
            "agent scanning directory{}: {}",
            if recursive { " (recursive)" } else { "" },
            full.display()
        );

        let mut entries: Vec<String> = Vec::new();
        if recursive {
            for entry in walkdir::WalkDir::new(&full).min_depth(1) {
                let entry = entry.map_err(|e| ExecError::Process(format!("scan failed: {}", e)))?;
                entries.push(entry.path().display().to_string());
            }
        } else {
            let mut dir = tokio::fs::read_dir(&full).await?;
            while let Some(entry) = dir.next_entry().await? {
                entries.push(entry.path().display().to_string());
            }
        }
        entries.sort();

        let count = entries.len();
        Ok(TaskResult::success(entries.join("\n")).with_metric("entries", count as f64))
    }
}
