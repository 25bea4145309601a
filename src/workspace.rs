//! Shared workspace state handed to every tool call.
//!
//! One `Workspace` exists per process. The top-level conversation and every
//! sub-agent see the same jobs, todos and skills through it.

use std::path::{Component, Path, PathBuf};

use crate::agent_types::AgentTypes;
use crate::error::ToolError;
use crate::jobs::JobManager;
use crate::skills::SkillRegistry;
use crate::todo::TodoManager;

#[derive(Debug)]
pub struct Workspace {
    workdir: PathBuf,
    pub jobs: JobManager,
    pub todos: TodoManager,
    pub skills: SkillRegistry,
    pub agent_types: AgentTypes,
}

impl Workspace {
    /// `workdir` is canonicalized when possible so path checks compare like
    /// with like.
    pub fn new(
        workdir: impl Into<PathBuf>,
        job_log_dir: Option<PathBuf>,
        skills: SkillRegistry,
        agent_types: AgentTypes,
    ) -> Self {
        let workdir = workdir.into();
        let workdir = workdir.canonicalize().unwrap_or(workdir);
        let log_dir = job_log_dir.unwrap_or_else(|| workdir.clone());
        Self {
            jobs: JobManager::new(workdir.clone(), log_dir),
            todos: TodoManager::new(),
            skills,
            agent_types,
            workdir,
        }
    }

    /// Workspace without skills, using the builtin agent types.
    pub fn bare(workdir: impl Into<PathBuf>) -> Self {
        Self::new(workdir, None, SkillRegistry::empty(), AgentTypes::builtin())
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Resolve a tool-supplied path against the workdir.
    ///
    /// Relative paths are joined to the workdir; absolute paths are accepted
    /// only when they already lie inside it. `..` is resolved lexically and
    /// may not climb above the workdir.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::InvalidInput("path must not be empty".to_string()));
        }
        let joined = self.workdir.join(path);
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escapes(path));
                    }
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        if !normalized.starts_with(&self.workdir) {
            return Err(escapes(path));
        }
        Ok(normalized)
    }

    /// Path shown to the model: relative to the workdir when inside it.
    pub fn display_path<'p>(&self, path: &'p Path) -> std::path::Display<'p> {
        path.strip_prefix(&self.workdir).unwrap_or(path).display()
    }
}

fn escapes(path: &str) -> ToolError {
    ToolError::InvalidInput(format!("Path escapes workspace: {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_paths_resolve_inside() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::bare(tmp.path());
        let root = ws.workdir().to_path_buf();

        assert_eq!(ws.resolve_path("a/b.txt").unwrap(), root.join("a/b.txt"));
        assert_eq!(ws.resolve_path("./a/../c.txt").unwrap(), root.join("c.txt"));
        assert_eq!(ws.resolve_path(".").unwrap(), root);
    }

    #[test]
    fn test_escapes_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::bare(tmp.path());

        assert!(ws.resolve_path("../outside.txt").is_err());
        assert!(ws.resolve_path("a/../../x").is_err());
        assert!(ws.resolve_path("/etc/passwd").is_err());
        assert!(ws.resolve_path("").is_err());
    }

    #[test]
    fn test_absolute_path_inside_workdir_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::bare(tmp.path());
        let inside = ws.workdir().join("notes.md");
        let resolved = ws.resolve_path(inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside);
        assert_eq!(ws.display_path(&resolved).to_string(), "notes.md");
    }

    #[test]
    fn test_jobs_default_to_workdir_logs() {
        let tmp = TempDir::new().unwrap();
        let mut ws = Workspace::bare(tmp.path());
        let log = ws.jobs.start("true").unwrap().log_path.clone();
        assert_eq!(log.parent().unwrap(), ws.workdir());
    }
}
