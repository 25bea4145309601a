//! Skill documents discovered under a skills directory.
//!
//! Layout: `<root>/<skill>/SKILL.md`, where the file starts with a YAML
//! frontmatter block carrying `name` and `description`:
//!
//! ```text
//! ---
//! name: pdf
//! description: Work with PDF files
//! ---
//! Body text...
//! ```
//!
//! Only the header is read at load time. The body is read on first request
//! and cached.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::SkillError;

pub const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Directory holding the descriptor and any resources it references
    pub dir: PathBuf,
    body: OnceCell<String>,
}

impl Skill {
    fn descriptor(&self) -> PathBuf {
        self.dir.join(SKILL_FILE)
    }

    /// Everything after the header's closing fence line, read from disk once.
    pub fn content(&self) -> Result<&str, SkillError> {
        self.body
            .get_or_try_init(|| {
                let path = self.descriptor();
                let text = std::fs::read_to_string(&path).map_err(|source| SkillError::Io {
                    path: path.clone(),
                    source,
                })?;
                debug!(skill = %self.name, bytes = text.len(), "loaded skill body");
                let body = split_frontmatter(&text)
                    .map(|(_, body)| body)
                    .unwrap_or(text.as_str());
                Ok::<_, SkillError>(body.to_string())
            })
            .map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Skill>,
}

impl SkillRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan the immediate subdirectories of `root`.
    ///
    /// A missing root yields an empty registry. Entries without a descriptor
    /// or with an unreadable header are skipped with a warning.
    pub fn load(root: &Path) -> Self {
        let mut registry = Self::default();
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skills directory not available at {:?}: {}", root, e);
                return registry;
            }
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            let descriptor = dir.join(SKILL_FILE);
            if !dir.is_dir() || !descriptor.is_file() {
                continue;
            }
            match read_header(&descriptor) {
                Ok((name, description)) => {
                    if registry.skills.contains_key(&name) {
                        warn!("Duplicate skill '{}' at {:?}, keeping the first", name, dir);
                        continue;
                    }
                    debug!(skill = %name, dir = %dir.display(), "registered skill");
                    registry.skills.insert(
                        name.clone(),
                        Skill {
                            name,
                            description,
                            dir,
                            body: OnceCell::new(),
                        },
                    );
                }
                Err(e) => warn!("Skipping skill: {}", e),
            }
        }
        registry
    }

    /// `(name, description)` pairs sorted by name.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.skills
            .values()
            .map(|s| (s.name.as_str(), s.description.as_str()))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.skills.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// `- name: description` per line, or `(no skills available)`.
    pub fn describe_all(&self) -> String {
        if self.skills.is_empty() {
            return "(no skills available)".to_string();
        }
        self.list()
            .into_iter()
            .map(|(name, description)| format!("- {}: {}", name, description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn get_content(&self, name: &str) -> Result<&str, SkillError> {
        let skill = self.skills.get(name).ok_or_else(|| SkillError::NotFound {
            name: name.to_string(),
            available: self.available(),
        })?;
        skill.content()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    fn available(&self) -> String {
        if self.skills.is_empty() {
            "none".to_string()
        } else {
            self.names().join(", ")
        }
    }
}

/// Read just the frontmatter lines of a descriptor.
fn read_header(path: &Path) -> Result<(String, String), SkillError> {
    let io_err = |source| SkillError::Io {
        path: path.to_path_buf(),
        source,
    };
    let header_err = |reason: &str| SkillError::Header {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut lines = reader.lines();

    let first = lines.next().transpose().map_err(io_err)?;
    if first.as_deref().map(str::trim) != Some("---") {
        return Err(header_err("missing '---' header"));
    }

    let mut yaml = String::new();
    let mut closed = false;
    for line in lines {
        let line = line.map_err(io_err)?;
        if line.trim() == "---" {
            closed = true;
            break;
        }
        yaml.push_str(&line);
        yaml.push('\n');
    }
    if !closed {
        return Err(header_err("unterminated header"));
    }

    let frontmatter: serde_yaml::Value =
        serde_yaml::from_str(&yaml).map_err(|e| header_err(&e.to_string()))?;
    let field = |key: &str| {
        frontmatter
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let name = field("name").ok_or_else(|| header_err("'name' is required"))?;
    let description = field("description").unwrap_or_default();
    Ok((name, description))
}

/// Split `---\n<yaml>\n---\n<body>` into its two parts.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start().strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let yaml = &rest[..end];
    let after = &rest[end + 4..];
    // skip the remainder of the closing fence line
    let body = after.find('\n').map(|i| &after[i + 1..]).unwrap_or("");
    Some((yaml, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, dir: &str, text: &str) {
        let d = root.join(dir);
        std::fs::create_dir_all(&d).unwrap();
        std::fs::write(d.join(SKILL_FILE), text).unwrap();
    }

    fn sample_root() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_skill(
            tmp.path(),
            "pdf",
            "---\nname: pdf\ndescription: Process PDF files\n---\n# PDF\n\nUse pdftotext.\n",
        );
        write_skill(
            tmp.path(),
            "mcp-builder",
            "---\nname: mcp\ndescription: \"Build MCP servers\"\n---\nSteps...\n",
        );
        write_skill(tmp.path(), "broken", "no header here\n");
        std::fs::create_dir_all(tmp.path().join("empty-dir")).unwrap();
        std::fs::write(tmp.path().join("stray.md"), "---\nname: stray\n---\n").unwrap();
        tmp
    }

    #[test]
    fn test_load_registers_valid_skills_only() {
        let tmp = sample_root();
        let registry = SkillRegistry::load(tmp.path());
        assert_eq!(registry.names(), vec!["mcp", "pdf"]);
        assert_eq!(
            registry.list(),
            vec![("mcp", "Build MCP servers"), ("pdf", "Process PDF files")]
        );
    }

    #[test]
    fn test_describe_all() {
        let tmp = sample_root();
        let registry = SkillRegistry::load(tmp.path());
        assert_eq!(
            registry.describe_all(),
            "- mcp: Build MCP servers\n- pdf: Process PDF files"
        );
        assert_eq!(SkillRegistry::empty().describe_all(), "(no skills available)");
    }

    #[test]
    fn test_content_is_cached() {
        let tmp = sample_root();
        let registry = SkillRegistry::load(tmp.path());

        let first = registry.get_content("pdf").unwrap().to_string();
        assert_eq!(first, "# PDF\n\nUse pdftotext.\n");

        // later edits on disk are not observed once cached
        write_skill(tmp.path(), "pdf", "---\nname: pdf\n---\nchanged\n");
        let second = registry.get_content("pdf").unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_missing_skill_lists_available() {
        let tmp = sample_root();
        let registry = SkillRegistry::load(tmp.path());
        let err = registry.get_content("missing").unwrap_err();
        assert_eq!(err.to_string(), "Unknown skill 'missing'. Available: mcp, pdf");

        let err = SkillRegistry::empty().get_content("pdf").unwrap_err();
        assert!(err.to_string().ends_with("Available: none"));
    }

    #[test]
    fn test_body_is_kept_verbatim() {
        let tmp = TempDir::new().unwrap();
        write_skill(
            tmp.path(),
            "notes",
            "---\nname: notes\ndescription: d\n---\n\n  indented first line\ntrailing blank\n\n",
        );
        let registry = SkillRegistry::load(tmp.path());
        assert_eq!(
            registry.get_content("notes").unwrap(),
            "\n  indented first line\ntrailing blank\n\n"
        );
    }

    #[test]
    fn test_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let registry = SkillRegistry::load(&tmp.path().join("nope"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_split_frontmatter() {
        let (yaml, body) = split_frontmatter("---\nname: a\n---\nbody\nmore").unwrap();
        assert_eq!(yaml.trim(), "name: a");
        assert_eq!(body, "body\nmore");
        assert!(split_frontmatter("plain text").is_none());
    }
}
