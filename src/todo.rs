//! In-memory task list, replaced wholesale on every update.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TodoError;

pub const MAX_TODOS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    fn glyph(self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[>]",
            Self::Completed => "[x]",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Imperative form ("Run tests")
    pub content: String,
    pub status: TodoStatus,
    /// Present continuous form ("Running tests")
    #[serde(rename = "activeForm")]
    pub active_form: String,
}

impl TodoItem {
    pub fn new(content: &str, active_form: &str, status: TodoStatus) -> Self {
        Self {
            content: content.to_string(),
            status,
            active_form: active_form.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TodoManager {
    items: Vec<TodoItem>,
}

impl TodoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Replace the whole list. On error the current list is kept as is.
    pub fn replace(&mut self, items: Vec<TodoItem>) -> Result<(), TodoError> {
        let mut validated = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let content = item.content.trim();
            let active_form = item.active_form.trim();
            if content.is_empty() {
                return Err(TodoError::MissingField {
                    index,
                    field: "content",
                });
            }
            if active_form.is_empty() {
                return Err(TodoError::MissingField {
                    index,
                    field: "activeForm",
                });
            }
            validated.push(TodoItem::new(content, active_form, item.status));
        }
        check_list(&validated)?;
        self.items = validated;
        Ok(())
    }

    /// Validate raw tool arguments and replace the list.
    pub fn replace_from_json(&mut self, items: &Value) -> Result<(), TodoError> {
        let raw = items.as_array().ok_or(TodoError::NotAnArray)?;
        let mut parsed = Vec::with_capacity(raw.len());
        for (index, entry) in raw.iter().enumerate() {
            let obj = entry
                .as_object()
                .ok_or(TodoError::NotAnObject { index })?;
            let text = |field: &'static str| {
                obj.get(field)
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(TodoError::MissingField { index, field })
            };
            let content = text("content")?;
            let active_form = text("activeForm")?;
            let status_raw = text("status")?;
            let status = TodoStatus::parse(status_raw).ok_or_else(|| TodoError::InvalidStatus {
                index,
                status: status_raw.to_string(),
            })?;
            parsed.push(TodoItem::new(content, active_form, status));
        }
        self.replace(parsed)
    }

    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "No todos.".to_string();
        }
        let mut out: Vec<String> = self
            .items
            .iter()
            .map(|t| format!("{} {}", t.status.glyph(), t.content))
            .collect();
        let done = self
            .items
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        out.push(format!("({}/{} done)", done, self.items.len()));
        out.join("\n")
    }

    /// Label of the item currently being worked on.
    pub fn active(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|t| t.status == TodoStatus::InProgress)
            .map(|t| t.active_form.as_str())
    }
}

fn check_list(items: &[TodoItem]) -> Result<(), TodoError> {
    if items.len() > MAX_TODOS {
        return Err(TodoError::TooMany {
            count: items.len(),
            max: MAX_TODOS,
        });
    }
    let in_progress = items
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress)
        .count();
    if in_progress > 1 {
        return Err(TodoError::MultipleInProgress(in_progress));
    }
    Ok(())
}
