use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deepest nesting level a task may have (0 = top level).
pub const MAX_TASK_LEVEL: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub level: u8,
}

/// Flat table of tasks keyed by id, with parent back-references.
///
/// Children are kept as indices into `nodes` in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TaskTree {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from `(id, parent_id)` rows whose parents come first.
    pub fn from_rows<I, S>(rows: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: Into<String>,
    {
        let mut tree = Self::new();
        for (id, parent_id) in rows {
            tree.insert(id, parent_id.map(Into::into))?;
        }
        Ok(tree)
    }

    pub fn insert(&mut self, id: impl Into<String>, parent_id: Option<String>) -> Result<u8, String> {
        let id = id.into();
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err("task.id must not be empty".to_string());
        }
        if self.index.contains_key(&id) {
            return Err(format!("task already exists: {id}"));
        }

        let (parent_index, level) = match parent_id.as_deref().map(str::trim) {
            None | Some("") => (None, 0),
            Some(parent) => {
                let Some(&parent_index) = self.index.get(parent) else {
                    return Err(format!("parent task not found: {parent}"));
                };
                let level = self.nodes[parent_index].level + 1;
                if level > MAX_TASK_LEVEL {
                    return Err(format!(
                        "task {id} would be nested deeper than level {MAX_TASK_LEVEL}"
                    ));
                }
                (Some(parent_index), level)
            }
        };

        let node_index = self.nodes.len();
        self.nodes.push(TaskNode {
            id: id.clone(),
            parent_id: parent_index.map(|index| self.nodes[index].id.clone()),
            level,
        });
        self.children.push(Vec::new());
        if let Some(parent_index) = parent_index {
            self.children[parent_index].push(node_index);
        }
        self.index.insert(id, node_index);
        Ok(level)
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.index.get(id).map(|&index| &self.nodes[index])
    }

    pub fn level(&self, id: &str) -> Option<u8> {
        self.get(id).map(|node| node.level)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All descendants of `id` in depth-first pre-order, without `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let Some(&root) = self.index.get(id) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut stack = self.children[root].iter().rev().copied().collect::<Vec<_>>();
        while let Some(current) = stack.pop() {
            result.push(self.nodes[current].id.clone());
            stack.extend(self.children[current].iter().rev().copied());
        }
        result
    }

    /// `id` followed by its descendants.
    pub fn subtree(&self, id: &str) -> Vec<String> {
        if !self.index.contains_key(id) {
            return Vec::new();
        }
        let mut ids = vec![id.to_string()];
        ids.extend(self.descendants(id));
        ids
    }
}
