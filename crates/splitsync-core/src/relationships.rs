//! Static parent/child repository directory.
//!
//! Built once from configuration and read-only afterwards. Records live in an
//! arena indexed by repository name; a repository has at most one parent and
//! any number of children, each child mapped to a subdirectory of its parent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::split_repo_name;

/// One configured repository, as declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    /// `owner/repo`.
    pub name: String,
    /// Parent repository, if this repository is split out of one.
    #[serde(default)]
    pub parent: Option<String>,
    /// Subdirectory of the parent that corresponds to this repository's root.
    #[serde(default)]
    pub path: Option<String>,
}

impl RepoEntry {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            path: None,
        }
    }

    pub fn child(name: impl Into<String>, parent: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.into()),
            path: Some(path.into()),
        }
    }
}

/// A child repository and the parent subdirectory it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRepo {
    pub name: String,
    pub path: String,
}

/// Role of one repository relative to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// The other repository is this one's parent.
    Parent,
    /// The other repository is one of this one's children.
    Child,
    None,
}

#[derive(Debug, Clone)]
struct RepoRecord {
    name: String,
    parent: Option<usize>,
    /// Normalised subdirectory inside the parent; set iff `parent` is.
    path: Option<String>,
    children: Vec<usize>,
}

/// Immutable lookup over configured repository relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipDirectory {
    records: Vec<RepoRecord>,
    index: HashMap<String, usize>,
}

fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

impl RelationshipDirectory {
    /// Build the directory from declared entries.
    ///
    /// Children keep their declaration order. Fails on malformed names,
    /// duplicates, unknown or self parents, and children without a path.
    pub fn new(entries: Vec<RepoEntry>) -> SyncResult<Self> {
        let mut dir = RelationshipDirectory::default();

        for entry in &entries {
            split_repo_name(&entry.name)?;
            if dir.index.contains_key(&entry.name) {
                return Err(SyncError::Config(format!(
                    "repository {} is declared twice",
                    entry.name
                )));
            }
            dir.index.insert(entry.name.clone(), dir.records.len());
            dir.records.push(RepoRecord {
                name: entry.name.clone(),
                parent: None,
                path: None,
                children: Vec::new(),
            });
        }

        for (idx, entry) in entries.iter().enumerate() {
            let Some(parent) = entry.parent.as_deref() else {
                if entry.path.is_some() {
                    return Err(SyncError::Config(format!(
                        "repository {} has a path but no parent",
                        entry.name
                    )));
                }
                continue;
            };
            if parent == entry.name {
                return Err(SyncError::Config(format!(
                    "repository {} cannot be its own parent",
                    entry.name
                )));
            }
            let parent_idx = *dir.index.get(parent).ok_or_else(|| {
                SyncError::Config(format!(
                    "repository {} names unknown parent {}",
                    entry.name, parent
                ))
            })?;
            let path = entry
                .path
                .as_deref()
                .map(normalize_path)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    SyncError::Config(format!(
                        "child repository {} needs a non-empty path inside {}",
                        entry.name, parent
                    ))
                })?;
            dir.records[idx].parent = Some(parent_idx);
            dir.records[idx].path = Some(path);
            dir.records[parent_idx].children.push(idx);
        }

        Ok(dir)
    }

    fn record(&self, repo: &str) -> Option<&RepoRecord> {
        self.index.get(repo).map(|&idx| &self.records[idx])
    }

    /// Every configured repository, in declaration order.
    pub fn repo_names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn contains(&self, repo: &str) -> bool {
        self.index.contains_key(repo)
    }

    pub fn has_parent(&self, repo: &str) -> bool {
        self.record(repo).is_some_and(|r| r.parent.is_some())
    }

    pub fn parent_name(&self, repo: &str) -> Option<&str> {
        let parent = self.record(repo)?.parent?;
        Some(self.records[parent].name.as_str())
    }

    /// Subdirectory of the parent that `repo` maps to.
    pub fn path_in_parent(&self, repo: &str) -> Option<&str> {
        self.record(repo)?.path.as_deref()
    }

    pub fn has_children(&self, repo: &str) -> bool {
        self.record(repo).is_some_and(|r| !r.children.is_empty())
    }

    /// Children of `repo` in declaration order.
    pub fn children(&self, repo: &str) -> Vec<ChildRepo> {
        self.record(repo)
            .map(|r| {
                r.children
                    .iter()
                    .map(|&idx| {
                        let child = &self.records[idx];
                        ChildRepo {
                            name: child.name.clone(),
                            path: child.path.clone().unwrap_or_default(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parent first (if any), then children in declaration order.
    pub fn related_repo_names(&self, repo: &str) -> Vec<&str> {
        let Some(record) = self.record(repo) else {
            return Vec::new();
        };
        record
            .parent
            .into_iter()
            .chain(record.children.iter().copied())
            .map(|idx| self.records[idx].name.as_str())
            .collect()
    }

    /// Role of `other` relative to `repo`.
    pub fn relationship(&self, repo: &str, other: &str) -> Relationship {
        if self.parent_name(repo) == Some(other) {
            Relationship::Parent
        } else if self.parent_name(other) == Some(repo) {
            Relationship::Child
        } else {
            Relationship::None
        }
    }

    /// The child of `parent` whose subtree owns `file_path`.
    ///
    /// Matches whole path segments; the deepest mapped subtree wins.
    pub fn child_for_path(&self, parent: &str, file_path: &str) -> Option<ChildRepo> {
        let file_path = file_path.trim_start_matches('/');
        self.children(parent)
            .into_iter()
            .filter(|child| {
                file_path == child.path
                    || file_path
                        .strip_prefix(child.path.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|child| child.path.len())
    }
}
