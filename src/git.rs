//! Git provenance of a schema generation

use std::path::Path;

use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::Result;

/// Commit, branch and tag the generating checkout was at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    /// Full hex id of the HEAD commit
    pub commit: String,
    /// Branch name, absent on a detached HEAD
    pub branch: Option<String>,
    /// A tag pointing at HEAD, if any
    pub tag: Option<String>,
}

impl GitInfo {
    /// Discover the repository containing `path` and describe its HEAD
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;

        let branch = if head.is_branch() {
            head.shorthand().map(String::from)
        } else {
            None
        };
        let tag = tag_pointing_at(&repo, commit.id())?;

        let info = Self {
            commit: commit.id().to_string(),
            branch,
            tag,
        };
        trace!("Git provenance: {:?}", info);
        Ok(info)
    }

    /// Like [`GitInfo::discover`], but a missing repository is only a warning
    pub fn try_discover(path: &Path) -> Option<Self> {
        match Self::discover(path) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Git provenance unavailable for {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// First tag (by name) whose target peels to `commit`
fn tag_pointing_at(repo: &Repository, commit: Oid) -> Result<Option<String>> {
    let names = repo.tag_names(None)?;
    let mut matching: Vec<String> = names
        .iter()
        .flatten()
        .filter(|name| {
            repo.revparse_single(&format!("refs/tags/{}", name))
                .and_then(|object| object.peel_to_commit())
                .map(|tagged| tagged.id() == commit)
                .unwrap_or(false)
        })
        .map(String::from)
        .collect();
    matching.sort();
    Ok(matching.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use tempfile::tempdir;

    fn commit_all(repo: &Repository) -> Oid {
        let mut index = repo.index().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Schema Generator", "schemas@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial schemas", &tree, &[])
            .unwrap()
    }

    #[test]
    fn test_discover_commit_branch_and_tag() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let oid = commit_all(&repo);
        let object = repo.find_object(oid, None).unwrap();
        repo.tag_lightweight("v1.0.0", &object, false).unwrap();

        let nested = dir.path().join("schemas");
        std::fs::create_dir_all(&nested).unwrap();

        let info = GitInfo::discover(&nested).unwrap();
        assert_eq!(info.commit, oid.to_string());
        assert!(info.branch.is_some());
        assert_eq!(info.tag.as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn test_untagged_head() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_all(&repo);

        let info = GitInfo::discover(dir.path()).unwrap();
        assert!(info.tag.is_none());
    }

    #[test]
    fn test_repository_without_commits_is_unavailable() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        assert!(GitInfo::try_discover(dir.path()).is_none());
    }
}
