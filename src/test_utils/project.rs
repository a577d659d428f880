//! Isolated project scaffolding for integration tests.
//!
//! A [`TestProject`] is a temporary source repository with one commit, an
//! isolated container-use base directory (so parallel tests never share a
//! bare remote), and an in-memory container runtime.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::repository::Repository;
use crate::runtime::ContainerRuntime;
use crate::test_utils::git_helper::TestGit;
use crate::test_utils::runtime::InMemoryRuntime;

/// One test's private source repo + config base + runtime.
pub struct TestProject {
    source: TempDir,
    base: TempDir,
    /// The in-memory container runtime backing this project's environments
    pub runtime: Arc<InMemoryRuntime>,
}

impl TestProject {
    /// Create a source repository on branch `main` with one initial commit.
    pub fn new() -> Result<Self> {
        let source = TempDir::new()?;
        let base = TempDir::new()?;

        let git = TestGit::new(source.path());
        git.init()?;
        git.config_user()?;
        std::fs::write(source.path().join("README.md"), "# test project\n")?;
        git.add_all()?;
        git.commit("initial commit")?;

        Ok(Self {
            source,
            base,
            runtime: InMemoryRuntime::new(),
        })
    }

    /// Path of the source working tree.
    pub fn source_path(&self) -> &Path {
        self.source.path()
    }

    /// Path of the isolated container-use base directory.
    pub fn base_path(&self) -> &Path {
        self.base.path()
    }

    /// Git helper scoped to the source repository.
    pub fn git(&self) -> TestGit {
        TestGit::new(self.source.path())
    }

    /// The runtime as the trait object the core consumes.
    pub fn runtime_handle(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime) as Arc<dyn ContainerRuntime>
    }

    /// Open the repository layer over this project.
    pub async fn repository(&self) -> Result<Repository> {
        Repository::open_with_base(self.source.path(), self.base.path()).await
    }

    /// Write a file in the source working tree.
    pub fn write_source_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.source.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
