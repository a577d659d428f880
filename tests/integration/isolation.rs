//! Two environments of the same repository share no filesystem.

use container_use::core::ContainerUseError;
use container_use::test_utils::TestProject;

use crate::common::{create_env, write_and_commit};

#[tokio::test]
async fn environments_are_isolated_from_each_other() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();

    let dev = create_env(&project, &repo, "dev").await.unwrap();
    let staging = create_env(&project, &repo, "staging").await.unwrap();

    write_and_commit(&repo, &dev, "config.json", r#"{"env":"dev"}"#, "dev config")
        .await
        .unwrap();
    write_and_commit(&repo, &dev, "dev-only.txt", "only in dev\n", "dev marker")
        .await
        .unwrap();
    write_and_commit(&repo, &staging, "config.json", r#"{"env":"staging"}"#, "staging config")
        .await
        .unwrap();

    let dev_config = dev.file_read("config.json", true, None, None).await.unwrap();
    assert!(dev_config.contains(r#""env":"dev""#));

    let staging_config = staging.file_read("config.json", true, None, None).await.unwrap();
    assert!(staging_config.contains(r#""env":"staging""#));

    let err = staging.file_read("dev-only.txt", true, None, None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ContainerUseError>(),
        Some(ContainerUseError::RuntimeFailure { .. })
    ));

    // The isolation holds on disk too: each worktree mirrors its own env.
    let dev_on_disk =
        std::fs::read_to_string(repo.worktrees_dir().join(&dev.id).join("config.json")).unwrap();
    assert!(dev_on_disk.contains("dev"));
    let staging_on_disk =
        std::fs::read_to_string(repo.worktrees_dir().join(&staging.id).join("config.json"))
            .unwrap();
    assert!(staging_on_disk.contains("staging"));
    assert!(!repo.worktrees_dir().join(&staging.id).join("dev-only.txt").exists());
}

#[tokio::test]
async fn file_read_supports_clamped_line_ranges() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "line ranges").await.unwrap();

    write_and_commit(&repo, &env, "lines.txt", "one\ntwo\nthree\nfour\n", "fixture")
        .await
        .unwrap();

    let middle = env.file_read("lines.txt", false, Some(2), Some(3)).await.unwrap();
    assert_eq!(middle, "two\nthree\n");

    // Ranges clamp to the file bounds.
    let clamped = env.file_read("lines.txt", false, Some(3), Some(100)).await.unwrap();
    assert_eq!(clamped, "three\nfour\n");

    // A range entirely past the end is empty.
    let past_end = env.file_read("lines.txt", false, Some(10), Some(20)).await.unwrap();
    assert_eq!(past_end, "");
}

#[tokio::test]
async fn file_list_returns_newline_separated_entries() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "listing").await.unwrap();

    write_and_commit(&repo, &env, "src/lib.rs", "pub fn x() {}\n", "src").await.unwrap();
    write_and_commit(&repo, &env, "src/main.rs", "fn main() {}\n", "src").await.unwrap();

    let listing = env.file_list("src").await.unwrap();
    let entries: Vec<&str> = listing.lines().collect();
    assert_eq!(entries, vec!["lib.rs", "main.rs"]);
}
