//! The commit filter: binary and dependency-tree artifacts stay out of the
//! environment branch.

use container_use::test_utils::{TestGit, TestProject};

use crate::common::{create_env, run_and_commit, write_and_commit};

#[tokio::test]
async fn nul_bytes_keep_a_file_out_of_the_branch() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "binary skip").await.unwrap();

    let binary_payload = format!("looks textual{}but is not", '\u{0}');
    write_and_commit(&repo, &env, "blob.dat", &binary_payload, "binary artifact")
        .await
        .unwrap();

    let worktree = repo.worktrees_dir().join(&env.id);
    let tracked = TestGit::new(&worktree).run(&["ls-files"]).unwrap();
    assert!(!tracked.contains("blob.dat"), "binary file was committed:\n{tracked}");
    // The file itself reached the worktree; only the commit skipped it.
    assert!(worktree.join("blob.dat").exists());

    // The same path with textual content is staged.
    write_and_commit(&repo, &env, "blob.dat", "plain text now\n", "textual now")
        .await
        .unwrap();
    let tracked = TestGit::new(&worktree).run(&["ls-files"]).unwrap();
    assert!(tracked.contains("blob.dat"), "textual file missing:\n{tracked}");
}

#[tokio::test]
async fn dependency_directories_and_binary_extensions_are_skipped() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "ai slop").await.unwrap();

    run_and_commit(&repo, &env, "mkdir -p node_modules; echo x > node_modules/pkg.js")
        .await
        .unwrap();
    run_and_commit(&repo, &env, "mkdir -p __pycache__; echo x > __pycache__/mod.pyc")
        .await
        .unwrap();
    write_and_commit(&repo, &env, "dist.tar", "fake archive\n", "archive").await.unwrap();
    write_and_commit(&repo, &env, "debug.log", "log line\n", "log file").await.unwrap();
    write_and_commit(&repo, &env, "src/app.js", "console.log(1)\n", "real code")
        .await
        .unwrap();

    let worktree = repo.worktrees_dir().join(&env.id);
    let tracked = TestGit::new(&worktree).run(&["ls-files"]).unwrap();
    assert!(tracked.contains("src/app.js"));
    for skipped in ["node_modules", "__pycache__", "dist.tar", "debug.log"] {
        assert!(!tracked.contains(skipped), "{skipped} was committed:\n{tracked}");
    }
}

#[tokio::test]
async fn deletions_are_always_staged() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let env = create_env(&project, &repo, "deletions").await.unwrap();

    write_and_commit(&repo, &env, "doomed.txt", "short-lived\n", "add file").await.unwrap();
    {
        let _applying = env.lock_applying().await;
        env.file_delete("doomed.txt").await.unwrap();
        repo.update(&env, "remove file").await.unwrap();
    }

    let worktree = repo.worktrees_dir().join(&env.id);
    let tracked = TestGit::new(&worktree).run(&["ls-files"]).unwrap();
    assert!(!tracked.contains("doomed.txt"), "deletion not committed:\n{tracked}");
    assert!(!worktree.join("doomed.txt").exists());

    let bare = TestGit::new(repo.remote_path());
    let notes = bare.run(&["notes", "--ref", "container-use", "show", &env.id]).unwrap();
    assert!(notes.contains("Delete doomed.txt"), "notes were: {notes}");
}
