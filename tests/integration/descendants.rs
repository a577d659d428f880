//! Descendant selection across diverging source history.

use container_use::test_utils::TestProject;

use crate::common::create_env;

#[tokio::test]
async fn descendants_track_the_commit_they_were_created_from() {
    let project = TestProject::new().unwrap();
    let repo = project.repository().await.unwrap();
    let git = project.git();

    let h0 = git.head().unwrap();
    let e1 = create_env(&project, &repo, "first env").await.unwrap();

    git.commit_empty("advance main").unwrap();
    let h1 = git.head().unwrap();
    let e2 = create_env(&project, &repo, "second env").await.unwrap();

    let from_h0 = repo.list_descendant_environments(&h0).await.unwrap();
    let ids_h0: Vec<&str> = from_h0.iter().map(|i| i.id.as_str()).collect();
    assert!(ids_h0.contains(&e1.id.as_str()), "{ids_h0:?} missing {}", e1.id);
    assert!(ids_h0.contains(&e2.id.as_str()), "{ids_h0:?} missing {}", e2.id);

    let from_h1 = repo.list_descendant_environments(&h1).await.unwrap();
    let ids_h1: Vec<&str> = from_h1.iter().map(|i| i.id.as_str()).collect();
    assert!(!ids_h1.contains(&e1.id.as_str()), "{ids_h1:?} should exclude {}", e1.id);
    assert!(ids_h1.contains(&e2.id.as_str()), "{ids_h1:?} missing {}", e2.id);
}
