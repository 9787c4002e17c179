//! Merkle witnesses and content parts of live headers.

use indifs::core::{chunk_merkle_root, verify_witness, WITNESS_ENTRY_LEN};
use indifs::FsError;
use indifs_testkit::fixtures::{commit1_tree, sample_trees, TestFixture};

#[tokio::test]
async fn test_every_live_header_has_a_witness() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let fs = fixture.fs_with(&[commit1_tree()]).await?;
    let headers = fs.headers().await?;
    let merkle_root = headers[0].merkle().expect("root carries the tree root");

    for h in &headers[1..] {
        let (leaf, witness) = fs.file_merkle_witness(h.path()).await?;
        assert_eq!(leaf, h.hash());
        assert!(!witness.is_empty());
        assert_eq!(witness.len() % WITNESS_ENTRY_LEN, 0);
        assert!(verify_witness(&leaf, &merkle_root, &witness), "{}", h.path());

        if h.is_file() {
            let parts = fs.file_parts(h.path()).await?;
            assert_eq!(Some(chunk_merkle_root(&parts)), h.file_merkle());
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_witness_does_not_outlive_its_root() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let fs = fixture.fs_with(&[commit1_tree()]).await?;
    let old_root = fs.root().await?.merkle().unwrap();
    let (leaf, witness) = fs.file_merkle_witness("/A/b.txt").await?;

    for tree in &sample_trees()[1..] {
        fixture.commit_tree(&fs, tree).await?;
    }
    let new_root = fs.root().await?.merkle().unwrap();

    // /A/b.txt never changed, but its neighbours did
    assert!(verify_witness(&leaf, &old_root, &witness));
    assert!(!verify_witness(&leaf, &new_root, &witness));
    let (same_leaf, fresh) = fs.file_merkle_witness("/A/b.txt").await?;
    assert_eq!(same_leaf, leaf);
    assert!(verify_witness(&leaf, &new_root, &fresh));
    Ok(())
}

#[tokio::test]
async fn test_multi_part_file() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let fs = fixture.fs_with(&sample_trees()).await?;
    let header = fs.file_header("/C/c.bin").await?;
    assert_eq!(header.file_size(), 3000);

    let parts = fs.file_parts("/C/c.bin").await?;
    let sizes: Vec<usize> = parts.iter().map(|p| p.len()).collect();
    assert_eq!(sizes, vec![1024, 1024, 952]);
    assert_eq!(Some(chunk_merkle_root(&parts)), header.file_merkle());
    Ok(())
}

#[tokio::test]
async fn test_missing_paths_are_not_found() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let fs = fixture.fs_with(&sample_trees()).await?;

    for path in ["/", "/B/", "/B/2/x.txt", "/nope"] {
        let err = fs.file_merkle_witness(path).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)), "{path}");
    }
    // directories have no parts
    let err = fs.file_parts("/A/").await.unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));

    // the root header is always readable
    assert_eq!(fs.file_header("/").await?, fs.root().await?);
    Ok(())
}
