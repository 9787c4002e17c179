//! Replica synchronization through `get_commit`, history pruning and
//! persistence.

use proptest::prelude::*;

use indifs::store::{MemoryStore, SqliteStore};
use indifs::{Commit, FileSystem, FsConfig, FsError, Succession, ValidationError};
use indifs_testkit::fixtures::{
    commit1_tree, commit2_tree, commit3_tree, sample_trees, TestFixture, T0,
};
use indifs_testkit::generators;

#[tokio::test]
async fn test_incremental_commit_brings_replica_up_to_date() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let s3 = fixture.fs_with(&sample_trees()).await?;
    let s1 = fixture.fs_with(&[commit1_tree()]).await?;

    let from = s1.root().await?.ver();
    let commit = s3.get_commit(from).await?;
    assert!(commit.headers().len() > 1);
    assert_eq!(commit.ver(), 3);
    assert_eq!(commit.base(), from);

    // /B/ is removed with a single tombstone
    let tombstones: Vec<&str> = commit
        .changes()
        .iter()
        .filter(|h| h.deleted())
        .map(|h| h.path())
        .collect();
    assert_eq!(tombstones, vec!["/B/"]);
    // unchanged since version 1
    assert!(commit.changes().iter().all(|h| h.path() != "/A/b.txt"));

    s1.commit(&commit).await?;
    assert_eq!(s1.headers().await?, s3.headers().await?);
    assert_eq!(
        s1.file_parts("/C/c.bin").await?,
        s3.file_parts("/C/c.bin").await?
    );
    Ok(())
}

#[tokio::test]
async fn test_full_snapshot_brings_replica_up_to_date() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let s3 = fixture.fs_with(&sample_trees()).await?;

    let commit = s3.get_commit(0).await?;
    assert!(commit.is_snapshot());
    assert_eq!(commit.ver(), 3);
    assert_eq!(commit.headers(), &s3.headers().await?[..]);

    // a replica behind
    let s2 = fixture.fs_with(&[commit1_tree()]).await?;
    s2.commit(&commit).await?;
    assert_eq!(s2.headers().await?, s3.headers().await?);

    // an empty replica
    let empty = fixture.memory_fs().await?;
    empty.commit(&commit).await?;
    assert_eq!(empty.headers().await?, s3.headers().await?);
    for h in s3.headers().await?.iter().skip(1).filter(|h| h.is_file()) {
        assert_eq!(empty.file_parts(h.path()).await?, s3.file_parts(h.path()).await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_get_commit_rejects_future_version() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let fs = fixture.fs_with(&[commit1_tree()]).await?;
    let err = fs.get_commit(2).await.unwrap_err();
    assert!(matches!(
        err,
        FsError::VersionOutOfRange {
            requested: 2,
            current: 1
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_get_commit_at_head_carries_root_only() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let fs = fixture.fs_with(&sample_trees()).await?;
    let commit = fs.get_commit(3).await?;
    assert_eq!(commit.headers().len(), 1);
    assert_eq!(commit.base(), 3);
    assert!(commit.body().is_empty());

    let err = fs.commit(&commit).await.unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(fs.version().await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_gap_commit_needs_known_base() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let s3 = fixture.fs_with(&sample_trees()).await?;
    let s1 = fixture.fs_with(&[commit1_tree()]).await?;

    // based on version 2, which the replica never saw
    let commit = s3.get_commit(2).await?;
    let err = s1.commit(&commit).await.unwrap_err();
    assert!(matches!(
        err,
        FsError::Validation(ValidationError::MalformedCommit(_))
    ));
    assert_eq!(s1.version().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_sync_commit_survives_the_wire() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let s3 = fixture.fs_with(&sample_trees()).await?;
    let s1 = fixture.fs_with(&[commit1_tree()]).await?;

    let bytes = s3.get_commit(1).await?.to_bytes()?;
    let commit = Commit::from_bytes(&bytes)?;
    s1.commit(&commit).await?;
    assert_eq!(s1.root().await?, s3.root().await?);
    Ok(())
}

#[tokio::test]
async fn test_prune_history_falls_back_to_snapshot() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let s3 = fixture.fs_with(&sample_trees()).await?;

    let stats = s3.prune_history(3).await?;
    assert_eq!(stats.log_entries, 2);
    // first revisions of /A/a.txt and /readme.txt
    assert_eq!(stats.manifests, 2);
    assert_eq!(stats.parts, 2);

    // the head entry is never pruned
    assert_eq!(s3.prune_history(u64::MAX).await?.log_entries, 0);

    let commit = s3.get_commit(1).await?;
    assert!(commit.is_snapshot());

    let s1 = fixture.fs_with(&[commit1_tree()]).await?;
    s1.commit(&commit).await?;
    assert_eq!(s1.headers().await?, s3.headers().await?);

    // live content is untouched
    for h in s3.headers().await?.iter().skip(1).filter(|h| h.is_file()) {
        let parts = s3.file_parts(h.path()).await?;
        assert_eq!(parts.iter().map(|p| p.len() as u64).sum::<u64>(), h.file_size());
    }
    Ok(())
}

#[tokio::test]
async fn test_fork_after_sync_uses_replaced_entry() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let source = fixture.fs_with(&[commit1_tree(), commit2_tree()]).await?;
    let replica = fixture.fs_with(&[commit1_tree(), commit2_tree()]).await?;

    // a higher-hash fork of version 2 lands on the source only
    let updated = source.root().await?.updated();
    let base = fixture.fs_with(&[commit1_tree()]).await?;
    let fork = base.make_commit(&fixture.keypair, &commit3_tree(), updated).await?;
    let current = source.root().await?.hash();
    if fork.hash() < current {
        // the fork loses; nothing to replace
        assert!(source.commit(&fork).await.is_err());
        return Ok(());
    }
    source.commit(&fork).await?;

    // the replica learns about it through an incremental commit from 1
    let commit = source.get_commit(1).await?;
    replica.commit(&commit).await?;
    assert_eq!(replica.headers().await?, source.headers().await?);
    Ok(())
}

#[tokio::test]
async fn test_fork_after_snapshot_sync_asks_for_resync() -> anyhow::Result<()> {
    let fixture = TestFixture::new();
    let base = fixture.fs_with(&[commit1_tree(), commit2_tree()]).await?;
    let a = fixture.make_next(&base, &commit3_tree()).await?;
    let b = fixture
        .make_next(&base, &commit3_tree().with_file("/extra.txt", "extra"))
        .await?;
    let (low, high) = if a.hash() < b.hash() { (a, b) } else { (b, a) };

    let source = fixture.fs_with(&[commit1_tree(), commit2_tree()]).await?;
    source.commit(&low).await?;

    // one replica reaches version 3 through a snapshot, one through a gap
    let from_snapshot = fixture.memory_fs().await?;
    from_snapshot.commit(&source.get_commit(0).await?).await?;
    let from_gap = fixture.fs_with(&[commit1_tree()]).await?;
    from_gap.commit(&source.get_commit(1).await?).await?;

    assert_eq!(source.commit(&high).await?, Succession::Fork);

    for (replica, reachable) in [(&from_snapshot, 0), (&from_gap, 1)] {
        let err = replica.commit(&high).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(
            matches!(
                err,
                FsError::ResyncRequired { ver: 3, base: 2, reachable: r } if r == reachable
            ),
            "{err}"
        );
        assert_eq!(replica.root().await?, *low.root().unwrap());

        let snapshot = source.get_commit(0).await?;
        assert_eq!(replica.commit(&snapshot).await?, Succession::Fork);
        assert_eq!(replica.headers().await?, source.headers().await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_sqlite_tree_persists() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tree.db");
    let fixture = TestFixture::new();

    let headers = {
        let fs = fixture.create_fs(SqliteStore::open(&path)?).await?;
        for tree in sample_trees() {
            fixture.commit_tree(&fs, &tree).await?;
        }
        fs.headers().await?
    };

    let fs = FileSystem::open(SqliteStore::open(&path)?, fixture.public_key(), FsConfig::default())
        .await?;
    assert_eq!(fs.version().await?, 3);
    assert_eq!(fs.headers().await?, headers);
    assert_eq!(
        fs.file_parts("/readme.txt").await?.concat(),
        commit3_tree().get("/readme.txt").unwrap().to_vec()
    );

    // SQLite and memory replicas agree
    let memory = fixture.fs_with(&sample_trees()).await?;
    assert_eq!(memory.get_commit(0).await?, fs.get_commit(0).await?);

    let err = FileSystem::open(
        SqliteStore::open(&path)?,
        TestFixture::with_seed([1; 32]).public_key(),
        FsConfig::default(),
    )
    .await
    .err();
    assert!(matches!(err, Some(FsError::OwnerMismatch)));

    let err = fixture.create_fs(SqliteStore::open(&path)?).await.err();
    assert!(matches!(err, Some(FsError::AlreadyInitialized)));
    Ok(())
}

#[tokio::test]
async fn test_open_empty_store() {
    let fixture = TestFixture::new();
    let err = FileSystem::open(MemoryStore::new(), fixture.public_key(), FsConfig::default())
        .await
        .err();
    assert!(matches!(err, Some(FsError::NotInitialized)));

    let err = FileSystem::create(MemoryStore::new(), fixture.public_key(), 0, T0, FsConfig::default())
        .await
        .err();
    assert!(matches!(err, Some(FsError::Core(_))));
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn replicas_converge(history in generators::tree_history(5, 6), split in 0usize..5) {
        block_on(async {
            let fixture = TestFixture::new();
            let source = fixture.memory_fs().await.unwrap();
            let replica = fixture.memory_fs().await.unwrap();
            let split = split.min(history.len());

            for (i, tree) in history.iter().enumerate() {
                let commit = fixture.commit_tree(&source, tree).await.unwrap();
                if i < split {
                    replica.commit(&commit).await.unwrap();
                }
            }

            // every file reads back as written
            let last = history.last().unwrap();
            for path in last.paths().filter(|p| !p.ends_with('/')) {
                let parts = source.file_parts(path).await.unwrap();
                assert_eq!(parts.concat(), last.get(path).unwrap().to_vec());
            }

            let from = replica.version().await.unwrap();
            if from < source.version().await.unwrap() {
                let commit = source.get_commit(from).await.unwrap();
                replica.commit(&commit).await.unwrap();
            }
            assert_eq!(replica.headers().await.unwrap(), source.headers().await.unwrap());

            let fresh = fixture.memory_fs().await.unwrap();
            fresh.commit(&source.get_commit(0).await.unwrap()).await.unwrap();
            assert_eq!(fresh.headers().await.unwrap(), source.headers().await.unwrap());
        });
    }
}
