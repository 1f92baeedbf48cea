use chrono::Utc;

use shardvault_core::{
    Bucket, File, FileShardLink, Frame, FrameId, Mirror, Node, NodeId, PendingUpload, Pointer,
    PointerId, ReplicationContract, Shard, ShardId, ShardRequest, User,
};

use crate::bundle::Repositories;
use crate::error::RepositoryError;

/// Run the full repository conformance test suite.
///
/// Call this from your backend's test module with a fresh, empty backend.
///
/// # Errors
///
/// Returns an error if any backend call fails.
pub async fn run_repository_conformance_tests(repos: &Repositories) -> Result<(), RepositoryError> {
    test_missing_lookups(repos).await?;
    test_usage_counter(repos).await?;
    test_files_by_bucket(repos).await?;
    test_delete_is_idempotent(repos).await?;
    test_shards_by_hash(repos).await?;
    test_mirrors_by_hash(repos).await?;
    test_links_and_uploads(repos).await?;
    test_legacy_records(repos).await?;
    test_nodes(repos).await?;
    Ok(())
}

async fn test_missing_lookups(repos: &Repositories) -> Result<(), RepositoryError> {
    assert!(repos.users.find_user(&"nobody".into()).await?.is_none());
    assert!(repos.buckets.find_bucket(&"nobucket".into()).await?.is_none());
    assert!(repos.files.find_file(&"nofile".into()).await?.is_none());
    assert!(repos.nodes.find_node(&"nonode".into()).await?.is_none());
    let found = repos.files.find_files(&["a".into(), "b".into()]).await?;
    assert!(found.is_empty(), "lookups by id return only existing records");
    Ok(())
}

async fn test_usage_counter(repos: &Repositories) -> Result<(), RepositoryError> {
    let user = User::new("conformance-user", "c@example.com", 1_000);
    let id = user.id.clone();
    repos.users.create_user(user.clone()).await?;

    assert_eq!(repos.users.adjust_used_space(&id, 300).await?, 300);
    assert_eq!(repos.users.adjust_used_space(&id, -100).await?, 200);
    assert_eq!(
        repos.users.adjust_used_space(&id, -500).await?,
        0,
        "usage counter never goes below zero"
    );

    repos.users.set_max_space(&id, 5_000).await?;
    let stored = repos.users.find_user_by_uuid(user.uuid).await?;
    assert_eq!(stored.map(|u| u.max_space_bytes), Some(5_000));

    let missing = repos.users.adjust_used_space(&"ghost".into(), 1).await;
    assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    Ok(())
}

async fn test_files_by_bucket(repos: &Repositories) -> Result<(), RepositoryError> {
    let owner = User::new("bucket-owner", "o@example.com", 10);
    let bucket = Bucket::new(owner.id.clone(), owner.uuid, "photos");
    let other = Bucket::new(owner.id.clone(), owner.uuid, "music");
    repos.buckets.create_bucket(bucket.clone()).await?;
    repos.buckets.create_bucket(other.clone()).await?;

    let first = File::current(bucket.id.clone(), "i1", 1);
    let second = File::current(other.id.clone(), "i2", 2);
    repos.files.create_file(first.clone()).await?;
    repos.files.create_file(second.clone()).await?;

    let owned = repos.buckets.find_buckets_by_owner(&owner.id).await?;
    assert_eq!(owned.len(), 2);

    let in_bucket = repos
        .files
        .find_files_in_buckets(std::slice::from_ref(&bucket.id))
        .await?;
    assert_eq!(in_bucket.len(), 1);
    assert_eq!(in_bucket[0].id, first.id);
    Ok(())
}

async fn test_delete_is_idempotent(repos: &Repositories) -> Result<(), RepositoryError> {
    let file = File::current("idem-bucket".into(), "i", 1);
    let id = file.id.clone();
    repos.files.create_file(file).await?;

    assert_eq!(repos.files.delete_files(std::slice::from_ref(&id)).await?, 1);
    assert_eq!(
        repos.files.delete_files(std::slice::from_ref(&id)).await?,
        0,
        "deleting an absent id is not an error"
    );
    assert!(repos.files.find_file(&id).await?.is_none());
    Ok(())
}

async fn test_shards_by_hash(repos: &Repositories) -> Result<(), RepositoryError> {
    let shard = Shard {
        id: ShardId::generate(),
        hash: "conformance-hash".into(),
        object_key: "key-1".into(),
        size: 9,
        contracts: vec![ReplicationContract::new(NodeId::new("n1"), 9)],
    };
    repos.shards.create_shard(shard.clone()).await?;

    let found = repos
        .shards
        .find_shards_by_hashes(&["conformance-hash".into()])
        .await?;
    assert_eq!(found, vec![shard.clone()]);

    let removed = repos
        .shards
        .delete_shards_by_hashes(&["conformance-hash".into()])
        .await?;
    assert_eq!(removed, 1);
    assert!(repos.shards.find_shards(&[shard.id]).await?.is_empty());
    Ok(())
}

async fn test_mirrors_by_hash(repos: &Repositories) -> Result<(), RepositoryError> {
    let contract = ReplicationContract::new(NodeId::new("n1"), 4);
    let mirror = Mirror::established("mirror-hash", contract);
    repos.mirrors.create_mirror(mirror.clone()).await?;

    let found = repos
        .mirrors
        .find_mirrors_by_hashes(&["mirror-hash".into(), "other".into()])
        .await?;
    assert_eq!(found, vec![mirror.clone()]);

    assert_eq!(repos.mirrors.delete_mirrors(&[mirror.id]).await?, 1);
    Ok(())
}

async fn test_links_and_uploads(repos: &Repositories) -> Result<(), RepositoryError> {
    let file = File::current("link-bucket".into(), "i", 1);
    let link = FileShardLink::new(file.id.clone(), ShardId::generate(), 0);
    repos.links.create_link(link.clone()).await?;
    let links = repos
        .links
        .find_links_by_files(std::slice::from_ref(&file.id))
        .await?;
    assert_eq!(links, vec![link.clone()]);
    assert_eq!(repos.links.delete_links(&[link.id]).await?, 1);

    let upload = PendingUpload::new(
        ShardRequest { index: 0, size: 5 },
        ReplicationContract::new(NodeId::new("n1"), 5),
    );
    repos.uploads.create_upload(upload.clone()).await?;
    let uploads = repos
        .uploads
        .find_uploads_by_object_keys(&[upload.object_key.clone(), "missing".into()])
        .await?;
    assert_eq!(uploads, vec![upload.clone()]);
    assert_eq!(repos.uploads.delete_uploads(&[upload.id]).await?, 1);

    repos.last_access.touch_last_access(&file.id, Utc::now()).await?;
    assert_eq!(repos.last_access.delete_last_access(&[file.id]).await?, 1);
    Ok(())
}

async fn test_legacy_records(repos: &Repositories) -> Result<(), RepositoryError> {
    let pointer = Pointer {
        id: PointerId::generate(),
        index: 0,
        hash: "legacy-hash".into(),
        size: 3,
        parity: false,
        challenges: vec!["c".into()],
        tree: vec!["t".into()],
    };
    let frame = Frame {
        id: FrameId::generate(),
        user: "legacy-user".into(),
        shards: vec![pointer.id.clone()],
        size: 3,
        locked: true,
        bucket_entry: None,
        created: Utc::now(),
    };
    repos.pointers.create_pointer(pointer.clone()).await?;
    repos.frames.create_frame(frame.clone()).await?;

    assert_eq!(
        repos.frames.find_frames(std::slice::from_ref(&frame.id)).await?,
        vec![frame.clone()]
    );
    assert_eq!(
        repos.pointers.find_pointers(&frame.shards).await?,
        vec![pointer.clone()]
    );
    assert_eq!(repos.pointers.delete_pointers(&frame.shards).await?, 1);
    assert_eq!(repos.frames.delete_frames(&[frame.id]).await?, 1);
    Ok(())
}

async fn test_nodes(repos: &Repositories) -> Result<(), RepositoryError> {
    let node = Node::new("conformance-node", "127.0.0.1", 9000);
    repos.nodes.create_node(node.clone()).await?;

    assert_eq!(repos.nodes.find_node(&node.id).await?, Some(node.clone()));
    let found = repos
        .nodes
        .find_nodes(&[node.id.clone(), "absent".into()])
        .await?;
    assert_eq!(found, vec![node.clone()]);
    assert!(repos.nodes.list_nodes().await?.contains(&node));
    Ok(())
}
