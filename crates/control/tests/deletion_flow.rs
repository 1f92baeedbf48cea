use std::sync::Arc;

use chrono::Utc;

use shardvault_audit::EventOutcome;
use shardvault_audit_memory::MemoryAuditStore;
use shardvault_channel::{ChannelMessage, DeleteShardPayload, MemoryChannel, StreamNames};
use shardvault_control::{ControlError, ControlPlane, ControlPlaneBuilder};
use shardvault_core::{
    Bucket, File, FileId, FileShardLink, Frame, FrameId, Mirror, Node, NodeId, Pointer, PointerId,
    ReplicationContract, Shard, ShardId, User,
};
use shardvault_repository::{
    BucketRepository, FileRepository, FrameRepository, LastAccessStore, LinkRepository,
    MirrorRepository, NodeRepository, PointerRepository, Repositories, ShardRepository,
    UserRepository,
};
use shardvault_repository_memory::{FaultPlan, MemoryRepository};

// -- Harness ----------------------------------------------------------------

struct Harness {
    repo: Arc<MemoryRepository>,
    channel: Arc<MemoryChannel>,
    audit: Arc<MemoryAuditStore>,
    plane: ControlPlane,
}

fn harness_with(repo: MemoryRepository) -> Harness {
    let repo = Arc::new(repo);
    let channel = Arc::new(MemoryChannel::new());
    let audit = Arc::new(MemoryAuditStore::new());
    let plane = ControlPlaneBuilder::new()
        .repositories(Repositories::from_backend(Arc::clone(&repo)))
        .node_client(Arc::new(shardvault_node::testing::FakeNodeClient::new()))
        .channel(Arc::clone(&channel) as _)
        .audit(Arc::clone(&audit) as _)
        .build()
        .unwrap();
    Harness {
        repo,
        channel,
        audit,
        plane,
    }
}

fn harness() -> Harness {
    harness_with(MemoryRepository::new())
}

fn reclaim_payloads(h: &Harness) -> Vec<DeleteShardPayload> {
    h.channel
        .published(&StreamNames::default().reclaim)
        .into_iter()
        .filter_map(|m| match m {
            ChannelMessage::DeleteShard(p) => Some(p),
            ChannelMessage::QuotaChanged(_) => None,
        })
        .collect()
}

// -- Seeding ----------------------------------------------------------------

async fn seed_nodes(repo: &MemoryRepository) {
    for (id, port) in [("node1", 4001), ("node2", 4002)] {
        repo.create_node(Node::new(id, "10.0.0.1", port)).await.unwrap();
    }
}

/// A user owning one bucket, with `used` bytes already on the counter.
async fn seed_owner(repo: &MemoryRepository, id: &str, used: u64) -> (User, Bucket) {
    let mut user = User::new(id, format!("{id}@example.com"), 1_000_000);
    user.total_used_space_bytes = used;
    let bucket = Bucket::new(user.id.clone(), user.uuid, format!("{id}-bucket"));
    repo.create_user(user.clone()).await.unwrap();
    repo.create_bucket(bucket.clone()).await.unwrap();
    (user, bucket)
}

/// A current-schema file with one shard held on `node1`.
async fn seed_current(repo: &MemoryRepository, bucket: &Bucket, size: u64) -> File {
    let file = File::current(bucket.id.clone(), "idx", size);
    let hash = format!("token${}", file.id);
    let contract = ReplicationContract::new(NodeId::new("node1"), size).with_hash(&hash);
    let shard = Shard {
        id: ShardId::generate(),
        hash: hash.clone(),
        object_key: format!("key-{}", file.id),
        size,
        contracts: vec![contract.clone()],
    };
    repo.create_mirror(Mirror::established(&hash, contract))
        .await
        .unwrap();
    repo.create_link(FileShardLink::new(file.id.clone(), shard.id.clone(), 0))
        .await
        .unwrap();
    repo.create_shard(shard).await.unwrap();
    repo.create_file(file.clone()).await.unwrap();
    repo.touch_last_access(&file.id, Utc::now()).await.unwrap();
    file
}

/// A legacy file whose frame lists one pointer to a shard held on `node2`.
async fn seed_legacy(repo: &MemoryRepository, bucket: &Bucket, hash: &str) -> File {
    let pointer = Pointer {
        id: PointerId::generate(),
        index: 0,
        hash: hash.into(),
        size: 10,
        parity: false,
        challenges: vec!["c".into()],
        tree: vec!["t".into()],
    };
    let frame = Frame {
        id: FrameId::generate(),
        user: bucket.owner_id.clone(),
        shards: vec![pointer.id.clone()],
        size: 10,
        locked: true,
        bucket_entry: None,
        created: Utc::now(),
    };
    let shard = Shard {
        id: ShardId::generate(),
        hash: hash.into(),
        object_key: String::new(),
        size: 10,
        contracts: vec![ReplicationContract::new(NodeId::new("node2"), 10)],
    };
    let file = File::legacy(bucket.id.clone(), "legacy", 10, frame.id.clone());
    repo.create_pointer(pointer).await.unwrap();
    repo.create_frame(frame).await.unwrap();
    repo.create_shard(shard).await.unwrap();
    repo.create_file(file.clone()).await.unwrap();
    file
}

async fn used(repo: &MemoryRepository, user: &User) -> u64 {
    repo.find_user(&user.id)
        .await
        .unwrap()
        .unwrap()
        .total_used_space_bytes
}

// -- Legacy removal ---------------------------------------------------------

#[tokio::test]
async fn legacy_file_without_frame_only_loses_its_record() {
    let h = harness();
    seed_nodes(&h.repo).await;
    let (_, bucket) = seed_owner(&h.repo, "u1", 0).await;
    let kept = seed_legacy(&h.repo, &bucket, "abc").await;
    let orphan = File::legacy(bucket.id.clone(), "orphan", 5, FrameId::new("gone"));
    h.repo.create_file(orphan.clone()).await.unwrap();

    h.plane.deletions.remove_one(&orphan.id).await.unwrap();
    h.plane.shutdown().await;

    let files = h.repo.files_snapshot();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, kept.id);
    assert_eq!(h.repo.frames_snapshot().len(), 1);
    assert_eq!(h.repo.pointers_snapshot().len(), 1);
    assert_eq!(h.repo.shards_snapshot().len(), 1);
    assert!(reclaim_payloads(&h).is_empty());
}

#[tokio::test]
async fn legacy_removal_cascades_and_reclaims_by_hash() {
    let h = harness();
    seed_nodes(&h.repo).await;
    let (user, bucket) = seed_owner(&h.repo, "u1", 10).await;
    let file = seed_legacy(&h.repo, &bucket, "abc").await;

    h.plane.deletions.remove_one(&file.id).await.unwrap();
    h.plane.shutdown().await;

    assert!(h.repo.files_snapshot().is_empty());
    assert!(h.repo.frames_snapshot().is_empty());
    assert!(h.repo.pointers_snapshot().is_empty());
    assert!(h.repo.shards_snapshot().is_empty());
    assert_eq!(
        reclaim_payloads(&h),
        vec![DeleteShardPayload::by_content_hash(
            "abc",
            "http://10.0.0.1:4002/shards/abc"
        )]
    );
    // Legacy usage was never on the counter.
    assert_eq!(used(&h.repo, &user).await, 10);
}

// -- Current removal --------------------------------------------------------

#[tokio::test]
async fn current_removal_cascades_and_releases_usage() {
    let h = harness();
    seed_nodes(&h.repo).await;
    let (user, bucket) = seed_owner(&h.repo, "u1", 100).await;
    let file = seed_current(&h.repo, &bucket, 100).await;

    h.plane.deletions.remove_one(&file.id).await.unwrap();
    h.plane.shutdown().await;

    assert!(h.repo.files_snapshot().is_empty());
    assert!(h.repo.links_snapshot().is_empty());
    assert!(h.repo.shards_snapshot().is_empty());
    assert!(h.repo.last_access_snapshot().is_empty());
    // The mirror is consumed by reclamation.
    assert!(h.repo.mirrors_snapshot().is_empty());
    assert_eq!(used(&h.repo, &user).await, 0);

    let key = format!("key-{}", file.id);
    assert_eq!(
        reclaim_payloads(&h),
        vec![DeleteShardPayload::by_object_key(
            key.clone(),
            format!("http://10.0.0.1:4001/v2/shards/{key}")
        )]
    );
}

#[tokio::test]
async fn remove_many_releases_once_per_user() {
    let h = harness();
    seed_nodes(&h.repo).await;
    let (alice, first) = seed_owner(&h.repo, "alice", 600).await;
    let second = Bucket::new(alice.id.clone(), alice.uuid, "alice-second");
    h.repo.create_bucket(second.clone()).await.unwrap();
    let (bob, bobs) = seed_owner(&h.repo, "bob", 1_000).await;

    let ids = vec![
        seed_current(&h.repo, &first, 100).await.id,
        seed_current(&h.repo, &first, 200).await.id,
        seed_current(&h.repo, &second, 300).await.id,
        seed_current(&h.repo, &bobs, 400).await.id,
        FileId::new("never-existed"),
    ];

    let mut removed = h.plane.deletions.remove_many(&ids).await.unwrap();
    h.plane.shutdown().await;

    removed.sort();
    let mut expected = ids[..4].to_vec();
    expected.sort();
    assert_eq!(removed, expected);
    assert_eq!(used(&h.repo, &alice).await, 0);
    assert_eq!(used(&h.repo, &bob).await, 600);
    assert_eq!(reclaim_payloads(&h).len(), 4);
}

#[tokio::test]
async fn repeated_removal_has_no_further_effect() {
    let h = harness();
    seed_nodes(&h.repo).await;
    let (user, bucket) = seed_owner(&h.repo, "u1", 500).await;
    let current = seed_current(&h.repo, &bucket, 300).await;
    let legacy = seed_legacy(&h.repo, &bucket, "abc").await;
    let ids = vec![current.id.clone(), legacy.id.clone()];

    assert_eq!(h.plane.deletions.remove_many(&ids).await.unwrap().len(), 2);
    h.plane.shutdown().await;
    let published = reclaim_payloads(&h).len();
    assert_eq!(used(&h.repo, &user).await, 200);

    assert!(h.plane.deletions.remove_many(&ids).await.unwrap().is_empty());
    h.plane.deletions.remove_v1(&[legacy]).await.unwrap();
    h.plane.deletions.remove_v2(&[current]).await.unwrap();
    h.plane.shutdown().await;

    assert_eq!(reclaim_payloads(&h).len(), published);
    assert_eq!(used(&h.repo, &user).await, 200);
}

#[tokio::test]
async fn unknown_schema_version_is_an_error() {
    let h = harness();
    let (_, bucket) = seed_owner(&h.repo, "u1", 0).await;
    let mut file = File::current(bucket.id.clone(), "idx", 1);
    file.version = Some(7);
    h.repo.create_file(file.clone()).await.unwrap();

    let err = h.plane.deletions.remove_one(&file.id).await.unwrap_err();
    assert!(matches!(err, ControlError::UnknownSchemaVersion(7)));
    assert_eq!(h.repo.files_snapshot().len(), 1);

    // Bulk paths skip it instead.
    let removed = h.plane.deletions.remove_many(&[file.id]).await.unwrap();
    assert!(removed.is_empty());
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let h = harness();
    let err = h
        .plane
        .deletions
        .remove_one(&FileId::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::FileNotFound(_)));
}

#[tokio::test]
async fn removal_for_user_checks_ownership() {
    let h = harness();
    seed_nodes(&h.repo).await;
    let (owner, bucket) = seed_owner(&h.repo, "owner", 50).await;
    let (_, other_bucket) = seed_owner(&h.repo, "other", 0).await;
    let file = seed_current(&h.repo, &bucket, 50).await;

    let err = h
        .plane
        .deletions
        .remove_for_user(&bucket.id, &file.id, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::BucketForbidden(_)));

    let err = h
        .plane
        .deletions
        .remove_for_user(&other_bucket.id, &file.id, other_bucket.owner_uuid)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::FileNotFound(_)));

    let err = h
        .plane
        .deletions
        .remove_for_user(&"missing".into(), &file.id, owner.uuid)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::BucketNotFound(_)));

    h.plane
        .deletions
        .remove_for_user(&bucket.id, &file.id, owner.uuid)
        .await
        .unwrap();
    assert!(h.repo.files_snapshot().is_empty());
    assert_eq!(used(&h.repo, &owner).await, 0);
}

// -- Best-effort bulk removal -----------------------------------------------

/// Two current files of one user. Returns the ids and the number of
/// repository calls the seeding makes.
async fn seed_bulk(repo: &MemoryRepository) -> (Vec<FileId>, usize) {
    seed_nodes(repo).await;
    let (_, bucket) = seed_owner(repo, "u1", 30).await;
    let ids = vec![
        seed_current(repo, &bucket, 10).await.id,
        seed_current(repo, &bucket, 20).await.id,
    ];
    (ids, repo.call_count())
}

async fn setup_calls() -> usize {
    seed_bulk(&MemoryRepository::new()).await.1
}

#[tokio::test]
async fn bulk_delete_without_failure_records_nothing() {
    let h = harness();
    let (ids, _) = seed_bulk(&h.repo).await;

    let removed = h.plane.deletions.bulk_delete(&ids).await;
    assert_eq!(removed.len(), 2);
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn bulk_delete_reports_early_failure_with_full_input() {
    // Call 1 loads the files; call 2 is the link lookup.
    let h = harness_with(MemoryRepository::with_faults(FaultPlan::OnCall(
        setup_calls().await + 2,
    )));
    let (ids, _) = seed_bulk(&h.repo).await;

    let removed = h.plane.deletions.bulk_delete(&ids).await;
    assert!(removed.is_empty());

    let events = h.audit.all();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.operation, "bulk_delete");
    assert_eq!(event.outcome, EventOutcome::Failed);
    assert!(event.error.as_deref().unwrap().contains("injected failure"));
    assert_eq!(
        event.input_ids,
        ids.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
    assert!(event.confirmed_ids.is_empty());
    assert_eq!(h.repo.files_snapshot().len(), 2);
}

#[tokio::test]
async fn bulk_delete_keeps_confirmed_ids_on_late_failure() {
    // Calls 1-7 load and remove the records; call 8 is the bucket lookup
    // that precedes the usage release.
    let h = harness_with(MemoryRepository::with_faults(FaultPlan::OnCall(
        setup_calls().await + 8,
    )));
    let (ids, _) = seed_bulk(&h.repo).await;

    let mut removed = h.plane.deletions.bulk_delete(&ids).await;
    removed.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(removed, expected);

    let events = h.audit.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].input_ids.len(), 2);
    let mut confirmed = events[0].confirmed_ids.clone();
    confirmed.sort();
    assert_eq!(
        confirmed,
        expected.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
    assert!(h.repo.files_snapshot().is_empty());
}

// -- Partial failure across generations -------------------------------------

/// A legacy file and a 300 byte current file of one user whose counter holds
/// exactly the current file. Returns the user, both ids and the number of
/// repository calls the seeding makes.
async fn seed_mixed(repo: &MemoryRepository) -> (User, FileId, FileId, usize) {
    seed_nodes(repo).await;
    let (user, bucket) = seed_owner(repo, "u1", 300).await;
    let legacy = seed_legacy(repo, &bucket, "abc").await;
    let current = seed_current(repo, &bucket, 300).await;
    (user, legacy.id, current.id, repo.call_count())
}

async fn mixed_setup_calls() -> usize {
    seed_mixed(&MemoryRepository::new()).await.3
}

#[tokio::test]
async fn legacy_failure_still_releases_removed_current_files() {
    // Call 1 loads the files; call 2 is the frame lookup of the legacy half.
    let h = harness_with(MemoryRepository::with_faults(FaultPlan::OnCall(
        mixed_setup_calls().await + 2,
    )));
    let (user, legacy, current, _) = seed_mixed(&h.repo).await;

    let err = h
        .plane
        .deletions
        .remove_many(&[legacy.clone(), current])
        .await
        .unwrap_err();
    h.plane.shutdown().await;

    assert!(matches!(err, ControlError::Repository(_)));
    let files = h.repo.files_snapshot();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, legacy);
    assert_eq!(used(&h.repo, &user).await, 0);
}

#[tokio::test]
async fn bulk_delete_confirms_the_surviving_generation() {
    let h = harness_with(MemoryRepository::with_faults(FaultPlan::OnCall(
        mixed_setup_calls().await + 2,
    )));
    let (user, legacy, current, _) = seed_mixed(&h.repo).await;

    let removed = h.plane.deletions.bulk_delete(&[legacy, current.clone()]).await;
    h.plane.shutdown().await;

    assert_eq!(removed, vec![current]);
    assert_eq!(used(&h.repo, &user).await, 0);
    let events = h.audit.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].input_ids.len(), 2);
    assert_eq!(events[0].confirmed_ids.len(), 1);
}

#[tokio::test]
async fn late_current_failure_still_releases_usage() {
    // Calls after seeding: 1 loads the files, 2 the links, 3 the shards,
    // 4 and 5 delete the files and last access, 6 deletes the links.
    let h = harness_with(MemoryRepository::with_faults(FaultPlan::OnCall(
        setup_calls().await + 6,
    )));
    let (ids, _) = seed_bulk(&h.repo).await;

    assert!(h.plane.deletions.remove_many(&ids).await.is_err());
    h.plane.shutdown().await;

    assert!(h.repo.files_snapshot().is_empty());
    let user = h.repo.find_user(&"u1".into()).await.unwrap().unwrap();
    assert_eq!(user.total_used_space_bytes, 0);
}
