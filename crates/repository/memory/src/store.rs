use std::collections::HashSet;
use std::hash::Hash;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use shardvault_core::{
    Bucket, BucketId, File, FileId, FileShardLink, Frame, FrameId, LinkId, Mirror, MirrorId, Node,
    NodeId, PendingUpload, Pointer, PointerId, Shard, ShardId, UploadId, User, UserId,
};
use shardvault_repository::{
    BucketRepository, FileRepository, FrameRepository, LastAccessStore, LinkRepository,
    MirrorRepository, NodeRepository, PendingUploadRepository, PointerRepository,
    RepositoryError, ShardRepository, UserRepository,
};

use crate::fault::{FaultInjector, FaultPlan};

/// In-memory backend implementing every repository contract with `DashMap`.
/// Suitable for development and testing.
///
/// A [`FaultPlan`] can make selected calls fail so that callers' error
/// handling can be exercised. The `*_snapshot` helpers read the raw tables and
/// are not counted as calls.
#[derive(Debug)]
pub struct MemoryRepository {
    users: DashMap<UserId, User>,
    buckets: DashMap<BucketId, Bucket>,
    files: DashMap<FileId, File>,
    frames: DashMap<FrameId, Frame>,
    pointers: DashMap<PointerId, Pointer>,
    shards: DashMap<ShardId, Shard>,
    mirrors: DashMap<MirrorId, Mirror>,
    links: DashMap<LinkId, FileShardLink>,
    uploads: DashMap<UploadId, PendingUpload>,
    nodes: DashMap<NodeId, Node>,
    last_access: DashMap<FileId, DateTime<Utc>>,
    fault: FaultInjector,
}

impl MemoryRepository {
    /// Create a new empty repository that never fails.
    pub fn new() -> Self {
        Self::with_faults(FaultPlan::Never)
    }

    /// Create a new empty repository failing according to `plan`.
    pub fn with_faults(plan: FaultPlan) -> Self {
        Self {
            users: DashMap::new(),
            buckets: DashMap::new(),
            files: DashMap::new(),
            frames: DashMap::new(),
            pointers: DashMap::new(),
            shards: DashMap::new(),
            mirrors: DashMap::new(),
            links: DashMap::new(),
            uploads: DashMap::new(),
            nodes: DashMap::new(),
            last_access: DashMap::new(),
            fault: FaultInjector::new(plan),
        }
    }

    /// Number of contract calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.fault.calls()
    }

    pub fn files_snapshot(&self) -> Vec<File> {
        snapshot(&self.files)
    }

    pub fn shards_snapshot(&self) -> Vec<Shard> {
        snapshot(&self.shards)
    }

    pub fn mirrors_snapshot(&self) -> Vec<Mirror> {
        snapshot(&self.mirrors)
    }

    pub fn links_snapshot(&self) -> Vec<FileShardLink> {
        snapshot(&self.links)
    }

    pub fn uploads_snapshot(&self) -> Vec<PendingUpload> {
        snapshot(&self.uploads)
    }

    pub fn frames_snapshot(&self) -> Vec<Frame> {
        snapshot(&self.frames)
    }

    pub fn pointers_snapshot(&self) -> Vec<Pointer> {
        snapshot(&self.pointers)
    }

    /// Files that still have a recorded last access.
    pub fn last_access_snapshot(&self) -> Vec<FileId> {
        self.last_access
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot<K: Eq + Hash, V: Clone>(map: &DashMap<K, V>) -> Vec<V> {
    map.iter().map(|entry| entry.value().clone()).collect()
}

/// Look up each distinct id once, skipping ids with no record.
fn lookup<K: Eq + Hash, V: Clone>(map: &DashMap<K, V>, ids: &[K]) -> Vec<V> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| map.get(id).map(|entry| entry.value().clone()))
        .collect()
}

fn remove_all<K: Eq + Hash, V>(map: &DashMap<K, V>, ids: &[K]) -> u64 {
    let removed = ids.iter().filter(|id| map.remove(*id).is_some()).count();
    removed as u64
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.fault.tick("find_user")?;
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_user_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, RepositoryError> {
        self.fault.tick("find_user_by_uuid")?;
        Ok(self
            .users
            .iter()
            .find(|u| u.uuid == uuid)
            .map(|u| u.value().clone()))
    }

    async fn create_user(&self, user: User) -> Result<(), RepositoryError> {
        self.fault.tick("create_user")?;
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn adjust_used_space(&self, id: &UserId, delta: i64) -> Result<u64, RepositoryError> {
        self.fault.tick("adjust_used_space")?;
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;
        user.total_used_space_bytes = user.total_used_space_bytes.saturating_add_signed(delta);
        Ok(user.total_used_space_bytes)
    }

    async fn set_max_space(
        &self,
        id: &UserId,
        max_space_bytes: u64,
    ) -> Result<(), RepositoryError> {
        self.fault.tick("set_max_space")?;
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;
        user.max_space_bytes = max_space_bytes;
        Ok(())
    }
}

#[async_trait]
impl BucketRepository for MemoryRepository {
    async fn find_bucket(&self, id: &BucketId) -> Result<Option<Bucket>, RepositoryError> {
        self.fault.tick("find_bucket")?;
        Ok(self.buckets.get(id).map(|b| b.value().clone()))
    }

    async fn find_buckets(&self, ids: &[BucketId]) -> Result<Vec<Bucket>, RepositoryError> {
        self.fault.tick("find_buckets")?;
        Ok(lookup(&self.buckets, ids))
    }

    async fn find_buckets_by_owner(&self, owner: &UserId) -> Result<Vec<Bucket>, RepositoryError> {
        self.fault.tick("find_buckets_by_owner")?;
        Ok(self
            .buckets
            .iter()
            .filter(|b| &b.owner_id == owner)
            .map(|b| b.value().clone())
            .collect())
    }

    async fn create_bucket(&self, bucket: Bucket) -> Result<(), RepositoryError> {
        self.fault.tick("create_bucket")?;
        let duplicate = self
            .buckets
            .iter()
            .any(|b| b.owner_id == bucket.owner_id && b.name == bucket.name && b.id != bucket.id);
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "bucket name {} already used by {}",
                bucket.name, bucket.owner_id
            )));
        }
        self.buckets.insert(bucket.id.clone(), bucket);
        Ok(())
    }
}

#[async_trait]
impl FileRepository for MemoryRepository {
    async fn find_file(&self, id: &FileId) -> Result<Option<File>, RepositoryError> {
        self.fault.tick("find_file")?;
        Ok(self.files.get(id).map(|f| f.value().clone()))
    }

    async fn find_files(&self, ids: &[FileId]) -> Result<Vec<File>, RepositoryError> {
        self.fault.tick("find_files")?;
        Ok(lookup(&self.files, ids))
    }

    async fn find_files_in_buckets(
        &self,
        buckets: &[BucketId],
    ) -> Result<Vec<File>, RepositoryError> {
        self.fault.tick("find_files_in_buckets")?;
        Ok(self
            .files
            .iter()
            .filter(|f| buckets.contains(&f.bucket))
            .map(|f| f.value().clone())
            .collect())
    }

    async fn create_file(&self, file: File) -> Result<(), RepositoryError> {
        self.fault.tick("create_file")?;
        self.files.insert(file.id.clone(), file);
        Ok(())
    }

    async fn delete_files(&self, ids: &[FileId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_files")?;
        Ok(remove_all(&self.files, ids))
    }
}

#[async_trait]
impl FrameRepository for MemoryRepository {
    async fn find_frames(&self, ids: &[FrameId]) -> Result<Vec<Frame>, RepositoryError> {
        self.fault.tick("find_frames")?;
        Ok(lookup(&self.frames, ids))
    }

    async fn create_frame(&self, frame: Frame) -> Result<(), RepositoryError> {
        self.fault.tick("create_frame")?;
        self.frames.insert(frame.id.clone(), frame);
        Ok(())
    }

    async fn delete_frames(&self, ids: &[FrameId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_frames")?;
        Ok(remove_all(&self.frames, ids))
    }
}

#[async_trait]
impl PointerRepository for MemoryRepository {
    async fn find_pointers(&self, ids: &[PointerId]) -> Result<Vec<Pointer>, RepositoryError> {
        self.fault.tick("find_pointers")?;
        Ok(lookup(&self.pointers, ids))
    }

    async fn create_pointer(&self, pointer: Pointer) -> Result<(), RepositoryError> {
        self.fault.tick("create_pointer")?;
        self.pointers.insert(pointer.id.clone(), pointer);
        Ok(())
    }

    async fn delete_pointers(&self, ids: &[PointerId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_pointers")?;
        Ok(remove_all(&self.pointers, ids))
    }
}

#[async_trait]
impl ShardRepository for MemoryRepository {
    async fn find_shards(&self, ids: &[ShardId]) -> Result<Vec<Shard>, RepositoryError> {
        self.fault.tick("find_shards")?;
        Ok(lookup(&self.shards, ids))
    }

    async fn find_shards_by_hashes(&self, hashes: &[String]) -> Result<Vec<Shard>, RepositoryError> {
        self.fault.tick("find_shards_by_hashes")?;
        Ok(self
            .shards
            .iter()
            .filter(|s| hashes.contains(&s.hash))
            .map(|s| s.value().clone())
            .collect())
    }

    async fn create_shard(&self, shard: Shard) -> Result<(), RepositoryError> {
        self.fault.tick("create_shard")?;
        self.shards.insert(shard.id.clone(), shard);
        Ok(())
    }

    async fn delete_shards(&self, ids: &[ShardId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_shards")?;
        Ok(remove_all(&self.shards, ids))
    }

    async fn delete_shards_by_hashes(&self, hashes: &[String]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_shards_by_hashes")?;
        let before = self.shards.len();
        self.shards.retain(|_, s| !hashes.contains(&s.hash));
        Ok((before - self.shards.len()) as u64)
    }
}

#[async_trait]
impl MirrorRepository for MemoryRepository {
    async fn find_mirrors_by_hashes(
        &self,
        hashes: &[String],
    ) -> Result<Vec<Mirror>, RepositoryError> {
        self.fault.tick("find_mirrors_by_hashes")?;
        Ok(self
            .mirrors
            .iter()
            .filter(|m| hashes.contains(&m.shard_hash))
            .map(|m| m.value().clone())
            .collect())
    }

    async fn create_mirror(&self, mirror: Mirror) -> Result<(), RepositoryError> {
        self.fault.tick("create_mirror")?;
        self.mirrors.insert(mirror.id.clone(), mirror);
        Ok(())
    }

    async fn delete_mirrors(&self, ids: &[MirrorId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_mirrors")?;
        Ok(remove_all(&self.mirrors, ids))
    }
}

#[async_trait]
impl LinkRepository for MemoryRepository {
    async fn find_links_by_files(
        &self,
        files: &[FileId],
    ) -> Result<Vec<FileShardLink>, RepositoryError> {
        self.fault.tick("find_links_by_files")?;
        Ok(self
            .links
            .iter()
            .filter(|l| files.contains(&l.file_id))
            .map(|l| l.value().clone())
            .collect())
    }

    async fn create_link(&self, link: FileShardLink) -> Result<(), RepositoryError> {
        self.fault.tick("create_link")?;
        self.links.insert(link.id.clone(), link);
        Ok(())
    }

    async fn delete_links(&self, ids: &[LinkId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_links")?;
        Ok(remove_all(&self.links, ids))
    }
}

#[async_trait]
impl PendingUploadRepository for MemoryRepository {
    async fn find_uploads_by_object_keys(
        &self,
        object_keys: &[String],
    ) -> Result<Vec<PendingUpload>, RepositoryError> {
        self.fault.tick("find_uploads_by_object_keys")?;
        Ok(self
            .uploads
            .iter()
            .filter(|u| object_keys.contains(&u.object_key))
            .map(|u| u.value().clone())
            .collect())
    }

    async fn create_upload(&self, upload: PendingUpload) -> Result<(), RepositoryError> {
        self.fault.tick("create_upload")?;
        self.uploads.insert(upload.id.clone(), upload);
        Ok(())
    }

    async fn delete_uploads(&self, ids: &[UploadId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_uploads")?;
        Ok(remove_all(&self.uploads, ids))
    }
}

#[async_trait]
impl NodeRepository for MemoryRepository {
    async fn find_node(&self, id: &NodeId) -> Result<Option<Node>, RepositoryError> {
        self.fault.tick("find_node")?;
        Ok(self.nodes.get(id).map(|n| n.value().clone()))
    }

    async fn find_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, RepositoryError> {
        self.fault.tick("find_nodes")?;
        Ok(lookup(&self.nodes, ids))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, RepositoryError> {
        self.fault.tick("list_nodes")?;
        Ok(snapshot(&self.nodes))
    }

    async fn create_node(&self, node: Node) -> Result<(), RepositoryError> {
        self.fault.tick("create_node")?;
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }
}

#[async_trait]
impl LastAccessStore for MemoryRepository {
    async fn touch_last_access(
        &self,
        file: &FileId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.fault.tick("touch_last_access")?;
        self.last_access.insert(file.clone(), at);
        Ok(())
    }

    async fn delete_last_access(&self, files: &[FileId]) -> Result<u64, RepositoryError> {
        self.fault.tick("delete_last_access")?;
        Ok(remove_all(&self.last_access, files))
    }
}
