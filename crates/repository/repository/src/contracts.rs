//! Persistence contracts consumed by the control plane.
//!
//! Every delete is "remove if present": deleting an id that does not exist is
//! not an error and simply contributes nothing to the returned count. Lookups
//! by a list of ids return only the records that exist, in no particular
//! order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shardvault_core::{
    Bucket, BucketId, File, FileId, FileShardLink, Frame, FrameId, LinkId, Mirror, MirrorId, Node,
    NodeId, PendingUpload, Pointer, PointerId, Shard, ShardId, UploadId, User, UserId,
};

use crate::error::RepositoryError;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, RepositoryError>;

    async fn create_user(&self, user: User) -> Result<(), RepositoryError>;

    /// Atomically add `delta` bytes (negative to release) to the user's
    /// running usage counter and return the new value.
    ///
    /// The counter never goes below zero. Returns
    /// [`RepositoryError::NotFound`] if the user does not exist.
    async fn adjust_used_space(&self, id: &UserId, delta: i64) -> Result<u64, RepositoryError>;

    /// Replace the user's capacity limit.
    async fn set_max_space(&self, id: &UserId, max_space_bytes: u64)
    -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BucketRepository: Send + Sync {
    async fn find_bucket(&self, id: &BucketId) -> Result<Option<Bucket>, RepositoryError>;

    async fn find_buckets(&self, ids: &[BucketId]) -> Result<Vec<Bucket>, RepositoryError>;

    async fn find_buckets_by_owner(&self, owner: &UserId) -> Result<Vec<Bucket>, RepositoryError>;

    async fn create_bucket(&self, bucket: Bucket) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn find_file(&self, id: &FileId) -> Result<Option<File>, RepositoryError>;

    async fn find_files(&self, ids: &[FileId]) -> Result<Vec<File>, RepositoryError>;

    /// All files stored in any of the given buckets.
    async fn find_files_in_buckets(&self, buckets: &[BucketId])
    -> Result<Vec<File>, RepositoryError>;

    async fn create_file(&self, file: File) -> Result<(), RepositoryError>;

    async fn delete_files(&self, ids: &[FileId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait FrameRepository: Send + Sync {
    async fn find_frames(&self, ids: &[FrameId]) -> Result<Vec<Frame>, RepositoryError>;

    async fn create_frame(&self, frame: Frame) -> Result<(), RepositoryError>;

    async fn delete_frames(&self, ids: &[FrameId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait PointerRepository: Send + Sync {
    async fn find_pointers(&self, ids: &[PointerId]) -> Result<Vec<Pointer>, RepositoryError>;

    async fn create_pointer(&self, pointer: Pointer) -> Result<(), RepositoryError>;

    async fn delete_pointers(&self, ids: &[PointerId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ShardRepository: Send + Sync {
    async fn find_shards(&self, ids: &[ShardId]) -> Result<Vec<Shard>, RepositoryError>;

    async fn find_shards_by_hashes(&self, hashes: &[String]) -> Result<Vec<Shard>, RepositoryError>;

    async fn create_shard(&self, shard: Shard) -> Result<(), RepositoryError>;

    async fn delete_shards(&self, ids: &[ShardId]) -> Result<u64, RepositoryError>;

    async fn delete_shards_by_hashes(&self, hashes: &[String]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait MirrorRepository: Send + Sync {
    /// Mirrors of any of the given shard hashes, established or not.
    async fn find_mirrors_by_hashes(&self, hashes: &[String])
    -> Result<Vec<Mirror>, RepositoryError>;

    async fn create_mirror(&self, mirror: Mirror) -> Result<(), RepositoryError>;

    async fn delete_mirrors(&self, ids: &[MirrorId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn find_links_by_files(&self, files: &[FileId])
    -> Result<Vec<FileShardLink>, RepositoryError>;

    async fn create_link(&self, link: FileShardLink) -> Result<(), RepositoryError>;

    async fn delete_links(&self, ids: &[LinkId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait PendingUploadRepository: Send + Sync {
    async fn find_uploads_by_object_keys(
        &self,
        object_keys: &[String],
    ) -> Result<Vec<PendingUpload>, RepositoryError>;

    async fn create_upload(&self, upload: PendingUpload) -> Result<(), RepositoryError>;

    async fn delete_uploads(&self, ids: &[UploadId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn find_node(&self, id: &NodeId) -> Result<Option<Node>, RepositoryError>;

    async fn find_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, RepositoryError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, RepositoryError>;

    async fn create_node(&self, node: Node) -> Result<(), RepositoryError>;
}

/// Per-file last-access timestamps kept by an external collaborator.
#[async_trait]
pub trait LastAccessStore: Send + Sync {
    async fn touch_last_access(&self, file: &FileId, at: DateTime<Utc>)
    -> Result<(), RepositoryError>;

    async fn delete_last_access(&self, files: &[FileId]) -> Result<u64, RepositoryError>;
}
