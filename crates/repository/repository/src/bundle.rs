use std::sync::Arc;

use crate::contracts::{
    BucketRepository, FileRepository, FrameRepository, LastAccessStore, LinkRepository,
    MirrorRepository, NodeRepository, PendingUploadRepository, PointerRepository, ShardRepository,
    UserRepository,
};

/// The full set of repositories the control plane reads and writes.
///
/// Each field can point at a different backend; [`Repositories::from_backend`]
/// covers the common case of one backend implementing every contract.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub buckets: Arc<dyn BucketRepository>,
    pub files: Arc<dyn FileRepository>,
    pub frames: Arc<dyn FrameRepository>,
    pub pointers: Arc<dyn PointerRepository>,
    pub shards: Arc<dyn ShardRepository>,
    pub mirrors: Arc<dyn MirrorRepository>,
    pub links: Arc<dyn LinkRepository>,
    pub uploads: Arc<dyn PendingUploadRepository>,
    pub nodes: Arc<dyn NodeRepository>,
    pub last_access: Arc<dyn LastAccessStore>,
}

impl Repositories {
    /// Use a single backend for every contract.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserRepository
            + BucketRepository
            + FileRepository
            + FrameRepository
            + PointerRepository
            + ShardRepository
            + MirrorRepository
            + LinkRepository
            + PendingUploadRepository
            + NodeRepository
            + LastAccessStore
            + 'static,
    {
        Self {
            users: backend.clone(),
            buckets: backend.clone(),
            files: backend.clone(),
            frames: backend.clone(),
            pointers: backend.clone(),
            shards: backend.clone(),
            mirrors: backend.clone(),
            links: backend.clone(),
            uploads: backend.clone(),
            nodes: backend.clone(),
            last_access: backend,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
