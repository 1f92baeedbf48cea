pub mod bundle;
pub mod contracts;
pub mod error;
pub mod testing;

pub use bundle::Repositories;
pub use contracts::{
    BucketRepository, FileRepository, FrameRepository, LastAccessStore, LinkRepository,
    MirrorRepository, NodeRepository, PendingUploadRepository, PointerRepository, ShardRepository,
    UserRepository,
};
pub use error::RepositoryError;
