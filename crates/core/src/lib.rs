pub mod bucket;
pub mod error;
pub mod file;
pub mod legacy;
pub mod node;
pub mod shard;
pub mod types;
pub mod upload;
pub mod user;

pub use bucket::{Bucket, BucketStatus};
pub use error::CoreError;
pub use file::{File, SchemaVersion};
pub use legacy::{Frame, Pointer};
pub use node::Node;
pub use shard::{
    FileShardLink, HASH_PREFIX_SEPARATOR, Mirror, ReplicationContract, Shard, content_hash,
    disambiguate_hash,
};
pub use types::{
    BucketId, FileId, FrameId, LinkId, MirrorId, NodeId, PointerId, ShardId, UploadId, UserId,
};
pub use upload::{PendingUpload, ShardCommit, ShardRequest, UploadPart};
pub use user::User;
