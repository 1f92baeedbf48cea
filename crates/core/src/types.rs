use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_id!(UserId, "Legacy user identifier (the account handle buckets were keyed by).");
newtype_id!(BucketId, "Identifies a bucket.");
newtype_id!(FileId, "Identifies a logical file (bucket entry).");
newtype_id!(FrameId, "Identifies a legacy frame.");
newtype_id!(PointerId, "Identifies a legacy pointer.");
newtype_id!(ShardId, "Identifies a shard record.");
newtype_id!(MirrorId, "Identifies a mirror record.");
newtype_id!(NodeId, "Identifies a storage node.");
newtype_id!(LinkId, "Identifies a file-to-shard link.");
newtype_id!(UploadId, "Identifies a pending upload.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let id = FileId::from("file-1");
        assert_eq!(id.as_str(), "file-1");
        assert_eq!(&*id, "file-1");
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(ShardId::generate(), ShardId::generate());
    }

    #[test]
    fn newtype_serializes_transparently() {
        let id = NodeId::new("node-a");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"node-a\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
