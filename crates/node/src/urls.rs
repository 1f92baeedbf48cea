//! Endpoint paths of the storage-node HTTP surface.

use shardvault_core::Node;

pub fn upload_link(node: &Node, object_key: &str) -> String {
    format!("{}/v2/upload/link/{object_key}", node.base_url())
}

pub fn multipart_link(node: &Node, object_key: &str, parts: u32) -> String {
    format!(
        "{}/v2/upload-multipart/link/{object_key}?parts={parts}",
        node.base_url()
    )
}

pub fn multipart_complete(node: &Node, object_key: &str) -> String {
    format!("{}/v2/upload-multipart-complete/{object_key}", node.base_url())
}

pub fn multipart_abort(node: &Node, object_key: &str) -> String {
    format!("{}/v2/upload-multipart-abort/{object_key}", node.base_url())
}

pub fn exists(node: &Node, object_key: &str) -> String {
    format!("{}/exists/{object_key}", node.base_url())
}

pub fn download_link(node: &Node, object_key: &str) -> String {
    format!("{}/v2/download/link/{object_key}", node.base_url())
}

/// Delete endpoint of the current generation, keyed by node-local object key.
pub fn delete_by_object_key(node: &Node, object_key: &str) -> String {
    format!("{}/v2/shards/{object_key}", node.base_url())
}

/// Delete endpoint of the legacy generation, keyed by content hash.
pub fn delete_by_content_hash(node: &Node, hash: &str) -> String {
    format!("{}/shards/{hash}", node.base_url())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new("n1", "10.1.2.3", 6000)
    }

    #[test]
    fn delete_endpoints_differ_by_generation() {
        assert_eq!(
            delete_by_object_key(&node(), "k1"),
            "http://10.1.2.3:6000/v2/shards/k1"
        );
        assert_eq!(
            delete_by_content_hash(&node(), "abc"),
            "http://10.1.2.3:6000/shards/abc"
        );
    }

    #[test]
    fn multipart_link_carries_part_count() {
        assert_eq!(
            multipart_link(&node(), "k", 4),
            "http://10.1.2.3:6000/v2/upload-multipart/link/k?parts=4"
        );
    }
}
