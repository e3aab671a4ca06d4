#[cfg(test)]
mod tests {
    use pitr_core::storage::ObjectStore;
    use tempfile::TempDir;

    use crate::{BackendConfig, CloudStore, LocalBackend};

    fn memory_store(root: &str) -> CloudStore {
        CloudStore::new(BackendConfig::Local {
            backend: LocalBackend::Memory,
            root: root.to_string(),
        })
        .expect("cloud store mem")
    }

    /// Test: memory backend put/get/list/delete
    ///
    /// Purpose
    /// - Validate that keys handed to the store come back unchanged from `list`,
    ///   even though the memory backend nests them under a virtual root.
    /// - Ensure `get` on a missing key is `Ok(None)`, not an error.
    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = memory_store("mem-root");

        assert!(store.get("backups/oplog/missing").await.expect("get").is_none());

        store
            .put("backups/oplog/a.tar.gz", b"a".to_vec())
            .await
            .expect("put a");
        store
            .put("backups/oplog/b.tar.gz", b"bb".to_vec())
            .await
            .expect("put b");
        store
            .put("backups/full_backups/x.gzip", b"x".to_vec())
            .await
            .expect("put x");

        let listed = store.list("backups/oplog/").await.expect("list");
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["backups/oplog/a.tar.gz", "backups/oplog/b.tar.gz"]);

        let data = store.get("backups/oplog/b.tar.gz").await.expect("get b");
        assert_eq!(data, Some(b"bb".to_vec()));

        let outcome = store
            .delete_batch(&["backups/oplog/a.tar.gz".to_string()])
            .await
            .expect("delete");
        assert!(outcome.is_complete());
        assert_eq!(outcome.deleted, vec!["backups/oplog/a.tar.gz".to_string()]);

        let listed = store.list("backups/oplog/").await.expect("list after delete");
        assert_eq!(listed.len(), 1);
    }

    /// Test: listing an absent prefix on the fs backend
    ///
    /// Expected
    /// - An empty list rather than a NotFound error, and objects written afterwards
    ///   are visible with their original keys.
    #[tokio::test]
    async fn test_fs_store_lists_missing_prefix_as_empty() {
        let tmp = TempDir::new().expect("temp dir");
        let store = CloudStore::new(BackendConfig::Local {
            backend: LocalBackend::Fs,
            root: tmp.path().to_string_lossy().into_owned(),
        })
        .expect("fs store");
        assert_eq!(store.provider(), "fs");

        assert!(store.list("oplog/").await.expect("list empty").is_empty());

        store
            .put("oplog/oplog_config.json", b"{}".to_vec())
            .await
            .expect("put");
        let listed = store.list("oplog/").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "oplog/oplog_config.json");
    }
}
