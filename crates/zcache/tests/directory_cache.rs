//! Chunk cache over a directory store

use std::sync::Arc;

use tempfile::TempDir;
use zcache::{
    ArrayVariable, CacheOptions, CacheSettings, ChunkCache, ChunkStore, Config,
    DimensionSeparator, DirectoryStore,
};

#[test]
fn test_write_back_lands_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn ChunkStore> = Arc::new(DirectoryStore::new(temp_dir.path()).unwrap());

    let options = CacheOptions::new(8, DimensionSeparator::Slash, 16)
        .rank(3)
        .var_key("/grp/temperature/");
    let mut cache = ChunkCache::new(options, store).unwrap();

    cache.write([10, 0, 5]).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    cache.write([0, 0, 0]).unwrap().fill(0xEE);
    assert!(!temp_dir.path().join("grp/temperature/10/0/5").exists());

    // Third chunk evicts the least recently used one
    cache.write([0, 0, 1]).unwrap().fill(1);
    assert_eq!(
        std::fs::read(temp_dir.path().join("grp/temperature/10/0/5")).unwrap(),
        vec![1, 2, 3, 4, 5, 6, 7, 8]
    );

    cache.flush_all().unwrap();
    assert_eq!(
        std::fs::read(temp_dir.path().join("grp/temperature/0/0/0")).unwrap(),
        vec![0xEE; 8]
    );
}

#[test]
fn test_reopen_reads_persisted_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.store.root = Some(temp_dir.path().to_path_buf());

    {
        let store: Arc<dyn ChunkStore> = Arc::new(DirectoryStore::new(config.store_root()).unwrap());
        let var = ArrayVariable::from_config("data", 2, 4, &config, store).unwrap();
        var.write_chunk([2, 4], &[4, 3, 2, 1]).unwrap();
        var.close().unwrap();
    }

    config.store.writable = false;
    let store: Arc<dyn ChunkStore> =
        Arc::new(DirectoryStore::open_read_only(config.store_root()).unwrap());
    let var = ArrayVariable::from_config("data", 2, 4, &config, store).unwrap();

    let (data, synthesized) = var.read_chunk([2, 4]).unwrap();
    assert_eq!(data, vec![4, 3, 2, 1]);
    assert!(!synthesized);

    // Absent chunks are synthesized but never written to a read-only store
    let (data, synthesized) = var.read_chunk([0, 0]).unwrap();
    assert_eq!(data, vec![0; 4]);
    assert!(synthesized);
    var.close().unwrap();
    assert!(!temp_dir.path().join("data/0.0").exists());
}

#[test]
fn test_synthesized_chunk_persisted_on_close() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn ChunkStore> = Arc::new(DirectoryStore::new(temp_dir.path()).unwrap());
    let var = ArrayVariable::new("v", 1, 6, DimensionSeparator::Dot, store).unwrap();
    var.set_fill_value(Some(vec![0xAB, 0xCD])).unwrap();

    let (data, synthesized) = var.read_chunk([7]).unwrap();
    assert!(synthesized);
    assert_eq!(data, [0xABu8, 0xCD].repeat(3));

    var.close().unwrap();
    assert_eq!(
        std::fs::read(temp_dir.path().join("v/7")).unwrap(),
        [0xABu8, 0xCD].repeat(3)
    );
}

#[test]
fn test_resize_flushes_to_disk() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DirectoryStore::new(temp_dir.path()).unwrap());
    let var = ArrayVariable::new(
        "v",
        1,
        4,
        DimensionSeparator::Dot,
        Arc::clone(&store) as Arc<dyn ChunkStore>,
    )
    .unwrap();

    for i in 0..3u64 {
        var.write_chunk([i], &[i as u8; 4]).unwrap();
    }
    assert!(store.list_keys().unwrap().is_empty());

    var.set_chunk_cache(CacheSettings::new(0, 1, 0.0).unwrap()).unwrap();
    assert_eq!(var.resident_count(), 0);
    assert_eq!(store.list_keys().unwrap(), vec!["v/0", "v/1", "v/2"]);
}

#[test]
fn test_smaller_chunk_size_rewrites_whole_file() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn ChunkStore> = Arc::new(DirectoryStore::new(temp_dir.path()).unwrap());
    let options = CacheOptions::new(8, DimensionSeparator::Dot, 64)
        .rank(1)
        .var_key("v");
    let mut cache = ChunkCache::new(options, store).unwrap();

    cache.write([0]).unwrap().fill(1);
    cache.flush_all().unwrap();

    cache.reconfigure(4, 64).unwrap();
    cache.write([0]).unwrap().fill(2);
    cache.flush_all().unwrap();

    assert_eq!(std::fs::read(temp_dir.path().join("v/0")).unwrap(), vec![2; 4]);
    assert_eq!(cache.read([0]).unwrap().data, &[2u8; 4]);
}

#[test]
fn test_variable_named_like_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DirectoryStore::new(temp_dir.path()).unwrap());
    let var = ArrayVariable::new(
        "scratch.tmp",
        1,
        4,
        DimensionSeparator::Dot,
        Arc::clone(&store) as Arc<dyn ChunkStore>,
    )
    .unwrap();

    let (data, synthesized) = var.read_chunk([0]).unwrap();
    assert!(synthesized);
    assert_eq!(data, vec![0; 4]);

    var.write_chunk([1], &[6; 4]).unwrap();
    var.close().unwrap();
    assert_eq!(store.list_keys().unwrap(), vec!["scratch.tmp/0", "scratch.tmp/1"]);

    let (data, synthesized) = var.read_chunk([1]).unwrap();
    assert!(!synthesized);
    assert_eq!(data, vec![6; 4]);
}
