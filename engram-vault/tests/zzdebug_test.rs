use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use engram_core::activation::ConceptActivation;
use engram_core::config::VaultConfig;
use engram_core::episode::Episode;
use engram_core::traits::IEpisodeStore;
use engram_vault::VaultEngine;

fn episode(id: &str, ts_secs: i64, tags: &[&str], energy: f64) -> Episode {
    let mut e = Episode::new(
        ConceptActivation::SparseIds { active: vec![1, 2, 3] },
        energy,
    );
    e.id = id.to_string();
    e.created_at = Utc.timestamp_opt(ts_secs, 0).unwrap();
    e.tags = tags.iter().map(|t| t.to_string()).collect();
    e
}

fn small_config() -> VaultConfig {
    VaultConfig { segment_size_bytes: 4096, ..Default::default() }
}

#[test]
fn zz_debug_purge() {
    let dir = TempDir::new().unwrap();
    let vault = VaultEngine::open(dir.path(), small_config()).unwrap();
    let mut old_kept = episode("kept", 0, &[], 0.1);
    old_kept.created_at = Utc::now() - Duration::hours(100);
    old_kept.ref_count = 3;
    let mut old_purged = episode("purged", 0, &[], 0.1);
    old_purged.created_at = Utc::now() - Duration::hours(100);
    let young = episode("young", 0, &[], 0.1);

    let id1 = vault.put(old_kept).unwrap();
    let id2 = vault.put(old_purged).unwrap();
    let id3 = vault.put(young).unwrap();
    println!("ids: {} {} {}", id1, id2, id3);

    let seg_path = dir.path().join("segments").join("00000.log");
    let bytes_before = std::fs::read(&seg_path).unwrap();
    println!("before len={}", bytes_before.len());

    let (count, _) = vault.purge_ttl(50, 1, false).unwrap();
    println!("purged count={}", count);

    let bytes_after = std::fs::read(&seg_path).unwrap();
    println!("after len={}", bytes_after.len());
}
