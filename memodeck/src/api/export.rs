//! `.apkg` export: a ZIP holding a snapshot of the collection plus an empty
//! media manifest, importable by Anki desktop.

use crate::clock::Clock;
use crate::context::RequestContext;
use crate::session::{CollectionRef, SessionRegistry};
use crate::Error;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds the archive for one user. The session lock is held only for the
/// checkpoint and the `VACUUM INTO` snapshot; the ZIP is assembled after the
/// lease is released.
pub async fn export(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    zip_level: i64,
) -> Result<(Vec<u8>, String), Error> {
    let now_ms = clock.now_ms();
    let staging = tempfile::tempdir().map_err(|e| Error::Io {
        description: "Failed to create export staging directory.".to_string(),
        source: e,
    })?;
    let snapshot_path = staging.path().join("collection.anki2");

    {
        let lease = registry.acquire(ctx, coll).await?;
        lease.store().checkpoint().await?;
        lease.store().snapshot(&snapshot_path).await?;
    }

    let collection_bytes = tokio::fs::read(&snapshot_path).await.map_err(|e| Error::Io {
        description: format!("Failed to read snapshot {}.", snapshot_path.display()),
        source: e,
    })?;
    let archive = build_apkg(&collection_bytes, zip_level)?;
    let filename = format!("{}_export_{}.apkg", coll.username, now_ms);
    Ok((archive, filename))
}

fn build_apkg(collection_bytes: &[u8], zip_level: i64) -> Result<Vec<u8>, Error> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(zip_level.clamp(0, 9) as i32));

    writer
        .start_file("collection.anki2", options)
        .map_err(|e| Error::Zip { source: e })?;
    writer.write_all(collection_bytes).map_err(|e| Error::Io {
        description: "Failed to write collection into archive.".to_string(),
        source: e,
    })?;

    writer
        .start_file("media", options)
        .map_err(|e| Error::Zip { source: e })?;
    writer.write_all(b"{}").map_err(|e| Error::Io {
        description: "Failed to write media manifest.".to_string(),
        source: e,
    })?;

    let cursor = writer.finish().map_err(|e| Error::Zip { source: e })?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collection::{initialize, CollectionStore, StoreOptions, SAMPLE_NOTES};
    use crate::session::RegistryOptions;
    use std::io::Read;
    use std::sync::Arc;

    #[tokio::test]
    async fn export_packages_collection_and_media_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_1.anki2");
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        initialize(&path, "alice", clock.as_ref()).await.unwrap();
        let registry = SessionRegistry::new(RegistryOptions::default(), clock.clone());
        let coll = CollectionRef {
            username: "alice".to_string(),
            path,
        };
        let ctx = RequestContext::background();

        let (bytes, filename) = export(&registry, &ctx, &coll, clock.as_ref(), 6)
            .await
            .unwrap();
        assert_eq!(filename, format!("alice_export_{}.apkg", clock.now_ms()));

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["collection.anki2", "media"]);

        let mut media = String::new();
        archive.by_name("media").unwrap().read_to_string(&mut media).unwrap();
        assert_eq!(media, "{}");

        let mut collection = Vec::new();
        archive
            .by_name("collection.anki2")
            .unwrap()
            .read_to_end(&mut collection)
            .unwrap();
        assert!(collection.starts_with(b"SQLite format 3\0"));

        // The snapshot must be a complete, openable collection.
        let unpacked = dir.path().join("roundtrip.anki2");
        std::fs::write(&unpacked, &collection).unwrap();
        let store = CollectionStore::open(&unpacked, StoreOptions::default())
            .await
            .unwrap();
        let (cards,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(cards as usize, SAMPLE_NOTES.len());
        store.close().await;
    }

    #[tokio::test]
    async fn reexporting_a_roundtripped_collection_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_1.anki2");
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        initialize(&path, "alice", clock.as_ref()).await.unwrap();
        let registry = SessionRegistry::new(RegistryOptions::default(), clock.clone());
        let coll = CollectionRef {
            username: "alice".to_string(),
            path: path.clone(),
        };
        let ctx = RequestContext::background();

        let (bytes, _) = export(&registry, &ctx, &coll, clock.as_ref(), 6).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut collection = Vec::new();
        archive
            .by_name("collection.anki2")
            .unwrap()
            .read_to_end(&mut collection)
            .unwrap();

        let unpacked = dir.path().join("user_2.anki2");
        std::fs::write(&unpacked, &collection).unwrap();
        let second_coll = CollectionRef {
            username: "alice2".to_string(),
            path: unpacked,
        };
        let (second_bytes, _) = export(&registry, &ctx, &second_coll, clock.as_ref(), 6)
            .await
            .unwrap();
        let mut second_archive = zip::ZipArchive::new(Cursor::new(second_bytes)).unwrap();
        let mut second_collection = Vec::new();
        second_archive
            .by_name("collection.anki2")
            .unwrap()
            .read_to_end(&mut second_collection)
            .unwrap();

        let first = CollectionStore::open(&path, StoreOptions::default()).await.unwrap();
        let roundtripped_path = dir.path().join("check.anki2");
        std::fs::write(&roundtripped_path, &second_collection).unwrap();
        let roundtripped = CollectionStore::open(&roundtripped_path, StoreOptions::default())
            .await
            .unwrap();
        for table in ["cards", "notes", "revlog"] {
            let query = format!("SELECT COUNT(*) FROM {}", table);
            let (a,): (i64,) = sqlx::query_as(&query).fetch_one(first.pool()).await.unwrap();
            let (b,): (i64,) = sqlx::query_as(&query)
                .fetch_one(roundtripped.pool())
                .await
                .unwrap();
            assert_eq!(a, b, "row count mismatch in {}", table);
        }
        let (ids_a, ids_b): (Vec<(i64,)>, Vec<(i64,)>) = (
            sqlx::query_as("SELECT id FROM cards ORDER BY id")
                .fetch_all(first.pool())
                .await
                .unwrap(),
            sqlx::query_as("SELECT id FROM cards ORDER BY id")
                .fetch_all(roundtripped.pool())
                .await
                .unwrap(),
        );
        assert_eq!(ids_a, ids_b);
        first.close().await;
        roundtripped.close().await;
    }
}
