//! Fetch Pipeline Integration Tests
//!
//! Drives `FetchPipeline` end to end against an in-memory index:
//! index lookup, selection, download, verification, repack and cache.
//!
//! Uses tempfile for isolation - every test owns its cache directory

#[path = "../common/mod.rs"]
mod common;

use common::*;
use pkgrelay_core::errors::RelayError;
use pkgrelay_core::matcher::MatchPolicy;
use pkgrelay_core::{ContentCache, FetchPipeline};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn pipeline_with(index: FakeIndex) -> (TempDir, Arc<FakeIndex>, FetchPipeline) {
    let temp = TempDir::new().unwrap();
    let cache = ContentCache::new(temp.path().join("cache")).unwrap();
    let index = Arc::new(index);
    let pipeline = FetchPipeline::new(index.clone(), cache, MatchPolicy::IndexOrder);
    (temp, index, pipeline)
}

#[tokio::test]
async fn test_samplepkg_miss_then_hit() {
    let (_temp, index, pipeline) = pipeline_with(sample_index());

    let first = pipeline
        .resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false)
        .await
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.version, "1.0.0");
    assert_eq!(first.artifact.as_deref(), Some(SAMPLE_WHEEL));
    assert_eq!(index.downloads(), 1);
    assert_eq!(
        zip_names(&first.bytes),
        vec![
            "samplepkg-1.0.0.dist-info/METADATA",
            "samplepkg/__init__.py",
            "samplepkg/core.py"
        ]
    );

    let second = pipeline
        .resolve_and_fetch("samplepkg", Some("1.0.0"), SAMPLE_TAGS, false)
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(second.sha256, first.sha256);
    assert_eq!(index.downloads(), 1, "cache hit must not download again");
}

#[tokio::test]
async fn test_no_compatible_artifact_is_not_cached() {
    let (_temp, index, pipeline) = pipeline_with(sample_index());

    let err = pipeline
        .resolve_and_fetch("nativeonly", None, "cp39-cp39-manylinux_2_28_x86_64", false)
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::NoCompatibleArtifact { .. }));
    assert_eq!(index.downloads(), 0);
    assert!(pipeline.cache().entries().unwrap().is_empty());
}

#[tokio::test]
async fn test_source_fallback_strips_top_level_dir() {
    let (_temp, _index, pipeline) = pipeline_with(sample_index());

    let outcome = pipeline
        .resolve_and_fetch("samplepkg", None, "cp312-cp312-win_amd64", false)
        .await
        .unwrap();

    assert_eq!(outcome.artifact.as_deref(), Some(SAMPLE_SDIST));
    assert_eq!(
        zip_names(&outcome.bytes),
        vec!["samplepkg/__init__.py", "samplepkg/core.py", "setup.py"]
    );
}

#[tokio::test]
async fn test_integrity_mismatch_caches_nothing() {
    let index = FakeIndex::new().with_release(
        "samplepkg",
        "1.0.0",
        vec![(SAMPLE_WHEEL, sample_wheel(), Digest::Wrong)],
    );
    let (_temp, index, pipeline) = pipeline_with(index);

    let err = pipeline
        .resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "IntegrityMismatch");
    assert_eq!(index.downloads(), 1);
    assert!(pipeline.cache().entries().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_digest_is_accepted() {
    let (_temp, _index, pipeline) = pipeline_with(sample_index());

    let outcome = pipeline
        .resolve_and_fetch("purepkg", None, "py3-none-any", false)
        .await
        .unwrap();
    assert_eq!(outcome.artifact.as_deref(), Some("purepkg-2.0-py3-none-any.whl"));
}

#[tokio::test]
async fn test_force_bypasses_cache() {
    let (_temp, index, pipeline) = pipeline_with(sample_index());

    pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap();
    let forced = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, true).await.unwrap();

    assert!(!forced.cache_hit);
    assert_eq!(index.downloads(), 2);
    assert_eq!(pipeline.cache().entries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_distinct_tag_lists_get_distinct_entries() {
    let (_temp, _index, pipeline) = pipeline_with(sample_index());

    let native = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap();
    let source = pipeline
        .resolve_and_fetch("samplepkg", None, "cp312-cp312-win_amd64", false)
        .await
        .unwrap();

    assert_ne!(native.bytes, source.bytes);
    assert_eq!(pipeline.cache().entries().unwrap().len(), 2);
}

#[tokio::test]
async fn test_tampered_entry_is_refetched() {
    let (_temp, index, pipeline) = pipeline_with(sample_index());

    let first = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap();
    let cached = pipeline.cache().lookup("samplepkg", "1.0.0", SAMPLE_TAGS).unwrap().unwrap();
    fs::write(&cached.path, b"junk").unwrap();

    let second = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap();
    assert!(!second.cache_hit);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(index.downloads(), 2);
}

#[tokio::test]
async fn test_pinned_cached_version_survives_index_outage() {
    let (_temp, index, pipeline) = pipeline_with(sample_index());

    let first = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap();
    index.set_offline(true);

    let pinned = pipeline
        .resolve_and_fetch("samplepkg", Some("1.0.0"), SAMPLE_TAGS, false)
        .await
        .unwrap();
    assert!(pinned.cache_hit);
    assert_eq!(pinned.bytes, first.bytes);
    assert_eq!(index.lookups(), 1, "pinned cache hit must not query the index");

    // Latest-version resolution still needs the index
    let err = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap_err();
    assert_eq!(err.kind(), "IndexLookupError");

    // A pinned miss falls through to the index
    let err = pipeline
        .resolve_and_fetch("samplepkg", Some("1.0.0"), "py3-none-any", false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "IndexLookupError");
}

#[tokio::test]
async fn test_scratch_space_released_on_failure() {
    let scratch = TempDir::new().unwrap();
    let index = FakeIndex::new()
        .with_release(
            "samplepkg",
            "1.0.0",
            vec![(SAMPLE_WHEEL, sample_wheel(), Digest::Wrong)],
        )
        .with_release(
            "brokenpkg",
            "0.1",
            vec![("brokenpkg-0.1-py3-none-any.whl", b"not a zip archive".to_vec(), Digest::Correct)],
        );
    let (_temp, _index, pipeline) = pipeline_with(index);
    let pipeline = pipeline.with_scratch_root(scratch.path());

    let err = pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap_err();
    assert_eq!(err.kind(), "IntegrityMismatch");
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);

    let err = pipeline.resolve_and_fetch("brokenpkg", None, "py3-none-any", false).await.unwrap_err();
    assert_eq!(err.kind(), "ArchiveError");
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);

    assert!(pipeline.cache().entries().unwrap().is_empty());
}

#[tokio::test]
async fn test_scratch_space_released_on_success() {
    let scratch = TempDir::new().unwrap();
    let (_temp, _index, pipeline) = pipeline_with(sample_index());
    let pipeline = pipeline.with_scratch_root(scratch.path());

    pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await.unwrap();
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_package_and_version() {
    let (_temp, _index, pipeline) = pipeline_with(sample_index());

    let err = pipeline.resolve_and_fetch("nosuchpkg", None, SAMPLE_TAGS, false).await.unwrap_err();
    assert!(matches!(err, RelayError::PackageNotFound(_)));

    let err = pipeline
        .resolve_and_fetch("samplepkg", Some("9.9.9"), SAMPLE_TAGS, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::VersionNotFound { .. }));
}

#[tokio::test]
async fn test_invalid_requests_skip_the_index() {
    let (_temp, index, pipeline) = pipeline_with(sample_index());

    let err = pipeline.resolve_and_fetch("", None, SAMPLE_TAGS, false).await.unwrap_err();
    assert!(err.is_client_error());
    let err = pipeline.resolve_and_fetch("samplepkg", None, "", false).await.unwrap_err();
    assert!(err.is_client_error());
    let err = pipeline.resolve_and_fetch("samplepkg", None, "not-a", false).await.unwrap_err();
    assert!(err.is_client_error());

    assert_eq!(index.lookups(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_download_once() {
    let index = sample_index().with_download_delay(Duration::from_millis(50));
    let (_temp, index, pipeline) = pipeline_with(index);
    let pipeline = Arc::new(pipeline);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.resolve_and_fetch("samplepkg", None, SAMPLE_TAGS, false).await
        }));
    }

    let mut digests = Vec::new();
    for handle in handles {
        digests.push(handle.await.unwrap().unwrap().sha256);
    }

    assert_eq!(index.downloads(), 1);
    digests.dedup();
    assert_eq!(digests.len(), 1);
}
