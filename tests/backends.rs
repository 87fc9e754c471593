mod common;

use std::path::Path;

use packzip::{
    AnyArchive, Archive, ArchiveError, BufferedZip, ExplodedDir, OpenOptions, Source, StreamingZip,
    open_archive,
};

use common::{epub_bytes, epub_entries, init_logging};

fn write_epub(dir: &Path) -> String {
    let path = dir.join("book.epub");
    std::fs::write(&path, epub_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

fn explode_epub(dir: &Path) -> String {
    let root = dir.join("book");
    for (name, content) in epub_entries() {
        let file = root.join(name);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }
    root.to_string_lossy().into_owned()
}

/// Every listed entry exists and reads back as expected; unlisted ones don't
async fn check_listing_contract(archive: &dyn Archive) {
    let mut listed = archive.list_entries().await.unwrap();
    let mut expected: Vec<_> = epub_entries().iter().map(|(n, _)| n.to_string()).collect();
    listed.sort();
    expected.sort();
    assert_eq!(listed, expected);

    for (name, content) in epub_entries() {
        assert!(archive.has_entry(name).await, "{} should exist", name);
        let opened = archive.open_entry_stream(name).await.unwrap();
        assert_eq!(opened.length, content.len() as u64);
        assert_eq!(opened.read_to_vec().await.unwrap(), content);
    }

    for missing in ["nope.xhtml", "OEBPS", "META-INF/"] {
        assert!(!archive.has_entry(missing).await, "{} shouldn't exist", missing);
        let err = archive.open_entry_stream(missing).await.unwrap_err();
        assert!(err.is_not_found(), "{}: {:?}", missing, err);
    }
}

async fn check_reset(archive: &dyn Archive) {
    let (name, content) = epub_entries().pop().unwrap();
    let opened = archive.open_entry_stream(name).await.unwrap();
    let again = opened.reset().await.unwrap();
    assert_eq!(opened.read_to_vec().await.unwrap(), content);
    assert_eq!(again.read_to_vec().await.unwrap(), content);
}

#[tokio::test]
async fn streaming_local_zip() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let archive = StreamingZip::open(&write_epub(dir.path())).await.unwrap();

    assert_eq!(archive.source(), Source::LocalFile);
    // Directory entries are neither listed nor counted
    assert_eq!(archive.entry_count(), 4);
    assert!(archive.has_entries());
    assert_eq!(
        archive.list_entries().await.unwrap(),
        vec![
            "mimetype",
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/chapter1.xhtml"
        ]
    );

    check_listing_contract(&archive).await;
    check_reset(&archive).await;

    // Entry paths are case-sensitive
    assert!(!archive.has_entry("Mimetype").await);
    archive.release();
}

#[tokio::test]
async fn buffered_local_zip() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let archive = BufferedZip::open(write_epub(dir.path())).await.unwrap();

    assert_eq!(archive.entry_count(), 4);
    check_listing_contract(&archive).await;
    check_reset(&archive).await;
}

#[tokio::test]
async fn exploded_directory() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let archive = ExplodedDir::open(explode_epub(dir.path())).await.unwrap();

    assert_eq!(archive.entry_count(), 0);
    assert!(archive.has_entries());
    check_listing_contract(&archive).await;
    check_reset(&archive).await;

    assert!(!archive.has_entry("../book.epub").await);
    assert!(
        archive
            .open_entry_stream("../book.epub")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn exploded_listing_tracks_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let root = explode_epub(dir.path());
    let archive = ExplodedDir::open(&root).await.unwrap();

    std::fs::write(Path::new(&root).join("OEBPS/chapter2.xhtml"), "<p/>").unwrap();
    let listed = archive.list_entries().await.unwrap();
    assert!(listed.contains(&"OEBPS/chapter2.xhtml".to_string()));
    assert!(archive.has_entry("OEBPS/chapter2.xhtml").await);
}

#[tokio::test]
async fn exploded_reset_rereads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = explode_epub(dir.path());
    let archive = ExplodedDir::open(&root).await.unwrap();

    let opened = archive.open_entry_stream("OEBPS/content.opf").await.unwrap();
    assert_eq!(opened.reset().await.unwrap().length, 10);
    std::fs::write(Path::new(&root).join("OEBPS/content.opf"), "<package></package>").unwrap();
    let again = opened.reset().await.unwrap();
    assert_eq!(again.read_to_vec().await.unwrap(), b"<package></package>");
}

#[tokio::test]
async fn open_fails_for_missing_resources() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.epub");

    assert!(StreamingZip::open(&missing.to_string_lossy()).await.is_err());
    assert!(BufferedZip::open(&missing).await.is_err());
    assert!(ExplodedDir::open(&missing).await.is_err());

    let file = write_epub(dir.path());
    assert!(matches!(
        ExplodedDir::open(&file).await,
        Err(ArchiveError::NotADirectory(_))
    ));

    let not_zip = dir.path().join("not.zip");
    std::fs::write(&not_zip, "plain text").unwrap();
    assert!(matches!(
        StreamingZip::open(&not_zip.to_string_lossy()).await,
        Err(ArchiveError::InvalidArchive(_))
    ));
}

#[tokio::test]
async fn factory_picks_backend_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let options = OpenOptions::default();

    let zip = open_archive(&write_epub(dir.path()), &options).await.unwrap();
    assert!(matches!(zip, AnyArchive::Streaming(_)));
    assert_eq!(zip.entry_count(), 4);

    let exploded = open_archive(&explode_epub(dir.path()), &options)
        .await
        .unwrap();
    assert!(matches!(exploded, AnyArchive::Exploded(_)));
    check_listing_contract(&exploded).await;
}

#[tokio::test]
async fn release_keeps_open_streams_usable() {
    let dir = tempfile::tempdir().unwrap();
    let archive = StreamingZip::open(&write_epub(dir.path())).await.unwrap();

    let opened = archive.open_entry_stream("mimetype").await.unwrap();
    archive.release();
    archive.release();

    assert!(matches!(opened.reset().await, Err(ArchiveError::Released)));
    assert_eq!(opened.read_to_vec().await.unwrap(), b"application/epub+zip");
    assert!(matches!(
        archive.open_entry_stream("mimetype").await,
        Err(ArchiveError::Released)
    ));
    // The table outlives the reader
    assert!(archive.has_entry("mimetype").await);
}

#[tokio::test]
async fn concurrent_entry_reads() {
    let dir = tempfile::tempdir().unwrap();
    let archive = StreamingZip::open(&write_epub(dir.path())).await.unwrap();

    let (a, b) = tokio::join!(
        archive.open_entry_stream("OEBPS/chapter1.xhtml"),
        archive.open_entry_stream("META-INF/container.xml"),
    );
    assert_eq!(
        a.unwrap().read_to_vec().await.unwrap(),
        common::chapter().into_bytes()
    );
    assert_eq!(
        b.unwrap().read_to_vec().await.unwrap(),
        common::CONTAINER_XML.as_bytes()
    );
}
