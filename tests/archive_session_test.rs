//! Integration tests for archive sessions against a scripted transport.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{media_post, text_post, thread, FakeTransport};
use tempfile::TempDir;
use thread_mirror::api::Transport;
use thread_mirror::archiver::{ArchiveError, ArchiveOptions, ArchiveSession};
use thread_mirror::site::SiteProfile;

const FIRST_IMAGE: u64 = 1_600_000_000_001;
const SECOND_IMAGE: u64 = 1_600_000_000_002;
const THIRD_IMAGE: u64 = 1_600_000_000_003;

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<link rel="stylesheet" href="//s.4cdn.org/css/yotsubluemobile.715.css">
<script src="//s.4cdn.org/js/core.min.1234.js"></script>
<script src="https://static.bid.glass/adunit.js"></script>
</head>
<body>
<div id="bannerCnt" data-src="413.png"></div>
<div class="adg-rects"><iframe src="https://ads.example/"></iframe></div>
<div class="post" id="p100">
  <a href="//i.4cdn.org/po/1600000000001.png"><img src="//i.4cdn.org/po/1600000000001s.jpg"></a>
</div>
<div class="post" id="p101">
  <a href="//i.4cdn.org/po/1600000000002.png"><img src="//i.4cdn.org/po/1600000000002s.jpg"></a>
</div>
<img src="//s.4cdn.org/image/fade.png">
</body>
</html>"#;

const STYLESHEET: &str = "body{background:url(//s.4cdn.org/image/fade.png) repeat-x}\n\
                          .x{background-image:url('/image/buttons/burichan/post_expand_plus.png')}";

const SCRIPT: &str = "var a=1;function initAnalytics(){track()}function applySearch(e){go()}\
                      icon='//s.4cdn.org/image/buttons/refresh.png';";

fn transport() -> FakeTransport {
    FakeTransport::new()
        .with_document(PAGE)
        .with_media(FIRST_IMAGE, b"first image bytes")
        .with_media(SECOND_IMAGE, b"second image bytes")
        .with_asset("css/yotsubluemobile.715.css", STYLESHEET)
        .with_asset("js/core.min.1234.js", SCRIPT)
        .with_asset("image/fade.png", "fade")
        .with_asset("image/buttons/burichan/post_expand_plus.png", "plus")
        .with_asset("image/title/413.png", "banner")
}

fn two_post_thread() -> thread_mirror::api::Thread {
    thread(
        "po",
        570_368,
        vec![
            media_post("po", 100, FIRST_IMAGE, b"first image bytes", true),
            text_post("po", 102),
            media_post("po", 101, SECOND_IMAGE, b"second image bytes", false),
        ],
    )
}

async fn archive(
    fake: &Arc<FakeTransport>,
    dst: &Path,
    options: ArchiveOptions,
) -> Result<thread_mirror::archiver::ArchiveReport, ArchiveError> {
    let transport: Arc<dyn Transport> = Arc::clone(fake) as Arc<dyn Transport>;
    ArchiveSession::new(
        transport,
        Arc::new(SiteProfile::default()),
        dst,
        two_post_thread(),
        options,
    )
    .archive()
    .await
}

fn verify() -> ArchiveOptions {
    ArchiveOptions {
        overwrite: false,
        verify_md5: true,
    }
}

fn root(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("4chan/po/570368")
}

#[tokio::test]
async fn test_mismatching_hash_skips_only_that_image() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    let report = archive(&fake, dir.path(), verify()).await.unwrap();
    let root = root(&dir);

    assert!(root.join("images/1600000000001.png").exists());
    assert!(!root.join("images/1600000000002.png").exists());
    assert!(root.join("thumbs/1600000000001s.jpg").exists());
    assert!(root.join("thumbs/1600000000002s.jpg").exists());
    assert_eq!(
        std::fs::read(root.join("images/1600000000001.png")).unwrap(),
        b"first image bytes"
    );

    // mismatch is retried exactly once
    assert_eq!(fake.fetch_count("media:1600000000001"), 1);
    assert_eq!(fake.fetch_count("media:1600000000002"), 2);
    assert_eq!(report.media_saved, 1);
    assert_eq!(report.thumbnails_saved, 2);
    assert!(report.failures >= 1);
}

#[tokio::test]
async fn test_verification_disabled_keeps_mismatching_image() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    archive(
        &fake,
        dir.path(),
        ArchiveOptions {
            overwrite: false,
            verify_md5: false,
        },
    )
    .await
    .unwrap();

    assert!(root(&dir).join("images/1600000000002.png").exists());
    assert_eq!(fake.fetch_count("media:1600000000002"), 1);
}

#[tokio::test]
async fn test_stylesheet_assets_fetched_once_and_rewritten() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    archive(&fake, dir.path(), verify()).await.unwrap();
    let root = root(&dir);

    // fade.png is referenced by both the page and the stylesheet
    assert_eq!(fake.fetch_count("asset:image/fade.png"), 1);
    assert_eq!(
        fake.fetch_count("asset:image/buttons/burichan/post_expand_plus.png"),
        1
    );
    assert_eq!(fake.fetch_count("asset:css/yotsubluemobile.715.css"), 1);

    let css = std::fs::read_to_string(root.join("css/yotsubluemobile.715.css")).unwrap();
    assert!(css.contains("url(../assets/fade.png)"));
    assert!(css.contains("url('../assets/buttons/burichan/post_expand_plus.png')"));
    assert!(!css.contains("s.4cdn.org"));
    assert!(!css.contains("/image/"));

    assert!(root.join("assets/fade.png").exists());
    assert!(root.join("assets/buttons/burichan/post_expand_plus.png").exists());
}

#[tokio::test]
async fn test_script_is_cleaned_and_stored() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    archive(&fake, dir.path(), verify()).await.unwrap();

    let js = std::fs::read_to_string(root(&dir).join("js/core.min.1234.js")).unwrap();
    assert!(!js.contains("initAnalytics"));
    assert!(js.contains("function applySearch(e){go()}"));
    assert!(js.contains("icon='assets/image/buttons/refresh.png'"));
}

#[tokio::test]
async fn test_page_is_rewritten_to_local_paths() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    archive(&fake, dir.path(), verify()).await.unwrap();
    let root = root(&dir);

    let html = std::fs::read_to_string(root.join("thread.html")).unwrap();
    assert!(html.contains(r#"href="css/yotsubluemobile.715.css""#));
    assert!(html.contains(r#"src="js/core.min.1234.js""#));
    assert!(html.contains(r#"href="images/1600000000001.png""#));
    assert!(html.contains(r#"src="thumbs/1600000000001s.jpg""#));
    assert!(html.contains(r#"<img src="assets/title/413.png">"#));
    assert!(html.contains(r#"<script src="">"#));
    assert!(!html.contains("adg-rects"));
    assert!(!html.contains("4cdn.org"));
    assert!(root.join("assets/title/413.png").exists());
}

#[tokio::test]
async fn test_rerun_without_overwrite_fetches_no_media() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    archive(&fake, dir.path(), verify()).await.unwrap();
    let media_before = fake.fetch_count_prefixed("media:");
    let thumbs_before = fake.fetch_count_prefixed("thumb:");
    let assets_before = fake.fetch_count_prefixed("asset:");

    let report = archive(&fake, dir.path(), verify()).await.unwrap();

    assert_eq!(fake.fetch_count("document"), 2);
    assert_eq!(fake.fetch_count_prefixed("thumb:"), thumbs_before);
    // only the image that never verified is attempted again
    assert_eq!(fake.fetch_count_prefixed("media:"), media_before + 2);
    assert_eq!(fake.fetch_count("media:1600000000001"), 1);
    assert_eq!(fake.fetch_count_prefixed("asset:"), assets_before);
    assert_eq!(report.media_saved, 0);
    assert_eq!(report.thumbnails_saved, 0);
    assert!(report.skipped_existing >= 3);
}

#[tokio::test]
async fn test_overwrite_refetches_everything() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());

    archive(&fake, dir.path(), verify()).await.unwrap();
    archive(
        &fake,
        dir.path(),
        ArchiveOptions {
            overwrite: true,
            verify_md5: true,
        },
    )
    .await
    .unwrap();

    assert_eq!(fake.fetch_count("media:1600000000001"), 2);
    assert_eq!(fake.fetch_count("thumb:1600000000001"), 2);
    assert_eq!(fake.fetch_count("asset:css/yotsubluemobile.715.css"), 2);
}

#[tokio::test]
async fn test_unparsable_document_fails_after_media_completes() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(
        transport().with_document_bytes(&[0xff, 0xfe, b'<', b'h', b't', b'm', b'l']),
    );

    let result = archive(&fake, dir.path(), verify()).await;

    assert!(matches!(result, Err(ArchiveError::Parse(_))));
    assert!(!root(&dir).join("thread.html").exists());
    // media downloads started before the page was parsed still finish
    assert!(root(&dir).join("images/1600000000001.png").exists());
}

#[tokio::test]
async fn test_files_only_saves_original_names() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport());
    let transport: Arc<dyn Transport> = Arc::clone(&fake) as Arc<dyn Transport>;

    let report = ArchiveSession::new(
        transport,
        Arc::new(SiteProfile::default()),
        dir.path(),
        two_post_thread(),
        verify(),
    )
    .archive_files_only()
    .await;

    let root = root(&dir);
    assert!(root.join("upload_100.png").exists());
    assert!(!root.join("upload_101.png").exists());
    assert!(!root.join("thread.html").exists());
    assert_eq!(fake.fetch_count("document"), 0);
    assert_eq!(fake.fetch_count_prefixed("thumb:"), 0);
    assert_eq!(report.media_saved, 1);
}

#[tokio::test]
async fn test_files_only_gives_every_post_its_own_file() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport().with_media(THIRD_IMAGE, b"third image bytes"));
    let transport: Arc<dyn Transport> = Arc::clone(&fake) as Arc<dyn Transport>;

    let mut posts = vec![
        media_post("po", 100, FIRST_IMAGE, b"first image bytes", true),
        media_post("po", 101, SECOND_IMAGE, b"second image bytes", true),
        media_post("po", 102, THIRD_IMAGE, b"third image bytes", true),
    ];
    // post 102's own name equals the name post 101 is moved to
    for (post, name) in posts.iter_mut().zip(["same", "same", "101_same"]) {
        post.attachment.as_mut().unwrap().filename = name.to_string();
    }

    let report = ArchiveSession::new(
        transport,
        Arc::new(SiteProfile::default()),
        dir.path(),
        thread("po", 570_368, posts),
        verify(),
    )
    .archive_files_only()
    .await;

    let root = root(&dir);
    assert_eq!(std::fs::read(root.join("same.png")).unwrap(), b"first image bytes");
    assert_eq!(
        std::fs::read(root.join("101_same.png")).unwrap(),
        b"second image bytes"
    );
    assert_eq!(
        std::fs::read(root.join("102_101_same.png")).unwrap(),
        b"third image bytes"
    );
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 3);
    assert_eq!(report.media_saved, 3);
}

async fn archive_single_post(
    fake: &Arc<FakeTransport>,
    dst: &Path,
    bytes: &[u8],
) -> thread_mirror::archiver::ArchiveReport {
    let transport: Arc<dyn Transport> = Arc::clone(fake) as Arc<dyn Transport>;
    ArchiveSession::new(
        transport,
        Arc::new(SiteProfile::default()),
        dst,
        thread("po", 570_368, vec![media_post("po", 100, FIRST_IMAGE, bytes, true)]),
        verify(),
    )
    .archive()
    .await
    .unwrap()
}

#[tokio::test]
async fn test_missing_thumbnail_still_saves_image() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(transport().without_thumbnail(FIRST_IMAGE));

    let report = archive_single_post(&fake, dir.path(), b"first image bytes").await;

    let root = root(&dir);
    assert!(!root.join("thumbs/1600000000001s.jpg").exists());
    assert_eq!(
        std::fs::read(root.join("images/1600000000001.png")).unwrap(),
        b"first image bytes"
    );
    assert_eq!(fake.fetch_count("thumb:1600000000001"), 1);
    assert_eq!(report.thumbnails_saved, 0);
    assert_eq!(report.media_saved, 1);
    assert!(report.failures >= 1);
}

#[tokio::test]
async fn test_hash_mismatch_then_good_retry_saves_retried_bytes() {
    let dir = TempDir::new().unwrap();
    let attempts = [Some(b"corrupt".as_slice()), Some(b"intact".as_slice())];
    let fake = Arc::new(transport().with_media_attempts(FIRST_IMAGE, &attempts));

    let report = archive_single_post(&fake, dir.path(), b"intact").await;

    assert_eq!(
        std::fs::read(root(&dir).join("images/1600000000001.png")).unwrap(),
        b"intact"
    );
    assert_eq!(fake.fetch_count("media:1600000000001"), 2);
    assert_eq!(report.media_saved, 1);
}

#[tokio::test]
async fn test_hash_mismatch_then_failed_retry_abandons_image() {
    let dir = TempDir::new().unwrap();
    let attempts = [Some(b"corrupt".as_slice()), None];
    let fake = Arc::new(transport().with_media_attempts(FIRST_IMAGE, &attempts));

    let report = archive_single_post(&fake, dir.path(), b"intact").await;

    let root = root(&dir);
    assert!(!root.join("images/1600000000001.png").exists());
    // the thumbnail is independent of the full image
    assert!(root.join("thumbs/1600000000001s.jpg").exists());
    assert_eq!(fake.fetch_count("media:1600000000001"), 2);
    assert_eq!(report.media_saved, 0);
    assert!(report.failures >= 1);
}

#[tokio::test]
async fn test_assets_sharing_a_local_path_are_fetched_once() {
    let dir = TempDir::new().unwrap();
    let page = r#"<html><body>
<img src="//s.4cdn.org/image/fade.png">
<img src="//s.4cdn.org/icons/fade.png">
</body></html>"#;
    let fake = Arc::new(
        FakeTransport::new()
            .with_document(page)
            .with_asset("image/fade.png", "fade")
            .with_asset("icons/fade.png", "other fade"),
    );
    let transport: Arc<dyn Transport> = Arc::clone(&fake) as Arc<dyn Transport>;

    let report = ArchiveSession::new(
        transport,
        Arc::new(SiteProfile::default()),
        dir.path(),
        thread("po", 570_368, vec![]),
        verify(),
    )
    .archive()
    .await
    .unwrap();

    assert_eq!(
        std::fs::read(root(&dir).join("assets/fade.png")).unwrap(),
        b"fade"
    );
    assert_eq!(fake.fetch_count("asset:image/fade.png"), 1);
    assert_eq!(fake.fetch_count("asset:icons/fade.png"), 0);
    assert_eq!(report.assets_saved, 1);
}
