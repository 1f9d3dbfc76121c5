use std::sync::Arc;

use qof_core::{
    config::StationSettings, ClientFactory, DefaultFileExtension, FileOperationRequest, FileRecordRepositoryTrait,
    MemoryFileRecordRepository, QofConfig, QofError, UploadBody, ValidationError,
};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

struct TestSetup {
    factory: ClientFactory,
    repo: Arc<MemoryFileRecordRepository>,
    dir: TempDir,
}

fn setup(configure: impl FnOnce(&mut QofConfig)) -> TestSetup {
    let dir = TempDir::new().unwrap();
    let mut config = QofConfig::default();
    config.local.shared = StationSettings {
        filepath: Some(dir.path().join("files").to_string_lossy().to_string()),
        ..Default::default()
    };
    configure(&mut config);

    let repo = Arc::new(MemoryFileRecordRepository::new());
    let extension = Arc::new(DefaultFileExtension::new(repo.clone()));
    let factory = ClientFactory::from_config(&config, extension).unwrap();

    TestSetup { factory, repo, dir }
}

fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[..8].copy_from_slice(&PNG_SIGNATURE);
    data
}

#[tokio::test]
async fn test_photo_round_trip_on_local_disk() {
    let setup = setup(|_| {});
    let client = setup.factory.build_client("local").unwrap();

    let request = FileOperationRequest::new("photo.png", "image/png", 1024).with_directory("/2025/06");
    let file_id = client.upload(UploadBody::from_bytes(png_bytes(1024)), request).await.unwrap();
    assert!(file_id > 0);

    let stored = setup.dir.path().join(format!("files/2025/06/{}.png", file_id));
    assert_eq!(std::fs::metadata(&stored).unwrap().len(), 1024);

    let mut download = client.download(file_id).await.unwrap();
    assert_eq!(download.record.file_type, "image/png");
    let mut data = Vec::new();
    download.stream.read_to_end(&mut data).await.unwrap();
    assert_eq!(data.len(), 1024);
    assert_eq!(&data[..8], &PNG_SIGNATURE);

    assert!(client.delete(file_id).await.unwrap());
    assert!(!stored.exists());
    assert!(client.delete(file_id).await.unwrap());
    assert!(setup.repo.is_empty());
}

#[tokio::test]
async fn test_png_declared_as_pdf() {
    let request = FileOperationRequest::new("report.pdf", "application/pdf", 64);

    let strict = setup(|_| {});
    let client = strict.factory.build_client("local").unwrap();
    let err = client
        .upload(UploadBody::from_bytes(png_bytes(64)), request.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QofError::Validation(ValidationError::ContentTypeMismatch { .. })
    ));
    assert!(strict.repo.is_empty());
    assert!(!strict.dir.path().join("files").exists());

    let relaxed = setup(|config| config.enable_magic_number_detection = false);
    let client = relaxed.factory.build_client("local").unwrap();
    let file_id = client
        .upload(UploadBody::from_bytes(png_bytes(64)), request)
        .await
        .unwrap();
    let record = relaxed.repo.get_by_file_id(file_id).await.unwrap().unwrap();
    assert_eq!(record.file_type, "application/pdf");
}

#[tokio::test]
async fn test_directory_traversal_never_escapes_root() {
    let setup = setup(|_| {});
    let client = setup.factory.build_client("local").unwrap();

    let request = FileOperationRequest::new("evil.png", "image/png", 16).with_directory("../../etc");
    let err = client
        .upload(UploadBody::from_bytes(png_bytes(16)), request)
        .await
        .unwrap_err();

    assert!(matches!(err, QofError::Security { .. }));
    assert!(!err.to_string().contains(&*setup.dir.path().to_string_lossy()));
    assert!(!setup.dir.path().join("etc").exists());
    assert!(setup.repo.is_empty());
}

#[tokio::test]
async fn test_size_limit_and_file_name_rules() {
    let setup = setup(|config| config.max_file_size = 100);
    let client = setup.factory.build_client("local").unwrap();

    let too_big = FileOperationRequest::new("big.png", "image/png", 101);
    assert!(matches!(
        client.upload(UploadBody::from_bytes(png_bytes(101)), too_big).await,
        Err(QofError::Validation(ValidationError::FileTooLarge { .. }))
    ));

    let hidden = FileOperationRequest::new(".env", "text/plain", 10);
    assert!(matches!(
        client.upload(UploadBody::from_bytes(vec![b'a'; 10]), hidden).await,
        Err(QofError::Validation(ValidationError::DotBoundary))
    ));
}

#[tokio::test]
async fn test_stream_longer_than_declared_size_is_refused() {
    let setup = setup(|config| config.max_file_size = 100);
    let client = setup.factory.build_client("local").unwrap();

    let request = FileOperationRequest::new("sneaky.png", "image/png", 10).with_directory("/in");
    let err = client
        .upload(UploadBody::from_bytes(png_bytes(1_000_000)), request)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QofError::Validation(ValidationError::FileTooLarge { max: 100, .. })
    ));
    assert!(setup.repo.is_empty());

    let leftovers: Vec<_> = std::fs::read_dir(setup.dir.path().join("files/in")).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_and_downloads() {
    let setup = setup(|_| {});
    let client = setup.factory.build_client("local").unwrap();

    let mut uploads = Vec::new();
    for i in 0..16u8 {
        let client = client.clone();
        uploads.push(tokio::spawn(async move {
            let mut data = png_bytes(256 + i as usize);
            data[8..].fill(i);
            let request = FileOperationRequest::new(format!("p{}.png", i), "image/png", data.len() as u64)
                .with_directory("/shared");
            let file_id = client.upload(UploadBody::from_bytes(data.clone()), request).await.unwrap();
            (file_id, data)
        }));
    }

    let mut uploaded = Vec::new();
    for handle in uploads {
        uploaded.push(handle.await.unwrap());
    }

    let mut ids: Vec<_> = uploaded.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);

    let mut downloads = Vec::new();
    for (file_id, expected) in uploaded {
        let client = client.clone();
        downloads.push(tokio::spawn(async move {
            let mut download = client.download(file_id).await.unwrap();
            let mut data = Vec::new();
            download.stream.read_to_end(&mut data).await.unwrap();
            assert_eq!(data, expected);
        }));
    }
    for handle in downloads {
        handle.await.unwrap();
    }

    assert_eq!(setup.repo.list().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_private_files_and_preview() {
    let setup = setup(|_| {});
    let client = setup.factory.build_client("local").unwrap();

    let request = FileOperationRequest::new("scan.png", "image/png", 32).with_owner(42).private();
    let file_id = client.upload(UploadBody::from_bytes(png_bytes(32)), request).await.unwrap();

    assert!(client.authorize(file_id, Some(42)).await.is_ok());
    assert!(matches!(
        client.authorize(file_id, Some(7)).await,
        Err(QofError::AccessDenied(_))
    ));
    assert!(client.preview(file_id).await.is_ok());

    let notes = FileOperationRequest::new("notes.txt", "text/plain", 5);
    let notes_id = client.upload(UploadBody::from_bytes(b"notes".to_vec()), notes).await.unwrap();
    assert!(matches!(client.preview(notes_id).await, Err(QofError::UnsupportedType(_))));
    assert!(client.download(notes_id).await.is_ok());
}

#[tokio::test]
async fn test_named_stations() {
    let dir = TempDir::new().unwrap();
    let archive_root = dir.path().join("archive");
    let setup = setup(|config| {
        config.local.default_storage_station = Some("main".to_string());
        config.local.multiple.insert("main".to_string(), StationSettings::default());
        config.local.multiple.insert(
            "archive".to_string(),
            StationSettings {
                filepath: Some(archive_root.to_string_lossy().to_string()),
                ..Default::default()
            },
        );
    });
    let client = setup.factory.build_client("local").unwrap();
    assert_eq!(client.stations().station_names(), vec!["archive", "main"]);

    let request = FileOperationRequest::new("a.png", "image/png", 16)
        .with_directory("/old")
        .with_station("archive");
    let file_id = client.upload(UploadBody::from_bytes(png_bytes(16)), request).await.unwrap();
    assert!(archive_root.join(format!("old/{}.png", file_id)).exists());

    let mut download = client.download(file_id).await.unwrap();
    let mut data = Vec::new();
    download.stream.read_to_end(&mut data).await.unwrap();
    assert_eq!(data.len(), 16);

    let request = FileOperationRequest::new("b.png", "image/png", 16).with_station("nowhere");
    let file_id = client.upload(UploadBody::from_bytes(png_bytes(16)), request).await.unwrap();
    assert!(setup.dir.path().join(format!("files/{}.png", file_id)).exists());
}

#[test]
fn test_factory_mode_errors() {
    let setup = setup(|_| {});
    assert!(matches!(
        setup.factory.build_client("ftp"),
        Err(QofError::UnsupportedMode { .. })
    ));
    assert!(matches!(
        setup.factory.build_client("cos"),
        Err(QofError::ModeNotEnabled { .. })
    ));
}
