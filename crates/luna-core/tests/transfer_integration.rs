//! File transfer through exec channels, against local and in-memory storage

use std::sync::Arc;

use luna_core::engine::{
    ContainerStateWaiter, FileTransferChannel, PodLifecycleController, PodHandle, PollPolicy,
    TransferSettings,
};
use luna_core::storage::{LocalFsStorage, MemoryStorage, StorageBackend};
use luna_core::testing::{FakeCluster, StageBehavior};
use luna_core::{
    ClusterContext, CopyIn, CopyOut, Executor, LunaConfig, TaskSpec, TeraManifestRenderer,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn single_stage(id: &str, image: &str) -> TaskSpec {
    TaskSpec::new(id, vec![image.to_string()], vec![vec!["true".to_string()]]).unwrap()
}

/// Start the task's pod and wait for the pre-task helper
async fn running_pod(fake: &FakeCluster, task: &TaskSpec) -> PodHandle {
    let client = Arc::new(fake.clone());
    let lifecycle =
        PodLifecycleController::new(client.clone(), Arc::new(TeraManifestRenderer::new().unwrap()));
    let context = ClusterContext::from_config(&LunaConfig::default());
    let (pod, _) = lifecycle.start(task, &context).await.unwrap();

    let waiter = ContainerStateWaiter::new(client, PollPolicy::default(), CancellationToken::new());
    waiter.wait_until_ready(&pod, "pre-task").await.unwrap();
    pod
}

fn transfer(fake: &FakeCluster, storage: Arc<dyn StorageBackend>) -> FileTransferChannel {
    FileTransferChannel::new(
        Arc::new(fake.clone()),
        storage,
        TransferSettings::default(),
        CancellationToken::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_copy_in_places_files_below_container_path() {
    let fake = FakeCluster::new();
    let storage = Arc::new(MemoryStorage::new());
    storage.insert("datasets/v1/train.csv", b"a,b\n1,2\n".to_vec()).unwrap();
    storage.insert("datasets/v1/splits/test.csv", b"a,b\n3,4\n".to_vec()).unwrap();
    storage.insert("datasets/v10/other.csv", b"ignored".to_vec()).unwrap();

    let task = single_stage("copy-in", "img");
    let pod = running_pod(&fake, &task).await;
    let channel = transfer(&fake, storage);

    let sent = channel
        .copy_in(&pod, "pre-task", &CopyIn::new("datasets/v1", "/workspace/eval"))
        .await
        .unwrap();

    assert_eq!(sent, 2);
    assert_eq!(
        fake.pod_file("default", "luna-copy-in", "/workspace/eval/train.csv"),
        Some(b"a,b\n1,2\n".to_vec())
    );
    assert_eq!(
        fake.pod_file("default", "luna-copy-in", "/workspace/eval/splits/test.csv"),
        Some(b"a,b\n3,4\n".to_vec())
    );
    assert_eq!(fake.pod_file("default", "luna-copy-in", "/workspace/eval/other.csv"), None);
}

#[tokio::test(start_paused = true)]
async fn test_empty_prefix_sends_nothing() {
    let fake = FakeCluster::new();
    let task = single_stage("empty", "img");
    let pod = running_pod(&fake, &task).await;
    let channel = transfer(&fake, Arc::new(MemoryStorage::new()));

    let sent = channel
        .copy_in(&pod, "pre-task", &CopyIn::new("missing", "/workspace/model"))
        .await
        .unwrap();
    assert_eq!(sent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_copy_out_of_an_empty_directory_stores_nothing() {
    let fake = FakeCluster::new();
    let task = single_stage("nothing-out", "img");
    let pod = running_pod(&fake, &task).await;
    let storage = Arc::new(MemoryStorage::new());
    let channel = transfer(&fake, storage.clone());

    let stored = channel
        .copy_out(&pod, "pre-task", &CopyOut::new("/workspace/score", "results"))
        .await
        .unwrap();
    assert_eq!(stored, 0);
    assert!(storage.paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_copy_out_of_a_missing_directory_is_an_error() {
    let fake = FakeCluster::new();
    let task = single_stage("missing-out", "img");
    let pod = running_pod(&fake, &task).await;
    let storage = Arc::new(MemoryStorage::new());
    let channel = transfer(&fake, storage.clone());

    let err = channel
        .copy_out(&pod, "pre-task", &CopyOut::new("/workspace/results", "results"))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "LUNA_TRANSFER");
    assert!(err.to_string().contains("tar: /workspace/results: Cannot open"));
    assert!(storage.paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_copy_out_restores_nested_paths() {
    let fake = FakeCluster::new();
    let task = single_stage("copy-out", "img");
    let pod = running_pod(&fake, &task).await;
    assert!(fake.write_pod_file("default", "luna-copy-out", "/workspace/score/summary.json", b"{\"acc\":0.9}"));
    assert!(fake.write_pod_file("default", "luna-copy-out", "/workspace/score/per-class/cat.json", b"{}"));

    let storage = Arc::new(MemoryStorage::new());
    let channel = transfer(&fake, storage.clone());
    let stored = channel
        .copy_out(&pod, "pre-task", &CopyOut::new("/workspace/score", "runs/7"))
        .await
        .unwrap();

    assert_eq!(stored, 2);
    assert_eq!(storage.read("runs/7/summary.json"), Some(b"{\"acc\":0.9}".to_vec()));
    assert_eq!(storage.read("runs/7/per-class/cat.json"), Some(b"{}".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_round_trip_through_local_storage_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let inputs = [
        ("inputs/config.yaml", b"threshold: 0.5\n".to_vec()),
        ("inputs/data/part-0.bin", (0..=255u8).cycle().take(300_000).collect::<Vec<u8>>()),
        ("inputs/data/nested/deep/empty.txt", Vec::new()),
    ];
    for (path, content) in &inputs {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    let fake = FakeCluster::new();
    fake.set_stage_behavior(
        "copier",
        StageBehavior::CopyDir {
            from: "/workspace/eval".to_string(),
            to: "/workspace/score".to_string(),
        },
    );
    let storage = Arc::new(LocalFsStorage::new(dir.path()));
    let executor = Executor::new(
        Arc::new(fake.clone()),
        storage,
        Arc::new(TeraManifestRenderer::new().unwrap()),
        &LunaConfig::default(),
    );

    let task = single_stage("round-trip", "copier")
        .with_copy_in(vec![CopyIn::new("inputs", "/workspace/eval")])
        .with_copy_out(vec![CopyOut::new("/workspace/score", "outputs")]);
    assert_eq!(executor.evaluate(&task).await.unwrap(), 0);

    for (path, content) in &inputs {
        let copied = dir
            .path()
            .join(path.replacen("inputs", "outputs", 1));
        assert_eq!(&std::fs::read(&copied).unwrap(), content, "{}", copied.display());
    }
}
