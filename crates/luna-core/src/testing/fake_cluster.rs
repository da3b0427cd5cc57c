use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use serde_json::Value;

use crate::cluster::{
    AppliedObject, ClusterApplyClient, ClusterError, ClusterResult, ContainerState,
    ContainerStatus, ExecChannel, Manifest, PodStatus, ResourceKey,
};
use crate::engine::framing;
use crate::engine::ContainerRole;

const OUTPUT_CHUNK: usize = 64 * 1024;
const BASE64_LINE: usize = 76;
const DECODE_SPOOL: usize = 4 * 1024 * 1024;

type PodKey = (String, String);

/// What a simulated stage container does once it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageBehavior {
    /// Exit immediately with this code
    Exit(i32),
    /// Never terminate
    Hang,
    /// Write every file path below `dir`, one per line, to `output`
    ListFiles { dir: String, output: String },
    /// Copy every file below `from` to the same relative path below `to`
    CopyDir { from: String, to: String },
}

/// One exec request seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
}

struct SimContainer {
    name: String,
    image: String,
    state: ContainerState,
    marker: bool,
}

struct SimPod {
    pending_reads: usize,
    containers: Vec<SimContainer>,
    files: BTreeMap<String, Vec<u8>>,
    /// Directories that exist without holding any file
    dirs: BTreeSet<String>,
    halted: bool,
}

impl SimPod {
    fn from_manifest(manifest: &Manifest) -> ClusterResult<Self> {
        let invalid = |message: &str| ClusterError::InvalidManifest {
            resource: manifest.describe(),
            message: message.to_string(),
        };
        let init = manifest
            .doc()
            .pointer("/spec/initContainers")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("pod has no initContainers"))?;

        let mut containers = Vec::with_capacity(init.len());
        for container in init {
            let name = container
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("container without name"))?;
            let image = container
                .get("image")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("container without image"))?;
            containers.push(SimContainer {
                name: name.to_string(),
                image: image.to_string(),
                state: ContainerState::Waiting {
                    reason: Some("PodInitializing".to_string()),
                },
                marker: false,
            });
        }

        Ok(Self {
            pending_reads: 1,
            containers,
            files: BTreeMap::new(),
            dirs: init.first().map(created_dirs).unwrap_or_default(),
            halted: false,
        })
    }

    fn has_dir(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        self.dirs.iter().any(|d| d == dir || is_below(d, dir))
            || self.files.keys().any(|path| is_below(path, dir))
    }

    fn observe(&mut self, behaviors: &HashMap<String, StageBehavior>) -> PodStatus {
        if self.pending_reads > 0 {
            self.pending_reads -= 1;
            return PodStatus::Pending;
        }
        self.step(behaviors);
        PodStatus::Containers(
            self.containers
                .iter()
                .map(|c| ContainerStatus::new(c.name.clone(), c.state.clone()))
                .collect(),
        )
    }

    /// Advance the first unfinished init container by one state
    fn step(&mut self, behaviors: &HashMap<String, StageBehavior>) {
        if self.halted {
            return;
        }
        let Some(index) = self
            .containers
            .iter()
            .position(|c| !matches!(c.state, ContainerState::Terminated { .. }))
        else {
            return;
        };

        match self.containers[index].state {
            ContainerState::Waiting { .. } => self.containers[index].state = ContainerState::Running,
            ContainerState::Running => {
                let container = &self.containers[index];
                let exit_code = if is_helper(&container.name) {
                    container.marker.then_some(0)
                } else {
                    let behavior = behaviors
                        .get(&container.image)
                        .cloned()
                        .unwrap_or(StageBehavior::Exit(0));
                    self.run_stage(&behavior)
                };
                if let Some(exit_code) = exit_code {
                    self.containers[index].state = ContainerState::Terminated { exit_code };
                    self.halted = exit_code != 0;
                }
            }
            ContainerState::Terminated { .. } => {}
        }
    }

    fn run_stage(&mut self, behavior: &StageBehavior) -> Option<i32> {
        match behavior {
            StageBehavior::Exit(code) => Some(*code),
            StageBehavior::Hang => None,
            StageBehavior::ListFiles { dir, output } => {
                let listing: String = self
                    .files
                    .keys()
                    .filter(|path| is_below(path, dir))
                    .map(|path| format!("{}\n", path))
                    .collect();
                self.files.insert(output.clone(), listing.into_bytes());
                Some(0)
            }
            StageBehavior::CopyDir { from, to } => {
                let copies: Vec<(String, Vec<u8>)> = self
                    .files
                    .iter()
                    .filter_map(|(path, content)| {
                        relative_to(path, from)
                            .map(|rel| (format!("{}/{}", to.trim_end_matches('/'), rel), content.clone()))
                    })
                    .collect();
                self.files.extend(copies);
                Some(0)
            }
        }
    }

    /// `tar cf - -C dir . | base64`, with the entry names GNU tar writes
    ///
    /// Returns stdout and stderr. A missing `dir` gives no output at all and
    /// tar's complaint on stderr.
    fn export(&self, dir: &str) -> ClusterResult<(Vec<u8>, Vec<u8>)> {
        if !self.has_dir(dir) {
            let stderr = format!(
                "tar: {}: Cannot open: No such file or directory\ntar: Error is not recoverable: exiting now\n",
                dir
            );
            return Ok((Vec::new(), stderr.into_bytes()));
        }

        let mut builder = tar::Builder::new(Vec::new());
        append_raw(&mut builder, "./", tar::EntryType::Directory, &[])?;
        for (path, content) in &self.files {
            if let Some(rel) = relative_to(path, dir) {
                append_raw(
                    &mut builder,
                    &format!("./{}", rel),
                    tar::EntryType::Regular,
                    content,
                )?;
            }
        }
        let archive = builder.into_inner().map_err(exec_error)?;

        let encoded = STANDARD.encode(archive);
        let mut wrapped = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE + 1);
        for line in encoded.as_bytes().chunks(BASE64_LINE) {
            wrapped.extend_from_slice(line);
            wrapped.push(b'\n');
        }
        Ok((wrapped, Vec::new()))
    }

    /// `base64 -d | tar xvfz - -C dir`
    fn import(&mut self, dir: &str, payload: &[u8]) -> ClusterResult<Vec<u8>> {
        let archive = framing::decode_base64(Cursor::new(payload), DECODE_SPOOL)
            .map_err(|e| ClusterError::Exec(e.to_string()))?;
        let mut verbose = Vec::new();
        self.dirs.insert(dir.trim_end_matches('/').to_string());
        let files = &mut self.files;
        framing::for_each_file(GzDecoder::new(archive), |rel, content| {
            verbose.extend_from_slice(format!("{}\n", rel).as_bytes());
            files.insert(format!("{}/{}", dir.trim_end_matches('/'), rel), content);
            Ok(())
        })
        .map_err(|e| ClusterError::Exec(e.to_string()))?;
        Ok(verbose)
    }
}

/// Directories named by `mkdir` in a `bash -c` container script
fn created_dirs(container: &Value) -> BTreeSet<String> {
    let Some(words) = container
        .pointer("/command/2")
        .and_then(Value::as_str)
        .and_then(|script| shell_words::split(script).ok())
    else {
        return BTreeSet::new();
    };

    let mut dirs = BTreeSet::new();
    let mut in_mkdir = false;
    for word in words {
        match word.as_str() {
            "mkdir" => in_mkdir = true,
            "&&" | "||" | ";" => in_mkdir = false,
            flag if flag.starts_with('-') => {}
            dir if in_mkdir => {
                dirs.insert(dir.trim_end_matches('/').to_string());
            }
            _ => {}
        }
    }
    dirs
}

fn is_helper(name: &str) -> bool {
    name == ContainerRole::PreTask.container_name() || name == ContainerRole::PostTask.container_name()
}

fn is_below(path: &str, dir: &str) -> bool {
    relative_to(path, dir).is_some()
}

fn relative_to<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    path.strip_prefix(dir.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

fn exec_error(err: std::io::Error) -> ClusterError {
    ClusterError::Exec(err.to_string())
}

fn append_raw(
    builder: &mut tar::Builder<Vec<u8>>,
    name: &str,
    entry_type: tar::EntryType,
    content: &[u8],
) -> ClusterResult<()> {
    let mut header = tar::Header::new_gnu();
    let raw_name = &mut header.as_old_mut().name;
    if name.len() > raw_name.len() {
        return Err(ClusterError::Exec(format!("path too long for fake tar: {}", name)));
    }
    raw_name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(entry_type);
    header.set_size(content.len() as u64);
    header.set_mode(if entry_type.is_dir() { 0o755 } else { 0o644 });
    header.set_cksum();
    builder.append(&header, content).map_err(exec_error)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExecAction {
    CopyIn { dir: String },
    CopyOut { dir: String },
    Touch { path: String },
}

impl ExecAction {
    fn parse(command: &[String]) -> Option<Self> {
        match command {
            [touch, path] if touch == "touch" => Some(Self::Touch { path: path.clone() }),
            [bash, flag, script] if bash == "bash" && flag == "-c" => {
                let words = shell_words::split(script).ok()?;
                let dir = words
                    .iter()
                    .position(|w| w == "-C")
                    .and_then(|i| words.get(i + 1))
                    .cloned()?;
                if words.iter().any(|w| w == "xvfz") {
                    Some(Self::CopyIn { dir })
                } else if words.first().map(String::as_str) == Some("tar")
                    && words.iter().any(|w| w == "cf")
                {
                    Some(Self::CopyOut { dir })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[derive(Default)]
struct FakeState {
    resources: BTreeMap<ResourceKey, Value>,
    pods: HashMap<PodKey, SimPod>,
    deleted: Vec<ResourceKey>,
    apply_count: usize,
    next_uid: usize,
    rejected_kinds: BTreeSet<String>,
    rejected_names: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    behaviors: HashMap<String, StageBehavior>,
    execs: Vec<ExecRecord>,
    status_reads: usize,
}

/// In-memory [`ClusterApplyClient`]
///
/// Clones share state, so a test can keep one handle for inspection while the
/// engine owns another.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every apply of documents of this kind
    pub fn reject_kind(&self, kind: &str) {
        self.state.lock().rejected_kinds.insert(kind.to_string());
    }

    /// Fail every apply of documents with this name
    pub fn reject_name(&self, name: &str) {
        self.state.lock().rejected_names.insert(name.to_string());
    }

    /// Fail every delete of resources with this name
    pub fn fail_delete(&self, name: &str) {
        self.state.lock().failing_deletes.insert(name.to_string());
    }

    /// Behaviour of stage containers running `image`; unknown images exit 0
    pub fn set_stage_behavior(&self, image: &str, behavior: StageBehavior) {
        self.state.lock().behaviors.insert(image.to_string(), behavior);
    }

    /// Resources currently present
    pub fn resource_keys(&self) -> Vec<ResourceKey> {
        self.state.lock().resources.keys().cloned().collect()
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.state
            .lock()
            .resources
            .keys()
            .any(|k| k.kind == kind && k.name == name)
    }

    /// Resources deleted so far, in order
    pub fn deleted(&self) -> Vec<ResourceKey> {
        self.state.lock().deleted.clone()
    }

    /// Successful applies, re-applies included
    pub fn apply_count(&self) -> usize {
        self.state.lock().apply_count
    }

    pub fn status_reads(&self) -> usize {
        self.state.lock().status_reads
    }

    pub fn execs(&self) -> Vec<ExecRecord> {
        self.state.lock().execs.clone()
    }

    pub fn container_state(&self, namespace: &str, pod: &str, container: &str) -> Option<ContainerState> {
        let state = self.state.lock();
        let sim = state.pods.get(&(namespace.to_string(), pod.to_string()))?;
        sim.containers
            .iter()
            .find(|c| c.name == container)
            .map(|c| c.state.clone())
    }

    pub fn marker_touched(&self, namespace: &str, pod: &str, container: &str) -> bool {
        let state = self.state.lock();
        state
            .pods
            .get(&(namespace.to_string(), pod.to_string()))
            .and_then(|sim| sim.containers.iter().find(|c| c.name == container))
            .is_some_and(|c| c.marker)
    }

    /// Content of a file on the pod's simulated filesystem
    pub fn pod_file(&self, namespace: &str, pod: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .pods
            .get(&(namespace.to_string(), pod.to_string()))
            .and_then(|sim| sim.files.get(path).cloned())
    }

    /// Put a file on the pod's simulated filesystem
    pub fn write_pod_file(&self, namespace: &str, pod: &str, path: &str, content: &[u8]) -> bool {
        let mut state = self.state.lock();
        match state.pods.get_mut(&(namespace.to_string(), pod.to_string())) {
            Some(sim) => {
                sim.files.insert(path.to_string(), content.to_vec());
                true
            }
            None => false,
        }
    }

    fn key_for(manifest: &Manifest, fallback_namespace: &str) -> ClusterResult<ResourceKey> {
        let invalid = |message: &str| ClusterError::InvalidManifest {
            resource: manifest.describe(),
            message: message.to_string(),
        };
        let kind = manifest.kind().ok_or_else(|| invalid("missing kind"))?;
        let name = manifest.name().ok_or_else(|| invalid("missing metadata.name"))?;
        let namespace = manifest.namespace().unwrap_or(fallback_namespace);
        Ok(ResourceKey::new(namespace, kind, name))
    }
}

#[async_trait]
impl ClusterApplyClient for FakeCluster {
    async fn create_or_update(&self, manifest: &Manifest) -> ClusterResult<AppliedObject> {
        let key = Self::key_for(manifest, "default")?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.rejected_kinds.contains(&key.kind) || state.rejected_names.contains(&key.name) {
            return Err(ClusterError::api(
                Some(422),
                format!("{} rejected by admission", manifest.describe()),
            ));
        }

        let uid = match state
            .resources
            .get(&key)
            .and_then(|existing| existing.pointer("/metadata/uid"))
            .and_then(Value::as_str)
        {
            Some(uid) => uid.to_string(),
            None => {
                state.next_uid += 1;
                format!("fake-uid-{}", state.next_uid)
            }
        };
        let mut object = manifest.doc().clone();
        if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("uid".to_string(), Value::String(uid));
            metadata.insert("namespace".to_string(), Value::String(key.namespace.clone()));
        }

        let pod_key = (key.namespace.clone(), key.name.clone());
        if key.kind == "Pod" && !state.pods.contains_key(&pod_key) {
            let sim = SimPod::from_manifest(manifest)?;
            state.pods.insert(pod_key, sim);
        }
        state.resources.insert(key.clone(), object.clone());
        state.apply_count += 1;
        Ok(AppliedObject { key, object })
    }

    async fn delete(&self, manifest: &Manifest, namespace: &str) -> ClusterResult<()> {
        let key = Self::key_for(manifest, namespace)?;
        let mut state = self.state.lock();
        if state.failing_deletes.contains(&key.name) {
            return Err(ClusterError::api(Some(500), format!("cannot delete {}", key)));
        }
        if state.resources.remove(&key).is_some() {
            if key.kind == "Pod" {
                state.pods.remove(&(key.namespace.clone(), key.name.clone()));
            }
            state.deleted.push(key);
        }
        Ok(())
    }

    async fn pod_status(&self, namespace: &str, pod_name: &str) -> ClusterResult<PodStatus> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.status_reads += 1;
        match state.pods.get_mut(&(namespace.to_string(), pod_name.to_string())) {
            Some(sim) => Ok(sim.observe(&state.behaviors)),
            None => Ok(PodStatus::NotFound),
        }
    }

    async fn exec(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[String],
    ) -> ClusterResult<Box<dyn ExecChannel>> {
        let mut state = self.state.lock();
        state.execs.push(ExecRecord {
            pod: pod_name.to_string(),
            container: container.to_string(),
            command: command.to_vec(),
        });

        let pod_key = (namespace.to_string(), pod_name.to_string());
        let sim = state
            .pods
            .get(&pod_key)
            .ok_or_else(|| ClusterError::Exec(format!("pod {}/{} not found", namespace, pod_name)))?;
        let running = sim
            .containers
            .iter()
            .any(|c| c.name == container && c.state == ContainerState::Running);
        if !running {
            return Err(ClusterError::Exec(format!(
                "container {} is not running",
                container
            )));
        }
        let action = ExecAction::parse(command)
            .ok_or_else(|| ClusterError::Exec(format!("unsupported command {:?}", command)))?;
        let (pending, stderr) = match &action {
            ExecAction::CopyOut { dir } => sim.export(dir)?,
            _ => (Vec::new(), Vec::new()),
        };

        Ok(Box::new(FakeExecChannel {
            state: self.state.clone(),
            pod: pod_key,
            container: container.to_string(),
            action,
            stdin: Vec::new(),
            pending,
            stdout: Vec::new(),
            stderr,
            open: true,
        }))
    }
}

/// Exec channel of a [`FakeCluster`]
///
/// Copy-in payloads are extracted on close, copy-out output is delivered in
/// chunks over several polls, and `touch` marks the container's marker.
pub struct FakeExecChannel {
    state: Arc<Mutex<FakeState>>,
    pod: PodKey,
    container: String,
    action: ExecAction,
    stdin: Vec<u8>,
    pending: Vec<u8>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    open: bool,
}

#[async_trait]
impl ExecChannel for FakeExecChannel {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn poll(&mut self, _timeout: Duration) -> ClusterResult<()> {
        if !self.open {
            return Ok(());
        }
        match &self.action {
            ExecAction::CopyIn { .. } => {}
            ExecAction::CopyOut { .. } => {
                let n = self.pending.len().min(OUTPUT_CHUNK);
                self.stdout.extend(self.pending.drain(..n));
                if self.pending.is_empty() {
                    self.open = false;
                }
            }
            ExecAction::Touch { path } => {
                let mut state = self.state.lock();
                if let Some(sim) = state.pods.get_mut(&self.pod) {
                    sim.files.insert(path.clone(), Vec::new());
                    if let Some(container) = sim.containers.iter_mut().find(|c| c.name == self.container) {
                        container.marker = true;
                    }
                }
                self.open = false;
            }
        }
        Ok(())
    }

    fn has_stdout(&self) -> bool {
        !self.stdout.is_empty()
    }

    fn read_stdout(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.stdout)
    }

    fn has_stderr(&self) -> bool {
        !self.stderr.is_empty()
    }

    fn read_stderr(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.stderr)
    }

    async fn write_stdin(&mut self, data: &[u8]) -> ClusterResult<()> {
        if !self.open || !matches!(self.action, ExecAction::CopyIn { .. }) {
            return Err(ClusterError::Exec("stdin is closed".to_string()));
        }
        self.stdin.extend_from_slice(data);
        Ok(())
    }

    async fn close(&mut self) -> ClusterResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let ExecAction::CopyIn { dir } = &self.action else {
            return Ok(());
        };
        if self.stdin.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let sim = state
            .pods
            .get_mut(&self.pod)
            .ok_or_else(|| ClusterError::Exec("pod disappeared during copy-in".to_string()))?;
        let verbose = sim.import(dir, &self.stdin)?;
        self.stdout.extend(verbose);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_manifest(stages: &[&str]) -> Manifest {
        let mut init = vec![json!({"name": "pre-task", "image": "bash"})];
        for (i, image) in stages.iter().enumerate() {
            init.push(json!({"name": format!("task-{}", i + 1), "image": image}));
        }
        init.push(json!({"name": "post-task", "image": "bash"}));
        Manifest::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "luna-x", "namespace": "default"},
            "spec": {"initContainers": init},
        }))
    }

    async fn state_of(fake: &FakeCluster, container: &str) -> Option<ContainerState> {
        match fake.pod_status("default", "luna-x").await.unwrap() {
            PodStatus::Containers(statuses) => statuses
                .into_iter()
                .find(|s| s.name == container)
                .map(|s| s.state),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_helpers_wait_for_marker() {
        let fake = FakeCluster::new();
        fake.create_or_update(&pod_manifest(&["img"])).await.unwrap();

        assert_eq!(fake.pod_status("default", "luna-x").await.unwrap(), PodStatus::Pending);
        assert_eq!(state_of(&fake, "pre-task").await, Some(ContainerState::Running));
        // no marker yet, pre-task keeps running
        assert_eq!(state_of(&fake, "pre-task").await, Some(ContainerState::Running));

        let mut channel = fake
            .exec("default", "luna-x", "pre-task", &framing::marker_command("/tmp/done"))
            .await
            .unwrap();
        channel.poll(Duration::from_secs(1)).await.unwrap();
        assert!(!channel.is_open());
        assert!(fake.marker_touched("default", "luna-x", "pre-task"));

        assert_eq!(
            state_of(&fake, "pre-task").await,
            Some(ContainerState::Terminated { exit_code: 0 })
        );
    }

    #[tokio::test]
    async fn test_failing_stage_halts_pod() {
        let fake = FakeCluster::new();
        fake.set_stage_behavior("bad", StageBehavior::Exit(3));
        fake.create_or_update(&pod_manifest(&["bad", "good"])).await.unwrap();
        {
            let mut state = fake.state.lock();
            let sim = state.pods.values_mut().next().unwrap();
            sim.containers[0].marker = true;
        }

        for _ in 0..10 {
            fake.pod_status("default", "luna-x").await.unwrap();
        }
        assert_eq!(
            fake.container_state("default", "luna-x", "task-1"),
            Some(ContainerState::Terminated { exit_code: 3 })
        );
        assert!(matches!(
            fake.container_state("default", "luna-x", "task-2"),
            Some(ContainerState::Waiting { .. })
        ));
    }

    #[tokio::test]
    async fn test_reapply_keeps_identity() {
        let fake = FakeCluster::new();
        let first = fake.create_or_update(&pod_manifest(&["img"])).await.unwrap();
        let second = fake.create_or_update(&pod_manifest(&["img"])).await.unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.object["metadata"]["uid"], second.object["metadata"]["uid"]);
        assert_eq!(fake.resource_keys().len(), 1);
        assert_eq!(fake.apply_count(), 2);
    }

    #[test]
    fn test_parse_exec_actions() {
        assert_eq!(
            ExecAction::parse(&framing::copy_in_command("/workspace/model")),
            Some(ExecAction::CopyIn {
                dir: "/workspace/model".to_string()
            })
        );
        assert_eq!(
            ExecAction::parse(&framing::copy_out_command("/workspace/my dir")),
            Some(ExecAction::CopyOut {
                dir: "/workspace/my dir".to_string()
            })
        );
        assert_eq!(ExecAction::parse(&["ls".to_string()]), None);
    }

    #[tokio::test]
    async fn test_copy_out_of_missing_dir_reports_on_stderr() {
        let fake = FakeCluster::new();
        let mut manifest = pod_manifest(&["img"]).into_doc();
        manifest["spec"]["initContainers"][0]["command"] =
            json!(["bash", "-c", "mkdir -p /workspace/score && until [ -f /tmp/done ]; do sleep 1; done"]);
        fake.create_or_update(&Manifest::new(manifest)).await.unwrap();
        fake.pod_status("default", "luna-x").await.unwrap();
        fake.pod_status("default", "luna-x").await.unwrap();

        let mut present = fake
            .exec("default", "luna-x", "pre-task", &framing::copy_out_command("/workspace/score"))
            .await
            .unwrap();
        present.poll(Duration::from_secs(1)).await.unwrap();
        assert!(present.has_stdout());
        assert!(!present.has_stderr());

        let mut missing = fake
            .exec("default", "luna-x", "pre-task", &framing::copy_out_command("/workspace/scroe"))
            .await
            .unwrap();
        missing.poll(Duration::from_secs(1)).await.unwrap();
        assert!(!missing.is_open());
        assert!(!missing.has_stdout());
        let stderr = String::from_utf8(missing.read_stderr()).unwrap();
        assert!(stderr.starts_with("tar: /workspace/scroe: Cannot open"));
    }

    #[test]
    fn test_created_dirs_reads_mkdir_words() {
        let container = json!({
            "command": ["bash", "-c", "mkdir -p /workspace/model /workspace/eval/ && until [ -f /tmp/done ]; do sleep 1; done"]
        });
        let dirs: Vec<String> = created_dirs(&container).into_iter().collect();
        assert_eq!(dirs, vec!["/workspace/eval", "/workspace/model"]);
        assert!(created_dirs(&json!({"name": "pre-task"})).is_empty());
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("/workspace/model/a.bin", "/workspace/model"), Some("a.bin"));
        assert_eq!(relative_to("/workspace/model/a.bin", "/workspace/model/"), Some("a.bin"));
        assert_eq!(relative_to("/workspace/modelx/a.bin", "/workspace/model"), None);
    }
}
