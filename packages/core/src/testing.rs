//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::daemon::{DaemonFilter, DaemonHandle, DaemonSpec, DaemonState, ProcessManager};
use crate::error::{Error, Result};
use crate::executor::{CommandOutput, CommandRunner};
use crate::label::MountLabel;
use crate::mount::{BindOptions, MountTable};

/// Clock that only moves when something sleeps on it.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }
}

/// Ordered log of side effects shared between fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries whose first word is one of `verbs`, in order.
    pub fn matching(&self, verbs: &[&str]) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| verbs.contains(&e.split(' ').next().unwrap_or_default()))
            .collect()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.matching(&[verb]).len()
    }
}

struct FakeDaemon {
    handle: DaemonHandle,
    label: Option<MountLabel>,
    name: Option<String>,
}

#[derive(Default)]
struct ProcessState {
    live: Vec<FakeDaemon>,
    started: Vec<DaemonSpec>,
    states: VecDeque<DaemonState>,
    logs: String,
    start_error: Option<String>,
    remove_error: Option<String>,
    next_id: u32,
}

impl ProcessState {
    fn allocate(&mut self) -> DaemonHandle {
        self.next_id += 1;
        DaemonHandle::new(format!("d{}", self.next_id))
    }
}

/// Process manager keeping daemons in memory.
pub struct FakeProcessManager {
    journal: Journal,
    state: Mutex<ProcessState>,
}

impl FakeProcessManager {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Mutex::new(ProcessState::default()),
        }
    }

    /// Registers a running daemon labelled for `path`.
    pub fn add_labeled(&self, path: &Path) -> DaemonHandle {
        let mut state = self.state.lock().unwrap();
        let handle = state.allocate();
        state.live.push(FakeDaemon {
            handle: handle.clone(),
            label: Some(MountLabel::for_path(path)),
            name: None,
        });
        handle
    }

    /// Inspect results returned in order; `Running` once exhausted.
    pub fn script_states(&self, states: Vec<DaemonState>) {
        self.state.lock().unwrap().states = states.into();
    }

    pub fn set_logs(&self, logs: &str) {
        self.state.lock().unwrap().logs = logs.to_string();
    }

    pub fn fail_start(&self, output: &str) {
        self.state.lock().unwrap().start_error = Some(output.to_string());
    }

    pub fn fail_remove(&self, output: &str) {
        self.state.lock().unwrap().remove_error = Some(output.to_string());
    }

    pub fn started(&self) -> Vec<DaemonSpec> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn live(&self) -> Vec<DaemonHandle> {
        let state = self.state.lock().unwrap();
        state.live.iter().map(|d| d.handle.clone()).collect()
    }
}

impl ProcessManager for FakeProcessManager {
    fn list(&self, filter: &DaemonFilter) -> Result<Vec<DaemonHandle>> {
        let state = self.state.lock().unwrap();
        let found = match filter {
            DaemonFilter::Label(label) => {
                self.journal.record(format!("list {}", label.path()));
                state
                    .live
                    .iter()
                    .filter(|d| d.label.as_ref() == Some(label))
                    .map(|d| d.handle.clone())
                    .collect()
            }
            DaemonFilter::Name(name) => {
                self.journal.record(format!("list name={name}"));
                state
                    .live
                    .iter()
                    .filter(|d| d.name.as_deref() == Some(name.as_str()))
                    .map(|d| d.handle.clone())
                    .collect()
            }
        };
        Ok(found)
    }

    fn start(&self, spec: &DaemonSpec) -> Result<DaemonHandle> {
        let target = match (&spec.label, &spec.name) {
            (Some(label), _) => label.path().to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => spec.image.clone(),
        };
        self.journal.record(format!("start {target}"));
        let mut state = self.state.lock().unwrap();
        if let Some(output) = &state.start_error {
            return Err(Error::DaemonStart {
                output: output.clone(),
            });
        }
        state.started.push(spec.clone());
        let handle = state.allocate();
        state.live.push(FakeDaemon {
            handle: handle.clone(),
            label: spec.label.clone(),
            name: spec.name.clone(),
        });
        Ok(handle)
    }

    fn inspect(&self, handle: &DaemonHandle) -> Result<DaemonState> {
        self.journal.record(format!("inspect {handle}"));
        let mut state = self.state.lock().unwrap();
        Ok(state.states.pop_front().unwrap_or(DaemonState::Running))
    }

    fn logs(&self, handle: &DaemonHandle) -> Result<String> {
        self.journal.record(format!("logs {handle}"));
        Ok(self.state.lock().unwrap().logs.clone())
    }

    fn remove(&self, handle: &DaemonHandle) -> Result<()> {
        self.journal.record(format!("remove {handle}"));
        let mut state = self.state.lock().unwrap();
        if let Some(output) = &state.remove_error {
            return Err(Error::DaemonStop {
                handle: handle.to_string(),
                output: output.clone(),
            });
        }
        state.live.retain(|d| &d.handle != handle);
        Ok(())
    }
}

#[derive(Default)]
struct MountState {
    mounted: HashMap<PathBuf, bool>,
    calls: HashMap<PathBuf, usize>,
    appear_at: HashMap<PathBuf, usize>,
    binds: Vec<(PathBuf, PathBuf, BindOptions)>,
}

/// Mount table keeping mount points in memory.
pub struct FakeMountTable {
    journal: Journal,
    state: Mutex<MountState>,
}

impl FakeMountTable {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Mutex::new(MountState::default()),
        }
    }

    pub fn set_mounted(&self, path: &Path, mounted: bool) {
        self.state
            .lock()
            .unwrap()
            .mounted
            .insert(path.to_path_buf(), mounted);
    }

    /// The `n`-th status query for `path` (counting from now) finds it mounted.
    pub fn mount_after(&self, path: &Path, n: usize) {
        let mut state = self.state.lock().unwrap();
        let seen = state.calls.get(path).copied().unwrap_or(0);
        state.appear_at.insert(path.to_path_buf(), seen + n);
    }

    pub fn binds(&self) -> Vec<(PathBuf, PathBuf, BindOptions)> {
        self.state.lock().unwrap().binds.clone()
    }
}

impl MountTable for FakeMountTable {
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        self.journal.record(format!("is_mounted {}", path.display()));
        let mut state = self.state.lock().unwrap();
        let calls = state.calls.entry(path.to_path_buf()).or_insert(0);
        *calls += 1;
        let calls = *calls;
        if state.appear_at.get(path).is_some_and(|at| calls >= *at) {
            state.appear_at.remove(path);
            state.mounted.insert(path.to_path_buf(), true);
        }
        Ok(state.mounted.get(path).copied().unwrap_or(false))
    }

    fn bind(&self, source: &Path, target: &Path, options: BindOptions) -> Result<()> {
        self.journal
            .record(format!("bind {} {}", source.display(), target.display()));
        let mut state = self.state.lock().unwrap();
        state
            .binds
            .push((source.to_path_buf(), target.to_path_buf(), options));
        state.mounted.insert(target.to_path_buf(), true);
        Ok(())
    }

    fn unmount(&self, path: &Path) -> Result<()> {
        self.journal.record(format!("unmount {}", path.display()));
        self.set_mounted(path, false);
        Ok(())
    }

    fn force_unmount(&self, path: &Path) -> Result<()> {
        self.journal
            .record(format!("force_unmount {}", path.display()));
        self.set_mounted(path, false);
        Ok(())
    }
}

/// Runner replaying canned outputs and recording command lines.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    outputs: Arc<Mutex<VecDeque<CommandOutput>>>,
    calls: Arc<Mutex<Vec<String>>>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self {
            outputs: Arc::new(Mutex::new(outputs.into())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    fn next(&self, program: &str, args: &[&str]) -> CommandOutput {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line);
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CommandOutput {
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        Ok(self.next(program, args))
    }

    fn run_with_input(&self, program: &str, args: &[&str], input: &str) -> Result<CommandOutput> {
        self.inputs.lock().unwrap().push(input.to_string());
        Ok(self.next(program, args))
    }
}

/// Serves one HTTP response on a local port.
///
/// Returns the base URL and a handle yielding the request head it received.
pub fn serve_once(status: &str, body: &str) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut head = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            head.push(line);
        }
        reader.get_mut().write_all(response.as_bytes()).unwrap();
        head
    });
    (base, server)
}

/// A local URL nobody listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
