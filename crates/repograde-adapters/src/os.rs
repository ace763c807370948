//! [`ProcessHandle`] backed by real OS processes.
//!
//! The child is started in its own process group (unix) so the whole tree can be signalled
//! at once. Descendants that escaped the group are found through `sysinfo`'s parent links
//! and signalled individually.

use crate::{AdapterError, CommandSpec, ProcessHandle, ProcessLauncher, UsageSample};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    type Handle = OsProcess;

    fn launch(&self, spec: &CommandSpec) -> Result<OsProcess, AdapterError> {
        let (program, args) = spec.argv.split_first().ok_or(AdapterError::EmptyArgv)?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| AdapterError::Spawn {
            argv: spec.argv.clone(),
            source,
        })?;

        let (tx, rx) = crossbeam_channel::unbounded();
        match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => {
                spawn_reader(out, tx.clone());
                spawn_reader(err, tx);
            }
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::Other(anyhow::anyhow!(
                    "child output pipes were not captured"
                )));
            }
        }

        let root = Pid::from_u32(child.id());
        debug!(pid = child.id(), "spawned");
        Ok(OsProcess {
            child,
            output: rx,
            system: System::new(),
            root,
            exit: None,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

pub struct OsProcess {
    child: Child,
    output: Receiver<String>,
    system: System,
    root: Pid,
    exit: Option<i32>,
}

impl OsProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
    }

    /// Root plus every live descendant, root first. Empty once the root is gone.
    fn tree(&self) -> Vec<Pid> {
        if self.system.process(self.root).is_none() {
            return Vec::new();
        }
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, proc_) in self.system.processes() {
            if proc_.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = proc_.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }
        let mut tree = vec![self.root];
        let mut i = 0;
        while i < tree.len() {
            if let Some(kids) = children.get(&tree[i]) {
                let fresh: Vec<Pid> = kids.iter().copied().filter(|k| !tree.contains(k)).collect();
                tree.extend(fresh);
            }
            i += 1;
        }
        tree
    }

    fn reap(&mut self) -> Option<i32> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit = Some(exit_code(status)),
                Ok(None) => {}
                Err(err) => warn!(%err, "try_wait failed"),
            }
        }
        self.exit
    }
}

impl ProcessHandle for OsProcess {
    fn poll(&mut self) -> std::io::Result<Option<i32>> {
        if let Some(code) = self.exit {
            return Ok(Some(code));
        }
        let status = self.child.try_wait()?;
        self.exit = status.map(exit_code);
        Ok(self.exit)
    }

    fn drain_available_output(&mut self) -> Vec<String> {
        self.output.try_iter().collect()
    }

    fn drain_remaining_output(&mut self, window: Duration) -> Vec<String> {
        let deadline = Instant::now() + window;
        let mut chunks = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.output.recv_timeout(remaining) {
                Ok(chunk) => chunks.push(chunk),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        chunks
    }

    fn sum_tree_usage(&mut self) -> Option<UsageSample> {
        self.refresh();
        let tree = self.tree();
        if tree.is_empty() {
            return None;
        }
        let mut sample = UsageSample::default();
        for pid in tree {
            if let Some(p) = self.system.process(pid) {
                sample.rss_bytes += p.memory();
                sample.cpu_percent += f64::from(p.cpu_usage());
            }
        }
        Some(sample)
    }

    fn terminate_tree(&mut self, grace: Duration) {
        self.refresh();
        let tree = self.tree();
        debug!(root = self.child.id(), members = tree.len(), "terminating process tree");

        signal_tree(self.root, &tree, Signal::Term);

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.reap().is_some() && !any_alive(&tree[1..]) {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        signal_tree(self.root, &tree, Signal::Kill);
        if self.exit.is_none() {
            let _ = self.child.kill();
            match self.child.wait() {
                Ok(status) => self.exit = Some(exit_code(status)),
                Err(err) => warn!(%err, "failed to reap killed child"),
            }
        }
    }
}

impl Drop for OsProcess {
    fn drop(&mut self) {
        // Leftover members of the group (daemonized helpers, a root that was never polled).
        if self.reap().is_none() {
            self.terminate_tree(Duration::ZERO);
        } else {
            #[cfg(unix)]
            signal_group(self.root, Signal::Kill);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
impl Signal {
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

#[cfg(unix)]
fn signal_group(root: Pid, signal: Signal) {
    let pgid = root.as_u32() as libc::pid_t;
    // ESRCH once the group is empty is expected and ignored.
    unsafe {
        libc::kill(-pgid, signal.raw());
    }
}

#[cfg(unix)]
fn signal_tree(root: Pid, tree: &[Pid], signal: Signal) {
    signal_group(root, signal);
    for pid in tree {
        unsafe {
            libc::kill(pid.as_u32() as libc::pid_t, signal.raw());
        }
    }
}

#[cfg(unix)]
fn any_alive(pids: &[Pid]) -> bool {
    pids.iter().any(|pid| is_alive(pid.as_u32()))
}

/// Signal 0 succeeds for zombies too; on Linux those are filtered through `/proc`.
#[cfg(unix)]
pub(crate) fn is_alive(pid: u32) -> bool {
    if unsafe { libc::kill(pid as libc::pid_t, 0) } != 0 {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            // state follows the parenthesised command name
            if let Some(rest) = stat.rsplit_once(')').map(|(_, rest)| rest.trim_start()) {
                return !rest.starts_with('Z') && !rest.starts_with('X');
            }
        }
    }
    true
}

#[cfg(not(unix))]
fn signal_tree(_root: Pid, tree: &[Pid], _signal: Signal) {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(tree), true);
    for pid in tree.iter().rev() {
        if let Some(p) = system.process(*pid) {
            p.kill();
        }
    }
}

#[cfg(not(unix))]
fn any_alive(pids: &[Pid]) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(pids), true);
    pids.iter().any(|pid| system.process(*pid).is_some())
}
