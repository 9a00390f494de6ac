//! Interactive shell supervision
//!
//! The tail end of boot: fork, exec the shell, wait for it to die, launch
//! it again. The loop runs for the remaining lifetime of the init process;
//! there is no fallback if it cannot start.

use std::convert::Infallible;
use std::env;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{access, chdir, execvp, AccessFlags, ForkResult, Pid};

/// Outcome of one fork as seen by the supervisor.
pub enum Forked {
    /// We are still the supervisor; the shell runs as `child`.
    Parent { child: Pid },
    /// We are the freshly forked child, pre-exec.
    Child,
}

/// Platform process primitives.
///
/// Injected into the supervisor so the loop's ordering (spawn after reap,
/// never wait after a failed fork) can be exercised with a scripted fake.
pub trait ProcessOps {
    /// Check that `path` may be executed.
    fn can_execute(&mut self, path: &Path) -> bool;

    /// Arrange for the hang-up signal to set `flag`, then raise it once
    /// against ourselves as a self-test.
    fn install_hangup(&mut self, flag: Arc<AtomicBool>) -> std::io::Result<()>;

    fn fork(&mut self) -> nix::Result<Forked>;

    /// Replace the child image with `shell -i`, working directory `$HOME`,
    /// environment inherited. Only returns on failure.
    fn exec_shell(&mut self, shell: &Path) -> Errno;

    /// Terminate the post-fork child without running any of the
    /// supervisor's own teardown.
    fn exit_child(&mut self, code: i32) -> !;

    /// Block until `child` changes state.
    fn wait(&mut self, child: Pid) -> nix::Result<WaitStatus>;
}

/// [`ProcessOps`] backed by the real syscalls.
pub struct SysProcessOps;

impl ProcessOps for SysProcessOps {
    fn can_execute(&mut self, path: &Path) -> bool {
        access(path, AccessFlags::X_OK).is_ok()
    }

    fn install_hangup(&mut self, flag: Arc<AtomicBool>) -> std::io::Result<()> {
        // The handler registered here only sets the flag; everything that
        // formats or allocates happens later, on the main loop.
        signal_hook::flag::register(signal_hook::consts::SIGHUP, flag)?;
        kill(Pid::this(), Signal::SIGHUP).map_err(std::io::Error::from)?;
        Ok(())
    }

    fn fork(&mut self) -> nix::Result<Forked> {
        // SAFETY: the child branch only calls chdir, execvp, and _exit.
        match unsafe { nix::unistd::fork() }? {
            ForkResult::Parent { child } => Ok(Forked::Parent { child }),
            ForkResult::Child => Ok(Forked::Child),
        }
    }

    fn exec_shell(&mut self, shell: &Path) -> Errno {
        use std::os::unix::ffi::OsStrExt;

        if let Ok(home) = env::var("HOME") {
            let _ = chdir(Path::new(&home));
        }

        let path = match CString::new(shell.as_os_str().as_bytes()) {
            Ok(p) => p,
            Err(_) => return Errno::EINVAL,
        };
        match execvp(&path, &[path.as_c_str(), c"-i"]) {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    fn exit_child(&mut self, code: i32) -> ! {
        // _exit, not exit: the forked copy must not run atexit handlers or
        // drop supervisor state it shares with the parent.
        unsafe { libc::_exit(code) }
    }

    fn wait(&mut self, child: Pid) -> nix::Result<WaitStatus> {
        // No WUNTRACED/WCONTINUED: only actual termination completes this.
        waitpid(child, None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("shell {} is not accessible or not executable", .0.display())]
    ShellInaccessible(PathBuf),

    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
}

/// Respawning supervisor for the interactive shell.
pub struct Supervisor<P: ProcessOps> {
    shell: PathBuf,
    ops: P,
    hangup: Arc<AtomicBool>,
}

impl<P: ProcessOps> Supervisor<P> {
    pub fn new(shell: impl Into<PathBuf>, ops: P) -> Self {
        Self {
            shell: shell.into(),
            ops,
            hangup: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validate the shell, then fork/exec/wait/respawn until the end of
    /// time. Only a fatal supervisor error returns.
    pub fn run(&mut self) -> Result<Infallible, SupervisorError> {
        if !self.ops.can_execute(&self.shell) {
            return Err(SupervisorError::ShellInaccessible(self.shell.clone()));
        }

        if let Err(e) = self.ops.install_hangup(Arc::clone(&self.hangup)) {
            log::warn!("Failed to install hangup handler: {}", e);
        }
        // Observe the self-test probe raised during installation.
        self.note_hangup();

        loop {
            self.note_hangup();
            log::trace!("Launching shell {}", self.shell.display());

            match self.ops.fork().map_err(SupervisorError::Fork)? {
                Forked::Child => {
                    // From here on this process is the would-be shell. exec
                    // only returns on failure, and the forked copy must not
                    // fall back into the supervisor loop.
                    let err = self.ops.exec_shell(&self.shell);
                    log::error!("Failed to exec shell {}: {}", self.shell.display(), err);
                    self.ops.exit_child(1);
                }
                Forked::Parent { child } => self.reap(child),
            }
        }
    }

    /// Block until `child` actually terminates, then log the outcome.
    ///
    /// The wait is issued without stop/continue reporting, so only
    /// termination completes it. The defensive arms below re-enter the
    /// wait if a non-terminal status surfaces anyway, and ECHILD ends the
    /// iteration once the pid is no longer waitable, so a repeated wait
    /// can never block forever.
    fn reap(&mut self, child: Pid) {
        loop {
            match self.ops.wait(child) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    log::info!("Child {} died with exit code {}", pid, code);
                    return;
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    // The pid is already reaped at this point; waiting
                    // again would hang. Respawn instead.
                    log::info!("Child {} terminated by signal {}", pid, signal);
                    return;
                }
                Ok(status) => {
                    log::debug!("Ignoring non-terminal wait status {:?}", status);
                }
                Err(Errno::EINTR) => {
                    self.note_hangup();
                }
                Err(Errno::ECHILD) => {
                    log::warn!("Child {} was already reaped", child);
                    return;
                }
                Err(e) => {
                    log::error!("waitpid({}) failed: {}", child, e);
                    return;
                }
            }
        }
    }

    /// Log and clear a pending hang-up observation, if any.
    ///
    /// The signal handler itself is restricted to setting the flag;
    /// formatting happens here, where it is safe.
    fn note_hangup(&self) {
        if self.hangup.swap(false, Ordering::SeqCst) {
            log::info!("Received hangup signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Call {
        CanExecute,
        InstallHangup,
        Fork,
        Wait,
    }

    /// Scripted process primitives recording the order of supervisor calls.
    struct ScriptedOps {
        calls: Vec<Call>,
        executable: bool,
        fork_results: VecDeque<nix::Result<Forked>>,
        wait_results: VecDeque<nix::Result<WaitStatus>>,
    }

    impl ScriptedOps {
        fn new(
            fork_results: Vec<nix::Result<Forked>>,
            wait_results: Vec<nix::Result<WaitStatus>>,
        ) -> Self {
            Self {
                calls: Vec::new(),
                executable: true,
                fork_results: fork_results.into(),
                wait_results: wait_results.into(),
            }
        }
    }

    impl ProcessOps for ScriptedOps {
        fn can_execute(&mut self, _path: &Path) -> bool {
            self.calls.push(Call::CanExecute);
            self.executable
        }

        fn install_hangup(&mut self, flag: Arc<AtomicBool>) -> std::io::Result<()> {
            self.calls.push(Call::InstallHangup);
            // Simulate the self-test signal being delivered immediately.
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn fork(&mut self) -> nix::Result<Forked> {
            self.calls.push(Call::Fork);
            self.fork_results.pop_front().unwrap()
        }

        fn exec_shell(&mut self, _shell: &Path) -> Errno {
            unreachable!("scripted forks never land in the child branch");
        }

        fn exit_child(&mut self, _code: i32) -> ! {
            unreachable!("scripted forks never land in the child branch");
        }

        fn wait(&mut self, _child: Pid) -> nix::Result<WaitStatus> {
            self.calls.push(Call::Wait);
            self.wait_results.pop_front().unwrap()
        }
    }

    fn parent(pid: i32) -> nix::Result<Forked> {
        Ok(Forked::Parent {
            child: Pid::from_raw(pid),
        })
    }

    #[test]
    fn test_respawn_after_child_exit() {
        // Child exits with code 7; the very next supervisor action must be
        // another fork. The second fork fails to end the loop.
        let ops = ScriptedOps::new(
            vec![parent(42), Err(Errno::EAGAIN)],
            vec![Ok(WaitStatus::Exited(Pid::from_raw(42), 7))],
        );
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        let err = supervisor.run().unwrap_err();

        assert!(matches!(err, SupervisorError::Fork(Errno::EAGAIN)));
        assert_eq!(
            supervisor.ops.calls,
            vec![
                Call::CanExecute,
                Call::InstallHangup,
                Call::Fork,
                Call::Wait,
                Call::Fork,
            ]
        );
    }

    #[test]
    fn test_fork_failure_terminates_without_waiting() {
        let ops = ScriptedOps::new(vec![Err(Errno::EAGAIN)], vec![]);
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        let err = supervisor.run().unwrap_err();

        assert!(matches!(err, SupervisorError::Fork(Errno::EAGAIN)));
        assert!(!supervisor.ops.calls.contains(&Call::Wait));
    }

    #[test]
    fn test_inaccessible_shell_is_fatal_before_anything_else() {
        let mut ops = ScriptedOps::new(vec![], vec![]);
        ops.executable = false;
        let mut supervisor = Supervisor::new("/no/such/shell", ops);

        let err = supervisor.run().unwrap_err();

        assert!(matches!(err, SupervisorError::ShellInaccessible(_)));
        assert_eq!(supervisor.ops.calls, vec![Call::CanExecute]);
    }

    #[test]
    fn test_signaled_child_is_respawned_not_rewaited() {
        let ops = ScriptedOps::new(
            vec![parent(9), Err(Errno::EAGAIN)],
            vec![Ok(WaitStatus::Signaled(
                Pid::from_raw(9),
                Signal::SIGKILL,
                false,
            ))],
        );
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        supervisor.run().unwrap_err();

        // One wait for the signaled child, then straight back to fork.
        assert_eq!(
            supervisor.ops.calls,
            vec![
                Call::CanExecute,
                Call::InstallHangup,
                Call::Fork,
                Call::Wait,
                Call::Fork,
            ]
        );
    }

    #[test]
    fn test_stopped_child_rewaits_until_exit() {
        let ops = ScriptedOps::new(
            vec![parent(9), Err(Errno::EAGAIN)],
            vec![
                Ok(WaitStatus::Stopped(Pid::from_raw(9), Signal::SIGSTOP)),
                Ok(WaitStatus::Exited(Pid::from_raw(9), 0)),
            ],
        );
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        supervisor.run().unwrap_err();

        assert_eq!(
            supervisor.ops.calls,
            vec![
                Call::CanExecute,
                Call::InstallHangup,
                Call::Fork,
                Call::Wait,
                Call::Wait,
                Call::Fork,
            ]
        );
    }

    #[test]
    fn test_interrupted_wait_is_retried() {
        let ops = ScriptedOps::new(
            vec![parent(9), Err(Errno::EAGAIN)],
            vec![
                Err(Errno::EINTR),
                Ok(WaitStatus::Exited(Pid::from_raw(9), 0)),
            ],
        );
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        supervisor.run().unwrap_err();

        let waits = supervisor
            .ops
            .calls
            .iter()
            .filter(|c| **c == Call::Wait)
            .count();
        assert_eq!(waits, 2);
    }

    #[test]
    fn test_already_reaped_child_does_not_block_the_loop() {
        let ops = ScriptedOps::new(
            vec![parent(9), Err(Errno::EAGAIN)],
            vec![Err(Errno::ECHILD)],
        );
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        supervisor.run().unwrap_err();

        assert_eq!(
            supervisor.ops.calls,
            vec![
                Call::CanExecute,
                Call::InstallHangup,
                Call::Fork,
                Call::Wait,
                Call::Fork,
            ]
        );
    }

    #[test]
    fn test_self_test_hangup_is_consumed() {
        let ops = ScriptedOps::new(vec![Err(Errno::EAGAIN)], vec![]);
        let mut supervisor = Supervisor::new("/usr/bin/bash", ops);

        supervisor.run().unwrap_err();

        // The probe raised during installation was observed and cleared.
        assert!(!supervisor.hangup.load(Ordering::SeqCst));
    }
}
