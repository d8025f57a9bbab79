#![cfg(target_os = "linux")]

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

const PROMPT: &str = "<jobsh-ready>";
const TIMEOUT: Duration = Duration::from_secs(10);

/// jobsh running as a session leader with a pseudo-terminal as its
/// controlling terminal.
struct PtySession {
    child: Child,
    master: File,
    output: Receiver<Vec<u8>>,
    pending: String,
}

impl PtySession {
    fn start() -> Self {
        let mut master_fd: libc::c_int = -1;
        let mut slave_fd: libc::c_int = -1;
        let rc = unsafe {
            libc::openpty(
                &mut master_fd,
                &mut slave_fd,
                std::ptr::null_mut(),
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        assert_eq!(rc, 0, "openpty: {}", io::Error::last_os_error());
        unsafe {
            libc::fcntl(master_fd, libc::F_SETFD, libc::FD_CLOEXEC);
            libc::fcntl(slave_fd, libc::F_SETFD, libc::FD_CLOEXEC);
        }
        let master = unsafe { File::from_raw_fd(master_fd) };
        let slave = unsafe { OwnedFd::from_raw_fd(slave_fd) };

        let mut command = Command::new(env!("CARGO_BIN_EXE_jobsh"));
        command
            .env("JOBSH_PROMPT", PROMPT)
            .stdin(Stdio::from(slave.try_clone().expect("dup slave")))
            .stdout(Stdio::from(slave.try_clone().expect("dup slave")))
            .stderr(Stdio::from(slave));
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let child = command.spawn().expect("spawn jobsh on pty");
        // Our slave copies are gone now, so the reader sees EIO once jobsh exits.
        drop(command);

        let mut reader = master.try_clone().expect("clone pty master");
        let (tx, output) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut session = PtySession {
            child,
            master,
            output,
            pending: String::new(),
        };
        session.expect(PROMPT);
        session
    }

    fn shell_pid(&self) -> libc::pid_t {
        self.child.id() as libc::pid_t
    }

    /// Process group currently in the foreground of the pty.
    fn terminal_owner(&self) -> libc::pid_t {
        unsafe { libc::tcgetpgrp(self.master.as_raw_fd()) }
    }

    fn send(&mut self, line: &str) {
        writeln!(self.master, "{line}").expect("write to pty");
    }

    fn send_control(&mut self, byte: u8) {
        self.master.write_all(&[byte]).expect("write to pty");
    }

    /// Consume output up to and including `needle`.
    fn expect(&mut self, needle: &str) -> String {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if let Some(pos) = self.pending.find(needle) {
                return self.pending.drain(..pos + needle.len()).collect();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.output.recv_timeout(remaining) {
                Ok(chunk) => self.pending.push_str(&String::from_utf8_lossy(&chunk)),
                Err(_) => panic!("timed out waiting for {needle:?}; output: {:?}", self.pending),
            }
        }
    }

    /// Wait for the next prompt and check the interpreter owns the terminal.
    fn expect_prompt_with_terminal(&mut self) {
        self.expect(PROMPT);
        assert_eq!(self.terminal_owner(), self.shell_pid(), "terminal not reclaimed");
    }

    /// Wait until some job, not the interpreter, owns the terminal.
    fn wait_for_job_in_foreground(&self) {
        let deadline = Instant::now() + TIMEOUT;
        while self.terminal_owner() == self.shell_pid() {
            assert!(Instant::now() < deadline, "job never took the terminal");
            std::thread::sleep(Duration::from_millis(20));
        }
        // The child takes the terminal just before it restores default
        // signal handling; give it time to reach exec.
        std::thread::sleep(Duration::from_millis(200));
    }

    fn assert_alive(&mut self) {
        // Echoed input shows "AL IVE"; only printf's output joins the halves.
        self.send("printf '%s_%s\\n' AL IVE");
        self.expect("AL_IVE");
        self.expect_prompt_with_terminal();
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn interpreter_owns_terminal_at_startup() {
    let session = PtySession::start();
    assert_eq!(session.terminal_owner(), session.shell_pid());
}

#[test]
fn foreground_command_returns_terminal() {
    let mut session = PtySession::start();
    session.assert_alive();
}

#[test]
fn failed_exec_returns_terminal() {
    let mut session = PtySession::start();
    session.send("jobsh-no-such-program-xyz");
    session.expect("command not found");
    session.expect_prompt_with_terminal();
    session.assert_alive();
}

#[test]
fn failed_redirect_mid_pipeline_returns_terminal() {
    let mut session = PtySession::start();
    session.send("sleep 5 | cat > /nonexistent/jobsh/out.txt");
    session.expect("/nonexistent/jobsh/out.txt: ");
    session.expect_prompt_with_terminal();
    session.assert_alive();
}

#[test]
fn failed_exec_mid_pipeline_returns_terminal() {
    let mut session = PtySession::start();
    session.send("sleep 5 | jobsh-no-such-program-xyz");
    session.expect("command not found");
    session.expect_prompt_with_terminal();
    session.assert_alive();
}

#[test]
fn terminal_stop_and_fg_move_terminal_back_and_forth() {
    let mut session = PtySession::start();

    session.send("sleep 30");
    session.wait_for_job_in_foreground();
    session.send_control(0x1a); // Ctrl-Z
    session.expect("Stopped");
    session.expect_prompt_with_terminal();

    session.send("fg");
    session.wait_for_job_in_foreground();
    session.send_control(0x03); // Ctrl-C
    session.expect("Finished. Exit code: 130");
    session.expect_prompt_with_terminal();

    session.assert_alive();
}

#[test]
fn stopped_job_resumes_with_fg() {
    let mut session = PtySession::start();
    session.send("sh -c 'kill -STOP $$; printf \"%s_%s\\n\" RE SUMED'");
    session.expect("Stopped");
    session.expect_prompt_with_terminal();

    session.send("fg");
    session.expect("RE_SUMED");
    session.expect("Finished. Exit code: 0");
    session.expect_prompt_with_terminal();
}
