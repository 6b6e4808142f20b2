use std::{
    ffi::CString,
    io::{self, Write},
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    ptr,
};

use libc::{
    c_char, close, dup2, execvp, fork, pid_t, pipe, waitpid, O_APPEND, O_CREAT, O_TRUNC,
    O_WRONLY, STDIN_FILENO, STDOUT_FILENO,
};
use tracing::debug;

use crate::{
    error::ShellError,
    parse::{ArgVector, RedirectMode},
    signals::{self, WaitGuard},
};

/// NUL-terminated argv built in the parent so the child never allocates.
struct Argv {
    // Owns the buffers `ptrs` points into.
    strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl Argv {
    fn new(args: &ArgVector) -> Result<Self, ShellError> {
        let strings: Vec<CString> = args
            .args()
            .map(|arg| CString::new(arg).map_err(|_| ShellError::NulByte(arg.to_string())))
            .collect::<Result<_, _>>()?;

        let ptrs = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();

        Ok(Self { strings, ptrs })
    }

    fn program(&self) -> String {
        self.strings
            .first()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Only returns if the exec failed.
    fn exec(&self) -> io::Error {
        if self.strings.is_empty() {
            return io::Error::from_raw_os_error(libc::ENOENT);
        }
        unsafe {
            execvp(self.ptrs[0], self.ptrs.as_ptr());
        }
        io::Error::last_os_error()
    }
}

enum Forked {
    Child,
    Parent(pid_t),
}

fn spawn() -> Result<Forked, ShellError> {
    // Anything still buffered would otherwise be written twice.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    match unsafe { fork() } {
        -1 => Err(ShellError::Fork(io::Error::last_os_error())),
        0 => Ok(Forked::Child),
        pid => Ok(Forked::Parent(pid)),
    }
}

/// Child-side diagnostic on stdout; raw write(2) bypasses std's buffers.
fn child_report(msg: &str) {
    unsafe {
        libc::write(STDOUT_FILENO, msg.as_ptr().cast(), msg.len());
    }
}

/// Ends a forked child without running any of the parent's exit handlers.
fn child_exit() -> ! {
    unsafe { libc::_exit(0) }
}

/// Duplicates the current stdout, close-on-exec so a successful exec does not
/// inherit it. Negative when the dup failed.
fn save_stdout() -> libc::c_int {
    unsafe { libc::fcntl(STDOUT_FILENO, libc::F_DUPFD_CLOEXEC, 0) }
}

/// Puts a descriptor from [`save_stdout`] back on stdout.
fn restore_stdout(saved: libc::c_int) {
    if saved >= 0 {
        unsafe {
            dup2(saved, STDOUT_FILENO);
            close(saved);
        }
    }
}

fn wait_for(pid: pid_t) {
    let mut status = 0;
    loop {
        if unsafe { waitpid(pid, &mut status, 0) } != -1 {
            debug!(pid, status, "child terminated");
            return;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            debug!(pid, "waitpid: {err}");
            return;
        }
    }
}

fn make_pipe() -> Result<(OwnedFd, OwnedFd), ShellError> {
    let mut fds = [0; 2];
    if unsafe { pipe(fds.as_mut_ptr()) } == -1 {
        return Err(ShellError::Pipe(io::Error::last_os_error()));
    }
    // 0 is the read end, 1 the write end
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Runs one external command in the foreground.
pub fn run_simple(args: &ArgVector) -> Result<(), ShellError> {
    let argv = Argv::new(args)?;
    let diagnostic = format!("\nError: {} is not a valid command\n", argv.program());

    match spawn()? {
        Forked::Child => {
            signals::reset_for_child();
            argv.exec();
            child_report(&diagnostic);
            child_exit()
        }
        Forked::Parent(pid) => {
            debug!(pid, command = %argv.program(), "spawned");
            let _guard = WaitGuard::new();
            wait_for(pid);
            Ok(())
        }
    }
}

/// Runs `left | right`, waiting for both stages.
pub fn run_pipeline(left: &ArgVector, right: &ArgVector) -> Result<(), ShellError> {
    let writer_argv = Argv::new(left)?;
    let reader_argv = Argv::new(right)?;
    let writer_diagnostic = format!("\nCould not execute command 1: {}\n", writer_argv.program());
    let reader_diagnostic = format!("\nCould not execute command 2: {}\n", reader_argv.program());

    let (read_end, write_end) = make_pipe()?;

    let writer = match spawn()? {
        Forked::Child => {
            signals::reset_for_child();
            drop(read_end);
            let terminal = save_stdout();
            unsafe {
                dup2(write_end.as_raw_fd(), STDOUT_FILENO);
            }
            drop(write_end);
            writer_argv.exec();
            // Report on the terminal, not into the reader's input.
            restore_stdout(terminal);
            child_report(&writer_diagnostic);
            child_exit()
        }
        Forked::Parent(pid) => pid,
    };

    let reader = match spawn() {
        Ok(Forked::Child) => {
            signals::reset_for_child();
            drop(write_end);
            unsafe {
                dup2(read_end.as_raw_fd(), STDIN_FILENO);
            }
            drop(read_end);
            reader_argv.exec();
            child_report(&reader_diagnostic);
            child_exit()
        }
        Ok(Forked::Parent(pid)) => pid,
        Err(e) => {
            // The writer sees EPIPE once the read end is gone.
            drop(read_end);
            drop(write_end);
            let _guard = WaitGuard::new();
            wait_for(writer);
            return Err(e);
        }
    };

    // The reader only sees EOF once every write end is closed.
    drop(read_end);
    drop(write_end);
    debug!(writer, reader, "pipeline spawned");

    let _guard = WaitGuard::new();
    wait_for(writer);
    wait_for(reader);
    Ok(())
}

/// Runs `args` with its stdout sent to `target`.
pub fn run_redirect(args: &ArgVector, target: &str, mode: RedirectMode) -> Result<(), ShellError> {
    let argv = Argv::new(args)?;
    let path = CString::new(target).map_err(|_| ShellError::NulByte(target.to_string()))?;
    let flags = O_WRONLY
        | O_CREAT
        | match mode {
            RedirectMode::Truncate => O_TRUNC,
            RedirectMode::Append => O_APPEND,
        };
    let open_diagnostic = format!("\nCould not open {target}\n");
    let diagnostic = format!("\nCould not execute {}\n", argv.program());

    match spawn()? {
        Forked::Child => {
            signals::reset_for_child();
            let terminal = save_stdout();
            unsafe {
                let fd = libc::open(path.as_ptr(), flags, 0o666 as libc::c_uint);
                if fd < 0 {
                    child_report(&open_diagnostic);
                    child_exit();
                }
                dup2(fd, STDOUT_FILENO);
                close(fd);
            }

            argv.exec();

            restore_stdout(terminal);
            child_report(&diagnostic);
            child_exit()
        }
        Forked::Parent(pid) => {
            debug!(pid, command = %argv.program(), target, ?mode, "spawned with redirection");
            let _guard = WaitGuard::new();
            wait_for(pid);
            Ok(())
        }
    }
}

/// Replaces the shell itself with `args`. Only returns on failure.
pub fn replace_image(args: &ArgVector) -> ShellError {
    let argv = match Argv::new(args) {
        Ok(argv) => argv,
        Err(e) => return e,
    };
    let _ = io::stdout().flush();
    signals::reset_for_child();

    let err = argv.exec();

    // Still here, so this is the shell again.
    if let Err(e) = signals::resume_after_failed_exec() {
        debug!("{e}");
    }
    ShellError::from_exec(&argv.program(), err)
}
