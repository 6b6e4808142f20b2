//! Interrupt (SIGINT) discipline for the shell process.
//!
//! At the prompt an interrupt only redraws the prompt. While the shell is
//! blocked on a foreground child the interrupt is ignored by the shell, so the
//! default action reaches the child instead. [`WaitGuard`] brackets every such
//! wait.

use std::{
    io, mem, ptr,
    sync::atomic::{AtomicU8, Ordering},
};

use libc::{c_int, SIGINT};
use tracing::{debug, warn};

use crate::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Disposition {
    /// OS default, as inherited at process start.
    Default = 0,
    Ignoring = 1,
    Interactive = 2,
}

impl Disposition {
    fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Disposition::Ignoring,
            2 => Disposition::Interactive,
            _ => Disposition::Default,
        }
    }
}

static CURRENT: AtomicU8 = AtomicU8::new(Disposition::Default as u8);

extern "C" fn redraw_prompt(_signum: c_int) {
    let newline = b"\n";
    // write(2) is async-signal-safe; the prompt is printed again by the loop.
    unsafe {
        libc::write(libc::STDOUT_FILENO, newline.as_ptr().cast(), newline.len());
    }
}

/// The disposition this module last installed.
pub fn current() -> Disposition {
    Disposition::from_tag(CURRENT.load(Ordering::SeqCst))
}

pub fn install(disposition: Disposition) -> Result<(), ShellError> {
    let handler = match disposition {
        Disposition::Default => libc::SIG_DFL,
        Disposition::Ignoring => libc::SIG_IGN,
        Disposition::Interactive => redraw_prompt as extern "C" fn(c_int) as libc::sighandler_t,
    };

    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(SIGINT, &action, ptr::null_mut()) != 0 {
            return Err(ShellError::Signal(io::Error::last_os_error()));
        }
    }

    let previous = Disposition::from_tag(CURRENT.swap(disposition as u8, Ordering::SeqCst));
    if previous != disposition {
        debug!(?previous, ?disposition, "SIGINT disposition changed");
    }
    Ok(())
}

/// Startup sequence: ignore interrupts while reaping any child inherited from
/// the exec that started us, then switch to the interactive handler for the
/// rest of the session.
pub fn startup() -> Result<(), ShellError> {
    install(Disposition::Ignoring)?;
    reap_inherited();
    install(Disposition::Interactive)
}

fn reap_inherited() {
    let mut status = 0;
    loop {
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        debug!(pid, "reaped inherited child");
    }
}

/// Puts SIGINT and SIGPIPE back to the OS default before an exec.
///
/// The Rust runtime ignores SIGPIPE and an ignored signal survives exec, so
/// without this a pipeline writer would never die of a closed reader.
/// Only async-signal-safe calls: no logging, no bookkeeping.
pub fn reset_for_child() {
    unsafe {
        libc::signal(SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

/// Undoes [`reset_for_child`] in the shell itself after `exec` failed.
pub fn resume_after_failed_exec() -> Result<(), ShellError> {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    install(Disposition::Interactive)
}

/// Ignores interrupts for as long as it lives, then restores whatever was
/// installed before.
#[must_use = "interrupts are only ignored while the guard is alive"]
pub struct WaitGuard {
    previous: Disposition,
}

impl WaitGuard {
    pub fn new() -> Self {
        let previous = current();
        if let Err(e) = install(Disposition::Ignoring) {
            warn!("{e}");
        }
        Self { previous }
    }
}

impl Default for WaitGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if let Err(e) = install(self.previous) {
            warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn os_handler() -> libc::sighandler_t {
        unsafe {
            let mut old: libc::sigaction = mem::zeroed();
            assert_eq!(libc::sigaction(SIGINT, ptr::null(), &mut old), 0);
            old.sa_sigaction
        }
    }

    #[test]
    #[serial]
    fn guard_ignores_then_restores() {
        install(Disposition::Interactive).unwrap();
        {
            let _guard = WaitGuard::new();
            assert_eq!(current(), Disposition::Ignoring);
            assert_eq!(os_handler(), libc::SIG_IGN);
        }
        assert_eq!(current(), Disposition::Interactive);
        assert_ne!(os_handler(), libc::SIG_IGN);
        install(Disposition::Default).unwrap();
    }

    #[test]
    #[serial]
    fn guard_restores_on_early_return() {
        fn bail() -> Result<(), ShellError> {
            let _guard = WaitGuard::new();
            Err(ShellError::EmptyPipeStage)
        }

        install(Disposition::Interactive).unwrap();
        assert!(bail().is_err());
        assert_eq!(current(), Disposition::Interactive);
        install(Disposition::Default).unwrap();
    }

    #[test]
    #[serial]
    fn startup_ends_interactive() {
        startup().unwrap();
        assert_eq!(current(), Disposition::Interactive);
        install(Disposition::Default).unwrap();
        assert_eq!(os_handler(), libc::SIG_DFL);
    }

    #[test]
    #[serial]
    fn interactive_handler_survives_interrupt() {
        install(Disposition::Interactive).unwrap();
        unsafe {
            libc::raise(SIGINT);
        }
        // Still alive, and the handler stays installed.
        assert_eq!(current(), Disposition::Interactive);
        assert_ne!(os_handler(), libc::SIG_DFL);
        install(Disposition::Default).unwrap();
    }
}
