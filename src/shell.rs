use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    builtins::{dispatch, BuiltinResult},
    error::ShellError,
    parse::{parse_syntax, ExecutionPlan},
    process_exec::{run_pipeline, run_redirect, run_simple},
};

/// Whether the read loop keeps going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Session state that outlives a single line.
///
/// `cwd` mirrors the OS working directory; only `cd` moves it, through
/// [`ShellState::sync_cwd`].
#[derive(Debug)]
pub struct ShellState {
    cwd: PathBuf,
    max_args: usize,
}

impl ShellState {
    pub fn new(max_args: usize) -> Result<Self, ShellError> {
        Ok(Self {
            cwd: env::current_dir().map_err(ShellError::WorkingDir)?,
            max_args: max_args.max(1),
        })
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn max_args(&self) -> usize {
        self.max_args
    }

    /// Re-reads the OS working directory and publishes it as `PWD`.
    pub fn sync_cwd(&mut self) -> Result<(), ShellError> {
        let cwd = env::current_dir().map_err(ShellError::WorkingDir)?;
        // SAFETY: the shell never runs more than one thread of its own.
        unsafe { env::set_var("PWD", &cwd) };
        debug!(cwd = %cwd.display(), "working directory changed");
        self.cwd = cwd;
        Ok(())
    }

    /// Advertises this shell in `SHELL` for every child.
    pub fn publish_shell(&self, path: &OsStr) {
        // SAFETY: called once at startup, before any child exists.
        unsafe { env::set_var("SHELL", path) };
    }
}

pub struct Shell {
    state: ShellState,
}

impl Shell {
    pub fn new(max_args: usize) -> Result<Self, ShellError> {
        let state = ShellState::new(max_args)?;
        let exe = env::current_exe().unwrap_or_else(|_| PathBuf::from("bosh"));
        state.publish_shell(exe.as_os_str());
        Ok(Self { state })
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    // Main execution entry point
    pub fn exec(&mut self, line: &str) -> Result<Flow, ShellError> {
        // Step 1: Classify the line and tokenize its segments
        let segment = parse_syntax(line);
        let Some(plan) = ExecutionPlan::build(segment, self.state.max_args())? else {
            return Ok(Flow::Continue);
        };
        debug!(?plan, "planned");

        // Step 2: Execute it
        self.run(plan)
    }

    fn run(&mut self, plan: ExecutionPlan) -> Result<Flow, ShellError> {
        match dispatch(&mut self.state, plan.leading())? {
            BuiltinResult::Exit => return Ok(Flow::Exit),
            BuiltinResult::Handled => return Ok(Flow::Continue),
            BuiltinResult::NotBuiltin => {}
        }

        match &plan {
            ExecutionPlan::Simple(args) => run_simple(args)?,
            ExecutionPlan::Pipeline(left, right) => run_pipeline(left, right)?,
            ExecutionPlan::Redirect(args, target, mode) => run_redirect(args, target, *mode)?,
        }
        Ok(Flow::Continue)
    }
}
