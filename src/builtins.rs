use tracing::debug;

use crate::{
    error::ShellError, parse::ArgVector, process_exec::replace_image, shell::ShellState,
};

/// Outcome of offering a command to the builtin dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinResult {
    NotBuiltin,
    Handled,
    Exit,
}

/// Runs `args` in-process if it names a builtin.
pub fn dispatch(state: &mut ShellState, args: &ArgVector) -> Result<BuiltinResult, ShellError> {
    let Some(command) = args.command() else {
        return Ok(BuiltinResult::Handled);
    };

    let result = match command {
        "exit" => BuiltinResult::Exit,
        "cd" => {
            cd(state, args.arg(1))?;
            BuiltinResult::Handled
        }
        "help" => {
            println!("{}", help());
            BuiltinResult::Handled
        }
        "exec" => {
            exec(&args.shifted(1))?;
            BuiltinResult::Handled
        }
        _ => BuiltinResult::NotBuiltin,
    };
    debug!(command, ?result, "dispatch");
    Ok(result)
}

/// Change the working directory and republish it as `PWD`.
pub fn cd(state: &mut ShellState, operand: Option<&str>) -> Result<(), ShellError> {
    let operand = operand.ok_or(ShellError::MissingOperand)?;
    let path = shellexpand::tilde(operand);

    std::env::set_current_dir(&*path).map_err(|source| ShellError::ChangeDir {
        path: operand.to_string(),
        source,
    })?;
    state.sync_cwd()
}

/// Replace the shell with `args`; a bare `exec` does nothing.
fn exec(args: &ArgVector) -> Result<(), ShellError> {
    if args.is_empty() {
        return Ok(());
    }
    Err(replace_image(args))
}

pub fn help() -> String {
    format!(
        "
--- Welcome to BOSH, the Barebones Operating-system SHell ---
 A minimal and simple shell.

Builtins:
- cd <dir>          : Change directory
- exec <cmd> [args] : Replace the shell with cmd
- exit              : Exit the shell
- help              : Show this help

Syntax:
- cmd1 | cmd2       : Pipe output of cmd1 into cmd2
- cmd > file        : Redirect output to file (overwrite)
- cmd >> file       : Redirect output to file (append)
- $NAME             : Value of environment variable NAME
- # text            : Comment to end of line
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{tokenize_with, DEFAULT_MAX_ARGS};
    use serial_test::serial;
    use std::{env, fs, os::unix::fs::PermissionsExt};
    use tempfile::tempdir;

    fn argv(line: &str) -> ArgVector {
        tokenize_with(line, DEFAULT_MAX_ARGS, |_| None)
    }

    fn state() -> ShellState {
        ShellState::new(DEFAULT_MAX_ARGS).unwrap()
    }

    #[test]
    fn exit_is_reported_to_the_caller() {
        let result = dispatch(&mut state(), &argv("exit 3 ignored")).unwrap();
        assert_eq!(result, BuiltinResult::Exit);
    }

    #[test]
    fn match_is_exact_and_case_sensitive() {
        for line in ["CD /tmp", "Exit", "ls", "helpme"] {
            let result = dispatch(&mut state(), &argv(line)).unwrap();
            assert_eq!(result, BuiltinResult::NotBuiltin, "line: {line}");
        }
    }

    #[test]
    fn help_is_handled() {
        assert_eq!(dispatch(&mut state(), &argv("help")).unwrap(), BuiltinResult::Handled);
        assert!(help().contains("Barebones"));
    }

    #[test]
    fn empty_vector_needs_no_work() {
        let result = dispatch(&mut state(), &ArgVector::default()).unwrap();
        assert_eq!(result, BuiltinResult::Handled);
    }

    #[test]
    #[serial]
    fn cd_updates_cwd_and_pwd() {
        let original = env::current_dir().unwrap();
        let dir = tempdir().unwrap();
        let mut state = state();

        cd(&mut state, dir.path().to_str()).unwrap();

        let now = env::current_dir().unwrap();
        assert_eq!(now, fs::canonicalize(dir.path()).unwrap());
        assert_eq!(env::var_os("PWD").unwrap(), now.as_os_str());
        assert_eq!(state.cwd(), now.as_path());

        env::set_current_dir(original).unwrap();
    }

    #[test]
    #[serial]
    fn cd_to_missing_directory_changes_nothing() {
        let before = env::current_dir().unwrap();
        let mut state = state();

        let err = dispatch(&mut state, &argv("cd /bosh/does/not/exist")).unwrap_err();
        assert!(matches!(err, ShellError::ChangeDir { .. }));
        assert!(err.to_string().starts_with("cd: /bosh/does/not/exist:"));
        assert_eq!(env::current_dir().unwrap(), before);
        assert_eq!(state.cwd(), before.as_path());
    }

    #[test]
    fn cd_without_operand_is_an_error() {
        let err = dispatch(&mut state(), &argv("cd")).unwrap_err();
        assert!(matches!(err, ShellError::MissingOperand));
        assert_eq!(err.to_string(), "cd: missing operand");
    }

    #[test]
    fn bare_exec_is_a_no_op() {
        assert_eq!(dispatch(&mut state(), &argv("exec")).unwrap(), BuiltinResult::Handled);
    }

    #[test]
    #[serial]
    fn exec_reports_missing_file() {
        let err = dispatch(&mut state(), &argv("exec /bosh/no/such/program")).unwrap_err();
        assert!(matches!(err, ShellError::ExecNotFound { .. }));
        assert!(err.to_string().contains("file does not exist"));
        crate::signals::install(crate::signals::Disposition::Default).unwrap();
    }

    #[test]
    #[serial]
    fn exec_reports_permission_denied() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("not-executable");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

        let line = format!("exec {}", script.display());
        let err = dispatch(&mut state(), &argv(&line)).unwrap_err();
        assert!(matches!(err, ShellError::ExecPermissionDenied { .. }));
        crate::signals::install(crate::signals::Disposition::Default).unwrap();
    }
}
