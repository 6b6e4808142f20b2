mod builtins;
mod config;
mod error;
mod input;
mod logging;
mod parse;
mod process_exec;
mod prompt;
mod shell;
mod signals;

use std::{
    fs::File,
    io::{self, BufReader, IsTerminal},
    path::PathBuf,
};

use anyhow::Context;
use argh::FromArgs;
use tracing::{debug, info};

use crate::{
    input::{Interactive, Line, LineSource, OneShot, Script},
    shell::{Flow, Shell},
};

/// bosh, the barebones operating-system shell.
#[derive(FromArgs)]
struct Args {
    /// config file (default: ~/.config/bosh/bosh.toml)
    #[argh(option)]
    config: Option<PathBuf>,

    /// run a single command line and exit
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// script to run one line at a time instead of reading the terminal
    #[argh(positional)]
    script: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    // [1] Load configuration and logging
    let cfg = config::init(args.config.as_deref());
    if let Err(e) = logging::init(&cfg) {
        eprintln!("bosh: {e}");
    }

    // [2] Pick the line source
    let interactive = args.command.is_none() && args.script.is_none() && io::stdin().is_terminal();
    let mut source: Box<dyn LineSource> = match (args.command, args.script) {
        (Some(line), _) => Box::new(OneShot::new(line)),
        (None, Some(path)) => {
            let file = File::open(&path)
                .with_context(|| format!("cannot open script {}", path.display()))?;
            Box::new(Script::new(BufReader::new(file)))
        }
        (None, None) if interactive => Box::new(Interactive::new(&cfg)),
        (None, None) => Box::new(Script::new(io::stdin().lock())),
    };

    // [3] Session state, interrupts, startup lines
    let mut shell = Shell::new(cfg.max_args).context("cannot start shell")?;
    signals::startup().context("cannot set up interrupt handling")?;
    info!(interactive, cwd = %shell.state().cwd().display(), "session started");

    if interactive && cfg.greeting {
        println!("\nWelcome to Bosh, a minimal bash-like shell.\n");
    }
    if config::run_startup(&cfg, &mut shell) == Flow::Exit {
        return Ok(());
    }

    // [4] Main REPL loop
    repl(&mut shell, source.as_mut());
    info!("session ended");
    Ok(())
}

fn repl(shell: &mut Shell, source: &mut dyn LineSource) {
    loop {
        match source.read_line() {
            Ok(Line::Text(buf)) if !buf.trim().is_empty() => match shell.exec(&buf) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => eprintln!("{e}"),
            },
            Ok(Line::Text(_)) => {}
            Ok(Line::Interrupted) => debug!("line discarded by interrupt"),
            Ok(Line::Eof) => break,
            Err(e) => {
                eprintln!("bosh: {e}");
                break;
            }
        }
    }
}
