use std::io::{self, BufRead};

use reedline::{FileBackedHistory, Reedline, Signal};
use tracing::warn;

use crate::{config::Config, prompt::ShellPrompt};

/// One read from a line source.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Text(String),
    /// Ctrl-C at the prompt: drop the line, prompt again.
    Interrupted,
    Eof,
}

pub trait LineSource {
    fn read_line(&mut self) -> io::Result<Line>;
}

/// Terminal input through the line editor, with a persistent history log.
pub struct Interactive {
    editor: Reedline,
    prompt: ShellPrompt,
}

impl Interactive {
    pub fn new(config: &Config) -> Self {
        if let Some(parent) = config.history_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let history = Box::new(
            FileBackedHistory::with_file(config.history_size, config.history_file.clone())
                .unwrap_or_else(|e| {
                    warn!("history disabled: {e}");
                    FileBackedHistory::default()
                }),
        );

        Self {
            editor: Reedline::create().with_history(history),
            prompt: ShellPrompt::new(config),
        }
    }
}

impl LineSource for Interactive {
    fn read_line(&mut self) -> io::Result<Line> {
        match self.editor.read_line(&self.prompt)? {
            Signal::Success(buf) => Ok(Line::Text(buf)),
            Signal::CtrlC => Ok(Line::Interrupted),
            Signal::CtrlD => Ok(Line::Eof),
            #[allow(unreachable_patterns)]
            _ => Ok(Line::Interrupted),
        }
    }
}

/// Batch mode: one command per line of a script or piped stdin.
pub struct Script<R> {
    reader: R,
}

impl<R: BufRead> Script<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for Script<R> {
    fn read_line(&mut self) -> io::Result<Line> {
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw)? == 0 {
            return Ok(Line::Eof);
        }
        // Invalid UTF-8 only spoils its own line, never the rest of the input.
        let mut buf = String::from_utf8_lossy(&raw).into_owned();
        let trimmed = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed);
        Ok(Line::Text(buf))
    }
}

/// A single line given with `-c`.
pub struct OneShot(Option<String>);

impl OneShot {
    pub fn new(line: String) -> Self {
        Self(Some(line))
    }
}

impl LineSource for OneShot {
    fn read_line(&mut self) -> io::Result<Line> {
        Ok(self.0.take().map_or(Line::Eof, Line::Text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn script_yields_lines_then_eof() {
        let mut source = Script::new(Cursor::new("echo a\r\n\nls | wc\n"));
        assert_eq!(source.read_line().unwrap(), Line::Text("echo a".into()));
        assert_eq!(source.read_line().unwrap(), Line::Text(String::new()));
        assert_eq!(source.read_line().unwrap(), Line::Text("ls | wc".into()));
        assert_eq!(source.read_line().unwrap(), Line::Eof);
    }

    #[test]
    fn last_line_without_newline_is_kept() {
        let mut source = Script::new(Cursor::new("exit"));
        assert_eq!(source.read_line().unwrap(), Line::Text("exit".into()));
        assert_eq!(source.read_line().unwrap(), Line::Eof);
    }

    #[test]
    fn invalid_utf8_line_does_not_end_the_script() {
        let bytes = b"echo first\necho \xff\xfe\necho after\n";
        let mut source = Script::new(Cursor::new(&bytes[..]));
        assert_eq!(source.read_line().unwrap(), Line::Text("echo first".into()));
        assert_eq!(
            source.read_line().unwrap(),
            Line::Text("echo \u{fffd}\u{fffd}".into())
        );
        assert_eq!(source.read_line().unwrap(), Line::Text("echo after".into()));
        assert_eq!(source.read_line().unwrap(), Line::Eof);
    }

    #[test]
    fn one_shot_reads_once() {
        let mut source = OneShot::new("help".into());
        assert_eq!(source.read_line().unwrap(), Line::Text("help".into()));
        assert_eq!(source.read_line().unwrap(), Line::Eof);
    }
}
