use std::env;

use tracing::{debug, warn};

use crate::error::ShellError;

const COMMENT: char = '#';
const PIPE: char = '|';

/// Default cap on the number of argument slots in one command.
pub const DEFAULT_MAX_ARGS: usize = 100;

/// How a redirection target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Truncate, // >
    Append,   // >>
}

impl RedirectMode {
    pub fn operator(self) -> &'static str {
        match self {
            RedirectMode::Truncate => ">",
            RedirectMode::Append => ">>",
        }
    }
}

// ">>" has to be tried before ">", otherwise it reads as ">" plus a stray ">".
static REDIRECTS: &[(&str, RedirectMode)] = &[
    (">>", RedirectMode::Append),
    (">", RedirectMode::Truncate),
];

/// Structural shape of one input line, borrowed from the line itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Plain(&'a str),
    Piped(&'a str, &'a str),
    Redirected(&'a str, &'a str, RedirectMode),
}

/// Drops everything from the first `#` to the end of the line.
pub fn strip_comment(line: &str) -> &str {
    line.split_once(COMMENT).map_or(line, |(code, _)| code)
}

/// Classifies a raw line. Pipe detection wins over redirection.
pub fn parse_syntax(line: &str) -> Segment<'_> {
    let line = strip_comment(line);

    // Only the first pipe splits; anything after a second one is dropped.
    if let Some((left, rest)) = line.split_once(PIPE) {
        let right = rest.split(PIPE).next().unwrap_or_default();
        if right.len() != rest.len() {
            debug!("ignoring pipeline stages after the second");
        }
        return Segment::Piped(left, right);
    }

    REDIRECTS
        .iter()
        .find_map(|(op, mode)| {
            line.find(op).map(|index| {
                let (command, with_op) = line.split_at(index);
                Segment::Redirected(command, with_op[op.len()..].trim(), *mode)
            })
        })
        .unwrap_or(Segment::Plain(line))
}

/// Ordered argument slots of one command; slot 0 is the command name.
///
/// A slot is `None` when it came from a reference to an undefined
/// environment variable. The arguments handed to `exec` end right before
/// the first such slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
    slots: Vec<Option<String>>,
}

impl ArgVector {
    #[cfg(test)]
    pub fn from_slots(slots: Vec<Option<String>>) -> Self {
        Self { slots }
    }

    #[cfg(test)]
    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    /// The command name, if there is a usable one.
    pub fn command(&self) -> Option<&str> {
        self.slots
            .first()?
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// True when there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.command().is_none()
    }

    /// True when the segment produced no tokens at all.
    pub fn is_blank(&self) -> bool {
        self.slots.is_empty()
    }

    /// Effective arguments, stopping at the first absent slot.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map_while(|slot| slot.as_deref())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args().nth(index)
    }

    /// The vector with its first `n` slots removed.
    pub fn shifted(&self, n: usize) -> ArgVector {
        Self {
            slots: self.slots.iter().skip(n).cloned().collect(),
        }
    }
}

/// Splits a segment into an [`ArgVector`], expanding `$NAME` from the
/// process environment.
pub fn tokenize(segment: &str, max_args: usize) -> ArgVector {
    tokenize_with(segment, max_args, |name| {
        env::var_os(name).map(|value| value.to_string_lossy().into_owned())
    })
}

/// Same as [`tokenize`] with a caller supplied variable lookup.
///
/// Expansion is single pass: the looked-up value is never expanded again.
pub fn tokenize_with<F>(segment: &str, max_args: usize, lookup: F) -> ArgVector
where
    F: Fn(&str) -> Option<String>,
{
    let mut words = strip_comment(segment).split_whitespace();
    let slots = words
        .by_ref()
        .take(max_args)
        .map(|word| match word.strip_prefix('$') {
            Some(name) => lookup(name),
            None => Some(word.to_string()),
        })
        .collect();

    let dropped = words.count();
    if dropped > 0 {
        warn!(max_args, dropped, "argument list truncated");
    }
    ArgVector { slots }
}

/// What the executor will run for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPlan {
    Simple(ArgVector),
    Pipeline(ArgVector, ArgVector),
    Redirect(ArgVector, String, RedirectMode),
}

impl ExecutionPlan {
    /// Tokenizes a segment into a plan. `Ok(None)` means there is nothing to
    /// run (blank line, comment, or an empty command).
    pub fn build(segment: Segment<'_>, max_args: usize) -> Result<Option<Self>, ShellError> {
        let plan = match segment {
            Segment::Plain(command) => {
                let args = tokenize(command, max_args);
                (!args.is_empty()).then_some(ExecutionPlan::Simple(args))
            }
            Segment::Piped(left, right) => {
                let (left, right) = (tokenize(left, max_args), tokenize(right, max_args));
                match (left.is_blank(), right.is_blank()) {
                    (true, true) => None,
                    (false, false) if left.is_empty() => None,
                    // An absent second command is left for its child to report.
                    (false, false) => Some(ExecutionPlan::Pipeline(left, right)),
                    _ => return Err(ShellError::EmptyPipeStage),
                }
            }
            Segment::Redirected(command, target, mode) => {
                let args = tokenize(command, max_args);
                if args.is_empty() {
                    None
                } else if target.is_empty() {
                    return Err(ShellError::MissingTarget(mode.operator()));
                } else {
                    Some(ExecutionPlan::Redirect(args, target.to_string(), mode))
                }
            }
        };
        Ok(plan)
    }

    /// The command the builtin dispatcher looks at.
    pub fn leading(&self) -> &ArgVector {
        match self {
            ExecutionPlan::Simple(args)
            | ExecutionPlan::Pipeline(args, _)
            | ExecutionPlan::Redirect(args, _, _) => args,
        }
    }
}
