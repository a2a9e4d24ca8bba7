//! Event lines of the persisted protocol

use crate::{BoundingBox, Error, Result, DEFAULT_CONFIDENCE};
use std::fmt;
use std::str::FromStr;

/// Prefix of comment lines
pub const COMMENT_PREFIX: char = '%';

/// The five kinds of protocol commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandKind {
    Create,
    Move,
    Resize,
    MoveAndResize,
    Delete,
}

impl CommandKind {
    /// All command kinds, in protocol order
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Create,
        CommandKind::Move,
        CommandKind::Resize,
        CommandKind::MoveAndResize,
        CommandKind::Delete,
    ];

    /// Keyword written in the file
    pub fn keyword(self) -> &'static str {
        match self {
            CommandKind::Create => "BB_CREATE",
            CommandKind::Move => "BB_MOVE",
            CommandKind::Resize => "BB_RESIZE",
            CommandKind::MoveAndResize => "BB_MOVE_AND_RESIZE",
            CommandKind::Delete => "BB_DELETE",
        }
    }

    /// Accepted parameter counts, without and with the trailing confidence
    fn arity(self) -> (usize, usize) {
        match self {
            CommandKind::Create => (5, 6),
            CommandKind::Move | CommandKind::Resize => (2, 3),
            CommandKind::MoveAndResize => (4, 5),
            CommandKind::Delete => (0, 0),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.keyword() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Command payload of an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Create {
        class_id: u32,
        bbox: BoundingBox,
        confidence: f64,
    },
    Move {
        x: f64,
        y: f64,
        confidence: f64,
    },
    Resize {
        width: f64,
        height: f64,
        confidence: f64,
    },
    MoveAndResize {
        bbox: BoundingBox,
        confidence: f64,
    },
    Delete,
}

impl Command {
    /// Returns the kind of this command
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Create { .. } => CommandKind::Create,
            Command::Move { .. } => CommandKind::Move,
            Command::Resize { .. } => CommandKind::Resize,
            Command::MoveAndResize { .. } => CommandKind::MoveAndResize,
            Command::Delete => CommandKind::Delete,
        }
    }
}

/// One line of the event log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Timestamp in microseconds
    pub timestamp: u64,
    /// Object the event applies to
    pub object_id: u32,
    /// What happened
    pub command: Command,
}

impl Event {
    /// Creates a new event
    pub fn new(timestamp: u64, object_id: u32, command: Command) -> Self {
        Self {
            timestamp,
            object_id,
            command,
        }
    }

    /// Creates a delete event
    pub fn delete(timestamp: u64, object_id: u32) -> Self {
        Self::new(timestamp, object_id, Command::Delete)
    }

    /// Parses a single event line. `line_number` is only used for error
    /// reporting.
    pub fn parse_line(line: &str, line_number: usize) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(Error::malformed(
                line_number,
                format!("expected at least 3 fields, found {}", tokens.len()),
            ));
        }

        let timestamp: u64 = parse_field(tokens[0], "timestamp", line_number)?;
        let object_id: u32 = parse_field(tokens[1], "object id", line_number)?;
        let kind: CommandKind = tokens[2].parse().map_err(|command| Error::UnknownCommand {
            line: line_number,
            command,
        })?;

        let params = &tokens[3..];
        let (required, with_confidence) = kind.arity();
        if params.len() != required && params.len() != with_confidence {
            return Err(Error::malformed(
                line_number,
                format!(
                    "{} takes {} parameters, found {}",
                    kind,
                    with_confidence,
                    params.len()
                ),
            ));
        }

        let float = |index: usize, name: &str| parse_field::<f64>(params[index], name, line_number);
        let confidence = match params.get(required) {
            Some(token) => parse_field(token, "confidence", line_number)?,
            None => DEFAULT_CONFIDENCE,
        };

        let command = match kind {
            CommandKind::Create => Command::Create {
                class_id: parse_field(params[0], "class id", line_number)?,
                bbox: BoundingBox::new(
                    float(1, "x")?,
                    float(2, "y")?,
                    float(3, "width")?,
                    float(4, "height")?,
                ),
                confidence,
            },
            CommandKind::Move => Command::Move {
                x: float(0, "x")?,
                y: float(1, "y")?,
                confidence,
            },
            CommandKind::Resize => Command::Resize {
                width: float(0, "width")?,
                height: float(1, "height")?,
                confidence,
            },
            CommandKind::MoveAndResize => Command::MoveAndResize {
                bbox: BoundingBox::new(
                    float(0, "x")?,
                    float(1, "y")?,
                    float(2, "width")?,
                    float(3, "height")?,
                ),
                confidence,
            },
            CommandKind::Delete => Command::Delete,
        };

        Ok(Self::new(timestamp, object_id, command))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:010} {} {}",
            self.timestamp,
            self.object_id,
            self.command.kind()
        )?;
        match self.command {
            Command::Create {
                class_id,
                bbox,
                confidence,
            } => write!(
                f,
                " {} {:.6} {:.6} {:.6} {:.6} {:.6}",
                class_id, bbox.x, bbox.y, bbox.width, bbox.height, confidence
            ),
            Command::Move { x, y, confidence } => write!(f, " {:.6} {:.6} {:.6}", x, y, confidence),
            Command::Resize {
                width,
                height,
                confidence,
            } => write!(f, " {:.6} {:.6} {:.6}", width, height, confidence),
            Command::MoveAndResize { bbox, confidence } => write!(
                f,
                " {:.6} {:.6} {:.6} {:.6} {:.6}",
                bbox.x, bbox.y, bbox.width, bbox.height, confidence
            ),
            Command::Delete => Ok(()),
        }
    }
}

/// True for lines the decoder skips
pub fn is_ignored_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with(COMMENT_PREFIX)
}

fn parse_field<T: FromStr>(token: &str, name: &str, line_number: usize) -> Result<T> {
    token
        .parse()
        .map_err(|_| Error::malformed(line_number, format!("invalid {}: '{}'", name, token)))
}
