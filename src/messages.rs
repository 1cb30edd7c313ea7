// Commands received from the server

use crate::motor::LinePattern;

/// Single-character motion command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Forward,
    Backward,
    TurnRight,
    TurnLeft,
    Stop,
}

impl MotionCommand {
    pub const ALL: [MotionCommand; 5] = [
        MotionCommand::Forward,
        MotionCommand::Backward,
        MotionCommand::TurnRight,
        MotionCommand::TurnLeft,
        MotionCommand::Stop,
    ];

    /// Map a command character, `None` for anything outside `f b r l s`
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'f' => Some(Self::Forward),
            'b' => Some(Self::Backward),
            'r' => Some(Self::TurnRight),
            'l' => Some(Self::TurnLeft),
            's' => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Forward => 'f',
            Self::Backward => 'b',
            Self::TurnRight => 'r',
            Self::TurnLeft => 'l',
            Self::Stop => 's',
        }
    }

    /// Output line pattern driven for this command
    pub fn pattern(self) -> LinePattern {
        match self {
            Self::Forward => LinePattern::FORWARD,
            Self::Backward => LinePattern::BACKWARD,
            Self::TurnRight => LinePattern::TURN_RIGHT,
            Self::TurnLeft => LinePattern::TURN_LEFT,
            Self::Stop => LinePattern::STOP,
        }
    }
}

/// One decoded socket read
///
/// Reads are not framed, so several commands sent in quick succession arrive
/// as one payload. Such payloads land in `Unrecognized` and are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    Motion(MotionCommand),
    Unrecognized(String),
}

impl Message {
    pub fn parse(payload: &str) -> Self {
        if payload == "q" {
            return Self::Quit;
        }

        let mut chars = payload.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => match MotionCommand::from_char(c) {
                Some(cmd) => Self::Motion(cmd),
                None => Self::Unrecognized(payload.to_string()),
            },
            _ => Self::Unrecognized(payload.to_string()),
        }
    }
}
