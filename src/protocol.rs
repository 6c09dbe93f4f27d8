//! Рядковий протокол між контролером та агентом: одна команда на рядок,
//! одна відповідь на рядок.
use thiserror::Error;

use crate::core::{AgentId, Direction, DirectionParseError, Position};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("порожній рядок")]
    Empty,
    #[error("невідома команда: {0}")]
    UnknownCommand(String),
    #[error("бракує аргументу: {0}")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Direction(#[from] DirectionParseError),
    #[error("нерозпізнана відповідь: {0}")]
    MalformedResponse(String),
}

/// Команди, які агент виконує через транспорт.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Battery,
    Position,
    Treasure,
    Exit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(ProtocolError::Empty)?;
        match verb {
            "mv" => {
                let direction = parts
                    .next()
                    .ok_or(ProtocolError::MissingArgument("direction"))?;
                Ok(Command::Move(direction.parse()?))
            }
            "bat" => Ok(Command::Battery),
            "pos" => Ok(Command::Position),
            "tr" => Ok(Command::Treasure),
            "exit" => Ok(Command::Exit),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Command::Move(direction) => format!("mv {direction}"),
            Command::Battery => "bat".into(),
            Command::Position => "pos".into(),
            Command::Treasure => "tr".into(),
            Command::Exit => "exit".into(),
        }
    }
}

/// Відповіді агента, включно з позасмуговим знімком стану.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Ko,
    Stopped,
    Treasure,
    Water,
    Charge(u8),
    At(Position),
    Final { position: Position, charge: u8 },
    Status {
        id: AgentId,
        position: Position,
        charge: u8,
    },
    Invalid(String),
}

impl Response {
    pub fn encode(&self) -> String {
        match self {
            Response::Ok => "OK".into(),
            Response::Ko => "KO".into(),
            Response::Stopped => "stopped".into(),
            Response::Treasure => "Treasure".into(),
            Response::Water => "Water".into(),
            Response::Charge(charge) => charge.to_string(),
            Response::At(position) => position.to_string(),
            Response::Final { position, charge } => format!("{position} {charge}"),
            Response::Status {
                id,
                position,
                charge,
            } => format!("id: {id} P: {position} Bat: {charge}"),
            Response::Invalid(reason) => format!("error: {reason}"),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let malformed = || ProtocolError::MalformedResponse(line.to_string());
        match line {
            "" => return Err(ProtocolError::Empty),
            "OK" => return Ok(Response::Ok),
            "KO" => return Ok(Response::Ko),
            "stopped" => return Ok(Response::Stopped),
            "Treasure" => return Ok(Response::Treasure),
            "Water" => return Ok(Response::Water),
            _ => {}
        }

        if let Some(reason) = line.strip_prefix("error:") {
            return Ok(Response::Invalid(reason.trim().to_string()));
        }

        if let Some(rest) = line.strip_prefix("id:") {
            let (id, rest) = rest.split_once("P:").ok_or_else(malformed)?;
            let (position, charge) = rest.split_once("Bat:").ok_or_else(malformed)?;
            return Ok(Response::Status {
                id: id.trim().parse().map_err(|_| malformed())?,
                position: position.parse().map_err(|_| malformed())?,
                charge: charge.trim().parse().map_err(|_| malformed())?,
            });
        }

        if line.starts_with('(') {
            let close = line.find(')').ok_or_else(malformed)?;
            let position = line[..=close].parse().map_err(|_| malformed())?;
            let tail = line[close + 1..].trim();
            if tail.is_empty() {
                return Ok(Response::At(position));
            }
            let charge = tail.parse().map_err(|_| malformed())?;
            return Ok(Response::Final { position, charge });
        }

        line.parse().map(Response::Charge).map_err(|_| malformed())
    }
}
