// СЛОВНИК
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Унікальний ідентифікатор агента у флоті.
pub type AgentId = u32;

/// Повний заряд батареї.
pub const FULL_CHARGE: u8 = 100;

/// Вартість одного успішного кроку.
pub const MOVE_COST: u8 = 5;

/// Клітинка сітки: (рядок, стовпець).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Сусідня клітинка у заданому напрямку. Межі сітки не перевіряються.
    pub fn step(self, direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::new(self.row - 1, self.col),
            Direction::Down => Self::new(self.row + 1, self.col),
            Direction::Left => Self::new(self.row, self.col - 1),
            Direction::Right => Self::new(self.row, self.col + 1),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("некоректна позиція '{0}', очікується (рядок, стовпець)")]
pub struct PositionParseError(pub String);

impl FromStr for Position {
    type Err = PositionParseError;

    /// Приймає `(r, c)`, `(r,c)` або `r c`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PositionParseError(s.trim().to_string());
        let inner = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .replace(',', " ");
        let mut parts = inner.split_whitespace();
        let row = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let col = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self::new(row, col))
    }
}

/// Напрямок одного кроку.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("невідомий напрямок '{0}' (up, down, left, right)")]
pub struct DirectionParseError(pub String);

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(DirectionParseError(s.to_string())),
        }
    }
}

/// Стани, в яких може перебувати агент.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum State {
    Active,
    Suspended,
}

/// Позасмугові сигнали площини керування.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControlSignal {
    /// Призупинити виконання команд і розряд батареї.
    Suspend,
    /// Зняти призупинення.
    Resume,
    /// Зарядити батарею до 100 незалежно від стану.
    Recharge,
    /// Записати знімок стану у канал відповідей без запиту.
    StatusDump,
}

/// Код завершення задачі агента.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentExit {
    pub code: i32,
}

impl AgentExit {
    pub const fn success() -> Self {
        Self { code: 0 }
    }
}

/// Глобальний тип помилок для модулів агента.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("агент {0}: канал команд закрито до отримання exit")]
    TransportClosed(AgentId),
    #[error("агент {id}: збій транспорту: {source}")]
    Io {
        id: AgentId,
        #[source]
        source: std::io::Error,
    },
}
