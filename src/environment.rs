//! Незмінна сітка кімнати та файл стартових позицій.
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::core::{Position, PositionParseError};

/// Запити до світу, спільні для агентів і контролера.
pub trait Environment: Send + Sync {
    /// (рядки, стовпці)
    fn dimensions(&self) -> (i32, i32);
    fn n_treasures(&self) -> usize;
    /// `true`, якщо клітинка в межах сітки і прохідна.
    fn with_obstacle(&self, row: i32, col: i32) -> bool;
    fn with_treasure(&self, row: i32, col: i32) -> bool;

    fn contains(&self, position: Position) -> bool {
        let (rows, cols) = self.dimensions();
        (0..rows).contains(&position.row) && (0..cols).contains(&position.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Free,
    Obstacle,
    Treasure,
}

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("не вдалося прочитати {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("кімната порожня")]
    Empty,
    #[error("рядок {line}: очікувалось {expected} клітинок, знайдено {found}")]
    Ragged {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("рядок {line}: невідомий символ '{symbol}'")]
    UnknownCell { line: usize, symbol: char },
    #[error("рядок {line}: {source}")]
    BadPosition {
        line: usize,
        #[source]
        source: PositionParseError,
    },
}

/// Прямокутна сітка: `.` вільно, `X` перешкода, `T` скарб.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: i32,
    cols: i32,
    cells: Vec<Cell>,
    treasures: usize,
}

impl Grid {
    pub fn parse(text: &str) -> Result<Self, EnvironmentError> {
        let mut cells = Vec::new();
        let mut rows = 0usize;
        let mut cols = None;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mut width = 0;
            for symbol in line.chars() {
                let cell = match symbol {
                    '.' => Cell::Free,
                    'X' | 'x' => Cell::Obstacle,
                    'T' | 't' => Cell::Treasure,
                    other => {
                        return Err(EnvironmentError::UnknownCell {
                            line: index + 1,
                            symbol: other,
                        })
                    }
                };
                cells.push(cell);
                width += 1;
            }
            match cols {
                None => cols = Some(width),
                Some(expected) if expected != width => {
                    return Err(EnvironmentError::Ragged {
                        line: index + 1,
                        expected,
                        found: width,
                    })
                }
                Some(_) => {}
            }
            rows += 1;
        }

        let cols = cols.ok_or(EnvironmentError::Empty)?;
        let treasures = cells.iter().filter(|c| **c == Cell::Treasure).count();
        Ok(Self {
            rows: rows as i32,
            cols: cols as i32,
            cells,
            treasures,
        })
    }

    pub fn load(path: &Path) -> Result<Self, EnvironmentError> {
        Self::parse(&read(path)?)
    }

    pub fn cell(&self, position: Position) -> Option<Cell> {
        if !self.contains(position) {
            return None;
        }
        let index = (position.row * self.cols + position.col) as usize;
        self.cells.get(index).copied()
    }
}

impl Environment for Grid {
    fn dimensions(&self) -> (i32, i32) {
        (self.rows, self.cols)
    }

    fn n_treasures(&self) -> usize {
        self.treasures
    }

    fn with_obstacle(&self, row: i32, col: i32) -> bool {
        matches!(
            self.cell(Position::new(row, col)),
            Some(Cell::Free | Cell::Treasure)
        )
    }

    fn with_treasure(&self, row: i32, col: i32) -> bool {
        self.cell(Position::new(row, col)) == Some(Cell::Treasure)
    }
}

/// Одна позиція `(r, c)` на рядок; порожні рядки пропускаються.
pub fn parse_start_positions(text: &str) -> Result<Vec<Position>, EnvironmentError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            line.parse().map_err(|source| EnvironmentError::BadPosition {
                line: index + 1,
                source,
            })
        })
        .collect()
}

pub fn load_start_positions(path: &Path) -> Result<Vec<Position>, EnvironmentError> {
    parse_start_positions(&read(path)?)
}

fn read(path: &Path) -> Result<String, EnvironmentError> {
    fs::read_to_string(path).map_err(|source| EnvironmentError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_answers_queries() {
        let grid = Grid::parse("X.T\n...\n").unwrap();
        assert_eq!(grid.dimensions(), (2, 3));
        assert_eq!(grid.n_treasures(), 1);
        assert!(!grid.with_obstacle(0, 0));
        assert!(grid.with_obstacle(0, 1));
        assert!(grid.with_obstacle(0, 2));
        assert!(grid.with_treasure(0, 2));
        assert!(!grid.with_treasure(1, 2));
    }

    #[test]
    fn test_out_of_bounds_is_impassable() {
        let grid = Grid::parse("..\n..").unwrap();
        assert!(!grid.with_obstacle(-1, 0));
        assert!(!grid.with_obstacle(0, 2));
        assert!(!grid.with_treasure(2, 0));
        assert!(!grid.contains(Position::new(2, 1)));
    }

    #[test]
    fn test_malformed_rooms_are_rejected() {
        assert!(matches!(
            Grid::parse("...\n..\n"),
            Err(EnvironmentError::Ragged { line: 2, .. })
        ));
        assert!(matches!(
            Grid::parse(".?.\n"),
            Err(EnvironmentError::UnknownCell { symbol: '?', .. })
        ));
        assert!(matches!(Grid::parse("\n\n"), Err(EnvironmentError::Empty)));
    }

    #[test]
    fn test_start_positions_skip_blank_lines() {
        let starts = parse_start_positions("(0, 0)\n\n(1,2)\n").unwrap();
        assert_eq!(starts, vec![Position::new(0, 0), Position::new(1, 2)]);
        assert!(matches!(
            parse_start_positions("(0, 0)\nnope\n"),
            Err(EnvironmentError::BadPosition { line: 2, .. })
        ));
    }
}
