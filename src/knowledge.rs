//! Часткова карта контролера: що відомо про кожну клітинку.
use std::fmt;

use crate::core::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Knowledge {
    Unknown,
    VisitedEmpty,
    VisitedTreasure,
    Blocked,
}

impl Knowledge {
    fn symbol(self) -> char {
        match self {
            Knowledge::Unknown => '?',
            Knowledge::VisitedEmpty => '.',
            Knowledge::VisitedTreasure => 'T',
            Knowledge::Blocked => 'X',
        }
    }

    /// Чи дозволено перейти з `self` у `next`. Відвідана клітинка ніколи
    /// не стає заблокованою, скарб не стає порожнім.
    fn accepts(self, next: Knowledge) -> bool {
        use Knowledge::*;
        matches!(
            (self, next),
            (Unknown, VisitedEmpty | VisitedTreasure | Blocked)
                | (VisitedEmpty, VisitedTreasure)
                | (Blocked, VisitedEmpty | VisitedTreasure)
        )
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeGrid {
    rows: i32,
    cols: i32,
    cells: Vec<Knowledge>,
}

impl KnowledgeGrid {
    pub fn new(rows: i32, cols: i32) -> Self {
        let size = (rows.max(0) * cols.max(0)) as usize;
        Self {
            rows,
            cols,
            cells: vec![Knowledge::Unknown; size],
        }
    }

    fn index(&self, position: Position) -> Option<usize> {
        let inside = (0..self.rows).contains(&position.row) && (0..self.cols).contains(&position.col);
        inside.then(|| (position.row * self.cols + position.col) as usize)
    }

    pub fn get(&self, position: Position) -> Option<Knowledge> {
        self.index(position).map(|i| self.cells[i])
    }

    /// Повертає `true`, якщо клітинка змінилась.
    pub fn mark(&mut self, position: Position, next: Knowledge) -> bool {
        let Some(i) = self.index(position) else {
            return false;
        };
        if self.cells[i].accepts(next) {
            self.cells[i] = next;
            true
        } else {
            false
        }
    }

    pub fn count(&self, kind: Knowledge) -> usize {
        self.cells.iter().filter(|k| **k == kind).count()
    }
}

impl fmt::Display for KnowledgeGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.cols.max(1) as usize) {
            let line: String = row.iter().map(|k| k.symbol()).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
