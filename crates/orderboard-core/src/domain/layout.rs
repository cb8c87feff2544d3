//! Column layout engine for the order board.
//!
//! Each half of the board (in progress / ready) shows at most
//! `per_column * max_columns` order numbers, stacked top-to-bottom in columns
//! that fill left-to-right.  With the default policy of 4 per column and 3
//! columns:
//!
//! ```text
//! n = 0        -> no columns
//! n = 1..=4    -> [0..n]
//! n = 5..=8    -> [0..4] [4..n]
//! n = 9..=12   -> [0..4] [4..8] [8..n]
//! n > 12       -> as n = 12, overflowed = true
//! ```
//!
//! The engine is a pure function.  It keeps no state between calls and the
//! two lists of a snapshot are laid out independently.

use thiserror::Error;

use crate::protocol::messages::{OrderNumber, OrderSnapshot};

/// Default number of orders stacked in one column.
pub const DEFAULT_PER_COLUMN: usize = 4;

/// Default number of columns per board half.
pub const DEFAULT_MAX_COLUMNS: usize = 3;

/// Default number of visible orders per board half.
pub const DEFAULT_CAPACITY: usize = DEFAULT_PER_COLUMN * DEFAULT_MAX_COLUMNS;

/// Errors raised when constructing a [`LayoutPolicy`].
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    /// A column must hold at least one order.
    #[error("orders per column must be at least 1")]
    ZeroPerColumn,

    /// At least one column is required.
    #[error("column count must be at least 1")]
    ZeroColumns,

    /// The visible capacity must be at least 1.
    #[error("capacity must be at least 1")]
    ZeroCapacity,
}

/// How many orders fit in a column and how many columns exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutPolicy {
    per_column: usize,
    max_columns: usize,
    capacity: usize,
}

impl LayoutPolicy {
    /// Builds a validated policy.
    ///
    /// `capacity` larger than `per_column * max_columns` is clamped to that
    /// product, since orders past the last column have nowhere to go.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] if any argument is zero.
    pub fn new(per_column: usize, max_columns: usize, capacity: usize) -> Result<Self, LayoutError> {
        if per_column == 0 {
            return Err(LayoutError::ZeroPerColumn);
        }
        if max_columns == 0 {
            return Err(LayoutError::ZeroColumns);
        }
        if capacity == 0 {
            return Err(LayoutError::ZeroCapacity);
        }
        Ok(Self {
            per_column,
            max_columns,
            capacity: capacity.min(per_column.saturating_mul(max_columns)),
        })
    }

    /// Orders per column.
    pub fn per_column(&self) -> usize {
        self.per_column
    }

    /// Maximum number of columns.
    pub fn max_columns(&self) -> usize {
        self.max_columns
    }

    /// Maximum number of visible orders.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of columns needed to show `visible` orders.
    pub fn column_count(&self, visible: usize) -> usize {
        visible.div_ceil(self.per_column).min(self.max_columns)
    }
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            per_column: DEFAULT_PER_COLUMN,
            max_columns: DEFAULT_MAX_COLUMNS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// The arrangement of one order list into columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Columns left to right; each column lists orders top to bottom.
    pub columns: Vec<Vec<OrderNumber>>,
    /// Total number of orders across all columns.
    pub visible_count: usize,
    /// `true` when the source list had more orders than fit.
    pub overflowed: bool,
}

impl ColumnLayout {
    /// Number of non-empty columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Visible orders in reading order (column 0 top to bottom, then column 1, ...).
    pub fn visible(&self) -> impl Iterator<Item = OrderNumber> + '_ {
        self.columns.iter().flatten().copied()
    }
}

/// Layouts for both halves of the board, computed from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardLayout {
    /// Layout of the in-progress list.
    pub active: ColumnLayout,
    /// Layout of the ready list.
    pub completed: ColumnLayout,
}

/// Arranges `list` into columns according to `policy`.
///
/// Only the first `policy.capacity()` entries are shown; the rest are
/// dropped and flagged through [`ColumnLayout::overflowed`].
pub fn layout(list: &[OrderNumber], policy: &LayoutPolicy) -> ColumnLayout {
    let visible_count = list.len().min(policy.capacity());
    let visible = &list[..visible_count];

    let columns: Vec<Vec<OrderNumber>> = visible
        .chunks(policy.per_column())
        .map(<[OrderNumber]>::to_vec)
        .collect();
    debug_assert_eq!(columns.len(), policy.column_count(visible_count));

    ColumnLayout {
        columns,
        visible_count,
        overflowed: list.len() > policy.capacity(),
    }
}

/// Lays out both lists of `snapshot` independently.
pub fn layout_board(snapshot: &OrderSnapshot, policy: &LayoutPolicy) -> BoardLayout {
    BoardLayout {
        active: layout(&snapshot.active, policy),
        completed: layout(&snapshot.completed, policy),
    }
}

/// Formats an order number for display, zero-padded to three digits.
///
/// Numbers wider than three digits are printed in full.
pub fn format_order_number(number: OrderNumber) -> String {
    format!("{number:03}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
