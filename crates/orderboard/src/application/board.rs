//! The board consumer: applies snapshots and drives the renderer.
//!
//! [`OrderBoard`] runs in exactly one task and is the only owner of the
//! displayed order lists.  For every dispatched snapshot it lays out both
//! lists and hands a [`BoardFrame`] to the [`Renderer`].  Rendering toolkits
//! live outside this crate; they implement [`Renderer`] and are responsible
//! for hiding unused columns and replacing the previous frame's widgets.
//!
//! ```text
//! SnapshotReceiver ──► OrderBoard::apply ──► layout_board ──► Renderer::render
//! ```

use orderboard_core::{layout_board, ColumnLayout, LayoutPolicy, OrderSnapshot};
use tracing::{debug, info};

use crate::application::dispatch::{Dispatched, SnapshotReceiver, TransportKind};

/// Headings shown above the two halves of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardLabels {
    /// Heading for orders in preparation.
    pub active: String,
    /// Heading for orders ready for pickup.
    pub completed: String,
}

impl Default for BoardLabels {
    fn default() -> Self {
        Self {
            active: "Küpseb".to_string(),
            completed: "Valmis".to_string(),
        }
    }
}

/// Everything a renderer needs to draw one state of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardFrame {
    /// Headings for both halves.
    pub labels: BoardLabels,
    /// Column layout of the in-progress list.
    pub active: ColumnLayout,
    /// Column layout of the ready list.
    pub completed: ColumnLayout,
    /// Transport that delivered the snapshot; `None` for the initial frame.
    pub source: Option<TransportKind>,
    /// Number of snapshots applied so far, including this one.
    pub sequence: u64,
}

/// Render callback implemented by the display surface.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send {
    /// Replaces whatever is on screen with `frame`.
    fn render(&mut self, frame: &BoardFrame);
}

/// Running counters kept by the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardStats {
    /// Snapshots applied.
    pub applied: u64,
    /// Snapshots that arrived over TCP.
    pub from_network: u64,
    /// Snapshots that arrived over RFCOMM.
    pub from_wireless: u64,
    /// Lists (active or completed) that had more orders than fit.
    pub overflowed_lists: u64,
}

/// Single-consumer owner of the displayed order state.
pub struct OrderBoard<R> {
    policy: LayoutPolicy,
    labels: BoardLabels,
    renderer: R,
    current: OrderSnapshot,
    stats: BoardStats,
}

impl<R: Renderer> OrderBoard<R> {
    /// Creates a board showing no orders.
    pub fn new(policy: LayoutPolicy, labels: BoardLabels, renderer: R) -> Self {
        Self {
            policy,
            labels,
            renderer,
            current: OrderSnapshot::default(),
            stats: BoardStats::default(),
        }
    }

    /// The snapshot currently on display.
    pub fn current(&self) -> &OrderSnapshot {
        &self.current
    }

    /// Counters accumulated since the board was created.
    pub fn stats(&self) -> BoardStats {
        self.stats
    }

    /// The renderer, for inspection.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Consumes the board and returns its renderer.
    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Renders the current state without applying anything new.
    pub fn render_current(&mut self) {
        let frame = self.frame(None);
        self.renderer.render(&frame);
    }

    /// Replaces the displayed state with `dispatched.snapshot` and renders it.
    pub fn apply(&mut self, dispatched: Dispatched) {
        let Dispatched {
            transport,
            snapshot,
        } = dispatched;

        self.stats.applied += 1;
        match transport {
            TransportKind::Network => self.stats.from_network += 1,
            TransportKind::Wireless => self.stats.from_wireless += 1,
        }
        self.current = snapshot;

        let frame = self.frame(Some(transport));
        self.stats.overflowed_lists +=
            u64::from(frame.active.overflowed) + u64::from(frame.completed.overflowed);

        debug!(
            "applied snapshot #{} from {transport}: {} active, {} completed",
            frame.sequence,
            self.current.active.len(),
            self.current.completed.len()
        );
        self.renderer.render(&frame);
    }

    /// Draws the initial empty frame, then applies snapshots until every
    /// sender is gone.  Returns the board so callers can read its final state.
    pub async fn run(mut self, mut receiver: SnapshotReceiver) -> Self {
        self.render_current();
        while let Some(dispatched) = receiver.recv().await {
            self.apply(dispatched);
        }
        info!("board consumer stopped after {} snapshot(s)", self.stats.applied);
        self
    }

    fn frame(&self, source: Option<TransportKind>) -> BoardFrame {
        let layout = layout_board(&self.current, &self.policy);
        BoardFrame {
            labels: self.labels.clone(),
            active: layout.active,
            completed: layout.completed,
            source,
            sequence: self.stats.applied,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
