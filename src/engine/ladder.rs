use tracing::trace;

use crate::engine::types::{BookError, BookResult, PriceTick, Side, PRICE_EPSILON, QTY_EPSILON};

/// Fixed-length array of resting quantity indexed by price tick.
///
/// Index `i` always holds the quantity at price `i * tick_size`; the ladder
/// itself does not know its tick size, the owning book does.
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    side: Side,
    levels: Vec<f64>,
}

impl Ladder {
    pub fn new(side: Side, level_count: usize) -> Self {
        Self { side, levels: vec![0.0; level_count] }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get(&self, tick: PriceTick) -> Option<f64> {
        self.levels.get(tick).copied()
    }

    /// Sets (`is_delta = false`) or adjusts (`is_delta = true`) one level.
    ///
    /// Validation happens before the write, so a rejected call leaves the
    /// level untouched. Results within `QTY_EPSILON` of zero snap to zero.
    pub fn apply(&mut self, tick: PriceTick, quantity: f64, is_delta: bool) -> BookResult<()> {
        if !quantity.is_finite() || (!is_delta && quantity < 0.0) {
            return Err(BookError::InvalidQuantity { quantity });
        }
        let side = self.side;
        let levels = self.levels.len();
        let level = self.levels.get_mut(tick).ok_or(BookError::TickOutOfRange { tick, levels })?;

        let mut next = if is_delta { *level + quantity } else { quantity };
        if next.abs() < QTY_EPSILON {
            next = 0.0;
        }
        if next < 0.0 {
            return Err(BookError::NegativeLevel { side, tick, quantity: next });
        }
        trace!(%side, tick, prev = *level, next, is_delta, "level write");
        *level = next;
        Ok(())
    }

    /// Tick of the best level: highest nonzero bid, lowest nonzero offer.
    pub fn best(&self) -> Option<PriceTick> {
        match self.side {
            Side::Bid => self.levels.iter().rposition(|q| *q > 0.0),
            Side::Offer => self.levels.iter().position(|q| *q > 0.0),
        }
    }

    /// Nonzero levels in ascending tick order.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (PriceTick, f64)> + '_ {
        self.levels.iter().copied().enumerate().filter(|(_, q)| *q > 0.0)
    }

    pub fn total(&self) -> f64 {
        self.levels.iter().sum()
    }

    /// Rebuilds the ladder for a new tick size.
    ///
    /// Old tick `i` lands on `floor(i * old / new)` for bids and
    /// `ceil(i * old / new)` for offers, so a coarser grid pushes bids down
    /// and offers up instead of crossing them. Colliding levels sum.
    /// Quantity whose target falls off the new ladder is dropped; the caller
    /// checks conservation.
    pub fn rescaled(&self, old_tick: f64, new_tick: f64, new_level_count: usize) -> Ladder {
        let conv = old_tick / new_tick;
        let mut out = Ladder::new(self.side, new_level_count);
        for (i, qty) in self.iter_nonzero() {
            let pos = i as f64 * conv;
            let target = match self.side {
                Side::Bid => (pos + PRICE_EPSILON).floor(),
                Side::Offer => (pos - PRICE_EPSILON).ceil(),
            };
            if target >= 0.0 && (target as usize) < new_level_count {
                out.levels[target as usize] += qty;
            }
        }
        out
    }
}
