use tracing::{debug, error, instrument, trace};

use crate::engine::ladder::Ladder;
use crate::engine::types::{
    level_count, validate_tick_size, BookError, BookResult, LadderEntry, PriceTick, Side, Trade, Trades,
    DEFAULT_TICK_SIZE, PRICE_EPSILON, QTY_EPSILON,
};

/// Display column: bids up to the midpoint, an optional zero placeholder at a
/// fractional midpoint, then offers from the midpoint up.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub levels: Vec<LadderEntry>,
    /// Midpoint in tick units, `(best_bid_tick + best_offer_tick) / 2`.
    pub midpoint: f64,
    pub tick_size: f64,
}

impl Column {
    pub fn mid_price(&self) -> f64 {
        self.midpoint * self.tick_size
    }
}

/// Tick-quantized two-sided book for a single market.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    tick_size: f64,
    bids: Ladder,
    offers: Ladder,
}

impl Default for OrderBook {
    fn default() -> Self {
        let levels = level_count(DEFAULT_TICK_SIZE);
        Self {
            tick_size: DEFAULT_TICK_SIZE,
            bids: Ladder::new(Side::Bid, levels),
            offers: Ladder::new(Side::Offer, levels),
        }
    }
}

impl OrderBook {
    /// Builds a book and scatters both snapshots onto it.
    #[instrument(level = "debug", skip(bids, offers), fields(bids = bids.len(), offers = offers.len()))]
    pub fn new(tick_size: f64, bids: &[LadderEntry], offers: &[LadderEntry]) -> BookResult<Self> {
        validate_tick_size(tick_size)?;
        let levels = level_count(tick_size);
        let mut book = Self {
            tick_size,
            bids: Ladder::new(Side::Bid, levels),
            offers: Ladder::new(Side::Offer, levels),
        };
        book.update_levels(bids, Side::Bid, false)?;
        book.update_levels(offers, Side::Offer, false)?;
        debug!(tick_size, levels, "Initialized order book");
        Ok(book)
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn level_count(&self) -> usize {
        self.bids.level_count()
    }

    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Bid => &self.bids,
            Side::Offer => &self.offers,
        }
    }

    fn ladder_mut(&mut self, side: Side) -> &mut Ladder {
        match side {
            Side::Bid => &mut self.bids,
            Side::Offer => &mut self.offers,
        }
    }

    /// `round(price / tick_size)`, rejecting anything off the [0, 1] ladder.
    pub fn price_to_tick(&self, price: f64) -> BookResult<PriceTick> {
        let invalid = || BookError::InvalidPrice { price, tick_size: self.tick_size };
        if !price.is_finite() || price < -PRICE_EPSILON || price > 1.0 + PRICE_EPSILON {
            return Err(invalid());
        }
        let tick = (price / self.tick_size).round();
        if tick < 0.0 || tick as usize >= self.level_count() {
            return Err(invalid());
        }
        Ok(tick as PriceTick)
    }

    pub fn tick_to_price(&self, tick: PriceTick) -> f64 {
        tick as f64 * self.tick_size
    }

    fn entry_at(&self, side: Side, tick: PriceTick) -> LadderEntry {
        LadderEntry::new(self.tick_to_price(tick), self.ladder(side).get(tick).unwrap_or(0.0))
    }

    /// Re-grids both sides onto a new tick size.
    ///
    /// Bids map with floor and offers with ceil (see [`Ladder::rescaled`]).
    /// Each side's total must survive the move; otherwise the book is left
    /// as it was and the call fails with `QuantityNotConserved`.
    #[instrument(level = "debug", skip(self), fields(old = self.tick_size))]
    pub fn set_tick_size(&mut self, tick_size: f64) -> BookResult<()> {
        validate_tick_size(tick_size)?;
        if tick_size == self.tick_size {
            return Ok(());
        }
        let levels = level_count(tick_size);
        let bids = self.bids.rescaled(self.tick_size, tick_size, levels);
        let offers = self.offers.rescaled(self.tick_size, tick_size, levels);

        for (old, new) in [(&self.bids, &bids), (&self.offers, &offers)] {
            let (before, after) = (old.total(), new.total());
            if (before - after).abs() > QTY_EPSILON * before.abs().max(1.0) {
                let err = BookError::QuantityNotConserved { side: old.side(), before, after };
                error!(error = %err, tick_size, "Tick size change lost quantity");
                return Err(err);
            }
        }

        self.bids = bids;
        self.offers = offers;
        self.tick_size = tick_size;
        debug!(tick_size, levels, "Tick size changed");
        Ok(())
    }

    pub fn best_bid(&self) -> Option<LadderEntry> {
        self.bids.best().map(|tick| self.entry_at(Side::Bid, tick))
    }

    pub fn best_offer(&self) -> Option<LadderEntry> {
        self.offers.best().map(|tick| self.entry_at(Side::Offer, tick))
    }

    /// Best bid and best offer, each absent when its side is empty.
    pub fn get_best(&self) -> (Option<LadderEntry>, Option<LadderEntry>) {
        (self.best_bid(), self.best_offer())
    }

    pub fn spread(&self) -> Option<f64> {
        match self.get_best() {
            (Some(bid), Some(offer)) => Some(offer.price - bid.price),
            _ => None,
        }
    }

    pub fn total_quantity(&self, side: Side) -> f64 {
        self.ladder(side).total()
    }

    /// Writes one confirmed resting level. Never matches.
    pub fn update_level(&mut self, entry: LadderEntry, side: Side, is_delta: bool) -> BookResult<()> {
        let tick = self.price_to_tick(entry.price)?;
        self.ladder_mut(side).apply(tick, entry.quantity, is_delta)
    }

    /// Writes a batch of confirmed resting levels in input order. Never matches.
    ///
    /// The batch is staged on a copy of the ladder and committed only if every
    /// entry applies, so a bad entry leaves the book untouched.
    pub fn update_levels(&mut self, entries: &[LadderEntry], side: Side, is_delta: bool) -> BookResult<()> {
        let mut staged = self.ladder(side).clone();
        for entry in entries {
            let tick = self.price_to_tick(entry.price)?;
            staged.apply(tick, entry.quantity, is_delta)?;
        }
        *self.ladder_mut(side) = staged;
        Ok(())
    }

    /// Adds a limit order, matching it against the opposite side first.
    ///
    /// A bid walks offers from the lowest tick up to its own price; an offer
    /// walks bids from the top down to its own price. Each fill prints at the
    /// resting level's price. Whatever is left rests on the order's own side,
    /// on top of any quantity already there.
    #[instrument(level = "debug", skip(self), fields(price = entry.price, qty = entry.quantity))]
    pub fn add_limit_order(&mut self, entry: LadderEntry, side: Side) -> BookResult<Trades> {
        if !entry.quantity.is_finite() || entry.quantity < 0.0 {
            return Err(BookError::InvalidQuantity { quantity: entry.quantity });
        }
        let limit = self.price_to_tick(entry.price)?;
        let contra: Vec<PriceTick> = match side {
            Side::Bid => (0..=limit).collect(),
            Side::Offer => (limit..self.level_count()).rev().collect(),
        };

        let mut remaining = entry.quantity;
        let mut trades = Trades::new();
        for tick in contra {
            if remaining <= QTY_EPSILON {
                break;
            }
            let resting = self.ladder(side.opposite()).get(tick).unwrap_or(0.0);
            let fill = remaining.min(resting);
            if fill <= 0.0 {
                continue;
            }
            self.ladder_mut(side.opposite()).apply(tick, -fill, true)?;
            remaining -= fill;
            let price = self.tick_to_price(tick);
            trace!(%side, price, fill, remaining, "Fill against resting level");
            trades.push(Trade { price, quantity: fill });
        }

        if remaining > QTY_EPSILON {
            self.ladder_mut(side).apply(limit, remaining, true)?;
            trace!(%side, tick = limit, remaining, "Rested remainder");
        }
        if !trades.is_empty() {
            debug!(%side, trades = trades.len(), remaining, "Limit order crossed the book");
        }
        Ok(trades)
    }

    /// Display column around the midpoint. Needs both sides populated.
    pub fn get_column(&self) -> BookResult<Column> {
        let (bid, offer) = match (self.bids.best(), self.offers.best()) {
            (Some(bid), Some(offer)) => (bid, offer),
            (bid, offer) => {
                return Err(BookError::OneSidedBook { has_bids: bid.is_some(), has_offers: offer.is_some() })
            }
        };
        let midpoint = (bid + offer) as f64 / 2.0;
        let low = midpoint.floor() as PriceTick;
        let high = midpoint.ceil() as PriceTick;

        let mut levels: Vec<LadderEntry> = (0..=low).map(|tick| self.entry_at(Side::Bid, tick)).collect();
        if midpoint.fract() != 0.0 {
            levels.push(LadderEntry::new(midpoint * self.tick_size, 0.0));
        }
        levels.extend((high..self.level_count()).map(|tick| self.entry_at(Side::Offer, tick)));

        Ok(Column { levels, midpoint, tick_size: self.tick_size })
    }

    /// Nonzero levels of one side, ascending by price.
    pub fn sparse(&self, side: Side) -> Vec<LadderEntry> {
        self.ladder(side)
            .iter_nonzero()
            .map(|(tick, qty)| LadderEntry::new(self.tick_to_price(tick), qty))
            .collect()
    }

    pub fn bids(&self) -> Vec<LadderEntry> {
        self.sparse(Side::Bid)
    }

    pub fn offers(&self) -> Vec<LadderEntry> {
        self.sparse(Side::Offer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_initialise() {
        let book = OrderBook::new(0.01, &[LadderEntry::new(0.40, 10.0)], &[LadderEntry::new(0.60, 5.0)]).unwrap();
        assert_eq!(book.level_count(), 101);
        let (bids, offers) = (book.bids(), book.offers());
        assert_eq!(bids.len(), 1);
        assert_eq!(offers.len(), 1);
        assert!(close(bids[0].price, 0.40) && bids[0].quantity == 10.0);
        assert!(close(offers[0].price, 0.60) && offers[0].quantity == 5.0);
        assert_eq!(book.ladder(Side::Bid).get(40), Some(10.0));
    }

    #[test]
    fn test_initialise_rejects_out_of_range_price() {
        let err = OrderBook::new(0.01, &[LadderEntry::new(1.2, 1.0)], &[]).unwrap_err();
        assert!(matches!(err, BookError::InvalidPrice { .. }));
        let err = OrderBook::new(0.01, &[], &[LadderEntry::new(-0.01, 1.0)]).unwrap_err();
        assert!(matches!(err, BookError::InvalidPrice { .. }));
    }

    #[test]
    fn test_best_bid_and_offer() {
        let book = OrderBook::new(
            0.01,
            &[LadderEntry::new(0.30, 1.0), LadderEntry::new(0.42, 2.0)],
            &[LadderEntry::new(0.55, 3.0), LadderEntry::new(0.70, 4.0)],
        )
        .unwrap();
        let (bid, offer) = book.get_best();
        let (bid, offer) = (bid.unwrap(), offer.unwrap());
        assert!(close(bid.price, 0.42) && bid.quantity == 2.0);
        assert!(close(offer.price, 0.55) && offer.quantity == 3.0);
        assert!(close(book.spread().unwrap(), 0.13));
    }

    #[test]
    fn test_empty_sides_have_no_best() {
        let book = OrderBook::default();
        assert_eq!(book.get_best(), (None, None));
        assert_eq!(book.spread(), None);
    }

    #[test]
    fn test_limit_order_partial_fill_rests_remainder() {
        let mut book = OrderBook::new(0.01, &[], &[LadderEntry::new(0.40, 10.0)]).unwrap();
        let trades = book.add_limit_order(LadderEntry::new(0.45, 15.0), Side::Bid).unwrap();

        assert_eq!(trades.len(), 1);
        assert!(close(trades[0].price, 0.40));
        assert_eq!(trades[0].quantity, 10.0);
        assert_eq!(book.ladder(Side::Offer).get(40), Some(0.0));
        assert_eq!(book.ladder(Side::Bid).get(45), Some(5.0));
    }

    #[test]
    fn test_limit_order_walks_levels_best_first() {
        let mut book = OrderBook::new(
            0.01,
            &[LadderEntry::new(0.50, 4.0), LadderEntry::new(0.48, 4.0), LadderEntry::new(0.40, 4.0)],
            &[],
        )
        .unwrap();
        let trades = book.add_limit_order(LadderEntry::new(0.45, 6.0), Side::Offer).unwrap();

        let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
        assert_eq!(trades.len(), 2);
        assert!(close(prices[0], 0.50) && close(prices[1], 0.48));
        assert_eq!(trades[0].quantity, 4.0);
        assert_eq!(trades[1].quantity, 2.0);
        assert_eq!(book.ladder(Side::Bid).get(48), Some(2.0));
        assert_eq!(book.ladder(Side::Bid).get(40), Some(4.0));
        assert_eq!(book.ladder(Side::Offer).get(45), Some(0.0));
    }

    #[test]
    fn test_limit_order_adds_to_existing_resting_interest() {
        let mut book = OrderBook::new(0.01, &[LadderEntry::new(0.30, 7.0)], &[]).unwrap();
        let trades = book.add_limit_order(LadderEntry::new(0.30, 3.0), Side::Bid).unwrap();
        assert!(trades.is_empty());
        assert_eq!(book.ladder(Side::Bid).get(30), Some(10.0));
    }

    #[test]
    fn test_limit_order_fully_filled_rests_nothing() {
        let mut book = OrderBook::new(0.01, &[], &[LadderEntry::new(0.20, 10.0)]).unwrap();
        let trades = book.add_limit_order(LadderEntry::new(0.25, 10.0), Side::Bid).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_offer(), None);
    }

    #[test]
    fn test_limit_order_rejects_bad_input_without_touching_book() {
        let mut book = OrderBook::new(0.01, &[], &[LadderEntry::new(0.20, 10.0)]).unwrap();
        let before = book.clone();
        assert!(matches!(
            book.add_limit_order(LadderEntry::new(1.5, 1.0), Side::Bid),
            Err(BookError::InvalidPrice { .. })
        ));
        assert!(matches!(
            book.add_limit_order(LadderEntry::new(0.5, -1.0), Side::Bid),
            Err(BookError::InvalidQuantity { .. })
        ));
        assert_eq!(book, before);
    }

    #[test]
    fn test_update_levels_is_all_or_nothing() {
        let mut book = OrderBook::new(0.01, &[LadderEntry::new(0.10, 1.0)], &[]).unwrap();
        let before = book.clone();
        let err = book
            .update_levels(&[LadderEntry::new(0.20, 2.0), LadderEntry::new(0.10, -5.0)], Side::Bid, true)
            .unwrap_err();
        assert!(err.is_integrity_violation());
        assert_eq!(book, before);
    }

    #[test]
    fn test_set_tick_size_coarsens_without_crossing() {
        let mut book =
            OrderBook::new(0.01, &[LadderEntry::new(0.49, 3.0)], &[LadderEntry::new(0.51, 2.0)]).unwrap();
        book.set_tick_size(0.1).unwrap();
        assert_eq!(book.level_count(), 11);
        let (bid, offer) = book.get_best();
        assert!(close(bid.unwrap().price, 0.4));
        assert!(close(offer.unwrap().price, 0.6));
        assert_eq!(book.total_quantity(Side::Bid), 3.0);
        assert_eq!(book.total_quantity(Side::Offer), 2.0);
    }

    #[test]
    fn test_set_tick_size_same_value_is_noop() {
        let mut book = OrderBook::new(0.01, &[LadderEntry::new(0.33, 1.0)], &[]).unwrap();
        let before = book.clone();
        book.set_tick_size(0.01).unwrap();
        assert_eq!(book, before);
    }

    #[test]
    fn test_set_tick_size_reports_lost_quantity() {
        // 1.0 has no ceil-mapped home on a 0.03 grid (top level is 0.99).
        let mut book = OrderBook::new(0.01, &[], &[LadderEntry::new(1.0, 2.0)]).unwrap();
        let before = book.clone();
        let err = book.set_tick_size(0.03).unwrap_err();
        assert!(matches!(err, BookError::QuantityNotConserved { side: Side::Offer, .. }));
        assert_eq!(book, before);
    }

    #[test]
    fn test_column_with_fractional_midpoint() {
        let book = OrderBook::new(0.1, &[LadderEntry::new(0.3, 1.0)], &[LadderEntry::new(0.6, 2.0)]).unwrap();
        let column = book.get_column().unwrap();
        assert_eq!(column.midpoint, 4.5);
        assert!(close(column.mid_price(), 0.45));
        // bids 0..=4, placeholder, offers 5..=10
        assert_eq!(column.levels.len(), 5 + 1 + 6);
        assert_eq!(column.levels[3].quantity, 1.0);
        assert_eq!(column.levels[5].quantity, 0.0);
        assert!(close(column.levels[5].price, 0.45));
        assert_eq!(column.levels[7].quantity, 2.0);
    }

    #[test]
    fn test_column_with_integral_midpoint() {
        let book = OrderBook::new(0.1, &[LadderEntry::new(0.2, 1.0)], &[LadderEntry::new(0.6, 2.0)]).unwrap();
        let column = book.get_column().unwrap();
        assert_eq!(column.midpoint, 4.0);
        // bids 0..=4 then offers 4..=10, no placeholder
        assert_eq!(column.levels.len(), 5 + 7);
    }

    #[test]
    fn test_column_requires_both_sides() {
        let book = OrderBook::new(0.01, &[LadderEntry::new(0.2, 1.0)], &[]).unwrap();
        assert_eq!(book.get_column(), Err(BookError::OneSidedBook { has_bids: true, has_offers: false }));
        assert!(OrderBook::default().get_column().is_err());
    }

    fn entries() -> impl Strategy<Value = Vec<(usize, f64)>> {
        prop::collection::vec((0usize..=100, 0.0f64..1_000.0), 0..40)
    }

    proptest! {
        #[test]
        fn prop_tick_size_change_conserves_each_side(
            bids in entries(),
            offers in entries(),
            new_tick in prop::sample::select(vec![0.1, 0.05, 0.02, 0.001, 0.005]),
        ) {
            let to_entries = |v: &[(usize, f64)]| -> Vec<LadderEntry> {
                v.iter().map(|(t, q)| LadderEntry::new(*t as f64 * 0.01, *q)).collect()
            };
            let mut book = OrderBook::new(0.01, &to_entries(&bids), &to_entries(&offers)).unwrap();
            let (bid_total, offer_total) = (book.total_quantity(Side::Bid), book.total_quantity(Side::Offer));
            book.set_tick_size(new_tick).unwrap();
            prop_assert!((book.total_quantity(Side::Bid) - bid_total).abs() < 1e-6);
            prop_assert!((book.total_quantity(Side::Offer) - offer_total).abs() < 1e-6);
        }

        #[test]
        fn prop_non_divisor_tick_change_conserves_each_side(
            bids in prop::collection::vec((0.0f64..0.96, 0.0f64..1_000.0), 0..40),
            offers in prop::collection::vec((0.0f64..0.96, 0.0f64..1_000.0), 0..40),
            (old_tick, new_tick) in prop::sample::select(vec![(0.01, 0.03), (0.03, 0.02), (0.02, 0.03), (0.05, 0.03)]),
        ) {
            // snap onto the old grid; offers stay below 0.99 so ceil lands on the new ladder
            let to_entries = |v: &[(f64, f64)]| -> Vec<LadderEntry> {
                v.iter().map(|(p, q)| LadderEntry::new((p / old_tick).floor() * old_tick, *q)).collect()
            };
            let mut book = OrderBook::new(old_tick, &to_entries(&bids), &to_entries(&offers)).unwrap();
            let (bid_total, offer_total) = (book.total_quantity(Side::Bid), book.total_quantity(Side::Offer));
            book.set_tick_size(new_tick).unwrap();
            prop_assert_eq!(book.tick_size(), new_tick);
            prop_assert!((book.total_quantity(Side::Bid) - bid_total).abs() < 1e-6);
            prop_assert!((book.total_quantity(Side::Offer) - offer_total).abs() < 1e-6);
        }

        #[test]
        fn prop_absolute_update_is_idempotent(tick in 0usize..=100, qty in 0.0f64..1e6) {
            let entry = LadderEntry::new(tick as f64 * 0.01, qty);
            let mut once = OrderBook::default();
            once.update_level(entry, Side::Offer, false).unwrap();
            let mut twice = once.clone();
            twice.update_level(entry, Side::Offer, false).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_deltas_add_up(tick in 0usize..=100, q1 in 0.0f64..1e4, q2 in 0.0f64..1e4, q3 in 0.0f64..1e4) {
            let price = tick as f64 * 0.01;
            let mut deltas = OrderBook::default();
            for q in [q1, q2, q3] {
                deltas.update_level(LadderEntry::new(price, q), Side::Bid, true).unwrap();
            }
            let mut absolute = OrderBook::default();
            absolute.update_level(LadderEntry::new(price, q1 + q2 + q3), Side::Bid, false).unwrap();
            let got = deltas.ladder(Side::Bid).get(tick).unwrap();
            let want = absolute.ladder(Side::Bid).get(tick).unwrap();
            prop_assert!((got - want).abs() < 1e-6);
        }

        #[test]
        fn prop_matching_never_trades_through_limit(
            resting in entries(),
            tick in 0usize..=100,
            qty in 0.0f64..5_000.0,
            is_bid in any::<bool>(),
        ) {
            let side = if is_bid { Side::Bid } else { Side::Offer };
            let levels: Vec<LadderEntry> =
                resting.iter().map(|(t, q)| LadderEntry::new(*t as f64 * 0.01, *q)).collect();
            let mut book = match side {
                Side::Bid => OrderBook::new(0.01, &[], &levels).unwrap(),
                Side::Offer => OrderBook::new(0.01, &levels, &[]).unwrap(),
            };
            let price = tick as f64 * 0.01;
            let trades = book.add_limit_order(LadderEntry::new(price, qty), side).unwrap();
            for trade in &trades {
                match side {
                    Side::Bid => prop_assert!(trade.price <= price + 1e-9),
                    Side::Offer => prop_assert!(trade.price >= price - 1e-9),
                }
            }
            if let (Some(bid), Some(offer)) = book.get_best() {
                prop_assert!(bid.price < offer.price);
            }
        }

        #[test]
        fn prop_sparse_read_matches_writes_in_any_order(
            ticks in prop::collection::btree_set(0usize..=100, 0..30),
            seed in any::<u64>(),
        ) {
            let mut writes: Vec<LadderEntry> =
                ticks.iter().map(|t| LadderEntry::new(*t as f64 * 0.01, *t as f64 + 1.0)).collect();
            let expected = writes.clone();
            let len = writes.len().max(1);
            writes.rotate_left((seed as usize) % len);
            writes.reverse();

            let mut book = OrderBook::default();
            for entry in &writes {
                book.update_level(*entry, Side::Bid, false).unwrap();
            }
            let got = book.bids();
            prop_assert_eq!(got.len(), expected.len());
            for (g, e) in got.iter().zip(expected.iter()) {
                prop_assert!((g.price - e.price).abs() < 1e-9);
                prop_assert_eq!(g.quantity, e.quantity);
            }
        }
    }
}
