//! Property tests for the allocation policy.
//!
//! These exercise the ordering and quantity rules over generated batches
//! rather than hand-picked examples.

use chrono::{Days, NaiveDate};
use domain::{Batch, DomainError, OrderLine, allocate};
use proptest::prelude::*;

const SKU: &str = "RETRO-CLOCK";

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

fn eta(offset: Option<u64>) -> Option<NaiveDate> {
    offset.and_then(|days| base_date().checked_add_days(Days::new(days)))
}

mod scenarios {
    use super::*;

    #[test]
    fn in_stock_batch_wins_over_tomorrows_shipment() {
        let mut in_stock = Batch::new("in-stock", SKU, 100, None);
        let mut shipment = Batch::new("shipment", SKU, 100, eta(Some(1)));
        let line = OrderLine::new("order-1", SKU, 10);

        let reference = allocate(&line, [&mut in_stock, &mut shipment]).unwrap();

        assert_eq!(reference, "in-stock");
        assert_eq!(in_stock.available_quantity(), 90);
        assert_eq!(shipment.available_quantity(), 100);
    }

    #[test]
    fn exhausted_sku_is_out_of_stock() {
        let mut batch = Batch::new("only", "X", 10, None);

        allocate(&OrderLine::new("order-1", "X", 10), [&mut batch]).unwrap();
        let second = allocate(&OrderLine::new("order-2", "X", 1), [&mut batch]);

        assert!(matches!(second, Err(DomainError::OutOfStock { sku }) if sku == "X"));
        assert_eq!(batch.available_quantity(), 0);
    }

    #[test]
    fn allocating_the_same_line_twice_books_it_once() {
        let mut batch = Batch::new("batch", SKU, 20, None);
        let line = OrderLine::new("order-1", SKU, 5);

        allocate(&line, [&mut batch]).unwrap();
        allocate(&line, [&mut batch]).unwrap();

        assert_eq!(batch.allocated_quantity(), 5);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Property: an in-stock batch with capacity always beats any shipment.
    #[test]
    fn in_stock_preferred_over_any_shipment(
        shipment_offset in 0u64..365,
        quantity in 1u32..100,
        shipment_first in any::<bool>(),
    ) {
        let mut in_stock = Batch::new("in-stock", SKU, 100, None);
        let mut shipment = Batch::new("shipment", SKU, 100, eta(Some(shipment_offset)));
        let line = OrderLine::new("order", SKU, quantity);

        let candidates = if shipment_first {
            vec![&mut shipment, &mut in_stock]
        } else {
            vec![&mut in_stock, &mut shipment]
        };
        let reference = allocate(&line, candidates).unwrap();

        prop_assert_eq!(reference.as_str(), "in-stock");
        prop_assert_eq!(shipment.available_quantity(), 100);
    }

    /// Property: among shipments, the earliest ETA with capacity wins.
    #[test]
    fn earliest_eta_preferred(
        offsets in prop::collection::btree_set(0u64..1000, 2..6),
        quantity in 1u32..50,
    ) {
        let mut batches: Vec<Batch> = offsets
            .iter()
            .rev()
            .map(|offset| Batch::new(format!("batch-{offset}"), SKU, 50, eta(Some(*offset))))
            .collect();
        let earliest = offsets.iter().next().copied().unwrap();
        let line = OrderLine::new("order", SKU, quantity);

        let reference = allocate(&line, batches.iter_mut()).unwrap();

        let expected = format!("batch-{earliest}");
        prop_assert_eq!(reference.as_str(), expected.as_str());
        for batch in &batches {
            if batch.reference().as_str() != expected {
                prop_assert_eq!(batch.available_quantity(), 50);
            }
        }
    }

    /// Property: shrinking a batch and deallocating one line at a time always
    /// ends with non-negative availability, and the allocated quantity drops
    /// by exactly what was removed.
    #[test]
    fn quantity_correction_restores_availability(
        line_quantities in prop::collection::vec(1u32..20, 0..12),
        new_quantity in 0u32..200,
    ) {
        let mut batch = Batch::new("batch", SKU, 300, None);
        for (index, quantity) in line_quantities.iter().enumerate() {
            batch.allocate(&OrderLine::new(format!("order-{index}"), SKU, *quantity));
        }
        let allocated_before = batch.allocated_quantity();

        batch.change_purchased_quantity(new_quantity);
        let mut removed = Vec::new();
        while batch.available_quantity() < 0 {
            removed.push(batch.deallocate_one().unwrap());
        }

        let removed_quantity: i64 = removed.iter().map(OrderLine::quantity_i64).sum();
        prop_assert!(batch.available_quantity() >= 0);
        prop_assert_eq!(batch.allocated_quantity(), allocated_before - removed_quantity);
        for line in &removed {
            prop_assert!(!batch.is_allocated(line));
        }
    }

    /// Property: allocation never drives a batch below zero.
    #[test]
    fn allocation_never_overdraws(
        purchased in 0u32..100,
        requests in prop::collection::vec(1u32..40, 1..20),
    ) {
        let mut batch = Batch::new("batch", SKU, purchased, None);
        for (index, quantity) in requests.iter().enumerate() {
            let line = OrderLine::new(format!("order-{index}"), SKU, *quantity);
            let _ = allocate(&line, [&mut batch]);
            prop_assert!(batch.available_quantity() >= 0);
        }
    }
}
