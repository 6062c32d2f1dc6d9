//! Seeded random walks over the credit ledger checking its invariants.

mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{assert_close, my};
use solar_credits::settlement::ledger::{CreditLedger, EPSILON_KWH};

/// Runs `months` random months: each banks a surplus or draws a deficit.
fn random_walk(seed: u64, months: i32, validity: u32) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ledger = CreditLedger::new(validity);
    let mut banked = 0.0;
    let mut drawn = 0.0;

    for offset in 0..months {
        let period = my(1, 2024).plus_months(offset);
        ledger.expire(period);

        if rng.random_bool(0.5) {
            let kwh = rng.random_range(1.0..800.0);
            assert!(ledger.add_credit_at(period, kwh).is_ok());
            banked += kwh;
        } else {
            let request = rng.random_range(0.0..1200.0);
            let before = ledger.available_balance(period);
            let draw = ledger
                .consume(request, period)
                .unwrap_or_else(|e| panic!("{e}"));

            assert!(draw.consumed_kwh <= request + EPSILON_KWH);
            assert_close(
                draw.consumed_kwh,
                request.min(before),
                1e-6,
                "draw size",
            );
            assert_close(
                ledger.available_balance(period),
                before - draw.consumed_kwh,
                1e-6,
                "balance after draw",
            );
            // oldest expiry first: every lot but the last one drawn is emptied
            assert!(draw.draws.windows(2).all(|w| w[0].expiry <= w[1].expiry));
            for lot_draw in draw.draws.iter().rev().skip(1) {
                let lot = ledger
                    .lots()
                    .iter()
                    .find(|l| l.generated == lot_draw.generated)
                    .unwrap_or_else(|| panic!("drawn lot {} missing", lot_draw.generated));
                assert_eq!(lot.remaining_kwh, 0.0);
            }
            drawn += draw.consumed_kwh;
        }

        assert!(
            ledger.check_invariants().is_ok(),
            "invariants broken at {period}: {:?}",
            ledger.check_invariants()
        );
        assert!(
            ledger
                .lots()
                .iter()
                .filter(|l| l.active)
                .all(|l| l.expiry >= period)
        );
    }

    let held: f64 = ledger.lots().iter().map(|l| l.remaining_kwh).sum();
    assert_close(banked, drawn + held, 1e-6, "conservation");
    let forfeited = ledger.forfeited_total();
    assert!(forfeited <= held + 1e-9);
}

#[test]
fn random_walks_keep_ledger_consistent() {
    for seed in 0..20 {
        random_walk(seed, 96, 60);
    }
}

#[test]
fn short_validity_forfeits_but_conserves() {
    for seed in 100..110 {
        random_walk(seed, 48, 3);
    }
}
