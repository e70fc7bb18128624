//! Dispute payout arithmetic.
//!
//! The held total is always split so that `seller_amount + buyer_amount == total` by construction: the seller's share
//! is computed (and rounded) first, and the buyer receives whatever remains, so any rounding residue lands on the
//! buyer's side.
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{AutoVerdict, Money, Order},
    traits::EscrowError,
};

/// How an admin expresses the seller's share of a disputed escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerShare {
    /// A whole percentage in `0..=100`.
    Percent(i64),
    /// An explicit amount. It is clamped to `[0, total]`.
    Amount(Money),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSplit {
    pub total: Money,
    pub seller_pct: i64,
    pub seller_amount: Money,
    pub buyer_amount: Money,
}

impl PayoutSplit {
    pub fn all_to_seller(total: Money) -> Self {
        Self { total, seller_pct: 100, seller_amount: total, buyer_amount: Money::zero() }
    }

    pub fn all_to_buyer(total: Money) -> Self {
        Self { total, seller_pct: 0, seller_amount: Money::zero(), buyer_amount: total }
    }
}

/// Splits `total` between seller and buyer.
///
/// When an explicit amount is given, `seller_pct` is derived from it (rounded half-up) for the record; the amounts
/// themselves are exact.
pub fn compute_split(total: Money, share: SellerShare) -> Result<PayoutSplit, EscrowError> {
    if total.is_negative() {
        return Err(EscrowError::InvalidAmount(format!("Cannot split a negative total of {total}")));
    }
    let (seller_pct, seller_amount) = match share {
        SellerShare::Percent(pct) => {
            if !(0..=100).contains(&pct) {
                return Err(EscrowError::InvalidAmount(format!("Seller percentage must be between 0 and 100, got {pct}")));
            }
            (pct, total.percent_of(pct))
        },
        SellerShare::Amount(amount) => {
            let amount = amount.clamp_to(Money::zero(), total);
            (derived_percentage(amount, total), amount)
        },
    };
    let buyer_amount = total - seller_amount;
    Ok(PayoutSplit { total, seller_pct, seller_amount, buyer_amount })
}

#[allow(clippy::cast_possible_truncation)]
fn derived_percentage(part: Money, total: Money) -> i64 {
    if total.is_zero() {
        return 0;
    }
    let part = i128::from(part.cents()) * 100;
    let total = i128::from(total.cents());
    ((part * 2 + total) / (total * 2)) as i64
}

/// The automatic verdict for a dispute whose window lapsed without an admin decision.
///
/// If the seller confirmed completion and the buyer did not, the seller is paid in full. Every other case, including
/// no confirmations at all, refunds the buyer in full.
pub fn auto_verdict(order: &Order) -> AutoVerdict {
    if order.only_seller_confirmed() {
        AutoVerdict::TimeoutSellerConfirmed
    } else {
        AutoVerdict::TimeoutBuyerRefund
    }
}

pub fn split_for_verdict(total: Money, verdict: AutoVerdict) -> PayoutSplit {
    match verdict {
        AutoVerdict::TimeoutSellerConfirmed => PayoutSplit::all_to_seller(total),
        AutoVerdict::TimeoutBuyerRefund => PayoutSplit::all_to_buyer(total),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn percentage_splits() {
        let split = compute_split(Money::from_units(100), SellerShare::Percent(70)).unwrap();
        assert_eq!(split.seller_amount, Money::from_units(70));
        assert_eq!(split.buyer_amount, Money::from_units(30));
        assert_eq!(split.seller_pct, 70);

        // 33% of 10.01 = 3.3033 -> 3.30, buyer gets the rest
        let split = compute_split(cents(1001), SellerShare::Percent(33)).unwrap();
        assert_eq!(split.seller_amount, cents(330));
        assert_eq!(split.buyer_amount, cents(671));

        // 50% of 0.01 rounds half-up in the seller's favour, the buyer gets nothing
        let split = compute_split(cents(1), SellerShare::Percent(50)).unwrap();
        assert_eq!(split.seller_amount, cents(1));
        assert_eq!(split.buyer_amount, Money::zero());
    }

    #[test]
    fn splits_always_sum_to_the_total() {
        for total in [1, 3, 7, 99, 100, 1001, 33_333, 123_457] {
            for pct in 0..=100 {
                let split = compute_split(cents(total), SellerShare::Percent(pct)).unwrap();
                assert_eq!(split.seller_amount + split.buyer_amount, cents(total));
                assert!(!split.seller_amount.is_negative() && !split.buyer_amount.is_negative());
            }
        }
    }

    #[test]
    fn percentage_out_of_range() {
        assert!(matches!(compute_split(cents(100), SellerShare::Percent(101)), Err(EscrowError::InvalidAmount(_))));
        assert!(matches!(compute_split(cents(100), SellerShare::Percent(-1)), Err(EscrowError::InvalidAmount(_))));
    }

    #[test]
    fn explicit_amounts_are_clamped() {
        let total = Money::from_units(100);
        let split = compute_split(total, SellerShare::Amount(Money::from_units(25))).unwrap();
        assert_eq!(split.seller_amount, Money::from_units(25));
        assert_eq!(split.buyer_amount, Money::from_units(75));
        assert_eq!(split.seller_pct, 25);

        let split = compute_split(total, SellerShare::Amount(Money::from_units(250))).unwrap();
        assert_eq!(split, PayoutSplit::all_to_seller(total));

        let split = compute_split(total, SellerShare::Amount(Money::from_units(-5))).unwrap();
        assert_eq!(split, PayoutSplit::all_to_buyer(total));
    }

    #[test]
    fn derived_percentages_round_half_up() {
        assert_eq!(derived_percentage(cents(1), cents(3)), 33);
        assert_eq!(derived_percentage(cents(2), cents(3)), 67);
        assert_eq!(derived_percentage(cents(1), cents(200)), 1);
        assert_eq!(derived_percentage(Money::zero(), Money::zero()), 0);
    }

    #[test]
    fn verdict_splits() {
        let total = cents(4200);
        assert_eq!(split_for_verdict(total, AutoVerdict::TimeoutSellerConfirmed).seller_amount, total);
        assert_eq!(split_for_verdict(total, AutoVerdict::TimeoutBuyerRefund).buyer_amount, total);
    }
}
