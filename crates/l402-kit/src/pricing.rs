//! Demand-driven boost pricing.

/// Price of the next boost given the count of currently-active boosts:
/// `base_sats * (1 + active_boosts)^2`.
pub fn boost_price(base_sats: u64, active_boosts: u64) -> u64 {
    base_sats.saturating_mul(active_boosts.saturating_add(1).saturating_pow(2))
}

#[cfg(test)]
mod tests {
    use super::boost_price;

    #[test]
    fn base_price_with_no_active_boosts() {
        assert_eq!(boost_price(21, 0), 21);
    }

    #[test]
    fn strictly_increasing_in_demand() {
        for n in 0..64 {
            assert!(boost_price(21, n + 1) > boost_price(21, n));
        }
    }

    #[test]
    fn quadratic_growth() {
        assert_eq!(boost_price(21, 1), 84);
        assert_eq!(boost_price(21, 2), 189);
        assert_eq!(boost_price(21, 9), 2100);
    }
}
