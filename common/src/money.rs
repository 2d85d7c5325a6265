use std::str::FromStr;

use rust_decimal::Decimal;

use crate::ValidationError;

/// Balances are persisted as integer cents.
pub const CENTS_SCALE: u32 = 2;

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp(CENTS_SCALE)
}

pub fn to_cents(amount: Decimal) -> Result<i64, ValidationError> {
    let mut rounded = round_cents(amount);
    rounded.rescale(CENTS_SCALE);
    i64::try_from(rounded.mantissa()).map_err(|_| ValidationError::NotANumber { field: "amount" })
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CENTS_SCALE)
}

/// Parses user-typed numbers, accepting a comma as decimal separator.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, ValidationError> {
    let normalized = raw.trim().replace(',', ".");
    Decimal::from_str(&normalized).map_err(|_| ValidationError::NotANumber { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cents_conversion_rounds_to_two_places() {
        assert_eq!(to_cents(dec!(20.8)).unwrap(), 2080);
        assert_eq!(to_cents(dec!(-7)).unwrap(), -700);
        assert_eq!(to_cents(dec!(6.1605)).unwrap(), 616);
        assert_eq!(from_cents(1040), dec!(10.40));
    }

    #[test]
    fn parse_accepts_comma_and_rejects_non_finite() {
        assert_eq!(parse_decimal("odds", "2,10").unwrap(), dec!(2.10));
        assert_eq!(
            parse_decimal("odds", "NaN"),
            Err(ValidationError::NotANumber { field: "odds" })
        );
        assert!(parse_decimal("stake", "inf").is_err());
    }
}
