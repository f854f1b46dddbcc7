//! Clinic-scoped document numbering: `PREFIX-YYYY-NNNNN`, sequential per
//! clinic per year, derived by parsing the highest existing suffix.

/// Suffix of `number` when it belongs to the given prefix/year series.
pub fn parse_sequence(number: &str, prefix: &str, year: i32) -> Option<u32> {
    let series = format!("{prefix}-{year}-");
    number.strip_prefix(&series)?.parse().ok()
}

/// Next number in the series given every existing number for the clinic.
/// Numbers from other years or malformed entries are ignored.
pub fn next_in_series<'a, I>(prefix: &str, year: i32, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing
        .into_iter()
        .filter_map(|number| parse_sequence(number, prefix, year))
        .max()
        .unwrap_or(0);
    format!("{prefix}-{year}-{:05}", highest + 1)
}

/// `CLM-YYYY-NNNNN` claim numbers.
pub fn next_claim_number<'a, I>(year: i32, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    next_in_series("CLM", year, existing)
}

/// `PAY-YYYY-NNNNN` payment numbers.
pub fn next_payment_number<'a, I>(year: i32, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    next_in_series("PAY", year, existing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_number_in_an_empty_series() {
        assert_eq!(next_claim_number(2024, []), "CLM-2024-00001");
        assert_eq!(next_payment_number(2024, []), "PAY-2024-00001");
    }

    #[test]
    fn continues_from_the_highest_existing_suffix() {
        let existing = ["CLM-2024-00007", "CLM-2024-00012", "CLM-2024-00003"];
        assert_eq!(next_claim_number(2024, existing), "CLM-2024-00013");
    }

    #[test]
    fn other_years_and_malformed_numbers_are_ignored() {
        let existing = [
            "CLM-2023-00099",
            "CLM-2024-00002",
            "CLM-2024-abc",
            "INV-2024-00050",
        ];
        assert_eq!(next_claim_number(2024, existing), "CLM-2024-00003");
    }

    #[test]
    fn sequence_grows_past_five_digits_without_truncation() {
        let existing = ["PAY-2024-99999"];
        assert_eq!(next_payment_number(2024, existing), "PAY-2024-100000");
    }

    #[test]
    fn parse_rejects_foreign_series() {
        assert_eq!(parse_sequence("CLM-2024-00009", "CLM", 2024), Some(9));
        assert_eq!(parse_sequence("CLM-2024-00009", "PAY", 2024), None);
        assert_eq!(parse_sequence("CLM-2023-00009", "CLM", 2024), None);
    }
}
