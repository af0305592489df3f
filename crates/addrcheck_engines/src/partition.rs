#![forbid(unsafe_code)]

use addrcheck_contracts::address::AddressRecord;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedAddresses {
    pub valid: Vec<AddressRecord>,
    pub invalid: Vec<AddressRecord>,
}

/// Splits addresses on structural completeness. Relative input order is kept within each side.
pub fn partition(addresses: Vec<AddressRecord>) -> PartitionedAddresses {
    let (valid, invalid) = addresses
        .into_iter()
        .partition(AddressRecord::is_structurally_valid);
    PartitionedAddresses { valid, invalid }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(line: &str) -> AddressRecord {
        AddressRecord::new(line, "foo", "BA", "91210")
    }

    #[test]
    fn at_part_01_separates_valid_from_invalid_in_order() {
        let addresses = vec![
            AddressRecord::default(),
            named("foo1"),
            AddressRecord::default(),
            named("foo3"),
            named("foo4"),
        ];
        let out = partition(addresses.clone());
        assert_eq!(
            out.valid,
            vec![addresses[1].clone(), addresses[3].clone(), addresses[4].clone()]
        );
        assert_eq!(out.invalid, vec![addresses[0].clone(), addresses[2].clone()]);
    }

    #[test]
    fn at_part_02_empty_input_yields_two_empty_sides() {
        assert_eq!(partition(Vec::new()), PartitionedAddresses::default());
    }

    #[test]
    fn at_part_03_whitespace_only_field_is_invalid_and_counts_are_conserved() {
        let mut blank_zip = named("foo");
        blank_zip.zip_code = Some("   ".to_string());
        let mut partial = named("bar");
        partial.city = None;
        let addresses = vec![blank_zip.clone(), named("baz"), partial.clone()];
        let total = addresses.len();

        let out = partition(addresses);
        assert_eq!(out.valid.len() + out.invalid.len(), total);
        assert_eq!(out.valid, vec![named("baz")]);
        assert_eq!(out.invalid, vec![blank_zip, partial]);
    }
}
