#![forbid(unsafe_code)]

use addrcheck_contracts::address::AddressRecord;
use addrcheck_contracts::batch::{BatchItem, BatchRequest};
use addrcheck_contracts::ContractViolation;

/// Turns the valid subset into the outbound batch. One item per address at the same index; no
/// filtering, dedup or reordering.
pub fn build_batch(valid: &[AddressRecord]) -> Result<BatchRequest, ContractViolation> {
    let items = valid
        .iter()
        .enumerate()
        .map(|(index, address)| batch_item(index, address))
        .collect::<Result<Vec<_>, _>>()?;
    BatchRequest::v1(items)
}

fn batch_item(index: usize, address: &AddressRecord) -> Result<BatchItem, ContractViolation> {
    BatchItem::v1(
        index,
        address.address_line_one.clone().unwrap_or_default(),
        address.city.clone().unwrap_or_default(),
        address.state.clone().unwrap_or_default(),
        address.zip_code.clone().unwrap_or_default(),
    )
}
