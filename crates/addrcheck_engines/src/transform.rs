#![forbid(unsafe_code)]

use std::borrow::Cow;

use addrcheck_contracts::address::{AddressRecord, AnnotatedAddress};
use addrcheck_contracts::batch::{DpvMatchCode, MatchResult};
use tracing::warn;

pub const MISSING_FIELD_INFO: &str = "Address was missing a required field";
pub const NO_RESULT_INFO: &str = "API returned no result for this address";

pub const CONFIRMED_INFO: &str = "Confirmed; entire address is present in the USPS data.";
pub const NOT_CONFIRMED_INFO: &str = "Not confirmed; address is not present in the USPS data.";
pub const SECONDARY_IGNORED_INFO: &str = "Confirmed by ignoring secondary info; the main address is present in the USPS data, but the submitted secondary information (apartment, suite, etc.) was not recognized.";
pub const SECONDARY_MISSING_INFO: &str = "Confirmed but missing secondary info; the main address is present in the USPS data, but it is missing secondary information (apartment, suite, etc.).";

pub fn match_code_info(code: &DpvMatchCode) -> Cow<'static, str> {
    match code {
        DpvMatchCode::Confirmed => Cow::Borrowed(CONFIRMED_INFO),
        DpvMatchCode::NotConfirmed => Cow::Borrowed(NOT_CONFIRMED_INFO),
        DpvMatchCode::SecondaryIgnored => Cow::Borrowed(SECONDARY_IGNORED_INFO),
        DpvMatchCode::SecondaryMissing => Cow::Borrowed(SECONDARY_MISSING_INFO),
        DpvMatchCode::Other(raw) => Cow::Owned(unknown_code_info(raw)),
    }
}

fn unknown_code_info(raw: &str) -> String {
    format!("No match info for dpv_match_code: {raw}")
}

/// Merges invalid addresses and provider results into one list: every invalid address first, in
/// input order, then every response item in batch order. One output record per input record.
pub fn transform(
    invalid: Vec<AddressRecord>,
    response_items: Vec<(AddressRecord, Option<MatchResult>)>,
) -> Vec<AnnotatedAddress> {
    let mut out = Vec::with_capacity(invalid.len() + response_items.len());
    out.extend(
        invalid
            .into_iter()
            .map(|address| address.annotate(false, MISSING_FIELD_INFO)),
    );
    out.extend(
        response_items
            .into_iter()
            .enumerate()
            .map(|(index, (sent, result))| annotate_response_item(index, sent, result)),
    );
    out
}

fn annotate_response_item(
    index: usize,
    sent: AddressRecord,
    result: Option<MatchResult>,
) -> AnnotatedAddress {
    let Some(result) = result else {
        return sent
            .with_coordinates(None, None)
            .annotate(false, NO_RESULT_INFO);
    };

    let missing: Vec<&str> = [
        ("dpv_match_code", result.dpv_match_code.is_none()),
        ("latitude", result.latitude.is_none()),
        ("longitude", result.longitude.is_none()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(field, _)| field)
    .collect();
    if !missing.is_empty() {
        warn!(index, missing = ?missing, "match result is incomplete");
    }

    // `valid` follows the confidence code alone; incomplete results only warn.
    let (valid, info) = match result.dpv_match_code.as_ref() {
        Some(code) => (code.is_confirmed(), match_code_info(code).into_owned()),
        None => (false, unknown_code_info("")),
    };
    sent.with_coordinates(result.latitude, result.longitude)
        .annotate(valid, info)
}
