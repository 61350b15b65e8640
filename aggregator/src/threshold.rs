//! Stake threshold evaluation.

use crate::types::{GroupNumber, Quorum};
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// Returns true if, for every quorum, `signed * 100 >= total * percentage`.
///
/// A group missing from either `signed` or `total` fails.
pub fn met(
    signed: &BTreeMap<GroupNumber, BigUint>,
    total: &BTreeMap<GroupNumber, BigUint>,
    quorums: &[Quorum],
) -> bool {
    quorums.iter().all(|quorum| {
        let (Some(signed), Some(total)) = (signed.get(&quorum.group), total.get(&quorum.group))
        else {
            return false;
        };
        signed * 100u32 >= total * u32::from(quorum.percentage)
    })
}
