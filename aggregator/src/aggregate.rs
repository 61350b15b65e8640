//! Selection of the reported digest and construction of the aggregate.

use crate::{
    reader::Reader,
    threshold,
    types::{
        AggregationError, BlockNumber, ChainId, GroupDvsState, GroupNumber, OperatorDvsState,
        OperatorId, OperatorStateInfo, Quorum, RequestHash, ResponseWithSignature, ResultDigest,
        ValidatedResponse,
    },
};
use commonware_cryptography::bls12381::primitives::{
    group::{Element, G1},
    ops,
    variant::MinSig,
};
use num_bigint::BigUint;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Chain state a task was created with.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub hash: RequestHash,
    pub chain: ChainId,
    pub height: BlockNumber,
    pub quorums: Vec<Quorum>,
    pub operators: BTreeMap<OperatorId, OperatorDvsState>,
    pub groups: BTreeMap<GroupNumber, GroupDvsState>,
    pub state: OperatorStateInfo,
}

impl Snapshot {
    /// Groups named by the request, in request order.
    pub fn group_numbers(&self) -> Vec<GroupNumber> {
        self.quorums.iter().map(|quorum| quorum.group).collect()
    }
}

/// Responses recorded by a task.
#[derive(Default)]
pub struct Tally {
    responses: BTreeMap<OperatorId, ResponseWithSignature>,

    // Digests in the order they were first seen, with their signers in submission order
    digests: Vec<(ResultDigest, Vec<OperatorId>)>,
}

impl Tally {
    /// Records `response`, returning false if its operator already submitted one.
    pub fn record(&mut self, response: ResponseWithSignature) -> bool {
        if self.responses.contains_key(&response.operator_id) {
            return false;
        }
        let operator = response.operator_id;
        match self.digests.iter_mut().find(|(d, _)| *d == response.digest) {
            Some((_, signers)) => signers.push(operator),
            None => self.digests.push((response.digest, vec![operator])),
        }
        self.responses.insert(operator, response);
        true
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }
}

/// Computes the outcome of a task from its snapshot and recorded responses.
pub async fn aggregate<R: Reader>(
    reader: &R,
    snapshot: &Snapshot,
    tally: &Tally,
) -> Result<ValidatedResponse, AggregationError> {
    let task = snapshot.hash;
    let Some((digest, signers)) = tally.digests.first() else {
        return Err(AggregationError::no_signatures(task));
    };

    // The first digest seen decides the outcome
    let total: BTreeMap<GroupNumber, BigUint> = snapshot
        .groups
        .iter()
        .map(|(group, state)| (*group, state.total_stake.clone()))
        .collect();
    let mut signed: BTreeMap<GroupNumber, BigUint> = BTreeMap::new();
    for signer in signers {
        let Some(state) = snapshot.operators.get(signer) else {
            continue;
        };
        for (group, stake) in &state.stake_per_group {
            *signed.entry(*group).or_default() += stake;
        }
    }
    if !threshold::met(&signed, &total, &snapshot.quorums) {
        warn!(%task, %digest, "stake thresholds not met");
        return Err(AggregationError::stake_thresholds_not_met(task, digest));
    }
    let digest = *digest;
    debug!(%task, %digest, signers = signers.len(), "selected digest");

    // Aggregate the signatures and G2 keys of everyone who signed the selected digest
    let mut signatures = Vec::with_capacity(signers.len());
    let mut signer_keys = Vec::with_capacity(signers.len());
    let mut data = Vec::new();
    for (index, signer) in signers.iter().enumerate() {
        let Some(response) = tally.responses.get(signer) else {
            continue;
        };
        if index == 0 {
            data = response.data.clone();
        }
        let info = reader
            .operator_info_by_id(*signer)
            .await
            .map_err(|_| AggregationError::operator_info_not_found(task, signer))?;
        signatures.push(response.signature);
        signer_keys.push(info.pubkeys.g2);
    }
    let signers_agg_sig_g1 = ops::aggregate_signatures::<MinSig, _>(&signatures);
    let signers_apk_g2 = ops::aggregate_public_keys::<MinSig, _>(&signer_keys);

    // Aggregate keys of every requested group (identity if the group has no state)
    let group_numbers = snapshot.group_numbers();
    let group_apks_g1 = group_numbers
        .iter()
        .map(|group| {
            snapshot
                .groups
                .get(group)
                .map(|state| state.agg_pubkey_g1)
                .unwrap_or_else(G1::zero)
        })
        .collect();

    // Everyone registered in an active requested group who did not sign the selected digest,
    // keyed (and so sorted) by BLS-derived id
    let registered: BTreeSet<OperatorId> = group_numbers
        .iter()
        .filter_map(|group| snapshot.state.group_operators.get(group))
        .filter(|operators| !operators.is_empty())
        .flatten()
        .map(|operator| operator.operator_id)
        .collect();
    let mut non_signers: BTreeMap<OperatorId, G1> = BTreeMap::new();
    for operator in registered {
        let info = reader
            .operator_info_by_id(operator)
            .await
            .map_err(|_| AggregationError::operator_info_not_found(task, &operator))?;
        let signed = tally
            .responses
            .get(&operator)
            .is_some_and(|response| response.digest == digest);
        if !signed {
            non_signers.insert(info.pubkeys.operator_id(), info.pubkeys.g1);
        }
    }
    let non_signer_ids: Vec<OperatorId> = non_signers.keys().copied().collect();

    let indices = reader
        .check_signatures_indices(
            snapshot.chain,
            snapshot.height,
            &group_numbers,
            &non_signer_ids,
        )
        .await
        .map_err(|err| AggregationError::invalid_indices(task, err))?;

    info!(
        %task,
        %digest,
        signers = signatures.len(),
        non_signers = non_signer_ids.len(),
        "aggregated signatures"
    );
    Ok(ValidatedResponse {
        data,
        error: None,
        hash: task,
        non_signers_pubkeys_g1: non_signers.into_values().collect(),
        group_apks_g1,
        signers_apk_g2,
        signers_agg_sig_g1,
        non_signer_group_bitmap_indices: indices.non_signer_group_bitmap_indices,
        group_apk_indices: indices.group_apk_indices,
        total_stake_indices: indices.total_stake_indices,
        non_signer_stake_indices: indices.non_signer_stake_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use crate::types::ErrorCode;
    use commonware_cryptography::sha256;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    fn snapshot(reader: &mocks::Reader, quorums: Vec<Quorum>) -> Snapshot {
        let groups: Vec<_> = quorums.iter().map(|q| q.group).collect();
        Snapshot {
            hash: RequestHash::from([7; 32]),
            chain: mocks::CHAIN,
            height: 1,
            quorums,
            operators: reader.operators(&groups),
            groups: reader.groups(&groups),
            state: OperatorStateInfo::from_operators(&reader.operators(&groups)),
        }
    }

    #[test]
    fn test_tally_ignores_duplicates() {
        let operators = mocks::operators(&[10, 10]);
        let request = mocks::request(&[(0, 100)]);
        let mut tally = Tally::default();
        assert_eq!(tally.len(), 0);
        assert!(tally.record(operators[0].respond(&request, b"a")));
        assert!(!tally.record(operators[0].respond(&request, b"b")));
        assert!(tally.record(operators[1].respond(&request, b"b")));
        assert_eq!(tally.len(), 2);
        assert_eq!(tally.digests.len(), 2);
        assert_eq!(tally.digests[0].1, vec![operators[0].id]);
    }

    #[test_traced]
    fn test_first_digest_decides() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let operators = mocks::operators(&[10, 10, 10]);
            let reader = mocks::Reader::new(operators.clone());
            let request = mocks::request(&[(0, 60)]);
            let snapshot = snapshot(&reader, vec![Quorum { group: 0, percentage: 60 }]);

            // A lone minority digest seen first fails the task even though the
            // majority digest would pass
            let mut tally = Tally::default();
            tally.record(operators[0].respond(&request, b"minority"));
            tally.record(operators[1].respond(&request, b"majority"));
            tally.record(operators[2].respond(&request, b"majority"));
            let err = aggregate(&reader, &snapshot, &tally).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::StakeThresholdsNotMet);
            assert_eq!(err.data, snapshot.hash);

            // Seen first, the majority digest is selected
            let mut tally = Tally::default();
            tally.record(operators[1].respond(&request, b"majority"));
            tally.record(operators[0].respond(&request, b"minority"));
            tally.record(operators[2].respond(&request, b"majority"));
            let result = aggregate(&reader, &snapshot, &tally).await.unwrap();
            assert_eq!(result.data, b"majority".to_vec());
            assert_eq!(result.non_signers_pubkeys_g1, vec![operators[0].pubkeys().g1]);
            let expected = ops::aggregate_public_keys::<MinSig, _>(&[
                operators[1].pubkeys().g2,
                operators[2].pubkeys().g2,
            ]);
            assert_eq!(result.signers_apk_g2, expected);
            ops::verify_message::<MinSig>(
                &result.signers_apk_g2,
                None,
                &sha256::hash(b"majority"),
                &result.signers_agg_sig_g1,
            )
            .unwrap();
        });
    }

    #[test_traced]
    fn test_no_signatures() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let reader = mocks::Reader::new(mocks::operators(&[10]));
            let snapshot = snapshot(&reader, vec![Quorum { group: 0, percentage: 1 }]);
            let err = aggregate(&reader, &snapshot, &Tally::default())
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::NoSignatures);
        });
    }

    #[test_traced]
    fn test_missing_group_state() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let operators = mocks::operators(&[10]);
            let reader = mocks::Reader::new(operators.clone());
            let request = mocks::request(&[(0, 100), (9, 0)]);

            // Group 9 has neither members nor state, so it can never pass
            let snapshot = snapshot(
                &reader,
                vec![
                    Quorum { group: 0, percentage: 100 },
                    Quorum { group: 9, percentage: 0 },
                ],
            );
            let mut tally = Tally::default();
            tally.record(operators[0].respond(&request, b"x"));
            let err = aggregate(&reader, &snapshot, &tally).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::StakeThresholdsNotMet);
        });
    }

    #[test_traced]
    fn test_group_apks_follow_request_order() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let operators = vec![
                mocks::Operator::new(0, &[(0, 10), (1, 10)]),
                mocks::Operator::new(1, &[(1, 10)]),
            ];
            let reader = mocks::Reader::new(operators.clone());
            let request = mocks::request(&[(1, 50), (0, 50)]);
            let snapshot = snapshot(
                &reader,
                vec![
                    Quorum { group: 1, percentage: 50 },
                    Quorum { group: 0, percentage: 50 },
                ],
            );
            let mut tally = Tally::default();
            tally.record(operators[0].respond(&request, b"x"));
            let result = aggregate(&reader, &snapshot, &tally).await.unwrap();
            let groups = reader.groups(&[0, 1]);
            assert_eq!(
                result.group_apks_g1,
                vec![groups[&1].agg_pubkey_g1, groups[&0].agg_pubkey_g1]
            );
            assert_eq!(result.non_signers_pubkeys_g1, vec![operators[1].pubkeys().g1]);
        });
    }
}
