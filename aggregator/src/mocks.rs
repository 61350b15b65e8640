//! In-memory chain state and deterministic operators for tests.

use crate::{
    config::ChainConfig,
    reader::{self, Error},
    types::{
        operator_id, Address, BlockNumber, ChainId, DvsRequest, GroupDvsState, GroupNumber,
        OperatorDvsState, OperatorId, OperatorInfo, OperatorPubkeys, ResponseWithSignature,
        SignatureIndices,
    },
};
use commonware_cryptography::{
    bls12381::primitives::{
        group::{Private, G1},
        ops,
        variant::{MinPk, MinSig},
    },
    hash,
};
use futures::future::{pending, ready};
use num_bigint::BigUint;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::{Arc, Mutex},
};

/// Chain the mocks serve.
pub const CHAIN: ChainId = 1337;

/// Height requests built by [request] are issued at.
pub const HEIGHT: i64 = 100;

pub fn chain_config() -> ChainConfig {
    ChainConfig {
        rpc_url: "http://127.0.0.1:8545".to_string(),
        operator_info_provider_address: Address::new([1; 20]),
        operator_key_manager_address: Address::new([2; 20]),
        central_scheduler_address: Address::new([3; 20]),
    }
}

/// A registered operator with a deterministic key.
#[derive(Clone)]
pub struct Operator {
    pub key: Private,
    pub address: Address,
    pub id: OperatorId,
    pub stakes: BTreeMap<GroupNumber, BigUint>,
}

impl Operator {
    pub fn new(seed: u64, stakes: &[(GroupNumber, u64)]) -> Self {
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash(&seed.to_be_bytes())[..20]);
        let address = Address::new(address);
        let (key, _) = ops::keypair::<_, MinSig>(&mut StdRng::seed_from_u64(seed));
        Self {
            key,
            id: operator_id(&address),
            address,
            stakes: stakes
                .iter()
                .map(|(group, stake)| (*group, BigUint::from(*stake)))
                .collect(),
        }
    }

    /// Returns the key in G1 (registered with groups) and the key in G2 (that verifies
    /// signatures).
    pub fn pubkeys(&self) -> OperatorPubkeys {
        OperatorPubkeys {
            g1: ops::compute_public::<MinPk>(&self.key),
            g2: ops::compute_public::<MinSig>(&self.key),
        }
    }

    /// Returns the BLS-derived id.
    pub fn bls_id(&self) -> OperatorId {
        self.pubkeys().operator_id()
    }

    /// Signs `data` as this operator's result for `request`.
    pub fn respond(&self, request: &DvsRequest, data: &[u8]) -> ResponseWithSignature {
        let digest = hash(data);
        ResponseWithSignature {
            data: data.to_vec(),
            digest,
            signature: ops::sign_message::<MinSig>(&self.key, None, &digest),
            operator_id: self.id,
            request: request.clone(),
        }
    }
}

/// Operators (seeded `0..`) registered in group 0 with the given stakes.
pub fn operators(stakes: &[u64]) -> Vec<Operator> {
    stakes
        .iter()
        .enumerate()
        .map(|(seed, stake)| Operator::new(seed as u64, &[(0, *stake)]))
        .collect()
}

/// A request on [CHAIN] at [HEIGHT] requiring the given `(group, percentage)` quorums.
pub fn request(quorums: &[(u32, u32)]) -> DvsRequest {
    DvsRequest {
        data: b"request".to_vec(),
        height: HEIGHT,
        chain_id: CHAIN,
        group_numbers: quorums.iter().map(|(group, _)| *group).collect(),
        group_threshold_percentages: quorums.iter().map(|(_, p)| *p).collect(),
    }
}

#[derive(Default)]
struct State {
    operators: Vec<Operator>,
    forgotten: BTreeSet<OperatorId>,
    fail_state: bool,
    fail_indices: bool,
    stall: bool,
    operators_state_calls: usize,
    non_signers: Option<Vec<OperatorId>>,
}

/// Chain state backed by a fixed set of [Operator]s.
#[derive(Clone)]
pub struct Reader {
    state: Arc<Mutex<State>>,
}

impl Reader {
    pub fn new(operators: Vec<Operator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                operators,
                ..Default::default()
            })),
        }
    }

    /// Makes the operator-info provider forget an operator (it stays registered).
    pub fn forget(&self, id: OperatorId) {
        self.state.lock().unwrap().forgotten.insert(id);
    }

    /// Makes stake lookups fail.
    pub fn fail_state(&self, fail: bool) {
        self.state.lock().unwrap().fail_state = fail;
    }

    /// Makes operator state lookups hang until dropped.
    pub fn stall(&self, stall: bool) {
        self.state.lock().unwrap().stall = stall;
    }

    /// Makes index lookups fail.
    pub fn fail_indices(&self, fail: bool) {
        self.state.lock().unwrap().fail_indices = fail;
    }

    /// Number of times operator state was requested.
    pub fn operators_state_calls(&self) -> usize {
        self.state.lock().unwrap().operators_state_calls
    }

    /// Non-signers passed to the last index lookup.
    pub fn non_signers(&self) -> Option<Vec<OperatorId>> {
        self.state.lock().unwrap().non_signers.clone()
    }

    /// Operators with stake in any of `groups` (stake limited to `groups`).
    pub fn operators(&self, groups: &[GroupNumber]) -> BTreeMap<OperatorId, OperatorDvsState> {
        let state = self.state.lock().unwrap();
        state
            .operators
            .iter()
            .filter_map(|operator| {
                let stake_per_group: BTreeMap<_, _> = operator
                    .stakes
                    .iter()
                    .filter(|(group, _)| groups.contains(*group))
                    .map(|(group, stake)| (*group, stake.clone()))
                    .collect();
                if stake_per_group.is_empty() {
                    return None;
                }
                Some((
                    operator.id,
                    OperatorDvsState {
                        operator_address: operator.address.clone(),
                        operator_id: operator.id,
                        stake_per_group,
                    },
                ))
            })
            .collect()
    }

    /// State of each of `groups` that has at least one member.
    pub fn groups(&self, groups: &[GroupNumber]) -> BTreeMap<GroupNumber, GroupDvsState> {
        let state = self.state.lock().unwrap();
        let mut result = BTreeMap::new();
        for group in groups {
            let members: Vec<_> = state
                .operators
                .iter()
                .filter_map(|operator| operator.stakes.get(group).map(|s| (operator, s)))
                .collect();
            if members.is_empty() {
                continue;
            }
            let keys: Vec<G1> = members.iter().map(|(o, _)| o.pubkeys().g1).collect();
            result.insert(
                *group,
                GroupDvsState {
                    group_number: *group,
                    total_stake: members.iter().map(|(_, stake)| *stake).sum(),
                    agg_pubkey_g1: ops::aggregate_public_keys::<MinPk, _>(&keys),
                },
            );
        }
        result
    }

    fn check_chain(&self, chain: ChainId) -> Result<(), Error> {
        if chain != CHAIN {
            return Err(Error::UnknownChain(chain));
        }
        if self.state.lock().unwrap().fail_state {
            return Err(Error::Backend("state unavailable".to_string()));
        }
        Ok(())
    }
}

impl reader::Reader for Reader {
    fn operators_state_at_block(
        &self,
        chain: ChainId,
        groups: &[GroupNumber],
        _: BlockNumber,
    ) -> impl Future<Output = Result<BTreeMap<OperatorId, OperatorDvsState>, Error>> + Send {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state.operators_state_calls += 1;
            state.stall
        };
        let result = self.check_chain(chain).map(|_| self.operators(groups));
        async move {
            if stall {
                pending::<()>().await;
            }
            result
        }
    }

    fn groups_state_at_block(
        &self,
        chain: ChainId,
        groups: &[GroupNumber],
        _: BlockNumber,
    ) -> impl Future<Output = Result<BTreeMap<GroupNumber, GroupDvsState>, Error>> + Send {
        ready(self.check_chain(chain).map(|_| self.groups(groups)))
    }

    fn operator_info_by_id(
        &self,
        id: OperatorId,
    ) -> impl Future<Output = Result<OperatorInfo, Error>> + Send {
        let state = self.state.lock().unwrap();
        let info = state
            .operators
            .iter()
            .find(|operator| operator.id == id && !state.forgotten.contains(&id))
            .map(|operator| OperatorInfo {
                socket: format!("127.0.0.1:{}", 26656 + operator.address[0] as u16),
                pubkeys: operator.pubkeys(),
            })
            .ok_or(Error::OperatorNotFound(id));
        ready(info)
    }

    fn check_signatures_indices(
        &self,
        chain: ChainId,
        _: BlockNumber,
        groups: &[GroupNumber],
        non_signers: &[OperatorId],
    ) -> impl Future<Output = Result<SignatureIndices, Error>> + Send {
        let mut state = self.state.lock().unwrap();
        state.non_signers = Some(non_signers.to_vec());
        if chain != CHAIN {
            return ready(Err(Error::UnknownChain(chain)));
        }
        if state.fail_indices {
            return ready(Err(Error::Backend("indices unavailable".to_string())));
        }

        // Position of each non-signer in the registry
        let mut positions = Vec::with_capacity(non_signers.len());
        for id in non_signers {
            let Some(position) = state.operators.iter().position(|o| o.bls_id() == *id) else {
                return ready(Err(Error::InvalidNonSigner(*id)));
            };
            positions.push(position);
        }
        let non_signer_stake_indices = groups
            .iter()
            .map(|group| {
                positions
                    .iter()
                    .filter(|position| state.operators[**position].stakes.contains_key(group))
                    .map(|position| *position as u32)
                    .collect()
            })
            .collect();
        ready(Ok(SignatureIndices {
            non_signer_group_bitmap_indices: positions.iter().map(|p| *p as u32).collect(),
            group_apk_indices: groups.iter().map(|g| u32::from(*g)).collect(),
            total_stake_indices: groups.iter().map(|g| u32::from(*g)).collect(),
            non_signer_stake_indices,
        }))
    }
}
