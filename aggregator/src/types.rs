//! Requests, operator responses, chain-state snapshots, and the aggregation result.

use crate::Error;
use bytes::BufMut;
use commonware_codec::{Encode, EncodeSize, Write};
use commonware_cryptography::{
    bls12381::primitives::group::{Element, G1, G2},
    hash, sha256,
};
use commonware_utils::sequence::FixedBytes;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use thiserror::Error as ThisError;

/// Identifier of an operator.
///
/// Operators have two: the address-derived id they submit responses under, and the
/// BLS-derived id (see [OperatorPubkeys::operator_id]) used for non-signers.
pub type OperatorId = sha256::Digest;

/// Fingerprint of a reported result.
pub type ResultDigest = sha256::Digest;

/// Content hash of a [DvsRequest] (the task id).
pub type RequestHash = sha256::Digest;

/// Contract or operator address.
pub type Address = FixedBytes<20>;

pub type ChainId = i64;
pub type GroupNumber = u8;
pub type BlockNumber = u32;

/// Derives the id an operator submits responses under from its address.
pub fn operator_id(address: &Address) -> OperatorId {
    hash(address)
}

/// A distributed verification request, as issued on a chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvsRequest {
    pub data: Vec<u8>,
    pub height: i64,
    pub chain_id: ChainId,
    pub group_numbers: Vec<u32>,
    pub group_threshold_percentages: Vec<u32>,
}

impl Write for DvsRequest {
    fn write(&self, buf: &mut impl BufMut) {
        self.data.write(buf);
        self.height.write(buf);
        self.chain_id.write(buf);
        self.group_numbers.write(buf);
        self.group_threshold_percentages.write(buf);
    }
}

impl EncodeSize for DvsRequest {
    fn encode_size(&self) -> usize {
        self.data.encode_size()
            + self.height.encode_size()
            + self.chain_id.encode_size()
            + self.group_numbers.encode_size()
            + self.group_threshold_percentages.encode_size()
    }
}

impl DvsRequest {
    /// Returns the deterministic content hash of the request.
    ///
    /// Variable-length fields are length-prefixed in the encoding, so distinct requests
    /// never share one.
    pub fn hash(&self) -> RequestHash {
        hash(&self.encode())
    }

    /// Validates the request and returns the block height and the required quorums
    /// (in request order).
    pub fn requirements(&self) -> Result<(BlockNumber, Vec<Quorum>), Error> {
        let height =
            BlockNumber::try_from(self.height).map_err(|_| Error::InvalidRequest("height"))?;
        if self.group_numbers.len() != self.group_threshold_percentages.len() {
            return Err(Error::InvalidRequest("group and threshold counts differ"));
        }
        let mut seen = BTreeSet::new();
        let mut quorums = Vec::with_capacity(self.group_numbers.len());
        for (group, percentage) in self
            .group_numbers
            .iter()
            .zip(&self.group_threshold_percentages)
        {
            let group =
                GroupNumber::try_from(*group).map_err(|_| Error::InvalidRequest("group number"))?;
            if !seen.insert(group) {
                return Err(Error::InvalidRequest("duplicate group"));
            }
            let percentage = u8::try_from(*percentage)
                .ok()
                .filter(|p| *p <= 100)
                .ok_or(Error::InvalidRequest("threshold percentage"))?;
            quorums.push(Quorum { group, percentage });
        }
        Ok((height, quorums))
    }
}

/// Minimum share of a group's stake (in percent) that must back the selected digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorum {
    pub group: GroupNumber,
    pub percentage: u8,
}

/// An operator's signed result for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseWithSignature {
    pub data: Vec<u8>,
    pub digest: ResultDigest,
    pub signature: G1,
    pub operator_id: OperatorId,
    pub request: DvsRequest,
}

/// Stable codes carried by an [AggregationError].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    StakeThresholdsNotMet = 1001,
    NoSignatures = 1002,
    OperatorInfoNotFound = 1003,
    InvalidIndices = 1004,
}

impl ErrorCode {
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Structured failure of an aggregation, delivered to every waiter of the task.
#[derive(ThisError, Clone, Debug, PartialEq, Eq)]
#[error("[code: {code}] {message}")]
pub struct AggregationError {
    pub code: ErrorCode,
    pub message: String,
    /// Task the failure belongs to.
    pub data: RequestHash,
}

impl AggregationError {
    pub fn stake_thresholds_not_met(task: RequestHash, digest: &ResultDigest) -> Self {
        Self {
            code: ErrorCode::StakeThresholdsNotMet,
            message: format!("stake thresholds not met for digest: {digest}"),
            data: task,
        }
    }

    pub fn no_signatures(task: RequestHash) -> Self {
        Self {
            code: ErrorCode::NoSignatures,
            message: "no signatures to aggregate".to_string(),
            data: task,
        }
    }

    pub fn operator_info_not_found(task: RequestHash, id: &OperatorId) -> Self {
        Self {
            code: ErrorCode::OperatorInfoNotFound,
            message: format!("failed to get operator info by id: {id}"),
            data: task,
        }
    }

    pub fn invalid_indices(task: RequestHash, err: impl fmt::Display) -> Self {
        Self {
            code: ErrorCode::InvalidIndices,
            message: format!("failed to get check signatures indices: {err}"),
            data: task,
        }
    }
}

/// Index material the on-chain verifier needs alongside the aggregate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureIndices {
    pub non_signer_group_bitmap_indices: Vec<u32>,
    pub group_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

/// The finalized outcome of a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedResponse {
    pub data: Vec<u8>,
    pub error: Option<AggregationError>,
    pub hash: RequestHash,
    pub non_signers_pubkeys_g1: Vec<G1>,
    pub group_apks_g1: Vec<G1>,
    pub signers_apk_g2: G2,
    pub signers_agg_sig_g1: G1,
    pub non_signer_group_bitmap_indices: Vec<u32>,
    pub group_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

impl ValidatedResponse {
    /// Builds the response delivered when aggregation fails: no data, zeroed
    /// cryptographic material, and empty index arrays.
    pub fn error(err: AggregationError) -> Self {
        Self {
            data: Vec::new(),
            hash: err.data,
            error: Some(err),
            non_signers_pubkeys_g1: Vec::new(),
            group_apks_g1: Vec::new(),
            signers_apk_g2: G2::zero(),
            signers_agg_sig_g1: G1::zero(),
            non_signer_group_bitmap_indices: Vec::new(),
            group_apk_indices: Vec::new(),
            total_stake_indices: Vec::new(),
            non_signer_stake_indices: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Public keys an operator registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorPubkeys {
    pub g1: G1,
    pub g2: G2,
}

impl OperatorPubkeys {
    /// Returns the BLS-derived operator id.
    pub fn operator_id(&self) -> OperatorId {
        hash(&self.g1.encode())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorInfo {
    pub socket: String,
    pub pubkeys: OperatorPubkeys,
}

/// An operator's registration and stake at some block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorDvsState {
    pub operator_address: Address,
    pub operator_id: OperatorId,
    pub stake_per_group: BTreeMap<GroupNumber, BigUint>,
}

/// A group's total stake and aggregate key at some block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDvsState {
    pub group_number: GroupNumber,
    pub total_stake: BigUint,
    pub agg_pubkey_g1: G1,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorStakeInfo {
    pub operator: Address,
    pub operator_id: OperatorId,
    pub stake: BigUint,
}

/// Which operators belong to which groups (with their stakes) at some block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatorStateInfo {
    pub operators: BTreeMap<OperatorId, Address>,
    pub group_stakes: BTreeMap<GroupNumber, BigUint>,
    pub group_operators: BTreeMap<GroupNumber, Vec<OperatorStakeInfo>>,
}

impl OperatorStateInfo {
    /// Derives the group view from per-operator state.
    pub fn from_operators(operators: &BTreeMap<OperatorId, OperatorDvsState>) -> Self {
        let mut info = Self::default();
        for (id, state) in operators {
            info.operators.insert(*id, state.operator_address.clone());
            for (group, stake) in &state.stake_per_group {
                info.group_operators
                    .entry(*group)
                    .or_default()
                    .push(OperatorStakeInfo {
                        operator: state.operator_address.clone(),
                        operator_id: *id,
                        stake: stake.clone(),
                    });
                *info.group_stakes.entry(*group).or_default() += stake;
            }
        }
        info
    }
}
