//! Chain-state lookups the aggregator depends on.

use crate::types::{
    BlockNumber, ChainId, GroupDvsState, GroupNumber, OperatorDvsState, OperatorId, OperatorInfo,
    OperatorStateInfo, SignatureIndices,
};
use std::{collections::BTreeMap, future::Future};
use thiserror::Error;

/// Errors that can occur when reading chain state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown chain: {0}")]
    UnknownChain(ChainId),
    #[error("operator not found: {0}")]
    OperatorNotFound(OperatorId),
    #[error("invalid non-signer: {0}")]
    InvalidNonSigner(OperatorId),
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Supplies operator and group stake, operator keys, and verifier index material at a
/// given block.
pub trait Reader: Clone + Send + Sync + 'static {
    /// Returns the state of every operator registered in `groups` at `height`.
    fn operators_state_at_block(
        &self,
        chain: ChainId,
        groups: &[GroupNumber],
        height: BlockNumber,
    ) -> impl Future<Output = Result<BTreeMap<OperatorId, OperatorDvsState>, Error>> + Send;

    /// Returns the state of each of `groups` at `height`.
    fn groups_state_at_block(
        &self,
        chain: ChainId,
        groups: &[GroupNumber],
        height: BlockNumber,
    ) -> impl Future<Output = Result<BTreeMap<GroupNumber, GroupDvsState>, Error>> + Send;

    /// Returns the group membership view of `groups` at `height`.
    fn operator_state(
        &self,
        chain: ChainId,
        groups: &[GroupNumber],
        height: BlockNumber,
    ) -> impl Future<Output = Result<OperatorStateInfo, Error>> + Send {
        async move {
            let operators = self.operators_state_at_block(chain, groups, height).await?;
            Ok(OperatorStateInfo::from_operators(&operators))
        }
    }

    /// Returns the registered keys of the operator with the address-derived `id`.
    fn operator_info_by_id(
        &self,
        id: OperatorId,
    ) -> impl Future<Output = Result<OperatorInfo, Error>> + Send;

    /// Returns the indices the verifier needs to check an aggregate with the given
    /// non-signers (BLS-derived ids, ascending).
    fn check_signatures_indices(
        &self,
        chain: ChainId,
        height: BlockNumber,
        groups: &[GroupNumber],
        non_signers: &[OperatorId],
    ) -> impl Future<Output = Result<SignatureIndices, Error>> + Send;
}
