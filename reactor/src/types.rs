//! Operator listings, aggregated responses, and indexed request results.

use crate::application::{ProcessedRequest, ProcessedResponse};
use dvs_aggregator::types::{
    Address, AggregationError, DvsRequest, OperatorId, OperatorPubkeys, RequestHash,
    ValidatedResponse,
};
use commonware_codec::Encode;
use num_bigint::BigUint;

/// An operator registered in one of a request's groups, as shown to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operator {
    pub id: OperatorId,
    pub address: Address,
    pub socket: String,
    /// Stake summed over the request's groups.
    pub stake: BigUint,
    pub pubkeys: OperatorPubkeys,
}

/// A successful aggregate with its curve points serialized, as handed to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DvsResponse {
    pub data: Vec<u8>,
    pub hash: RequestHash,
    pub non_signers_pubkeys_g1: Vec<Vec<u8>>,
    pub group_apks_g1: Vec<Vec<u8>>,
    pub signers_apk_g2: Vec<u8>,
    pub signers_agg_sig_g1: Vec<u8>,
    pub non_signer_group_bitmap_indices: Vec<u32>,
    pub group_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

impl TryFrom<&ValidatedResponse> for DvsResponse {
    type Error = AggregationError;

    fn try_from(response: &ValidatedResponse) -> Result<Self, Self::Error> {
        if let Some(err) = &response.error {
            return Err(err.clone());
        }
        Ok(Self {
            data: response.data.clone(),
            hash: response.hash,
            non_signers_pubkeys_g1: response
                .non_signers_pubkeys_g1
                .iter()
                .map(|key| key.encode().to_vec())
                .collect(),
            group_apks_g1: response
                .group_apks_g1
                .iter()
                .map(|key| key.encode().to_vec())
                .collect(),
            signers_apk_g2: response.signers_apk_g2.encode().to_vec(),
            signers_agg_sig_g1: response.signers_agg_sig_g1.encode().to_vec(),
            non_signer_group_bitmap_indices: response.non_signer_group_bitmap_indices.clone(),
            group_apk_indices: response.group_apk_indices.clone(),
            total_stake_indices: response.total_stake_indices.clone(),
            non_signer_stake_indices: response.non_signer_stake_indices.clone(),
        })
    }
}

/// Everything a node has recorded about a request.
///
/// Fields are filled in as the request progresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestResult {
    pub request: DvsRequest,
    pub processed_request: Option<ProcessedRequest>,
    pub response: Option<DvsResponse>,
    pub processed_response: Option<ProcessedResponse>,
    pub error: Option<AggregationError>,
    /// Why the node's own signature never reached an aggregate.
    pub submission_error: Option<String>,
}

impl RequestResult {
    pub fn new(request: DvsRequest) -> Self {
        Self {
            request,
            processed_request: None,
            response: None,
            processed_response: None,
            error: None,
            submission_error: None,
        }
    }

    pub fn hash(&self) -> RequestHash {
        self.request.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::DecodeExt;
    use commonware_cryptography::bls12381::primitives::group::{Element, G1, G2};
    use dvs_aggregator::types::ErrorCode;

    #[test]
    fn test_error_response_is_rejected() {
        let hash = RequestHash::from([3; 32]);
        let response = ValidatedResponse::error(AggregationError::no_signatures(hash));
        let err = DvsResponse::try_from(&response).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoSignatures);
        assert_eq!(err.data, hash);
    }

    #[test]
    fn test_points_are_serialized() {
        let mut response = ValidatedResponse::error(AggregationError::no_signatures(
            RequestHash::from([3; 32]),
        ));
        response.error = None;
        response.data = b"result".to_vec();
        response.signers_apk_g2 = G2::one();
        response.signers_agg_sig_g1 = G1::one();
        response.group_apks_g1 = vec![G1::one(), G1::one()];

        let converted = DvsResponse::try_from(&response).unwrap();
        assert_eq!(converted.data, b"result".to_vec());
        assert_eq!(converted.signers_apk_g2, G2::one().encode().to_vec());
        assert_eq!(
            G1::decode(&converted.signers_agg_sig_g1[..]).unwrap(),
            G1::one()
        );
        assert_eq!(converted.group_apks_g1.len(), 2);
        assert!(converted.non_signers_pubkeys_g1.is_empty());
    }

    #[test]
    fn test_result_hash() {
        let request = DvsRequest {
            data: b"ping".to_vec(),
            height: 1,
            chain_id: 1,
            group_numbers: vec![0],
            group_threshold_percentages: vec![50],
        };
        let result = RequestResult::new(request.clone());
        assert_eq!(result.hash(), request.hash());
        assert!(result.processed_request.is_none());
    }
}
