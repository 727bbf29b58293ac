// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Provider error type
// Internal code works with Result<T, ProviderError>; the extern "C" layer
// turns these into 0/1 and forwards them to the host's error stack.

use std::os::raw::c_int;
use thiserror::Error;

/// Library code used when reporting through the host's put-error capability
pub const ERR_LIB_PROV: c_int = 57;

// Reason codes reported alongside ERR_LIB_PROV
pub const PROV_R_NULL_ARGUMENT: c_int = 100;
pub const PROV_R_MISSING_CAPABILITY: c_int = 101;
pub const PROV_R_ALLOCATION_FAILED: c_int = 102;
pub const PROV_R_INVALID_CONTEXT: c_int = 103;
pub const PROV_R_ALGORITHM_UNAVAILABLE: c_int = 104;
pub const PROV_R_SELF_TEST_KAT_FAILURE: c_int = 105;
pub const PROV_R_DIGEST_FAILED: c_int = 106;
pub const PROV_R_INVALID_ENCODING: c_int = 107;
pub const PROV_R_HOST_CALL_FAILED: c_int = 108;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("null argument: {0}")]
    NullArgument(&'static str),

    #[error("capability not supplied by host: {0}")]
    MissingCapability(&'static str),

    #[error("allocation of {size} bytes failed")]
    AllocationFailed { size: usize },

    #[error("host allocator returned memory not aligned to {align} bytes")]
    Misaligned { align: usize },

    #[error("provider context is null or was not created by this module")]
    InvalidContext,

    #[error("algorithm {name} unavailable for operation {operation}")]
    AlgorithmUnavailable { name: String, operation: c_int },

    #[error("self-test {algorithm} produced an unexpected digest")]
    SelfTestMismatch { algorithm: &'static str },

    #[error("digest {0} failed")]
    DigestFailed(&'static str),

    #[error("invalid hex string at offset {0}")]
    InvalidHex(usize),

    #[error("host call {0} reported failure")]
    HostCallFailed(&'static str),
}

impl ProviderError {
    /// Reason code reported with ERR_LIB_PROV
    pub fn reason(&self) -> c_int {
        match self {
            ProviderError::NullArgument(_) => PROV_R_NULL_ARGUMENT,
            ProviderError::MissingCapability(_) => PROV_R_MISSING_CAPABILITY,
            ProviderError::AllocationFailed { .. } | ProviderError::Misaligned { .. } => {
                PROV_R_ALLOCATION_FAILED
            }
            ProviderError::InvalidContext => PROV_R_INVALID_CONTEXT,
            ProviderError::AlgorithmUnavailable { .. } => PROV_R_ALGORITHM_UNAVAILABLE,
            ProviderError::SelfTestMismatch { .. } => PROV_R_SELF_TEST_KAT_FAILURE,
            ProviderError::DigestFailed(_) => PROV_R_DIGEST_FAILED,
            ProviderError::InvalidHex(_) => PROV_R_INVALID_ENCODING,
            ProviderError::HostCallFailed(_) => PROV_R_HOST_CALL_FAILED,
        }
    }
}
