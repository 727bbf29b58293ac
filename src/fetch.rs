// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Recursive fetch
// Lets code inside the provider use an algorithm the provider itself
// registers, going through the same entry point and query path a host
// uses instead of calling the implementation directly.

use crate::digest::DigestDispatch;
use crate::dispatch::{find_algorithm, OsslDispatch, ProviderDispatch, OSSL_OP_DIGEST};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use std::os::raw::{c_int, c_void};
use std::ptr;

/// A digest resolved through the recursive entry point
pub struct FetchedDigest {
    pub provctx: *mut c_void,
    pub dispatch: DigestDispatch,
}

impl FetchedDigest {
    pub unsafe fn compute(&self, msg: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.dispatch.compute(self.provctx, msg)
    }
}

/// Resolve `name` from the digest category of this provider instance
pub unsafe fn fetch_digest(ctx: &ProviderContext, name: &str) -> Result<FetchedDigest, ProviderError> {
    log::trace!("fetch_digest name={}", name);

    // pre-populated the way a host does before re-entering the module
    let mut provctx = ctx.as_raw();
    let mut out: *const OsslDispatch = ptr::null();
    if crate::fips_intern_provider_init(ctx.handle, ptr::null(), &mut out, &mut provctx) != 1 {
        return Err(ProviderError::InvalidContext);
    }

    let unavailable = || ProviderError::AlgorithmUnavailable {
        name: name.to_string(),
        operation: OSSL_OP_DIGEST,
    };

    let query = ProviderDispatch::from_dispatch(out).query_operation.ok_or_else(unavailable)?;
    let mut no_cache: c_int = 0;
    let list = query(provctx, OSSL_OP_DIGEST, &mut no_cache);
    let alg = find_algorithm(list, name).ok_or_else(unavailable)?;

    let dispatch = DigestDispatch::from_dispatch(alg.implementation);
    log::debug!("fetch_digest({}) -> {:?}", name, alg.names());
    Ok(FetchedDigest { provctx, dispatch })
}
