// FIPS-style OpenSSL Provider - Rust Implementation
// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! FIPS-style provider bootstrap
//!
//! The module is loaded by a host library at runtime. Host and provider
//! exchange capabilities through null-terminated `(id, fn)` tables; the
//! provider runs a known-answer self-test through its own dispatch path
//! before it hands its table back.

mod config;
mod core_bindings;
mod digest;
mod dispatch;
mod error;
mod fetch;
mod logging;
mod mem;
mod ossl_param;
mod ostr;
mod provider;
mod selftest;

#[cfg(test)]
mod tests_bootstrap;

pub use config::*;
pub use core_bindings::*;
pub use digest::DigestDispatch;
pub use dispatch::*;
pub use error::*;
pub use logging::*;
pub use mem::Origin;
pub use ossl_param::*;
pub use provider::*;
pub use selftest::KnownAnswer;

use selftest::SHA256_KAT;
use std::ffi::CStr;
use std::os::raw::{c_int, c_void};

const fn static_cstr(bytes: &'static [u8]) -> &'static CStr {
    match CStr::from_bytes_with_nul(bytes) {
        Ok(s) => s,
        Err(_) => c"",
    }
}

// Values reported through get_params
pub const PROVIDER_NAME: &CStr = c"FIPS Provider (Rust)";
pub const PROVIDER_VERSION: &CStr = static_cstr(concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes());
pub const PROVIDER_BUILDINFO: &CStr = static_cstr(
    concat!(
        env!("CARGO_PKG_NAME"),
        " ",
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("FIPS_PROV_BUILD_TARGET"),
        ", ",
        env!("FIPS_PROV_BUILD_PROFILE"),
        ")\0"
    )
    .as_bytes(),
);

/// This is the entry point called by the host when loading the provider
#[no_mangle]
pub unsafe extern "C" fn OSSL_provider_init(
    handle: *const c_void,
    in_: *const OsslDispatch,
    out: *mut *const OsslDispatch,
    provctx: *mut *mut c_void,
) -> c_int {
    provider_init_with(handle, in_, out, provctx, &SHA256_KAT)
}

/// External load path with the self-test vector supplied by the caller
pub(crate) unsafe fn provider_init_with(
    handle: *const c_void,
    in_: *const OsslDispatch,
    out: *mut *const OsslDispatch,
    provctx: *mut *mut c_void,
    kat: &KnownAnswer,
) -> c_int {
    // Initialize logging first
    init_logging();

    log::trace!(
        "OSSL_provider_init handle={:p} in={:p} out={:p} provctx={:p}",
        handle, in_, out, provctx
    );

    let core = CoreBindings::from_dispatch(in_);

    let missing = if out.is_null() { Some("out") } else if provctx.is_null() { Some("provctx") } else { None };
    if let Some(name) = missing {
        core.report(&ProviderError::NullArgument(name), site!());
        log::debug!("OSSL_provider_init -> 0 (bad arguments)");
        return 0;
    }

    if let Err(e) = core.check() {
        core.report(&e, site!());
        log::debug!("OSSL_provider_init -> 0 (capabilities)");
        return 0;
    }

    let ctx = match ProviderContext::create(handle, core, site!()) {
        Ok(ctx) => ctx,
        Err(e) => {
            core.report(&e, site!());
            log::debug!("OSSL_provider_init -> 0 (context)");
            return 0;
        }
    };

    if let Err(e) = selftest::run(ctx.as_ref(), kat) {
        ctx.as_ref().report(&e, site!());
        ProviderContext::destroy(ctx, site!());
        log::debug!("OSSL_provider_init -> 0 (self-test)");
        return 0;
    }

    *provctx = ctx.as_ptr() as *mut c_void;
    *out = FIPS_DISPATCH_TABLE.as_ptr();

    log::debug!("OSSL_provider_init -> 1 (ctx={:p})", ctx.as_ptr());
    log::info!("{} {} initialized", PROVIDER_NAME.to_string_lossy(), PROVIDER_VERSION.to_string_lossy());
    1
}

/// Entry point for re-entering an already loaded instance.
/// `*provctx` arrives filled with that instance's context and is left as is.
#[no_mangle]
pub unsafe extern "C" fn fips_intern_provider_init(
    handle: *const c_void,
    _in_: *const OsslDispatch,
    out: *mut *const OsslDispatch,
    provctx: *mut *mut c_void,
) -> c_int {
    log::trace!("fips_intern_provider_init handle={:p} provctx={:p}", handle, provctx);

    if out.is_null() || provctx.is_null() {
        log::error!("fips_intern_provider_init received null output pointers");
        return 0;
    }

    if let Err(e) = ContextCarrier::library_context(*provctx) {
        log::error!("fips_intern_provider_init: {}", e);
        log::debug!("fips_intern_provider_init -> 0");
        return 0;
    }

    *out = INTERN_DISPATCH_TABLE.as_ptr();
    log::debug!("fips_intern_provider_init -> 1 (ctx={:p})", *provctx);
    1
}

/// Provider teardown function
#[no_mangle]
pub unsafe extern "C" fn fips_teardown(provctx: *mut c_void) {
    log::trace!("fips_teardown provctx={:p}", provctx);

    if provctx.is_null() {
        return;
    }

    match ContextCarrier::library_context(provctx) {
        Ok(ctx) => ProviderContext::destroy(ctx, site!()),
        Err(e) => log::error!("fips_teardown: {}", e),
    }

    log::debug!("fips_teardown complete");
}

/// Get parameter types the provider can report
#[no_mangle]
pub unsafe extern "C" fn fips_get_param_types(_provctx: *mut c_void) -> *const OsslItem {
    log::trace!("fips_get_param_types");
    let result = FIPS_PARAM_TYPES.as_ptr();
    log::debug!("fips_get_param_types -> {:p}", result);
    result
}

/// Get provider parameters (name, version, buildinfo)
#[no_mangle]
pub unsafe extern "C" fn fips_get_params(_provctx: *mut c_void, params: *mut OsslParam) -> c_int {
    log::trace!("fips_get_params params={:p}", params);

    if params.is_null() {
        log::debug!("fips_get_params -> 0 (null params)");
        return 0;
    }

    let values: [(&[u8], &'static CStr); 3] = [
        (OSSL_PROV_PARAM_NAME, PROVIDER_NAME),
        (OSSL_PROV_PARAM_VERSION, PROVIDER_VERSION),
        (OSSL_PROV_PARAM_BUILDINFO, PROVIDER_BUILDINFO),
    ];
    for (key, value) in values {
        let p = OsslParam::locate(params, key.as_ptr() as *const std::os::raw::c_char);
        if !p.is_null() && !(*p).set_string(value) {
            log::debug!(
                "fips_get_params -> 0 (type mismatch on {})",
                String::from_utf8_lossy(&key[..key.len() - 1])
            );
            return 0;
        }
    }

    log::debug!("fips_get_params -> 1");
    1
}

/// Query provider operations
#[no_mangle]
pub unsafe extern "C" fn fips_query_operation(
    _provctx: *mut c_void,
    operation_id: c_int,
    no_cache: *mut c_int,
) -> *const OsslAlgorithm {
    log::trace!("fips_query_operation operation_id={}", operation_id);

    if !no_cache.is_null() {
        *no_cache = 0;
    }

    let result = query_operation_impl(operation_id);

    log::debug!("fips_query_operation -> {:p}", result);
    result
}
