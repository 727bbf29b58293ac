// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// SHA-256 digest implementation
// The functions behind the SHA256 descriptor returned for the digest
// operation category, plus a typed caller used by the self-test.

use crate::core_bindings::CoreBindings;
use crate::dispatch::*;
use crate::error::ProviderError;
use crate::mem::{self, Origin};
use crate::ossl_param::{OsslParam, OSSL_DIGEST_PARAM_BLOCK_SIZE, OSSL_DIGEST_PARAM_SIZE, OSSL_PARAM_UNSIGNED_INTEGER};
use crate::provider::ProviderContext;
use sha2::{Digest, Sha256};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};

pub const SHA256_DIGEST_LENGTH: usize = 32;
pub const SHA256_BLOCK_SIZE: usize = 64;
/// Largest digest any table entry may produce
pub const MAX_DIGEST_SIZE: usize = 64;

/// Digest context handed to the host as `dctx`
pub struct Sha256Ctx {
    core: CoreBindings,
    hasher: Sha256,
    origin: Origin,
}

impl Sha256Ctx {
    unsafe fn place(core: CoreBindings, hasher: Sha256) -> Result<NonNull<Sha256Ctx>, ProviderError> {
        let ctx = Sha256Ctx { core, hasher, origin: Origin::Local };
        let (p, origin) = mem::place(&core, ctx, crate::site!())?;
        (*p.as_ptr()).origin = origin;
        Ok(p)
    }

    unsafe fn from_raw<'a>(dctx: *mut c_void) -> Option<&'a mut Sha256Ctx> {
        (dctx as *mut Sha256Ctx).as_mut()
    }
}

pub unsafe extern "C" fn sha256_newctx(provctx: *mut c_void) -> *mut c_void {
    log::trace!("sha256_newctx provctx={:p}", provctx);

    let ctx = match ProviderContext::from_raw(provctx) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("sha256_newctx: {}", e);
            return ptr::null_mut();
        }
    };

    match Sha256Ctx::place(ctx.core, Sha256::new()) {
        Ok(p) => {
            log::debug!("sha256_newctx -> {:p}", p.as_ptr());
            p.as_ptr() as *mut c_void
        }
        Err(e) => {
            ctx.report(&e, crate::site!());
            ptr::null_mut()
        }
    }
}

pub unsafe extern "C" fn sha256_init(dctx: *mut c_void, _params: *const OsslParam) -> c_int {
    log::trace!("sha256_init dctx={:p}", dctx);
    match Sha256Ctx::from_raw(dctx) {
        Some(ctx) => {
            Digest::reset(&mut ctx.hasher);
            1
        }
        None => 0,
    }
}

pub unsafe extern "C" fn sha256_update(dctx: *mut c_void, data: *const u8, len: usize) -> c_int {
    crate::trace_opt!("sha256_update dctx={:p} len={}", dctx, len);
    let Some(ctx) = Sha256Ctx::from_raw(dctx) else {
        return 0;
    };
    if len == 0 {
        return 1;
    }
    if data.is_null() {
        log::error!("sha256_update: null input with length {}", len);
        return 0;
    }
    ctx.hasher.update(std::slice::from_raw_parts(data, len));
    1
}

pub unsafe extern "C" fn sha256_final(dctx: *mut c_void, out: *mut u8, outl: *mut usize, outsz: usize) -> c_int {
    log::trace!("sha256_final dctx={:p} outsz={}", dctx, outsz);

    let Some(ctx) = Sha256Ctx::from_raw(dctx) else {
        return 0;
    };
    if out.is_null() || outsz < SHA256_DIGEST_LENGTH {
        log::error!("sha256_final: output buffer of {} bytes too small", outsz);
        return 0;
    }

    let md = ctx.hasher.finalize_reset();
    ptr::copy_nonoverlapping(md.as_ptr(), out, SHA256_DIGEST_LENGTH);
    if !outl.is_null() {
        *outl = SHA256_DIGEST_LENGTH;
    }
    1
}

/// One-shot digest without a context
pub unsafe extern "C" fn sha256_digest(
    _provctx: *mut c_void,
    data: *const u8,
    len: usize,
    out: *mut u8,
    outl: *mut usize,
    outsz: usize,
) -> c_int {
    if out.is_null() || outsz < SHA256_DIGEST_LENGTH || (data.is_null() && len != 0) {
        return 0;
    }
    let input: &[u8] = if len == 0 { &[] } else { std::slice::from_raw_parts(data, len) };
    let md = Sha256::digest(input);
    ptr::copy_nonoverlapping(md.as_ptr(), out, SHA256_DIGEST_LENGTH);
    if !outl.is_null() {
        *outl = SHA256_DIGEST_LENGTH;
    }
    1
}

/// Free a digest context; the hash state is wiped when it lives in host memory
pub unsafe extern "C" fn sha256_freectx(dctx: *mut c_void) {
    log::trace!("sha256_freectx dctx={:p}", dctx);
    let Some(p) = NonNull::new(dctx as *mut Sha256Ctx) else {
        return;
    };
    let core = (*p.as_ptr()).core;
    let origin = (*p.as_ptr()).origin;
    mem::release(&core, p, origin, true, crate::site!());
}

pub unsafe extern "C" fn sha256_dupctx(dctx: *mut c_void) -> *mut c_void {
    log::trace!("sha256_dupctx dctx={:p}", dctx);
    let Some(src) = Sha256Ctx::from_raw(dctx) else {
        return ptr::null_mut();
    };
    match Sha256Ctx::place(src.core, src.hasher.clone()) {
        Ok(p) => p.as_ptr() as *mut c_void,
        Err(e) => {
            src.core.report(&e, crate::site!());
            ptr::null_mut()
        }
    }
}

pub unsafe extern "C" fn sha256_get_params(params: *mut OsslParam) -> c_int {
    log::trace!("sha256_get_params params={:p}", params);

    let p = OsslParam::locate(params, OSSL_DIGEST_PARAM_SIZE.as_ptr() as *const c_char);
    if !p.is_null() && !(*p).set_size_t(SHA256_DIGEST_LENGTH) {
        return 0;
    }
    let p = OsslParam::locate(params, OSSL_DIGEST_PARAM_BLOCK_SIZE.as_ptr() as *const c_char);
    if !p.is_null() && !(*p).set_size_t(SHA256_BLOCK_SIZE) {
        return 0;
    }
    1
}

static SHA256_GETTABLE_PARAMS: [OsslParam; 3] = [
    OsslParam {
        key: OSSL_DIGEST_PARAM_SIZE.as_ptr() as *const c_char,
        data_type: OSSL_PARAM_UNSIGNED_INTEGER,
        data: ptr::null_mut(),
        data_size: std::mem::size_of::<usize>(),
        return_size: 0,
    },
    OsslParam {
        key: OSSL_DIGEST_PARAM_BLOCK_SIZE.as_ptr() as *const c_char,
        data_type: OSSL_PARAM_UNSIGNED_INTEGER,
        data: ptr::null_mut(),
        data_size: std::mem::size_of::<usize>(),
        return_size: 0,
    },
    OsslParam::end(),
];

pub unsafe extern "C" fn sha256_gettable_params(_provctx: *mut c_void) -> *const OsslParam {
    SHA256_GETTABLE_PARAMS.as_ptr()
}

// Signatures of the digest functions a descriptor carries
pub type DigestNewCtxFn = unsafe extern "C" fn(provctx: *mut c_void) -> *mut c_void;
pub type DigestInitFn = unsafe extern "C" fn(dctx: *mut c_void, params: *const OsslParam) -> c_int;
pub type DigestUpdateFn = unsafe extern "C" fn(dctx: *mut c_void, data: *const u8, len: usize) -> c_int;
pub type DigestFinalFn =
    unsafe extern "C" fn(dctx: *mut c_void, out: *mut u8, outl: *mut usize, outsz: usize) -> c_int;
pub type DigestFreeCtxFn = unsafe extern "C" fn(dctx: *mut c_void);

/// Typed view of a digest descriptor's function table
#[derive(Default, Clone, Copy)]
pub struct DigestDispatch {
    pub newctx: Option<DigestNewCtxFn>,
    pub init: Option<DigestInitFn>,
    pub update: Option<DigestUpdateFn>,
    pub final_: Option<DigestFinalFn>,
    pub freectx: Option<DigestFreeCtxFn>,
}

// Frees the digest context on every exit path
struct DigestCtxGuard {
    free: DigestFreeCtxFn,
    dctx: *mut c_void,
}

impl Drop for DigestCtxGuard {
    fn drop(&mut self) {
        unsafe { (self.free)(self.dctx) };
    }
}

impl DigestDispatch {
    /// First occurrence of each id wins, unknown ids are ignored
    pub unsafe fn from_dispatch(table: *const OsslDispatch) -> Self {
        let mut fns = Self::default();
        for entry in dispatch_entries(table) {
            if entry.function.is_null() {
                continue;
            }
            let f = entry.function;
            match entry.function_id {
                OSSL_FUNC_DIGEST_NEWCTX if fns.newctx.is_none() => {
                    fns.newctx = Some(std::mem::transmute::<*mut c_void, DigestNewCtxFn>(f));
                }
                OSSL_FUNC_DIGEST_INIT if fns.init.is_none() => {
                    fns.init = Some(std::mem::transmute::<*mut c_void, DigestInitFn>(f));
                }
                OSSL_FUNC_DIGEST_UPDATE if fns.update.is_none() => {
                    fns.update = Some(std::mem::transmute::<*mut c_void, DigestUpdateFn>(f));
                }
                OSSL_FUNC_DIGEST_FINAL if fns.final_.is_none() => {
                    fns.final_ = Some(std::mem::transmute::<*mut c_void, DigestFinalFn>(f));
                }
                OSSL_FUNC_DIGEST_FREECTX if fns.freectx.is_none() => {
                    fns.freectx = Some(std::mem::transmute::<*mut c_void, DigestFreeCtxFn>(f));
                }
                _ => {}
            }
        }
        fns
    }

    /// Run newctx, init, update, final and freectx over `msg`
    pub unsafe fn compute(&self, provctx: *mut c_void, msg: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let (Some(newctx), Some(init), Some(update), Some(final_), Some(freectx)) =
            (self.newctx, self.init, self.update, self.final_, self.freectx)
        else {
            return Err(ProviderError::DigestFailed("incomplete function table"));
        };

        let dctx = newctx(provctx);
        if dctx.is_null() {
            return Err(ProviderError::DigestFailed("newctx"));
        }
        let _guard = DigestCtxGuard { free: freectx, dctx };

        if init(dctx, ptr::null()) != 1 {
            return Err(ProviderError::DigestFailed("init"));
        }
        if update(dctx, msg.as_ptr(), msg.len()) != 1 {
            return Err(ProviderError::DigestFailed("update"));
        }

        let mut md = [0u8; MAX_DIGEST_SIZE];
        let mut len = 0usize;
        if final_(dctx, md.as_mut_ptr(), &mut len, md.len()) != 1 || len > md.len() {
            return Err(ProviderError::DigestFailed("final"));
        }
        Ok(md[..len].to_vec())
    }
}
