// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Provider context
// One ProviderContext per load. It owns the capabilities bound from the
// host's table and is the opaque `provctx` every provider function receives.

use crate::core_bindings::{CoreBindings, Site};
use crate::error::ProviderError;
use crate::mem::{self, Origin};
use crate::ossl_param::{OsslItem, OsslParam};
use std::os::raw::c_void;
use std::ptr::{self, NonNull};

/// "FIPSCTX1"
pub const CONTEXT_MAGIC: u64 = 0x4649_5053_4354_5831;
const DESTROYED_MAGIC: u64 = 0;

/// Shared prefix of every provider context.
///
/// The recursive entry point receives a `provctx` the host pre-populated
/// from the context that started the outer operation, instead of creating
/// one. Host and provider therefore agree on this header: a context pointer
/// may be read as a `ContextCarrier`, `magic` identifies contexts made by
/// this module, and `libctx` is the library context the nested call must
/// reuse (for this provider, the context itself).
#[repr(C)]
pub struct ContextCarrier {
    pub magic: u64,
    pub libctx: *const ProviderContext,
}

impl ContextCarrier {
    /// Validate a raw `provctx` against the carrier contract
    pub unsafe fn library_context(provctx: *const c_void) -> Result<NonNull<ProviderContext>, ProviderError> {
        if provctx.is_null() || (provctx as usize) % std::mem::align_of::<ProviderContext>() != 0 {
            return Err(ProviderError::InvalidContext);
        }
        let carrier = &*(provctx as *const ContextCarrier);
        if carrier.magic != CONTEXT_MAGIC || carrier.libctx as *const c_void != provctx {
            return Err(ProviderError::InvalidContext);
        }
        Ok(NonNull::new_unchecked(provctx as *mut ProviderContext))
    }
}

/// Provider context structure
#[repr(C)]
pub struct ProviderContext {
    /// Must stay the first field
    carrier: ContextCarrier,
    /// Core handle passed to the external entry point
    pub handle: *const c_void,
    /// Capabilities bound from the host's table for this load
    pub core: CoreBindings,
    origin: Origin,
}

impl ProviderContext {
    /// Allocate a context in host memory if possible
    pub unsafe fn create(handle: *const c_void, core: CoreBindings, site: Site) -> Result<NonNull<ProviderContext>, ProviderError> {
        log::trace!("ProviderContext::create handle={:p}", handle);

        let ctx = ProviderContext {
            carrier: ContextCarrier { magic: CONTEXT_MAGIC, libctx: ptr::null() },
            handle,
            core,
            origin: Origin::Local,
        };
        let (p, origin) = mem::place(&core, ctx, site)?;
        (*p.as_ptr()).origin = origin;
        (*p.as_ptr()).carrier.libctx = p.as_ptr();

        log::debug!("ProviderContext::create -> {:p} ({:?})", p.as_ptr(), origin);
        Ok(p)
    }

    /// Release a context created by `create`
    pub unsafe fn destroy(ctx: NonNull<ProviderContext>, site: Site) {
        log::trace!("ProviderContext::destroy ctx={:p}", ctx.as_ptr());

        let core = (*ctx.as_ptr()).core;
        let origin = (*ctx.as_ptr()).origin;
        (*ctx.as_ptr()).carrier.magic = DESTROYED_MAGIC;
        (*ctx.as_ptr()).carrier.libctx = ptr::null();
        mem::release(&core, ctx, origin, false, site);

        log::debug!("ProviderContext::destroy complete");
    }

    /// Borrow the context behind a raw `provctx`
    pub unsafe fn from_raw<'a>(provctx: *const c_void) -> Result<&'a ProviderContext, ProviderError> {
        ContextCarrier::library_context(provctx).map(|p| &*p.as_ptr())
    }

    pub fn as_raw(&self) -> *mut c_void {
        self as *const ProviderContext as *mut c_void
    }

    /// Allocator the context itself came from
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Push an error onto the host's error stack
    pub unsafe fn report(&self, err: &ProviderError, site: Site) {
        self.core.report(err, site);
    }

    /// Parameter types the core advertises for this provider
    pub unsafe fn core_param_types(&self) -> Result<*const OsslItem, ProviderError> {
        self.core.core_param_types(self.handle)
    }

    /// Ask the core for parameters about this provider instance
    pub unsafe fn core_get_params(&self, params: *mut OsslParam) -> Result<(), ProviderError> {
        self.core.core_get_params(self.handle, params)
    }
}

impl Drop for ProviderContext {
    fn drop(&mut self) {
        log::trace!("ProviderContext::drop");
    }
}
