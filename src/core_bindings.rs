// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Capabilities supplied by the core
// The host's dispatch table is read once at load time; the function pointers
// we understand are copied into a CoreBindings value that lives inside the
// provider context of that load.

use crate::dispatch::{dispatch_entries, OsslDispatch};
use crate::error::{ProviderError, ERR_LIB_PROV};
use crate::ossl_param::{OsslItem, OsslParam};
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::NonNull;

// Function IDs for capabilities the core offers to providers
pub const OSSL_FUNC_CORE_GET_PARAM_TYPES: c_int = 1;
pub const OSSL_FUNC_CORE_GET_PARAMS: c_int = 2;
pub const OSSL_FUNC_CORE_THREAD_START: c_int = 3;
pub const OSSL_FUNC_CORE_PUT_ERROR: c_int = 4;
pub const OSSL_FUNC_CORE_ADD_ERROR_VDATA: c_int = 5;
pub const OSSL_FUNC_CRYPTO_MALLOC: c_int = 10;
pub const OSSL_FUNC_CRYPTO_ZALLOC: c_int = 11;
pub const OSSL_FUNC_CRYPTO_MEMDUP: c_int = 12;
pub const OSSL_FUNC_CRYPTO_STRDUP: c_int = 13;
pub const OSSL_FUNC_CRYPTO_STRNDUP: c_int = 14;
pub const OSSL_FUNC_CRYPTO_FREE: c_int = 15;
pub const OSSL_FUNC_CRYPTO_CLEAR_FREE: c_int = 16;
pub const OSSL_FUNC_CRYPTO_REALLOC: c_int = 17;
pub const OSSL_FUNC_CRYPTO_CLEAR_REALLOC: c_int = 18;
pub const OSSL_FUNC_CRYPTO_SECURE_MALLOC: c_int = 19;
pub const OSSL_FUNC_CRYPTO_SECURE_ZALLOC: c_int = 20;
pub const OSSL_FUNC_CRYPTO_SECURE_FREE: c_int = 21;
pub const OSSL_FUNC_CRYPTO_SECURE_CLEAR_FREE: c_int = 22;
pub const OSSL_FUNC_CRYPTO_SECURE_MALLOC_INITIALIZED: c_int = 23;
pub const OSSL_FUNC_OPENSSL_CLEANSE: c_int = 24;

pub type CoreGetParamTypesFn = unsafe extern "C" fn(handle: *const c_void) -> *const OsslItem;
pub type CoreGetParamsFn = unsafe extern "C" fn(handle: *const c_void, params: *mut OsslParam) -> c_int;
pub type CorePutErrorFn =
    unsafe extern "C" fn(lib: c_int, func: c_int, reason: c_int, file: *const c_char, line: c_int);
/// `data` points at `num` NUL-terminated strings
pub type CoreAddErrorVdataFn = unsafe extern "C" fn(num: c_int, data: *const *const c_char);
pub type CryptoMallocFn = unsafe extern "C" fn(num: usize, file: *const c_char, line: c_int) -> *mut c_void;
pub type CryptoMemdupFn =
    unsafe extern "C" fn(str: *const c_void, siz: usize, file: *const c_char, line: c_int) -> *mut c_void;
pub type CryptoStrdupFn =
    unsafe extern "C" fn(str: *const c_char, file: *const c_char, line: c_int) -> *mut c_char;
pub type CryptoStrndupFn =
    unsafe extern "C" fn(str: *const c_char, s: usize, file: *const c_char, line: c_int) -> *mut c_char;
pub type CryptoFreeFn = unsafe extern "C" fn(ptr: *mut c_void, file: *const c_char, line: c_int);
pub type CryptoClearFreeFn =
    unsafe extern "C" fn(ptr: *mut c_void, num: usize, file: *const c_char, line: c_int);
pub type CryptoReallocFn =
    unsafe extern "C" fn(addr: *mut c_void, num: usize, file: *const c_char, line: c_int) -> *mut c_void;
pub type CryptoClearReallocFn = unsafe extern "C" fn(
    addr: *mut c_void,
    old_num: usize,
    num: usize,
    file: *const c_char,
    line: c_int,
) -> *mut c_void;
pub type CryptoSecureMallocInitializedFn = unsafe extern "C" fn() -> c_int;
pub type OpensslCleanseFn = unsafe extern "C" fn(ptr: *mut c_void, len: usize);

/// Source location handed to the host allocator and error stack
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub file: *const c_char,
    pub line: c_int,
}

/// Current source location as a Site
#[macro_export]
macro_rules! site {
    () => {
        $crate::core_bindings::Site {
            file: concat!(file!(), "\0").as_ptr() as *const ::std::os::raw::c_char,
            line: line!() as ::std::os::raw::c_int,
        }
    };
}

/// Host capabilities bound at load time. Every slot is optional; callers
/// get MissingCapability instead of a call through a null pointer.
#[derive(Default, Clone, Copy)]
pub struct CoreBindings {
    pub get_param_types: Option<CoreGetParamTypesFn>,
    pub get_params: Option<CoreGetParamsFn>,
    pub put_error: Option<CorePutErrorFn>,
    pub add_error_vdata: Option<CoreAddErrorVdataFn>,
    pub malloc: Option<CryptoMallocFn>,
    pub zalloc: Option<CryptoMallocFn>,
    pub memdup: Option<CryptoMemdupFn>,
    pub strdup: Option<CryptoStrdupFn>,
    pub strndup: Option<CryptoStrndupFn>,
    pub free: Option<CryptoFreeFn>,
    pub clear_free: Option<CryptoClearFreeFn>,
    pub realloc: Option<CryptoReallocFn>,
    pub clear_realloc: Option<CryptoClearReallocFn>,
    pub secure_malloc: Option<CryptoMallocFn>,
    pub secure_zalloc: Option<CryptoMallocFn>,
    pub secure_free: Option<CryptoFreeFn>,
    pub secure_clear_free: Option<CryptoClearFreeFn>,
    pub secure_malloc_initialized: Option<CryptoSecureMallocInitializedFn>,
    pub cleanse: Option<OpensslCleanseFn>,
}

// Store the pointer if the slot is still empty: first occurrence wins,
// null pointers bind nothing.
macro_rules! bind {
    ($slot:expr, $entry:expr) => {
        if $slot.is_none() && !$entry.function.is_null() {
            $slot = Some(std::mem::transmute::<*mut c_void, _>($entry.function));
        }
    };
}

fn bound<T>(slot: Option<T>, name: &'static str) -> Result<T, ProviderError> {
    slot.ok_or(ProviderError::MissingCapability(name))
}

fn non_null<T>(p: *mut T, size: usize) -> Result<NonNull<T>, ProviderError> {
    NonNull::new(p).ok_or(ProviderError::AllocationFailed { size })
}

impl CoreBindings {
    /// Resolve capabilities from the host's table. Unknown ids are skipped,
    /// scanning stops at the sentinel, and nothing is reported here.
    pub unsafe fn from_dispatch(table: *const OsslDispatch) -> Self {
        log::trace!("CoreBindings::from_dispatch table={:p}", table);

        let mut b = Self::default();
        let mut seen = 0usize;
        for entry in dispatch_entries(table) {
            seen += 1;
            match entry.function_id {
                OSSL_FUNC_CORE_GET_PARAM_TYPES => bind!(b.get_param_types, entry),
                OSSL_FUNC_CORE_GET_PARAMS => bind!(b.get_params, entry),
                OSSL_FUNC_CORE_PUT_ERROR => bind!(b.put_error, entry),
                OSSL_FUNC_CORE_ADD_ERROR_VDATA => bind!(b.add_error_vdata, entry),
                OSSL_FUNC_CRYPTO_MALLOC => bind!(b.malloc, entry),
                OSSL_FUNC_CRYPTO_ZALLOC => bind!(b.zalloc, entry),
                OSSL_FUNC_CRYPTO_MEMDUP => bind!(b.memdup, entry),
                OSSL_FUNC_CRYPTO_STRDUP => bind!(b.strdup, entry),
                OSSL_FUNC_CRYPTO_STRNDUP => bind!(b.strndup, entry),
                OSSL_FUNC_CRYPTO_FREE => bind!(b.free, entry),
                OSSL_FUNC_CRYPTO_CLEAR_FREE => bind!(b.clear_free, entry),
                OSSL_FUNC_CRYPTO_REALLOC => bind!(b.realloc, entry),
                OSSL_FUNC_CRYPTO_CLEAR_REALLOC => bind!(b.clear_realloc, entry),
                OSSL_FUNC_CRYPTO_SECURE_MALLOC => bind!(b.secure_malloc, entry),
                OSSL_FUNC_CRYPTO_SECURE_ZALLOC => bind!(b.secure_zalloc, entry),
                OSSL_FUNC_CRYPTO_SECURE_FREE => bind!(b.secure_free, entry),
                OSSL_FUNC_CRYPTO_SECURE_CLEAR_FREE => bind!(b.secure_clear_free, entry),
                OSSL_FUNC_CRYPTO_SECURE_MALLOC_INITIALIZED => {
                    bind!(b.secure_malloc_initialized, entry)
                }
                OSSL_FUNC_OPENSSL_CLEANSE => bind!(b.cleanse, entry),
                // Just ignore anything we don't understand
                _ => {}
            }
        }

        log::debug!(
            "CoreBindings::from_dispatch -> {} of {} entries bound",
            b.bound_ids().len(),
            seen
        );
        b
    }

    /// Post-scan consistency check. A host that hands out an allocator must
    /// also hand out the matching free.
    pub fn check(&self) -> Result<(), ProviderError> {
        let allocates = self.malloc.is_some()
            || self.zalloc.is_some()
            || self.memdup.is_some()
            || self.strdup.is_some()
            || self.strndup.is_some()
            || self.realloc.is_some()
            || self.clear_realloc.is_some();
        if allocates && self.free.is_none() {
            return Err(ProviderError::MissingCapability("CRYPTO_free"));
        }

        let secure_allocates = self.secure_malloc.is_some() || self.secure_zalloc.is_some();
        if secure_allocates && self.secure_free.is_none() {
            return Err(ProviderError::MissingCapability("CRYPTO_secure_free"));
        }
        Ok(())
    }

    /// Ids of the bound capabilities, in capability order
    pub fn bound_ids(&self) -> Vec<c_int> {
        let slots = [
            (OSSL_FUNC_CORE_GET_PARAM_TYPES, self.get_param_types.is_some()),
            (OSSL_FUNC_CORE_GET_PARAMS, self.get_params.is_some()),
            (OSSL_FUNC_CORE_PUT_ERROR, self.put_error.is_some()),
            (OSSL_FUNC_CORE_ADD_ERROR_VDATA, self.add_error_vdata.is_some()),
            (OSSL_FUNC_CRYPTO_MALLOC, self.malloc.is_some()),
            (OSSL_FUNC_CRYPTO_ZALLOC, self.zalloc.is_some()),
            (OSSL_FUNC_CRYPTO_MEMDUP, self.memdup.is_some()),
            (OSSL_FUNC_CRYPTO_STRDUP, self.strdup.is_some()),
            (OSSL_FUNC_CRYPTO_STRNDUP, self.strndup.is_some()),
            (OSSL_FUNC_CRYPTO_FREE, self.free.is_some()),
            (OSSL_FUNC_CRYPTO_CLEAR_FREE, self.clear_free.is_some()),
            (OSSL_FUNC_CRYPTO_REALLOC, self.realloc.is_some()),
            (OSSL_FUNC_CRYPTO_CLEAR_REALLOC, self.clear_realloc.is_some()),
            (OSSL_FUNC_CRYPTO_SECURE_MALLOC, self.secure_malloc.is_some()),
            (OSSL_FUNC_CRYPTO_SECURE_ZALLOC, self.secure_zalloc.is_some()),
            (OSSL_FUNC_CRYPTO_SECURE_FREE, self.secure_free.is_some()),
            (OSSL_FUNC_CRYPTO_SECURE_CLEAR_FREE, self.secure_clear_free.is_some()),
            (
                OSSL_FUNC_CRYPTO_SECURE_MALLOC_INITIALIZED,
                self.secure_malloc_initialized.is_some(),
            ),
            (OSSL_FUNC_OPENSSL_CLEANSE, self.cleanse.is_some()),
        ];
        slots.iter().filter(|(_, b)| *b).map(|(id, _)| *id).collect()
    }

    /// Whether host memory can be used for provider objects
    pub fn has_allocator(&self) -> bool {
        (self.zalloc.is_some() || self.malloc.is_some()) && self.free.is_some()
    }

    // Error stack forwarding

    pub unsafe fn put_error(&self, lib: c_int, func: c_int, reason: c_int, site: Site) -> Result<(), ProviderError> {
        let f = bound(self.put_error, "core_put_error")?;
        f(lib, func, reason, site.file, site.line);
        Ok(())
    }

    pub unsafe fn add_error_data(&self, data: &[&str]) -> Result<(), ProviderError> {
        let f = bound(self.add_error_vdata, "core_add_error_vdata")?;
        // interior NULs cannot cross the boundary; replace rather than drop
        let owned: Vec<CString> = data
            .iter()
            .map(|s| CString::new(s.replace('\0', " ")).unwrap_or_default())
            .collect();
        let ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        f(ptrs.len() as c_int, ptrs.as_ptr());
        Ok(())
    }

    /// Push `err` onto the host's error stack if the host gave us one
    pub unsafe fn report(&self, err: &ProviderError, site: Site) {
        log::error!("{}", err);
        if self.put_error(ERR_LIB_PROV, 0, err.reason(), site).is_err() {
            log::debug!("report: host supplied no put-error capability");
            return;
        }
        let text = err.to_string();
        let _ = self.add_error_data(&[text.as_str()]);
    }

    // Core parameters

    pub unsafe fn core_param_types(&self, handle: *const c_void) -> Result<*const OsslItem, ProviderError> {
        let f = bound(self.get_param_types, "core_get_param_types")?;
        Ok(f(handle))
    }

    pub unsafe fn core_get_params(&self, handle: *const c_void, params: *mut OsslParam) -> Result<(), ProviderError> {
        let f = bound(self.get_params, "core_get_params")?;
        if f(handle, params) == 0 {
            return Err(ProviderError::HostCallFailed("core_get_params"));
        }
        Ok(())
    }

    // Allocator forwarding

    pub unsafe fn malloc(&self, num: usize, site: Site) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.malloc, "CRYPTO_malloc")?;
        non_null(f(num, site.file, site.line), num)
    }

    pub unsafe fn zalloc(&self, num: usize, site: Site) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.zalloc, "CRYPTO_zalloc")?;
        non_null(f(num, site.file, site.line), num)
    }

    pub unsafe fn memdup(&self, data: &[u8], site: Site) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.memdup, "CRYPTO_memdup")?;
        non_null(f(data.as_ptr() as *const c_void, data.len(), site.file, site.line), data.len())
    }

    pub unsafe fn strdup(&self, s: &std::ffi::CStr, site: Site) -> Result<NonNull<c_char>, ProviderError> {
        let f = bound(self.strdup, "CRYPTO_strdup")?;
        non_null(f(s.as_ptr(), site.file, site.line), s.to_bytes().len() + 1)
    }

    pub unsafe fn strndup(&self, s: &std::ffi::CStr, n: usize, site: Site) -> Result<NonNull<c_char>, ProviderError> {
        let f = bound(self.strndup, "CRYPTO_strndup")?;
        non_null(f(s.as_ptr(), n, site.file, site.line), n + 1)
    }

    pub unsafe fn free(&self, p: *mut c_void, site: Site) -> Result<(), ProviderError> {
        let f = bound(self.free, "CRYPTO_free")?;
        f(p, site.file, site.line);
        Ok(())
    }

    /// Wipe and free. Falls back to cleanse + free when the host has no
    /// clear_free; fails if neither path can wipe the memory.
    pub unsafe fn clear_free(&self, p: *mut c_void, num: usize, site: Site) -> Result<(), ProviderError> {
        if let Some(f) = self.clear_free {
            f(p, num, site.file, site.line);
            return Ok(());
        }
        self.cleanse(p, num)?;
        self.free(p, site)
    }

    pub unsafe fn realloc(&self, p: *mut c_void, num: usize, site: Site) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.realloc, "CRYPTO_realloc")?;
        non_null(f(p, num, site.file, site.line), num)
    }

    pub unsafe fn clear_realloc(
        &self,
        p: *mut c_void,
        old_num: usize,
        num: usize,
        site: Site,
    ) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.clear_realloc, "CRYPTO_clear_realloc")?;
        non_null(f(p, old_num, num, site.file, site.line), num)
    }

    pub unsafe fn secure_malloc(&self, num: usize, site: Site) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.secure_malloc, "CRYPTO_secure_malloc")?;
        non_null(f(num, site.file, site.line), num)
    }

    pub unsafe fn secure_zalloc(&self, num: usize, site: Site) -> Result<NonNull<c_void>, ProviderError> {
        let f = bound(self.secure_zalloc, "CRYPTO_secure_zalloc")?;
        non_null(f(num, site.file, site.line), num)
    }

    pub unsafe fn secure_free(&self, p: *mut c_void, site: Site) -> Result<(), ProviderError> {
        let f = bound(self.secure_free, "CRYPTO_secure_free")?;
        f(p, site.file, site.line);
        Ok(())
    }

    pub unsafe fn secure_clear_free(&self, p: *mut c_void, num: usize, site: Site) -> Result<(), ProviderError> {
        let f = bound(self.secure_clear_free, "CRYPTO_secure_clear_free")?;
        f(p, num, site.file, site.line);
        Ok(())
    }

    /// False when the host never told us
    pub unsafe fn secure_malloc_initialized(&self) -> bool {
        match self.secure_malloc_initialized {
            Some(f) => f() != 0,
            None => false,
        }
    }

    pub unsafe fn cleanse(&self, p: *mut c_void, len: usize) -> Result<(), ProviderError> {
        let f = bound(self.cleanse, "OPENSSL_cleanse")?;
        f(p, len);
        Ok(())
    }
}
