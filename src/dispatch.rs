// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Dispatch tables and algorithm definitions
// OSSL_DISPATCH / OSSL_ALGORITHM layouts, the tables this provider hands to
// the host, and typed readers for tables received from the other side.

use crate::ossl_param::{OsslItem, OsslParam};
use std::ffi::CStr;
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

// Operation IDs (from openssl/core_numbers.h)
pub const OSSL_OP_DIGEST: c_int = 1;
pub const OSSL_OP_CIPHER: c_int = 2;
pub const OSSL_OP_MAC: c_int = 3;
pub const OSSL_OP_KDF: c_int = 4;
pub const OSSL_OP_KEYMGMT: c_int = 10;
pub const OSSL_OP_KEYEXCH: c_int = 11;
pub const OSSL_OP_SIGNATURE: c_int = 12;
pub const OSSL_OP_ASYM_CIPHER: c_int = 13;

// Function IDs the provider exposes to the core
pub const OSSL_FUNC_PROVIDER_TEARDOWN: c_int = 1024;
pub const OSSL_FUNC_PROVIDER_GET_PARAM_TYPES: c_int = 1025;
pub const OSSL_FUNC_PROVIDER_GET_PARAMS: c_int = 1026;
pub const OSSL_FUNC_PROVIDER_QUERY_OPERATION: c_int = 1027;

// Function IDs for digests
pub const OSSL_FUNC_DIGEST_NEWCTX: c_int = 1;
pub const OSSL_FUNC_DIGEST_INIT: c_int = 2;
pub const OSSL_FUNC_DIGEST_UPDATE: c_int = 3;
pub const OSSL_FUNC_DIGEST_FINAL: c_int = 4;
pub const OSSL_FUNC_DIGEST_DIGEST: c_int = 5;
pub const OSSL_FUNC_DIGEST_FREECTX: c_int = 6;
pub const OSSL_FUNC_DIGEST_DUPCTX: c_int = 7;
pub const OSSL_FUNC_DIGEST_GET_PARAMS: c_int = 8;
pub const OSSL_FUNC_DIGEST_GETTABLE_PARAMS: c_int = 11;

/// Operation categories used as query keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCategory {
    Digest,
    Cipher,
    Mac,
    Kdf,
    KeyMgmt,
    KeyExch,
    Signature,
    AsymCipher,
}

impl OperationCategory {
    pub fn from_id(id: c_int) -> Option<Self> {
        match id {
            OSSL_OP_DIGEST => Some(Self::Digest),
            OSSL_OP_CIPHER => Some(Self::Cipher),
            OSSL_OP_MAC => Some(Self::Mac),
            OSSL_OP_KDF => Some(Self::Kdf),
            OSSL_OP_KEYMGMT => Some(Self::KeyMgmt),
            OSSL_OP_KEYEXCH => Some(Self::KeyExch),
            OSSL_OP_SIGNATURE => Some(Self::Signature),
            OSSL_OP_ASYM_CIPHER => Some(Self::AsymCipher),
            _ => None,
        }
    }

    pub fn id(self) -> c_int {
        match self {
            Self::Digest => OSSL_OP_DIGEST,
            Self::Cipher => OSSL_OP_CIPHER,
            Self::Mac => OSSL_OP_MAC,
            Self::Kdf => OSSL_OP_KDF,
            Self::KeyMgmt => OSSL_OP_KEYMGMT,
            Self::KeyExch => OSSL_OP_KEYEXCH,
            Self::Signature => OSSL_OP_SIGNATURE,
            Self::AsymCipher => OSSL_OP_ASYM_CIPHER,
        }
    }
}

/// OSSL_DISPATCH structure (matches OpenSSL's definition)
/// C definition: struct { int function_id; void (*function)(void); }
#[repr(C)]
pub struct OsslDispatch {
    pub function_id: c_int,
    pub function: *mut c_void,
}

impl OsslDispatch {
    pub const fn new(function_id: c_int, function: *mut c_void) -> Self {
        Self { function_id, function }
    }

    pub const fn end() -> Self {
        Self { function_id: 0, function: ptr::null_mut() }
    }
}

// Static tables only point at functions defined in this crate
unsafe impl Sync for OsslDispatch {}

/// Iterator over a dispatch table. Stops at the first entry whose id is 0
/// and never reads past it.
pub struct DispatchIter<'a> {
    cur: *const OsslDispatch,
    _table: PhantomData<&'a OsslDispatch>,
}

impl<'a> Iterator for DispatchIter<'a> {
    type Item = &'a OsslDispatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        let entry = unsafe { &*self.cur };
        if entry.function_id == 0 {
            self.cur = ptr::null();
            return None;
        }
        self.cur = unsafe { self.cur.add(1) };
        Some(entry)
    }
}

/// Walk a sentinel-terminated dispatch table. A null table is empty.
pub unsafe fn dispatch_entries<'a>(table: *const OsslDispatch) -> DispatchIter<'a> {
    DispatchIter { cur: table, _table: PhantomData }
}

/// OSSL_ALGORITHM structure (matches OpenSSL's definition)
#[repr(C)]
pub struct OsslAlgorithm {
    pub algorithm_names: *const c_char,
    pub property_definition: *const c_char,
    pub implementation: *const OsslDispatch,
    pub algorithm_description: *const c_char,
}

// Only static string literals and static dispatch tables are referenced
unsafe impl Sync for OsslAlgorithm {}

impl OsslAlgorithm {
    pub const fn end() -> Self {
        Self {
            algorithm_names: ptr::null(),
            property_definition: ptr::null(),
            implementation: ptr::null(),
            algorithm_description: ptr::null(),
        }
    }

    /// Colon-separated algorithm names
    pub fn names(&self) -> Option<&CStr> {
        cstr_opt(self.algorithm_names)
    }

    /// Property definition (selection predicate), passed through verbatim
    pub fn properties(&self) -> Option<&CStr> {
        cstr_opt(self.property_definition)
    }

    pub fn description(&self) -> Option<&CStr> {
        cstr_opt(self.algorithm_description)
    }

    /// Whether any of the colon-separated names matches, ignoring ASCII case
    pub fn has_name(&self, name: &str) -> bool {
        self.names()
            .and_then(|n| n.to_str().ok())
            .map(|n| n.split(':').any(|alias| alias.eq_ignore_ascii_case(name)))
            .unwrap_or(false)
    }
}

fn cstr_opt<'a>(p: *const c_char) -> Option<&'a CStr> {
    if p.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(p) })
    }
}

/// Walk an algorithm array up to its all-null sentinel
pub unsafe fn algorithms<'a>(list: *const OsslAlgorithm) -> impl Iterator<Item = &'a OsslAlgorithm> {
    let mut cur = list;
    std::iter::from_fn(move || unsafe {
        if cur.is_null() || (*cur).algorithm_names.is_null() {
            return None;
        }
        let alg = &*cur;
        cur = cur.add(1);
        Some(alg)
    })
}

/// First descriptor carrying `name`
pub unsafe fn find_algorithm<'a>(list: *const OsslAlgorithm, name: &str) -> Option<&'a OsslAlgorithm> {
    algorithms(list).find(|alg| alg.has_name(name))
}

// Helper macro to create null-terminated strings for C
macro_rules! c_str {
    ($s:expr) => {
        concat!($s, "\0").as_ptr() as *const c_char
    };
}

/// SHA-256 digest dispatch functions
pub static SHA256_FUNCTIONS: [OsslDispatch; 10] = [
    OsslDispatch::new(OSSL_FUNC_DIGEST_NEWCTX, crate::digest::sha256_newctx as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_INIT, crate::digest::sha256_init as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_UPDATE, crate::digest::sha256_update as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_FINAL, crate::digest::sha256_final as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_DIGEST, crate::digest::sha256_digest as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_FREECTX, crate::digest::sha256_freectx as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_DUPCTX, crate::digest::sha256_dupctx as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_GET_PARAMS, crate::digest::sha256_get_params as *mut c_void),
    OsslDispatch::new(OSSL_FUNC_DIGEST_GETTABLE_PARAMS, crate::digest::sha256_gettable_params as *mut c_void),
    OsslDispatch::end(),
];

/// Digest algorithm table
pub static FIPS_DIGESTS: [OsslAlgorithm; 2] = [
    OsslAlgorithm {
        algorithm_names: c_str!("SHA256"),
        property_definition: c_str!("fips=yes"),
        implementation: SHA256_FUNCTIONS.as_ptr(),
        algorithm_description: c_str!("SHA-256 message digest"),
    },
    OsslAlgorithm::end(),
];

/// Main provider dispatch table, handed out by the external entry point
pub static FIPS_DISPATCH_TABLE: [OsslDispatch; 5] = [
    OsslDispatch::new(OSSL_FUNC_PROVIDER_TEARDOWN, crate::fips_teardown as *mut c_void),
    OsslDispatch::new(
        OSSL_FUNC_PROVIDER_GET_PARAM_TYPES,
        crate::fips_get_param_types as *mut c_void,
    ),
    OsslDispatch::new(OSSL_FUNC_PROVIDER_GET_PARAMS, crate::fips_get_params as *mut c_void),
    OsslDispatch::new(
        OSSL_FUNC_PROVIDER_QUERY_OPERATION,
        crate::fips_query_operation as *mut c_void,
    ),
    OsslDispatch::end(),
];

/// Table handed out by the recursive entry point: query only
pub static INTERN_DISPATCH_TABLE: [OsslDispatch; 2] = [
    OsslDispatch::new(
        OSSL_FUNC_PROVIDER_QUERY_OPERATION,
        crate::fips_query_operation as *mut c_void,
    ),
    OsslDispatch::end(),
];

/// Query operation and return appropriate algorithm table
pub fn query_operation_impl(operation_id: c_int) -> *const OsslAlgorithm {
    log::trace!("query_operation_impl operation_id={}", operation_id);

    let result = match OperationCategory::from_id(operation_id) {
        Some(OperationCategory::Digest) => FIPS_DIGESTS.as_ptr(),
        _ => ptr::null(),
    };

    log::debug!("query_operation_impl({}) -> {:p}", operation_id, result);
    result
}

// Signatures of the functions a provider table carries
pub type ProviderInitFn = unsafe extern "C" fn(
    handle: *const c_void,
    in_: *const OsslDispatch,
    out: *mut *const OsslDispatch,
    provctx: *mut *mut c_void,
) -> c_int;
pub type TeardownFn = unsafe extern "C" fn(provctx: *mut c_void);
pub type GetParamTypesFn = unsafe extern "C" fn(provctx: *mut c_void) -> *const OsslItem;
pub type GetParamsFn = unsafe extern "C" fn(provctx: *mut c_void, params: *mut OsslParam) -> c_int;
pub type QueryOperationFn = unsafe extern "C" fn(
    provctx: *mut c_void,
    operation_id: c_int,
    no_cache: *mut c_int,
) -> *const OsslAlgorithm;

/// Typed view of a table returned by a provider entry point
#[derive(Default, Clone, Copy)]
pub struct ProviderDispatch {
    pub teardown: Option<TeardownFn>,
    pub get_param_types: Option<GetParamTypesFn>,
    pub get_params: Option<GetParamsFn>,
    pub query_operation: Option<QueryOperationFn>,
}

impl ProviderDispatch {
    /// Copy the known entries out of `table`; first occurrence wins
    pub unsafe fn from_dispatch(table: *const OsslDispatch) -> Self {
        let mut fns = Self::default();
        for entry in dispatch_entries(table) {
            if entry.function.is_null() {
                continue;
            }
            match entry.function_id {
                OSSL_FUNC_PROVIDER_TEARDOWN if fns.teardown.is_none() => {
                    fns.teardown = Some(std::mem::transmute::<*mut c_void, TeardownFn>(entry.function));
                }
                OSSL_FUNC_PROVIDER_GET_PARAM_TYPES if fns.get_param_types.is_none() => {
                    fns.get_param_types =
                        Some(std::mem::transmute::<*mut c_void, GetParamTypesFn>(entry.function));
                }
                OSSL_FUNC_PROVIDER_GET_PARAMS if fns.get_params.is_none() => {
                    fns.get_params = Some(std::mem::transmute::<*mut c_void, GetParamsFn>(entry.function));
                }
                OSSL_FUNC_PROVIDER_QUERY_OPERATION if fns.query_operation.is_none() => {
                    fns.query_operation =
                        Some(std::mem::transmute::<*mut c_void, QueryOperationFn>(entry.function));
                }
                _ => {}
            }
        }
        fns
    }
}
