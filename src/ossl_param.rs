// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// OSSL_PARAM handling
// Rust-side view of the parameter slots the host hands to get-params, plus
// the static type descriptors the provider advertises.

use crate::ostr;
use std::ffi::CStr;
use std::os::raw::{c_char, c_uint, c_void};
use std::ptr;

/// OSSL_PARAM structure (matches OpenSSL's definition)
/// One caller-owned slot: the provider writes into `data` and `return_size`
#[repr(C)]
#[derive(Copy, Clone)]
pub struct OsslParam {
    pub key: *const c_char,
    pub data_type: c_uint,
    pub data: *mut c_void,
    pub data_size: usize,
    pub return_size: usize,
}

// Static descriptor arrays only hold pointers to string literals
unsafe impl Sync for OsslParam {}

/// OSSL_ITEM structure: a `{type, key}` pair used to advertise parameters
#[repr(C)]
pub struct OsslItem {
    pub id: c_uint,
    pub name: *const c_char,
}

unsafe impl Sync for OsslItem {}

impl OsslItem {
    pub const fn end() -> Self {
        Self { id: 0, name: ptr::null() }
    }

    pub fn name(&self) -> Option<&CStr> {
        if self.name.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(self.name) })
        }
    }
}

// Parameter data types
pub const OSSL_PARAM_INTEGER: c_uint = 1;
pub const OSSL_PARAM_UNSIGNED_INTEGER: c_uint = 2;
pub const OSSL_PARAM_REAL: c_uint = 3;
pub const OSSL_PARAM_UTF8_STRING: c_uint = 4;
pub const OSSL_PARAM_OCTET_STRING: c_uint = 5;
pub const OSSL_PARAM_UTF8_PTR: c_uint = 6;
pub const OSSL_PARAM_OCTET_PTR: c_uint = 7;

// Provider parameter names
pub const OSSL_PROV_PARAM_NAME: &[u8] = b"name\0";
pub const OSSL_PROV_PARAM_VERSION: &[u8] = b"version\0";
pub const OSSL_PROV_PARAM_BUILDINFO: &[u8] = b"buildinfo\0";

// Digest parameter names
pub const OSSL_DIGEST_PARAM_SIZE: &[u8] = b"size\0";
pub const OSSL_DIGEST_PARAM_BLOCK_SIZE: &[u8] = b"blocksize\0";

impl OsslParam {
    /// Create an end-of-array marker
    pub const fn end() -> Self {
        Self {
            key: ptr::null(),
            data_type: 0,
            data: ptr::null_mut(),
            data_size: 0,
            return_size: 0,
        }
    }

    /// Create a UTF8 string pointer parameter
    pub const fn construct_utf8_ptr(key: *const c_char, value: *mut *const c_char) -> Self {
        Self {
            key,
            data_type: OSSL_PARAM_UTF8_PTR,
            data: value as *mut c_void,
            data_size: 0,
            return_size: 0,
        }
    }

    /// Create a UTF8 string parameter backed by a caller buffer
    pub fn construct_utf8_string(key: *const c_char, value: *mut c_char, value_len: usize) -> Self {
        Self {
            key,
            data_type: OSSL_PARAM_UTF8_STRING,
            data: value as *mut c_void,
            data_size: value_len,
            return_size: 0,
        }
    }

    /// Create an integer parameter
    pub fn construct_int(key: *const c_char, value: *mut i32) -> Self {
        Self {
            key,
            data_type: OSSL_PARAM_INTEGER,
            data: value as *mut c_void,
            data_size: std::mem::size_of::<i32>(),
            return_size: 0,
        }
    }

    /// Create a size_t parameter (uses unsigned integer representation)
    pub fn construct_size_t(key: *const c_char, value: *mut usize) -> Self {
        Self {
            key,
            data_type: OSSL_PARAM_UNSIGNED_INTEGER,
            data: value as *mut c_void,
            data_size: std::mem::size_of::<usize>(),
            return_size: 0,
        }
    }

    /// Locate a parameter by key in an array
    pub unsafe fn locate(params: *mut OsslParam, key: *const c_char) -> *mut OsslParam {
        if params.is_null() || key.is_null() {
            return ptr::null_mut();
        }

        let mut p = params;
        while !(*p).key.is_null() {
            if libc::strcmp((*p).key, key) == 0 {
                return p;
            }
            p = p.add(1);
        }
        ptr::null_mut()
    }

    /// Set a UTF8 string pointer parameter value.
    /// The pointee must outlive the caller's use of it; the provider only
    /// ever hands out pointers to static storage. A null `data` is a size query.
    pub unsafe fn set_utf8_ptr(&mut self, value: &'static CStr) -> bool {
        if self.data_type != OSSL_PARAM_UTF8_PTR {
            return false;
        }

        self.return_size = value.to_bytes().len();
        let ptr_ref = self.data as *mut *const c_char;
        if !ptr_ref.is_null() {
            *ptr_ref = value.as_ptr();
        }
        true
    }

    /// Copy a string into a UTF8 string parameter's buffer.
    /// Truncates like strlcpy; `return_size` always carries the full length.
    /// A null buffer is a size query.
    pub unsafe fn set_utf8_string(&mut self, value: &CStr) -> bool {
        if self.data_type != OSSL_PARAM_UTF8_STRING {
            return false;
        }

        let src = value.to_bytes();
        self.return_size = src.len();
        if self.data.is_null() {
            return true;
        }

        let dst = std::slice::from_raw_parts_mut(self.data as *mut u8, self.data_size);
        ostr::strlcpy(dst, src);
        true
    }

    /// Set a string value on either string representation
    pub unsafe fn set_string(&mut self, value: &'static CStr) -> bool {
        match self.data_type {
            OSSL_PARAM_UTF8_PTR => self.set_utf8_ptr(value),
            OSSL_PARAM_UTF8_STRING => self.set_utf8_string(value),
            _ => false,
        }
    }

    /// Set a size_t parameter value (unsigned integer of 4 or 8 bytes)
    pub unsafe fn set_size_t(&mut self, value: usize) -> bool {
        if self.data_type != OSSL_PARAM_UNSIGNED_INTEGER || self.data.is_null() {
            return false;
        }

        match self.data_size {
            8 => {
                *(self.data as *mut u64) = value as u64;
                self.return_size = 8;
                true
            }
            4 => match u32::try_from(value) {
                Ok(v) => {
                    *(self.data as *mut u32) = v;
                    self.return_size = 4;
                    true
                }
                Err(_) => false,
            },
            _ => false,
        }
    }

    /// Get a UTF8 string pointer parameter value
    pub unsafe fn get_utf8_string_ptr(param: *const OsslParam) -> Option<*const c_char> {
        if param.is_null() {
            return None;
        }

        if (*param).data_type == OSSL_PARAM_UTF8_PTR {
            let ptr_ref = (*param).data as *const *const c_char;
            if ptr_ref.is_null() {
                return None;
            }
            Some(*ptr_ref)
        } else if (*param).data_type == OSSL_PARAM_UTF8_STRING {
            Some((*param).data as *const c_char)
        } else {
            None
        }
    }
}

/// Parameter types the provider advertises through get-param-types
pub static FIPS_PARAM_TYPES: [OsslItem; 4] = [
    OsslItem {
        id: OSSL_PARAM_UTF8_PTR,
        name: OSSL_PROV_PARAM_NAME.as_ptr() as *const c_char,
    },
    OsslItem {
        id: OSSL_PARAM_UTF8_PTR,
        name: OSSL_PROV_PARAM_VERSION.as_ptr() as *const c_char,
    },
    OsslItem {
        id: OSSL_PARAM_UTF8_PTR,
        name: OSSL_PROV_PARAM_BUILDINFO.as_ptr() as *const c_char,
    },
    OsslItem::end(),
];

/// Iterate an item list up to its null-name sentinel
pub unsafe fn items<'a>(list: *const OsslItem) -> impl Iterator<Item = &'a OsslItem> {
    let mut cur = list;
    std::iter::from_fn(move || unsafe {
        if cur.is_null() || (*cur).name.is_null() {
            return None;
        }
        let item = &*cur;
        cur = cur.add(1);
        Some(item)
    })
}
