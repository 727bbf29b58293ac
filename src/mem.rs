// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Placement of provider objects
// Objects the provider hands to the host as opaque pointers live in host
// memory when the host supplied an allocator, otherwise in Rust's heap.
// The origin travels with the object so it is released the same way.

use crate::core_bindings::{CoreBindings, Site};
use crate::error::ProviderError;
use std::mem::{align_of, size_of};
use std::os::raw::c_void;
use std::ptr::{self, NonNull};

/// Which allocator an object came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Host,
    Local,
}

/// Move `value` into freshly allocated memory
pub unsafe fn place<T>(core: &CoreBindings, value: T, site: Site) -> Result<(NonNull<T>, Origin), ProviderError> {
    if !core.has_allocator() {
        let raw = Box::into_raw(Box::new(value));
        log::trace!("place: local {} bytes at {:p}", size_of::<T>(), raw);
        return Ok((NonNull::new_unchecked(raw), Origin::Local));
    }

    let size = size_of::<T>();
    let raw = match core.zalloc(size, site) {
        Err(ProviderError::MissingCapability(_)) => core.malloc(size, site)?,
        other => other?,
    };

    if (raw.as_ptr() as usize) % align_of::<T>() != 0 {
        let _ = core.free(raw.as_ptr(), site);
        return Err(ProviderError::Misaligned { align: align_of::<T>() });
    }

    let typed = raw.cast::<T>();
    ptr::write(typed.as_ptr(), value);
    log::trace!("place: host {} bytes at {:p}", size, typed.as_ptr());
    Ok((typed, Origin::Host))
}

/// Drop the object and give its memory back. With `wipe`, host memory is
/// released through clear_free so the bytes are cleansed first.
pub unsafe fn release<T>(core: &CoreBindings, obj: NonNull<T>, origin: Origin, wipe: bool, site: Site) {
    log::trace!("release: {:?} {:p} wipe={}", origin, obj.as_ptr(), wipe);

    match origin {
        Origin::Local => drop(Box::from_raw(obj.as_ptr())),
        Origin::Host => {
            ptr::drop_in_place(obj.as_ptr());
            let raw = obj.as_ptr() as *mut c_void;
            let freed = if wipe {
                core.clear_free(raw, size_of::<T>(), site)
                    .or_else(|_| core.free(raw, site))
            } else {
                core.free(raw, site)
            };
            if let Err(e) = freed {
                // Unreachable after CoreBindings::check accepted the table
                log::error!("release: {}", e);
            }
        }
    }
}
