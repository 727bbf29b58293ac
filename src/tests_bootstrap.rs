// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end load tests
//!
//! Drive the provider the way a host does: hand it a capability table,
//! read back its table, query it, re-enter it and tear it down.

#[cfg(test)]
mod bootstrap_tests {
    use crate::core_bindings::*;
    use crate::dispatch::*;
    use crate::error::*;
    use crate::ossl_param::*;
    use crate::provider::ProviderContext;
    use crate::selftest::SHA256_KAT;
    use crate::testutil::{self, FakeHost, HOST_HANDLE};
    use std::collections::BTreeSet;
    use std::ffi::CStr;
    use std::os::raw::{c_char, c_int, c_void};
    use std::ptr;

    unsafe fn loaded_context<'a>(provctx: *mut c_void) -> &'a ProviderContext {
        ProviderContext::from_raw(provctx).unwrap()
    }

    fn table_ids(table: *const OsslDispatch) -> BTreeSet<c_int> {
        unsafe { dispatch_entries(table) }.map(|e| e.function_id).collect()
    }

    // =========================================================================
    // FULL LOAD SCENARIO
    // =========================================================================
    mod scenario_tests {
        use super::*;

        #[test]
        fn test_load_query_teardown() {
            testutil::reset();
            let host = FakeHost::full_table();
            unsafe {
                let (out, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                assert_eq!(out, FIPS_DISPATCH_TABLE.as_ptr());
                assert_eq!(
                    table_ids(out),
                    BTreeSet::from([
                        OSSL_FUNC_PROVIDER_TEARDOWN,
                        OSSL_FUNC_PROVIDER_GET_PARAM_TYPES,
                        OSSL_FUNC_PROVIDER_GET_PARAMS,
                        OSSL_FUNC_PROVIDER_QUERY_OPERATION,
                    ])
                );

                let fns = ProviderDispatch::from_dispatch(out);
                let query = fns.query_operation.unwrap();
                let mut no_cache: c_int = 1;
                let list = query(provctx, OSSL_OP_DIGEST, &mut no_cache);
                assert_eq!(no_cache, 0);

                let algs: Vec<&OsslAlgorithm> = algorithms(list).collect();
                assert_eq!(algs.len(), 1);
                assert_eq!(algs[0].names().unwrap().to_bytes(), b"SHA256");
                assert_eq!(algs[0].properties().unwrap().to_bytes(), b"fips=yes");

                let types = (fns.get_param_types.unwrap())(provctx);
                let names: Vec<&[u8]> = items(types).filter_map(|i| i.name()).map(|n| n.to_bytes()).collect();
                assert_eq!(names, vec![&b"name"[..], &b"version"[..], &b"buildinfo"[..]]);

                (fns.teardown.unwrap())(provctx);
            }
            let c = testutil::counters();
            assert_eq!(c.allocs, c.frees);
            assert_eq!(c.put_errors, 0);
        }

        #[test]
        fn test_context_keeps_handle_and_bindings() {
            let host = FakeHost::full_table();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                let ctx = loaded_context(provctx);
                assert_eq!(ctx.handle, HOST_HANDLE);
                assert_eq!(ctx.core.bound_ids(), FakeHost::capability_ids());

                let mut version: *const c_char = ptr::null();
                let mut params = [
                    OsslParam::construct_utf8_ptr(testutil::CORE_PARAM_VERSION.as_ptr() as *const c_char, &mut version),
                    OsslParam::end(),
                ];
                ctx.core_get_params(params.as_mut_ptr()).unwrap();
                assert_eq!(CStr::from_ptr(version), testutil::CORE_VERSION);

                crate::fips_teardown(provctx);
            }
        }

        #[test]
        fn test_independent_instances() {
            let host = FakeHost::full_table();
            unsafe {
                let (_, a) = testutil::load(&host, &SHA256_KAT).unwrap();
                let (_, b) = testutil::load(&host, &SHA256_KAT).unwrap();
                assert_ne!(a, b);

                crate::fips_teardown(a);
                // the other instance is unaffected
                let mut out: *const OsslDispatch = ptr::null();
                let mut provctx = b;
                assert_eq!(crate::fips_intern_provider_init(HOST_HANDLE, ptr::null(), &mut out, &mut provctx), 1);
                crate::fips_teardown(b);
            }
        }
    }

    // =========================================================================
    // CAPABILITY RESOLUTION (unknown ids, sentinel)
    // =========================================================================
    mod resolution_tests {
        use super::*;

        #[test]
        fn test_unknown_ids_and_order_do_not_matter() {
            testutil::reset();
            let noisy = FakeHost::noisy_table();
            unsafe {
                let (out, provctx) = testutil::load(&noisy, &SHA256_KAT).unwrap();
                assert_eq!(out, FIPS_DISPATCH_TABLE.as_ptr());

                let ctx = loaded_context(provctx);
                assert_eq!(ctx.core.bound_ids(), FakeHost::capability_ids());

                // first non-null put-error entry is the one bound
                ctx.report(&ProviderError::InvalidContext, crate::site!());
                crate::fips_teardown(provctx);
            }
            let c = testutil::counters();
            assert_eq!(c.put_errors, 1);
            assert_eq!(c.other_calls, 0);
            assert_eq!(c.allocs, c.frees);
        }

        #[test]
        fn test_entries_after_sentinel_are_ignored() {
            testutil::reset();
            let host = [
                OsslDispatch::new(OSSL_FUNC_CORE_PUT_ERROR, testutil::put_error_stub as *mut c_void),
                OsslDispatch::end(),
                OsslDispatch::new(OSSL_FUNC_CRYPTO_ZALLOC, testutil::zalloc_stub as *mut c_void),
                OsslDispatch::new(OSSL_FUNC_CRYPTO_FREE, testutil::free_stub as *mut c_void),
            ];
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                let ctx = loaded_context(provctx);
                assert_eq!(ctx.core.bound_ids(), vec![OSSL_FUNC_CORE_PUT_ERROR]);
                assert_eq!(ctx.origin(), crate::mem::Origin::Local);
                crate::fips_teardown(provctx);
            }
            assert_eq!(testutil::counters().allocs, 0);
        }

        #[test]
        fn test_empty_and_null_host_tables_load() {
            let empty = [OsslDispatch::end()];
            unsafe {
                let (_, a) = testutil::load(&empty, &SHA256_KAT).unwrap();
                crate::fips_teardown(a);

                let mut out: *const OsslDispatch = ptr::null();
                let mut provctx: *mut c_void = ptr::null_mut();
                assert_eq!(crate::OSSL_provider_init(ptr::null(), ptr::null(), &mut out, &mut provctx), 1);
                crate::fips_teardown(provctx);
            }
        }
    }

    // =========================================================================
    // SELF-TEST GATE
    // =========================================================================
    mod selftest_gate_tests {
        use super::*;

        #[test]
        fn test_kat_mismatch_fails_load_without_leaks() {
            testutil::reset();
            let host = FakeHost::full_table();
            let mut wrong = SHA256_KAT.clone();
            wrong.expected[0] ^= 0xff;

            let sentinel = 0x1usize as *mut c_void;
            let mut out: *const OsslDispatch = ptr::null();
            let mut provctx = sentinel;
            let rc = unsafe {
                crate::provider_init_with(HOST_HANDLE, host.as_ptr(), &mut out, &mut provctx, &wrong)
            };
            assert_eq!(rc, 0);
            assert!(out.is_null());
            assert_eq!(provctx, sentinel);

            let c = testutil::counters();
            assert_eq!(c.allocs, 2);
            assert_eq!(c.allocs, c.frees);
            assert_eq!(testutil::last_error(), Some((ERR_LIB_PROV, PROV_R_SELF_TEST_KAT_FAILURE)));
            assert_eq!(testutil::last_error_data().len(), 1);
        }

        #[test]
        fn test_context_allocation_failure() {
            testutil::reset();
            testutil::fail_alloc_after(0);
            let host = FakeHost::full_table();
            unsafe {
                assert!(testutil::load(&host, &SHA256_KAT).is_none());
            }
            let c = testutil::counters();
            assert_eq!(c.allocs, 0);
            assert_eq!(c.frees, 0);
            assert_eq!(testutil::last_error(), Some((ERR_LIB_PROV, PROV_R_ALLOCATION_FAILED)));
        }

        #[test]
        fn test_digest_allocation_failure_releases_context() {
            testutil::reset();
            testutil::fail_alloc_after(1);
            let host = FakeHost::full_table();
            unsafe {
                assert!(testutil::load(&host, &SHA256_KAT).is_none());
            }
            let c = testutil::counters();
            assert_eq!(c.allocs, 1);
            assert_eq!(c.frees, 1);
            assert_eq!(testutil::last_error(), Some((ERR_LIB_PROV, PROV_R_DIGEST_FAILED)));
        }

        #[test]
        fn test_self_test_wipes_digest_state() {
            testutil::reset();
            let host = FakeHost::full_table();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                assert_eq!(testutil::counters().clear_frees, 1);
                crate::fips_teardown(provctx);
            }
        }
    }

    // =========================================================================
    // RECURSIVE ENTRY
    // =========================================================================
    mod recursive_tests {
        use super::*;

        #[test]
        fn test_nested_init_reuses_context() {
            testutil::reset();
            let host = FakeHost::full_table();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                let before = testutil::counters();

                let mut out: *const OsslDispatch = ptr::null();
                let mut nested = provctx;
                let rc = crate::fips_intern_provider_init(HOST_HANDLE, host.as_ptr(), &mut out, &mut nested);
                assert_eq!(rc, 1);
                assert_eq!(nested, provctx);
                assert_eq!(out, INTERN_DISPATCH_TABLE.as_ptr());
                assert_eq!(table_ids(out), BTreeSet::from([OSSL_FUNC_PROVIDER_QUERY_OPERATION]));
                assert_eq!(testutil::counters(), before);

                let query = ProviderDispatch::from_dispatch(out).query_operation.unwrap();
                assert_eq!(query(nested, OSSL_OP_DIGEST, ptr::null_mut()), FIPS_DIGESTS.as_ptr());

                crate::fips_teardown(provctx);
            }
        }

        #[test]
        fn test_fetch_through_loaded_instance() {
            testutil::reset();
            let host = FakeHost::full_table();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                let md = crate::fetch::fetch_digest(loaded_context(provctx), "SHA256").unwrap();
                assert_eq!(md.compute(SHA256_KAT.message).unwrap(), SHA256_KAT.expected);
                crate::fips_teardown(provctx);
            }
            let c = testutil::counters();
            assert_eq!(c.allocs, c.frees);
        }
    }

    // =========================================================================
    // QUERY AND PARAMETERS
    // =========================================================================
    mod query_param_tests {
        use super::*;

        #[test]
        fn test_query_is_deterministic_and_allocation_free() {
            testutil::reset();
            let host = FakeHost::full_table();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                let before = testutil::counters();

                let first = crate::fips_query_operation(provctx, OSSL_OP_DIGEST, ptr::null_mut());
                for _ in 0..10 {
                    assert_eq!(crate::fips_query_operation(provctx, OSSL_OP_DIGEST, ptr::null_mut()), first);
                }
                for op in [OSSL_OP_CIPHER, OSSL_OP_MAC, OSSL_OP_KDF, OSSL_OP_KEYMGMT, OSSL_OP_KEYEXCH,
                           OSSL_OP_SIGNATURE, OSSL_OP_ASYM_CIPHER, 0, 77] {
                    let mut no_cache: c_int = 1;
                    assert!(crate::fips_query_operation(provctx, op, &mut no_cache).is_null());
                    assert_eq!(no_cache, 0);
                }
                assert_eq!(testutil::counters(), before);

                crate::fips_teardown(provctx);
            }
        }

        #[test]
        fn test_get_params_fills_known_and_skips_unknown() {
            let mut name: *const c_char = ptr::null();
            let mut version: *const c_char = ptr::null();
            let mut buildinfo = [0u8; 128];
            let mut untouched: i32 = 42;
            let mut params = [
                OsslParam::construct_int(b"status\0".as_ptr() as *const c_char, &mut untouched),
                OsslParam::construct_utf8_ptr(OSSL_PROV_PARAM_NAME.as_ptr() as *const c_char, &mut name),
                OsslParam::construct_utf8_ptr(OSSL_PROV_PARAM_VERSION.as_ptr() as *const c_char, &mut version),
                OsslParam::construct_utf8_string(
                    OSSL_PROV_PARAM_BUILDINFO.as_ptr() as *const c_char,
                    buildinfo.as_mut_ptr() as *mut c_char,
                    buildinfo.len(),
                ),
                OsslParam::end(),
            ];
            unsafe {
                assert_eq!(crate::fips_get_params(ptr::null_mut(), params.as_mut_ptr()), 1);
                assert_eq!(CStr::from_ptr(name), crate::PROVIDER_NAME);
                assert_eq!(CStr::from_ptr(version), crate::PROVIDER_VERSION);
                let copied = CStr::from_bytes_until_nul(&buildinfo).unwrap();
                assert_eq!(copied, crate::PROVIDER_BUILDINFO);
            }
            assert_eq!(untouched, 42);
            assert_eq!(params[0].return_size, 0);
            assert_eq!(params[3].return_size, crate::PROVIDER_BUILDINFO.to_bytes().len());
        }

        #[test]
        fn test_get_params_type_mismatch_fails_fast() {
            let mut name: *const c_char = ptr::null();
            let mut version: i32 = 0;
            let mut buildinfo: *const c_char = ptr::null();
            let mut params = [
                OsslParam::construct_utf8_ptr(OSSL_PROV_PARAM_BUILDINFO.as_ptr() as *const c_char, &mut buildinfo),
                OsslParam::construct_int(OSSL_PROV_PARAM_VERSION.as_ptr() as *const c_char, &mut version),
                OsslParam::construct_utf8_ptr(OSSL_PROV_PARAM_NAME.as_ptr() as *const c_char, &mut name),
                OsslParam::end(),
            ];
            unsafe {
                assert_eq!(crate::fips_get_params(ptr::null_mut(), params.as_mut_ptr()), 0);
            }
            // name is handled before version, buildinfo after it
            assert!(!name.is_null());
            assert_eq!(version, 0);
            assert!(buildinfo.is_null());
        }

        #[test]
        fn test_get_params_truncates_small_buffer() {
            let mut small = [0x55u8; 5];
            let mut params = [
                OsslParam::construct_utf8_string(
                    OSSL_PROV_PARAM_NAME.as_ptr() as *const c_char,
                    small.as_mut_ptr() as *mut c_char,
                    small.len(),
                ),
                OsslParam::end(),
            ];
            unsafe {
                assert_eq!(crate::fips_get_params(ptr::null_mut(), params.as_mut_ptr()), 1);
            }
            assert_eq!(&small, b"FIPS\0");
            assert_eq!(params[0].return_size, crate::PROVIDER_NAME.to_bytes().len());
        }
    }

    // =========================================================================
    // TEARDOWN AND ALLOCATOR SYMMETRY
    // =========================================================================
    mod teardown_tests {
        use super::*;

        #[test]
        fn test_repeated_cycles_balance() {
            testutil::reset();
            let host = FakeHost::full_table();
            unsafe {
                for _ in 0..10 {
                    let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                    crate::fips_teardown(provctx);
                }
            }
            let c = testutil::counters();
            assert_eq!(c.allocs, 20);
            assert_eq!(c.frees, 20);
        }

        #[test]
        fn test_teardown_without_host_allocator() {
            let host = FakeHost::table_without(&[
                OSSL_FUNC_CRYPTO_MALLOC,
                OSSL_FUNC_CRYPTO_ZALLOC,
                OSSL_FUNC_CRYPTO_MEMDUP,
                OSSL_FUNC_CRYPTO_STRDUP,
                OSSL_FUNC_CRYPTO_STRNDUP,
                OSSL_FUNC_CRYPTO_REALLOC,
                OSSL_FUNC_CRYPTO_CLEAR_REALLOC,
            ]);
            testutil::reset();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                assert_eq!(loaded_context(provctx).origin(), crate::mem::Origin::Local);
                crate::fips_teardown(provctx);
            }
            assert_eq!(testutil::counters().frees, 0);
        }

        #[test]
        fn test_malloc_only_host_is_used_for_contexts() {
            let host = FakeHost::table_without(&[OSSL_FUNC_CRYPTO_ZALLOC]);
            testutil::reset();
            unsafe {
                let (_, provctx) = testutil::load(&host, &SHA256_KAT).unwrap();
                assert_eq!(loaded_context(provctx).origin(), crate::mem::Origin::Host);
                crate::fips_teardown(provctx);
            }
            let c = testutil::counters();
            assert_eq!(c.allocs, 2);
            assert_eq!(c.frees, 2);
        }
    }
}
