// Build script: records the target triple and profile for the provider's
// build-info parameter.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=FIPS_PROV_BUILD_TARGET={}", target);
    println!("cargo:rustc-env=FIPS_PROV_BUILD_PROFILE={}", profile);
}
