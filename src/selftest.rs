// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Load-time known-answer test

use crate::error::ProviderError;
use crate::fetch;
use crate::provider::ProviderContext;
use once_cell::sync::Lazy;

const SHA256_KAT_MESSAGE: &[u8] = b"Hello World!";
const SHA256_KAT_DIGEST: &str = "7f83b1657ff1fc53b92dc18148a1d65dfc2d4b1fa3d677284addd200126d9069";

/// A digest algorithm and the output it must produce for `message`
#[derive(Debug, Clone)]
pub struct KnownAnswer {
    pub algorithm: &'static str,
    pub message: &'static [u8],
    pub expected: Vec<u8>,
}

impl KnownAnswer {
    /// An undecodable expectation stays empty and can never match
    pub fn from_hex(algorithm: &'static str, message: &'static [u8], expected_hex: &str) -> Self {
        let expected = decode_expected(expected_hex).unwrap_or_else(|e| {
            log::error!("KnownAnswer {}: {}", algorithm, e);
            Vec::new()
        });
        Self { algorithm, message, expected }
    }
}

/// Decode an expected digest, reporting the offset of the first bad digit
/// (or the string length when the digit count is odd)
pub(crate) fn decode_expected(expected_hex: &str) -> Result<Vec<u8>, ProviderError> {
    hex::decode(expected_hex).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { index, .. } => ProviderError::InvalidHex(index),
        _ => ProviderError::InvalidHex(expected_hex.len()),
    })
}

pub static SHA256_KAT: Lazy<KnownAnswer> =
    Lazy::new(|| KnownAnswer::from_hex("SHA256", SHA256_KAT_MESSAGE, SHA256_KAT_DIGEST));

/// Run `kat` through this instance's own dispatch path
pub unsafe fn run(ctx: &ProviderContext, kat: &KnownAnswer) -> Result<(), ProviderError> {
    log::trace!("selftest::run algorithm={}", kat.algorithm);

    let md = fetch::fetch_digest(ctx, kat.algorithm)?;
    let actual = md.compute(kat.message)?;

    if actual != kat.expected {
        return Err(ProviderError::SelfTestMismatch { algorithm: kat.algorithm });
    }

    log::debug!("selftest::run({}) -> passed", kat.algorithm);
    Ok(())
}
