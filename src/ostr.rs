// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Bounded string copy into caller-owned buffers

/// Copy `src` into `dst`, truncating if needed and always NUL-terminating a
/// non-empty destination. `src` ends at its first NUL or at the end of the
/// slice. Returns the full length of `src` so callers can detect truncation.
pub fn strlcpy(dst: &mut [u8], src: &[u8]) -> usize {
    let src_len = src.iter().position(|&c| c == 0).unwrap_or(src.len());
    if dst.is_empty() {
        return src_len;
    }
    let n = src_len.min(dst.len() - 1);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n] = 0;
    src_len
}
