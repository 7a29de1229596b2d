//! Key tokenization and decorated-key construction.
//!
//! Every primary key is hashed with **Murmur3 x64-128** (seed `0`); the
//! first 64-bit half (`h1`) becomes a signed *token*. Tokens give the
//! engine a fixed-width, well-distributed sort prefix regardless of the
//! primary key's own type or length.
//!
//! A **decorated key** is the sort/hash key actually stored in memtables
//! and SSTables: the token, sign-flipped and big-endian encoded, followed
//! by the raw primary-key bytes. Sign-flipping the token's high bit before
//! encoding makes big-endian byte-lexicographic order agree with signed
//! token order — two's-complement negative tokens would otherwise sort
//! *after* positive ones under a plain byte compare.

#[cfg(test)]
mod tests;

use crate::codec;

/// Number of bytes a decorated key spends on the token prefix.
pub const TOKEN_LEN: usize = 8;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
fn rotate_left_64(value: u64, bits: u32) -> u64 {
    value.rotate_left(bits)
}

#[inline]
fn final_mix_64(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^= hash >> 33;
    hash
}

#[inline]
fn read_block_64(p: &[u8]) -> u64 {
    u64::from_le_bytes(p[..8].try_into().expect("8-byte block"))
}

/// Hashes `bytes` with Murmur3 x64-128 (seed 0) and returns the first
/// 64-bit half (`h1`), reinterpreted as a signed token.
pub fn murmur3_token(bytes: &[u8]) -> i64 {
    let len = bytes.len();
    let nblocks = len / 16;

    let mut h1: u64 = 0;
    let mut h2: u64 = 0;

    for i in 0..nblocks {
        let block_bytes = &bytes[i * 16..i * 16 + 16];
        let mut block = read_block_64(&block_bytes[0..8]);
        let mut block2 = read_block_64(&block_bytes[8..16]);

        block = block.wrapping_mul(C1);
        block = rotate_left_64(block, 31);
        block = block.wrapping_mul(C2);
        h1 ^= block;

        h1 = rotate_left_64(h1, 27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        block2 = block2.wrapping_mul(C2);
        block2 = rotate_left_64(block2, 33);
        block2 = block2.wrapping_mul(C1);
        h2 ^= block2;

        h2 = rotate_left_64(h2, 31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &bytes[nblocks * 16..];
    let mut tail_first8: u64 = 0;
    let mut tail_next8: u64 = 0;

    let rem = len & 15;
    if rem >= 9 {
        for i in (8..rem).rev() {
            tail_next8 ^= (tail[i] as u64) << (8 * (i - 8));
        }
        tail_next8 = tail_next8.wrapping_mul(C2);
        tail_next8 = rotate_left_64(tail_next8, 33);
        tail_next8 = tail_next8.wrapping_mul(C1);
        h2 ^= tail_next8;
    }
    if rem >= 1 {
        let first_len = rem.min(8);
        for i in (0..first_len).rev() {
            tail_first8 ^= (tail[i] as u64) << (8 * i);
        }
        tail_first8 = tail_first8.wrapping_mul(C1);
        tail_first8 = rotate_left_64(tail_first8, 31);
        tail_first8 = tail_first8.wrapping_mul(C2);
        h1 ^= tail_first8;
    }

    h1 ^= len as u64;
    h2 ^= len as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = final_mix_64(h1);
    h2 = final_mix_64(h2);

    h1 = h1.wrapping_add(h2);

    h1 as i64
}

/// Sign-flips the token's high bit so big-endian byte order agrees with
/// signed integer order, then returns the 8-byte big-endian encoding.
pub fn sign_flipped_token_be(token: i64) -> [u8; 8] {
    let flipped = (token as u64) ^ (1u64 << 63);
    flipped.to_be_bytes()
}

/// Recovers the signed token from its sign-flipped big-endian encoding.
pub fn token_from_sign_flipped_be(bytes: [u8; 8]) -> i64 {
    let flipped = u64::from_be_bytes(bytes);
    (flipped ^ (1u64 << 63)) as i64
}

/// Builds the decorated key for `pk_bytes`: the sign-flipped, big-endian
/// Murmur3 token followed by the raw primary-key bytes.
pub fn decorated_key_bytes(pk_bytes: &[u8]) -> Vec<u8> {
    let token = murmur3_token(pk_bytes);
    let mut out = Vec::with_capacity(TOKEN_LEN + pk_bytes.len());
    out.extend_from_slice(&sign_flipped_token_be(token));
    out.extend_from_slice(pk_bytes);
    out
}

/// Strips the 8-byte token prefix from a decorated key, returning the
/// original primary-key bytes. Panics if `decorated` is shorter than
/// [`TOKEN_LEN`] — every decorated key produced by this module is at
/// least that long.
pub fn pk_bytes_from_decorated(decorated: &[u8]) -> &[u8] {
    &decorated[TOKEN_LEN..]
}

/// Splits a decorated key into its `(token_bytes, pk_bytes)` halves,
/// propagating a [`codec::CodecError`] if it is shorter than
/// [`TOKEN_LEN`] — used when decorated keys arrive from untrusted
/// sources such as a corrupted SSTable.
pub fn split_decorated(decorated: &[u8]) -> Result<(&[u8], &[u8]), codec::CodecError> {
    if decorated.len() < TOKEN_LEN {
        return Err(codec::CodecError::UnexpectedEof {
            needed: TOKEN_LEN,
            available: decorated.len(),
        });
    }
    Ok((&decorated[..TOKEN_LEN], &decorated[TOKEN_LEN..]))
}
