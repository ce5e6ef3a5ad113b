//! Run-length encoding of binary bitmaps.
//!
//! A bitmap is flattened row-major and emitted as `<count><tag>` tokens with no
//! separator, where tag `A` is a run of 0 and `B` is a run of 1. Runs longer
//! than `2^max_run_bits - 1` are split into several tokens of the same tag.

use image::GrayImage;
use thiserror::Error;

const ZERO_TAG: char = 'A';
const ONE_TAG: char = 'B';

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RleError {
    #[error("max_run_bits must be in 1..=32, got {0}")]
    InvalidRunBits(u32),
    #[error("token at byte {offset} has no run count")]
    MissingCount { offset: usize },
    #[error("token at byte {offset} has a zero run count")]
    ZeroCount { offset: usize },
    #[error("run count at byte {offset} is too large to expand")]
    CountOverflow { offset: usize },
    #[error("run at byte {offset} decodes past {limit} bits")]
    TooLong { offset: usize, limit: usize },
    #[error("unknown tag {tag:?} at byte {offset}")]
    UnknownTag { tag: char, offset: usize },
    #[error("input ends with a run count but no tag")]
    TrailingCount,
}

/// Longest run a single token may carry.
pub fn max_run_len(max_run_bits: u32) -> Result<u64, RleError> {
    if !(1..=32).contains(&max_run_bits) {
        return Err(RleError::InvalidRunBits(max_run_bits));
    }
    Ok((1u64 << max_run_bits) - 1)
}

/// Encode a sequence of bits. Any non-zero value counts as 1.
///
/// Empty input encodes to the empty string.
pub fn encode<I>(bits: I, max_run_bits: u32) -> Result<String, RleError>
where
    I: IntoIterator<Item = u8>,
{
    let cap = max_run_len(max_run_bits)?;
    let mut out = String::new();
    let mut current: Option<(u8, u64)> = None;

    for bit in bits {
        let bit = u8::from(bit != 0);
        current = match current {
            Some((value, count)) if value == bit && count < cap => Some((value, count + 1)),
            Some((value, count)) => {
                push_token(&mut out, value, count);
                Some((bit, 1))
            }
            None => Some((bit, 1)),
        };
    }

    if let Some((value, count)) = current {
        push_token(&mut out, value, count);
    }

    Ok(out)
}

fn push_token(out: &mut String, value: u8, count: u64) {
    out.push_str(&count.to_string());
    out.push(if value == 0 { ZERO_TAG } else { ONE_TAG });
}

/// Expand an encoded string back into bits.
pub fn decode(encoded: &str) -> Result<Vec<u8>, RleError> {
    decode_inner(encoded, None)
}

/// Like [`decode`], but fails as soon as the output would exceed `limit` bits.
///
/// Use this for encodings read from storage, where the expected frame size is
/// known.
pub fn decode_limited(encoded: &str, limit: usize) -> Result<Vec<u8>, RleError> {
    decode_inner(encoded, Some(limit))
}

fn decode_inner(encoded: &str, limit: Option<usize>) -> Result<Vec<u8>, RleError> {
    let mut bits: Vec<u8> = Vec::new();
    let mut count: Option<u64> = None;
    let mut token_start = 0;

    for (offset, c) in encoded.char_indices() {
        if let Some(digit) = c.to_digit(10) {
            if count.is_none() {
                token_start = offset;
            }
            let next = count
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|n| n.checked_add(u64::from(digit)))
                .ok_or(RleError::CountOverflow {
                    offset: token_start,
                })?;
            count = Some(next);
            continue;
        }

        let value = match c {
            ZERO_TAG => 0,
            ONE_TAG => 1,
            tag => return Err(RleError::UnknownTag { tag, offset }),
        };
        let run = match count.take() {
            None => return Err(RleError::MissingCount { offset }),
            Some(0) => {
                return Err(RleError::ZeroCount {
                    offset: token_start,
                })
            }
            Some(n) => n,
        };
        let overflow = RleError::CountOverflow {
            offset: token_start,
        };
        let run = usize::try_from(run).map_err(|_| overflow.clone())?;
        if let Some(limit) = limit {
            if run > limit - bits.len() {
                return Err(RleError::TooLong {
                    offset: token_start,
                    limit,
                });
            }
        }
        bits.try_reserve(run).map_err(|_| overflow)?;
        bits.resize(bits.len() + run, value);
    }

    if count.is_some() {
        return Err(RleError::TrailingCount);
    }

    Ok(bits)
}

/// Threshold a grayscale image into row-major bits: `< threshold` is 0, otherwise 1.
///
/// The transform step already produces a {0, 255} image, so on that input this
/// pass changes nothing; it is kept so the codec accepts arbitrary grayscale.
pub fn binarize(image: &GrayImage, threshold: u8) -> impl Iterator<Item = u8> + '_ {
    image.pixels().map(move |p| u8::from(p.0[0] >= threshold))
}
