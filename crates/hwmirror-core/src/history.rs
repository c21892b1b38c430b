//! # History Codec
//!
//! Packs a sequence of `(value, timestamp)` samples into a compact byte
//! payload and back.
//!
//! ## Payload Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Packed History Payload                           │
//! │                                                                         │
//! │  ┌──────────┬──────────────────────────────┬─────────────────────────┐ │
//! │  │ count    │ N × i64 time deltas          │ N × f32 values          │ │
//! │  │ i32 LE   │ byte-plane transposed (8)    │ byte-plane transposed(4)│ │
//! │  └──────────┴──────────────────────────────┴─────────────────────────┘ │
//! │                                                                         │
//! │  Delta[0] = t0 - 0, Delta[i] = ti - t(i-1)   (nanoseconds, LE)         │
//! │                                                                         │
//! │  Byte-plane transpose, stride 4, two records:                          │
//! │    a0 a1 a2 a3 b0 b1 b2 b3  ──►  a0 b0 a1 b1 a2 b2 a3 b3               │
//! │                                                                         │
//! │  Slowly varying high-order bytes end up next to each other, which the  │
//! │  deflate pass at the storage boundary squeezes well.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are nanoseconds since the Unix epoch, so the representable
//! range is roughly 1677..2262. Deltas use wrapping arithmetic and every
//! value bit pattern (NaN included) survives a round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// Width of one encoded timestamp delta.
pub const TIMESTAMP_STRIDE: usize = 8;

/// Width of one encoded value.
pub const VALUE_STRIDE: usize = 4;

const HEADER_LEN: usize = 4;

// =============================================================================
// Sensor Value
// =============================================================================

/// Immutable history sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorValue {
    value: f32,
    time: DateTime<Utc>,
}

impl SensorValue {
    /// Creates a sample.
    pub fn new(value: f32, time: DateTime<Utc>) -> Self {
        SensorValue { value, time }
    }

    /// Creates a gap marker (NaN) at `time`.
    pub fn gap(time: DateTime<Utc>) -> Self {
        SensorValue {
            value: f32::NAN,
            time,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Returns true for a gap marker.
    pub fn is_gap(&self) -> bool {
        self.value.is_nan()
    }
}

/// Bit-exact equality: two NaN samples with the same payload are equal.
impl PartialEq for SensorValue {
    fn eq(&self, other: &Self) -> bool {
        self.value.to_bits() == other.value.to_bits() && self.time == other.time
    }
}

impl Eq for SensorValue {}

// =============================================================================
// Byte-Plane Transpose
// =============================================================================

/// Groups bytes by their offset within each `stride`-wide record.
///
/// Lengths that are not a multiple of `stride` are allowed; the trailing
/// partial record contributes to the first planes only.
///
/// # Panics
/// If `stride` is zero.
pub fn transpose(bytes: &[u8], stride: usize) -> Vec<u8> {
    assert!(stride > 0, "transpose stride must be positive");
    let mut out = Vec::with_capacity(bytes.len());
    for offset in 0..stride {
        out.extend(bytes.iter().skip(offset).step_by(stride));
    }
    out
}

/// Exact inverse of [`transpose`] for the same `stride`.
///
/// # Panics
/// If `stride` is zero.
pub fn untranspose(bytes: &[u8], stride: usize) -> Vec<u8> {
    assert!(stride > 0, "transpose stride must be positive");
    let mut out = vec![0u8; bytes.len()];
    let mut source = bytes.iter();
    for offset in 0..stride {
        for slot in out.iter_mut().skip(offset).step_by(stride) {
            if let Some(byte) = source.next() {
                *slot = *byte;
            }
        }
    }
    out
}

// =============================================================================
// Pack / Unpack
// =============================================================================

fn to_nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt()
        .unwrap_or(if time.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

/// Packs samples into the payload described in the module docs.
///
/// # Panics
/// If `samples` holds more than `i32::MAX` entries.
pub fn pack(samples: &[SensorValue]) -> Vec<u8> {
    let count = match i32::try_from(samples.len()) {
        Ok(count) => count,
        Err(_) => panic!("history of {} samples exceeds the codec limit", samples.len()),
    };

    let mut deltas = Vec::with_capacity(samples.len() * TIMESTAMP_STRIDE);
    let mut values = Vec::with_capacity(samples.len() * VALUE_STRIDE);
    let mut previous = 0i64;
    for sample in samples {
        let nanos = to_nanos(sample.time);
        deltas.extend_from_slice(&nanos.wrapping_sub(previous).to_le_bytes());
        values.extend_from_slice(&sample.value.to_le_bytes());
        previous = nanos;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + deltas.len() + values.len());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend(transpose(&deltas, TIMESTAMP_STRIDE));
    out.extend(transpose(&values, VALUE_STRIDE));
    out
}

/// Decodes a payload produced by [`pack`].
pub fn unpack(bytes: &[u8]) -> Result<Vec<SensorValue>, HistoryError> {
    if bytes.len() < HEADER_LEN {
        return Err(HistoryError::Truncated { len: bytes.len() });
    }

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let count = i32::from_le_bytes(header);
    if count < 0 {
        return Err(HistoryError::NegativeCount(count));
    }

    let count = count as usize;
    let expected = count
        .checked_mul(TIMESTAMP_STRIDE + VALUE_STRIDE)
        .and_then(|body| body.checked_add(HEADER_LEN));
    if expected != Some(bytes.len()) {
        return Err(HistoryError::LengthMismatch {
            count,
            expected: expected.unwrap_or(usize::MAX),
            actual: bytes.len(),
        });
    }

    let split = HEADER_LEN + count * TIMESTAMP_STRIDE;
    let deltas = untranspose(&bytes[HEADER_LEN..split], TIMESTAMP_STRIDE);
    let values = untranspose(&bytes[split..], VALUE_STRIDE);

    let mut samples = Vec::with_capacity(count);
    let mut previous = 0i64;
    for (delta, value) in deltas
        .chunks_exact(TIMESTAMP_STRIDE)
        .zip(values.chunks_exact(VALUE_STRIDE))
    {
        let mut delta_bytes = [0u8; TIMESTAMP_STRIDE];
        delta_bytes.copy_from_slice(delta);
        let mut value_bytes = [0u8; VALUE_STRIDE];
        value_bytes.copy_from_slice(value);

        let nanos = previous.wrapping_add(i64::from_le_bytes(delta_bytes));
        previous = nanos;
        samples.push(SensorValue::new(
            f32::from_le_bytes(value_bytes),
            DateTime::from_timestamp_nanos(nanos),
        ));
    }

    Ok(samples)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_transpose_groups_planes() {
        let bytes = [0u8, 1, 2, 3, 4, 5, 6, 7];
        assert_eq!(transpose(&bytes, 4), vec![0, 4, 1, 5, 2, 6, 3, 7]);
        assert_eq!(untranspose(&transpose(&bytes, 4), 4), bytes.to_vec());
    }

    #[test]
    fn test_transpose_partial_record() {
        let bytes = [10u8, 11, 12, 13, 14];
        let shuffled = transpose(&bytes, 4);
        assert_eq!(shuffled, vec![10, 14, 11, 12, 13]);
        assert_eq!(untranspose(&shuffled, 4), bytes.to_vec());
    }

    #[test]
    fn test_empty_round_trip() {
        let packed = pack(&[]);
        assert_eq!(packed, vec![0, 0, 0, 0]);
        assert!(unpack(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_keeps_nan_bits() {
        let samples = vec![
            SensorValue::new(41.5, at(0)),
            SensorValue::gap(at(10)),
            SensorValue::new(-3.25, at(5)),
            SensorValue::new(f32::from_bits(0x7fc0_1234), at(20)),
        ];
        let decoded = unpack(&pack(&samples)).unwrap();
        assert_eq!(decoded, samples);
        assert_eq!(decoded[3].value().to_bits(), 0x7fc0_1234);
    }

    #[test]
    fn test_header_is_little_endian_count() {
        let samples = vec![SensorValue::new(1.0, at(0)); 3];
        let packed = pack(&samples);
        assert_eq!(&packed[..4], &[3, 0, 0, 0]);
        assert_eq!(packed.len(), 4 + 3 * 12);
    }

    #[test]
    fn test_unpack_rejects_corrupt_payloads() {
        assert_eq!(unpack(&[1, 0]), Err(HistoryError::Truncated { len: 2 }));
        assert_eq!(
            unpack(&(-1i32).to_le_bytes()),
            Err(HistoryError::NegativeCount(-1))
        );

        let mut packed = pack(&[SensorValue::new(1.0, at(0))]);
        packed.pop();
        assert!(matches!(unpack(&packed), Err(HistoryError::LengthMismatch { .. })));

        let huge = i32::MAX.to_le_bytes();
        assert!(matches!(unpack(&huge), Err(HistoryError::LengthMismatch { .. })));
    }
}
