//! Latency histogram decoding.
//!
//! The engine reports I/O latency as a histogram: bucket lower bound in
//! nanoseconds mapped to the number of operations that fell in the bucket.
//! Buckets are half decade wide, so the estimated latency of a bucket is its
//! lower bound plus half the width of the band, `5 * 10^(decade - 1)`.
use std::collections::BTreeMap;
use log::*;

use crate::round_to;

/// Bucket boundary (as sent by the engine) to observation count.
pub type Histogram = BTreeMap<String, f64>;

/// The lowest bucket has no numeric boundary.
pub const LOW_BUCKET: &str = "< 10000";
const LOW_BUCKET_VALUE: f64 = 1000.;
const LOG_EPSILON: f64 = 1e-7;
const NANOSECONDS_PER_MILLISECOND: f64 = 1_000_000.;

/// Average latency in milliseconds, rounded to 2 digits.
///
/// Returns `None` when no bucket with a positive boundary has observations,
/// which is not the same as a latency of zero.
pub fn average_latency(histogram: &Histogram) -> Option<f64>
{
    let mut sum_count = 0.;
    let mut sum_latency = 0.;
    for (bucket, count) in histogram.iter().filter(|(_, count)| **count > 0.)
    {
        let boundary = if bucket == LOW_BUCKET
        {
            LOW_BUCKET_VALUE
        }
        else
        {
            match bucket.trim().parse::<f64>()
            {
                Ok(boundary) => boundary,
                Err(_) => {
                    debug!("skipping latency bucket {}: not a number", bucket);
                    continue;
                },
            }
        };
        if boundary <= 0. { continue };
        sum_count += count;
        sum_latency += bucket_midpoint(boundary) * count;
    }
    if sum_count == 0.
    {
        None
    }
    else
    {
        Some(round_to(sum_latency / sum_count / NANOSECONDS_PER_MILLISECOND, 2))
    }
}

fn bucket_midpoint(boundary: f64) -> f64
{
    // the epsilon keeps exact powers of ten from landing in the decade below
    let decade = (boundary.log10() + LOG_EPSILON).floor() as i32;
    boundary + 5. * 10_f64.powi(decade - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn histogram(buckets: &[(&str, f64)]) -> Histogram {
        buckets.iter().map(|(bucket, count)| (bucket.to_string(), *count)).collect()
    }

    #[test]
    fn midpoint_uses_half_decade() {
        assert_eq!(bucket_midpoint(1000.), 1500.);
        assert_eq!(bucket_midpoint(10000.), 15000.);
        assert_eq!(bucket_midpoint(20000000.), 25000000.);
    }

    #[test]
    fn mixed_buckets() {
        let latency = average_latency(&histogram(&[(LOW_BUCKET, 3.), ("100000", 2.), ("1000000", 5.)]));
        assert_eq!(latency, Some(0.78));
    }

    #[test]
    fn two_buckets_in_same_decade() {
        let latency = average_latency(&histogram(&[("10000000", 1.), ("20000000", 1.)]));
        assert_eq!(latency, Some(20.0));
    }

    #[test]
    fn no_observations_is_absent_not_zero() {
        assert_eq!(average_latency(&histogram(&[(LOW_BUCKET, 0.), ("100000", 0.)])), None);
        assert_eq!(average_latency(&Histogram::new()), None);
    }

    #[test]
    fn non_positive_and_garbage_buckets_are_skipped() {
        assert_eq!(average_latency(&histogram(&[("0", 10.), ("-5", 3.), ("abc", 4.)])), None);
        assert_eq!(average_latency(&histogram(&[("0", 10.), ("1000000", 4.)])), Some(1.5));
    }

    proptest! {
        #[test]
        fn positive_histograms_decode_to_finite_non_negative(
            buckets in prop::collection::btree_map(1u64..10_000_000_000, 1u32..100_000, 1..20)
        ) {
            let histogram: Histogram = buckets.iter().map(|(bucket, count)| (bucket.to_string(), f64::from(*count))).collect();
            let latency = average_latency(&histogram).unwrap();
            prop_assert!(latency.is_finite());
            prop_assert!(latency >= 0.);
        }
    }
}
