//! Property tests for part sizing and compose planning.

use proptest::prelude::*;
use s3_transfer::transfer::{
    plan_parts, ComposeSource, PartSizing, ResolvedSource, MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE,
    MAX_PART_SIZE, MIN_PART_SIZE,
};

const MIB: u64 = 1024 * 1024;

proptest! {
    #[test]
    fn explicit_part_size_covers_object(
        object_size in 0u64..=(512 * MIB),
        part_size in MIN_PART_SIZE..=(64 * MIB),
    ) {
        let sizing = PartSizing::compute(Some(object_size), Some(part_size)).unwrap();
        let count = sizing.part_count.unwrap();

        prop_assert_eq!(sizing.part_size, part_size);
        prop_assert_eq!(u64::from(count), object_size.div_ceil(part_size).max(1));
        prop_assert!(count <= MAX_MULTIPART_COUNT);

        let total: u64 = (1..=count).map(|n| sizing.part_len(object_size, n)).sum();
        prop_assert_eq!(total, object_size);
        for n in 1..count {
            prop_assert_eq!(sizing.part_len(object_size, n), part_size);
        }
    }

    #[test]
    fn automatic_part_size_stays_within_limits(object_size in 0u64..=MAX_OBJECT_SIZE) {
        let sizing = PartSizing::compute(Some(object_size), None).unwrap();
        let count = sizing.part_count.unwrap();

        prop_assert!(sizing.part_size >= MIN_PART_SIZE);
        prop_assert!(sizing.part_size <= MAX_PART_SIZE);
        prop_assert_eq!(sizing.part_size % MIN_PART_SIZE, 0);
        prop_assert!(count <= MAX_MULTIPART_COUNT);
        prop_assert!(u64::from(count) * sizing.part_size >= object_size);
    }

    #[test]
    fn compose_plan_respects_part_limits(
        pieces in prop::collection::vec((0u64..3, MIN_PART_SIZE..=MAX_PART_SIZE), 1..6),
        last in 1u64..=(64 * MIB),
    ) {
        // Full 5 GiB pieces plus a remainder that is itself a valid part.
        let sizes: Vec<u64> = pieces
            .iter()
            .map(|(full, rest)| full * MAX_PART_SIZE + rest)
            .collect();
        let mut sources: Vec<ResolvedSource> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                ResolvedSource::new(ComposeSource::new("bucket", format!("src-{}", i)), *size, None)
            })
            .collect();
        sources.push(ResolvedSource::new(ComposeSource::new("bucket", "tail"), last, None));

        let plan = plan_parts(&sources).unwrap();
        let expected_total: u64 = sizes.iter().sum::<u64>() + last;

        prop_assert_eq!(plan.total_size, expected_total);
        prop_assert_eq!(plan.parts.iter().map(|p| p.size).sum::<u64>(), expected_total);
        prop_assert!(plan.parts.len() <= MAX_MULTIPART_COUNT as usize);

        let (final_part, interior) = plan.parts.split_last().unwrap();
        prop_assert_eq!(final_part.size, last);
        for (index, part) in interior.iter().enumerate() {
            prop_assert_eq!(part.part_number as usize, index + 1);
            prop_assert!(part.size >= MIN_PART_SIZE);
            prop_assert!(part.size <= MAX_PART_SIZE);
        }
    }
}
