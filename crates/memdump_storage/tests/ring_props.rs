//! Property tests for the framed ring.

use memdump_storage::{AppendOutcome, ShmNamespace, FRAME_HEADER_SIZE};
use proptest::prelude::*;

proptest! {
    /// Whatever is readable after a flush is an in-order suffix of what was
    /// appended, and nothing is torn.
    #[test]
    fn readable_region_is_a_suffix_of_appends(
        capacity in 32usize..512,
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..64),
    ) {
        let ns = ShmNamespace::new();
        let writer = ns.create("/prop", capacity).unwrap();
        let reader = ns.open_read("/prop").unwrap();

        let mut stored = Vec::new();
        let mut total = 0u64;
        for payload in &payloads {
            if let AppendOutcome::Stored { .. } = writer.append(payload) {
                stored.push(payload.clone());
                total += (FRAME_HEADER_SIZE + payload.len()) as u64;
            }
        }
        writer.flush();

        prop_assert_eq!(writer.bytes_written(), total.min(capacity as u64));

        let read: Vec<Vec<u8>> = reader.read_from(0).map(|f| f.unwrap().payload).collect();
        prop_assert!(read.len() <= stored.len());
        let suffix = &stored[stored.len() - read.len()..];
        prop_assert_eq!(&read[..], suffix);
    }

    /// Reading in two passes around further writes never yields a frame twice.
    #[test]
    fn two_pass_read_has_no_duplicates(
        first in 1usize..20,
        second in 0usize..20,
    ) {
        let ns = ShmNamespace::new();
        let writer = ns.create("/prop", 4096).unwrap();
        let reader = ns.open_read("/prop").unwrap();

        for i in 0..first {
            writer.append(&(i as u32).to_le_bytes());
        }
        writer.flush();

        let mut pass = reader.read_from(0);
        let mut seen: Vec<u32> = pass
            .by_ref()
            .map(|f| u32::from_le_bytes(f.unwrap().payload.try_into().unwrap()))
            .collect();
        let resume = pass.position();

        for i in first..first + second {
            writer.append(&(i as u32).to_le_bytes());
        }
        writer.flush();
        seen.extend(
            reader
                .read_from(resume)
                .map(|f| u32::from_le_bytes(f.unwrap().payload.try_into().unwrap())),
        );

        let expected: Vec<u32> = (0..(first + second) as u32).collect();
        prop_assert_eq!(seen, expected);
    }
}
