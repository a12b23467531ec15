use super::helpers::{open_shared, rank_bytes, run_collective};
use sharedfp::{DataType, GlobalOffset, SharedFpConfig, negotiate};

#[tokio::test]
async fn test_four_ranks_equal_requests() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let p = path.clone();
    let results = run_collective(4, move |comm| {
        let path = p.clone();
        async move {
            let rank = comm.rank();
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            let status = file
                .write_ordered(&rank_bytes(rank, 100), 100, DataType::Byte)
                .await
                .unwrap();
            let global = file.global_offset().unwrap();
            file.close().await.unwrap();
            (status, global)
        }
    })
    .await;

    for (rank, (status, global)) in results.iter().enumerate() {
        assert_eq!(status.offset, rank as i64 * 100, "rank {rank} offset");
        assert_eq!(status.bytes, 100);
        assert_eq!(*global, 400, "rank {rank} global offset");
    }
    let contents = std::fs::read(&path).unwrap();
    let expected: Vec<u8> = (0..4).flat_map(|r| rank_bytes(r, 100)).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn test_zero_byte_request_after_prior_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let p = path.clone();
    let results = run_collective(2, move |comm| {
        let path = p.clone();
        async move {
            let rank = comm.rank();
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            file.write_ordered(&rank_bytes(rank, 200), 200, DataType::Byte)
                .await
                .unwrap();
            assert_eq!(file.global_offset(), Some(400));

            let len = if rank == 0 { 50 } else { 0 };
            let status = file
                .write_ordered(&rank_bytes(rank, len), len, DataType::Byte)
                .await
                .unwrap();
            let global = file.global_offset().unwrap();
            file.close().await.unwrap();
            (status.offset, global)
        }
    })
    .await;

    assert_eq!(results, vec![(400, 450), (450, 450)]);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 450);
}

#[tokio::test]
async fn test_global_offset_is_monotonic_and_ranges_never_reused() {
    // Per-round byte counts for each of 3 ranks.
    const ROUNDS: [[usize; 3]; 5] = [[3, 0, 5], [0, 0, 0], [1, 2, 3], [8, 1, 0], [0, 4, 4]];

    let results = run_collective(3, |comm| async move {
        let rank = comm.rank() as usize;
        let mut global = GlobalOffset::default();
        let mut seen = Vec::new();
        for round in ROUNDS {
            let before = global.get();
            let alloc = negotiate(&comm, &mut global, Ok(round[rank] as i64))
                .await
                .unwrap();
            assert!(global.get() >= before);
            assert_eq!(alloc.next_global_offset, global.get());
            seen.push((alloc.range(), global.get()));
        }
        seen
    })
    .await;

    let mut ranges: Vec<_> = results
        .iter()
        .flatten()
        .map(|(range, _)| range.clone())
        .filter(|r| !r.is_empty())
        .collect();
    ranges.sort_by_key(|r| r.start);
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap or overlap: {pair:?}");
    }
    let total: usize = ROUNDS.iter().flatten().sum();
    assert_eq!(ranges.last().unwrap().end, total as i64);

    // Every rank saw the same sequence of global offsets.
    let globals: Vec<Vec<i64>> = results
        .iter()
        .map(|r| r.iter().map(|(_, g)| *g).collect())
        .collect();
    assert!(globals.windows(2).all(|w| w[0] == w[1]));
}
