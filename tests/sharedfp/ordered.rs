use super::helpers::{open_shared, rank_bytes, run_collective};
use sharedfp::{
    AccessMode, DataType, Info, IoStatus, SharedFile, SharedFpConfig, SharedFpError,
};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_begin_twice_then_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let p = path.clone();
    run_collective(3, move |comm| {
        let path = p.clone();
        async move {
            let rank = comm.rank();
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            file.write_ordered_begin(&rank_bytes(rank, 4), 4, DataType::Byte)
                .await
                .unwrap();
            assert!(file.split_in_use());
            let global = file.global_offset();

            let err = file
                .write_ordered_begin(&rank_bytes(rank, 9), 9, DataType::Byte)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SharedFpError::ProtocolViolation(_)),
                "rank {rank}: {err}"
            );
            assert!(file.split_in_use());
            assert_eq!(file.global_offset(), global);

            let status = file.write_ordered_end().await.unwrap();
            assert_eq!(
                status,
                IoStatus {
                    offset: rank as i64 * 4,
                    bytes: 4
                }
            );
            assert!(!file.split_in_use());
            file.close().await.unwrap();
        }
    })
    .await;
    assert_eq!(std::fs::read(&path).unwrap(), b"aaaabbbbcccc");
}

#[tokio::test]
async fn test_new_begin_after_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let p = path.clone();
    let results = run_collective(2, move |comm| {
        let path = p.clone();
        async move {
            let rank = comm.rank();
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            let mut offsets = Vec::new();
            for round in 1..=3usize {
                let len = round * (rank as usize + 1);
                file.write_ordered_begin(&rank_bytes(rank, len), len, DataType::Byte)
                    .await
                    .unwrap();
                offsets.push(file.write_ordered_end().await.unwrap().offset);
                assert!(!file.split_in_use());
            }
            file.close().await.unwrap();
            offsets
        }
    })
    .await;

    // Rounds request (1,2), (2,4), (3,6) bytes.
    assert_eq!(results[0], vec![0, 3, 9]);
    assert_eq!(results[1], vec![1, 5, 12]);
    assert_eq!(std::fs::read(&path).unwrap(), b"abbaabbbbaaabbbbbb");
}

#[tokio::test]
async fn test_end_without_begin_is_protocol_violation() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("out.log");
    run_collective(2, move |comm| {
        let path = p.clone();
        async move {
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            assert!(matches!(
                file.write_ordered_end().await,
                Err(SharedFpError::ProtocolViolation(_))
            ));
            file.close().await.unwrap();
        }
    })
    .await;
}

#[tokio::test]
async fn test_one_bad_rank_aborts_round_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let p = path.clone();
    run_collective(4, move |comm| {
        let path = p.clone();
        async move {
            let rank = comm.rank();
            let mut file = open_shared(comm, &path, SharedFpConfig::default());

            // Rank 3 claims more elements than its buffer holds.
            let count = if rank == 3 { 16 } else { 2 };
            let err = file
                .write_ordered_begin(&rank_bytes(rank, 2), count, DataType::Byte)
                .await
                .unwrap_err();
            if rank == 3 {
                assert!(matches!(err, SharedFpError::BufferSizeMismatch { .. }));
            } else {
                assert!(
                    matches!(err, SharedFpError::AllocationAborted { root: 0, .. }),
                    "rank {rank}: {err}"
                );
            }
            assert!(!file.split_in_use());
            assert_eq!(file.global_offset(), Some(0));

            // The group is still in step.
            let status = file
                .write_ordered(&rank_bytes(rank, 2), 2, DataType::Byte)
                .await
                .unwrap();
            assert_eq!(status.offset, rank as i64 * 2);
            file.close().await.unwrap();
        }
    })
    .await;
    assert_eq!(std::fs::read(&path).unwrap(), b"aabbccdd");
}

#[tokio::test]
async fn test_open_failure_on_one_rank_aborts_round_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let missing = dir.path().join("no-such-dir");
    let p = path.clone();
    let results = run_collective(2, move |comm| {
        let path = p.clone();
        let missing = missing.clone();
        async move {
            let rank = comm.rank();
            let mut info = Info::new();
            if rank == 1 {
                info.set(Info::DATAFILE_DIR, missing.to_string_lossy());
            }
            let mut file = SharedFile::new(
                comm,
                &path,
                AccessMode::WRONLY | AccessMode::CREATE,
                info,
                SharedFpConfig::default(),
            );
            let bounded = Duration::from_secs(5);
            let mut errors = Vec::new();
            for _ in 0..2 {
                let err = timeout(
                    bounded,
                    file.write_ordered_begin(&rank_bytes(rank, 4), 4, DataType::Byte),
                )
                .await
                .expect("ranks fell out of step")
                .unwrap_err();
                assert!(!file.split_in_use());
                errors.push(err);
            }
            let global = file.global_offset();
            let closed = timeout(bounded, file.close())
                .await
                .expect("ranks fell out of step");
            errors.push(closed.unwrap_err());
            (errors, global)
        }
    })
    .await;

    let (errors, global) = &results[0];
    for err in errors {
        assert!(
            matches!(err, SharedFpError::AllocationAborted { .. }),
            "rank 0: {err}"
        );
    }
    assert_eq!(*global, Some(0));

    let (errors, global) = &results[1];
    for err in errors {
        assert!(matches!(err, SharedFpError::OpenFailed { .. }), "rank 1: {err}");
    }
    assert_eq!(*global, None);
    assert_eq!(std::fs::read(&path).unwrap(), b"");
}
