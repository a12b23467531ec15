use super::helpers::{open_shared, rank_bytes, run_collective};
use sharedfp::{DataType, SharedFpConfig};

#[tokio::test]
async fn test_local_offset_advances_at_post_time() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("out.log");
    let results = run_collective(3, move |comm| {
        let path = p.clone();
        async move {
            let rank = comm.rank();
            let config = SharedFpConfig {
                keep_datafiles: true,
                ..Default::default()
            };
            let mut file = open_shared(comm, &path, config);
            // Sizes differ per rank so offsets are purely local.
            let sizes = [2 + rank as usize, 7, 1];
            let mut requests = Vec::new();
            for &size in &sizes {
                requests.push(
                    file.iwrite_shared(&rank_bytes(rank, size), size, DataType::Byte)
                        .await
                        .unwrap(),
                );
            }
            let advanced = file.data_file_offset().unwrap();
            let global = file.global_offset().unwrap();

            // Completion order does not matter.
            for r in requests.into_iter().rev() {
                r.wait().await.unwrap();
            }
            file.close().await.unwrap();
            (advanced, global, sizes.iter().sum::<usize>())
        }
    })
    .await;

    for (rank, (advanced, global, total)) in results.into_iter().enumerate() {
        assert_eq!(advanced, total as i64, "rank {rank} data file offset");
        assert_eq!(global, 0, "individual writes must not move the global offset");
        let data = std::fs::read(dir.path().join(format!("out.log.data.{rank}"))).unwrap();
        assert_eq!(data, rank_bytes(rank as u32, total));
    }
}

#[tokio::test]
async fn test_typed_elements_are_sized() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("out.log");
    let results = run_collective(2, move |comm| {
        let path = p.clone();
        async move {
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            let values = [1.5f64, -2.0, 8.25];
            let buf: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            let status = file.write_shared(&buf, 3, DataType::F64).await.unwrap();
            let offset = file.data_file_offset().unwrap();
            file.close().await.unwrap();
            (status.bytes, offset)
        }
    })
    .await;
    assert_eq!(results, vec![(24, 24), (24, 24)]);
}

#[tokio::test]
async fn test_short_buffer_rejected_without_advancing() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("out.log");
    run_collective(1, move |comm| {
        let path = p.clone();
        async move {
            let mut file = open_shared(comm, &path, SharedFpConfig::default());
            let err = file
                .iwrite_shared(&[0u8; 6], 2, DataType::I32)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                sharedfp::SharedFpError::BufferSizeMismatch {
                    expected: 8,
                    actual: 6
                }
            ));
            assert_eq!(file.data_file_offset(), Some(0));
            assert_eq!(file.pending_records(), 0);
            file.close().await.unwrap();
        }
    })
    .await;
}
