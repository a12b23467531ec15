use super::helpers::{open_shared, rank_bytes, run_on};
use futures::future::join_all;
use sharedfp::{Communicator, DataType, SharedFpConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn tcp_group(world: u32, config: &SharedFpConfig) -> Vec<Communicator> {
    let mut listeners = Vec::new();
    let mut addrs = Vec::new();
    for _ in 0..world {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        addrs.push(listener.local_addr().unwrap());
        listeners.push(listener);
    }
    let addrs = Arc::new(addrs);
    let connects = listeners.into_iter().enumerate().map(|(rank, listener)| {
        let addrs = Arc::clone(&addrs);
        let config = config.clone();
        tokio::spawn(async move {
            Communicator::connect_tcp(rank as u32, listener, &addrs, &config)
                .await
                .unwrap()
        })
    });
    join_all(connects)
        .await
        .into_iter()
        .map(|h| h.unwrap())
        .collect()
}

#[tokio::test]
async fn test_ordered_and_merged_writes_over_tcp() {
    let config = SharedFpConfig {
        collective_timeout: Duration::from_secs(10),
        ..Default::default()
    };
    let comms = tcp_group(4, &config).await;
    for (rank, c) in comms.iter().enumerate() {
        assert_eq!(c.rank(), rank as u32);
        assert_eq!(c.world_size(), 4);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let p = path.clone();
    let results = run_on(comms, move |comm| {
        let path = p.clone();
        let config = config.clone();
        async move {
            let rank = comm.rank();
            let mut file = open_shared(comm, &path, config);
            file.write_shared(&rank_bytes(rank, 1), 1, DataType::Byte)
                .await
                .unwrap();
            let status = file
                .write_ordered(&rank_bytes(rank, 2), 2, DataType::Byte)
                .await
                .unwrap();
            let global = file.global_offset().unwrap();
            file.close().await.unwrap();
            (status.offset, global)
        }
    })
    .await;

    assert_eq!(results, vec![(4, 12), (6, 12), (8, 12), (10, 12)]);
    assert_eq!(std::fs::read(&path).unwrap(), b"abcdaabbccdd");
}

#[tokio::test]
async fn test_connect_rejects_rank_outside_addrs() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let err = Communicator::connect_tcp(1, listener, &[addr], &SharedFpConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        sharedfp::SharedFpError::InvalidRank {
            rank: 1,
            world_size: 1
        }
    ));
}
