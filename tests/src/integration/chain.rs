//! # Sequencing and Hash Chaining
//!
//! Client requests become quanta with consecutive apexes, each linked to its
//! predecessor by hash; the first links to the zero hash. An auditor's
//! replica holds the same chain.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use qc_02_quantum_handler::QuantumHandlerApi;
    use shared_types::{QuorumThreshold, ZERO_HASH};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_three_quanta_form_a_hash_chain() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        for expected in 1..=3u64 {
            let submission = client
                .connection
                .submit(1, vec![expected as u8])
                .await
                .unwrap();
            assert_eq!(submission.apex, expected);
            assert_eq!(submission.request_id, expected);
        }

        let records = prime.node().log.load_quanta(1, 10).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].quantum.prev_hash, ZERO_HASH);
        for pair in records.windows(2) {
            assert_eq!(pair[1].quantum.prev_hash, pair[0].quantum.hash());
            assert!(pair[1].quantum.links_to(&pair[0].quantum));
        }
        prime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_get_gap_free_apexes() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();

        let mut tasks = Vec::new();
        for offset in 0..8u8 {
            let client = connect_client(&prime, FIRST_CLIENT_SEED + offset).await;
            tasks.push(tokio::spawn(async move {
                let mut apexes = Vec::new();
                for i in 0..5u8 {
                    let submission = client.connection.submit(2, vec![offset, i]).await.unwrap();
                    apexes.push(submission.apex);
                }
                apexes
            }));
        }

        let mut assigned = BTreeSet::new();
        for task in tasks {
            for apex in task.await.unwrap() {
                assert!(assigned.insert(apex), "apex {} assigned twice", apex);
            }
        }
        assert_eq!(assigned, (1..=40).collect::<BTreeSet<_>>());

        let records = prime.node().log.load_quanta(1, 100).unwrap();
        assert_eq!(records.len(), 40);
        for pair in records.windows(2) {
            assert!(pair[1].quantum.links_to(&pair[0].quantum));
        }
        prime.shutdown().await;
    }

    #[tokio::test]
    async fn test_auditor_replica_matches_prime() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        link(&prime, &auditor).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        for i in 0..9u8 {
            client.connection.submit(3, vec![i]).await.unwrap();
        }
        assert!(wait_until(SETTLE, || auditor.node().handler.last_added_apex() == 9).await);

        let primary = prime.node().log.load_quanta(1, 20).unwrap();
        let replica = auditor.node().log.load_quanta(1, 20).unwrap();
        let hashes = |records: &[qc_01_apex_log::ApexRecord]| {
            records.iter().map(|r| r.quantum.hash()).collect::<Vec<_>>()
        };
        assert_eq!(hashes(&primary), hashes(&replica));
        prime.shutdown().await;
        auditor.shutdown().await;
    }
}
