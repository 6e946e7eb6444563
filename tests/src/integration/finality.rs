//! # Quorum Finality
//!
//! An apex is final only once the configured number of auditors signed it.
//! The origin client hears about finality after the Prime's record holds
//! the quorum, never before.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use qc_02_quantum_handler::QuantumHandlerApi;
    use qc_05_collator::CollatorError;
    use shared_types::QuorumThreshold;
    use std::time::Duration;
    use tempfile::tempdir;

    fn signatures_at(prime: &node_runtime::handlers::PrimeNode, apex: u64) -> usize {
        prime
            .node()
            .log
            .load_quantum(apex)
            .ok()
            .flatten()
            .map_or(0, |record| record.signatures.len())
    }

    #[tokio::test]
    async fn test_two_of_two_quorum_precedes_client_finality() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(2, QuorumThreshold::Count(2));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let first = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        let second = spec.start_auditor(FIRST_AUDITOR_SEED + 1, dir.path()).await.unwrap();
        link(&prime, &first).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        let submission = client.connection.submit(7, b"pay".to_vec()).await.unwrap();
        assert_eq!(submission.apex, 1);
        let request_id = submission.request_id;

        // One signature is below the quorum.
        assert!(wait_until(SETTLE, || signatures_at(&prime, 1) == 1).await);
        assert_eq!(prime.node().handler.last_finalized_apex(), 0);

        link(&prime, &second).await.unwrap();
        let finalized = submission.finalized(SETTLE).await.unwrap();
        assert_eq!(finalized.request_id, request_id);
        assert_eq!(finalized.apex, 1);

        let record = prime.node().log.load_quantum(1).unwrap().unwrap();
        assert_eq!(finalized.quantum_hash, record.quantum.hash());
        assert!(record.signatures.contains(&key_of(FIRST_AUDITOR_SEED)));
        assert!(record.signatures.contains(&key_of(FIRST_AUDITOR_SEED + 1)));
        assert_eq!(prime.node().handler.last_finalized_apex(), 1);

        // The quorum reaches both auditors as well.
        assert!(
            wait_until(SETTLE, || {
                first.node().handler.last_finalized_apex() == 1
                    && second.node().handler.last_finalized_apex() == 1
            })
            .await
        );
        assert!(wait_until(SETTLE, || prime.registry().ready_count() == 2).await);

        prime.shutdown().await;
        first.shutdown().await;
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_finality_wait_times_out_without_quorum() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(2, QuorumThreshold::Count(2));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        link(&prime, &auditor).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        let submission = client.connection.submit(1, b"lonely".to_vec()).await.unwrap();
        let outcome = submission.finalized(Duration::from_millis(300)).await;
        assert!(matches!(outcome, Err(CollatorError::Timeout { .. })));
        assert_eq!(prime.node().handler.last_finalized_apex(), 0);
        assert_eq!(prime.node().handler.last_added_apex(), 1);

        prime.shutdown().await;
        auditor.shutdown().await;
    }

    #[tokio::test]
    async fn test_majority_finalizes_without_slowest_auditor() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(3, QuorumThreshold::Majority);
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let first = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        let second = spec.start_auditor(FIRST_AUDITOR_SEED + 1, dir.path()).await.unwrap();
        link(&prime, &first).await.unwrap();
        link(&prime, &second).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        for i in 0..4u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }
        assert!(wait_until(SETTLE, || prime.node().handler.last_finalized_apex() == 4).await);
        assert!((1..=4).all(|apex| signatures_at(&prime, apex) == 2));

        prime.shutdown().await;
        first.shutdown().await;
        second.shutdown().await;
    }
}
