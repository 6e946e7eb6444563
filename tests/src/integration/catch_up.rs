//! # Auditor Catch-Up
//!
//! An auditor that loses its link misses the apexes sequenced meanwhile.
//! On reconnection the handshake cursors make the Prime resend exactly the
//! missing range, each apex applied once and in order.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use qc_02_quantum_handler::QuantumHandlerApi;
    use qc_04_quorum_sync::PeerTransport;
    use shared_types::{NodeState, QuorumThreshold};
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reconnected_auditor_receives_missing_apexes_once() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        let prime_side = link(&prime, &auditor).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        for i in 0..10u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }
        assert!(wait_until(SETTLE, || auditor.node().handler.last_added_apex() == 10).await);

        PeerTransport::close(&*prime_side, "network down").await;
        assert!(
            wait_until(SETTLE, || {
                !auditor.is_connected()
                    && prime.connections().connected().is_empty()
                    && auditor.node().state.current() == NodeState::Rising
            })
            .await
        );

        for i in 10..50u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }
        assert_eq!(auditor.node().handler.last_added_apex(), 10);

        let mut applied = watch_applied(&auditor);
        link(&prime, &auditor).await.unwrap();
        let apexes = collect_applied(&mut applied, 50, SETTLE).await;
        assert_eq!(apexes, (11..=50).collect::<Vec<_>>());

        // Nothing is applied twice once the range is complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain_applied(&mut applied).is_empty());

        assert!(wait_until(SETTLE, || auditor.node().state.is_ready()).await);
        assert!(wait_until(SETTLE, || prime.node().handler.last_finalized_apex() == 50).await);

        prime.shutdown().await;
        auditor.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_auditor_starts_from_genesis() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;
        for i in 0..7u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }

        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        let mut applied = watch_applied(&auditor);
        link(&prime, &auditor).await.unwrap();

        assert_eq!(collect_applied(&mut applied, 7, SETTLE).await, (1..=7).collect::<Vec<_>>());
        assert!(wait_until(SETTLE, || auditor.node().state.is_ready()).await);

        prime.shutdown().await;
        auditor.shutdown().await;
    }
}
