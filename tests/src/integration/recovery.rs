//! # Crash Recovery
//!
//! Quanta staged as pending before a stop are validated and re-appended on
//! the next start. Recovered request ids stay spent and sequencing resumes
//! after the recovered tip. Auditors resume from their own log, and quanta
//! they hold whose signatures never reached the Prime are signed again.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use node_runtime::container::NodeContainer;
    use node_runtime::handlers::PrimeNode;
    use qc_02_quantum_handler::{DigestPayloadProcessor, PayloadProcessor, QuantumHandlerApi};
    use shared_types::{
        PublicKey, Quantum, QuantumRequest, QuorumThreshold, ResultStatus, SignatureSet,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    /// `count` valid quanta following `last`, issued by `account`.
    fn successors(last: &Quantum, account: PublicKey, count: u64) -> Vec<Quantum> {
        let processor = DigestPayloadProcessor::default();
        let mut previous = last.clone();
        let mut quanta = Vec::new();
        for step in 1..=count {
            let apex = last.apex + step;
            let request = QuantumRequest {
                account,
                request_id: apex,
                kind: 9,
                body: apex.to_be_bytes().to_vec(),
            };
            let quantum = Quantum {
                apex,
                prev_hash: previous.hash(),
                payload_hash: processor.payload_hash(&request),
                effects_proof: processor.effects_proof(&request, apex).unwrap(),
                timestamp: previous.timestamp + 1,
                request,
            };
            previous = quantum.clone();
            quanta.push(quantum);
        }
        quanta
    }

    fn request(account: PublicKey, request_id: u64) -> QuantumRequest {
        QuantumRequest {
            account,
            request_id,
            kind: 1,
            body: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_pending_quanta_are_reappended_on_restart() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1)).durable();
        let account = key_of(FIRST_CLIENT_SEED);

        let prime = spec.start_prime(dir.path()).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;
        for _ in 0..3 {
            client.connection.submit(1, b"durable".to_vec()).await.unwrap();
        }
        let tip = prime.node().log.load_quantum(3).unwrap().unwrap().quantum;
        let pending = successors(&tip, account, 5);
        prime.node().log.save_pending(&pending).unwrap();

        // Stop with five quanta staged but not appended.
        prime.shutdown().await;
        drop(client);

        let restarted = NodeContainer::open(spec.prime_config(dir.path())).await.unwrap();
        assert_eq!(restarted.recovery.reappended, 5);
        assert_eq!(restarted.recovery.last_apex, 8);
        assert!(restarted.log.load_pending_quanta().unwrap().is_empty());

        let records = restarted.log.load_quanta(1, 20).unwrap();
        let apexes: Vec<u64> = records.iter().map(|r| r.quantum.apex).collect();
        assert_eq!(apexes, (1..=8).collect::<Vec<_>>());
        for pair in records.windows(2) {
            assert!(pair[1].quantum.links_to(&pair[0].quantum));
        }
        let recovered: Vec<Quantum> = records[3..].iter().map(|r| r.quantum.clone()).collect();
        assert_eq!(recovered, pending);

        let prime = PrimeNode::start(Arc::new(restarted)).unwrap();
        assert!(prime.node().state.is_ready());

        let replayed = prime.handle_request(&account, request(account, 8)).await;
        assert!(matches!(replayed.status, ResultStatus::Rejected { .. }));

        let next = prime.handle_request(&account, request(account, 9)).await;
        assert_eq!(next.status, ResultStatus::Accepted);
        assert_eq!(next.apex, Some(9));
        assert_eq!(prime.node().handler.last_added_apex(), 9);
        prime.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarted_auditor_resumes_from_its_log() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1)).durable();
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        link(&prime, &auditor).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        for i in 0..5u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }
        assert!(wait_until(SETTLE, || prime.node().handler.last_finalized_apex() == 5).await);
        assert!(wait_until(SETTLE, || auditor.node().handler.last_finalized_apex() == 5).await);

        auditor.shutdown().await;
        drop(auditor);
        assert!(wait_until(SETTLE, || prime.connections().connected().is_empty()).await);

        for i in 5..10u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }

        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        assert_eq!(auditor.node().recovery.last_apex, 5);
        assert_eq!(auditor.node().handler.last_added_apex(), 5);

        let mut applied = watch_applied(&auditor);
        link(&prime, &auditor).await.unwrap();
        assert_eq!(
            collect_applied(&mut applied, 10, SETTLE).await,
            (6..=10).collect::<Vec<_>>()
        );
        assert!(wait_until(SETTLE, || prime.node().handler.last_finalized_apex() == 10).await);
        assert!(
            wait_until(SETTLE, || {
                auditor
                    .node()
                    .log
                    .load_cursors()
                    .map_or(false, |cursors| cursors.quantum_cursor == 10)
            })
            .await
        );

        prime.shutdown().await;
        auditor.shutdown().await;
    }

    #[tokio::test]
    async fn test_auditor_restarted_with_pending_quanta_completes_finality() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1)).durable();
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;
        for i in 0..3u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }

        // The auditor staged the Prime's quanta and stopped before applying.
        let staged: Vec<Quantum> = prime
            .node()
            .log
            .load_quanta(1, 10)
            .unwrap()
            .into_iter()
            .map(|record| record.quantum)
            .collect();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        auditor.node().log.save_pending(&staged).unwrap();
        auditor.shutdown().await;
        drop(auditor);

        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        assert_eq!(auditor.node().recovery.reappended, 3);
        assert_eq!(auditor.node().handler.last_added_apex(), 3);
        assert_eq!(prime.node().handler.last_finalized_apex(), 0);

        link(&prime, &auditor).await.unwrap();
        let fourth = client.connection.submit(1, vec![3]).await.unwrap();
        assert_eq!(fourth.apex, 4);
        assert!(wait_until(SETTLE, || prime.node().handler.last_finalized_apex() == 4).await);
        assert!(wait_until(SETTLE, || auditor.node().handler.last_finalized_apex() == 4).await);

        prime.shutdown().await;
        auditor.shutdown().await;
    }

    #[tokio::test]
    async fn test_signature_lost_with_the_link_is_sent_again() {
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let dir = tempdir().unwrap();
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        let client = connect_client(&prime, FIRST_CLIENT_SEED).await;
        for i in 0..2u8 {
            client.connection.submit(1, vec![i]).await.unwrap();
        }

        // Applied and signed locally, but the signatures never left.
        for record in prime.node().log.load_quanta(1, 10).unwrap() {
            let apex = record.quantum.apex;
            let hash = record.quantum.hash();
            let handler = &auditor.node().handler;
            handler.apply(record.quantum, SignatureSet::new()).await.unwrap();
            let own: SignatureSet =
                std::iter::once(auditor.node().identity.node_signature(&hash)).collect();
            handler.add_signatures(apex, own).await.unwrap();
        }
        assert_eq!(auditor.node().handler.last_finalized_apex(), 2);
        assert_eq!(prime.node().handler.last_finalized_apex(), 0);

        link(&prime, &auditor).await.unwrap();
        assert!(wait_until(SETTLE, || prime.node().handler.last_finalized_apex() == 2).await);

        prime.shutdown().await;
        auditor.shutdown().await;
    }
}
