//! # Request Replay
//!
//! A request id is consumed once per account. Reusing it is rejected
//! without touching the chain, and the rejection resolves only the
//! message that carried it.

#[cfg(test)]
mod tests {
    use crate::integration::harness::*;
    use node_runtime::adapters::{loopback_pair, DEFAULT_LINK_CAPACITY};
    use qc_02_quantum_handler::QuantumHandlerApi;
    use qc_05_collator::{ClientConnection, CollatorError};
    use shared_types::{NodeMessage, QuantumRequest, QuorumThreshold, ResultStatus};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reused_request_id_is_rejected_alone() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let auditor = spec.start_auditor(FIRST_AUDITOR_SEED, dir.path()).await.unwrap();
        link(&prime, &auditor).await.unwrap();
        let mut client = connect_client(&prime, FIRST_CLIENT_SEED).await;

        let first = client.connection.submit(1, b"first".to_vec()).await.unwrap();
        assert_eq!((first.request_id, first.apex), (1, 1));

        let replay = QuantumRequest {
            account: key_of(FIRST_CLIENT_SEED),
            request_id: first.request_id,
            kind: 1,
            body: b"second".to_vec(),
        };
        let response = client
            .connection
            .request_with_id(1_000, NodeMessage::QuantumRequest(replay))
            .await
            .unwrap();
        assert_eq!(response.message_id, 1_000);
        match response.payload {
            NodeMessage::QuantumResult(result) => {
                assert_eq!(result.request_id, 1);
                assert_eq!(result.apex, None);
                assert!(matches!(result.status, ResultStatus::Rejected { .. }));
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(prime.node().handler.last_added_apex(), 1);

        let finalized = first.finalized(SETTLE).await.unwrap();
        assert_eq!((finalized.request_id, finalized.apex), (1, 1));

        let next = client.connection.submit(1, b"third".to_vec()).await.unwrap();
        assert_eq!((next.request_id, next.apex), (2, 2));
        assert!(client.notifications.try_recv().is_err());

        prime.shutdown().await;
        auditor.shutdown().await;
    }

    #[tokio::test]
    async fn test_other_account_cannot_spend_request_ids() {
        let dir = tempdir().unwrap();
        let spec = ClusterSpec::new(1, QuorumThreshold::Count(1));
        let prime = spec.start_prime(dir.path()).await.unwrap();
        let victim = connect_client(&prime, FIRST_CLIENT_SEED).await;
        let intruder = connect_client(&prime, FIRST_CLIENT_SEED + 1).await;

        let forged = QuantumRequest {
            account: key_of(FIRST_CLIENT_SEED),
            request_id: 1,
            kind: 1,
            body: Vec::new(),
        };
        let response = intruder
            .connection
            .request(NodeMessage::QuantumRequest(forged))
            .await
            .unwrap();
        assert!(matches!(
            response.payload,
            NodeMessage::QuantumResult(ref result)
                if matches!(result.status, ResultStatus::Rejected { .. })
        ));

        // The victim's first id is still unused.
        let submission = victim.connection.submit(1, Vec::new()).await.unwrap();
        assert_eq!((submission.request_id, submission.apex), (1, 1));
        prime.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_pending_message_id_is_refused() {
        let ((client_side, _client_inbox), (_server_side, _server_inbox)) =
            loopback_pair(key_of(FIRST_CLIENT_SEED), key_of(PRIME_SEED), DEFAULT_LINK_CAPACITY);
        let (connection, _notifications) = ClientConnection::new(
            Arc::new(identity(FIRST_CLIENT_SEED)),
            Arc::new(client_side),
            Duration::from_millis(300),
        );
        let connection = Arc::new(connection);
        let request = |request_id| {
            NodeMessage::QuantumRequest(QuantumRequest {
                account: key_of(FIRST_CLIENT_SEED),
                request_id,
                kind: 1,
                body: Vec::new(),
            })
        };

        let pending = {
            let connection = connection.clone();
            let message = request(1);
            tokio::spawn(async move { connection.request_with_id(7, message).await })
        };
        assert!(wait_until(SETTLE, || connection.collator().is_pending(7)).await);

        let duplicate = connection.request_with_id(7, request(2)).await;
        assert!(matches!(
            duplicate,
            Err(CollatorError::DuplicateRequest { message_id: 7 })
        ));

        // The original keeps its own deadline.
        let original = pending.await.unwrap();
        assert!(matches!(
            original,
            Err(CollatorError::Timeout { message_id: 7, .. })
        ));
    }
}
