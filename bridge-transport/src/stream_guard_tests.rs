//! Tests for the single-subscriber stream guard

#[cfg(test)]
mod tests {
    use crate::stream_guard::{StreamGuard, StreamStatus};
    use assert_matches::assert_matches;
    use axum::http::Method;
    use hostbridge_protocol::BridgeError;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_get_while_idle_opens_session() {
        let guard = StreamGuard::new();
        assert_eq!(guard.status(), StreamStatus::Idle);
        assert!(guard.opened_at().is_none());

        let lease = guard.admit(&Method::GET).unwrap();
        assert_eq!(guard.status(), StreamStatus::Streaming);
        assert!(guard.opened_at().is_some());
        assert!(!lease.is_closed());
    }

    #[test]
    fn test_second_get_conflicts() {
        let guard = StreamGuard::new();
        let _lease = guard.admit(&Method::GET).unwrap();

        assert_matches!(guard.admit(&Method::GET), Err(BridgeError::SessionConflict));
        assert_eq!(guard.status(), StreamStatus::Streaming);
    }

    #[test]
    fn test_non_get_rejected_in_every_state() {
        let guard = StreamGuard::new();

        assert_matches!(
            guard.admit(&Method::POST),
            Err(BridgeError::MethodNotAllowed(m)) if m == "POST"
        );
        assert_eq!(guard.status(), StreamStatus::Idle);

        let _lease = guard.admit(&Method::GET).unwrap();
        assert_matches!(
            guard.admit(&Method::DELETE),
            Err(BridgeError::MethodNotAllowed(_))
        );
        assert_eq!(guard.status(), StreamStatus::Streaming);

        guard.close();
        assert_matches!(guard.admit(&Method::PUT), Err(BridgeError::MethodNotAllowed(_)));
    }

    #[test]
    fn test_dropping_lease_returns_to_idle() {
        let guard = StreamGuard::new();
        let lease = guard.admit(&Method::GET).unwrap();
        let first_session = lease.session_id();
        drop(lease);

        assert_eq!(guard.status(), StreamStatus::Idle);

        let lease = guard.admit(&Method::GET).unwrap();
        assert_ne!(lease.session_id(), first_session);
    }

    #[test]
    fn test_close_is_terminal() {
        let guard = StreamGuard::new();
        let lease = guard.admit(&Method::GET).unwrap();
        let closed_rx = lease.closed_receiver();

        guard.close();
        assert_eq!(guard.status(), StreamStatus::Closed);
        assert!(lease.is_closed());
        assert!(*closed_rx.borrow());

        // A lease released after close must not reopen the guard.
        drop(lease);
        assert_eq!(guard.status(), StreamStatus::Closed);
        assert_matches!(guard.admit(&Method::GET), Err(BridgeError::StreamClosed));
    }

    #[test]
    fn test_concurrent_gets_admit_exactly_one() {
        let guard = StreamGuard::new();
        let threads = 32;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let guard = guard.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    guard.admit(&Method::GET)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(BridgeError::SessionConflict)))
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(conflicts, threads - 1);
        assert_eq!(guard.status(), StreamStatus::Streaming);
    }
}
