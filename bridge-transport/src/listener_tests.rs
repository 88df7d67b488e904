//! Tests for the shared listener lifecycle

#[cfg(test)]
mod tests {
    use crate::listener::{ManagedListener, SharedServerState};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct FakeListener {
        port: u16,
        stopped: AtomicBool,
        shutdown_calls: AtomicUsize,
    }

    impl FakeListener {
        fn new(port: u16) -> Self {
            Self {
                port,
                stopped: AtomicBool::new(false),
                shutdown_calls: AtomicUsize::new(0),
            }
        }
    }

    impl ManagedListener for FakeListener {
        fn local_addr(&self) -> SocketAddr {
            SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
        }

        fn shutdown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn counting_factory(
        calls: &AtomicUsize,
        port: u16,
    ) -> Result<FakeListener, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(FakeListener::new(port))
    }

    #[tokio::test]
    async fn test_first_call_creates_listener() {
        let state = SharedServerState::<FakeListener>::new();
        let calls = AtomicUsize::new(0);

        let handle = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();

        assert!(handle.newly_created);
        assert_eq!(handle.listener.local_addr().port(), 8089);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(state.is_running().await);
        assert_eq!(state.interest().await, 1);
    }

    #[tokio::test]
    async fn test_second_call_reuses_without_invoking_factory() {
        let state = SharedServerState::<FakeListener>::new();
        let calls = AtomicUsize::new(0);

        let first = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();

        // A factory that would fail must never run once a listener exists.
        let second = state
            .ensure_server(9999, |_| async {
                Err::<FakeListener, String>("factory must not run".to_string())
            })
            .await
            .unwrap();

        assert!(!second.newly_created);
        assert!(Arc::ptr_eq(&first.listener, &second.listener));
        assert_eq!(second.listener.local_addr().port(), 8089);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.interest().await, 2);
    }

    #[tokio::test]
    async fn test_failed_factory_leaves_state_empty() {
        let state = SharedServerState::<FakeListener>::new();

        let result = state
            .ensure_server(8089, |_| async {
                Err::<FakeListener, String>("address in use".to_string())
            })
            .await;
        let err = tokio_test::assert_err!(result);
        assert_eq!(err, "address in use");
        assert!(!state.is_running().await);
        assert_eq!(state.interest().await, 0);

        let calls = AtomicUsize::new(0);
        let handle = state
            .ensure_server(8090, |port| counting_factory(&calls, port))
            .await
            .unwrap();
        assert!(handle.newly_created);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_if_idle_respects_interest() {
        let state = SharedServerState::<FakeListener>::new();
        let calls = AtomicUsize::new(0);

        let handle = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();

        assert!(!state.stop_if_idle(false).await);
        assert!(state.is_running().await);
        assert!(!handle.listener.stopped.load(Ordering::SeqCst));

        assert_eq!(state.release().await, 0);
        assert!(state.stop_if_idle(false).await);
        assert!(!state.is_running().await);
        assert!(handle.listener.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_forced_stop_ignores_interest() {
        let state = SharedServerState::<FakeListener>::new();
        let calls = AtomicUsize::new(0);

        let handle = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();
        assert!(state.retain().await);
        assert_eq!(state.interest().await, 2);

        assert!(state.stop_if_idle(true).await);
        assert!(handle.listener.stopped.load(Ordering::SeqCst));
        assert_eq!(state.interest().await, 0);
        assert!(state.current().await.is_none());
    }

    #[tokio::test]
    async fn test_before_stop_runs_only_when_stopping() {
        let state = SharedServerState::<FakeListener>::new();
        let calls = AtomicUsize::new(0);
        state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();
        assert!(state.retain().await);

        let notified = AtomicUsize::new(0);
        assert_eq!(state.release().await, 1);
        assert!(
            !state
                .stop_if_idle_with(false, |_| {
                    notified.fetch_add(1, Ordering::SeqCst);
                })
                .await
        );
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        assert_eq!(state.release().await, 0);
        let stopped = state
            .stop_if_idle_with(false, |listener| {
                // Still running when the callback sees it.
                assert!(!listener.stopped.load(Ordering::SeqCst));
                notified.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(stopped);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert!(
            !state
                .stop_if_idle_with(true, |_| {
                    notified.fetch_add(1, Ordering::SeqCst);
                })
                .await
        );
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retain_racing_stop_keeps_listener() {
        let state = Arc::new(SharedServerState::<FakeListener>::new());
        let calls = AtomicUsize::new(0);
        let handle = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();
        assert_eq!(state.release().await, 0);

        // Interest taken after the caller last looked must still veto the stop.
        assert!(state.retain().await);
        let notified = AtomicBool::new(false);
        let stopped = state
            .stop_if_idle_with(false, |_| notified.store(true, Ordering::SeqCst))
            .await;

        assert!(!stopped);
        assert!(!notified.load(Ordering::SeqCst));
        assert!(!handle.listener.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let state = SharedServerState::<FakeListener>::new();
        assert!(!state.stop_if_idle(true).await);
        assert!(!state.stop_if_idle(false).await);

        let calls = AtomicUsize::new(0);
        let handle = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();

        assert!(state.stop_if_idle(true).await);
        assert!(!state.stop_if_idle(true).await);
        assert_eq!(handle.listener.shutdown_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recreate_after_stop() {
        let state = SharedServerState::<FakeListener>::new();
        let calls = AtomicUsize::new(0);

        let first = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();
        state.stop_if_idle(true).await;

        let second = state
            .ensure_server(8089, |port| counting_factory(&calls, port))
            .await
            .unwrap();

        assert!(second.newly_created);
        assert!(!Arc::ptr_eq(&first.listener, &second.listener));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retain_without_listener() {
        let state = SharedServerState::<FakeListener>::new();
        assert!(!state.retain().await);
        assert_eq!(state.release().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_create_exactly_once() {
        let state = Arc::new(SharedServerState::<FakeListener>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    state
                        .ensure_server(8089, |port| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok::<_, String>(FakeListener::new(port))
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let handles: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handles.iter().filter(|h| h.newly_created).count(), 1);
        assert!(
            handles
                .windows(2)
                .all(|pair| Arc::ptr_eq(&pair[0].listener, &pair[1].listener))
        );
        assert_eq!(state.interest().await, 16);
    }
}
