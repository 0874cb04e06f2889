use stackctl_core::{ShutdownCause, Signal, UnitId, exit_channel};

#[tokio::test]
async fn test_first_post_wins() {
    let (notifier, receiver) = exit_channel();
    let app = UnitId::new("app-server").unwrap();
    let front = UnitId::new("front-server").unwrap();

    assert!(notifier.post(ShutdownCause::UnitExited(app.clone())));
    assert!(!notifier.post(ShutdownCause::UnitExited(front)));

    assert_eq!(
        receiver.recv().await,
        Some(ShutdownCause::UnitExited(app))
    );
}

#[tokio::test]
async fn test_signal_and_unit_exit_share_one_slot() {
    let (notifier, receiver) = exit_channel();

    assert!(notifier.post(ShutdownCause::Signal(Signal::SIGTERM)));
    assert!(!notifier.post(ShutdownCause::UnitExited(
        UnitId::new("app-server").unwrap()
    )));
    assert!(notifier.has_fired());

    assert_eq!(
        receiver.recv().await,
        Some(ShutdownCause::Signal(Signal::SIGTERM))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_posts_have_exactly_one_winner() {
    let (notifier, receiver) = exit_channel();

    let mut set = tokio::task::JoinSet::new();
    for i in 0..16 {
        let notifier = notifier.clone();
        set.spawn(async move {
            notifier.post(ShutdownCause::UnitExited(
                UnitId::new(format!("unit-{i}")).unwrap(),
            ))
        });
    }

    let mut winners = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert!(receiver.recv().await.is_some());
}

#[tokio::test]
async fn test_posts_from_clones_share_the_gate() {
    let (notifier, receiver) = exit_channel();
    let clone = notifier.clone();

    assert!(clone.post(ShutdownCause::Signal(Signal::SIGINT)));
    assert!(!notifier.post(ShutdownCause::Signal(Signal::SIGTERM)));

    assert_eq!(
        receiver.recv().await,
        Some(ShutdownCause::Signal(Signal::SIGINT))
    );
}
