//! Process keep-alive accounting.
//!
//! Holds are process-wide, so everything runs in one test.

use std::time::Duration;

use uniserve::{active_holds, wait_until_idle, BoxError, HandlerContext, Response, ServeOptions, SocketEventArgs};

mod common;

async fn idle_within(limit: Duration) -> bool {
    tokio::time::timeout(limit, wait_until_idle()).await.is_ok()
}

#[tokio::test]
async fn test_listener_and_sockets_hold_the_process() {
    let upgrade = |ctx: HandlerContext| async move {
        ctx.upgrade_to_websocket(());
        Ok::<_, BoxError>(Response::empty())
    };
    let ignore = |_args: SocketEventArgs| async {};

    assert_eq!(active_holds(), 0);

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(upgrade).socket_handler(ignore)).await;
        assert_eq!(active_holds(), 1, "{}", runtime);
        assert!(!idle_within(Duration::from_millis(100)).await);

        handle.unref();
        handle.unref();
        assert!(idle_within(common::TIMEOUT).await, "{}: unref left a hold", runtime);

        handle.keep_alive();
        handle.keep_alive();
        assert_eq!(active_holds(), 1, "{}", runtime);

        handle.unref();
        let mut client = common::connect(&handle, "/").await;
        common::eventually(|| handle.open_sockets().len() == 1).await;
        assert!(active_holds() > 0, "{}: open socket does not hold the process", runtime);
        assert!(!idle_within(Duration::from_millis(100)).await);

        client.close(None).await.unwrap();
        let _ = common::next_frame(&mut client).await;
        drop(client);
        assert!(idle_within(common::TIMEOUT).await, "{}: socket hold leaked", runtime);

        handle.stop();
        common::within(handle.stopped()).await;
        handle.keep_alive();
        assert_eq!(active_holds(), 0, "{}: keep_alive after stop", runtime);
    }
}
