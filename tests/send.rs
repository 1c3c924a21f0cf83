use std::{sync::Arc, time::Duration};

use serial_gateway::{
    device::DeviceId,
    transport::mock::{MockDevice, MockTransport},
};

mod common;
use common::test_gateway;

#[tokio::test]
async fn sent_messages_reach_the_device() {
    let transport = Arc::new(MockTransport::new());
    let mut link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,abc\n"));

    let gateway = test_gateway(transport);
    assert!(gateway.add_device("/dev/ttyS0", false).await);

    // The first line on the wire was the ID query.
    assert_eq!(link.written_line().await.as_deref(), Some("?id"));

    gateway.send_to_device(&DeviceId::new("abc"), "hello there");

    assert_eq!(link.written_line().await.as_deref(), Some("hello there"));
}

#[tokio::test]
async fn sending_to_an_unknown_id_changes_nothing() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,abc\n"));

    let gateway = test_gateway(transport);
    assert!(gateway.add_device("/dev/ttyS0", false).await);

    gateway.send_to_device(&DeviceId::new("ghost"), "anyone home?");

    // The write task runs detached; give it a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(gateway.device_ids(), vec![DeviceId::new("abc")]);
}

#[tokio::test]
async fn broadcast_reaches_every_device() {
    let transport = Arc::new(MockTransport::new());
    let mut first = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,a\n"));
    let mut second = transport.add_port("/dev/ttyS1", "n/a", MockDevice::replying("ID,b\n"));

    let gateway = test_gateway(transport);
    assert!(gateway.add_device("/dev/ttyS0", false).await);
    assert!(gateway.add_device("/dev/ttyS1", false).await);

    assert_eq!(first.written_line().await.as_deref(), Some("?id"));
    assert_eq!(second.written_line().await.as_deref(), Some("?id"));

    gateway.broadcast_message("ping");

    assert_eq!(first.written_line().await.as_deref(), Some("ping"));
    assert_eq!(second.written_line().await.as_deref(), Some("ping"));
}

#[tokio::test]
async fn write_failure_deletes_the_device() {
    let transport = Arc::new(MockTransport::new());
    let link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,abc\n"));

    let gateway = test_gateway(transport);
    assert!(gateway.add_device("/dev/ttyS0", false).await);

    // Hang the device up, then try to talk to it. Whichever side
    // notices first (the reader or this write), the device must end up
    // evicted, and evicted only once.
    link.disconnect();
    gateway.send_to_device(&DeviceId::new("abc"), "are you there?");

    common::eventually("the device to be evicted", || {
        gateway.device_ids().is_empty()
    })
    .await;

    common::eventually("the reader to wind down", || gateway.all_readers_exited()).await;
}
