use std::sync::Arc;

use serial_gateway::{
    device::DeviceId,
    filters::Filters,
    transport::mock::{MockDevice, MockTransport},
};

mod common;
use common::{test_gateway, test_gateway_with_filters};

#[tokio::test]
async fn handshake_success_registers_device() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port(
        "/dev/ttyS0",
        "USB VID:PID=1a86:7523 SNR=1",
        MockDevice::replying("ID,abc123\n"),
    );

    let gateway = test_gateway(transport);

    assert!(gateway.add_device("/dev/ttyS0", false).await);

    assert_eq!(gateway.device_ids(), vec![DeviceId::new("abc123")]);
    assert_eq!(
        gateway.mappings(),
        vec![(DeviceId::new("abc123"), "/dev/ttyS0".to_string())]
    );
}

#[tokio::test]
async fn handshake_with_wrong_message_type_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("DATA,abc123\n"));

    let gateway = test_gateway(transport);

    assert!(!gateway.add_device("/dev/ttyS0", false).await);
    assert!(gateway.device_ids().is_empty());
}

#[tokio::test]
async fn handshake_with_empty_id_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,\n"));

    let gateway = test_gateway(transport);

    assert!(!gateway.add_device("/dev/ttyS0", false).await);
    assert!(gateway.device_ids().is_empty());
}

#[tokio::test]
async fn silent_device_times_the_handshake_out() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::silent());

    let gateway = test_gateway(transport);

    assert!(!gateway.add_device("/dev/ttyS0", false).await);
    assert!(gateway.device_ids().is_empty());
}

#[tokio::test]
async fn id_collision_keeps_the_first_device() {
    let transport = Arc::new(MockTransport::new());
    let _first = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,same\n"));
    let _second = transport.add_port("/dev/ttyS1", "n/a", MockDevice::replying("ID,same\n"));

    let gateway = test_gateway(transport);

    assert!(gateway.add_device("/dev/ttyS0", false).await);
    assert!(!gateway.add_device("/dev/ttyS1", false).await);

    assert_eq!(
        gateway.mappings(),
        vec![(DeviceId::new("same"), "/dev/ttyS0".to_string())]
    );
}

#[tokio::test]
async fn denylisted_port_sees_no_io() {
    let transport = Arc::new(MockTransport::new());
    let link = transport.add_port("/dev/ttyUSB9", "n/a", MockDevice::replying("ID,x\n"));

    let filters = Filters::from_entries::<&str>([], ["/dev/ttyUSB9"]);
    let gateway = test_gateway_with_filters(transport, filters);

    assert!(!gateway.add_device("/dev/ttyUSB9", false).await);
    assert_eq!(link.open_count(), 0);
}

#[tokio::test]
async fn allowlist_miss_is_rejected_without_opening() {
    let transport = Arc::new(MockTransport::new());
    let link = transport.add_port(
        "/dev/ttyUSB0",
        "USB VID:PID=0403:6001 ",
        MockDevice::replying("ID,x\n"),
    );

    let filters = Filters::from_entries(["1a86:7523"], []);
    let gateway = test_gateway_with_filters(transport, filters);

    assert!(!gateway.add_device("/dev/ttyUSB0", false).await);
    assert_eq!(link.open_count(), 0);
}

#[tokio::test]
async fn allowlisted_hardware_is_admitted() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port(
        "/dev/ttyUSB0",
        "USB VID:PID=1a86:7523 SNR=85438",
        MockDevice::replying("ID,meter-1\n"),
    );

    let filters = Filters::from_entries(["1a86:7523"], []);
    let gateway = test_gateway_with_filters(transport, filters);

    assert!(gateway.add_device("/dev/ttyUSB0", false).await);
    assert_eq!(gateway.device_ids(), vec![DeviceId::new("meter-1")]);
}

#[tokio::test]
async fn unreadable_hardware_id_is_rejected_when_allowlist_is_enforced() {
    let transport = Arc::new(MockTransport::new());
    let link = transport.add_port("/dev/ttyS0", "PCI n/a", MockDevice::replying("ID,x\n"));

    let filters = Filters::from_entries(["1a86:7523"], []);
    let gateway = test_gateway_with_filters(transport, filters);

    assert!(!gateway.add_device("/dev/ttyS0", false).await);
    assert_eq!(link.open_count(), 0);
}

#[tokio::test]
async fn nonexistent_port_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let gateway = test_gateway(transport);

    assert!(!gateway.add_device("/dev/ttyNOPE", false).await);
}

#[tokio::test]
async fn a_port_is_only_admitted_once() {
    let transport = Arc::new(MockTransport::new());
    let _link = transport.add_port("/dev/ttyS0", "n/a", MockDevice::replying("ID,abc\n"));

    let gateway = test_gateway(transport);

    assert!(gateway.add_device("/dev/ttyS0", false).await);
    assert!(!gateway.add_device("/dev/ttyS0", false).await);

    assert_eq!(gateway.device_ids().len(), 1);
}
