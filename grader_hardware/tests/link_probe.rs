use std::fs;
use std::net::{TcpListener, TcpStream};
use std::thread::sleep;
use std::time::Duration;

use grader_hardware::{LinkProbe, LinkProbeNetwork};
use grader_traits::Network;
use rstest::rstest;
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_millis(200);

// The broker goes away while the local gateway keeps answering: the link must
// stay up so the controller takes the broker backoff path instead of
// re-associating.
#[rstest]
fn broker_refusing_connections_leaves_link_up() {
    let gateway = TcpListener::bind("127.0.0.1:0").unwrap();
    let broker = TcpListener::bind("127.0.0.1:0").unwrap();
    let broker_addr = broker.local_addr().unwrap();

    let mut net = LinkProbeNetwork::new(
        LinkProbe::Tcp(gateway.local_addr().unwrap().to_string()),
        TIMEOUT,
    )
    .with_recheck(Duration::from_millis(5));
    net.associate().expect("gateway reachable");

    drop(broker);
    assert!(
        TcpStream::connect_timeout(&broker_addr, TIMEOUT).is_err(),
        "broker port should refuse"
    );

    sleep(Duration::from_millis(20));
    assert!(net.is_connected());
    assert!(net.associate().is_ok());
}

#[rstest]
fn lost_gateway_is_noticed_on_recheck() {
    let gateway = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut net = LinkProbeNetwork::new(
        LinkProbe::Tcp(gateway.local_addr().unwrap().to_string()),
        TIMEOUT,
    )
    .with_recheck(Duration::from_millis(5));
    net.associate().unwrap();
    assert!(net.is_connected());

    drop(gateway);
    sleep(Duration::from_millis(20));
    assert!(!net.is_connected());
    assert!(net.associate().is_err());
}

#[rstest]
#[case("up\n", true)]
#[case("down\n", false)]
#[case("dormant", false)]
fn operstate_decides_association(#[case] state: &str, #[case] up: bool) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("operstate");
    fs::write(&path, state).unwrap();

    let mut net = LinkProbeNetwork::new(LinkProbe::OperState(path), TIMEOUT);
    assert_eq!(net.associate().is_ok(), up);
    assert_eq!(net.is_connected(), up);
}

#[rstest]
fn interface_going_down_drops_link() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("operstate");
    fs::write(&path, "up\n").unwrap();

    let mut net = LinkProbeNetwork::new(LinkProbe::OperState(path.clone()), TIMEOUT)
        .with_recheck(Duration::ZERO);
    net.associate().unwrap();
    assert!(net.is_connected());

    fs::write(&path, "down\n").unwrap();
    assert!(!net.is_connected());
}

#[rstest]
fn missing_interface_fails_association() {
    let dir = tempdir().unwrap();
    let mut net = LinkProbeNetwork::new(
        LinkProbe::OperState(dir.path().join("no-such-iface")),
        TIMEOUT,
    );
    assert!(net.associate().is_err());
    assert!(!net.is_connected());
}

#[rstest]
fn interface_name_maps_to_sysfs() {
    assert_eq!(
        LinkProbe::interface("wlan0"),
        LinkProbe::OperState("/sys/class/net/wlan0/operstate".into())
    );
}
