use std::time::Duration;

use tracing::info;
use worldsync::sync::dor::{Region, WorldPos};
use worldsync::sync::endpoint::{ServerSync, SyncConfig};
use worldsync::sync::interest::Doi;
use worldsync::sync::net::mem::MemNetwork;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let network = MemNetwork::new();

    let s1 = ServerSync::new(
        SyncConfig::builder()
            .region(Region::rect(0.0, 10.0, 0.0, 10.0))
            .interest(Doi::from_wire(r#"{"scope":"adjacent"}"#).unwrap())
            .peers(vec!["world-2".into()])
            .build(),
    );
    let s2 = ServerSync::new(
        SyncConfig::builder()
            .region(Region::rect(10.0, 20.0, 0.0, 10.0))
            .interest(Doi::from_wire(r#"{"scope":"adjacent"}"#).unwrap())
            .build(),
    );

    let (ep1, inbound1) = network.endpoint("world-1", s1.responder());
    let (_ep2, inbound2) = network.endpoint("world-2", s2.responder());
    tokio::spawn(s1.clone().run_acceptor(inbound1));
    tokio::spawn(s2.clone().run_acceptor(inbound2));

    info!("world-1 is {}, world-2 is {}", s1.sync_id(), s2.sync_id());
    s1.bootstrap(&ep1).await;

    // give the fact exchanges a moment to land
    tokio::time::sleep(Duration::from_millis(100)).await;

    for line in s1.describe_peers() {
        println!("world-1 sees {}", line);
    }
    for line in s2.describe_peers() {
        println!("world-2 sees {}", line);
    }

    for pos in [WorldPos::from(5.0, 5.0), WorldPos::from(10.0, 5.0)] {
        let owner = if s1.local().dor().is_responsible_for(&pos) {
            "world-1"
        } else if s2.local().dor().is_responsible_for(&pos) {
            "world-2"
        } else {
            "nobody"
        };
        println!("{} is owned by {}", pos, owner);
    }
}
