use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use super::dor::Region;
use super::handshake;
use super::identity::{LocalServer, SyncId};
use super::interest::Doi;
use super::net::{Connection, Responder, Transport};
use super::registry::PeerRegistry;

/// Startup configuration for one server instance. Whatever parses the
/// deployment's config file produces this; address syntax is the
/// transport's business.
#[derive(TypedBuilder)]
pub struct SyncConfig {
    /// Spatial region this instance is authoritative for.
    #[builder(default)]
    pub region: Region,
    /// Opaque interest payload served to peers.
    #[builder(default)]
    pub interest: Doi,
    /// Addresses of the other instances hosting this world.
    #[builder(default)]
    pub peers: Vec<String>,
}

/// One instance's peer-sync subsystem: its own served facts plus the
/// registry of admitted remote servers. Constructed once at startup and
/// passed to whatever needs it; clones are cheap handles onto the same
/// state.
#[derive(Clone)]
pub struct ServerSync {
    local: Arc<LocalServer>,
    registry: Arc<PeerRegistry>,
    peer_addrs: Vec<String>,
}

impl ServerSync {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            local: Arc::new(LocalServer::new(config.region, config.interest)),
            registry: Arc::new(PeerRegistry::new()),
            peer_addrs: config.peers,
        }
    }

    pub fn local(&self) -> &LocalServer {
        &self.local
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn sync_id(&self) -> SyncId {
        self.local.sync_id()
    }

    /// The responder the transport installs so remote peers can query this
    /// instance's three facts.
    pub fn responder(&self) -> Responder {
        let local = self.local.clone();
        Arc::new(move |query| local.answer(query))
    }

    /// Dials every configured peer address. One unreachable peer does not
    /// stop bootstrap of the rest.
    pub async fn bootstrap(&self, transport: &dyn Transport) {
        for addr in &self.peer_addrs {
            match transport.connect(addr).await {
                Ok(conn) => {
                    debug!("connected to {} on {}", addr, conn.id());
                    self.handle_connection(conn);
                }
                Err(e) => warn!("could not reach peer {}: {}", addr, e),
            }
        }
    }

    /// Feeds accepted inbound connections into the handshake. Runs until
    /// the transport drops its sender, so spawn it.
    pub async fn run_acceptor(self, mut inbound: mpsc::UnboundedReceiver<Arc<dyn Connection>>) {
        while let Some(conn) = inbound.recv().await {
            debug!("accepted inbound connection {}", conn.id());
            self.handle_connection(conn);
        }
    }

    /// Single entry point for both connect paths. A pair of instances
    /// dialing each other resolves all four connection ends through this
    /// same logic; the registry collapses the duplicates.
    pub fn handle_connection(&self, conn: Arc<dyn Connection>) {
        handshake::begin(self.registry.clone(), self.local.sync_id(), conn);
    }

    /// One line per admitted peer, for the diagnostics layer.
    pub fn describe_peers(&self) -> Vec<String> {
        self.registry
            .snapshot()
            .iter()
            .map(|peer| peer.describe())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sync::dor::WorldPos;
    use crate::sync::net::mem::MemNetwork;

    fn server(region: Region, peers: Vec<String>) -> ServerSync {
        ServerSync::new(
            SyncConfig::builder()
                .region(region)
                .interest(Doi::from_wire(r#"{"scope":"adjacent"}"#).unwrap())
                .peers(peers)
                .build(),
        )
    }

    async fn settle(sync: &ServerSync, expected: usize) {
        for _ in 0..500 {
            if sync.registry().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!(
            "{} settled at {} peers, expected {}",
            sync.sync_id(),
            sync.registry().len(),
            expected
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn adjacent_servers_exchange_all_three_facts() {
        let network = MemNetwork::new();
        let s1 = server(Region::rect(0.0, 10.0, 0.0, 10.0), vec!["world-2".into()]);
        let s2 = server(Region::rect(10.0, 20.0, 0.0, 10.0), Vec::new());

        let (ep1, inbound1) = network.endpoint("world-1", s1.responder());
        let (_ep2, inbound2) = network.endpoint("world-2", s2.responder());
        tokio::spawn(s1.clone().run_acceptor(inbound1));
        tokio::spawn(s2.clone().run_acceptor(inbound2));

        s1.bootstrap(&ep1).await;
        settle(&s1, 1).await;
        settle(&s2, 1).await;

        let s1_sees = s1.registry().snapshot();
        let s2_sees = s2.registry().snapshot();
        assert_eq!(s1_sees[0].sync_id(), s2.sync_id());
        assert_eq!(s2_sees[0].sync_id(), s1.sync_id());
        assert_eq!(s1_sees[0].dor(), &Region::rect(10.0, 20.0, 0.0, 10.0));
        assert_eq!(s2_sees[0].dor(), &Region::rect(0.0, 10.0, 0.0, 10.0));
        assert_eq!(s1_sees[0].doi().as_str(), r#"{"scope":"adjacent"}"#);

        // the shared edge belongs to exactly one side
        let inside = WorldPos::from(5.0, 5.0);
        let boundary = WorldPos::from(10.0, 5.0);
        assert!(s1.local().dor().is_responsible_for(&inside));
        assert!(!s1_sees[0].dor().is_responsible_for(&inside));
        assert!(!s1.local().dor().is_responsible_for(&boundary));
        assert!(s1_sees[0].dor().is_responsible_for(&boundary));

        assert_eq!(s1.describe_peers().len(), 1);
        assert!(s1.describe_peers()[0].starts_with(&s2.sync_id().to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unreachable_peer_does_not_stop_bootstrap() {
        let network = MemNetwork::new();
        let s1 = server(
            Region::rect(0.0, 10.0, 0.0, 10.0),
            vec!["nowhere".into(), "world-2".into()],
        );
        let s2 = server(Region::WholeWorld, Vec::new());

        let (ep1, _inbound1) = network.endpoint("world-1", s1.responder());
        let (_ep2, inbound2) = network.endpoint("world-2", s2.responder());
        tokio::spawn(s2.clone().run_acceptor(inbound2));

        s1.bootstrap(&ep1).await;
        settle(&s1, 1).await;
        assert_eq!(s1.registry().snapshot()[0].sync_id(), s2.sync_id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bidirectional_dials_collapse_to_one_peer_each() {
        let network = MemNetwork::new();
        let s1 = server(Region::rect(0.0, 10.0, 0.0, 10.0), vec!["world-2".into()]);
        let s2 = server(Region::rect(10.0, 20.0, 0.0, 10.0), vec!["world-1".into()]);

        let (ep1, inbound1) = network.endpoint("world-1", s1.responder());
        let (ep2, inbound2) = network.endpoint("world-2", s2.responder());
        tokio::spawn(s1.clone().run_acceptor(inbound1));
        tokio::spawn(s2.clone().run_acceptor(inbound2));

        tokio::join!(s1.bootstrap(&ep1), s2.bootstrap(&ep2));
        settle(&s1, 1).await;
        settle(&s2, 1).await;

        // four connection ends handshook, one logical peer survives per side
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(s1.registry().len(), 1);
        assert_eq!(s2.registry().len(), 1);
        assert_eq!(s1.registry().snapshot()[0].sync_id(), s2.sync_id());
        assert_eq!(s2.registry().snapshot()[0].sync_id(), s1.sync_id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dialing_our_own_address_admits_nothing() {
        let network = MemNetwork::new();
        let s1 = server(Region::WholeWorld, vec!["world-1".into()]);

        let (ep1, inbound1) = network.endpoint("world-1", s1.responder());
        tokio::spawn(s1.clone().run_acceptor(inbound1));

        s1.bootstrap(&ep1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(s1.registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn peer_disconnect_empties_the_registry() {
        let network = MemNetwork::new();
        let s1 = server(Region::WholeWorld, vec!["world-2".into()]);
        let s2 = server(Region::WholeWorld, Vec::new());

        let (ep1, inbound1) = network.endpoint("world-1", s1.responder());
        let (_ep2, inbound2) = network.endpoint("world-2", s2.responder());
        tokio::spawn(s1.clone().run_acceptor(inbound1));
        tokio::spawn(s2.clone().run_acceptor(inbound2));

        s1.bootstrap(&ep1).await;
        settle(&s1, 1).await;
        settle(&s2, 1).await;

        // closing either end tears the peer out of both registries
        s1.registry().snapshot()[0].conn().close();
        settle(&s1, 0).await;
        settle(&s2, 0).await;
    }
}
