// crates/grid-peer/tests/peer_sync.rs
//
// Multi-node convergence scenarios: two in-process peers gossiping over
// real sockets, with clients attached to either side.

use std::time::Duration;

use grid_broker::router::Deps;
use grid_client::GridConnection;
use grid_core::offer::Offer;
use grid_peer::config::Config;
use grid_peer::server::Peer;
use grid_protocol::wire::{ClientMessage, Status};

fn peer_config(port: u16, reap_interval_secs: u64, peers: Vec<String>) -> Config {
    Config {
        bind_addr: "127.0.0.1".to_string(),
        port,
        advertise_host: "127.0.0.1".to_string(),
        peers,
        max_sessions: 64,
        sync_interval_secs: 1,
        reap_interval_secs,
        credentials_file: None,
        ledger_file: None,
    }
}

async fn start_peer(config: Config) -> String {
    let peer = Peer::with_gossip(config, Deps::open()).await.unwrap();
    let addr = peer.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = peer.serve().await;
    });
    addr
}

/// Grab a free port by binding and immediately releasing it. Needed when
/// two peers must each know the other's address before either is up.
async fn reserve_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn connect_as(addr: &str, username: &str) -> GridConnection {
    let mut conn = GridConnection::connect(addr).await.unwrap();
    assert!(conn.authenticate(username, "open").await.unwrap());
    conn
}

fn query() -> ClientMessage {
    ClientMessage::BuyerRequest {
        quantity_kwh: 1.0,
        window_start: "10:00".to_string(),
        window_end: "11:00".to_string(),
        duration_secs: 3600,
    }
}

/// Poll a node's listing until it shows `want` offers or the deadline runs
/// out. Convergence is asynchronous, so every cross-node assertion polls.
async fn wait_for_sellers(conn: &mut GridConnection, want: usize) -> Vec<Offer> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let reply = conn.request(&query()).await.unwrap();
        let sellers = reply.available_sellers.unwrap_or_default();
        if sellers.len() == want {
            return sellers;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {want} offers, last saw {}",
            sellers.len()
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn register(quantity_kwh: f64, price_per_kwh: f64) -> ClientMessage {
    ClientMessage::SellerRegister {
        energy_kind: "solar".to_string(),
        quantity_kwh,
        price_per_kwh,
        window_start: "00:00".to_string(),
        window_end: "23:59".to_string(),
        duration_secs: 3600,
    }
}

#[tokio::test]
async fn eager_broadcast_replicates_new_offers() {
    let addr_a = start_peer(peer_config(0, 30, vec![])).await;
    let addr_b = start_peer(peer_config(0, 30, vec![addr_a.clone()])).await;

    let mut alice = connect_as(&addr_b, "alice").await;
    let reply = alice.request(&register(10.0, 5.0)).await.unwrap();
    assert_eq!(reply.status, Status::SellerRegistered);
    let offer_id = reply.offer_id.unwrap();

    // B pushes the registration to A the moment it commits.
    let mut observer = connect_as(&addr_a, "observer").await;
    let sellers = wait_for_sellers(&mut observer, 1).await;
    assert_eq!(sellers[0].id, offer_id);
    assert_eq!(sellers[0].owner.to_string(), "alice");
}

#[tokio::test]
async fn periodic_sync_pulls_offers_the_broadcast_never_reached() {
    // A gossips to nobody, so only B's periodic pull can learn A's offers.
    let addr_a = start_peer(peer_config(0, 30, vec![])).await;
    let addr_b = start_peer(peer_config(0, 1, vec![addr_a.clone()])).await;

    let mut alice = connect_as(&addr_a, "alice").await;
    let reply = alice.request(&register(10.0, 5.0)).await.unwrap();
    assert_eq!(reply.status, Status::SellerRegistered);

    let mut observer = connect_as(&addr_b, "observer").await;
    let sellers = wait_for_sellers(&mut observer, 1).await;
    assert_eq!(sellers[0].owner.to_string(), "alice");

    // Alice has no session on B, but her record is a replica there; B's
    // reaper must leave it alone. Only A may retire it.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let sellers = wait_for_sellers(&mut observer, 1).await;
    assert_eq!(sellers[0].owner.to_string(), "alice");
}

#[tokio::test]
async fn remote_purchase_decrements_everywhere_and_notifies_the_seller() {
    let addr_a = start_peer(peer_config(0, 30, vec![])).await;
    let addr_b = start_peer(peer_config(0, 30, vec![addr_a.clone()])).await;

    let mut alice = connect_as(&addr_a, "alice").await;
    let reply = alice.request(&register(10.0, 5.0)).await.unwrap();
    assert_eq!(reply.status, Status::SellerRegistered);

    // Bob shops on B, which learned the offer through its pull loop.
    let mut bob = connect_as(&addr_b, "bob").await;
    let sellers = wait_for_sellers(&mut bob, 1).await;
    let offer_id = sellers[0].id.clone();

    let reply = bob
        .request(&ClientMessage::Transaction {
            offer_id: offer_id.clone(),
            quantity_kwh: 5.0,
            window_start: None,
            window_end: None,
            duration_secs: None,
        })
        .await
        .unwrap();
    assert_eq!(reply.status, Status::TransactionSuccess);
    assert_eq!(reply.remaining_kwh, Some(5.0));

    // Bob's node told him directly; Alice's node heard the trade over
    // gossip and told her.
    let to_bob = bob.notification_within(Duration::from_secs(5)).await.unwrap();
    assert_eq!(to_bob.role, grid_core::trade::TradeRole::Buyer);
    assert_eq!(to_bob.counterparty.to_string(), "alice");

    let to_alice = alice.notification_within(Duration::from_secs(5)).await.unwrap();
    assert_eq!(to_alice.role, grid_core::trade::TradeRole::Seller);
    assert_eq!(to_alice.counterparty.to_string(), "bob");
    assert_eq!(to_alice.quantity_kwh, 5.0);

    // The decrement reached the owning node too.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let reply = alice.request(&query()).await.unwrap();
        let sellers = reply.available_sellers.unwrap();
        assert_eq!(sellers.len(), 1);
        if sellers[0].quantity_kwh == 5.0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "decrement never replicated");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn reaper_still_fires_after_a_sync_round_trip() {
    let port_a = reserve_port().await;
    let port_b = reserve_port().await;
    let addr_a = format!("127.0.0.1:{port_a}");
    let addr_b = format!("127.0.0.1:{port_b}");

    start_peer(peer_config(port_a, 1, vec![addr_b.clone()])).await;
    start_peer(peer_config(port_b, 1, vec![addr_a.clone()])).await;

    let mut alice = connect_as(&addr_a, "alice").await;
    let reply = alice.request(&register(10.0, 5.0)).await.unwrap();
    assert_eq!(reply.status, Status::SellerRegistered);

    let mut observer_b = connect_as(&addr_b, "observer-b").await;
    wait_for_sellers(&mut observer_b, 1).await;

    // Let both pull loops tick so each node's snapshot (B's now carrying
    // Alice's offer) has echoed back to the other. The offer must still
    // count as locally owned on A afterwards.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    drop(alice);

    // A's reaper retires the orphan and the exit gossips to B.
    let mut observer_a = connect_as(&addr_a, "observer-a").await;
    wait_for_sellers(&mut observer_a, 0).await;
    wait_for_sellers(&mut observer_b, 0).await;

    // Nothing the observers own was touched.
    let reply = observer_a.request(&register(3.0, 2.0)).await.unwrap();
    assert_eq!(reply.status, Status::SellerRegistered);
}

#[tokio::test]
async fn exit_propagates_and_later_syncs_do_not_resurrect() {
    // Symmetric mesh: each peer needs the other's address up front, so the
    // ports are reserved before either node starts.
    let port_a = reserve_port().await;
    let port_b = reserve_port().await;
    let addr_a = format!("127.0.0.1:{port_a}");
    let addr_b = format!("127.0.0.1:{port_b}");

    start_peer(peer_config(port_a, 30, vec![addr_b.clone()])).await;
    start_peer(peer_config(port_b, 30, vec![addr_a.clone()])).await;

    let mut alice = connect_as(&addr_a, "alice").await;
    let reply = alice.request(&register(10.0, 5.0)).await.unwrap();
    let offer_id = reply.offer_id.unwrap();

    let mut observer = connect_as(&addr_b, "observer").await;
    wait_for_sellers(&mut observer, 1).await;

    let reply = alice
        .request(&ClientMessage::SellerExit { offer_id })
        .await
        .unwrap();
    assert_eq!(reply.status, Status::Removed);

    wait_for_sellers(&mut observer, 0).await;

    // Both sync loops keep exchanging snapshots; the offer must stay gone
    // on both sides.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    wait_for_sellers(&mut observer, 0).await;
    wait_for_sellers(&mut alice, 0).await;
}
