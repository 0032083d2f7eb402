use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pairlink_relay::registry::{Connection, ConnectionId, Outbound, Registry};
use pairlink_relay::{Broker, ClientMessage, RelayServerConfig};
use tokio::sync::mpsc;

fn populated(hosts: usize) -> (Registry, Vec<mpsc::UnboundedReceiver<Outbound>>) {
    let mut registry = Registry::new();
    let mut receivers = Vec::with_capacity(hosts);
    for i in 0..hosts {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::random();
        registry.insert_connection(Connection::new(id, tx));
        registry.register_host(&format!("KEY{i}"), id).unwrap();
        registry.register_peer(&format!("peer-{i}"), id).unwrap();
        receivers.push(rx);
    }
    (registry, receivers)
}

fn bench_lookup_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup_host");

    for &size in &[100usize, 10_000, 100_000] {
        let (registry, _rx) = populated(size);
        let key = format!("KEY{}", size / 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), &key, |b, key| {
            b.iter(|| registry.lookup_host(black_box(key)))
        });
    }

    group.finish();
}

fn bench_lookup_peer(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup_peer");

    for &size in &[100usize, 10_000, 100_000] {
        let (registry, _rx) = populated(size);
        let peer = format!("peer-{}", size - 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &peer, |b, peer| {
            b.iter(|| registry.lookup_peer(black_box(peer)))
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let text = r#"{"type":"MULTIPLEX","channel":"sync","targetId":null,"payload":{"cursor":[12,40],"doc":"notes"},"timestamp":1700000000000}"#;

    c.bench_function("decode_multiplex", |b| {
        b.iter(|| ClientMessage::from_json(black_box(text)))
    });
}

fn bench_pairing(c: &mut Criterion) {
    c.bench_function("register_join_disconnect", |b| {
        let mut broker = Broker::new(RelayServerConfig::default());
        b.iter(|| {
            let (host_tx, _host_rx) = mpsc::unbounded_channel();
            let (guest_tx, _guest_rx) = mpsc::unbounded_channel();
            let host = ConnectionId::random();
            let guest = ConnectionId::random();

            broker.connect(host, host_tx).unwrap();
            broker.connect(guest, guest_tx).unwrap();
            broker.handle(
                host,
                ClientMessage::Register {
                    key: "BENCH".to_string(),
                },
            );
            broker.handle(
                guest,
                ClientMessage::Join {
                    key: "BENCH".to_string(),
                },
            );
            broker.disconnect(guest);
            broker.disconnect(host);
        })
    });
}

criterion_group!(
    benches,
    bench_lookup_host,
    bench_lookup_peer,
    bench_decode,
    bench_pairing
);
criterion_main!(benches);
