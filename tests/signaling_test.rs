use handoff::signaling::{
    ClientMessage, ConnId, Outbound, PeerHandle, Role, RoomRegistry, ServerMessage,
    SignalingSession,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Fire `creators` creates and `joiners` joins at one share id at once
fn storm(creators: usize, joiners: usize) -> (Arc<RoomRegistry>, Vec<(Role, ConnId, bool)>) {
    let registry = Arc::new(RoomRegistry::new());
    let barrier = Arc::new(Barrier::new(creators + joiners));

    let roles = std::iter::repeat(Role::Sender)
        .take(creators)
        .chain(std::iter::repeat(Role::Receiver).take(joiners));

    let workers: Vec<_> = roles
        .map(|role| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (conn, _rx) = PeerHandle::channel();
                barrier.wait();
                let result = match role {
                    Role::Sender => registry.create("storm", &conn),
                    Role::Receiver => registry.join("storm", &conn),
                };
                (role, conn.id(), result.is_ok())
            })
        })
        .collect();

    let outcomes = workers.into_iter().map(|w| w.join().unwrap()).collect();
    (registry, outcomes)
}

#[derive(Debug, Clone)]
enum Op {
    Create(usize, usize),
    Join(usize, usize),
    Disconnect(usize),
}

const CONNS: usize = 4;
const ROOMS: [&str; 2] = ["alpha", "beta"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..CONNS, 0..ROOMS.len()).prop_map(|(c, r)| Op::Create(c, r)),
        (0..CONNS, 0..ROOMS.len()).prop_map(|(c, r)| Op::Join(c, r)),
        (0..CONNS).prop_map(Op::Disconnect),
    ]
}

/// Reference bookkeeping for the registry, in terms of connection indices
#[derive(Default)]
struct Model {
    rooms: HashMap<usize, (Option<usize>, Option<usize>)>,
    tags: [Option<(Role, usize)>; CONNS],
}

impl Model {
    fn create(&mut self, conn: usize, room: usize) -> bool {
        if self.tags[conn].is_some() {
            return false;
        }
        let slots = self.rooms.entry(room).or_default();
        if slots.0.is_some() {
            return false;
        }
        slots.0 = Some(conn);
        self.tags[conn] = Some((Role::Sender, room));
        true
    }

    fn join(&mut self, conn: usize, room: usize) -> bool {
        if self.tags[conn].is_some() {
            return false;
        }
        match self.rooms.get_mut(&room) {
            Some(slots) if slots.0.is_some() && slots.1.is_none() => {
                slots.1 = Some(conn);
                self.tags[conn] = Some((Role::Receiver, room));
                true
            }
            _ => false,
        }
    }

    fn disconnect(&mut self, conn: usize) {
        let Some((role, room)) = self.tags[conn].take() else {
            return;
        };
        let Some(slots) = self.rooms.get_mut(&room) else {
            return;
        };
        match role {
            Role::Sender if slots.0 == Some(conn) => {
                self.rooms.remove(&room);
            }
            Role::Receiver if slots.1 == Some(conn) => {
                slots.1 = None;
                if slots.0.is_none() {
                    self.rooms.remove(&room);
                }
            }
            _ => {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn storm_yields_single_occupants(creators in 1usize..6, joiners in 0usize..6) {
        let (registry, outcomes) = storm(creators, joiners);

        let winners: Vec<_> = outcomes
            .iter()
            .filter(|(role, _, ok)| *role == Role::Sender && *ok)
            .collect();
        let joined: Vec<_> = outcomes
            .iter()
            .filter(|(role, _, ok)| *role == Role::Receiver && *ok)
            .collect();

        prop_assert_eq!(winners.len(), 1);
        prop_assert!(joined.len() <= 1);

        let snapshot = registry.snapshot("storm").unwrap();
        prop_assert_eq!(snapshot.sender, Some(winners[0].1));
        prop_assert_eq!(snapshot.receiver, joined.first().map(|(_, id, _)| *id));
    }

    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let registry = Arc::new(RoomRegistry::new());
        let fresh = |registry: &Arc<RoomRegistry>| {
            let (handle, rx) = PeerHandle::channel();
            (SignalingSession::new(handle, registry.clone()), rx)
        };
        let mut sessions: Vec<_> = (0..CONNS).map(|_| fresh(&registry)).collect();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Create(c, r) => {
                    let result = sessions[c].0.handle_message(ClientMessage::Create {
                        share_id: ROOMS[r].to_string(),
                    });
                    prop_assert_eq!(result.is_ok(), model.create(c, r));
                }
                Op::Join(c, r) => {
                    let result = sessions[c].0.handle_message(ClientMessage::Join {
                        share_id: ROOMS[r].to_string(),
                    });
                    prop_assert_eq!(result.is_ok(), model.join(c, r));
                }
                Op::Disconnect(c) => {
                    let replacement = fresh(&registry);
                    let (closed, _) = std::mem::replace(&mut sessions[c], replacement);
                    closed.close();
                    model.disconnect(c);
                }
            }

            for (r, name) in ROOMS.iter().enumerate() {
                let expected = model.rooms.get(&r).map(|(sender, receiver)| {
                    (
                        sender.map(|c| sessions[c].0.conn().id()),
                        receiver.map(|c| sessions[c].0.conn().id()),
                    )
                });
                let actual = registry
                    .snapshot(name)
                    .map(|snapshot| (snapshot.sender, snapshot.receiver));
                prop_assert_eq!(actual, expected);
            }
            prop_assert_eq!(registry.room_count(), model.rooms.len());
        }
    }
}

#[test]
fn test_duplicate_create_leaves_original_sender() {
    let registry = RoomRegistry::new();
    let (first, _first_rx) = PeerHandle::channel();
    let (second, mut second_rx) = PeerHandle::channel();

    registry.create("x", &first).unwrap();
    assert!(registry.create("x", &second).is_err());

    assert_eq!(registry.snapshot("x").unwrap().sender, Some(first.id()));
    assert!(drain(&mut second_rx).is_empty());
}

#[test]
fn test_sender_departure_notifies_receiver_once() {
    let registry = Arc::new(RoomRegistry::new());
    let (sender_handle, _sender_rx) = PeerHandle::channel();
    let (receiver_handle, mut receiver_rx) = PeerHandle::channel();
    let mut sender = SignalingSession::new(sender_handle, registry.clone());
    let mut receiver = SignalingSession::new(receiver_handle, registry.clone());

    sender.handle_text(r#"{"type":"create","shareId":"x"}"#);
    receiver.handle_text(r#"{"type":"join","shareId":"x"}"#);
    drain(&mut receiver_rx);

    sender.close();
    let disconnected = ServerMessage::PeerDisconnected {
        role: Role::Sender,
        share_id: "x".to_string(),
    };
    assert_eq!(
        drain(&mut receiver_rx),
        vec![Outbound::Message(disconnected), Outbound::Close]
    );
    assert_eq!(registry.room_count(), 0);

    // The evicted receiver closing afterwards changes nothing
    receiver.close();
    assert_eq!(registry.room_count(), 0);
}

#[test]
fn test_receiver_departure_keeps_room() {
    let registry = Arc::new(RoomRegistry::new());
    let (sender_handle, mut sender_rx) = PeerHandle::channel();
    let (receiver_handle, _receiver_rx) = PeerHandle::channel();
    let sender_id = sender_handle.id();
    let mut sender = SignalingSession::new(sender_handle, registry.clone());
    let mut receiver = SignalingSession::new(receiver_handle, registry.clone());

    sender.handle_text(r#"{"type":"create","shareId":"x"}"#);
    receiver.handle_text(r#"{"type":"join","shareId":"x"}"#);
    drain(&mut sender_rx);

    receiver.close();
    let disconnected = ServerMessage::PeerDisconnected {
        role: Role::Receiver,
        share_id: "x".to_string(),
    };
    assert_eq!(drain(&mut sender_rx), vec![Outbound::Message(disconnected)]);

    let snapshot = registry.snapshot("x").unwrap();
    assert_eq!(snapshot.sender, Some(sender_id));
    assert_eq!(snapshot.receiver, None);
}
