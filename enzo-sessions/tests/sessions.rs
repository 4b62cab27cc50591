//! Sessions operations against an in-memory store speaking the server
//! side of the protocol.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use enzo_core::{Client, ClientOptions, Frame, MemoryConnector, MemoryPeer, MessageType};
use enzo_sessions::{Sessions, SessionsError, ValueTag};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_test::assert_ok;

// ── Fake server ──────────────────────────────────────────────────

fn respond(status: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(status);
    buf.put_u32_le(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

fn take_key(buf: &mut &[u8]) -> String {
    let len = buf.get_u32_le() as usize;
    let key = String::from_utf8(buf[..len].to_vec()).unwrap();
    buf.advance(len);
    key
}

/// Answer plugin frames until the client goes away. Deletes get the
/// empty acknowledgement a server sends for requests nobody answered.
fn serve(mut peer: MemoryPeer) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut store: HashMap<String, Vec<u8>> = HashMap::new();
        while let Ok(frame) = peer.recv_request().await {
            assert_eq!(frame.message_type, MessageType::Plugin);
            let key = frame.key().unwrap().to_string();
            let mut body: &[u8] = frame.data().unwrap();

            let reply = match key.as_str() {
                "sessions|get" => {
                    let name = take_key(&mut body);
                    match store.get(&name) {
                        Some(value) => respond(0x01, value),
                        None if name == "ghost" => respond(0x01, b""),
                        None => respond(0x02, b"key not found"),
                    }
                }
                "sessions|set" => {
                    let ttl = body.get_i32_le();
                    let name = take_key(&mut body);
                    let len = body.get_u32_le() as usize;
                    if ttl < 0 {
                        store.remove(&name);
                        Bytes::new()
                    } else {
                        store.insert(name, body[..len].to_vec());
                        respond(0x01, b"")
                    }
                }
                "sessions|ttl" => {
                    let _ttl = body.get_i32_le();
                    if store.contains_key(&take_key(&mut body)) {
                        respond(0x01, b"")
                    } else {
                        respond(0x02, b"key not found")
                    }
                }
                "sessions|sizes" => respond(0x01, &(store.len() as i32).to_le_bytes()),
                "sessions|clean" => {
                    store.clear();
                    respond(0x01, b"")
                }
                other => panic!("unexpected key {other}"),
            };
            peer.send_frame(&Frame::back(frame.id, key, reply)).unwrap();
        }
    })
}

async fn installed() -> (Client, Sessions, JoinHandle<()>) {
    let (connector, mut listener) = MemoryConnector::pair();
    let client = Client::with_connector(
        ClientOptions {
            auto_connect: false,
            ..ClientOptions::new("memory://sessions")
        },
        connector,
    );
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut peer = listener.accept().await.unwrap();
    peer.accept_handshake().await.unwrap();
    assert_ok!(connecting.await.unwrap());

    let mut sessions = Sessions::new();
    client.install(&mut sessions).unwrap();
    (client, sessions, serve(peer))
}

// ── Tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn typed_values_round_trip() {
    let (_client, sessions, _server) = installed().await;

    sessions.set_i32("count", -7, 0).await.unwrap();
    sessions.set_string("name", "ada", 60).await.unwrap();
    sessions.set_bool("admin", true, 0).await.unwrap();

    assert_eq!(sessions.get_i32("count").await.unwrap(), Some(-7));
    assert_eq!(sessions.get_string("name").await.unwrap().as_deref(), Some("ada"));
    assert_eq!(sessions.get_bool("admin").await.unwrap(), Some(true));

    let raw = sessions.get_raw("admin").await.unwrap().unwrap();
    assert_eq!(&raw[..], &[ValueTag::Bool as u8, 0x01]);
}

#[tokio::test]
async fn json_values_are_stored_as_strings() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u32,
        tags: Vec<String>,
    }

    let (_client, sessions, _server) = installed().await;
    let profile = Profile {
        id: 9,
        tags: vec!["a".into(), "b".into()],
    };
    sessions.set_json("profile", &profile, 0).await.unwrap();

    let back: Option<Profile> = sessions.get_json("profile").await.unwrap();
    assert_eq!(back, Some(profile));
    assert!(sessions.get_string("profile").await.unwrap().unwrap().starts_with('{'));
}

#[tokio::test]
async fn type_mismatch_is_reported() {
    let (_client, sessions, _server) = installed().await;
    sessions.set_string("name", "ada", 0).await.unwrap();

    match sessions.get_i32("name").await {
        Err(SessionsError::TypeMismatch { expected, found }) => {
            assert_eq!(expected, ValueTag::Int32);
            assert_eq!(found, ValueTag::String as u8);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn missing_keys_are_remote_errors() {
    let (_client, sessions, _server) = installed().await;

    let err = sessions.get_string("nope").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(sessions.ttl("nope", 10).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_accepts_the_empty_acknowledgement() {
    let (_client, sessions, _server) = installed().await;
    sessions.set_bool("flag", false, 0).await.unwrap();
    assert_eq!(sessions.sizes().await.unwrap(), 1);

    sessions.del("flag").await.unwrap();
    assert_eq!(sessions.sizes().await.unwrap(), 0);
    assert!(sessions.get_bool("flag").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn ttl_sizes_and_clean() {
    let (_client, sessions, _server) = installed().await;
    sessions.set_i32("a", 1, 0).await.unwrap();
    sessions.set_i32("b", 2, 0).await.unwrap();

    sessions.ttl("a", 30).await.unwrap();
    assert_eq!(sessions.sizes().await.unwrap(), 2);

    sessions.clean().await.unwrap();
    assert_eq!(sessions.sizes().await.unwrap(), 0);
}

#[tokio::test]
async fn empty_values_read_as_none() {
    let (_client, sessions, _server) = installed().await;
    assert_eq!(sessions.get_raw("ghost").await.unwrap(), None);
    assert_eq!(sessions.get_i32("ghost").await.unwrap(), None);

    // A stored empty string still carries its tag.
    sessions.set_raw("blank", ValueTag::String, b"", 0).await.unwrap();
    assert_eq!(sessions.get_string("blank").await.unwrap().as_deref(), Some(""));
}

#[tokio::test]
async fn second_install_is_refused() {
    let (client, _sessions, _server) = installed().await;
    let err = client.install(&mut Sessions::new()).unwrap_err();
    assert!(matches!(err, enzo_core::EnzoError::PluginAlreadyInstalled(_)));
}
