//! The `emit` and `listen` subcommands.

use enzo_core::{Client, Context, EnzoError, IntoPayload, Json};
use tokio::sync::mpsc;

/// Render a reply or push for the terminal. JSON data is pretty-printed
/// when `json` is set; anything that is not UTF-8 is shown as a length.
pub fn render(ctx: &Context, json: bool) -> String {
    if json {
        if let Ok(value) = ctx.json::<serde_json::Value>() {
            return serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        }
    }
    match ctx.text() {
        Ok(text) => text,
        Err(_) => format!("<{} bytes>", ctx.data().len()),
    }
}

/// Send one request and return the rendered reply.
///
/// With `json` set, `data` must parse as JSON and is sent re-serialized.
pub async fn emit(
    client: &Client,
    key: &str,
    data: &str,
    long_running: bool,
    json: bool,
) -> Result<String, EnzoError> {
    let payload = if json {
        let value: serde_json::Value = serde_json::from_str(data)?;
        Json(value).into_payload()?
    } else {
        data.into_payload()?
    };
    let reply = if long_running {
        client.emit_long_running(key, payload).await?
    } else {
        client.emit(key, payload).await?
    };
    Ok(render(&reply, json))
}

/// One push received by `listen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    pub key: String,
    pub text: String,
}

/// Subscribe to `keys`, answering every push with `ok`. Pushes are
/// forwarded to the returned channel for printing.
pub fn listen(client: &Client, keys: &[String], json: bool) -> mpsc::UnboundedReceiver<Push> {
    let (tx, rx) = mpsc::unbounded_channel();
    for key in keys {
        let tx = tx.clone();
        client.on(key.clone(), move |ctx| {
            let tx = tx.clone();
            async move {
                let push = Push {
                    key: ctx.key().to_string(),
                    text: render(&ctx, json),
                };
                if let Err(e) = ctx.write("ok") {
                    tracing::debug!(error = %e, "push already answered");
                }
                let _ = tx.send(push);
            }
        });
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use enzo_core::{ClientOptions, Frame, MemoryConnector, MemoryPeer, MessageType};

    async fn connected() -> (Client, MemoryPeer) {
        let (connector, mut listener) = MemoryConnector::pair();
        let client = Client::with_connector(
            ClientOptions {
                auto_connect: false,
                ..ClientOptions::new("memory://cli")
            },
            connector,
        );
        let connecting = tokio::spawn({
            let client = client.clone();
            async move { client.connect().await }
        });
        let mut peer = listener.accept().await.unwrap();
        peer.accept_handshake().await.unwrap();
        connecting.await.unwrap().unwrap();
        (client, peer)
    }

    #[tokio::test]
    async fn emit_json_sends_compact_and_prints_pretty() {
        let (client, mut peer) = connected().await;
        let server = tokio::spawn(async move {
            let request = peer.recv_request().await.unwrap();
            assert_eq!(&request.data().unwrap()[..], br#"{"a":1}"#);
            peer.send_frame(&Frame::back(request.id, "q", r#"{"b":[1,2]}"#))
                .unwrap();
        });

        let out = emit(&client, "q", r#"{ "a": 1 }"#, false, true).await.unwrap();
        assert!(out.contains("\"b\": ["));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn emit_rejects_invalid_json_input() {
        let (client, _peer) = connected().await;
        let err = emit(&client, "q", "{not json", false, true).await.unwrap_err();
        assert!(matches!(err, EnzoError::Json(_)));
    }

    #[tokio::test]
    async fn listen_forwards_and_answers_pushes() {
        let (client, mut peer) = connected().await;
        let mut pushes = listen(&client, &["news".to_string()], false);

        let push = Frame::post("news", "hello");
        peer.send_frame(&push).unwrap();

        assert_eq!(
            pushes.recv().await.unwrap(),
            Push {
                key: "news".into(),
                text: "hello".into()
            }
        );
        let reply = peer.recv_request().await.unwrap();
        assert_eq!(reply.message_type, MessageType::Back);
        assert_eq!(reply.id, push.id);
        assert_eq!(&reply.data().unwrap()[..], b"ok");
    }
}
