//! WebSocket transport: one binary message per frame.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Connection, Connector, MessageSink, MessageStream};
use crate::error::EnzoError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `ws://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, address: &str) -> Result<Connection, EnzoError> {
        let (socket, response) = tokio_tungstenite::connect_async(address).await?;
        tracing::debug!(status = %response.status(), "websocket upgraded");

        let (writer, reader) = socket.split();
        Ok(Connection {
            sink: Box::new(WsSink(writer)),
            stream: Box::new(WsReader(reader)),
        })
    }
}

struct WsSink(SplitSink<Socket, Message>);

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, message: Bytes) -> Result<(), EnzoError> {
        self.0.send(Message::Binary(message.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EnzoError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        self.0.send(Message::Close(Some(frame))).await?;
        if let Err(e) = self.0.close().await {
            tracing::debug!("websocket close after close frame: {e}");
        }
        Ok(())
    }
}

struct WsReader(SplitStream<Socket>);

#[async_trait]
impl MessageStream for WsReader {
    async fn recv(&mut self) -> Option<Result<Bytes, EnzoError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text))),
                Ok(Message::Close(frame)) => {
                    let code = frame.map(|f| u16::from(f.code));
                    tracing::debug!(?code, "websocket closed by peer");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
