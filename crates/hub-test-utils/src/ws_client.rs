use futures_util::{SinkExt, StreamExt};
use hub_protocol::{ClientMessage, HelloMessage, ServerMessage, Subscriptions};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A raw WebSocket test client speaking the hub's `/ws` wire protocol
/// directly, bypassing `hub-client`'s reconnect engine so integration tests
/// can observe the handshake/replay/live sequence frame-by-frame.
pub struct RawWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl RawWsClient {
    pub async fn connect(ws_url: &str, token: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut url = url::Url::parse(ws_url)?;
        url.query_pairs_mut().append_pair("token", token);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send_hello(
        &mut self,
        after_event_id: i64,
        subscriptions: Option<Subscriptions>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let hello = ClientMessage::Hello(HelloMessage {
            after_event_id,
            subscriptions,
        });
        let json = serde_json::to_string(&hello)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Reads the next `ServerMessage`, silently skipping `heartbeat` frames
    /// (they carry no cursor information a test would assert on).
    pub async fn recv(&mut self) -> Result<ServerMessage, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: ServerMessage = serde_json::from_str(&text)?;
                    if matches!(msg, ServerMessage::Heartbeat(_)) {
                        continue;
                    }
                    return Ok(msg);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    return Err(format!("connection closed by server: {frame:?}").into())
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn recv_event(&mut self) -> Result<hub_protocol::EventEnvelope, Box<dyn std::error::Error>> {
        match self.recv().await? {
            ServerMessage::Event(event) => Ok(event),
            other => Err(format!("expected event frame, got {other:?}").into()),
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
