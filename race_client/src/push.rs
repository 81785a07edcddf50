//! Server push channel: a TCP stream of length-prefixed [`PushEvent`] frames.

use std::time::Duration;

use race_core::Input;
use race_proto::{decode_payload, frame_len, PushEvent};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, trace, warn};

use crate::service::TransportError;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Keep a push connection open for as long as the engine accepts input.
/// Every successful connect is reported as [`Input::ChannelReconnected`]
/// because events may have been missed while disconnected.
pub async fn run_push_channel(endpoint: String, inputs: UnboundedSender<Input>) {
    loop {
        if inputs.is_closed() {
            break;
        }
        match TcpStream::connect(&endpoint).await {
            Ok(mut stream) => {
                info!(target: "race::transport", %endpoint, "push.connected");
                if inputs.send(Input::ChannelReconnected).is_err() {
                    break;
                }
                match pump_events(&mut stream, &inputs).await {
                    Ok(()) => break,
                    Err(err) => {
                        warn!(target: "race::transport", error = %err, "push.connection_lost");
                    }
                }
            }
            Err(err) => {
                warn!(target: "race::transport", %endpoint, error = %err, "push.connect_failed");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
    info!(target: "race::transport", "push.stopped");
}

/// Forward frames until the stream fails. Returns `Ok` once the engine side
/// has gone away.
pub async fn pump_events<R>(stream: &mut R, inputs: &UnboundedSender<Input>) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    loop {
        stream.read_exact(&mut len_buf).await?;
        let len = frame_len(len_buf)?;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        let event: PushEvent = decode_payload(&payload)?;
        trace!(target: "race::transport", event = event.name(), round = %event.round_id(), "push.event");
        if inputs.send(Input::Push(event)).is_err() {
            return Ok(());
        }
    }
}
