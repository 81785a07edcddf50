//! Request/response access to the race server.

use std::future::Future;
use std::time::Duration;

use race_core::WagerRequest;
use race_proto::{
    decode_payload, encode_frame, frame_len, ActiveRound, FrameError, RoundId, RpcEnvelope,
    RpcRequest, RpcResponse, Wager, WagerAck,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server error: {0}")]
    Server(String),
    #[error("unexpected response to {request}: {response}")]
    UnexpectedResponse {
        request: &'static str,
        response: &'static str,
    },
}

/// The three calls the engine makes against the server.
pub trait RoundService: Send + Sync + 'static {
    fn active_round(
        &self,
    ) -> impl Future<Output = Result<Option<ActiveRound>, TransportError>> + Send;

    fn my_wagers(
        &self,
        round_id: RoundId,
    ) -> impl Future<Output = Result<Vec<Wager>, TransportError>> + Send;

    fn wager(
        &self,
        request: WagerRequest,
    ) -> impl Future<Output = Result<WagerAck, TransportError>> + Send;
}

/// One TCP connection per call: write a framed [`RpcEnvelope`], read one
/// framed [`RpcResponse`].
#[derive(Debug, Clone)]
pub struct TcpRoundService {
    endpoint: String,
    player: String,
    timeout: Duration,
}

impl TcpRoundService {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(endpoint: impl Into<String>, player: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            player: player.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
        let envelope = RpcEnvelope {
            player: self.player.clone(),
            request,
        };
        match tokio::time::timeout(self.timeout, self.exchange(&envelope)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self, envelope: &RpcEnvelope) -> Result<RpcResponse, TransportError> {
        let mut stream = TcpStream::connect(&self.endpoint).await?;
        let frame = encode_frame(envelope)?;
        stream.write_all(&frame).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = frame_len(len_buf)?;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        let response: RpcResponse = decode_payload(&payload)?;
        trace!(target: "race::transport", endpoint = %self.endpoint, bytes = len, "rpc.response");
        match response {
            RpcResponse::Error { message } => Err(TransportError::Server(message)),
            other => Ok(other),
        }
    }
}

fn response_name(response: &RpcResponse) -> &'static str {
    match response {
        RpcResponse::ActiveRound(_) => "activeRound",
        RpcResponse::MyWagers(_) => "myWagers",
        RpcResponse::Wager(_) => "wager",
        RpcResponse::Error { .. } => "error",
    }
}

impl RoundService for TcpRoundService {
    async fn active_round(&self) -> Result<Option<ActiveRound>, TransportError> {
        match self.call(RpcRequest::ActiveRound).await? {
            RpcResponse::ActiveRound(active) => Ok(active),
            other => Err(TransportError::UnexpectedResponse {
                request: "activeRound",
                response: response_name(&other),
            }),
        }
    }

    async fn my_wagers(&self, round_id: RoundId) -> Result<Vec<Wager>, TransportError> {
        match self.call(RpcRequest::MyWagers { round_id }).await? {
            RpcResponse::MyWagers(wagers) => Ok(wagers),
            other => Err(TransportError::UnexpectedResponse {
                request: "myWagers",
                response: response_name(&other),
            }),
        }
    }

    async fn wager(&self, request: WagerRequest) -> Result<WagerAck, TransportError> {
        debug!(
            target: "race::transport",
            round = %request.round_id,
            car = %request.car_id,
            action = %request.action,
            "wager.submitted"
        );
        let call = RpcRequest::Wager {
            round_id: request.round_id,
            car_id: request.car_id,
            action: request.action,
        };
        match self.call(call).await? {
            RpcResponse::Wager(ack) => Ok(ack),
            other => Err(TransportError::UnexpectedResponse {
                request: "wager",
                response: response_name(&other),
            }),
        }
    }
}
