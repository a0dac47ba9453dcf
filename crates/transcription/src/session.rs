use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::audio::{self, AudioSource, CaptureError, CaptureHandle, FrameBuffer, encode_pcm16_base64};
use crate::clean::clean_transcript;
use crate::config::SessionConfig;

/// User-facing message for handshake/transport failures, mirrored to the
/// caption operator verbatim.
const CONNECTION_ERROR_MESSAGE: &str = "Erro na conexão com a IA.";

/// Receives session notifications. Wired once at construction; the owner
/// observes all session activity through this interface rather than through
/// return values scattered across callbacks.
pub trait EventSink: Send + Sync + 'static {
    fn on_connect(&self);
    fn on_disconnect(&self);
    fn on_error(&self, message: &str);
    /// Cumulative cleaned text for the current turn. `is_final` marks the
    /// one closing update of a turn.
    fn on_transcription_update(&self, text: &str, is_final: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Streaming,
    Closing,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not connected; call connect() first")]
    NotConnected,
    #[error("a session is already active")]
    AlreadyActive,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// One logical connection to the Gemini Live speech backend.
///
/// Owns the WebSocket session, the audio capture device and the encoding
/// pipeline between them. At most one session is active per client; the
/// owner holds exactly one instance per broadcaster.
pub struct LiveSessionClient {
    config: SessionConfig,
    sink: Arc<dyn EventSink>,
    state: Mutex<SessionState>,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    capture: Mutex<Option<CaptureHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    disconnect_notified: AtomicBool,
}

impl LiveSessionClient {
    pub fn new(config: SessionConfig, sink: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sink,
            state: Mutex::new(SessionState::Idle),
            outbound: Mutex::new(None),
            capture: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            // No session yet, so there is nothing to report a disconnect for.
            disconnect_notified: AtomicBool::new(true),
        })
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Opens the streaming session and completes the setup handshake.
    ///
    /// Failures are reported through `on_error` with a user-facing message
    /// and additionally returned so the caller can reset its own flags.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            if *state != SessionState::Idle {
                return Err(SessionError::AlreadyActive);
            }
            *state = SessionState::Connecting;
        }

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);

        let ws = match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                return self.fail_connect(format!("WebSocket connect failed: {e}")).await;
            }
            Err(_) => {
                return self.fail_connect("WebSocket connect timed out".to_string()).await;
            }
        };

        let (mut write, mut read) = ws.split();

        let setup = self.setup_message();
        if let Err(e) = write.send(Message::text(setup.to_string())).await {
            return self.fail_connect(format!("setup send failed: {e}")).await;
        }

        // The backend acknowledges the configuration with a setupComplete
        // message before any transcription flows.
        let acknowledged = tokio::time::timeout(timeout, async {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if is_setup_complete(text.as_str()) {
                            return true;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if let Ok(text) = std::str::from_utf8(&data)
                            && is_setup_complete(text)
                        {
                            return true;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => return false,
                    Ok(_) => {}
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        if !acknowledged {
            return self
                .fail_connect("session handshake did not complete".to_string())
                .await;
        }

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);

        // Writer: drains the outbound queue and closes the socket once every
        // sender is gone. Deliberately not aborted on disconnect so the close
        // frame gets flushed.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    debug!(%e, "Outbound send failed");
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // The session must be fully published before the reader exists: a
        // close frame already buffered would otherwise run teardown() before
        // these writes and leave a Connected state with no live socket.
        *self.outbound.lock().await = Some(out_tx);
        *self.state.lock().await = SessionState::Connected;
        self.disconnect_notified.store(false, Ordering::SeqCst);
        info!(model = %self.config.model, "Live session opened");
        self.sink.on_connect();

        let client = Arc::clone(self);
        let reader = tokio::spawn(async move {
            let mut aggregator = TurnAggregator::default();
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str())
                        {
                            aggregator.handle_server_message(&value, client.sink.as_ref());
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&data) {
                            aggregator.handle_server_message(&value, client.sink.as_ref());
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Live session closed by remote");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%e, "Live session transport error");
                        client.sink.on_error(CONNECTION_ERROR_MESSAGE);
                        break;
                    }
                }
            }
            // Remote-initiated close: release everything this side holds.
            client.teardown().await;
        });

        self.tasks.lock().await.push(reader);
        Ok(())
    }

    /// Starts capturing the selected source and streaming it on the session.
    ///
    /// Requires a successful `connect()`. Frames are sent fire-and-forget: a
    /// failed or dropped frame is never retried and never aborts the session.
    pub async fn start_audio_stream(
        self: &Arc<Self>,
        source: AudioSource,
    ) -> Result<(), SessionError> {
        if *self.state.lock().await != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let out_tx = self
            .outbound
            .lock()
            .await
            .clone()
            .ok_or(SessionError::NotConnected)?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<f32>>(64);
        let capture = audio::start_capture(source, chunk_tx).await?;
        let mut frames = FrameBuffer::new(capture.sample_rate(), self.config.frame_samples)?;
        *self.capture.lock().await = Some(capture);

        let encoder = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let mut pending = Vec::new();
                frames.push(&chunk, &mut |frame| {
                    pending.push(Message::text(realtime_input_message(frame).to_string()));
                });
                for msg in pending {
                    if out_tx.try_send(msg).is_err() {
                        debug!("Dropped audio frame (outbound queue unavailable)");
                    }
                }
            }
        });

        self.tasks.lock().await.push(encoder);
        *self.state.lock().await = SessionState::Streaming;
        info!(?source, "Audio streaming started");
        Ok(())
    }

    /// Tears down the session: capture device first, then the remote socket.
    ///
    /// Idempotent and safe in any state. The audio device is released
    /// unconditionally; a failing socket close cannot skip it.
    pub async fn disconnect(self: &Arc<Self>) {
        *self.state.lock().await = SessionState::Closing;
        self.teardown().await;
        for task in std::mem::take(&mut *self.tasks.lock().await) {
            task.abort();
        }
    }

    /// Shared release path for voluntary disconnects and remote closes.
    /// Every step runs regardless of the outcome of the previous one.
    async fn teardown(&self) {
        if let Some(mut capture) = self.capture.lock().await.take() {
            capture.stop();
        }
        // Dropping the last sender makes the writer flush a close frame.
        self.outbound.lock().await.take();
        *self.state.lock().await = SessionState::Idle;
        if !self.disconnect_notified.swap(true, Ordering::SeqCst) {
            self.sink.on_disconnect();
        }
    }

    async fn fail_connect(&self, detail: String) -> Result<(), SessionError> {
        *self.state.lock().await = SessionState::Idle;
        warn!(%detail, "Live session connect failed");
        self.sink.on_error(CONNECTION_ERROR_MESSAGE);
        Err(SessionError::Connection(detail))
    }

    fn setup_message(&self) -> serde_json::Value {
        json!({
            "setup": {
                "model": format!("models/{}", self.config.model),
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                },
                "inputAudioTranscription": {},
                "systemInstruction": {
                    "parts": [{ "text": self.config.system_instruction }]
                },
            }
        })
    }
}

fn is_setup_complete(raw: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(|v| v.get("setupComplete").is_some())
        .unwrap_or(false)
}

fn realtime_input_message(frame: &[f32]) -> serde_json::Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": "audio/pcm;rate=16000",
                "data": encode_pcm16_base64(frame),
            }]
        }
    })
}

/// Accumulates the raw per-turn transcription and converts it into cleaned
/// partial/final events.
#[derive(Debug, Default)]
struct TurnAggregator {
    buffer: String,
}

impl TurnAggregator {
    fn handle_server_message(&mut self, value: &serde_json::Value, sink: &dyn EventSink) {
        if let Some(text) = value
            .pointer("/serverContent/inputTranscription/text")
            .and_then(|t| t.as_str())
            && !text.is_empty()
        {
            self.buffer.push_str(text);
            let cleaned = clean_transcript(&self.buffer);
            if !cleaned.is_empty() {
                sink.on_transcription_update(&cleaned, false);
            }
        }

        if value
            .pointer("/serverContent/turnComplete")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            if !self.buffer.trim().is_empty() {
                let cleaned = clean_transcript(&self.buffer);
                if !cleaned.is_empty() {
                    sink.on_transcription_update(&cleaned, true);
                }
            }
            // Always reset, so a blank turn cannot leave a dirty buffer
            // behind for the next one.
            self.buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        updates: StdMutex<Vec<(String, bool)>>,
        errors: StdMutex<Vec<String>>,
        connects: StdMutex<u32>,
        disconnects: StdMutex<u32>,
    }

    impl EventSink for RecordingSink {
        fn on_connect(&self) {
            *self.connects.lock().unwrap() += 1;
        }
        fn on_disconnect(&self) {
            *self.disconnects.lock().unwrap() += 1;
        }
        fn on_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
        fn on_transcription_update(&self, text: &str, is_final: bool) {
            self.updates
                .lock()
                .unwrap()
                .push((text.to_string(), is_final));
        }
    }

    fn transcription_message(text: &str) -> serde_json::Value {
        json!({ "serverContent": { "inputTranscription": { "text": text } } })
    }

    fn turn_complete_message() -> serde_json::Value {
        json!({ "serverContent": { "turnComplete": true } })
    }

    #[test]
    fn test_partial_update_emits_cleaned_cumulative_text() {
        let sink = RecordingSink::default();
        let mut agg = TurnAggregator::default();
        agg.handle_server_message(&transcription_message("Bom dia"), &sink);
        agg.handle_server_message(&transcription_message(" a todos"), &sink);

        let updates = sink.updates.lock().unwrap();
        assert_eq!(
            *updates,
            vec![
                ("Bom dia".to_string(), false),
                ("Bom dia a todos".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_turn_complete_emits_final_and_resets() {
        let sink = RecordingSink::default();
        let mut agg = TurnAggregator::default();
        agg.handle_server_message(&transcription_message("Bom dia a todos <noise> "), &sink);
        agg.handle_server_message(&turn_complete_message(), &sink);
        agg.handle_server_message(&transcription_message("Próximo turno"), &sink);

        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates[updates.len() - 2].0, "Bom dia a todos");
        assert!(updates[updates.len() - 2].1);
        // The buffer was reset: the next partial starts from scratch.
        assert_eq!(
            updates.last().unwrap(),
            &("Próximo turno".to_string(), false)
        );
    }

    #[test]
    fn test_noise_only_turn_emits_nothing() {
        let sink = RecordingSink::default();
        let mut agg = TurnAggregator::default();
        agg.handle_server_message(&transcription_message("<noise> [risos]"), &sink);
        agg.handle_server_message(&turn_complete_message(), &sink);

        assert!(sink.updates.lock().unwrap().is_empty());
        assert!(agg.buffer.is_empty());
    }

    #[test]
    fn test_whitespace_partial_emits_nothing() {
        let sink = RecordingSink::default();
        let mut agg = TurnAggregator::default();
        agg.handle_server_message(&transcription_message("   "), &sink);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_setup_complete_detection() {
        assert!(is_setup_complete(r#"{"setupComplete":{}}"#));
        assert!(!is_setup_complete(r#"{"serverContent":{}}"#));
        assert!(!is_setup_complete("not json"));
    }

    #[test]
    fn test_realtime_input_message_shape() {
        let msg = realtime_input_message(&[0.0, 0.5]);
        let chunk = &msg["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert!(chunk["data"].as_str().is_some_and(|d| !d.is_empty()));
    }

    /// Local stand-in for the speech backend: completes the setup handshake,
    /// then either closes immediately or idles until the client closes.
    async fn handshake_server(
        close_after_setup: bool,
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // The setup message arrives first.
            let _ = ws.next().await;
            ws.send(Message::text(r#"{"setupComplete":{}}"#))
                .await
                .unwrap();
            if close_after_setup {
                let _ = ws.send(Message::Close(None)).await;
            } else {
                while let Some(Ok(msg)) = ws.next().await {
                    if matches!(msg, Message::Close(_)) {
                        break;
                    }
                }
            }
        });
        (addr, server)
    }

    fn local_config(addr: std::net::SocketAddr) -> SessionConfig {
        SessionConfig {
            endpoint: format!("ws://{addr}/session"),
            connect_timeout_secs: 5,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_remote_close_after_handshake_lands_idle_with_disconnect() {
        let (addr, server) = handshake_server(true).await;
        let sink = Arc::new(RecordingSink::default());
        let client = LiveSessionClient::new(local_config(addr), sink.clone());

        client.connect().await.unwrap();
        assert_eq!(*sink.connects.lock().unwrap(), 1);

        // The buffered close frame reaches the reader after connect()
        // returns; wait for the teardown to land.
        let mut tries = 0;
        while *sink.disconnects.lock().unwrap() == 0 && tries < 100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tries += 1;
        }
        assert_eq!(*sink.disconnects.lock().unwrap(), 1);
        assert_eq!(client.state().await, SessionState::Idle);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_while_active_is_rejected() {
        let (addr, server) = handshake_server(false).await;
        let sink = Arc::new(RecordingSink::default());
        let client = LiveSessionClient::new(local_config(addr), sink.clone());

        client.connect().await.unwrap();
        let second = client.connect().await;
        assert!(matches!(second, Err(SessionError::AlreadyActive)));

        client.disconnect().await;
        assert_eq!(client.state().await, SessionState::Idle);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let client = LiveSessionClient::new(SessionConfig::default(), sink.clone());

        client.disconnect().await;
        client.disconnect().await;

        assert_eq!(client.state().await, SessionState::Idle);
        // Never connected, so no disconnect notification is owed.
        assert_eq!(*sink.disconnects.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_audio_stream_requires_connect() {
        let sink = Arc::new(RecordingSink::default());
        let client = LiveSessionClient::new(SessionConfig::default(), sink);

        let result = client.start_audio_stream(AudioSource::Microphone).await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }
}
