use serde::{Deserialize, Serialize};

/// Gemini Live BidiGenerateContent WebSocket endpoint.
pub const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Input sample rate the session expects (PCM 16-bit mono).
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Configuration for one live transcription session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// API key for the Gemini Live endpoint.
    pub api_key: String,
    /// Model name, e.g. "gemini-2.5-flash-native-audio-preview-12-2025".
    pub model: String,
    /// System instruction sent in the setup message. Fixes the broadcast
    /// language and constrains the model to caption speech only: no
    /// annotation tags, no output on silence, no cross-language
    /// hallucination.
    pub system_instruction: String,
    /// WebSocket endpoint; overridable for tests.
    pub endpoint: String,
    /// Samples per audio frame sent on the session (at 16 kHz mono).
    pub frame_samples: usize,
    /// Seconds to wait for the session handshake before giving up.
    pub connect_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            system_instruction: default_system_instruction(),
            endpoint: LIVE_ENDPOINT.to_string(),
            frame_samples: 4096,
            connect_timeout_secs: 30,
        }
    }
}

/// The live-captioning instruction for Brazilian Portuguese broadcasts.
pub fn default_system_instruction() -> String {
    "\
Você é um transcritor profissional de legendas ao vivo para Português do Brasil.
Sua única função é ouvir o áudio e converter fielmente em texto bem pontuado.

REGRAS RÍGIDAS:
1. NÃO inclua tags de metadados como <noise>, [risos], [aplausos] ou *sons*. Ignore o que não for fala.
2. Se o áudio for apenas ruído ou silêncio, NÃO GERE TEXTO. Fique em silêncio.
3. Não alucine textos em outros idiomas (Japonês, Chinês) se a fala for em Português.
4. Mantenha a pontuação gramatical correta para facilitar a leitura em projeções.
"
    .to_string()
}
