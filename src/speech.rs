/*!
 * Text-to-speech backend over the OpenAI speech endpoint.
 */

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;

use crate::app_config::SpeechConfig;
use crate::backends::SpeechBackend;
use crate::errors::ProviderError;
use crate::providers::openai::{OpenAI, SpeechRequest};

/// Speech synthesis service
#[derive(Debug)]
pub struct SpeechService {
    client: OpenAI,
    model: String,
    voice: String,
    response_format: String,
}

impl SpeechService {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            client: OpenAI::new_with_config(
                config.get_api_key(),
                config.endpoint.clone(),
                config.retry_count,
                config.retry_backoff_ms,
                config.rate_limit,
                config.timeout_secs,
            ),
            model: config.model.clone(),
            voice: config.voice.clone(),
            response_format: config.response_format.clone(),
        }
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }
}

#[async_trait]
impl SpeechBackend for SpeechService {
    async fn synthesize(&self, text: &str) -> Result<Bytes, ProviderError> {
        let request = SpeechRequest::new(&self.model, text, &self.voice)
            .response_format(&self.response_format);
        let audio = self.client.speech(request).await?;
        debug!("Synthesized {} byte(s) of audio with voice {}", audio.len(), self.voice);
        Ok(audio)
    }
}
