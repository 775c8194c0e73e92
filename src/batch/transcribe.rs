use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::ledger::service::OpenAiClient;

pub const TRANSCRIPTION_SYSTEM_PROMPT: &str = "You are a careful OCR assistant. \
You read historical ledger pages and transcribe the text faithfully, line by line, \
without adding extra interpretation.";

pub const TRANSCRIPTION_INSTRUCTIONS: &str = "\
Please transcribe all visible text from this ledger page.\n\
- Preserve the line order from top to bottom.\n\
- Separate lines with newline characters.\n\
- Include column headers, names, places, and amounts.\n\
- Do NOT summarise or interpret; just transcribe.";

/// Image to text. Failures are fatal to the run; there is no fallback transcription.
pub trait PageTranscriber {
    fn transcribe(&self, image_path: &Path) -> Result<String>;
}

pub struct VisionTranscriber<'a> {
    client: &'a OpenAiClient,
    model: &'a str,
}

impl<'a> VisionTranscriber<'a> {
    pub fn new(client: &'a OpenAiClient, model: &'a str) -> Self {
        Self { client, model }
    }
}

impl PageTranscriber for VisionTranscriber<'_> {
    fn transcribe(&self, image_path: &Path) -> Result<String> {
        let png_base64 = encode_image(image_path)?;
        let text = self
            .client
            .complete_with_image(
                self.model,
                TRANSCRIPTION_SYSTEM_PROMPT,
                TRANSCRIPTION_INSTRUCTIONS,
                &png_base64,
            )
            .with_context(|| format!("transcription failed for {}", image_path.display()))?;

        let text = text.trim().to_string();
        debug!(image = %image_path.display(), chars = text.len(), "page transcribed");
        Ok(text)
    }
}

fn encode_image(image_path: &Path) -> Result<String> {
    if !image_path.is_file() {
        bail!("image not found at {}", image_path.display());
    }
    let bytes =
        fs::read(image_path).with_context(|| format!("failed to read {}", image_path.display()))?;
    Ok(STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn encodes_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-1.png");
        fs::write(&path, b"\x89PNG").unwrap();
        assert_eq!(encode_image(&path).unwrap(), "iVBORw==");
    }

    fn client(api_key: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(&ServiceConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            api_key: api_key.map(str::to_string),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn missing_image_fails_before_any_request() {
        let client = client(Some("test-key"));
        let transcriber = VisionTranscriber::new(&client, "gpt-4o-mini");

        let error = transcriber
            .transcribe(Path::new("/nonexistent/page-1.png"))
            .unwrap_err();
        assert!(error.to_string().contains("image not found"));
    }

    #[test]
    fn transcription_without_api_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-1.png");
        fs::write(&path, b"\x89PNG").unwrap();

        let client = client(None);
        let transcriber = VisionTranscriber::new(&client, "gpt-4o-mini");

        let error = transcriber.transcribe(&path).unwrap_err();
        assert!(format!("{error:#}").contains("OPENAI_API_KEY is not set"));
    }

    #[test]
    fn instructions_ask_for_verbatim_lines() {
        assert!(TRANSCRIPTION_INSTRUCTIONS.contains("Preserve the line order"));
        assert!(TRANSCRIPTION_SYSTEM_PROMPT.starts_with("You are a careful OCR assistant."));
    }
}
