//! Speech-to-text collaborator
//!
//! Transcription is an opaque blocking call from the session's point of
//! view. The shipped implementation hands the captured audio to an external
//! command as a temp WAV file and reads the transcript from stdout, either
//! as plain text or as a {"text": ...} JSON object. Model management
//! (download, caching, loading) belongs to that command, not to voxbar.

use crate::config::TranscribeConfig;
use crate::error::TranscribeError;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

/// Trait for speech-to-text implementations.
/// Called from a blocking context; implementations may block freely.
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples (f32, mono) to text
    fn transcribe(&self, samples: &[f32], model: &str) -> Result<String, TranscribeError>;
}

/// Factory function to create the configured transcriber
pub fn create_transcriber(
    config: &TranscribeConfig,
) -> Result<Arc<dyn Transcriber>, TranscribeError> {
    let command = config
        .command
        .clone()
        .ok_or(TranscribeError::NotConfigured)?;
    Ok(Arc::new(CommandTranscriber::new(command, 16000)))
}

/// Transcriber that shells out to an external ASR command
pub struct CommandTranscriber {
    command: String,
    sample_rate: u32,
}

impl CommandTranscriber {
    pub fn new(command: String, sample_rate: u32) -> Self {
        Self {
            command,
            sample_rate,
        }
    }

    /// Write samples as a 16-bit mono WAV at the capture rate
    fn write_wav(&self, path: &Path, samples: &[f32]) -> Result<(), TranscribeError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| TranscribeError::AudioFormat(e.to_string()))?;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(v)
                .map_err(|e| TranscribeError::AudioFormat(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| TranscribeError::AudioFormat(e.to_string()))
    }

    /// Build the shell command line for a given WAV path and model key.
    /// "{file}" and "{model}" placeholders are substituted; without a
    /// "{file}" placeholder the path is appended as the last argument.
    fn command_line(&self, wav_path: &Path, model: &str) -> String {
        let path = wav_path.display().to_string();
        let with_model = self.command.replace("{model}", model);
        if with_model.contains("{file}") {
            with_model.replace("{file}", &path)
        } else {
            format!("{} '{}'", with_model, path)
        }
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, samples: &[f32], model: &str) -> Result<String, TranscribeError> {
        let wav = tempfile::Builder::new()
            .prefix("voxbar-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| TranscribeError::Inference(e.to_string()))?;

        self.write_wav(wav.path(), samples)?;

        let cmdline = self.command_line(wav.path(), model);
        tracing::debug!("Running transcription command: {}", cmdline);

        let output = std::process::Command::new("sh")
            .args(["-c", &cmdline])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| TranscribeError::ModelLoad(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscribeError::Inference(format!(
                "command exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_transcript(&stdout))
    }
}

/// Extract the transcript from command output: either a JSON object with a
/// "text" field, or the raw stdout
fn parse_transcript(stdout: &str) -> String {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                return text.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript_plain() {
        assert_eq!(parse_transcript("hello world\n"), "hello world");
        assert_eq!(parse_transcript("  spaced  "), "spaced");
    }

    #[test]
    fn test_parse_transcript_json() {
        assert_eq!(
            parse_transcript(r#"{"text": " hello from json "}"#),
            "hello from json"
        );
    }

    #[test]
    fn test_parse_transcript_malformed_json_falls_through() {
        assert_eq!(parse_transcript("{not json"), "{not json");
        assert_eq!(parse_transcript(r#"{"other": 1}"#), r#"{"other": 1}"#);
    }

    #[test]
    fn test_command_line_placeholders() {
        let t = CommandTranscriber::new("asr --model {model} {file}".to_string(), 16000);
        let line = t.command_line(Path::new("/tmp/a.wav"), "parakeet");
        assert_eq!(line, "asr --model parakeet /tmp/a.wav");

        let t = CommandTranscriber::new("asr".to_string(), 16000);
        let line = t.command_line(Path::new("/tmp/a.wav"), "parakeet");
        assert_eq!(line, "asr '/tmp/a.wav'");
    }

    #[test]
    fn test_unconfigured_transcriber_errors() {
        let config = TranscribeConfig {
            model: "parakeet".to_string(),
            command: None,
        };
        assert!(create_transcriber(&config).is_err());
    }

    #[test]
    fn test_command_transcriber_runs_command() {
        // The command ignores the WAV path and echoes a fixed transcript
        let t = CommandTranscriber::new("echo 'hello there' #".to_string(), 16000);
        let samples = vec![0.0f32; 1600];
        assert_eq!(t.transcribe(&samples, "parakeet").unwrap(), "hello there");
    }

    #[test]
    fn test_command_transcriber_failure_is_inference_error() {
        let t = CommandTranscriber::new("exit 3 #".to_string(), 16000);
        let err = t.transcribe(&[0.0f32; 16], "parakeet").unwrap_err();
        assert!(matches!(err, TranscribeError::Inference(_)));
    }

    #[test]
    fn test_wav_handoff_reaches_command() {
        // `wc -c` on the WAV proves a non-empty file was written
        let t = CommandTranscriber::new("wc -c <".to_string(), 16000);
        let out = t.transcribe(&[0.1f32; 1600], "parakeet").unwrap();
        let bytes: u64 = out.trim().parse().unwrap();
        // 1600 samples * 2 bytes + 44 byte header
        assert_eq!(bytes, 3244);
    }
}
