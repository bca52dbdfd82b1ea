use crate::defaults;
use crate::error::{Result, ScribeError};
use crate::session::window::DispatchThreshold;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub capture: CaptureConfig,
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Maximum accepted size of one inbound audio chunk in bytes.
    pub max_chunk_bytes: usize,
}

/// Audio accumulation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of inbound PCM. Fixed contract with clients.
    pub sample_rate: u32,
    /// Dispatch after this many accumulated chunks.
    pub dispatch_threshold_chunks: u32,
    /// Dispatch after this much accumulated audio instead, if set.
    /// Overrides the chunk-count threshold.
    pub dispatch_threshold_ms: Option<u32>,
    /// Depth of the per-session dispatch queue.
    pub dispatch_queue_depth: usize,
}

/// Speech-to-text backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Path to the Whisper model file.
    pub model_path: PathBuf,
    /// Language hint passed to the backend ("auto" for detection).
    pub language: String,
    /// Inference threads (None = auto-detect).
    pub threads: Option<usize>,
}

/// Live capture loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name (None = best default).
    pub device: Option<String>,
    /// Ambient-noise calibration duration in milliseconds.
    pub calibration_ms: u32,
    /// How long to wait for speech before retrying capture, in milliseconds.
    pub phrase_timeout_ms: u32,
    /// Maximum duration of one captured phrase in milliseconds.
    pub max_phrase_ms: u32,
    /// Silence gap that ends a phrase, in milliseconds.
    pub phrase_gap_ms: u32,
    /// RMS speech threshold floor (calibration only raises it).
    pub speech_threshold: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::BIND_ADDR.to_string(),
            max_chunk_bytes: defaults::MAX_CHUNK_BYTES,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            dispatch_threshold_chunks: defaults::DISPATCH_THRESHOLD_CHUNKS,
            dispatch_threshold_ms: None,
            dispatch_queue_depth: defaults::DISPATCH_QUEUE_DEPTH,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            calibration_ms: defaults::CALIBRATION_MS,
            phrase_timeout_ms: defaults::PHRASE_TIMEOUT_MS,
            max_phrase_ms: defaults::MAX_PHRASE_MS,
            phrase_gap_ms: defaults::PHRASE_GAP_MS,
            speech_threshold: defaults::SPEECH_THRESHOLD,
        }
    }
}

impl AudioConfig {
    /// The dispatch threshold in effect for this configuration.
    ///
    /// A duration threshold, when set, wins over the chunk count.
    pub fn dispatch_threshold(&self) -> DispatchThreshold {
        match self.dispatch_threshold_ms {
            Some(ms) => {
                DispatchThreshold::Samples((ms as usize * self.sample_rate as usize) / 1000)
            }
            None => DispatchThreshold::Chunks(self.dispatch_threshold_chunks),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ScribeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file doesn't exist.
    ///
    /// Invalid TOML in an existing file is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(ScribeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.dispatch_threshold_chunks == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "audio.dispatch_threshold_chunks".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.audio.dispatch_queue_depth == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "audio.dispatch_queue_depth".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.capture.max_phrase_ms == 0 {
            return Err(ScribeError::ConfigInvalidValue {
                key: "capture.max_phrase_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STREAMSCRIBE_MODEL → stt.model_path
    /// - STREAMSCRIBE_LANGUAGE → stt.language
    /// - STREAMSCRIBE_BIND → server.bind_addr
    /// - STREAMSCRIBE_CAPTURE_DEVICE → capture.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("STREAMSCRIBE_MODEL")
            && !model.is_empty()
        {
            self.stt.model_path = PathBuf::from(model);
        }

        if let Ok(language) = std::env::var("STREAMSCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(bind) = std::env::var("STREAMSCRIBE_BIND")
            && !bind.is_empty()
        {
            self.server.bind_addr = bind;
        }

        if let Ok(device) = std::env::var("STREAMSCRIBE_CAPTURE_DEVICE")
            && !device.is_empty()
        {
            self.capture.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/streamscribe/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("streamscribe").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_scribe_env() {
        remove_env("STREAMSCRIBE_MODEL");
        remove_env("STREAMSCRIBE_LANGUAGE");
        remove_env("STREAMSCRIBE_BIND");
        remove_env("STREAMSCRIBE_CAPTURE_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr, "127.0.0.1:5001");
        assert_eq!(config.server.max_chunk_bytes, 512 * 1024);

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.dispatch_threshold_chunks, 2);
        assert_eq!(config.audio.dispatch_threshold_ms, None);
        assert_eq!(config.audio.dispatch_queue_depth, 8);

        assert_eq!(config.stt.model_path, PathBuf::from("models/ggml-base.bin"));
        assert_eq!(config.stt.language, "en");
        assert_eq!(config.stt.threads, None);

        assert_eq!(config.capture.device, None);
        assert_eq!(config.capture.calibration_ms, 1000);
        assert_eq!(config.capture.phrase_timeout_ms, 5000);
        assert_eq!(config.capture.max_phrase_ms, 8000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            bind_addr = "0.0.0.0:8090"
            max_chunk_bytes = 65536

            [audio]
            dispatch_threshold_chunks = 4
            dispatch_queue_depth = 16

            [stt]
            model_path = "/opt/models/ggml-small.bin"
            language = "de"

            [capture]
            device = "pipewire"
            calibration_ms = 500
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8090");
        assert_eq!(config.server.max_chunk_bytes, 65536);
        assert_eq!(config.audio.dispatch_threshold_chunks, 4);
        assert_eq!(config.audio.dispatch_queue_depth, 16);
        assert_eq!(
            config.stt.model_path,
            PathBuf::from("/opt/models/ggml-small.bin")
        );
        assert_eq!(config.stt.language, "de");
        assert_eq!(config.capture.device, Some("pipewire".to_string()));
        assert_eq!(config.capture.calibration_ms, 500);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [stt]
            language = "fr"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.stt.language, "fr");
        // Everything else should be defaults
        assert_eq!(config.server.bind_addr, "127.0.0.1:5001");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.dispatch_threshold_chunks, 2);
    }

    #[test]
    fn test_dispatch_threshold_prefers_duration() {
        let mut config = AudioConfig::default();
        assert_eq!(config.dispatch_threshold(), DispatchThreshold::Chunks(2));

        config.dispatch_threshold_ms = Some(1000);
        // 1000ms at 16kHz = 16000 samples
        assert_eq!(
            config.dispatch_threshold(),
            DispatchThreshold::Samples(16000)
        );
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = Config::default();
        config.audio.dispatch_threshold_chunks = 0;
        assert!(matches!(
            config.validate(),
            Err(ScribeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_queue_depth() {
        let mut config = Config::default();
        config.audio.dispatch_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_model_and_bind() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_scribe_env();

        set_env("STREAMSCRIBE_MODEL", "/tmp/ggml-tiny.bin");
        set_env("STREAMSCRIBE_BIND", "0.0.0.0:9000");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model_path, PathBuf::from("/tmp/ggml-tiny.bin"));
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.stt.language, "en"); // Not overridden

        clear_scribe_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_scribe_env();

        set_env("STREAMSCRIBE_LANGUAGE", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.stt.language, "en");

        clear_scribe_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            sample_rate = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_streamscribe_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let invalid_toml = "[server\nbind_addr = broken";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }
}
