use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CLASSIFY_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GROUNDING_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// A key shorter than this is either empty or a placeholder.
const MIN_KEY_LENGTH: usize = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("assistant credential is missing or invalid")]
    NotConfigured,
    #[error("failed to encode request: {0}")]
    Encode(String),
}

/// Credential-resolved client configuration for the assistant.
///
/// There is exactly one of these per model; it is constructed once when
/// the shell hands over a credential and replaced wholesale on
/// reconfiguration. The credential is never serialized and is redacted
/// from `Debug` output.
#[derive(Clone)]
pub struct AssistantConfig {
    api_key: SecretString,
    api_base: String,
    classify_model: String,
    grounding_model: String,
    image_model: String,
    temperature: Option<f32>,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("classify_model", &self.classify_model)
            .field("grounding_model", &self.grounding_model)
            .field("image_model", &self.image_model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl AssistantConfig {
    /// Validate and wrap a credential. Fails with
    /// [`AssistantError::NotConfigured`] for empty or placeholder keys so
    /// the caller can surface the dedicated "reconfigure access" state
    /// instead of a generic failure.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AssistantError> {
        let api_key = api_key.into();
        let trimmed = api_key.trim();
        if trimmed.len() < MIN_KEY_LENGTH || trimmed == "undefined" {
            return Err(AssistantError::NotConfigured);
        }

        Ok(Self {
            api_key: SecretString::new(trimmed.to_owned()),
            api_base: DEFAULT_API_BASE.into(),
            classify_model: DEFAULT_CLASSIFY_MODEL.into(),
            grounding_model: DEFAULT_GROUNDING_MODEL.into(),
            image_model: DEFAULT_IMAGE_MODEL.into(),
            temperature: None,
        })
    }

    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> AssistantConfigBuilder {
        AssistantConfigBuilder {
            api_key: api_key.into(),
            api_base: None,
            classify_model: None,
            grounding_model: None,
            image_model: None,
            temperature: None,
        }
    }

    pub(crate) fn expose_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    #[must_use]
    pub fn classify_model(&self) -> &str {
        &self.classify_model
    }

    #[must_use]
    pub fn grounding_model(&self) -> &str {
        &self.grounding_model
    }

    #[must_use]
    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    #[must_use]
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}

/// Builder for non-default endpoints and model names.
#[derive(Debug)]
pub struct AssistantConfigBuilder {
    api_key: String,
    api_base: Option<String>,
    classify_model: Option<String>,
    grounding_model: Option<String>,
    image_model: Option<String>,
    temperature: Option<f32>,
}

impl AssistantConfigBuilder {
    #[must_use]
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    #[must_use]
    pub fn classify_model(mut self, model: impl Into<String>) -> Self {
        self.classify_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn grounding_model(mut self, model: impl Into<String>) -> Self {
        self.grounding_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn build(self) -> Result<AssistantConfig, AssistantError> {
        let mut config = AssistantConfig::new(self.api_key)?;
        if let Some(base) = self.api_base {
            config.api_base = base.trim_end_matches('/').to_owned();
        }
        if let Some(model) = self.classify_model {
            config.classify_model = model;
        }
        if let Some(model) = self.grounding_model {
            config.grounding_model = model;
        }
        if let Some(model) = self.image_model {
            config.image_model = model;
        }
        config.temperature = self.temperature;
        Ok(config)
    }
}
