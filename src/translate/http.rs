//! LibreTranslate-compatible HTTP translator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{TranslationUnavailable, Translator};
use crate::error::LangspanError;
use crate::ir::LanguageCode;

/// Calls `POST <base>/translate` with a JSON body.
#[derive(Clone, Debug)]
pub struct HttpTranslator {
    endpoint: url::Url,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl HttpTranslator {
    /// `base` is the service root, e.g. `http://localhost:5000`.
    pub fn new(base: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, LangspanError> {
        let mut base = base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = url::Url::parse(&base)
            .and_then(|url| url.join("translate"))
            .map_err(|source| LangspanError::InvalidConfig {
                message: format!("invalid translation endpoint '{base}': {source}"),
            })?;

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        let agent: ureq::Agent = config.into();

        Ok(Self {
            endpoint,
            api_key,
            agent,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn request<'a>(
        &'a self,
        text: &'a str,
        source: &'a LanguageCode,
        target: &'a LanguageCode,
    ) -> TranslateRequest<'a> {
        TranslateRequest {
            q: text,
            source: source.as_str(),
            target: target.as_str(),
            format: "text",
            api_key: self.api_key.as_deref(),
        }
    }
}

impl Translator for HttpTranslator {
    fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<String, TranslationUnavailable> {
        let body = self.request(text, source, target);
        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .send_json(&body)
            .map_err(|source| TranslationUnavailable::new(source.to_string()))?;
        let parsed = response
            .body_mut()
            .read_json::<TranslateResponse>()
            .map_err(|source| TranslationUnavailable::new(source.to_string()))?;
        Ok(parsed.translated_text)
    }
}
