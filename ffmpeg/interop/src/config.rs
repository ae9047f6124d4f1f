/*!
    Session configuration.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/**
    Flat string-keyed options forwarded verbatim to the engine.

    Keys and accepted values are defined entirely by the engine (for FFmpeg,
    the demuxer and protocol options such as `rtsp_transport` or `timeout`).
    Values are stored as strings; the engine converts them to the right type.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineOptions {
    entries: BTreeMap<String, String>,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Set an option, replacing any previous value for the key.
    */
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.entries.insert(key.into(), value.to_string());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for EngineOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (k, v) in iter {
            options.set(k, v);
        }
        options
    }
}

/**
    Configuration for opening a media session.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Always decode audio to PCM, even when a passthrough format exists.
    pub force_audio_decode: bool,
    /// Always decode video to NV12, even when a passthrough format exists.
    pub force_video_decode: bool,
    /// Options forwarded to the engine when opening the input.
    pub options: EngineOptions,
}
