use serde::Serialize;

/// Instruction text sent with every uploaded recording.
pub const AUDIO_INSTRUCTION: &str = "Please answer the questions in the audio input";

pub const AUDIO_WAV: &str = "audio/wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A binary attachment on a turn, such as a recorded question or a spoken reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Media {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn wav(data: Vec<u8>) -> Self {
        Self::new(AUDIO_WAV, data)
    }

    /// Short format name from the mime type: `audio/wav` -> `wav`, `audio/mpeg` -> `mp3`.
    pub fn format(&self) -> &str {
        match self.mime_type.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            other => other.rsplit('/').next().unwrap_or(other),
        }
    }
}

/// One message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub media: Vec<Media>,
}

impl Turn {
    /// The user side of an exchange: fixed instruction plus the uploaded recording.
    pub fn user_audio(audio: Vec<u8>) -> Self {
        Self {
            role: Role::User,
            text: AUDIO_INSTRUCTION.to_string(),
            media: vec![Media::wav(audio)],
        }
    }

    pub fn assistant(text: impl Into<String>, media: Vec<Media>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            media,
        }
    }
}
