//! Declarative voice-control document builder (TwiML).
//!
//! The telephony provider drives a call by fetching these XML documents:
//! speak text, record the caller, play a media URL, redirect to another
//! webhook, or dial out. The builder escapes all text and attribute values.

use std::fmt::Write;

/// Carrier voice used for built-in speech (greetings, prompts, and the
/// low-quality fallback when synthesis is unavailable).
pub const CARRIER_VOICE: &str = "alice";

/// Language tag for the carrier voice.
pub const CARRIER_LANGUAGE: &str = "en-IN";

#[derive(Debug, Clone)]
enum Verb {
    Say { text: String },
    Play { url: String },
    Record {
        action: String,
        max_length: u32,
        timeout: u32,
        play_beep: bool,
    },
    Redirect { url: String },
    Dial {
        number: String,
        caller_id: Option<String>,
    },
}

/// A voice-control response under construction.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    /// An empty `<Response/>` — the reply for unauthenticated requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaks text with the carrier voice.
    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say { text: text.into() });
        self
    }

    /// Plays an audio resource by URL.
    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play { url: url.into() });
        self
    }

    /// Records the caller and posts the result to `action`.
    pub fn record(
        mut self,
        action: impl Into<String>,
        max_length: u32,
        timeout: u32,
        play_beep: bool,
    ) -> Self {
        self.verbs.push(Verb::Record {
            action: action.into(),
            max_length,
            timeout,
            play_beep,
        });
        self
    }

    /// Redirects call control to another webhook.
    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect { url: url.into() });
        self
    }

    /// Dials an outbound number, optionally presenting a caller id.
    pub fn dial(mut self, number: impl Into<String>, caller_id: Option<String>) -> Self {
        self.verbs.push(Verb::Dial {
            number: number.into(),
            caller_id,
        });
        self
    }

    /// Renders the document as XML.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            match verb {
                Verb::Say { text } => {
                    let _ = write!(
                        xml,
                        "<Say voice=\"{}\" language=\"{}\">{}</Say>",
                        CARRIER_VOICE,
                        CARRIER_LANGUAGE,
                        escape(text)
                    );
                }
                Verb::Play { url } => {
                    let _ = write!(xml, "<Play>{}</Play>", escape(url));
                }
                Verb::Record {
                    action,
                    max_length,
                    timeout,
                    play_beep,
                } => {
                    let _ = write!(
                        xml,
                        "<Record action=\"{}\" method=\"POST\" maxLength=\"{}\" timeout=\"{}\" playBeep=\"{}\"/>",
                        escape(action),
                        max_length,
                        timeout,
                        play_beep
                    );
                }
                Verb::Redirect { url } => {
                    let _ = write!(xml, "<Redirect>{}</Redirect>", escape(url));
                }
                Verb::Dial { number, caller_id } => {
                    match caller_id {
                        Some(id) => {
                            let _ = write!(
                                xml,
                                "<Dial callerId=\"{}\"><Number>{}</Number></Dial>",
                                escape(id),
                                escape(number)
                            );
                        }
                        None => {
                            let _ = write!(
                                xml,
                                "<Dial><Number>{}</Number></Dial>",
                                escape(number)
                            );
                        }
                    }
                }
            }
        }
        xml.push_str("</Response>");
        xml
    }
}

/// Escapes XML text and attribute content.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
