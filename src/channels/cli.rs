//! CLI channel: Hermes-topic envelopes as JSON lines on stdin/stdout.
//!
//! ```text
//! {"topic": "hermes/intent/TurnOn", "payload": {...}}
//! {"topic": "hermes/handle/toggleOff", "payload": {"siteId": "default"}}
//! ```

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::channels::{Channel, MessageStream};
use crate::error::ChannelError;
use crate::messages::{InboundMessage, SpeechOutput, TTS_SAY_TOPIC};

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    topic: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    topic: &'a str,
    payload: &'a SpeechOutput,
}

/// Decode one input line.
pub fn parse_line(line: &str) -> Result<InboundMessage, ChannelError> {
    let envelope: InboundEnvelope = serde_json::from_str(line)
        .map_err(|e| ChannelError::InvalidMessage(format!("bad envelope: {e}")))?;
    InboundMessage::from_topic(&envelope.topic, envelope.payload)
}

/// Encode a speech event as one output line (without the newline).
pub fn speech_line(speech: &SpeechOutput) -> Result<String, ChannelError> {
    serde_json::to_string(&OutboundEnvelope {
        topic: TTS_SAY_TOPIC,
        payload: speech,
    })
    .map_err(|e| ChannelError::SendFailed {
        name: "cli".to_string(),
        reason: e.to_string(),
    })
}

/// Reads envelopes from stdin and writes speech events to stdout.
pub struct CliChannel {
    input: Mutex<Option<BoxedReader>>,
    output: Mutex<BoxedWriter>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }

    /// Use arbitrary streams instead of stdin/stdout.
    pub fn with_io<R, W>(input: R, output: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            input: Mutex::new(Some(Box::new(input))),
            output: Mutex::new(Box::new(output)),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let reader = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::StartupFailed {
                name: "cli".to_string(),
                reason: "start() already called".to_string(),
            })?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_line(line) {
                            Ok(msg) => {
                                if tx.send(msg).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Skipping input line: {}", e),
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("CLI input closed");
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn publish(&self, speech: SpeechOutput) -> Result<(), ChannelError> {
        let mut line = speech_line(&speech)?;
        line.push('\n');

        let mut output = self.output.lock().await;
        let send_failed = |e: std::io::Error| ChannelError::SendFailed {
            name: "cli".to_string(),
            reason: e.to_string(),
        };
        output.write_all(line.as_bytes()).await.map_err(send_failed)?;
        output.flush().await.map_err(send_failed)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_intent_and_toggle_lines() {
        let line = json!({
            "topic": "hermes/intent/TurnOn",
            "payload": {
                "input": "turn on",
                "intent": {"intentName": "TurnOn", "confidenceScore": 1.0},
                "siteId": "kitchen"
            }
        })
        .to_string();
        match parse_line(&line).unwrap() {
            InboundMessage::Intent(intent) => {
                assert_eq!(intent.name(), "TurnOn");
                assert_eq!(intent.site_id, "kitchen");
            }
            other => panic!("unexpected {other:?}"),
        }

        let off = parse_line(r#"{"topic": "hermes/handle/toggleOff"}"#).unwrap();
        assert!(matches!(off, InboundMessage::HandleToggleOff { .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"topic": "hermes/other", "payload": {}}"#).is_err());
    }

    #[test]
    fn speech_line_uses_tts_topic() {
        let speech = SpeechOutput {
            text: "hello".into(),
            correlation_id: "abc".into(),
            site_id: "default".into(),
            session_id: None,
            lang: None,
        };
        let value: Value = serde_json::from_str(&speech_line(&speech).unwrap()).unwrap();
        assert_eq!(value["topic"], "hermes/tts/say");
        assert_eq!(value["payload"]["text"], "hello");
        assert_eq!(value["payload"]["id"], "abc");
        assert_eq!(value["payload"]["siteId"], "default");
    }

    #[tokio::test]
    async fn streams_valid_lines_and_skips_bad_ones() {
        let input = concat!(
            "{\"topic\": \"hermes/handle/toggleOn\"}\n",
            "\n",
            "garbage\n",
            "{\"topic\": \"hermes/handle/toggleOff\", \"payload\": {\"siteId\": \"den\"}}\n",
        );
        let channel = CliChannel::with_io(input.as_bytes(), tokio::io::sink());
        let messages: Vec<InboundMessage> = channel.start().await.unwrap().collect().await;

        assert_eq!(
            messages,
            vec![
                InboundMessage::HandleToggleOn {
                    site_id: "default".into()
                },
                InboundMessage::HandleToggleOff {
                    site_id: "den".into()
                },
            ]
        );
        assert!(channel.start().await.is_err());
    }

    #[tokio::test]
    async fn publish_writes_one_line() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let channel = CliChannel::with_io(&b""[..], writer);
        channel
            .publish(SpeechOutput {
                text: "done".into(),
                correlation_id: "1".into(),
                site_id: "default".into(),
                session_id: Some("s".into()),
                lang: None,
            })
            .await
            .unwrap();
        drop(channel);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut out)
            .await
            .unwrap();
        assert!(out.ends_with('\n'));
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("\"text\":\"done\""));
    }
}
