//! The transport seam: where inbound messages come from and speech goes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::messages::{InboundMessage, SpeechOutput};

/// Stream of decoded inbound messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. Call once.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a speech event.
    async fn publish(&self, speech: SpeechOutput) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
