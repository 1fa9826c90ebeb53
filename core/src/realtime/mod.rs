//! Realtime transport
//!
//! Delivers server-pushed events (new ciphertext messages, typing, call
//! signalling) to in-process subscribers over a single WebSocket, with
//! keepalive and automatic reconnection.
//!
//! ```rust,ignore
//! let channel = RealtimeChannel::new(&config, session.clone());
//! let _sub = channel.subscribe(|event| println!("{}", event.kind()));
//! channel.connect()?;
//! channel.send(&OutboundFrame::Typing { conversation_id });
//! ```

pub mod channel;
pub mod event;
pub mod listeners;

pub use channel::{ChannelError, ConnectionState, RealtimeChannel, TokenProvider};
pub use event::{InboundEvent, OutboundFrame};
pub use listeners::{ListenerRegistry, Subscription};
