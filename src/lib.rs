//! DealVault - Deal Negotiation Bot Engine
//!
//! A chat bot that walks users through creating charity, debt, service and
//! venture deals, invites counterparts, relays the negotiation between the
//! two sides and tracks each deal from pending to completion.
//!
//! Key principles:
//! - The engine is pure state; time comes in, notices come out
//! - One dispatch table decides what every inbound event means
//! - Deal status only changes through the lifecycle manager
//! - Relay goes to the sender's chat partner and nobody else

pub mod engine;
pub mod messenger;
pub mod persistence;
