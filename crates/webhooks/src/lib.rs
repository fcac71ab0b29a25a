//! Outbound webhook delivery.
//!
//! Fans domain events out to registered subscriptions as signed HTTP posts,
//! with linear or exponential retry backoff and a scanner that re-dispatches
//! attempts whose retry time has elapsed. Runs as a consumer path parallel
//! to the channel fan-out, with its own scheduler.

pub mod delivery;
pub mod signer;
pub mod subscriptions;

pub use delivery::WebhookDeliveryEngine;
pub use subscriptions::{CreateSubscriptionParams, SubscriptionStore};
