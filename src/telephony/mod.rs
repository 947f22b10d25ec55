//! Telephony vendor integration: webhook signatures, REST client, media and
//! outbound notifications.

pub mod client;
pub mod media;
pub mod notifier;
pub mod signature;

pub use client::{
    FetchedMedia, NumberKind, OwnedNumber, SmsRequest, TelephonyClient, TwilioClient,
    UnconfiguredClient,
};
pub use media::{MediaItem, MediaStore, ProxyMediaStore};
pub use notifier::{Notifier, SendContext};
