#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Runtime plumbing that hosts the authoritative and mirror roles.
//!
//! Each role runs as a serialized actor on a blocking task that drains a
//! bounded queue. Transport readers and the tick timer feed those queues;
//! handlers never run concurrently with each other.

pub mod client;
pub mod config;
pub mod provider;
pub mod server;
pub mod transport;

pub use client::MirrorHandle;
pub use config::{SessionConfig, WorldSource};
pub use provider::{GeneratedWorldProvider, HttpWorldProvider};
pub use server::{AuthorityHandle, AuthoritySnapshot, ConnectionId};
pub use transport::{ChannelTransport, Transport, TransportError};

use fog_sync_core::Color;
use rand::Rng;

/// Errors raised while talking to a session actor.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The actor stopped and no longer accepts events.
    #[error("session actor stopped")]
    Stopped,
    /// A session task panicked or was cancelled.
    #[error("session task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Picks the colour a player is drawn with.
///
/// Well-known colour names map to their colour regardless of case or
/// surrounding whitespace; any other name gets a random opaque colour.
pub fn color_for_name(name: &str, rng: &mut impl Rng) -> Color {
    match name.trim().to_lowercase().as_str() {
        "red" => Color::from_rgb(255, 0, 0),
        "green" => Color::from_rgb(0, 255, 0),
        "blue" => Color::from_rgb(0, 0, 255),
        "yellow" => Color::from_rgb(255, 255, 0),
        "cyan" => Color::from_rgb(0, 255, 255),
        "purple" => Color::from_rgb(255, 0, 255),
        _ => Color::from_rgb(rng.gen(), rng.gen(), rng.gen()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn known_names_get_fixed_colors() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(color_for_name(" Red ", &mut rng), Color::from_rgb(255, 0, 0));
        assert_eq!(color_for_name("PURPLE", &mut rng), Color::from_rgb(255, 0, 255));
    }

    #[test]
    fn unknown_names_get_opaque_random_colors() {
        let mut first = ChaCha8Rng::seed_from_u64(7);
        let mut second = ChaCha8Rng::seed_from_u64(7);
        let color = color_for_name("mauve", &mut first);
        assert_eq!(color.a, 255);
        assert_eq!(color, color_for_name("mauve", &mut second));
    }
}
