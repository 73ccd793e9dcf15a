//! Gateway: the chat hub's WebSocket server and connection lifecycle.
//!
//! Lifecycle of one connection:
//! 1. Upgrade, spawn the write loop
//! 2. Authenticate (query token, or one `auth` frame within the window)
//! 3. Bind in the registry, evicting any prior session for the identity
//! 4. Record the presence edge, greet with `user_list`, broadcast the edge
//! 5. Read loop: dispatch `message` / `list_users` frames
//! 6. Cleanup: conditional unbind, presence decrement, offline broadcast
//!
//! Cross-node fan-out goes through `confab-broker`; with no broker configured
//! every path degrades to node-local delivery.

pub mod broadcast;
pub mod config;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;
pub mod subscriber;
pub mod ws;
