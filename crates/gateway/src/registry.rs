//! Node-local registry of identity → current session.
//!
//! At most one session per identity on this node. Every read and write
//! happens under the registry mutex; callers take a snapshot and release the
//! lock before touching any socket.

use {axum::extract::ws::Message, tokio::sync::mpsc};

use crate::state::{ClientHandle, HubState};

impl HubState {
    /// Install `client` as the identity's current session, returning the
    /// session it replaced, if any. The caller must close the returned
    /// session with the eviction code before dropping it.
    pub async fn bind(&self, client: ClientHandle) -> Option<ClientHandle> {
        self.clients.lock().await.insert(client.email.clone(), client)
    }

    /// Remove the binding for `email` iff it still points at `conn_id`.
    ///
    /// Returns whether a removal happened. An evicted session calling this
    /// after the slot was re-bound is a no-op, so only the owning session
    /// ever tears its binding down.
    pub async fn unbind_if_current(&self, email: &str, conn_id: &str) -> bool {
        let mut clients = self.clients.lock().await;
        match clients.get(email) {
            Some(current) if current.conn_id == conn_id => {
                clients.remove(email);
                true
            },
            _ => false,
        }
    }

    /// Copy of every local sender, for fan-out after the lock is released.
    pub async fn snapshot_senders(&self) -> Vec<mpsc::UnboundedSender<Message>> {
        self.clients
            .lock()
            .await
            .values()
            .map(|c| c.sender.clone())
            .collect()
    }

    /// Identities currently bound on this node.
    pub async fn local_identities(&self) -> Vec<String> {
        self.clients.lock().await.keys().cloned().collect()
    }

    /// The sender for `email`'s current session, if bound here.
    pub async fn sender_for(&self, email: &str) -> Option<mpsc::UnboundedSender<Message>> {
        self.clients.lock().await.get(email).map(|c| c.sender.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}
