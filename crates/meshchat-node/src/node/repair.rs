//! Repair: re-attach to the mesh after the primary link fails.
//!
//! Walks the known addresses in the order they were heard, skipping this
//! node's own listener, until one join succeeds. A peer that is already
//! connected is adopted as the new primary without dialing. Passes are
//! capped at `repair.max_rounds` with a doubling pause between them; a node
//! that exhausts them stays partitioned until the next failure or a manual
//! join.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::OverlayNode;

impl OverlayNode {
    pub(super) async fn repair_loop(self: Arc<Self>, mut requests: mpsc::UnboundedReceiver<()>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!("repair worker shutting down");
                    return;
                }

                next = requests.recv() => {
                    if next.is_none() {
                        return;
                    }
                    // Several failures in a burst need one repair.
                    while requests.try_recv().is_ok() {}
                    self.repair().await;
                }
            }
        }
    }

    /// Try to re-establish a primary link. Returns true on success.
    pub async fn repair(self: &Arc<Self>) -> bool {
        let rounds = self.config.repair.max_rounds;

        for round in 0..rounds {
            if self.shutdown.is_cancelled() {
                return false;
            }
            if self.has_primary() {
                return true;
            }

            for addr in self.known.snapshot() {
                if self.is_own_address(&addr) {
                    continue;
                }
                if let Some(conn) = self.connections.find_by_listen_addr(&addr) {
                    self.connections.set_primary(conn.id);
                    tracing::info!(peer = %addr, "adopted existing connection as primary");
                    return true;
                }
                match self.join(&addr).await {
                    Ok(()) => {
                        tracing::info!(peer = %addr, round, "mesh repaired");
                        return true;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %addr, round, error = %e, "repair attempt failed");
                    }
                }
            }

            if round + 1 < rounds {
                let pause = self.config.repair.backoff(round);
                tokio::select! {
                    _ = self.shutdown.cancelled() => return false,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        tracing::warn!(
            rounds,
            known = self.known.len(),
            "repair gave up, node is partitioned"
        );
        false
    }
}
