//! One-second countdown that reopens the gate.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use super::{Phase, SessionState, Shared};

const TICK: Duration = Duration::from_secs(1);

/// Closes the gate for `seconds` and spawns the ticker. Must be called with
/// the state lock held, which also keeps the ticker from running before its
/// handle is stored.
pub(super) fn arm(shared: &Arc<Shared>, state: &mut SessionState, seconds: u64) {
    if let Some(stale) = state.cooldown.take() {
        warn!("Cooldown armed while another was pending, aborting the old one");
        stale.abort();
    }

    if seconds == 0 {
        state.phase = Phase::Idle;
        return;
    }

    state.phase = Phase::CoolingDown { remaining: seconds };
    let handle = tokio::spawn(tick_down(Arc::clone(shared)));
    state.cooldown = Some(handle.abort_handle());
}

async fn tick_down(shared: Arc<Shared>) {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    loop {
        ticker.tick().await;

        let mut state = shared.state.lock().await;
        let Phase::CoolingDown { remaining } = state.phase else {
            // someone else moved the phase on, nothing left to count
            state.cooldown = None;
            return;
        };

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            state.phase = Phase::Idle;
            state.cooldown = None;
            info!("Cooldown finished, gate reopened");
            return;
        }
        state.phase = Phase::CoolingDown { remaining };
        debug!("Cooldown: {}s left", remaining);
    }
}
