// Connectivity monitor: a standing probe loop that reports transitions
// between satisfied and unsatisfied. Only transitions are reported; the
// resolver reacts to them on the actor thread.

use std::time::Duration;

use flume::Sender;

use crate::updates::{CoreMsg, InternalEvent};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) fn spawn_monitor(
    runtime: &tokio::runtime::Runtime,
    tx: Sender<CoreMsg>,
    probe_addr: String,
    interval: Duration,
) {
    runtime.spawn(async move {
        // Start from satisfied so an offline launch reports a transition.
        let mut satisfied = true;
        loop {
            let observed = probe(&probe_addr).await;
            if observed != satisfied {
                satisfied = observed;
                tracing::info!(satisfied, "reachability transition");
                let event = InternalEvent::ReachabilityChanged { satisfied };
                if tx.send(CoreMsg::Internal(Box::new(event))).is_err() {
                    break;
                }
            }
            tokio::time::sleep(interval).await;
        }
    });
}

async fn probe(addr: &str) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_transition_to_unsatisfied() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .enable_io()
            .build()
            .unwrap();
        let (tx, rx) = flume::unbounded();

        // Nothing listens on this port; the first probe fails and must flip
        // the assumed-satisfied start state.
        spawn_monitor(&runtime, tx, "127.0.0.1:1".into(), Duration::from_secs(60));

        let msg = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        match msg {
            CoreMsg::Internal(event) => {
                assert!(matches!(
                    *event,
                    InternalEvent::ReachabilityChanged { satisfied: false }
                ));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn satisfied_probe_reports_nothing() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .enable_io()
            .build()
            .unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = flume::unbounded();

        spawn_monitor(&runtime, tx, addr, Duration::from_millis(50));

        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }
}
