use std::fmt;

use owo_colors::OwoColorize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch::Receiver as WatchReceiver;

use common::sync::SyncEvent;

const OUTGOING: &str = "⫸";
const INCOMING: &str = "⫷";

/// One line of sync activity for the terminal
#[derive(Debug)]
pub struct ActivityLine<'a>(pub &'a SyncEvent);

impl fmt::Display for ActivityLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            SyncEvent::Published { entries } => write!(
                f,
                "{} {} snapshot ({} entries)",
                OUTGOING.cyan().bold(),
                "PUBLISH".bold(),
                entries
            ),
            SyncEvent::Served { peer, path } => write!(
                f,
                "{} {} {} {}",
                OUTGOING.cyan().bold(),
                "READ".bold(),
                path,
                format!("to {}", peer.short()).dimmed()
            ),
            SyncEvent::Pulled { peer, path } => write!(
                f,
                "{} {} {} {}",
                INCOMING.green().bold(),
                "WRITE".bold(),
                path,
                format!("from {}", peer.short()).dimmed()
            ),
            SyncEvent::Removed { peer, path } => write!(
                f,
                "{} {} {} {}",
                INCOMING.red().bold(),
                "REMOVE".bold(),
                path,
                format!("from {}", peer.short()).dimmed()
            ),
            SyncEvent::Accepted { peer, op, path } => write!(
                f,
                "{} {} {} {}",
                INCOMING.yellow().bold(),
                op.bold(),
                path,
                format!("pushed by {}", peer.short()).dimmed()
            ),
        }
    }
}

/// Print activity lines until shutdown
pub async fn print_activity(
    mut activity: broadcast::Receiver<SyncEvent>,
    mut shutdown_rx: WatchReceiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            event = activity.recv() => match event {
                Ok(event) => println!("{}", ActivityLine(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    println!("{}", format!("... {} events skipped", skipped).dimmed());
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::peer::PeerId;

    #[test]
    fn test_activity_lines_name_path_and_peer() {
        let peer = PeerId::from_bytes([0xcd; 32]);

        let line = ActivityLine(&SyncEvent::Pulled {
            peer,
            path: "docs/a.txt".to_string(),
        })
        .to_string();
        assert!(line.contains(INCOMING));
        assert!(line.contains("WRITE"));
        assert!(line.contains("docs/a.txt"));
        assert!(line.contains("from cdcdcdcdcd"));

        let line = ActivityLine(&SyncEvent::Published { entries: 3 }).to_string();
        assert!(line.contains(OUTGOING));
        assert!(line.contains("snapshot (3 entries)"));
    }
}
